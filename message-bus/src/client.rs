//! JetStream connection and stream provisioning

use async_nats::jetstream::{
    self,
    stream::{Config as StreamConfig, RetentionPolicy, StorageType},
    Context as JetStreamContext,
};
use std::time::Duration;
use tracing::{error, info};

use crate::{Error, Result};

/// NATS connection settings
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// Server URL, e.g. `nats://localhost:4222`
    pub url: String,

    /// Client name reported to the server
    pub client_name: String,

    /// Connection timeout
    pub connect_timeout: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            client_name: "message-bus-client".to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Stream definition used when provisioning a JetStream stream
#[derive(Debug, Clone)]
pub struct StreamSpec {
    /// Stream name
    pub name: String,

    /// Subjects captured by the stream
    pub subjects: Vec<String>,

    /// Retention age
    pub max_age: Duration,

    /// Human readable description
    pub description: String,
}

/// Shared JetStream connection
#[derive(Clone)]
pub struct NatsClient {
    client: async_nats::Client,
    context: JetStreamContext,
}

impl NatsClient {
    /// Connect to the server and open a JetStream context
    pub async fn connect(config: &NatsConfig) -> Result<Self> {
        info!("Connecting to NATS JetStream at {}", config.url);

        let client = async_nats::ConnectOptions::new()
            .name(&config.client_name)
            .connection_timeout(config.connect_timeout)
            .connect(config.url.as_str())
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let context = jetstream::new(client.clone());

        info!("✅ Connected to NATS: {}", config.url);
        Ok(Self { client, context })
    }

    /// JetStream context
    pub fn jetstream(&self) -> &JetStreamContext {
        &self.context
    }

    /// Flush pending writes, used on shutdown
    pub async fn flush(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .map_err(|e| Error::Publish(format!("Flush failed: {}", e)))
    }

    /// Create the stream if it does not exist yet
    pub async fn ensure_stream(&self, spec: &StreamSpec) -> Result<jetstream::stream::Stream> {
        info!(
            "Ensuring stream {} with subjects: {:?}",
            spec.name, spec.subjects
        );

        let config = StreamConfig {
            name: spec.name.clone(),
            description: Some(spec.description.clone()),
            subjects: spec.subjects.clone(),
            retention: RetentionPolicy::Limits,
            max_age: spec.max_age,
            storage: StorageType::File,
            duplicate_window: Duration::from_secs(120),
            ..Default::default()
        };

        match self.context.get_or_create_stream(config).await {
            Ok(stream) => {
                info!("Stream {} ready", spec.name);
                Ok(stream)
            }
            Err(e) => {
                error!("Failed to create stream {}: {}", spec.name, e);
                Err(Error::Stream(e.to_string()))
            }
        }
    }
}

/// Turn an arbitrary key into a single NATS subject token.
///
/// Tokens may not contain separators, wildcards or whitespace.
pub fn subject_token(key: &str) -> String {
    let token: String = key
        .trim()
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();

    if token.is_empty() {
        "unknown".to_string()
    } else {
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nats_config_default() {
        let config = NatsConfig::default();
        assert_eq!(config.url, "nats://localhost:4222");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_subject_token_sanitizes_separators() {
        assert_eq!(subject_token("237489237492"), "237489237492");
        assert_eq!(subject_token("acct.01*>"), "acct_01__");
        assert_eq!(subject_token(" a b "), "a_b");
        assert_eq!(subject_token("   "), "unknown");
    }

    #[tokio::test]
    #[ignore] // Requires NATS server
    async fn test_ensure_stream() {
        let client = NatsClient::connect(&NatsConfig::default())
            .await
            .expect("Failed to connect");

        client
            .ensure_stream(&StreamSpec {
                name: "TEST_STREAM".to_string(),
                subjects: vec!["test.stream.>".to_string()],
                max_age: Duration::from_secs(60),
                description: "test".to_string(),
            })
            .await
            .expect("Failed to create stream");
    }
}

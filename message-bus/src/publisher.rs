//! Keyed JetStream publisher with retry logic

use crate::{
    client::{subject_token, NatsClient},
    metrics::{MESSAGE_PUBLISH_DURATION, MESSAGE_PUBLISH_TOTAL},
    Error, Result,
};
use async_nats::HeaderMap;
use bytes::Bytes;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Header carrying the partition key of a keyed publish
pub const PARTITION_KEY_HEADER: &str = "Partition-Key";

/// JetStream deduplication header, honoured within the stream's duplicate window
pub const MESSAGE_ID_HEADER: &str = "Nats-Msg-Id";

/// Publisher configuration
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Time to wait for the broker acknowledgment of one attempt
    pub publish_timeout: Duration,

    /// Max publish attempts
    pub max_attempts: u32,

    /// Initial retry delay
    pub initial_retry_delay: Duration,

    /// Max retry delay
    pub max_retry_delay: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            publish_timeout: Duration::from_secs(5),
            max_attempts: 3,
            initial_retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_secs(2),
        }
    }
}

/// Message publisher
#[derive(Clone)]
pub struct Publisher {
    client: NatsClient,
    config: PublisherConfig,
}

impl Publisher {
    /// Create new publisher
    pub fn new(client: NatsClient, config: PublisherConfig) -> Self {
        Self { client, config }
    }

    /// Publish `payload` to `<subject_prefix>.<key>` and wait for the
    /// JetStream acknowledgment. The key is also sent as a header.
    ///
    /// With a `message_id`, retried attempts carry the same `Nats-Msg-Id`,
    /// so an attempt whose ack was lost is not stored twice.
    pub async fn publish_keyed(
        &self,
        subject_prefix: &str,
        key: &str,
        message_id: Option<&str>,
        payload: Bytes,
    ) -> Result<()> {
        let start = Instant::now();
        let subject = keyed_subject(subject_prefix, key);

        info!("Publishing {} bytes to subject: {}", payload.len(), subject);

        let headers = keyed_headers(key, message_id);

        let result = self.publish_with_retry(&subject, headers, payload).await;

        MESSAGE_PUBLISH_DURATION
            .with_label_values(&[subject_prefix])
            .observe(start.elapsed().as_secs_f64());

        let status = if result.is_ok() { "success" } else { "error" };
        MESSAGE_PUBLISH_TOTAL
            .with_label_values(&[subject_prefix, status])
            .inc();

        result
    }

    /// Publish with exponential backoff retry
    async fn publish_with_retry(&self, subject: &str, headers: HeaderMap, payload: Bytes) -> Result<()> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts = 0;
        let mut delay = self.config.initial_retry_delay;

        loop {
            attempts += 1;

            match self.publish_once(subject, headers.clone(), payload.clone()).await {
                Ok(_) => {
                    if attempts > 1 {
                        info!("✅ Message published after {} attempts", attempts);
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempts >= max_attempts {
                        error!("❌ Failed to publish after {} attempts: {}", attempts, e);
                        return Err(e);
                    }

                    warn!(
                        "⚠️  Publish failed (attempt {}), retrying in {:?}: {}",
                        attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;

                    // Exponential backoff
                    delay = (delay * 2).min(self.config.max_retry_delay);
                }
            }
        }
    }

    /// Single publish attempt, bounded by the publish timeout
    async fn publish_once(&self, subject: &str, headers: HeaderMap, payload: Bytes) -> Result<()> {
        let timeout = self.config.publish_timeout;

        let attempt = async {
            let ack = self
                .client
                .jetstream()
                .publish_with_headers(subject.to_string(), headers, payload)
                .await
                .map_err(|e| Error::Publish(e.to_string()))?;

            ack.await
                .map_err(|e| Error::Publish(format!("Publish ack failed: {}", e)))?;

            Ok(())
        };

        tokio::time::timeout(timeout, attempt)
            .await
            .map_err(|_| Error::Timeout(timeout.as_millis() as u64))?
    }
}

/// Headers for a keyed publish
pub fn keyed_headers(key: &str, message_id: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(PARTITION_KEY_HEADER, key);
    if let Some(id) = message_id {
        headers.insert(MESSAGE_ID_HEADER, id);
    }
    headers
}

/// Subject for a keyed publish
pub fn keyed_subject(subject_prefix: &str, key: &str) -> String {
    format!("{}.{}", subject_prefix, subject_token(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_config_default() {
        let config = PublisherConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.publish_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_keyed_headers() {
        let headers = keyed_headers("237489237492", Some("b7e1c0de-3"));
        assert_eq!(
            headers.get(PARTITION_KEY_HEADER).map(|v| v.as_str()),
            Some("237489237492")
        );
        assert_eq!(
            headers.get(MESSAGE_ID_HEADER).map(|v| v.as_str()),
            Some("b7e1c0de-3")
        );

        let headers = keyed_headers("237489237492", None);
        assert!(headers.get(MESSAGE_ID_HEADER).is_none());
    }

    #[test]
    fn test_keyed_subject() {
        assert_eq!(
            keyed_subject("dlq.transfer.fulfillment", "237489237492"),
            "dlq.transfer.fulfillment.237489237492"
        );
        assert_eq!(
            keyed_subject("dlq.transfer.fulfillment", ""),
            "dlq.transfer.fulfillment.unknown"
        );
    }
}

use crate::retry_strategy::RetryPolicy;
use config::{ConfigError, Environment, File};
use message_bus::{PublisherConfig, StreamSpec, SubscriberConfig};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub nats: NatsConfig,
    pub ledger: LedgerConfig,
    pub fulfillment: FulfillmentConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NatsConfig {
    pub url: String,
    pub inbound_stream: String,
    pub inbound_subject: String,
    /// Partition tokens under `inbound_subject`; empty means one consumer for all
    pub partitions: Vec<String>,
    pub durable_prefix: String,
    pub ack_wait_secs: u64,
    pub dead_letter_stream: String,
    pub dead_letter_subject: String,
    pub publish_timeout_ms: u64,
    pub publish_max_attempts: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LedgerConfig {
    /// Caller id sent as `ait-id`
    pub ait_id: String,
    pub post_transaction_url: String,
    pub commit_reservation_url: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub backoff_multiplier: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FulfillmentConfig {
    pub redelivery_delay_ms: u64,
    /// Redeliveries allowed before a transient failure is dead-lettered, 0 = unlimited
    pub max_redeliveries: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8090)?
            .set_default("nats.url", "nats://localhost:4222")?
            .set_default("nats.inbound_stream", "TRANSFER_FULFILLMENT")?
            .set_default("nats.inbound_subject", "transfer.fulfillment")?
            .set_default("nats.partitions", Vec::<String>::new())?
            .set_default("nats.durable_prefix", "fulfillment-engine")?
            .set_default("nats.ack_wait_secs", 60)?
            .set_default("nats.dead_letter_stream", "TRANSFER_FULFILLMENT_DLQ")?
            .set_default("nats.dead_letter_subject", "dlq.transfer.fulfillment")?
            .set_default("nats.publish_timeout_ms", 5000)?
            .set_default("nats.publish_max_attempts", 3)?
            .set_default("ledger.ait_id", "")?
            .set_default("ledger.post_transaction_url", "")?
            .set_default("ledger.commit_reservation_url", "")?
            .set_default("ledger.connect_timeout_ms", 1000)?
            .set_default("ledger.request_timeout_ms", 1000)?
            .set_default("ledger.max_attempts", 3)?
            .set_default("ledger.backoff_initial_ms", 100)?
            .set_default("ledger.backoff_max_ms", 500)?
            .set_default("ledger.backoff_multiplier", 2.0)?
            .set_default("fulfillment.redelivery_delay_ms", 10000)?
            .set_default("fulfillment.max_redeliveries", 100)?;

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        } else {
            builder = builder.add_source(
                File::with_name(&format!("config/{}", environment)).required(false),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("FULFILLMENT_ENGINE")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("nats.partitions")
                .try_parsing(true),
        );

        if let Ok(nats_url) = env::var("NATS_URL") {
            builder = builder.set_override("nats.url", nats_url)?;
        }

        if let Ok(url) = env::var("LEDGER_POST_TRANSACTION_URL") {
            builder = builder.set_override("ledger.post_transaction_url", url)?;
        }

        if let Ok(url) = env::var("LEDGER_COMMIT_RESERVATION_URL") {
            builder = builder.set_override("ledger.commit_reservation_url", url)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.nats.url.is_empty() {
            return Err("NATS URL is required".to_string());
        }

        if self.nats.inbound_subject.is_empty() || self.nats.dead_letter_subject.is_empty() {
            return Err("Inbound and dead letter subjects are required".to_string());
        }

        // Stream subjects may not overlap in either direction
        let inbound_prefix = format!("{}.", self.nats.inbound_subject);
        let dead_letter_prefix = format!("{}.", self.nats.dead_letter_subject);
        if self.nats.inbound_subject == self.nats.dead_letter_subject
            || self.nats.dead_letter_subject.starts_with(&inbound_prefix)
            || self.nats.inbound_subject.starts_with(&dead_letter_prefix)
        {
            return Err("Inbound and dead letter subjects cannot overlap".to_string());
        }

        // Keys are published as a single subject token, partitions must match that form
        if let Some(partition) = self
            .nats
            .partitions
            .iter()
            .find(|p| message_bus::client::subject_token(p) != **p)
        {
            return Err(format!("Partition '{}' is not a single subject token", partition));
        }

        if self.ledger.ait_id.is_empty() {
            return Err("Ledger AIT id is required".to_string());
        }

        if self.ledger.post_transaction_url.is_empty() || self.ledger.commit_reservation_url.is_empty() {
            return Err("Ledger post transaction and commit reservation URLs are required".to_string());
        }

        if self.ledger.max_attempts == 0 {
            return Err("Ledger max attempts must be at least 1".to_string());
        }

        if self.ledger.backoff_max_ms < self.ledger.backoff_initial_ms {
            return Err("Ledger max backoff cannot be below the initial backoff".to_string());
        }

        if self.ledger.backoff_multiplier < 1.0 {
            return Err("Ledger backoff multiplier must be at least 1.0".to_string());
        }

        Ok(())
    }
}

impl NatsConfig {
    pub fn client_config(&self) -> message_bus::NatsConfig {
        message_bus::NatsConfig {
            url: self.url.clone(),
            client_name: self.durable_prefix.clone(),
            ..Default::default()
        }
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            publish_timeout: Duration::from_millis(self.publish_timeout_ms),
            max_attempts: self.publish_max_attempts,
            ..Default::default()
        }
    }

    pub fn inbound_stream_spec(&self) -> StreamSpec {
        StreamSpec {
            name: self.inbound_stream.clone(),
            subjects: vec![format!("{}.>", self.inbound_subject)],
            max_age: Duration::from_secs(7 * 24 * 3600),
            description: "Reserved transfers awaiting fulfillment".to_string(),
        }
    }

    pub fn dead_letter_stream_spec(&self) -> StreamSpec {
        StreamSpec {
            name: self.dead_letter_stream.clone(),
            subjects: vec![format!("{}.>", self.dead_letter_subject)],
            max_age: Duration::from_secs(30 * 24 * 3600),
            description: "Transfer fulfillments that need manual inspection".to_string(),
        }
    }

    /// One durable consumer per partition.
    ///
    /// The broker never gives up on a message (`max_deliver = -1`); the
    /// handler decides when redelivery stops.
    pub fn subscriber_configs(&self) -> Vec<SubscriberConfig> {
        let subscriber = |durable_name: String, filter_subject: String| SubscriberConfig {
            stream_name: self.inbound_stream.clone(),
            durable_name,
            filter_subject,
            ack_wait: Duration::from_secs(self.ack_wait_secs),
            max_deliver: -1,
        };

        if self.partitions.is_empty() {
            return vec![subscriber(
                self.durable_prefix.clone(),
                format!("{}.>", self.inbound_subject),
            )];
        }

        self.partitions
            .iter()
            .map(|partition| {
                let token = message_bus::client::subject_token(partition);
                subscriber(
                    format!("{}-{}", self.durable_prefix, token),
                    format!("{}.{}", self.inbound_subject, token),
                )
            })
            .collect()
    }
}

impl LedgerConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.backoff_initial_ms),
            max_backoff: Duration::from_millis(self.backoff_max_ms),
            multiplier: self.backoff_multiplier,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl FulfillmentConfig {
    pub fn redelivery_delay(&self) -> Duration {
        Duration::from_millis(self.redelivery_delay_ms)
    }
}

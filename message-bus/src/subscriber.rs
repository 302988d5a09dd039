//! Durable JetStream subscriber with explicit acknowledgment

use crate::{
    client::NatsClient,
    metrics::{MESSAGE_PROCESS_DURATION, MESSAGE_RECEIVE_TOTAL},
    Error, Result,
};
use async_nats::jetstream::{self, consumer};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// One delivery of one message
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Subject the message was published on
    pub subject: String,

    /// Raw message body
    pub payload: Bytes,

    /// How many times this message has been delivered, starting at 1
    pub delivery_count: u64,
}

/// What the subscriber should tell the broker once a delivery is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Remove the message from the stream for this consumer
    Ack,

    /// Redeliver the message after the given delay
    Nak(Duration),
}

impl Disposition {
    fn label(&self) -> &'static str {
        match self {
            Disposition::Ack => "ack",
            Disposition::Nak(_) => "nak",
        }
    }
}

/// Message handler trait
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one delivery and decide its disposition
    async fn handle(&self, delivery: Delivery) -> Disposition;
}

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Stream to consume from
    pub stream_name: String,

    /// Durable consumer name
    pub durable_name: String,

    /// Subject filter (one partition)
    pub filter_subject: String,

    /// Acknowledgment wait time
    pub ack_wait: Duration,

    /// Max delivery attempts enforced by the broker, -1 for unlimited
    pub max_deliver: i64,
}

/// Message subscriber.
///
/// Messages are handled strictly one at a time, in stream order.
pub struct Subscriber {
    client: NatsClient,
    config: SubscriberConfig,
}

impl Subscriber {
    /// Create new subscriber
    pub fn new(client: NatsClient, config: SubscriberConfig) -> Self {
        Self { client, config }
    }

    /// Consume until the message stream ends
    pub async fn run<H>(&self, handler: Arc<H>) -> Result<()>
    where
        H: MessageHandler + ?Sized,
    {
        info!(
            "Subscribing to JetStream stream: {} (consumer: {}, filter: {})",
            self.config.stream_name, self.config.durable_name, self.config.filter_subject
        );

        let consumer_config = consumer::pull::Config {
            durable_name: Some(self.config.durable_name.clone()),
            filter_subject: self.config.filter_subject.clone(),
            ack_policy: consumer::AckPolicy::Explicit,
            ack_wait: self.config.ack_wait,
            max_deliver: self.config.max_deliver,
            deliver_policy: consumer::DeliverPolicy::All,
            ..Default::default()
        };

        let consumer = self
            .client
            .jetstream()
            .get_stream(&self.config.stream_name)
            .await
            .map_err(|e| Error::Stream(e.to_string()))?
            .get_or_create_consumer(&self.config.durable_name, consumer_config)
            .await
            .map_err(|e| Error::Consumer(e.to_string()))?;

        info!("✅ JetStream consumer {} ready", self.config.durable_name);

        let mut messages = consumer
            .messages()
            .await
            .map_err(|e| Error::Subscribe(e.to_string()))?;

        while let Some(msg) = messages.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    warn!("Error pulling message from {}: {}", self.config.durable_name, e);
                    continue;
                }
            };

            let delivery_count = msg
                .info()
                .map(|info| info.delivered.max(1) as u64)
                .unwrap_or(1);

            let delivery = Delivery {
                subject: msg.subject.to_string(),
                payload: msg.payload.clone(),
                delivery_count,
            };

            let start = Instant::now();
            let disposition = handler.handle(delivery).await;

            MESSAGE_PROCESS_DURATION
                .with_label_values(&[self.config.durable_name.as_str()])
                .observe(start.elapsed().as_secs_f64());
            MESSAGE_RECEIVE_TOTAL
                .with_label_values(&[self.config.durable_name.as_str(), disposition.label()])
                .inc();

            let outcome = match disposition {
                Disposition::Ack => msg.ack().await,
                Disposition::Nak(delay) => msg.ack_with(jetstream::AckKind::Nak(Some(delay))).await,
            };

            // A lost ack only means the message comes back again.
            if let Err(e) = outcome {
                error!(
                    "Failed to {} message on {}: {}",
                    disposition.label(),
                    msg.subject,
                    e
                );
            }
        }

        warn!("⚠️ JetStream consumer {} stream ended", self.config.durable_name);
        Ok(())
    }
}

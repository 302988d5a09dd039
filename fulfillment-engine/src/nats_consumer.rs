// NATS consumer for transfer fulfillment.
// Decodes and validates each delivery, drives the ledger, and decides
// ack / nak / dead-letter-then-ack. Nothing else talks to the broker's ack API.

use crate::config::FulfillmentConfig;
use crate::dead_letter::{DeadLetterPublisher, DeadLetterRecord};
use crate::errors::{FailureKind, FulfillmentError};
use crate::ledger_client::LedgerApi;
use crate::metrics::{END_TO_END_SECONDS, FULFILLMENT_OUTCOMES_TOTAL};
use crate::models::FulfillmentMessage;
use crate::orchestrator::FulfillmentService;
use crate::validator::validate;
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use message_bus::{Delivery, Disposition, MessageHandler, NatsClient, Subscriber, SubscriberConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct FulfillmentSettings {
    /// Delay before a transient failure is redelivered
    pub redelivery_delay: Duration,
    /// Redeliveries allowed before a transient failure is dead-lettered, 0 = unlimited
    pub max_redeliveries: u64,
}

impl Default for FulfillmentSettings {
    fn default() -> Self {
        Self {
            redelivery_delay: Duration::from_millis(10_000),
            max_redeliveries: 100,
        }
    }
}

impl From<&FulfillmentConfig> for FulfillmentSettings {
    fn from(config: &FulfillmentConfig) -> Self {
        Self {
            redelivery_delay: config.redelivery_delay(),
            max_redeliveries: config.max_redeliveries,
        }
    }
}

pub struct FulfillmentConsumer {
    service: FulfillmentService,
    dead_letters: Arc<dyn DeadLetterPublisher>,
    settings: FulfillmentSettings,
}

impl FulfillmentConsumer {
    pub fn new(
        ledger: Arc<dyn LedgerApi>,
        dead_letters: Arc<dyn DeadLetterPublisher>,
        settings: FulfillmentSettings,
    ) -> Self {
        Self {
            service: FulfillmentService::new(ledger),
            dead_letters,
            settings,
        }
    }

    /// Delivery `n` is redelivery `n - 1`.
    fn redeliveries_exhausted(&self, delivery_count: u64) -> bool {
        self.settings.max_redeliveries > 0 && delivery_count > self.settings.max_redeliveries
    }

    fn redeliver(&self) -> Disposition {
        FULFILLMENT_OUTCOMES_TOTAL.with_label_values(&["redelivery"]).inc();
        Disposition::Nak(self.settings.redelivery_delay)
    }

    /// Publish the record, then ack. A failed publish leaves the message for redelivery.
    async fn dead_letter(&self, record: DeadLetterRecord) -> Disposition {
        match self.dead_letters.publish(&record).await {
            Ok(()) => {
                FULFILLMENT_OUTCOMES_TOTAL.with_label_values(&["dead_lettered"]).inc();
                Disposition::Ack
            }
            Err(e) => {
                error!(
                    correlation_id = ?record.correlation_id,
                    "Dead letter publish failed, message will be redelivered: {}", e
                );
                FULFILLMENT_OUTCOMES_TOTAL
                    .with_label_values(&["dead_letter_failed"])
                    .inc();
                Disposition::Nak(self.settings.redelivery_delay)
            }
        }
    }

    fn record_for(
        message: &FulfillmentMessage,
        error: &FulfillmentError,
        kind: FailureKind,
        description: String,
        delivery: &Delivery,
    ) -> DeadLetterRecord {
        warn!(
            correlation_id = ?message.correlation_id,
            "Dead-lettering {} failure: {}", kind, error
        );
        DeadLetterRecord::new(
            message.payload.clone(),
            description,
            kind,
            message.correlation_id.clone(),
            delivery.delivery_count,
        )
    }
}

#[async_trait]
impl MessageHandler for FulfillmentConsumer {
    async fn handle(&self, delivery: Delivery) -> Disposition {
        let message = match FulfillmentMessage::from_bytes(&delivery.payload) {
            Ok(message) => message,
            Err(e) => {
                let error = FulfillmentError::Decode(e.to_string());
                warn!(subject = %delivery.subject, "{}", error);
                let record = DeadLetterRecord::undecodable(
                    &delivery.payload,
                    error.to_string(),
                    delivery.delivery_count,
                );
                return self.dead_letter(record).await;
            }
        };

        let (trace, order) = match validate(&message) {
            Ok(validated) => validated,
            Err(e) => {
                let error = FulfillmentError::from(e);
                let record = Self::record_for(
                    &message,
                    &error,
                    error.kind(),
                    error.to_string(),
                    &delivery,
                );
                return self.dead_letter(record).await;
            }
        };

        info!(
            correlation_id = %trace.correlation_id,
            request_uuid = %order.request_uuid,
            delivery = delivery.delivery_count,
            "Fulfilling transfer of {} from {} to {}",
            order.transaction_amount, order.from_account_number, order.to_account_number
        );

        match self.service.transfer_funds(&trace, &order).await {
            Ok(()) => {
                if let Some(created) = message.message_creation_time {
                    observe_latency(created);
                }
                FULFILLMENT_OUTCOMES_TOTAL.with_label_values(&["completed"]).inc();
                info!(
                    correlation_id = %trace.correlation_id,
                    request_uuid = %order.request_uuid,
                    "Transfer fulfilled"
                );
                Disposition::Ack
            }
            Err(e) if e.is_transient() && !self.redeliveries_exhausted(delivery.delivery_count) => {
                warn!(
                    correlation_id = %trace.correlation_id,
                    request_uuid = %order.request_uuid,
                    "Transient failure on delivery {}, redelivering in {:?}: {}",
                    delivery.delivery_count, self.settings.redelivery_delay, e
                );
                self.redeliver()
            }
            Err(e) if e.is_transient() => {
                let description = format!(
                    "Redelivery limit of {} reached: {}",
                    self.settings.max_redeliveries, e
                );
                let record = Self::record_for(&message, &e, FailureKind::Transient, description, &delivery);
                self.dead_letter(record).await
            }
            Err(e) => {
                let record = Self::record_for(&message, &e, e.kind(), e.to_string(), &delivery);
                self.dead_letter(record).await
            }
        }
    }
}

fn observe_latency(created: NaiveDateTime) {
    let elapsed = Utc::now().naive_utc() - created;
    let seconds = elapsed.num_milliseconds().max(0) as f64 / 1000.0;
    END_TO_END_SECONDS.observe(seconds);
}

/// Spawn one sequential consumer task per partition.
pub fn start_consumers(
    client: NatsClient,
    subscribers: Vec<SubscriberConfig>,
    handler: Arc<FulfillmentConsumer>,
) -> Vec<JoinHandle<()>> {
    subscribers
        .into_iter()
        .map(|config| {
            let client = client.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                let durable_name = config.durable_name.clone();
                info!("🔄 Fulfillment consumer {} starting", durable_name);

                match Subscriber::new(client, config).run(handler).await {
                    Ok(()) => warn!("⚠️ Fulfillment consumer {} ended", durable_name),
                    Err(e) => error!("❌ Fulfillment consumer {} failed: {}", durable_name, e),
                }
            })
        })
        .collect()
}

//! Dead-letter channel for fulfillments that cannot complete

use crate::errors::{FailureKind, Result};
use crate::models::TransferFulfillmentRequest;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use message_bus::Publisher;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Dead letter record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterRecord {
    /// Payload as received, when the envelope could be decoded
    pub original_payload: Option<TransferFulfillmentRequest>,
    /// Raw body, kept only when the envelope could not be decoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_message: Option<String>,
    pub failure_description: String,
    pub failure_kind: String,
    pub correlation_id: Option<String>,
    pub delivery_attempt: u64,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    pub fn new(
        original_payload: Option<TransferFulfillmentRequest>,
        failure_description: impl Into<String>,
        failure_kind: FailureKind,
        correlation_id: Option<String>,
        delivery_attempt: u64,
    ) -> Self {
        Self {
            original_payload,
            raw_message: None,
            failure_description: failure_description.into(),
            failure_kind: failure_kind.to_string(),
            correlation_id,
            delivery_attempt,
            failed_at: Utc::now(),
        }
    }

    /// Record for a body that never decoded into an envelope
    pub fn undecodable(raw: &[u8], failure_description: impl Into<String>, delivery_attempt: u64) -> Self {
        Self {
            raw_message: Some(String::from_utf8_lossy(raw).into_owned()),
            ..Self::new(None, failure_description, FailureKind::Permanent, None, delivery_attempt)
        }
    }

    /// Deduplication id, stable across publish retries of the same failure.
    /// Undecodable bodies have nothing stable to key on.
    pub fn message_id(&self) -> Option<String> {
        let request = self
            .original_payload
            .as_ref()
            .and_then(|p| p.request_uuid)
            .map(|uuid| uuid.to_string());
        request
            .or_else(|| self.correlation_id.clone())
            .map(|id| format!("{}-{}", id, self.delivery_attempt))
    }

    /// Partition key: the source account
    pub fn key(&self) -> &str {
        self.original_payload
            .as_ref()
            .and_then(|p| p.from_account_number.as_deref())
            .filter(|account| !account.is_empty())
            .unwrap_or("unknown")
    }
}

#[async_trait]
pub trait DeadLetterPublisher: Send + Sync {
    async fn publish(&self, record: &DeadLetterRecord) -> Result<()>;
}

/// Publishes dead letters as pretty JSON to `<subject_prefix>.<source account>`
pub struct NatsDeadLetterPublisher {
    publisher: Publisher,
    subject_prefix: String,
}

impl NatsDeadLetterPublisher {
    pub fn new(publisher: Publisher, subject_prefix: impl Into<String>) -> Self {
        Self {
            publisher,
            subject_prefix: subject_prefix.into(),
        }
    }
}

#[async_trait]
impl DeadLetterPublisher for NatsDeadLetterPublisher {
    async fn publish(&self, record: &DeadLetterRecord) -> Result<()> {
        let body = serde_json::to_vec_pretty(record).map_err(message_bus::Error::from)?;
        let message_id = record.message_id();

        match self
            .publisher
            .publish_keyed(
                &self.subject_prefix,
                record.key(),
                message_id.as_deref(),
                Bytes::from(body),
            )
            .await
        {
            Ok(()) => {
                info!(
                    "Dead letter published for account {} ({})",
                    record.key(),
                    record.failure_kind
                );
                Ok(())
            }
            Err(e) => {
                error!("Failed to publish dead letter for account {}: {}", record.key(), e);
                Err(e.into())
            }
        }
    }
}

//! Traceable message envelope

use chrono::NaiveDateTime;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Envelope carried on every inbound subject.
///
/// Every field is optional on the wire; consumers decide which ones are
/// mandatory for their payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceableMessage<T> {
    /// Application id of the producer
    #[serde(default)]
    pub producer_ait: Option<String>,

    /// Correlation ID (for tracing)
    #[serde(default)]
    pub correlation_id: Option<String>,

    /// Business taxonomy id
    #[serde(default)]
    pub business_taxonomy_id: Option<String>,

    /// Local time the producer created the message
    #[serde(default)]
    pub message_creation_time: Option<NaiveDateTime>,

    /// Payload
    pub payload: Option<T>,
}

impl<T> TraceableMessage<T> {
    /// Create a fully populated envelope
    pub fn new(
        producer_ait: impl Into<String>,
        correlation_id: impl Into<String>,
        business_taxonomy_id: impl Into<String>,
        payload: T,
    ) -> Self {
        Self {
            producer_ait: Some(producer_ait.into()),
            correlation_id: Some(correlation_id.into()),
            business_taxonomy_id: Some(business_taxonomy_id.into()),
            message_creation_time: Some(chrono::Utc::now().naive_utc()),
            payload: Some(payload),
        }
    }
}

impl<T: Serialize> TraceableMessage<T> {
    /// Serialize to bytes
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl<T: DeserializeOwned> TraceableMessage<T> {
    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// Ledger client - the two ledger operations a fulfillment needs, on top of
// the remote call executor.

use crate::config::LedgerConfig;
use crate::errors::{FulfillmentError, Result};
use crate::metrics::LEDGER_CALLS_TOTAL;
use crate::models::{
    CommitReservationRequest, CommitResult, LedgerOutcome, RecordTransactionRequest,
    TimedResponse, TraceContext, TransactionResult, LEDGER_API_VERSION,
};
use crate::retry_strategy::{RemoteCall, RemoteCallExecutor};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use tracing::{debug, warn};

pub const RECORD_TRANSACTION: &str = "recordTransaction";
pub const COMMIT_RESERVATION: &str = "commitReservation";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerApi: Send + Sync {
    /// Credit the destination account.
    async fn record_transaction(
        &self,
        trace: &TraceContext,
        request: &RecordTransactionRequest,
    ) -> Result<TransactionResult>;

    /// Debit the source reservation.
    async fn commit_reservation(
        &self,
        trace: &TraceContext,
        request: &CommitReservationRequest,
    ) -> Result<CommitResult>;
}

pub struct HttpLedgerClient {
    http: Client,
    executor: RemoteCallExecutor,
    ait_id: String,
    post_transaction_url: String,
    commit_reservation_url: String,
}

impl HttpLedgerClient {
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| FulfillmentError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            executor: RemoteCallExecutor::new(config.retry_policy()),
            ait_id: config.ait_id.clone(),
            post_transaction_url: config.post_transaction_url.clone(),
            commit_reservation_url: config.commit_reservation_url.clone(),
        })
    }

    fn headers(&self, operation: &str, trace: &TraceContext) -> Result<HeaderMap> {
        let value = |v: &str| {
            HeaderValue::from_str(v).map_err(|e| {
                FulfillmentError::permanent_remote(operation, format!("Invalid header value {:?}: {}", v, e))
            })
        };

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("ait-id"), value(&self.ait_id)?);
        headers.insert(
            HeaderName::from_static("business-taxonomy-id"),
            value(&trace.business_taxonomy_id)?,
        );
        headers.insert(HeaderName::from_static("correlation-id"), value(&trace.correlation_id)?);
        headers.insert(
            HeaderName::from_static("accept-version"),
            HeaderValue::from_static(LEDGER_API_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn call_service<M, R>(
        &self,
        operation: &'static str,
        url: &str,
        trace: &TraceContext,
        request: &M,
    ) -> Result<R>
    where
        M: Serialize,
        R: DeserializeOwned + LedgerOutcome + Debug,
    {
        let body = serde_json::to_vec(request).map_err(|e| {
            FulfillmentError::permanent_remote(operation, format!("Failed to serialize request: {}", e))
        })?;

        let call = RemoteCall {
            operation,
            method: Method::POST,
            url: url.to_string(),
            headers: self.headers(operation, trace)?,
            body: Bytes::from(body),
            expected_status: StatusCode::CREATED,
        };

        let result = self
            .executor
            .send(&self.http, &call)
            .await
            .and_then(|body| decode_outcome::<R>(operation, url, &body));

        let label = match &result {
            Ok(_) => "success",
            Err(e) if e.is_transient() => "transient",
            Err(_) => "permanent",
        };
        LEDGER_CALLS_TOTAL.with_label_values(&[operation, label]).inc();

        match &result {
            Ok(outcome) => debug!(
                correlation_id = %trace.correlation_id,
                "{} applied: {:?}", operation, outcome
            ),
            Err(e) => warn!(
                correlation_id = %trace.correlation_id,
                "{} failed: {}", operation, e
            ),
        }

        result
    }
}

/// A 201 is only a success when the body carries an applied status.
fn decode_outcome<R>(operation: &str, url: &str, body: &[u8]) -> Result<R>
where
    R: DeserializeOwned + LedgerOutcome,
{
    let response: TimedResponse<R> = serde_json::from_slice(body).map_err(|e| {
        FulfillmentError::permanent_remote(
            operation,
            format!("Unexpected return from {}: {} ({})", url, String::from_utf8_lossy(body), e),
        )
    })?;

    if !response.payload.status().is_applied() {
        return Err(FulfillmentError::permanent_remote(
            operation,
            format!("Unexpected return from {}: {}", url, String::from_utf8_lossy(body)),
        ));
    }

    Ok(response.payload)
}

#[async_trait]
impl LedgerApi for HttpLedgerClient {
    async fn record_transaction(
        &self,
        trace: &TraceContext,
        request: &RecordTransactionRequest,
    ) -> Result<TransactionResult> {
        self.call_service(RECORD_TRANSACTION, &self.post_transaction_url, trace, request)
            .await
    }

    async fn commit_reservation(
        &self,
        trace: &TraceContext,
        request: &CommitReservationRequest,
    ) -> Result<CommitResult> {
        self.call_service(COMMIT_RESERVATION, &self.commit_reservation_url, trace, request)
            .await
    }
}

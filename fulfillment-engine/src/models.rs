use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Schema version this service accepts on the inbound subject
pub const TRANSFER_FULFILLMENT_VERSION: &str = "1_0";

/// Version sent to the ledger in the `accept-version` header
pub const LEDGER_API_VERSION: &str = "1_0";

pub type FulfillmentMessage = message_bus::TraceableMessage<TransferFulfillmentRequest>;

/// Inbound payload as it appears on the wire. Everything is optional so the
/// validator can name exactly what is missing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferFulfillmentRequest {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub from_account_number: Option<String>,
    #[serde(default)]
    pub to_account_number: Option<String>,
    #[serde(default)]
    pub request_uuid: Option<Uuid>,
    #[serde(default)]
    pub reservation_uuid: Option<Uuid>,
    #[serde(default)]
    pub transaction_amount: i64,
    #[serde(default)]
    pub transaction_meta_data_json: Option<String>,
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct FulfillmentOrder {
    pub from_account_number: String,
    pub to_account_number: String,
    pub request_uuid: Uuid,
    pub reservation_uuid: Uuid,
    pub transaction_amount: i64,
    pub transaction_meta_data_json: String,
}

/// Trace metadata forwarded to the ledger on every call.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceContext {
    pub producer_ait: String,
    pub correlation_id: String,
    pub business_taxonomy_id: String,
}

/// Credits the destination account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordTransactionRequest {
    pub account_number: String,
    pub debit_card_number: Option<String>,
    pub request_uuid: Uuid,
    pub transaction_amount: i64,
    pub transaction_meta_data_json: String,
}

impl RecordTransactionRequest {
    pub fn credit_destination(order: &FulfillmentOrder) -> Self {
        Self {
            account_number: order.to_account_number.clone(),
            debit_card_number: None,
            request_uuid: order.request_uuid,
            transaction_amount: order.transaction_amount,
            transaction_meta_data_json: order.transaction_meta_data_json.clone(),
        }
    }
}

/// Commits the source reservation; the amount is negated to debit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReservationRequest {
    pub request_uuid: Uuid,
    pub reservation_uuid: Uuid,
    pub transaction_amount: i64,
    pub transaction_meta_data_json: String,
}

impl CommitReservationRequest {
    pub fn debit_reservation(order: &FulfillmentOrder) -> Self {
        Self {
            request_uuid: order.request_uuid,
            reservation_uuid: order.reservation_uuid,
            transaction_amount: -order.transaction_amount,
            transaction_meta_data_json: order.transaction_meta_data_json.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerStatus {
    Success,
    AlreadyApplied,
    #[serde(other)]
    Other,
}

impl LedgerStatus {
    /// `ALREADY_APPLIED` is how the ledger reports a replay of an
    /// idempotency key that already completed.
    pub fn is_applied(&self) -> bool {
        matches!(self, LedgerStatus::Success | LedgerStatus::AlreadyApplied)
    }
}

/// Ledger resource echoed back for audit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResource {
    #[serde(default)]
    pub transaction_uuid: Option<Uuid>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub debit_card_number: Option<String>,
    #[serde(default)]
    pub transaction_amount: Option<i64>,
    #[serde(default)]
    pub running_balance_amount: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResult {
    pub status: LedgerStatus,
    #[serde(default)]
    pub transactions: Vec<TransactionResource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResult {
    pub status: LedgerStatus,
    #[serde(default)]
    pub resource: Option<TransactionResource>,
}

/// Ledger response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedResponse<T> {
    #[serde(default)]
    pub service_time_elapsed: u64,
    pub payload: T,
}

/// Implemented by ledger results so the client can check them uniformly.
pub trait LedgerOutcome {
    fn status(&self) -> LedgerStatus;
}

impl LedgerOutcome for TransactionResult {
    fn status(&self) -> LedgerStatus {
        self.status
    }
}

impl LedgerOutcome for CommitResult {
    fn status(&self) -> LedgerStatus {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order() -> FulfillmentOrder {
        FulfillmentOrder {
            from_account_number: "237489237492".to_string(),
            to_account_number: "8923478923".to_string(),
            request_uuid: Uuid::new_v4(),
            reservation_uuid: Uuid::new_v4(),
            transaction_amount: 100,
            transaction_meta_data_json: "{}".to_string(),
        }
    }

    #[test]
    fn test_record_request_credits_destination() {
        let order = order();
        let request = RecordTransactionRequest::credit_destination(&order);

        assert_eq!(request.account_number, order.to_account_number);
        assert_eq!(request.transaction_amount, 100);
        assert_eq!(request.request_uuid, order.request_uuid);
        assert!(request.debit_card_number.is_none());
    }

    #[test]
    fn test_commit_request_debits_reservation() {
        let order = order();
        let request = CommitReservationRequest::debit_reservation(&order);

        assert_eq!(request.transaction_amount, -100);
        assert_eq!(request.request_uuid, order.request_uuid);
        assert_eq!(request.reservation_uuid, order.reservation_uuid);
    }

    #[test]
    fn test_ledger_status_decoding() {
        let success: TransactionResult = serde_json::from_value(json!({"status": "SUCCESS"})).unwrap();
        let replay: CommitResult = serde_json::from_value(json!({"status": "ALREADY_APPLIED"})).unwrap();
        let other: CommitResult = serde_json::from_value(json!({"status": "INSUFFICIENT_FUNDS"})).unwrap();

        assert!(success.status.is_applied());
        assert!(replay.status.is_applied());
        assert_eq!(other.status, LedgerStatus::Other);
        assert!(!other.status.is_applied());
    }

    #[test]
    fn test_timed_response_decoding() {
        let body = json!({
            "serviceTimeElapsed": 123456,
            "payload": {
                "status": "SUCCESS",
                "transactions": [{"accountNumber": "12345679", "debitCardNumber": "7823478239467"}]
            }
        });

        let response: TimedResponse<TransactionResult> = serde_json::from_value(body).unwrap();
        assert_eq!(response.service_time_elapsed, 123456);
        assert_eq!(
            response.payload.transactions[0].account_number.as_deref(),
            Some("12345679")
        );
    }
}

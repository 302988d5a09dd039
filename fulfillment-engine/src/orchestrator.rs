use crate::errors::Result;
use crate::ledger_client::LedgerApi;
use crate::models::{CommitReservationRequest, FulfillmentOrder, RecordTransactionRequest, TraceContext};
use std::sync::Arc;
use tracing::info;

/// Drives one fulfillment through the ledger: credit the destination, then
/// commit the source reservation. There is no local compensation; a failed
/// sequence is replayed as a whole on redelivery.
pub struct FulfillmentService {
    ledger: Arc<dyn LedgerApi>,
}

impl FulfillmentService {
    pub fn new(ledger: Arc<dyn LedgerApi>) -> Self {
        Self { ledger }
    }

    pub async fn transfer_funds(&self, trace: &TraceContext, order: &FulfillmentOrder) -> Result<()> {
        let record = RecordTransactionRequest::credit_destination(order);
        let recorded = self.ledger.record_transaction(trace, &record).await?;
        info!(
            correlation_id = %trace.correlation_id,
            request_uuid = %order.request_uuid,
            "Credited {} to account {} ({:?})",
            order.transaction_amount, order.to_account_number, recorded.status
        );

        let commit = CommitReservationRequest::debit_reservation(order);
        let committed = self.ledger.commit_reservation(trace, &commit).await?;
        info!(
            correlation_id = %trace.correlation_id,
            request_uuid = %order.request_uuid,
            "Committed reservation {} on account {} ({:?})",
            order.reservation_uuid, order.from_account_number, committed.status
        );

        Ok(())
    }
}

// Message validation - envelope metadata first, then the payload.
// Pure: no I/O, first violation wins.

use crate::errors::ValidationError;
use crate::models::{
    FulfillmentMessage, FulfillmentOrder, TraceContext, TransferFulfillmentRequest,
    TRANSFER_FULFILLMENT_VERSION,
};

pub fn validate(
    message: &FulfillmentMessage,
) -> Result<(TraceContext, FulfillmentOrder), ValidationError> {
    let trace = validate_envelope(message)?;
    let payload = message
        .payload
        .as_ref()
        .ok_or(ValidationError::missing("Fulfillment Message"))?;
    let order = validate_payload(payload)?;
    Ok((trace, order))
}

fn validate_envelope(message: &FulfillmentMessage) -> Result<TraceContext, ValidationError> {
    let producer_ait = message
        .producer_ait
        .clone()
        .ok_or(ValidationError::missing("Producer AIT Id"))?;
    let correlation_id = message
        .correlation_id
        .clone()
        .ok_or(ValidationError::missing("Correlation Id"))?;
    let business_taxonomy_id = message
        .business_taxonomy_id
        .clone()
        .ok_or(ValidationError::missing("Business Taxonomy Id"))?;
    if message.message_creation_time.is_none() {
        return Err(ValidationError::missing("Message Creation Time"));
    }
    if message.payload.is_none() {
        return Err(ValidationError::missing("Fulfillment Message"));
    }

    Ok(TraceContext {
        producer_ait,
        correlation_id,
        business_taxonomy_id,
    })
}

fn validate_payload(payload: &TransferFulfillmentRequest) -> Result<FulfillmentOrder, ValidationError> {
    if payload.version.as_deref() != Some(TRANSFER_FULFILLMENT_VERSION) {
        return Err(ValidationError::invalid("Version", "unsupported schema version"));
    }
    let from_account_number = non_blank(&payload.from_account_number, "From Account Number")?;
    let to_account_number = non_blank(&payload.to_account_number, "To Account Number")?;
    let request_uuid = payload
        .request_uuid
        .ok_or(ValidationError::missing("Request UUID"))?;
    let reservation_uuid = payload
        .reservation_uuid
        .ok_or(ValidationError::missing("Reservation UUID"))?;
    if payload.transaction_amount <= 0 {
        return Err(ValidationError::invalid(
            "Transaction Amount",
            "must be greater than 0",
        ));
    }
    let transaction_meta_data_json = non_blank(&payload.transaction_meta_data_json, "Meta Data")?;

    Ok(FulfillmentOrder {
        from_account_number,
        to_account_number,
        request_uuid,
        reservation_uuid,
        transaction_amount: payload.transaction_amount,
        transaction_meta_data_json,
    })
}

fn non_blank(value: &Option<String>, field: &'static str) -> Result<String, ValidationError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v.clone()),
        _ => Err(ValidationError::missing(field)),
    }
}

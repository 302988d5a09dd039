//! Fulfillment metrics

use prometheus::{
    register_counter_vec, register_histogram, register_int_counter_vec, CounterVec, Histogram,
    IntCounterVec,
};

lazy_static::lazy_static! {
    /// Terminal outcome per handled delivery (completed, redelivery, dead_lettered, ...)
    pub static ref FULFILLMENT_OUTCOMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "fulfillment_outcomes_total",
        "Handled fulfillment messages by outcome",
        &["outcome"]
    )
    .unwrap();

    pub static ref LEDGER_CALLS_TOTAL: CounterVec = register_counter_vec!(
        "fulfillment_ledger_calls_total",
        "Ledger calls by operation and result",
        &["operation", "result"]
    )
    .unwrap();

    pub static ref LEDGER_CALL_RETRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "fulfillment_ledger_call_retries_total",
        "Ledger call attempts that were retried",
        &["operation"]
    )
    .unwrap();

    /// Time from message creation to terminal outcome
    pub static ref END_TO_END_SECONDS: Histogram = register_histogram!(
        "fulfillment_end_to_end_seconds",
        "Seconds from message creation to fulfillment outcome",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]
    )
    .unwrap();
}

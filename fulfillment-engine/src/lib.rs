pub mod config;
pub mod dead_letter;
pub mod errors;
pub mod handlers;
pub mod ledger_client;
pub mod metrics;
pub mod models;
pub mod nats_consumer;
pub mod orchestrator;
pub mod retry_strategy;
pub mod validator;

pub use config::Config;
pub use errors::{FailureKind, FulfillmentError, Result};

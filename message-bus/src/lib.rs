//! Message Bus with NATS JetStream support
//!
//! Provides durable messaging with:
//! - Traceable message envelopes
//! - One durable pull consumer per partition, explicit ack / delayed nak
//! - Keyed publishing with retry and exponential backoff
//! - Observability via Prometheus metrics

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod client;
pub mod error;
pub mod message;
pub mod metrics;
pub mod publisher;
pub mod subscriber;

pub use client::{NatsClient, NatsConfig, StreamSpec};
pub use error::{Error, Result};
pub use message::TraceableMessage;
pub use publisher::{Publisher, PublisherConfig};
pub use subscriber::{Delivery, Disposition, MessageHandler, Subscriber, SubscriberConfig};

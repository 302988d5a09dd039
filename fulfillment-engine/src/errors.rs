use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FulfillmentError>;

/// Whether retrying the same work later can succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Infrastructure fault, redelivery may succeed
    Transient,
    /// Bad data or rejected business rule, redelivery will not help
    Permanent,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transient => write!(f, "transient"),
            FailureKind::Permanent => write!(f, "permanent"),
        }
    }
}

/// A required envelope or payload field that is missing or out of range.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed message. {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: &'static str,
}

impl ValidationError {
    pub fn missing(field: &'static str) -> Self {
        Self { field, reason: "missing" }
    }

    pub fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self { field, reason }
    }
}

#[derive(Error, Debug)]
pub enum FulfillmentError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Undecodable message: {0}")]
    Decode(String),

    #[error("Exhausted {attempts} attempts for {operation}: {message}")]
    TransientRemote {
        operation: String,
        attempts: u32,
        message: String,
    },

    #[error("Unexpected response from ledger for {operation}: {message}")]
    PermanentRemote { operation: String, message: String },

    #[error("Dead letter publish failed ({kind}): {message}")]
    Publish { kind: FailureKind, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FulfillmentError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FulfillmentError::TransientRemote { .. } => FailureKind::Transient,
            FulfillmentError::Publish { kind, .. } => *kind,
            FulfillmentError::Validation(_)
            | FulfillmentError::Decode(_)
            | FulfillmentError::PermanentRemote { .. }
            | FulfillmentError::Internal(_) => FailureKind::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == FailureKind::Transient
    }

    pub fn permanent_remote(operation: &str, message: impl Into<String>) -> Self {
        FulfillmentError::PermanentRemote {
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}

impl From<message_bus::Error> for FulfillmentError {
    fn from(err: message_bus::Error) -> Self {
        let kind = match err {
            message_bus::Error::Serialization(_) => FailureKind::Permanent,
            _ => FailureKind::Transient,
        };
        FulfillmentError::Publish {
            kind,
            message: err.to_string(),
        }
    }
}

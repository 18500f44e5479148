//! Error types for cadence-core
//!
//! Only configuration can fail. Evaluation never returns an error: anomalies
//! and orphan references are recorded as [`Flag`](crate::Flag)s instead.

use thiserror::Error;

/// A record that could not be accepted into a session
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid clock multiplier: {0} (must be finite and greater than zero)")]
    InvalidMultiplier(f64),

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Malformed record: {0}")]
    Malformed(String),

    #[error("Record has an empty id")]
    EmptyId,

    #[error("Duplicate definition: {0}")]
    DuplicateDefinition(String),

    #[error("Malformed condition #{index}: {reason}")]
    MalformedCondition { index: usize, reason: String },

    #[error("Malformed action #{index}: {reason}")]
    MalformedAction { index: usize, reason: String },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ConfigError>;

/// A rejected record, reported to the host at load time
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// Id of the offending record (may be empty if the record had none)
    pub record_id: String,
    /// Why it was rejected
    pub reason: ConfigError,
}

impl Rejection {
    pub fn new(record_id: impl Into<String>, reason: ConfigError) -> Self {
        Self {
            record_id: record_id.into(),
            reason,
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.record_id, self.reason)
    }
}

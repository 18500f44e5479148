//! Error types for cadence-script

use cadence_core::ConfigError;
use thiserror::Error;

/// File-level loading error
///
/// Bad individual records do not produce an `Error`; they are collected as
/// [`Rejection`](cadence_core::Rejection)s and the load keeps going.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("RON write error: {0}")]
    RonWrite(#[from] ron::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Unrecognized document: {0}")]
    UnknownDocument(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

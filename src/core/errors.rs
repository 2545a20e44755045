// src/core/errors.rs

//! Defines the primary error type for the ingestion pipeline.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing every failure kind the core can observe.
///
/// Per the error handling design, nothing in the pipeline propagates one of
/// these past the processor boundary: every call site that can produce one
/// logs it and continues. The enum exists so call sites can log with the
/// right level and so tests can assert on failure *kind* without matching
/// on strings.
#[derive(Error, Debug, Clone)]
pub enum AcarshubError {
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("transport error on {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("channel closed")]
    ChannelClosed,
}

impl From<std::io::Error> for AcarshubError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for AcarshubError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<sqlx::Error> for AcarshubError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AcarshubError>;

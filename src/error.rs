//! Error types for Fieldpulse

use thiserror::Error;

/// Errors that can occur during reconciliation
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Failed to parse payload: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Unknown profile: {0}")]
    UnknownProfile(uuid::Uuid),

    #[error("Record store request timed out: {0}")]
    StoreTimeout(String),

    #[error("Record store error: {0}")]
    Store(String),
}

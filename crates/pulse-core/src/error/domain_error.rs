//! Domain errors - error types for the domain layer

use thiserror::Error;

/// Domain layer errors
///
/// These cover malformed live-event data. A single malformed event is dropped by
/// the reconciler and logged; it never aborts a stream or corrupts an aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("Unknown sentiment: {0}")]
    UnknownSentiment(String),

    #[error("Unknown alert status: {0}")]
    UnknownStatus(String),

    #[error("Invalid source ID: {0}")]
    InvalidSourceId(String),

    #[error("Missing field in live event: {0}")]
    MissingField(&'static str),

    #[error("Payload does not match event kind: expected {expected}, got {got}")]
    PayloadMismatch {
        expected: &'static str,
        got: &'static str,
    },

    #[error("Malformed wire frame: {0}")]
    MalformedFrame(String),
}

impl DomainError {
    /// Get a stable error code for logs and diagnostics
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownSentiment(_) => "UNKNOWN_SENTIMENT",
            Self::UnknownStatus(_) => "UNKNOWN_STATUS",
            Self::InvalidSourceId(_) => "INVALID_SOURCE_ID",
            Self::MissingField(_) => "MISSING_FIELD",
            Self::PayloadMismatch { .. } => "PAYLOAD_MISMATCH",
            Self::MalformedFrame(_) => "MALFORMED_FRAME",
        }
    }
}

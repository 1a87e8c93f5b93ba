//! Sync layer error types
//!
//! Unified error taxonomy for the real-time core. The classification helpers
//! encode the propagation policy: auth failures are never retried, network
//! failures are retried up to the reconnect cap, per-operation failures are
//! surfaced to the caller that issued the operation.

use pulse_core::DomainError;

/// Errors surfaced by the sync layer
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Identity rejected during the handshake. Never retried; the caller must
    /// re-authenticate.
    #[error("Authentication rejected: {0}")]
    Auth(String),

    /// Transport-level failure; recovered by the bounded reconnect loop.
    #[error("Network error: {0}")]
    Network(String),

    /// Reconnect attempts exhausted; operations pending at that point fail
    /// with this.
    #[error("Connection lost after {attempts} attempts")]
    ConnectionLost { attempts: u32 },

    /// Per-operation acknowledgment deadline passed. The optimistic event is
    /// retained; the caller decides whether to mark it failed or retry.
    #[error("Operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Explicit server-side rejection of an operation.
    #[error("Operation rejected: {0}")]
    Operation(String),

    /// REST fallback failure.
    #[error("REST request failed: {0}")]
    Rest(String),

    /// Inbound data that cannot be interpreted. Dropped locally, non-fatal.
    #[error(transparent)]
    Malformed(#[from] DomainError),

    /// An internal channel closed while a caller was waiting on it.
    #[error("Channel closed before completion")]
    ChannelClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error")]
    Internal(#[source] anyhow::Error),
}

impl SyncError {
    /// Check if the transport layer should retry after this error
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Check if this is an authentication failure
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Check if this failure leaves a caller-owned optimistic event behind
    #[must_use]
    pub fn retains_optimistic_event(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Operation(_))
    }

    /// Create an internal error from any error
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }
}

/// Result type alias for sync layer operations
pub type SyncResult<T> = Result<T, SyncError>;

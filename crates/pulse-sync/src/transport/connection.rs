//! Connection state
//!
//! Holds the live session's observable state: lifecycle phase, retry count, and
//! heartbeat recency. Owned exclusively by the transport client; everything else
//! reads it through accessors.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Lifecycle phase of the live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionState {
    /// No session; also the terminal state after the retry cap is exceeded
    Disconnected,
    /// First connection attempt (including the auth handshake) in progress
    Connecting,
    /// Live and authenticated
    Connected,
    /// Unexpected drop detected; bounded retry loop running
    Reconnecting,
}

/// One client's live session state
pub struct Connection {
    state: RwLock<ConnectionState>,
    /// Identity token presented during the handshake
    token: RwLock<Option<String>>,
    retry_count: RwLock<u32>,
    last_heartbeat: RwLock<Instant>,
}

impl Connection {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ConnectionState::Disconnected),
            token: RwLock::new(None),
            retry_count: RwLock::new(0),
            last_heartbeat: RwLock::new(Instant::now()),
        }
    }

    /// Get the current state
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Set the connection state
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    /// Check whether the session is live
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Check whether a connect or reconnect attempt is already running
    pub fn is_attempting(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Reconnecting
        )
    }

    /// Store the identity token for handshake replay on reconnect
    pub fn set_token(&self, token: String) {
        *self.token.write() = Some(token);
    }

    /// Get the stored identity token
    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    /// Clear the identity token (logout)
    pub fn clear_token(&self) {
        *self.token.write() = None;
    }

    /// Get the current retry attempt count
    pub fn retry_count(&self) -> u32 {
        *self.retry_count.read()
    }

    /// Record a retry attempt
    pub fn set_retry_count(&self, count: u32) {
        *self.retry_count.write() = count;
    }

    /// Reset the retry counter (on successful connection)
    pub fn reset_retries(&self) {
        *self.retry_count.write() = 0;
    }

    /// Record a heartbeat received from the server
    pub fn record_heartbeat(&self) {
        *self.last_heartbeat.write() = Instant::now();
    }

    /// Time since the last recorded heartbeat
    pub fn time_since_heartbeat(&self) -> Duration {
        self.last_heartbeat.read().elapsed()
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("retry_count", &self.retry_count())
            .finish()
    }
}

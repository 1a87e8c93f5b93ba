//! Channel kind - which live stream of an event a subscription covers

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two per-event live channels
///
/// At most one active subscription per (event, kind) pair exists on a connection;
/// the membership registry enforces this with reference counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Feedback and chat stream
    Feed,
    /// Active-alert stream
    Alerts,
}

impl ChannelKind {
    /// Get the wire name of this channel kind
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Feed => "feed",
            Self::Alerts => "alerts",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

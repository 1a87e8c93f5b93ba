//! Outbound control messages

use pulse_core::{AlertStatus, EventId, SourceId};
use serde::{Deserialize, Serialize};

/// Payload of a `submit-feedback` message
///
/// Carries the caller's `source_id` so any transport echo or REST response can
/// be correlated back to the optimistic copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitFeedback {
    pub event_id: EventId,
    pub text: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub username: String,
    pub source_id: SourceId,
}

/// Payload of an `update-alert` message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAlert {
    pub alert_id: String,
    pub event_id: EventId,
    pub status: AlertStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub source_id: SourceId,
}

/// Messages the client sends over the live channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Authentication handshake, first frame after connect
    Identify { token: String },
    /// Join an event's feedback/chat feed
    JoinEvent { event_id: EventId },
    /// Leave an event's feedback/chat feed
    LeaveEvent { event_id: EventId },
    /// Subscribe to an event's alert stream
    SubscribeAlerts { event_id: EventId },
    /// Unsubscribe from an event's alert stream
    UnsubscribeAlerts { event_id: EventId },
    SubmitFeedback(SubmitFeedback),
    UpdateAlert(UpdateAlert),
}

impl ClientMessage {
    /// Serialize to a JSON wire frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Get the wire name of this message
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Identify { .. } => "identify",
            Self::JoinEvent { .. } => "join-event",
            Self::LeaveEvent { .. } => "leave-event",
            Self::SubscribeAlerts { .. } => "subscribe-alerts",
            Self::UnsubscribeAlerts { .. } => "unsubscribe-alerts",
            Self::SubmitFeedback(_) => "submit-feedback",
            Self::UpdateAlert(_) => "update-alert",
        }
    }
}

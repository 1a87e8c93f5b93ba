//! Live events - feedback items, alerts, and alert updates flowing through the
//! real-time channel
//!
//! A `LiveEvent` exists in two origins: `LocalPending` (the optimistic copy
//! published the instant the user acts) and `ServerConfirmed` (the copy carried
//! by a server broadcast). For one `SourceId`, at most one live event is ever
//! presented downstream; a confirmed copy replaces the pending one in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{AlertStatus, EventId, Sentiment, SourceId};

/// Where a live event copy came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    /// Optimistic local echo, not yet acknowledged by the server
    LocalPending,
    /// Carried by a server broadcast or REST response
    ServerConfirmed,
}

/// Body of a feedback live event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackBody {
    pub text: String,
    /// Assigned server-side; the optimistic copy carries None until confirmed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub username: String,
}

/// Body of an alert-created live event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertBody {
    pub alert_id: String,
    pub status: AlertStatus,
    pub severity: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Patch carried by an alert-updated live event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertPatch {
    pub alert_id: String,
    pub status: AlertStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Payload of a live event, discriminated by kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LivePayload {
    Feedback(FeedbackBody),
    AlertCreated(AlertBody),
    AlertUpdated(AlertPatch),
}

impl LivePayload {
    /// Get the kind name of this payload
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Feedback(_) => "feedback",
            Self::AlertCreated(_) => "alert-created",
            Self::AlertUpdated(_) => "alert-updated",
        }
    }
}

/// The unit of real-time data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveEvent {
    pub source_id: SourceId,
    pub event_id: EventId,
    pub payload: LivePayload,
    pub origin: Origin,
    pub created_at: DateTime<Utc>,
}

impl LiveEvent {
    /// Create a local-pending live event (the optimistic copy)
    #[must_use]
    pub fn local_pending(source_id: SourceId, event_id: EventId, payload: LivePayload) -> Self {
        Self {
            source_id,
            event_id,
            payload,
            origin: Origin::LocalPending,
            created_at: Utc::now(),
        }
    }

    /// Create a server-confirmed live event
    #[must_use]
    pub fn server_confirmed(
        source_id: SourceId,
        event_id: EventId,
        payload: LivePayload,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source_id,
            event_id,
            payload,
            origin: Origin::ServerConfirmed,
            created_at,
        }
    }

    /// Check whether this copy is server-confirmed
    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        matches!(self.origin, Origin::ServerConfirmed)
    }

    /// Get the kind name of this event
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        self.payload.kind()
    }

    /// Check whether this event belongs to the alerts channel
    ///
    /// Feedback flows on the feed channel; alert creation and updates flow on
    /// the alerts channel.
    #[must_use]
    pub const fn is_alert(&self) -> bool {
        matches!(
            self.payload,
            LivePayload::AlertCreated(_) | LivePayload::AlertUpdated(_)
        )
    }
}

//! Inbound server messages
//!
//! Broadcast payloads carry sentiment and status as raw strings; converting a
//! broadcast into a typed `LiveEvent` is where unknown keys surface as
//! `DomainError`, so a single bad message can be dropped without failing the
//! whole frame stream.

use chrono::{DateTime, Utc};
use pulse_core::{
    AlertBody, AlertPatch, DomainError, EventId, FeedbackBody, LiveEvent, LivePayload, Sentiment,
    SourceId,
};
use serde::{Deserialize, Serialize};

/// Payload of a `new-feedback` broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFeedback {
    pub event_id: EventId,
    pub source_id: SourceId,
    pub text: String,
    pub sentiment: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Payload of a `new-alert` broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAlert {
    pub event_id: EventId,
    pub source_id: SourceId,
    pub alert_id: String,
    pub status: String,
    pub severity: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Payload of an `alert-updated` broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertUpdated {
    pub event_id: EventId,
    pub source_id: SourceId,
    pub alert_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Messages the server sends over the live channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    NewFeedback(NewFeedback),
    NewAlert(NewAlert),
    AlertUpdated(AlertUpdated),
    /// Ack for a `submit-feedback` operation
    FeedbackReceived { source_id: SourceId },
    /// Ack for an `update-alert` operation
    AlertUpdateConfirmed { source_id: SourceId },
    /// Liveness signal
    Heartbeat { timestamp: i64 },
    /// Number of clients currently connected
    ConnectionCount { count: u32 },
    /// Handshake success
    Ready,
    /// Server-side failure; `source_id` is set for per-operation rejections
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        source_id: Option<SourceId>,
    },
}

impl ServerMessage {
    /// Deserialize from a JSON wire frame
    pub fn from_json(json: &str) -> Result<Self, DomainError> {
        serde_json::from_str(json).map_err(|e| DomainError::MalformedFrame(e.to_string()))
    }

    /// Serialize to a JSON wire frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Convert a broadcast into a server-confirmed live event
    ///
    /// Returns Ok(None) for non-broadcast messages (acks, heartbeats, errors).
    /// Returns Err for a broadcast carrying an unknown sentiment or status key;
    /// the caller drops that single event and logs it.
    pub fn into_live_event(self) -> Result<Option<LiveEvent>, DomainError> {
        match self {
            Self::NewFeedback(body) => {
                let sentiment: Sentiment = body.sentiment.parse()?;
                Ok(Some(LiveEvent::server_confirmed(
                    body.source_id,
                    body.event_id,
                    LivePayload::Feedback(FeedbackBody {
                        text: body.text,
                        sentiment: Some(sentiment),
                        source: body.source,
                        location: body.location,
                        username: body.username,
                    }),
                    body.created_at,
                )))
            }
            Self::NewAlert(body) => {
                let status = body.status.parse()?;
                Ok(Some(LiveEvent::server_confirmed(
                    body.source_id,
                    body.event_id,
                    LivePayload::AlertCreated(AlertBody {
                        alert_id: body.alert_id,
                        status,
                        severity: body.severity,
                        message: body.message,
                        note: body.note,
                    }),
                    body.created_at,
                )))
            }
            Self::AlertUpdated(body) => {
                let status = body.status.parse()?;
                Ok(Some(LiveEvent::server_confirmed(
                    body.source_id,
                    body.event_id,
                    LivePayload::AlertUpdated(AlertPatch {
                        alert_id: body.alert_id,
                        status,
                        note: body.note,
                    }),
                    body.updated_at,
                )))
            }
            _ => Ok(None),
        }
    }
}

//! Test fixtures and data generators
//!
//! Builders for server broadcasts and outbound drafts.

use chrono::Utc;
use pulse_core::{AlertStatus, EventId, SourceId};
use pulse_sync::protocol::{AlertUpdated, NewAlert, NewFeedback, ServerMessage};
use pulse_sync::{AlertStatusChange, FeedbackDraft};

/// A `new-feedback` broadcast
pub fn feedback_broadcast(
    event_id: &EventId,
    source_id: SourceId,
    text: &str,
    sentiment: &str,
) -> ServerMessage {
    ServerMessage::NewFeedback(NewFeedback {
        event_id: event_id.clone(),
        source_id,
        text: text.to_string(),
        sentiment: sentiment.to_string(),
        source: "app".to_string(),
        location: None,
        username: "ada".to_string(),
        created_at: Utc::now(),
    })
}

/// A `new-alert` broadcast
pub fn alert_broadcast(event_id: &EventId, source_id: SourceId, alert_id: &str) -> ServerMessage {
    ServerMessage::NewAlert(NewAlert {
        event_id: event_id.clone(),
        source_id,
        alert_id: alert_id.to_string(),
        status: "active".to_string(),
        severity: "high".to_string(),
        message: "negative sentiment spike".to_string(),
        note: None,
        created_at: Utc::now(),
    })
}

/// An `alert-updated` broadcast
pub fn alert_update_broadcast(
    event_id: &EventId,
    source_id: SourceId,
    alert_id: &str,
    status: &str,
) -> ServerMessage {
    ServerMessage::AlertUpdated(AlertUpdated {
        event_id: event_id.clone(),
        source_id,
        alert_id: alert_id.to_string(),
        status: status.to_string(),
        note: None,
        updated_at: Utc::now(),
    })
}

/// A feedback draft with a caller-supplied source ID
pub fn feedback_draft(event_id: &EventId, text: &str, source_id: SourceId) -> FeedbackDraft {
    FeedbackDraft {
        event_id: event_id.clone(),
        text: text.to_string(),
        source: "app".to_string(),
        location: None,
        username: "ada".to_string(),
        source_id: Some(source_id),
    }
}

/// An alert status change with a caller-supplied source ID
pub fn alert_change(
    event_id: &EventId,
    alert_id: &str,
    status: AlertStatus,
    source_id: SourceId,
) -> AlertStatusChange {
    AlertStatusChange {
        alert_id: alert_id.to_string(),
        event_id: event_id.clone(),
        status,
        note: None,
        source_id: Some(source_id),
    }
}

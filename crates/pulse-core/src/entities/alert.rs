//! Active alert - one entry in the per-event alert list

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{AlertBody, AlertPatch};
use crate::value_objects::AlertStatus;

/// An alert as tracked by the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveAlert {
    pub alert_id: String,
    pub status: AlertStatus,
    pub severity: String,
    pub message: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActiveAlert {
    /// Build an alert from an alert-created event body
    #[must_use]
    pub fn from_body(body: &AlertBody, created_at: DateTime<Utc>) -> Self {
        Self {
            alert_id: body.alert_id.clone(),
            status: body.status,
            severity: body.severity.clone(),
            message: body.message.clone(),
            note: body.note.clone(),
            created_at,
            updated_at: created_at,
        }
    }

    /// Apply a status patch
    ///
    /// Returns true when this patch moved the alert into a terminal status for
    /// the first time. The caller decrements the active count exactly when this
    /// returns true, never twice for the same alert.
    pub fn apply_patch(&mut self, patch: &AlertPatch, at: DateTime<Utc>) -> bool {
        let was_terminal = self.status.is_terminal();

        self.status = patch.status;
        if let Some(note) = &patch.note {
            self.note = Some(note.clone());
        }
        self.updated_at = at;

        !was_terminal && self.status.is_terminal()
    }
}

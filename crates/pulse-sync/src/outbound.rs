//! Outbound operation queue
//!
//! Publishes the optimistic local copy first, then dispatches the operation
//! over the live channel and waits for the server's per-operation
//! acknowledgment, correlated by source ID. A send failure or a down
//! connection falls back to REST. Timeouts and rejections never retract the
//! optimistic event; the caller owns its fate.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use pulse_common::{SyncError, SyncResult};
use pulse_core::{AlertPatch, AlertStatus, EventId, FeedbackBody, LiveEvent, LivePayload, SourceId};
use tokio::sync::oneshot;

use crate::bus::DeduplicatingEventBus;
use crate::protocol::{ClientMessage, SubmitFeedback, UpdateAlert};
use crate::reconciler::StateReconciler;
use crate::rest::RestApi;
use crate::transport::TransportClient;

/// A feedback submission before it is stamped with a source ID
#[derive(Debug, Clone)]
pub struct FeedbackDraft {
    pub event_id: EventId,
    pub text: String,
    pub source: String,
    pub location: Option<String>,
    pub username: String,
    /// Provided by callers that pre-allocate IDs; generated otherwise
    pub source_id: Option<SourceId>,
}

/// An alert status change before it is stamped with a source ID
#[derive(Debug, Clone)]
pub struct AlertStatusChange {
    pub alert_id: String,
    pub event_id: EventId,
    pub status: AlertStatus,
    pub note: Option<String>,
    pub source_id: Option<SourceId>,
}

/// Which path carried the operation to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckVia {
    Transport,
    Rest,
}

/// Successful completion of an outbound operation
#[derive(Debug, Clone, Copy)]
pub struct Ack {
    pub source_id: SourceId,
    pub via: AckVia,
}

/// Correlates in-flight operations with their acknowledgments
pub struct OutboundQueue {
    pending: DashMap<SourceId, oneshot::Sender<SyncResult<Ack>>>,
    bus: Arc<DeduplicatingEventBus>,
    reconciler: Arc<StateReconciler>,
    rest: Arc<dyn RestApi>,
    ack_timeout: Duration,
}

impl OutboundQueue {
    #[must_use]
    pub fn new(
        bus: Arc<DeduplicatingEventBus>,
        reconciler: Arc<StateReconciler>,
        rest: Arc<dyn RestApi>,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            pending: DashMap::new(),
            bus,
            reconciler,
            rest,
            ack_timeout,
        }
    }

    /// Submit feedback: optimistic copy first, then transport with REST fallback
    pub async fn submit_feedback(
        &self,
        transport: &TransportClient,
        draft: FeedbackDraft,
    ) -> SyncResult<Ack> {
        let source_id = draft.source_id.unwrap_or_else(SourceId::generate);

        let optimistic = LiveEvent::local_pending(
            source_id,
            draft.event_id.clone(),
            LivePayload::Feedback(FeedbackBody {
                text: draft.text.clone(),
                sentiment: None,
                source: draft.source.clone(),
                location: draft.location.clone(),
                username: draft.username.clone(),
            }),
        );
        self.admit(optimistic);

        let request = SubmitFeedback {
            event_id: draft.event_id,
            text: draft.text,
            source: draft.source,
            location: draft.location,
            username: draft.username,
            source_id,
        };
        self.dispatch(transport, source_id, ClientMessage::SubmitFeedback(request))
            .await
    }

    /// Change an alert's status: optimistic copy first, then transport with
    /// REST fallback
    pub async fn update_alert(
        &self,
        transport: &TransportClient,
        change: AlertStatusChange,
    ) -> SyncResult<Ack> {
        let source_id = change.source_id.unwrap_or_else(SourceId::generate);

        let optimistic = LiveEvent::local_pending(
            source_id,
            change.event_id.clone(),
            LivePayload::AlertUpdated(AlertPatch {
                alert_id: change.alert_id.clone(),
                status: change.status,
                note: change.note.clone(),
            }),
        );
        self.admit(optimistic);

        let request = UpdateAlert {
            alert_id: change.alert_id,
            event_id: change.event_id,
            status: change.status,
            note: change.note,
            source_id,
        };
        self.dispatch(transport, source_id, ClientMessage::UpdateAlert(request))
            .await
    }

    /// Complete a pending operation confirmed by the server
    pub fn resolve_ack(&self, source_id: SourceId) {
        if let Some((_, sender)) = self.pending.remove(&source_id) {
            let _ = sender.send(Ok(Ack {
                source_id,
                via: AckVia::Transport,
            }));
        } else {
            tracing::debug!(%source_id, "Acknowledgment for unknown operation");
        }
    }

    /// Fail a pending operation the server rejected
    pub fn resolve_error(&self, source_id: SourceId, message: String) {
        if let Some((_, sender)) = self.pending.remove(&source_id) {
            let _ = sender.send(Err(SyncError::Operation(message)));
        }
    }

    /// Fail every pending operation with the given reason, used on disconnect
    /// and when the connection is lost for good
    pub fn reject_all(&self, reason: impl Fn() -> SyncError) {
        let waiting: Vec<SourceId> = self.pending.iter().map(|e| *e.key()).collect();
        for source_id in waiting {
            if let Some((_, sender)) = self.pending.remove(&source_id) {
                let _ = sender.send(Err(reason()));
            }
        }
    }

    /// Number of operations waiting on an acknowledgment
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn admit(&self, event: LiveEvent) {
        let admission = self.bus.publish(event.clone());
        if let Err(err) = self.reconciler.apply(&event, admission) {
            tracing::warn!(error = %err, source_id = %event.source_id, "Optimistic event not folded");
        }
    }

    async fn dispatch(
        &self,
        transport: &TransportClient,
        source_id: SourceId,
        message: ClientMessage,
    ) -> SyncResult<Ack> {
        if !transport.is_connected() {
            tracing::debug!(%source_id, kind = message.kind(), "Transport down; using REST");
            return self.via_rest(source_id, &message).await;
        }

        let (tx, rx) = oneshot::channel();
        self.pending.insert(source_id, tx);

        if let Err(err) = transport.send(message.clone()).await {
            self.pending.remove(&source_id);
            tracing::debug!(%source_id, error = %err, "Live send failed; using REST");
            return self.via_rest(source_id, &message).await;
        }

        match tokio::time::timeout(self.ack_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SyncError::ChannelClosed),
            Err(_) => {
                self.pending.remove(&source_id);
                Err(SyncError::Timeout {
                    ms: self.ack_timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn via_rest(&self, source_id: SourceId, message: &ClientMessage) -> SyncResult<Ack> {
        match message {
            ClientMessage::SubmitFeedback(request) => self.rest.submit_feedback(request).await?,
            ClientMessage::UpdateAlert(request) => self.rest.update_alert(request).await?,
            other => {
                return Err(SyncError::internal(anyhow::anyhow!(
                    "not an operation: {}",
                    other.kind()
                )))
            }
        }
        Ok(Ack {
            source_id,
            via: AckVia::Rest,
        })
    }
}

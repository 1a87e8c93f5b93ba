//! Channel membership
//!
//! Tracks which event-scoped channels this client should be subscribed to. The
//! registry is the single source of truth: wire-level join/leave messages are a
//! side effect of record changes, never the other way around, which is what
//! makes replay after reconnection correct by construction.

use dashmap::DashMap;
use pulse_common::SyncResult;
use pulse_core::{ChannelKind, EventId};

use crate::protocol::ClientMessage;
use crate::transport::TransportClient;

/// Phase of one (event, channel) subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionPhase {
    /// Recorded but the join has not reached the server yet
    Joining,
    /// Live
    Active,
    /// Connection dropped; last-known data may be out of date
    Stale,
}

struct Record {
    refs: usize,
    phase: SubscriptionPhase,
}

/// Ref-counted registry of event-scoped channel subscriptions
pub struct ChannelMembership {
    channels: DashMap<(EventId, ChannelKind), Record>,
}

impl ChannelMembership {
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Record interest in a channel and, on the first reference, send the join
    ///
    /// Ref-counted: a second view joining the same channel is a no-op on the
    /// wire. When the transport is down the record is kept in `Joining` and
    /// replayed once the connection is back.
    pub async fn join(
        &self,
        transport: &TransportClient,
        event_id: EventId,
        kind: ChannelKind,
    ) -> SyncResult<()> {
        let key = (event_id.clone(), kind);
        let first = {
            let mut record = self.channels.entry(key).or_insert(Record {
                refs: 0,
                phase: SubscriptionPhase::Joining,
            });
            record.refs += 1;
            record.refs == 1
        };

        if !first {
            tracing::trace!(%event_id, %kind, "Channel already joined");
            return Ok(());
        }

        if transport.is_connected() {
            transport.send(join_message(&event_id, kind)).await?;
            self.set_phase(&event_id, kind, SubscriptionPhase::Active);
            tracing::debug!(%event_id, %kind, "Channel joined");
        } else {
            tracing::debug!(%event_id, %kind, "Join recorded while offline; will replay");
        }

        Ok(())
    }

    /// Drop one reference; on the last one, remove the record and send the leave
    ///
    /// Safe to call for a channel that was never joined.
    pub async fn leave(
        &self,
        transport: &TransportClient,
        event_id: EventId,
        kind: ChannelKind,
    ) -> SyncResult<()> {
        let key = (event_id.clone(), kind);
        let last = {
            let Some(mut record) = self.channels.get_mut(&key) else {
                return Ok(());
            };
            record.refs = record.refs.saturating_sub(1);
            record.refs == 0
        };

        if !last {
            return Ok(());
        }

        self.channels.remove(&key);

        if transport.is_connected() {
            // A failed leave is not an error worth surfacing: the record is
            // gone and a reconnect will not replay it.
            if let Err(e) = transport.send(leave_message(&event_id, kind)).await {
                tracing::debug!(%event_id, %kind, error = %e, "Leave not delivered");
            } else {
                tracing::debug!(%event_id, %kind, "Channel left");
            }
        }

        Ok(())
    }

    /// Re-send joins for every recorded subscription after a reconnect
    ///
    /// Order is arbitrary; joins are independent and idempotent server-side.
    pub async fn replay(&self, transport: &TransportClient) -> SyncResult<()> {
        let recorded: Vec<(EventId, ChannelKind)> = self
            .channels
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        for (event_id, kind) in recorded {
            // Skip channels left while we were gathering the list
            if !self.channels.contains_key(&(event_id.clone(), kind)) {
                continue;
            }
            transport.send(join_message(&event_id, kind)).await?;
            self.set_phase(&event_id, kind, SubscriptionPhase::Active);
            tracing::debug!(%event_id, %kind, "Subscription replayed");
        }

        Ok(())
    }

    /// Flag every subscription as possibly out of date (on disconnect)
    pub fn mark_all_stale(&self) {
        for mut entry in self.channels.iter_mut() {
            entry.phase = SubscriptionPhase::Stale;
        }
    }

    /// Get the phase of a subscription, if recorded
    pub fn phase(&self, event_id: &EventId, kind: ChannelKind) -> Option<SubscriptionPhase> {
        self.channels
            .get(&(event_id.clone(), kind))
            .map(|r| r.phase)
    }

    /// All recorded subscriptions
    pub fn subscriptions(&self) -> Vec<(EventId, ChannelKind)> {
        self.channels.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of recorded subscriptions
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Check whether no subscriptions are recorded
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    fn set_phase(&self, event_id: &EventId, kind: ChannelKind, phase: SubscriptionPhase) {
        if let Some(mut record) = self.channels.get_mut(&(event_id.clone(), kind)) {
            record.phase = phase;
        }
    }
}

impl Default for ChannelMembership {
    fn default() -> Self {
        Self::new()
    }
}

fn join_message(event_id: &EventId, kind: ChannelKind) -> ClientMessage {
    match kind {
        ChannelKind::Feed => ClientMessage::JoinEvent {
            event_id: event_id.clone(),
        },
        ChannelKind::Alerts => ClientMessage::SubscribeAlerts {
            event_id: event_id.clone(),
        },
    }
}

fn leave_message(event_id: &EventId, kind: ChannelKind) -> ClientMessage {
    match kind {
        ChannelKind::Feed => ClientMessage::LeaveEvent {
            event_id: event_id.clone(),
        },
        ChannelKind::Alerts => ClientMessage::UnsubscribeAlerts {
            event_id: event_id.clone(),
        },
    }
}

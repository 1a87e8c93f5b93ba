//! Deduplicating event bus
//!
//! The only place allowed to decide duplicate-vs-distinct. Every inbound live
//! event (optimistic local copies and server broadcasts alike) passes through
//! `publish`; admitted events fan out to channel subscribers in admission
//! order. A server-confirmed copy replaces a local-pending copy in place, so a
//! sender's own message never jumps position when its echo arrives.

use std::collections::HashMap;

use dashmap::DashMap;
use parking_lot::RwLock;
use pulse_core::{ChannelKind, EventId, LiveEvent, Origin, SourceId};
use tokio::sync::broadcast;

/// Per-channel fan-out depth
const SUBSCRIBER_BUFFER: usize = 256;

/// Default bound on the admission history kept per channel
const DEFAULT_CHANNEL_CAPACITY: usize = 500;

type ChannelKey = (EventId, ChannelKind);

/// Outcome of publishing one live event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First copy under this source ID; appended to the channel
    Inserted,
    /// Confirmed copy replaced the local-pending one, same position
    Replaced,
    /// Redundant delivery; not fanned out
    Discarded,
}

/// One admitted event as delivered to subscribers
#[derive(Debug, Clone)]
pub struct BusDelivery {
    pub event: LiveEvent,
    pub admission: Admission,
}

/// Handle to one channel subscription; dropping it unsubscribes
pub struct FeedSubscription {
    receiver: broadcast::Receiver<BusDelivery>,
}

impl FeedSubscription {
    /// Receive the next admitted event on this channel
    ///
    /// Returns None once the bus is gone or this subscriber lagged past the
    /// buffer (lagged deliveries are skipped, not re-ordered).
    pub async fn recv(&mut self) -> Option<BusDelivery> {
        loop {
            match self.receiver.recv().await {
                Ok(delivery) => return Some(delivery),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Subscriber lagged; skipping deliveries");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

struct BusState {
    /// Latest admitted copy per source ID
    index: HashMap<SourceId, LiveEvent>,
    /// Admission order per channel; replacement keeps the slot
    order: HashMap<ChannelKey, Vec<SourceId>>,
}

/// Receives live events, filters redundant delivery, and fans out
///
/// The admission history is bounded per channel: once a channel exceeds its
/// capacity the oldest entries are evicted. An evicted entry that is delivered
/// again is re-admitted as a fresh insert; the periodic refresh reconciles any
/// drift that causes.
pub struct DeduplicatingEventBus {
    state: RwLock<BusState>,
    subscribers: DashMap<ChannelKey, broadcast::Sender<BusDelivery>>,
    channel_capacity: usize,
}

impl DeduplicatingEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Bus with the given per-channel admission history bound
    #[must_use]
    pub fn with_capacity(channel_capacity: usize) -> Self {
        Self {
            state: RwLock::new(BusState {
                index: HashMap::new(),
                order: HashMap::new(),
            }),
            subscribers: DashMap::new(),
            channel_capacity,
        }
    }

    /// Admit, replace, or discard one live event
    ///
    /// Admission rule per source ID: first copy is inserted; a confirmed copy
    /// replaces a pending one in place; anything else is a redundant delivery
    /// and is discarded.
    pub fn publish(&self, event: LiveEvent) -> Admission {
        let key = channel_of(&event);
        let source_id = event.source_id;

        let admission = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            match state.index.get(&source_id) {
                None => {
                    let order = state.order.entry(key.clone()).or_default();
                    order.push(source_id);
                    if order.len() > self.channel_capacity {
                        let oldest = order.remove(0);
                        state.index.remove(&oldest);
                        tracing::trace!(evicted = %oldest, "Channel history at capacity");
                    }
                    state.index.insert(source_id, event.clone());
                    Admission::Inserted
                }
                Some(existing)
                    if existing.origin == Origin::LocalPending && event.is_confirmed() =>
                {
                    state.index.insert(source_id, event.clone());
                    Admission::Replaced
                }
                Some(_) => Admission::Discarded,
            }
        };

        match admission {
            Admission::Discarded => {
                tracing::trace!(%source_id, "Discarded redundant delivery");
            }
            admission => {
                tracing::trace!(%source_id, ?admission, kind = event.kind(), "Event admitted");
                if let Some(sender) = self.subscribers.get(&key) {
                    // No receivers is fine; late subscribers use snapshot()
                    let _ = sender.send(BusDelivery { event, admission });
                }
            }
        }

        admission
    }

    /// Subscribe to admitted events on one channel
    ///
    /// The handler sees only non-discarded deliveries scoped to this channel,
    /// in admission order. Dropping the returned handle unsubscribes.
    pub fn subscribe(&self, event_id: EventId, kind: ChannelKind) -> FeedSubscription {
        let sender = self
            .subscribers
            .entry((event_id, kind))
            .or_insert_with(|| broadcast::channel(SUBSCRIBER_BUFFER).0);
        FeedSubscription {
            receiver: sender.subscribe(),
        }
    }

    /// Current admitted events on a channel, in admission order
    pub fn snapshot(&self, event_id: &EventId, kind: ChannelKind) -> Vec<LiveEvent> {
        let state = self.state.read();
        state
            .order
            .get(&(event_id.clone(), kind))
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.index.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Latest admitted copy for a source ID
    pub fn lookup(&self, source_id: &SourceId) -> Option<LiveEvent> {
        self.state.read().index.get(source_id).cloned()
    }

    /// Number of admitted events across all channels
    pub fn len(&self) -> usize {
        self.state.read().index.len()
    }

    /// Check whether nothing has been admitted
    pub fn is_empty(&self) -> bool {
        self.state.read().index.is_empty()
    }
}

impl Default for DeduplicatingEventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn channel_of(event: &LiveEvent) -> ChannelKey {
    let kind = if event.is_alert() {
        ChannelKind::Alerts
    } else {
        ChannelKind::Feed
    };
    (event.event_id.clone(), kind)
}

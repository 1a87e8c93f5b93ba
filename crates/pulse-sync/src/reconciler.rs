//! State reconciler
//!
//! Folds the deduplicated event stream into one `Aggregate` per event: sentiment
//! counters, a bounded recent-feedback feed, and the active-alert list. A
//! replace-in-place from the bus is propagated as an update, never a second
//! insert, so counters cannot double-count an event that transitioned from
//! local-pending to server-confirmed. A malformed event is dropped and logged;
//! the rest of the aggregate stays untouched.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use pulse_core::{
    ActiveAlert, DomainError, EventId, FeedItem, LiveEvent, LivePayload, Sentiment, SourceId,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::bus::{Admission, DeduplicatingEventBus};

/// Per-event read model, rebuilt incrementally from the live stream
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub event_id: EventId,
    pub sentiment_counts: HashMap<Sentiment, u64>,
    /// Recent feedback, newest first, bounded by the configured capacity
    pub feed: VecDeque<FeedItem>,
    /// Alerts, newest first
    pub alerts: Vec<ActiveAlert>,
    pub active_alert_count: u64,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    /// Bumped on every mutation; watchers re-render on changes
    pub version: u64,
    /// Wall clock of the newest live write, for refresh races
    last_write_at: DateTime<Utc>,
    /// Which sentiment was counted per source, so a replace can adjust
    /// counters without re-counting. Bounded: the oldest entries are dropped
    /// beyond the channel capacity and reconciled by the periodic refresh.
    counted: HashMap<SourceId, Sentiment>,
    /// Insertion order of `counted`, for eviction
    counted_order: VecDeque<SourceId>,
}

impl Aggregate {
    fn new(event_id: EventId) -> Self {
        Self {
            event_id,
            sentiment_counts: HashMap::new(),
            feed: VecDeque::new(),
            alerts: Vec::new(),
            active_alert_count: 0,
            last_refreshed_at: None,
            version: 0,
            // Floor value: a never-written aggregate accepts any refresh
            last_write_at: DateTime::<Utc>::MIN_UTC,
            counted: HashMap::new(),
            counted_order: VecDeque::new(),
        }
    }

    /// Count for one sentiment label
    #[must_use]
    pub fn count(&self, sentiment: Sentiment) -> u64 {
        self.sentiment_counts.get(&sentiment).copied().unwrap_or(0)
    }

    fn record_count(&mut self, source_id: SourceId, sentiment: Sentiment, capacity: usize) {
        if self.counted.insert(source_id, sentiment).is_none() {
            self.counted_order.push_back(source_id);
        }
        while self.counted_order.len() > capacity {
            if let Some(oldest) = self.counted_order.pop_front() {
                self.counted.remove(&oldest);
            }
        }
    }
}

/// Full aggregate as served by the REST layer (periodic refresh backstop)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub event_id: EventId,
    pub sentiment_counts: HashMap<Sentiment, u64>,
    pub feed: Vec<FeedItem>,
    pub alerts: Vec<ActiveAlert>,
    pub active_alert_count: u64,
    pub fetched_at: DateTime<Utc>,
}

/// Maintains per-event aggregates from the admitted event stream
pub struct StateReconciler {
    aggregates: DashMap<EventId, Aggregate>,
    watchers: DashMap<EventId, watch::Sender<u64>>,
    feed_capacity: usize,
    /// Bound on the per-aggregate counted-source history
    channel_capacity: usize,
}

impl StateReconciler {
    #[must_use]
    pub fn new(feed_capacity: usize, channel_capacity: usize) -> Self {
        Self {
            aggregates: DashMap::new(),
            watchers: DashMap::new(),
            feed_capacity,
            channel_capacity,
        }
    }

    /// Fold one admitted event into its aggregate
    ///
    /// Called with the admission outcome from the bus; discarded events are
    /// ignored here too. A malformed event returns an error for logging and
    /// leaves the aggregate exactly as it was.
    pub fn apply(&self, event: &LiveEvent, admission: Admission) -> Result<(), DomainError> {
        if admission == Admission::Discarded {
            return Ok(());
        }

        let mut aggregate = self
            .aggregates
            .entry(event.event_id.clone())
            .or_insert_with(|| Aggregate::new(event.event_id.clone()));

        let result = match admission {
            Admission::Inserted => {
                Self::fold_insert(&mut aggregate, event, self.feed_capacity, self.channel_capacity)
            }
            Admission::Replaced => Self::fold_update(&mut aggregate, event, self.channel_capacity),
            Admission::Discarded => Ok(()),
        };

        if result.is_ok() {
            aggregate.version += 1;
            aggregate.last_write_at = Utc::now();
            let version = aggregate.version;
            drop(aggregate);
            self.notify(&event.event_id, version);
        }

        result
    }

    fn fold_insert(
        aggregate: &mut Aggregate,
        event: &LiveEvent,
        capacity: usize,
        channel_capacity: usize,
    ) -> Result<(), DomainError> {
        match &event.payload {
            LivePayload::Feedback(body) => {
                let item = FeedItem::project(event).ok_or(DomainError::PayloadMismatch {
                    expected: "feedback",
                    got: event.kind(),
                })?;
                aggregate.feed.push_front(item);
                aggregate.feed.truncate(capacity);

                if let Some(sentiment) = body.sentiment {
                    *aggregate.sentiment_counts.entry(sentiment).or_insert(0) += 1;
                    aggregate.record_count(event.source_id, sentiment, channel_capacity);
                }
            }
            LivePayload::AlertCreated(body) => {
                aggregate
                    .alerts
                    .insert(0, ActiveAlert::from_body(body, event.created_at));
                if !body.status.is_terminal() {
                    aggregate.active_alert_count += 1;
                }
            }
            LivePayload::AlertUpdated(patch) => {
                let Some(alert) = aggregate
                    .alerts
                    .iter_mut()
                    .find(|a| a.alert_id == patch.alert_id)
                else {
                    // Update for an alert we never saw created; the periodic
                    // refresh reconciles it
                    tracing::debug!(alert_id = %patch.alert_id, "Update for unknown alert");
                    return Ok(());
                };
                if alert.apply_patch(patch, event.created_at) {
                    aggregate.active_alert_count = aggregate.active_alert_count.saturating_sub(1);
                }
            }
        }
        Ok(())
    }

    /// Propagate a replace-in-place as an update, never a second insert
    fn fold_update(
        aggregate: &mut Aggregate,
        event: &LiveEvent,
        channel_capacity: usize,
    ) -> Result<(), DomainError> {
        match &event.payload {
            LivePayload::Feedback(body) => {
                // Adjust counters by transition, independent of whether the
                // item has aged out of the bounded feed
                let previous = aggregate.counted.get(&event.source_id).copied();
                if previous != body.sentiment {
                    if let Some(old) = previous {
                        if let Some(count) = aggregate.sentiment_counts.get_mut(&old) {
                            *count = count.saturating_sub(1);
                        }
                        aggregate.counted.remove(&event.source_id);
                    }
                    if let Some(new) = body.sentiment {
                        *aggregate.sentiment_counts.entry(new).or_insert(0) += 1;
                        aggregate.record_count(event.source_id, new, channel_capacity);
                    }
                }

                if let Some(slot) = aggregate
                    .feed
                    .iter_mut()
                    .find(|item| item.source_id == event.source_id)
                {
                    let confirmed = FeedItem::project(event).ok_or(DomainError::PayloadMismatch {
                        expected: "feedback",
                        got: event.kind(),
                    })?;
                    *slot = confirmed;
                }
            }
            LivePayload::AlertUpdated(patch) => {
                if let Some(alert) = aggregate
                    .alerts
                    .iter_mut()
                    .find(|a| a.alert_id == patch.alert_id)
                {
                    // The optimistic copy already applied this patch;
                    // apply_patch reports a terminal transition at most once
                    if alert.apply_patch(patch, event.created_at) {
                        aggregate.active_alert_count =
                            aggregate.active_alert_count.saturating_sub(1);
                    }
                }
            }
            LivePayload::AlertCreated(body) => {
                if let Some(alert) = aggregate
                    .alerts
                    .iter_mut()
                    .find(|a| a.alert_id == body.alert_id)
                {
                    let was_terminal = alert.status.is_terminal();
                    *alert = ActiveAlert::from_body(body, event.created_at);
                    match (was_terminal, body.status.is_terminal()) {
                        (false, true) => {
                            aggregate.active_alert_count =
                                aggregate.active_alert_count.saturating_sub(1);
                        }
                        (true, false) => aggregate.active_alert_count += 1,
                        _ => {}
                    }
                }
            }
        }
        Ok(())
    }

    /// Merge a full REST refresh into the aggregate
    ///
    /// The later wall-clock write wins: a refresh older than the newest live
    /// write is skipped. Feed items whose source ID is known to the bus are
    /// overlaid with the bus's latest copy, so a refresh never resurrects a
    /// superseded live event.
    pub fn merge_refresh(&self, snapshot: AggregateSnapshot, bus: &DeduplicatingEventBus) {
        let event_id = snapshot.event_id.clone();

        let mut entry = self
            .aggregates
            .entry(event_id.clone())
            .or_insert_with(|| Aggregate::new(event_id.clone()));

        if entry.last_write_at > snapshot.fetched_at {
            tracing::debug!(%event_id, "Skipping stale refresh; live state is newer");
            return;
        }

        let feed: VecDeque<FeedItem> = snapshot
            .feed
            .into_iter()
            .take(self.feed_capacity)
            .map(|item| match bus.lookup(&item.source_id) {
                Some(live) => FeedItem::project(&live).unwrap_or(item),
                None => item,
            })
            .collect();

        let counted: HashMap<SourceId, Sentiment> = feed
            .iter()
            .filter_map(|item| item.sentiment.map(|s| (item.source_id, s)))
            .collect();
        // The feed is newest first; the eviction queue runs oldest first
        let counted_order = feed
            .iter()
            .rev()
            .filter(|item| item.sentiment.is_some())
            .map(|item| item.source_id)
            .collect();

        entry.sentiment_counts = snapshot.sentiment_counts;
        entry.feed = feed;
        entry.alerts = snapshot.alerts;
        entry.active_alert_count = snapshot.active_alert_count;
        entry.last_refreshed_at = Some(snapshot.fetched_at);
        entry.last_write_at = snapshot.fetched_at;
        entry.counted = counted;
        entry.counted_order = counted_order;
        entry.version += 1;
        let version = entry.version;
        drop(entry);

        tracing::debug!(%event_id, "Aggregate refreshed from REST");
        self.notify(&event_id, version);
    }

    /// Snapshot of one event's aggregate
    pub fn aggregate(&self, event_id: &EventId) -> Option<Aggregate> {
        self.aggregates.get(event_id).map(|a| a.clone())
    }

    /// Watch an event's aggregate version; the receiver fires on every mutation
    pub fn watch(&self, event_id: &EventId) -> watch::Receiver<u64> {
        self.watchers
            .entry(event_id.clone())
            .or_insert_with(|| watch::channel(0).0)
            .subscribe()
    }

    /// Event IDs with an aggregate (for the refresh task)
    pub fn tracked_events(&self) -> Vec<EventId> {
        self.aggregates.iter().map(|e| e.key().clone()).collect()
    }

    fn notify(&self, event_id: &EventId, version: u64) {
        if let Some(sender) = self.watchers.get(event_id) {
            let _ = sender.send(version);
        }
    }
}

//! Sync client
//!
//! Composition root wiring the transport, membership registry, outbound queue,
//! event bus, and reconciler together. The router task is the single consumer
//! of inbound messages: broadcasts flow through the bus into the reconciler,
//! acks complete pending operations, and connectivity signals drive
//! subscription replay.

use std::sync::Arc;

use parking_lot::Mutex;
use pulse_common::{SyncConfig, SyncError, SyncResult};
use pulse_core::{ChannelKind, EventId, LiveEvent};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::bus::{DeduplicatingEventBus, FeedSubscription};
use crate::membership::{ChannelMembership, SubscriptionPhase};
use crate::outbound::{Ack, AlertStatusChange, FeedbackDraft, OutboundQueue};
use crate::protocol::ServerMessage;
use crate::reconciler::{Aggregate, StateReconciler};
use crate::rest::RestApi;
use crate::transport::{Transport, TransportClient, TransportEvent};

const INCOMING_BUFFER: usize = 256;

/// Real-time sync layer for one dashboard session
pub struct SyncClient {
    config: SyncConfig,
    transport: Arc<TransportClient>,
    membership: Arc<ChannelMembership>,
    bus: Arc<DeduplicatingEventBus>,
    reconciler: Arc<StateReconciler>,
    queue: Arc<OutboundQueue>,
    rest: Arc<dyn RestApi>,
    /// Taken by the router task on first connect
    incoming: Mutex<Option<mpsc::Receiver<ServerMessage>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncClient {
    /// Build a client from its transport and REST implementations
    #[must_use]
    pub fn new(
        config: SyncConfig,
        transport_impl: Arc<dyn Transport>,
        rest: Arc<dyn RestApi>,
    ) -> Arc<Self> {
        let (incoming_tx, incoming_rx) = mpsc::channel(INCOMING_BUFFER);

        let transport = TransportClient::new(
            config.socket_url.clone(),
            config.reconnect.clone(),
            config.heartbeat.clone(),
            transport_impl,
            incoming_tx,
        );

        let bus = Arc::new(DeduplicatingEventBus::with_capacity(config.channel_capacity));
        let reconciler = Arc::new(StateReconciler::new(
            config.feed_capacity,
            config.channel_capacity,
        ));
        let queue = Arc::new(OutboundQueue::new(
            Arc::clone(&bus),
            Arc::clone(&reconciler),
            Arc::clone(&rest),
            config.operation_timeout(),
        ));

        Arc::new(Self {
            config,
            transport,
            membership: Arc::new(ChannelMembership::new()),
            bus,
            reconciler,
            queue,
            rest,
            incoming: Mutex::new(Some(incoming_rx)),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Connect and authenticate, then start the router and refresh tasks
    pub async fn connect(self: &Arc<Self>, token: impl Into<String>) -> SyncResult<()> {
        self.transport.connect(token).await?;

        if let Some(incoming) = self.incoming.lock().take() {
            let router = self.spawn_router(incoming);
            let mut tasks = self.tasks.lock();
            tasks.push(router);
            if !self.config.refresh.disabled {
                tasks.push(self.spawn_refresh());
            }
        }
        Ok(())
    }

    /// Tear the session down and fail everything in flight
    pub fn disconnect(&self) {
        self.transport.disconnect();
        self.queue.reject_all(|| SyncError::ChannelClosed);
        tracing::info!("Sync client disconnected");
    }

    /// Join an event's channel, idempotent per caller
    pub async fn join(&self, event_id: EventId, kind: ChannelKind) -> SyncResult<()> {
        self.membership.join(&self.transport, event_id, kind).await
    }

    /// Leave an event's channel; the wire leave goes out on the last reference
    pub async fn leave(&self, event_id: EventId, kind: ChannelKind) -> SyncResult<()> {
        self.membership.leave(&self.transport, event_id, kind).await
    }

    /// Submit feedback, optimistically echoed before dispatch
    pub async fn submit_feedback(&self, draft: FeedbackDraft) -> SyncResult<Ack> {
        self.queue.submit_feedback(&self.transport, draft).await
    }

    /// Change an alert's status, optimistically echoed before dispatch
    pub async fn update_alert(&self, change: AlertStatusChange) -> SyncResult<Ack> {
        self.queue.update_alert(&self.transport, change).await
    }

    /// Live subscription to one event channel's admitted deliveries
    #[must_use]
    pub fn subscribe(&self, event_id: EventId, kind: ChannelKind) -> FeedSubscription {
        self.bus.subscribe(event_id, kind)
    }

    /// Admitted events on a channel, in admission order
    #[must_use]
    pub fn channel_snapshot(&self, event_id: &EventId, kind: ChannelKind) -> Vec<LiveEvent> {
        self.bus.snapshot(event_id, kind)
    }

    /// Current aggregate for one event
    #[must_use]
    pub fn aggregate(&self, event_id: &EventId) -> Option<Aggregate> {
        self.reconciler.aggregate(event_id)
    }

    /// Watch an event's aggregate version
    #[must_use]
    pub fn watch_aggregate(&self, event_id: &EventId) -> watch::Receiver<u64> {
        self.reconciler.watch(event_id)
    }

    /// Fetch and merge the server-side aggregate immediately
    pub async fn refresh(&self, event_id: &EventId) -> SyncResult<()> {
        let snapshot = self.rest.fetch_aggregate(event_id).await?;
        self.reconciler.merge_refresh(snapshot, &self.bus);
        Ok(())
    }

    /// Subscribe to connectivity signals
    #[must_use]
    pub fn transport_events(&self) -> broadcast::Receiver<TransportEvent> {
        self.transport.events()
    }

    /// Check whether the live channel is up
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Subscription phase for one channel, if joined
    #[must_use]
    pub fn subscription_phase(
        &self,
        event_id: &EventId,
        kind: ChannelKind,
    ) -> Option<SubscriptionPhase> {
        self.membership.phase(event_id, kind)
    }

    fn spawn_router(self: &Arc<Self>, mut incoming: mpsc::Receiver<ServerMessage>) -> JoinHandle<()> {
        let transport = Arc::clone(&self.transport);
        let membership = Arc::clone(&self.membership);
        let bus = Arc::clone(&self.bus);
        let reconciler = Arc::clone(&self.reconciler);
        let queue = Arc::clone(&self.queue);
        let mut events = self.transport.events();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    message = incoming.recv() => {
                        let Some(message) = message else { break };
                        Self::route_message(message, &bus, &reconciler, &queue);
                    }
                    event = events.recv() => match event {
                        Ok(TransportEvent::Reconnecting { attempt }) => {
                            tracing::debug!(attempt, "Marking subscriptions stale");
                            membership.mark_all_stale();
                        }
                        Ok(TransportEvent::Reconnected) => {
                            if let Err(err) = membership.replay(&transport).await {
                                tracing::warn!(error = %err, "Subscription replay failed");
                            }
                        }
                        Ok(TransportEvent::Lost { attempts }) => {
                            tracing::warn!(attempts, "Connection lost; failing pending operations");
                            queue.reject_all(|| SyncError::ConnectionLost { attempts });
                        }
                        Ok(TransportEvent::AuthFailed { ref message }) => {
                            queue.reject_all(|| SyncError::Auth(message.clone()));
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Connectivity signals lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            tracing::debug!("Router task stopped");
        })
    }

    fn route_message(
        message: ServerMessage,
        bus: &DeduplicatingEventBus,
        reconciler: &StateReconciler,
        queue: &OutboundQueue,
    ) {
        match message {
            ServerMessage::FeedbackReceived { source_id }
            | ServerMessage::AlertUpdateConfirmed { source_id } => queue.resolve_ack(source_id),
            ServerMessage::Error {
                message,
                source_id: Some(source_id),
            } => queue.resolve_error(source_id, message),
            ServerMessage::Error {
                message,
                source_id: None,
            } => tracing::warn!(%message, "Server error"),
            broadcastable => match broadcastable.into_live_event() {
                Ok(Some(event)) => {
                    let admission = bus.publish(event.clone());
                    if let Err(err) = reconciler.apply(&event, admission) {
                        tracing::warn!(error = %err, source_id = %event.source_id, "Event not folded");
                    }
                }
                Ok(None) => {}
                // One bad broadcast is dropped; the stream keeps flowing
                Err(err) => tracing::warn!(error = %err, "Dropping malformed event"),
            },
        }
    }

    fn spawn_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let reconciler = Arc::clone(&self.reconciler);
        let bus = Arc::clone(&self.bus);
        let rest = Arc::clone(&self.rest);
        let interval = self.config.refresh.interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick is immediate

            loop {
                ticker.tick().await;
                for event_id in reconciler.tracked_events() {
                    match rest.fetch_aggregate(&event_id).await {
                        Ok(snapshot) => reconciler.merge_refresh(snapshot, &bus),
                        Err(err) => {
                            tracing::debug!(%event_id, error = %err, "Aggregate refresh failed");
                        }
                    }
                }
            }
        })
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

//! # pulse-sync
//!
//! Real-time per-event synchronization layer: maintains a live bidirectional
//! channel to the server, scopes traffic to subscribed events, reconciles
//! optimistic local echoes with server-confirmed copies, deduplicates redundant
//! delivery, and folds the resulting stream into per-event read models.

pub mod bus;
pub mod client;
pub mod membership;
pub mod outbound;
pub mod protocol;
pub mod reconciler;
pub mod rest;
pub mod transport;

pub use bus::{Admission, BusDelivery, DeduplicatingEventBus, FeedSubscription};
pub use client::SyncClient;
pub use membership::{ChannelMembership, SubscriptionPhase};
pub use outbound::{Ack, AckVia, AlertStatusChange, FeedbackDraft, OutboundQueue};
pub use reconciler::{Aggregate, AggregateSnapshot, StateReconciler};
pub use rest::{HttpRestApi, RestApi};
pub use transport::{Connection, ConnectionState, Transport, TransportClient, TransportEvent, TransportLink, WsTransport};

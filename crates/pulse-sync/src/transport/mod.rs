//! Transport layer
//!
//! Owns the one live duplex connection to the server: authentication handshake,
//! bounded reconnection, and heartbeat liveness. The `Transport` trait is the
//! seam between the connection logic and the actual socket; production uses
//! `WsTransport`, tests inject a channel-backed fake.

mod client;
mod connection;
mod ws;

pub use client::{TransportClient, TransportEvent};
pub use connection::{Connection, ConnectionState};
pub use ws::WsTransport;

use async_trait::async_trait;
use pulse_common::SyncResult;
use tokio::sync::mpsc;

use crate::protocol::{ClientMessage, ServerMessage};

/// One established duplex link: a sink for outbound control messages and a
/// stream of decoded inbound messages
pub struct TransportLink {
    pub outbound: mpsc::Sender<ClientMessage>,
    pub inbound: mpsc::Receiver<ServerMessage>,
}

/// Low-level connector; implementations own framing and decoding
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a fresh link to the endpoint
    ///
    /// Fails with `SyncError::Network` on transport-level failure. Undecodable
    /// inbound frames are dropped (and logged) by the implementation, never
    /// surfaced as stream errors.
    async fn connect(&self, url: &str) -> SyncResult<TransportLink>;
}

//! Test helpers for integration tests
//!
//! Provides an in-process fake transport (one server handle per accepted
//! connection), a recording REST fake, and config presets with short timers.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pulse_common::{
    HeartbeatConfig, ReconnectConfig, RefreshConfig, SyncConfig, SyncError, SyncResult,
};
use pulse_core::EventId;
use pulse_sync::protocol::{ClientMessage, ServerMessage, SubmitFeedback, UpdateAlert};
use pulse_sync::{AggregateSnapshot, RestApi, Transport, TransportLink};
use tokio::sync::mpsc;

const LINK_BUFFER: usize = 64;
const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Config preset with millisecond-scale timers for tests
pub fn test_config() -> SyncConfig {
    SyncConfig {
        socket_url: "ws://test.invalid/live".to_string(),
        rest_base_url: "http://test.invalid".to_string(),
        reconnect: ReconnectConfig {
            max_attempts: 3,
            base_delay_ms: 5,
            max_delay_ms: 10,
        },
        heartbeat: HeartbeatConfig {
            timeout_ms: 60_000,
            check_interval_ms: 60_000,
        },
        refresh: RefreshConfig {
            interval_ms: 60_000,
            disabled: true,
        },
        operation_timeout_ms: 200,
        feed_capacity: 50,
        channel_capacity: 500,
    }
}

/// Poll a condition until it holds or two seconds pass
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Server side of one accepted fake connection
pub struct ServerHandle {
    to_client: mpsc::Sender<ServerMessage>,
    from_client: mpsc::Receiver<ClientMessage>,
}

impl ServerHandle {
    /// Push a frame to the client
    pub async fn send(&self, message: ServerMessage) {
        self.to_client
            .send(message)
            .await
            .expect("client side of fake link closed");
    }

    /// Next frame from the client, failing the test after a second of silence
    pub async fn recv(&mut self) -> ClientMessage {
        tokio::time::timeout(RECV_TIMEOUT, self.from_client.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client side of fake link closed")
    }

    /// Check that no frame arrives within a short window
    pub async fn assert_silent(&mut self) {
        let outcome = tokio::time::timeout(Duration::from_millis(50), self.from_client.recv()).await;
        assert!(outcome.is_err(), "unexpected client frame: {outcome:?}");
    }

    /// Consume the handshake frame
    pub async fn expect_identify(&mut self) -> String {
        match self.recv().await {
            ClientMessage::Identify { token } => token,
            other => panic!("expected identify, got {other:?}"),
        }
    }

    /// Drop the server side, simulating an unexpected connection loss
    pub fn close(self) {
        drop(self);
    }
}

/// In-process transport: every accepted connect yields a `ServerHandle`
///
/// The handshake is scripted at accept time: a normal connection is pre-seeded
/// with `Ready`, an auth-rejecting one with an error frame.
pub struct FakeTransport {
    fail_connects: AtomicU32,
    reject_auth: AtomicBool,
    accepted: AtomicU32,
    attempted: AtomicU32,
    handles: mpsc::UnboundedSender<ServerHandle>,
}

impl FakeTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerHandle>) {
        let (handles, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            fail_connects: AtomicU32::new(0),
            reject_auth: AtomicBool::new(false),
            accepted: AtomicU32::new(0),
            attempted: AtomicU32::new(0),
            handles,
        });
        (transport, rx)
    }

    /// Fail the next `count` connection attempts at the transport level
    pub fn fail_next_connects(&self, count: u32) {
        self.fail_connects.store(count, Ordering::SeqCst);
    }

    /// Reject the handshake of every subsequent connection
    pub fn reject_auth(&self) {
        self.reject_auth.store(true, Ordering::SeqCst);
    }

    /// Total connection attempts, including failed ones
    pub fn attempts(&self) -> u32 {
        self.attempted.load(Ordering::SeqCst)
    }

    /// Successfully accepted connections
    pub fn accepted(&self) -> u32 {
        self.accepted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, _url: &str) -> SyncResult<TransportLink> {
        self.attempted.fetch_add(1, Ordering::SeqCst);

        if self.fail_connects.load(Ordering::SeqCst) > 0 {
            self.fail_connects.fetch_sub(1, Ordering::SeqCst);
            return Err(SyncError::Network("connection refused".to_string()));
        }

        let (out_tx, out_rx) = mpsc::channel(LINK_BUFFER);
        let (in_tx, in_rx) = mpsc::channel(LINK_BUFFER);

        let handshake = if self.reject_auth.load(Ordering::SeqCst) {
            ServerMessage::Error {
                message: "invalid token".to_string(),
                source_id: None,
            }
        } else {
            ServerMessage::Ready
        };
        in_tx.send(handshake).await.ok();

        self.accepted.fetch_add(1, Ordering::SeqCst);
        let _ = self.handles.send(ServerHandle {
            to_client: in_tx,
            from_client: out_rx,
        });

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// REST fake that records every call
pub struct RecordingRest {
    pub feedback: Mutex<Vec<SubmitFeedback>>,
    pub alerts: Mutex<Vec<UpdateAlert>>,
    pub snapshot: Mutex<Option<AggregateSnapshot>>,
}

impl RecordingRest {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            feedback: Mutex::new(Vec::new()),
            alerts: Mutex::new(Vec::new()),
            snapshot: Mutex::new(None),
        })
    }

    /// Serve this snapshot from `fetch_aggregate`
    pub fn set_snapshot(&self, snapshot: AggregateSnapshot) {
        *self.snapshot.lock() = Some(snapshot);
    }
}

#[async_trait]
impl RestApi for RecordingRest {
    async fn submit_feedback(&self, request: &SubmitFeedback) -> SyncResult<()> {
        self.feedback.lock().push(request.clone());
        Ok(())
    }

    async fn update_alert(&self, request: &UpdateAlert) -> SyncResult<()> {
        self.alerts.lock().push(request.clone());
        Ok(())
    }

    async fn fetch_aggregate(&self, _event_id: &EventId) -> SyncResult<AggregateSnapshot> {
        self.snapshot
            .lock()
            .clone()
            .ok_or_else(|| SyncError::Rest("no snapshot configured".to_string()))
    }
}

//! Transport client
//!
//! Drives the live session: authentication handshake, reader task, heartbeat
//! watchdog, and the bounded reconnect loop. Inbound server messages are
//! forwarded to the router channel; connectivity changes are fanned out as
//! `TransportEvent`s.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use pulse_common::{HeartbeatConfig, ReconnectConfig, SyncError, SyncResult};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::{Connection, ConnectionState, Transport};
use crate::protocol::{ClientMessage, ServerMessage};

/// Handshake must complete within this window
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connectivity signals surfaced to the rest of the sync layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Initial connection established
    Connected,
    /// Unexpected drop detected; a bounded retry attempt is about to run
    Reconnecting { attempt: u32 },
    /// A retry succeeded; recorded subscriptions must be replayed
    Reconnected,
    /// Identity rejected; never retried
    AuthFailed { message: String },
    /// Retry cap exceeded; session is down until an explicit reconnect
    Lost { attempts: u32 },
    /// Server-reported number of connected clients
    ConnectionCount { count: u32 },
}

/// Owns the one live duplex connection to the server
pub struct TransportClient {
    socket_url: String,
    reconnect: ReconnectConfig,
    heartbeat: HeartbeatConfig,
    transport: Arc<dyn Transport>,
    connection: Arc<Connection>,
    /// Sink of the current link; None while down
    outbound: RwLock<Option<mpsc::Sender<ClientMessage>>>,
    /// Router channel for inbound server messages
    incoming: mpsc::Sender<ServerMessage>,
    events: broadcast::Sender<TransportEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Bumped per established link so stale reader tasks cannot trigger
    /// a reconnect against a newer link
    generation: AtomicU64,
    reconnecting: AtomicBool,
    watchdog_started: AtomicBool,
}

impl TransportClient {
    /// Create a new transport client
    ///
    /// `incoming` receives every inbound message except heartbeats and
    /// connection counts, which are absorbed here.
    pub fn new(
        socket_url: String,
        reconnect: ReconnectConfig,
        heartbeat: HeartbeatConfig,
        transport: Arc<dyn Transport>,
        incoming: mpsc::Sender<ServerMessage>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            socket_url,
            reconnect,
            heartbeat,
            transport,
            connection: Arc::new(Connection::new()),
            outbound: RwLock::new(None),
            incoming,
            events,
            tasks: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
            reconnecting: AtomicBool::new(false),
            watchdog_started: AtomicBool::new(false),
        })
    }

    /// Subscribe to connectivity signals
    pub fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    /// Get the connection state holder
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Check whether the session is live
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Connect with the given identity token
    ///
    /// Idempotent: if a session is live or an attempt is already running, this
    /// returns without starting a second one. Fails with `SyncError::Auth` if
    /// the identity is rejected (never retried) and `SyncError::Network` on a
    /// transport-level failure.
    pub async fn connect(self: &Arc<Self>, token: impl Into<String>) -> SyncResult<()> {
        if self.connection.is_connected() || self.connection.is_attempting() {
            tracing::debug!("Connect requested while already connected or connecting");
            return Ok(());
        }

        self.connection.set_token(token.into());
        self.connection.set_state(ConnectionState::Connecting);

        match self.establish().await {
            Ok(()) => {
                self.start_watchdog();
                self.emit(TransportEvent::Connected);
                Ok(())
            }
            Err(e) => {
                self.connection.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Tear the session down
    ///
    /// Releases the link, the watchdog, and any reconnect loop on every exit
    /// path; safe to call when already disconnected.
    pub fn disconnect(&self) {
        self.connection.set_state(ConnectionState::Disconnected);
        self.connection.clear_token();
        self.outbound.write().take();
        self.reconnecting.store(false, Ordering::SeqCst);
        self.watchdog_started.store(false, Ordering::SeqCst);

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        tracing::info!("Transport disconnected");
    }

    /// Send a control message over the live link
    pub async fn send(&self, message: ClientMessage) -> SyncResult<()> {
        let sender = self.outbound.read().clone();
        match sender {
            Some(sender) => {
                tracing::trace!(kind = message.kind(), "Sending control message");
                sender
                    .send(message)
                    .await
                    .map_err(|_| SyncError::Network("link closed while sending".to_string()))
            }
            None => Err(SyncError::Network("not connected".to_string())),
        }
    }

    /// Open a link and run the auth handshake
    async fn establish(self: &Arc<Self>) -> SyncResult<()> {
        let token = self
            .connection
            .token()
            .ok_or_else(|| SyncError::Auth("no identity token".to_string()))?;

        let mut link = self.transport.connect(&self.socket_url).await?;

        link.outbound
            .send(ClientMessage::Identify { token })
            .await
            .map_err(|_| SyncError::Network("link closed during handshake".to_string()))?;

        // Wait for ready (or an auth rejection) before exposing the link
        loop {
            let frame = tokio::time::timeout(HANDSHAKE_TIMEOUT, link.inbound.recv())
                .await
                .map_err(|_| SyncError::Network("handshake timed out".to_string()))?;

            match frame {
                Some(ServerMessage::Ready) => break,
                Some(ServerMessage::Error { message, .. }) => {
                    return Err(SyncError::Auth(message));
                }
                Some(ServerMessage::Heartbeat { .. }) => {
                    self.connection.record_heartbeat();
                }
                Some(other) => {
                    tracing::debug!(?other, "Ignoring pre-ready frame");
                }
                None => {
                    return Err(SyncError::Network("link closed during handshake".to_string()));
                }
            }
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.outbound.write() = Some(link.outbound);

        let reader = self.clone().spawn_reader(link.inbound, generation);
        self.tasks.lock().push(reader);

        self.connection.record_heartbeat();
        self.connection.reset_retries();
        self.connection.set_state(ConnectionState::Connected);

        tracing::info!(url = %self.socket_url, generation, "Live session established");

        Ok(())
    }

    /// Pump inbound frames until the link dies
    fn spawn_reader(
        self: Arc<Self>,
        mut inbound: mpsc::Receiver<ServerMessage>,
        generation: u64,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                match message {
                    ServerMessage::Heartbeat { timestamp } => {
                        self.connection.record_heartbeat();
                        tracing::trace!(timestamp, "Heartbeat received");
                    }
                    ServerMessage::ConnectionCount { count } => {
                        self.emit(TransportEvent::ConnectionCount { count });
                    }
                    other => {
                        if self.incoming.send(other).await.is_err() {
                            tracing::debug!("Router channel closed; stopping reader");
                            return;
                        }
                    }
                }
            }

            // Stream ended. Only the reader of the current link may start a
            // reconnect, and only for an unexpected drop.
            let current = self.generation.load(Ordering::SeqCst);
            if current == generation && self.connection.is_connected() {
                tracing::warn!(generation, "Link dropped unexpectedly");
                self.clone().begin_reconnect();
            }
        })
    }

    /// Proactively reconnect when the server goes silent, even if the socket
    /// has not reported a drop yet
    fn start_watchdog(self: &Arc<Self>) {
        if self.watchdog_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let client = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(client.heartbeat.check_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if client.connection.is_connected()
                    && client.connection.time_since_heartbeat() > client.heartbeat.timeout()
                {
                    tracing::warn!(
                        silence_ms = client.connection.time_since_heartbeat().as_millis() as u64,
                        "Heartbeat silence exceeded threshold; treating as dead connection"
                    );
                    client.clone().begin_reconnect();
                }
            }
        });
        self.tasks.lock().push(task);
    }

    /// Start the bounded reconnect loop (at most one at a time)
    fn begin_reconnect(self: Arc<Self>) {
        if self.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }

        self.outbound.write().take();
        self.connection.set_state(ConnectionState::Reconnecting);

        let task = tokio::spawn(async move {
            self.clone().run_reconnect().await;
        });
        // Not tracked in `tasks`: the loop exits on its own and disconnect()
        // flips the state it checks before every attempt.
        drop(task);
    }

    async fn run_reconnect(self: Arc<Self>) {
        let max_attempts = self.reconnect.max_attempts;

        for attempt in 1..=max_attempts {
            if self.connection.state() != ConnectionState::Reconnecting {
                // Explicit disconnect while backing off
                self.reconnecting.store(false, Ordering::SeqCst);
                return;
            }

            self.connection.set_retry_count(attempt);
            self.emit(TransportEvent::Reconnecting { attempt });

            let delay = self.reconnect.delay_for(attempt);
            tracing::info!(attempt, max_attempts, delay_ms = delay.as_millis() as u64, "Reconnecting");
            tokio::time::sleep(delay).await;

            match self.establish().await {
                Ok(()) => {
                    self.reconnecting.store(false, Ordering::SeqCst);
                    self.emit(TransportEvent::Reconnected);
                    return;
                }
                Err(e) if e.is_auth() => {
                    self.connection.set_state(ConnectionState::Disconnected);
                    self.reconnecting.store(false, Ordering::SeqCst);
                    tracing::error!(error = %e, "Identity rejected during reconnect");
                    self.emit(TransportEvent::AuthFailed {
                        message: e.to_string(),
                    });
                    return;
                }
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "Reconnect attempt failed");
                }
            }
        }

        self.connection.set_state(ConnectionState::Disconnected);
        self.reconnecting.store(false, Ordering::SeqCst);
        tracing::error!(attempts = max_attempts, "Reconnect attempts exhausted");
        self.emit(TransportEvent::Lost {
            attempts: max_attempts,
        });
    }

    fn emit(&self, event: TransportEvent) {
        // No receivers is fine; signals are best-effort fan-out
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for TransportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportClient")
            .field("url", &self.socket_url)
            .field("connection", &self.connection)
            .finish()
    }
}

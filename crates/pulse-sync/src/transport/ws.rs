//! WebSocket transport
//!
//! Production `Transport` implementation over tokio-tungstenite. Each link is a
//! single pump task that serializes outbound control messages and decodes
//! inbound text frames; undecodable frames are logged and dropped.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use pulse_common::{SyncError, SyncResult};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{Transport, TransportLink};
use crate::protocol::{ClientMessage, ServerMessage};

/// Channel depth for each direction of a link
const LINK_BUFFER: usize = 256;

/// Connects real WebSocket links
#[derive(Debug, Default, Clone)]
pub struct WsTransport;

impl WsTransport {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &str) -> SyncResult<TransportLink> {
        let (socket, _response) = connect_async(url)
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        let (mut sink, mut stream) = socket.split();
        let (out_tx, mut out_rx) = mpsc::channel::<ClientMessage>(LINK_BUFFER);
        let (in_tx, in_rx) = mpsc::channel(LINK_BUFFER);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = out_rx.recv() => {
                        let Some(message) = outbound else { break };
                        let json = match message.to_json() {
                            Ok(json) => json,
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to encode control message");
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(Message::Text(json)).await {
                            tracing::warn!(error = %e, "WebSocket send failed");
                            break;
                        }
                    }
                    inbound = stream.next() => {
                        match inbound {
                            Some(Ok(Message::Text(text))) => {
                                match ServerMessage::from_json(&text) {
                                    Ok(message) => {
                                        if in_tx.send(message).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        tracing::warn!(error = %e, "Dropping undecodable frame");
                                    }
                                }
                            }
                            Some(Ok(Message::Ping(payload))) => {
                                if sink.send(Message::Pong(payload)).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "WebSocket read failed");
                                break;
                            }
                        }
                    }
                }
            }
            // Dropping in_tx ends the reader on the client side
            tracing::debug!("WebSocket link closed");
        });

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

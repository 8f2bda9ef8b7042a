//! # Signaling Channel
//!
//! Client end of the relay WebSocket.
//!
//! [`SignalingChannel::connect`] opens the socket and spawns two tasks: a
//! writer draining an unbounded queue of [`ClientEvent`]s, and a reader that
//! decodes [`ServerEvent`]s into another queue. Events are written in the
//! order they are queued. Frames that do not decode are logged and skipped.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use crate::error::{Error, Result};
use crate::protocol::{ClientEvent, ServerEvent};

/// An open connection to the relay.
pub struct SignalingChannel {
    outbound: mpsc::UnboundedSender<ClientEvent>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl SignalingChannel {
    /// Connect to `url` (e.g. `ws://localhost:4000/ws`).
    ///
    /// Returns the channel and the queue of events received from the relay.
    /// The queue ends when the relay closes the connection.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<ServerEvent>)> {
        let (ws_stream, _) = connect_async(url).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        tracing::info!(url, "Connected to relay");

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientEvent>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<ServerEvent>();

        let writer = tokio::spawn(async move {
            while let Some(event) = out_rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if ws_sender.send(WsMessage::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(event = event.name(), "Failed to serialize event: {}", e);
                    }
                }
            }
            let _ = ws_sender.close().await;
        });

        let reader = tokio::spawn(async move {
            while let Some(frame) = ws_receiver.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if in_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to parse relay event");
                        }
                    },
                    Ok(WsMessage::Close(_)) => {
                        tracing::info!("Relay closed the connection");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Relay WebSocket error");
                        break;
                    }
                    // tungstenite answers pings itself
                    _ => {}
                }
            }
        });

        Ok((
            Self {
                outbound: out_tx,
                writer,
                reader,
            },
            in_rx,
        ))
    }

    /// Queue `event` for the relay.
    pub fn send(&self, event: ClientEvent) -> Result<()> {
        self.outbound.send(event).map_err(|_| Error::ChannelClosed)
    }

    /// A handle for queueing events from elsewhere.
    pub fn sender(&self) -> mpsc::UnboundedSender<ClientEvent> {
        self.outbound.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed() || self.reader.is_finished()
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        self.writer.abort();
        self.reader.abort();
    }
}

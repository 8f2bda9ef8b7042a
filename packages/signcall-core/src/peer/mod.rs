//! # Peer Connection Adapter
//!
//! Wraps a concrete WebRTC engine behind a small, uniform surface.
//!
//! ```text
//! ┌──────────────┐  signal() / close()   ┌──────────────┐
//! │ Coordinator  │ ────────────────────► │ PeerBackend  │  (engine)
//! │              │ ◄──────────────────── │              │
//! └──────────────┘  PeerEvent            └──────────────┘
//!                    (translated from BackendEvent)
//! ```
//!
//! Engines plug in through [`PeerConnector`]. The adapter owns the receiving
//! half of the engine's event channel, so dropping or closing the adapter
//! unsubscribes from every engine event in one step. After `close()` no
//! further [`PeerEvent`] is delivered and `signal()` is a no-op.
//!
//! ICE `disconnected` and `failed` become [`PeerEvent::ConnectionLost`].
//! Engine errors are logged and swallowed: they never end a call on their
//! own.

pub mod loopback;
pub mod rtc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::media::{LocalMedia, TrackKind};
use crate::protocol::SignalData;

/// Public STUN servers used when no ICE servers are configured.
pub const DEFAULT_STUN_SERVERS: [&str; 4] = [
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
    "stun:stun2.l.google.com:19302",
    "stun:stun3.l.google.com:19302",
];

/// One STUN or TURN server entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    pub fn default_stun() -> Vec<IceServer> {
        DEFAULT_STUN_SERVERS.iter().map(|u| IceServer::stun(*u)).collect()
    }
}

/// Parameters for one peer connection.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Whether this side produces the offer.
    pub initiator: bool,
    /// Emit ICE candidates one at a time instead of waiting for gathering.
    pub trickle: bool,
    pub ice_servers: Vec<IceServer>,
}

impl PeerConfig {
    pub fn new(initiator: bool, ice_servers: Vec<IceServer>) -> Self {
        Self {
            initiator,
            trickle: true,
            ice_servers,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl IceConnectionState {
    /// States after which the media path is considered gone.
    pub fn is_connection_lost(self) -> bool {
        matches!(
            self,
            IceConnectionState::Disconnected | IceConnectionState::Failed
        )
    }
}

/// Media arriving from the other participant.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteStream {
    pub id: String,
    pub tracks: Vec<TrackKind>,
}

/// Raw events produced by an engine.
#[derive(Debug)]
pub enum BackendEvent {
    /// Local negotiation data for the other participant.
    Signal(SignalData),
    Track(RemoteStream),
    IceState(IceConnectionState),
    Error(String),
    Closed,
}

/// A live engine connection.
#[async_trait]
pub trait PeerBackend: Send {
    /// Apply negotiation data received from the other participant.
    async fn signal(&mut self, data: SignalData) -> Result<()>;

    /// Release the connection. Called at most once.
    async fn close(&mut self);
}

/// Factory for engine connections.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// Create a connection that sends `media` and reports through `events`.
    async fn connect(
        &self,
        config: PeerConfig,
        media: LocalMedia,
        events: mpsc::UnboundedSender<BackendEvent>,
    ) -> Result<Box<dyn PeerBackend>>;
}

/// Events the coordinator reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    Signal(SignalData),
    RemoteStream(RemoteStream),
    ConnectionLost(IceConnectionState),
}

/// Uniform wrapper around one engine connection.
pub struct PeerConnectionAdapter {
    backend: Box<dyn PeerBackend>,
    events: Option<mpsc::UnboundedReceiver<BackendEvent>>,
}

impl PeerConnectionAdapter {
    /// Create a connection through `connector`, sending `media`.
    pub async fn open(
        connector: &dyn PeerConnector,
        config: PeerConfig,
        media: LocalMedia,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let initiator = config.initiator;
        let backend = connector.connect(config, media, tx).await?;
        tracing::debug!(initiator, "Peer connection created");

        Ok(Self {
            backend,
            events: Some(rx),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_none()
    }

    /// Hand remote negotiation data to the engine. No-op once closed.
    pub async fn signal(&mut self, data: SignalData) -> Result<()> {
        if self.is_closed() {
            tracing::debug!(kind = data.kind(), "Dropping signal for closed peer");
            return Ok(());
        }
        self.backend.signal(data).await
    }

    /// Unsubscribe from the engine and release it. Idempotent.
    pub async fn close(&mut self) {
        if self.events.take().is_some() {
            self.backend.close().await;
            tracing::debug!("Peer connection closed");
        }
    }

    /// Wait for the next event. Returns `None` once closed or when the
    /// engine has gone away.
    pub async fn next_event(&mut self) -> Option<PeerEvent> {
        loop {
            let raw = self.events.as_mut()?.recv().await?;
            if let Some(event) = translate(raw) {
                return Some(event);
            }
        }
    }

    /// The next event that is already queued, if any.
    pub fn try_next_event(&mut self) -> Option<PeerEvent> {
        loop {
            let raw = self.events.as_mut()?.try_recv().ok()?;
            if let Some(event) = translate(raw) {
                return Some(event);
            }
        }
    }
}

impl Drop for PeerConnectionAdapter {
    fn drop(&mut self) {
        if self.events.is_some() {
            tracing::warn!("Peer connection dropped without close()");
        }
    }
}

fn translate(raw: BackendEvent) -> Option<PeerEvent> {
    match raw {
        BackendEvent::Signal(data) => Some(PeerEvent::Signal(data)),
        BackendEvent::Track(stream) => Some(PeerEvent::RemoteStream(stream)),
        BackendEvent::IceState(state) if state.is_connection_lost() => {
            tracing::warn!(?state, "ICE connection lost");
            Some(PeerEvent::ConnectionLost(state))
        }
        BackendEvent::IceState(state) => {
            tracing::debug!(?state, "ICE state changed");
            None
        }
        BackendEvent::Error(e) => {
            tracing::warn!("Peer engine error: {}", e);
            None
        }
        BackendEvent::Closed => {
            tracing::debug!("Peer engine reported close");
            None
        }
    }
}

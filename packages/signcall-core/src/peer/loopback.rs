//! In-process peer engine.
//!
//! Negotiates with a synthetic SDP that only carries the local stream id and
//! its track kinds, and "connects" as soon as both descriptions are known.
//! No packets leave the process and the SDP is not interoperable with a
//! real WebRTC stack. Used for tests and relay development; real sessions
//! go through [`super::rtc::WebRtcConnector`].
//!
//! Event order per side:
//!
//! - initiator: `offer`, `candidate` on creation; remote track and
//!   `connected` once the answer is applied.
//! - answerer: `answer`, `candidate`, remote track and `connected` once the
//!   offer is applied.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{BackendEvent, IceConnectionState, PeerBackend, PeerConfig, PeerConnector, RemoteStream};
use crate::error::{Error, Result};
use crate::media::{LocalMedia, TrackKind};
use crate::protocol::{IceCandidate, SignalData};

const MSID_SEMANTIC: &str = "a=msid-semantic: WMS ";

/// Connector for [`LoopbackPeer`] connections.
///
/// Keeps the event senders of the connections it created so tests can
/// inject ICE state changes.
#[derive(Default)]
pub struct LoopbackConnector {
    connections: Mutex<Vec<mpsc::UnboundedSender<BackendEvent>>>,
}

impl LoopbackConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections created so far.
    pub fn connections_opened(&self) -> usize {
        self.connections.lock().len()
    }

    /// Report `state` on every connection that is still subscribed.
    /// Returns how many received it.
    pub fn inject_ice_state(&self, state: IceConnectionState) -> usize {
        self.connections
            .lock()
            .iter()
            .filter(|tx| tx.send(BackendEvent::IceState(state)).is_ok())
            .count()
    }
}

#[async_trait]
impl PeerConnector for LoopbackConnector {
    async fn connect(
        &self,
        config: PeerConfig,
        media: LocalMedia,
        events: mpsc::UnboundedSender<BackendEvent>,
    ) -> Result<Box<dyn PeerBackend>> {
        if media.live_track_count() == 0 {
            return Err(Error::PeerCreationFailed(
                "local media has no live tracks".to_string(),
            ));
        }

        self.connections.lock().push(events.clone());
        let peer = LoopbackPeer::new(config, media, events);
        peer.start();
        Ok(Box::new(peer))
    }
}

/// One loopback connection.
pub struct LoopbackPeer {
    config: PeerConfig,
    local: LocalMedia,
    events: mpsc::UnboundedSender<BackendEvent>,
    remote: Option<RemoteStream>,
    remote_candidates: usize,
    closed: bool,
}

impl LoopbackPeer {
    fn new(config: PeerConfig, local: LocalMedia, events: mpsc::UnboundedSender<BackendEvent>) -> Self {
        Self {
            config,
            local,
            events,
            remote: None,
            remote_candidates: 0,
            closed: false,
        }
    }

    fn emit(&self, event: BackendEvent) {
        // Receiver gone means the adapter unsubscribed.
        let _ = self.events.send(event);
    }

    fn start(&self) {
        self.emit(BackendEvent::IceState(IceConnectionState::New));
        if self.config.initiator {
            self.emit(BackendEvent::Signal(SignalData::Offer {
                sdp: describe(&self.local),
            }));
            self.emit_candidate();
        }
    }

    fn emit_candidate(&self) {
        if !self.config.trickle {
            return;
        }
        self.emit(BackendEvent::Signal(SignalData::Candidate {
            candidate: IceCandidate {
                candidate: "candidate:1 1 udp 2122260223 127.0.0.1 9 typ host".to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_m_line_index: Some(0),
            },
        }));
    }

    fn connect_remote(&mut self, stream: RemoteStream) {
        self.remote = Some(stream.clone());
        self.emit(BackendEvent::IceState(IceConnectionState::Checking));
        self.emit(BackendEvent::Track(stream));
        self.emit(BackendEvent::IceState(IceConnectionState::Connected));
    }
}

#[async_trait]
impl PeerBackend for LoopbackPeer {
    async fn signal(&mut self, data: SignalData) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        match data {
            SignalData::Offer { sdp } => {
                if self.config.initiator {
                    return Err(Error::SignalRejected(
                        "offer received by the offering side".to_string(),
                    ));
                }
                if self.remote.is_some() {
                    tracing::debug!("Ignoring repeated offer");
                    return Ok(());
                }
                let stream = parse(&sdp)?;
                self.emit(BackendEvent::Signal(SignalData::Answer {
                    sdp: describe(&self.local),
                }));
                self.emit_candidate();
                self.connect_remote(stream);
            }
            SignalData::Answer { sdp } => {
                if !self.config.initiator {
                    return Err(Error::SignalRejected(
                        "answer received by the answering side".to_string(),
                    ));
                }
                if self.remote.is_some() {
                    tracing::debug!("Ignoring repeated answer");
                    return Ok(());
                }
                let stream = parse(&sdp)?;
                self.connect_remote(stream);
            }
            SignalData::Candidate { .. } => {
                self.remote_candidates += 1;
                tracing::trace!(count = self.remote_candidates, "Remote candidate applied");
            }
        }
        Ok(())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.emit(BackendEvent::IceState(IceConnectionState::Closed));
            self.emit(BackendEvent::Closed);
        }
    }
}

/// Synthetic session description for `media`.
fn describe(media: &LocalMedia) -> String {
    let mut sdp = String::from("v=0\r\no=- 0 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n");
    sdp.push_str(MSID_SEMANTIC);
    sdp.push_str(media.id());
    sdp.push_str("\r\n");

    for track in media.tracks().iter().filter(|t| t.is_live()) {
        let line = match track.kind() {
            TrackKind::Audio => "m=audio 9 UDP/TLS/RTP/SAVPF 111",
            TrackKind::Video => "m=video 9 UDP/TLS/RTP/SAVPF 96",
        };
        sdp.push_str(line);
        sdp.push_str("\r\n");
        sdp.push_str(&format!("a=msid:{} {}\r\n", media.id(), track.id()));
    }
    sdp
}

fn parse(sdp: &str) -> Result<RemoteStream> {
    let mut id = None;
    let mut tracks = Vec::new();

    for line in sdp.lines() {
        if let Some(rest) = line.strip_prefix(MSID_SEMANTIC) {
            id = Some(rest.trim().to_string());
        } else if line.starts_with("m=audio") {
            tracks.push(TrackKind::Audio);
        } else if line.starts_with("m=video") {
            tracks.push(TrackKind::Video);
        }
    }

    let id = id.ok_or_else(|| Error::SignalRejected("session description has no stream".to_string()))?;
    Ok(RemoteStream { id, tracks })
}

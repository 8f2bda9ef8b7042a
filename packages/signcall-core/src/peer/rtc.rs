//! WebRTC peer engine backed by the `webrtc` crate.
//!
//! Each live local track becomes a [`TrackLocalStaticSample`] fed from the
//! track's sample broadcast (Opus for audio, VP8 for video). Offers, answers
//! and trickled ICE candidates come out as [`BackendEvent::Signal`]; remote
//! tracks are reported per stream as they arrive.
//!
//! Candidates that arrive before the remote description are held back and
//! applied once it is set.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use super::{BackendEvent, IceConnectionState, IceServer, PeerBackend, PeerConfig, PeerConnector, RemoteStream};
use crate::error::{Error, Result};
use crate::media::{LocalMedia, MediaTrack, TrackKind};
use crate::protocol::{IceCandidate, SignalData};

/// Connector for [`WebRtcBackend`] connections.
#[derive(Default)]
pub struct WebRtcConnector {
    remote_tracks: Option<mpsc::UnboundedSender<Arc<TrackRemote>>>,
}

impl WebRtcConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward every remote track to `sink` for decoding and rendering.
    pub fn with_remote_tracks(mut self, sink: mpsc::UnboundedSender<Arc<TrackRemote>>) -> Self {
        self.remote_tracks = Some(sink);
        self
    }
}

#[async_trait]
impl PeerConnector for WebRtcConnector {
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

        let api = build_api()?;
        let pc = Arc::new(
            api.new_peer_connection(rtc_configuration(&config.ice_servers))
                .await
                .map_err(creation_failed)?,
        );

        install_handlers(&pc, &config, &events, self.remote_tracks.clone());

        let mut backend = WebRtcBackend {
            pc,
            events,
            trickle: config.trickle,
            pending_candidates: Vec::new(),
            tasks: Vec::new(),
            closed: false,
        };

        if let Err(e) = backend.start(&config, &media).await {
            backend.shutdown().await;
            return Err(e);
        }
        Ok(Box::new(backend))
    }
}

/// One live `RTCPeerConnection`.
pub struct WebRtcBackend {
    pc: Arc<RTCPeerConnection>,
    events: mpsc::UnboundedSender<BackendEvent>,
    trickle: bool,
    pending_candidates: Vec<RTCIceCandidateInit>,
    tasks: Vec<JoinHandle<()>>,
    closed: bool,
}

impl WebRtcBackend {
    fn emit(&self, event: BackendEvent) {
        let _ = self.events.send(event);
    }

    async fn start(&mut self, config: &PeerConfig, media: &LocalMedia) -> Result<()> {
        for track in media.tracks().iter().filter(|t| t.is_live()) {
            self.add_local_track(track, media.id()).await?;
        }

        if config.initiator {
            let offer = self.pc.create_offer(None).await.map_err(creation_failed)?;
            let sdp = self.apply_local(offer).await.map_err(creation_failed)?;
            self.emit(BackendEvent::Signal(SignalData::Offer { sdp }));
        }
        Ok(())
    }

    async fn add_local_track(&mut self, track: &MediaTrack, stream_id: &str) -> Result<()> {
        let local = Arc::new(TrackLocalStaticSample::new(
            codec_for(track.kind()),
            track.id().to_string(),
            stream_id.to_string(),
        ));
        let sender = self
            .pc
            .add_track(Arc::clone(&local) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(creation_failed)?;

        // RTCP has to be drained for the interceptors to run.
        self.tasks.push(tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        }));

        let mut samples = track.subscribe();
        let track_id = track.id().to_string();
        self.tasks.push(tokio::spawn(async move {
            loop {
                match samples.recv().await {
                    Ok(sample) => {
                        let sample = Sample {
                            data: sample.data,
                            duration: sample.duration,
                            ..Default::default()
                        };
                        if let Err(e) = local.write_sample(&sample).await {
                            tracing::debug!(track = %track_id, "Failed to write sample: {}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(track = %track_id, skipped, "Sample pump lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
        Ok(())
    }

    /// Set a local description and return the SDP to send.
    ///
    /// Without trickle the SDP is only read back after gathering finishes so
    /// it carries every candidate.
    async fn apply_local(&self, desc: RTCSessionDescription) -> std::result::Result<String, webrtc::Error> {
        let mut gathered = self.pc.gathering_complete_promise().await;
        self.pc.set_local_description(desc).await?;
        if !self.trickle {
            let _ = gathered.recv().await;
        }
        let local = self.pc.local_description().await;
        Ok(local.map(|d| d.sdp).unwrap_or_default())
    }

    async fn apply_remote(&mut self, desc: RTCSessionDescription) -> Result<()> {
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(rejected)?;
        for candidate in std::mem::take(&mut self.pending_candidates) {
            self.pc.add_ice_candidate(candidate).await.map_err(rejected)?;
        }
        Ok(())
    }

    async fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Err(e) = self.pc.close().await {
            tracing::debug!("Error closing peer connection: {}", e);
        }
    }
}

#[async_trait]
impl PeerBackend for WebRtcBackend {
    async fn signal(&mut self, data: SignalData) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        match data {
            SignalData::Offer { sdp } => {
                let offer = RTCSessionDescription::offer(sdp).map_err(rejected)?;
                self.apply_remote(offer).await?;
                let answer = self.pc.create_answer(None).await.map_err(rejected)?;
                let sdp = self.apply_local(answer).await.map_err(rejected)?;
                self.emit(BackendEvent::Signal(SignalData::Answer { sdp }));
            }
            SignalData::Answer { sdp } => {
                let answer = RTCSessionDescription::answer(sdp).map_err(rejected)?;
                self.apply_remote(answer).await?;
            }
            SignalData::Candidate { candidate } => {
                let init = candidate_init(candidate);
                if self.pc.remote_description().await.is_none() {
                    self.pending_candidates.push(init);
                } else {
                    self.pc.add_ice_candidate(init).await.map_err(rejected)?;
                }
            }
        }
        Ok(())
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.shutdown().await;
        self.emit(BackendEvent::Closed);
    }
}

fn build_api() -> Result<API> {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_default_codecs()
        .map_err(creation_failed)?;
    let registry = register_default_interceptors(Registry::new(), &mut media_engine)
        .map_err(creation_failed)?;
    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

fn rtc_configuration(servers: &[IceServer]) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: servers
            .iter()
            .map(|s| RTCIceServer {
                urls: s.urls.clone(),
                username: s.username.clone().unwrap_or_default(),
                credential: s.credential.clone().unwrap_or_default(),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

fn install_handlers(
    pc: &RTCPeerConnection,
    config: &PeerConfig,
    events: &mpsc::UnboundedSender<BackendEvent>,
    remote_tracks: Option<mpsc::UnboundedSender<Arc<TrackRemote>>>,
) {
    if config.trickle {
        let tx = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let tx = tx.clone();
            Box::pin(async move {
                // None marks the end of gathering.
                let Some(candidate) = candidate else { return };
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = tx.send(BackendEvent::Signal(SignalData::Candidate {
                            candidate: IceCandidate {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_m_line_index: init.sdp_mline_index,
                            },
                        }));
                    }
                    Err(e) => {
                        let _ = tx.send(BackendEvent::Error(e.to_string()));
                    }
                }
            })
        }));
    }

    let tx = events.clone();
    pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
        if let Some(state) = ice_state(state) {
            let _ = tx.send(BackendEvent::IceState(state));
        }
        Box::pin(async {})
    }));

    let tx = events.clone();
    let seen: Arc<Mutex<Vec<TrackKind>>> = Arc::new(Mutex::new(Vec::new()));
    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>, _receiver: Arc<RTCRtpReceiver>, _transceiver: Arc<RTCRtpTransceiver>| {
            let kind = match track.kind() {
                RTPCodecType::Audio => Some(TrackKind::Audio),
                RTPCodecType::Video => Some(TrackKind::Video),
                _ => None,
            };
            if let Some(kind) = kind {
                let tracks = {
                    let mut seen = seen.lock();
                    seen.push(kind);
                    seen.clone()
                };
                let _ = tx.send(BackendEvent::Track(RemoteStream {
                    id: track.stream_id(),
                    tracks,
                }));
            }
            if let Some(sink) = &remote_tracks {
                let _ = sink.send(track);
            }
            Box::pin(async {})
        },
    ));
}

fn codec_for(kind: TrackKind) -> RTCRtpCodecCapability {
    match kind {
        TrackKind::Audio => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48000,
            channels: 2,
            ..Default::default()
        },
        TrackKind::Video => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        },
    }
}

fn ice_state(state: RTCIceConnectionState) -> Option<IceConnectionState> {
    match state {
        RTCIceConnectionState::New => Some(IceConnectionState::New),
        RTCIceConnectionState::Checking => Some(IceConnectionState::Checking),
        RTCIceConnectionState::Connected => Some(IceConnectionState::Connected),
        RTCIceConnectionState::Completed => Some(IceConnectionState::Completed),
        RTCIceConnectionState::Disconnected => Some(IceConnectionState::Disconnected),
        RTCIceConnectionState::Failed => Some(IceConnectionState::Failed),
        RTCIceConnectionState::Closed => Some(IceConnectionState::Closed),
        _ => None,
    }
}

fn candidate_init(candidate: IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.candidate,
        sdp_mid: candidate.sdp_mid,
        sdp_mline_index: candidate.sdp_m_line_index,
        ..Default::default()
    }
}

fn creation_failed(e: webrtc::Error) -> Error {
    Error::PeerCreationFailed(e.to_string())
}

fn rejected(e: webrtc::Error) -> Error {
    Error::SignalRejected(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media() -> LocalMedia {
        LocalMedia::new(vec![
            MediaTrack::new(TrackKind::Audio, "mic"),
            MediaTrack::new(TrackKind::Video, "camera"),
        ])
    }

    async fn next_signal(rx: &mut mpsc::UnboundedReceiver<BackendEvent>) -> SignalData {
        loop {
            let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for signal")
                .expect("engine went away");
            if let BackendEvent::Signal(data) = event {
                if !matches!(data, SignalData::Candidate { .. }) {
                    return data;
                }
            }
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_offer_answer_exchange() {
        let connector = WebRtcConnector::new();

        let (offer_tx, mut offer_rx) = mpsc::unbounded_channel();
        let mut offerer = connector
            .connect(PeerConfig::new(true, vec![]), media(), offer_tx)
            .await
            .unwrap();
        let offer = next_signal(&mut offer_rx).await;
        match &offer {
            SignalData::Offer { sdp } => {
                assert!(sdp.contains("m=audio"));
                assert!(sdp.contains("m=video"));
            }
            other => panic!("expected offer, got {:?}", other),
        }

        let (answer_tx, mut answer_rx) = mpsc::unbounded_channel();
        let mut answerer = connector
            .connect(PeerConfig::new(false, vec![]), media(), answer_tx)
            .await
            .unwrap();
        answerer.signal(offer).await.unwrap();
        let answer = next_signal(&mut answer_rx).await;
        assert!(matches!(answer, SignalData::Answer { .. }));

        offerer.signal(answer).await.unwrap();

        offerer.close().await;
        answerer.close().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_garbage_offer_is_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut peer = WebRtcConnector::new()
            .connect(PeerConfig::new(false, vec![]), media(), tx)
            .await
            .unwrap();
        let result = peer
            .signal(SignalData::Offer {
                sdp: "not sdp".to_string(),
            })
            .await;
        assert!(matches!(result, Err(Error::SignalRejected(_))));
        peer.close().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_early_candidate_is_held_until_remote_description() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut peer = WebRtcConnector::new()
            .connect(PeerConfig::new(false, vec![]), media(), tx)
            .await
            .unwrap();
        peer.signal(SignalData::Candidate {
            candidate: IceCandidate {
                candidate: "candidate:1 1 udp 2122260223 127.0.0.1 9 typ host".to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_m_line_index: Some(0),
            },
        })
        .await
        .unwrap();
        peer.close().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_close_reports_closed_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut peer = WebRtcConnector::new()
            .connect(PeerConfig::new(false, vec![]), media(), tx)
            .await
            .unwrap();
        peer.close().await;
        peer.close().await;

        let mut closed = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, BackendEvent::Closed) {
                closed += 1;
            }
        }
        assert_eq!(closed, 1);
    }

    #[tokio::test]
    async fn test_connect_without_live_tracks_fails() {
        let local = media();
        local.stop_all();
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = WebRtcConnector::new()
            .connect(PeerConfig::new(true, vec![]), local, tx)
            .await;
        assert!(matches!(result, Err(Error::PeerCreationFailed(_))));
    }

    #[test]
    fn test_ice_state_mapping() {
        assert_eq!(
            ice_state(RTCIceConnectionState::Failed),
            Some(IceConnectionState::Failed)
        );
        assert_eq!(
            ice_state(RTCIceConnectionState::Disconnected),
            Some(IceConnectionState::Disconnected)
        );
        assert_eq!(ice_state(RTCIceConnectionState::Unspecified), None);
    }

    #[test]
    fn test_ice_servers_carry_credentials() {
        let servers = vec![
            IceServer::stun("stun:stun.l.google.com:19302"),
            IceServer {
                urls: vec!["turn:turn.example.org:3478".to_string()],
                username: Some("user".to_string()),
                credential: Some("secret".to_string()),
            },
        ];
        let config = rtc_configuration(&servers);
        assert_eq!(config.ice_servers.len(), 2);
        assert_eq!(config.ice_servers[0].username, "");
        assert_eq!(config.ice_servers[1].username, "user");
        assert_eq!(config.ice_servers[1].credential, "secret");
    }
}

//! # Local Media
//!
//! Camera and microphone tracks owned by the local client.
//!
//! A [`LocalMedia`] stream is acquired through a [`MediaSource`] before a
//! call is placed or accepted, handed to the peer engine, and stopped by the
//! coordinator when the call ends. Track handles are shared: every clone of
//! a [`MediaTrack`] sees the same stopped flag, so a track stopped through
//! one handle is stopped everywhere and a second `stop()` is a no-op.
//!
//! Capture itself lives in the host application. It pushes encoded frames
//! into a track with [`MediaTrack::push_sample`]; every peer engine sending
//! that track subscribes with [`MediaTrack::subscribe`]. Stopping the track
//! ends every subscription.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Samples buffered per subscriber before the slowest one starts skipping.
const SAMPLE_BUFFER: usize = 64;

/// One encoded frame (Opus for audio, VP8 for video).
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSample {
    pub data: Bytes,
    pub duration: Duration,
}

struct TrackInner {
    id: String,
    kind: TrackKind,
    label: String,
    stopped: AtomicBool,
    samples: Mutex<Option<broadcast::Sender<MediaSample>>>,
}

/// Handle to one local capture track.
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: Uuid::new_v4().to_string(),
                kind,
                label: label.into(),
                stopped: AtomicBool::new(false),
                samples: Mutex::new(Some(broadcast::channel(SAMPLE_BUFFER).0)),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn is_live(&self) -> bool {
        !self.inner.stopped.load(Ordering::Acquire)
    }

    /// Stop the track. Returns `true` only for the call that actually
    /// stopped it.
    pub fn stop(&self) -> bool {
        let first = !self.inner.stopped.swap(true, Ordering::AcqRel);
        if first {
            self.inner.samples.lock().take();
            tracing::debug!(track = self.id(), kind = ?self.kind(), "Local track stopped");
        }
        first
    }

    /// Feed one encoded frame to every subscriber. Returns how many
    /// subscribers received it; a stopped track delivers nothing.
    pub fn push_sample(&self, sample: MediaSample) -> usize {
        match self.inner.samples.lock().as_ref() {
            Some(tx) => tx.send(sample).unwrap_or(0),
            None => 0,
        }
    }

    /// Receive the frames pushed from now on. The receiver reports closed
    /// once the track is stopped.
    pub fn subscribe(&self) -> broadcast::Receiver<MediaSample> {
        match self.inner.samples.lock().as_ref() {
            Some(tx) => tx.subscribe(),
            None => broadcast::channel(1).1,
        }
    }
}

impl std::fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("label", &self.inner.label)
            .field("live", &self.is_live())
            .finish()
    }
}

/// A local capture stream: one id plus its tracks.
#[derive(Debug, Clone)]
pub struct LocalMedia {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl LocalMedia {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn live_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }

    /// Stop every track, returning how many were still live.
    pub fn stop_all(&self) -> usize {
        self.tracks.iter().filter(|t| t.stop()).count()
    }
}

// ── Constraints ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    User,
    Environment,
}

/// `min` / `ideal` / `max` triple as used by `getUserMedia`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: u32,
    pub ideal: u32,
    pub max: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConstraints {
    pub width: Range,
    pub height: Range,
    pub frame_rate: Range,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facing_mode: Option<FacingMode>,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            width: Range {
                min: 640,
                ideal: 1280,
                max: 1920,
            },
            height: Range {
                min: 360,
                ideal: 720,
                max: 1080,
            },
            frame_rate: Range {
                min: 16,
                ideal: 30,
                max: 30,
            },
            facing_mode: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub video: Option<VideoConstraints>,
    pub audio: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            video: Some(VideoConstraints::default()),
            audio: true,
        }
    }
}

// ── Sources ──────────────────────────────────────────────────────────────────

/// Acquires camera and microphone access.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<LocalMedia>;
}

/// Media source that fabricates tracks without touching real devices.
///
/// Used by headless clients and tests. Every stream it hands out is kept so
/// callers can check the tracks were released.
#[derive(Default)]
pub struct SyntheticMedia {
    unavailable: Option<String>,
    issued: Mutex<Vec<LocalMedia>>,
}

impl SyntheticMedia {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source whose every acquisition fails with `reason`.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            unavailable: Some(reason.into()),
            issued: Mutex::new(Vec::new()),
        }
    }

    /// Every stream handed out so far.
    pub fn issued(&self) -> Vec<LocalMedia> {
        self.issued.lock().clone()
    }

    /// Tracks from any issued stream that have not been stopped.
    pub fn live_track_count(&self) -> usize {
        self.issued.lock().iter().map(LocalMedia::live_track_count).sum()
    }
}

#[async_trait]
impl MediaSource for SyntheticMedia {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<LocalMedia> {
        if let Some(reason) = &self.unavailable {
            return Err(Error::MediaUnavailable(reason.clone()));
        }

        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(MediaTrack::new(TrackKind::Audio, "synthetic microphone"));
        }
        if constraints.video.is_some() {
            tracks.push(MediaTrack::new(TrackKind::Video, "synthetic camera"));
        }
        if tracks.is_empty() {
            return Err(Error::MediaUnavailable(
                "constraints request neither audio nor video".to_string(),
            ));
        }

        let media = LocalMedia::new(tracks);
        self.issued.lock().push(media.clone());
        Ok(media)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_stops_once() {
        let track = MediaTrack::new(TrackKind::Audio, "mic");
        let clone = track.clone();

        assert!(track.is_live());
        assert!(clone.stop());
        assert!(!track.is_live());
        assert!(!track.stop());
    }

    #[tokio::test]
    async fn test_samples_reach_subscribers_until_stop() {
        let track = MediaTrack::new(TrackKind::Audio, "mic");
        let mut rx = track.subscribe();
        let sample = MediaSample {
            data: Bytes::from_static(&[1, 2, 3]),
            duration: Duration::from_millis(20),
        };

        assert_eq!(track.push_sample(sample.clone()), 1);
        assert_eq!(rx.recv().await.unwrap(), sample);

        track.stop();
        assert_eq!(track.push_sample(sample), 0);
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));

        // Subscribing after the stop yields an already closed receiver.
        let mut late = track.subscribe();
        assert!(late.recv().await.is_err());
    }

    #[test]
    fn test_stop_all_counts_live_tracks() {
        let audio = MediaTrack::new(TrackKind::Audio, "mic");
        let video = MediaTrack::new(TrackKind::Video, "cam");
        let media = LocalMedia::new(vec![audio.clone(), video]);

        audio.stop();
        assert_eq!(media.live_track_count(), 1);
        assert_eq!(media.stop_all(), 1);
        assert_eq!(media.live_track_count(), 0);
        assert_eq!(media.stop_all(), 0);
    }

    #[test]
    fn test_default_constraints() {
        let constraints = MediaConstraints::default();
        let video = constraints.video.unwrap();
        assert!(constraints.audio);
        assert_eq!(video.width.ideal, 1280);
        assert_eq!(video.height.min, 360);
        assert_eq!(video.frame_rate.max, 30);
    }

    #[tokio::test]
    async fn test_synthetic_media_tracks_issued_streams() {
        let source = SyntheticMedia::new();
        let media = source.acquire(&MediaConstraints::default()).await.unwrap();

        assert_eq!(media.tracks().len(), 2);
        assert_eq!(source.live_track_count(), 2);

        media.stop_all();
        assert_eq!(source.live_track_count(), 0);
        assert_eq!(source.issued().len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_source() {
        let source = SyntheticMedia::unavailable("camera busy");
        let err = source.acquire(&MediaConstraints::default()).await.unwrap_err();
        assert!(matches!(err, Error::MediaUnavailable(reason) if reason == "camera busy"));
    }

    #[tokio::test]
    async fn test_audio_only() {
        let source = SyntheticMedia::new();
        let constraints = MediaConstraints {
            video: None,
            audio: true,
        };
        let media = source.acquire(&constraints).await.unwrap();
        assert_eq!(media.tracks().len(), 1);
        assert_eq!(media.tracks()[0].kind(), TrackKind::Audio);
    }
}

//! Conference session capability and an in-process loopback implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

use super::track::{MediaKind, Track};
use crate::audio::AudioMixer;
use crate::error::{BridgeError, Result};

const LOOPBACK_CAMERA_ID: &str = "loopback-camera";

/// A local track as the session reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTrackInfo {
    pub id: String,
    pub kind: MediaKind,
    pub muted: bool,
}

/// An already-established call that accepts outbound tracks.
#[async_trait]
pub trait ConferenceSession: Send + Sync {
    /// Whether the call is still up and can take tracks.
    fn is_active(&self) -> bool;

    /// Negotiate a new outbound audio track.
    ///
    /// Fails with `SessionUnavailable` if the call is gone, or
    /// `AttachRejected` if the session refuses the track.
    async fn add_outbound_audio_track(&self, track: Arc<Track>) -> Result<()>;

    fn list_local_tracks(&self) -> Vec<LocalTrackInfo>;

    /// Stop sending a track. Removing an unknown id is not an error.
    async fn remove_track(&self, track_id: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopbackOptions {
    /// Refuse outbound tracks beyond this count. `None` is unbounded.
    pub max_tracks: Option<usize>,
    /// Simulated time to negotiate a new track.
    pub negotiation_delay_ms: u64,
    /// Rate of the mixed outbound stream.
    pub sample_rate: u32,
    /// Report a local camera track alongside the outbound audio, as a call
    /// with video on would.
    pub camera: bool,
}

impl Default for LoopbackOptions {
    fn default() -> Self {
        Self {
            max_tracks: None,
            negotiation_delay_ms: 0,
            sample_rate: 48000,
            camera: false,
        }
    }
}

/// In-process session: keeps outbound tracks and mixes them the way the far
/// end would hear them.
pub struct LoopbackSession {
    options: LoopbackOptions,
    active: AtomicBool,
    tracks: Mutex<Vec<Arc<Track>>>,
}

impl LoopbackSession {
    pub fn new(options: LoopbackOptions) -> Self {
        Self {
            options,
            active: AtomicBool::new(true),
            tracks: Mutex::new(Vec::new()),
        }
    }

    pub fn options(&self) -> &LoopbackOptions {
        &self.options
    }

    /// Hang up. Further attaches fail with `SessionUnavailable`.
    pub fn end(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            info!("Loopback session ended");
        }
    }

    pub fn track_count(&self) -> usize {
        self.tracks().len()
    }

    /// Whether every outbound track has played out.
    pub fn is_drained(&self) -> bool {
        self.tracks().iter().all(|t| t.is_finished())
    }

    /// Pull `frames` frames from every track and mix the unmuted ones.
    ///
    /// Muted tracks are still drained so they stay in step.
    pub fn render_outbound(&self, frames: usize) -> Vec<f32> {
        let tracks: Vec<Arc<Track>> = self.tracks().clone();
        let rate = self.options.sample_rate;

        let mut sources = Vec::with_capacity(tracks.len());
        for track in &tracks {
            let src_frames = AudioMixer::source_frames_for(frames, track.sample_rate(), rate);
            let mut buffer = vec![0.0f32; src_frames];
            let written = track.read(&mut buffer);
            buffer.truncate(written);

            if track.is_muted() {
                continue;
            }

            let mut resampled = AudioMixer::resample(&buffer, track.sample_rate(), rate);
            resampled.resize(frames, 0.0);
            sources.push(resampled);
        }

        let mut mixed = AudioMixer::mix(&sources);
        mixed.resize(frames, 0.0);
        mixed
    }

    /// Locks the track list, dropping tracks the bridge has already disposed.
    fn tracks(&self) -> MutexGuard<'_, Vec<Arc<Track>>> {
        let mut tracks = self.tracks.lock().unwrap_or_else(PoisonError::into_inner);
        tracks.retain(|t| !t.is_disposed());
        tracks
    }
}

impl Default for LoopbackSession {
    fn default() -> Self {
        Self::new(LoopbackOptions::default())
    }
}

#[async_trait]
impl ConferenceSession for LoopbackSession {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    async fn add_outbound_audio_track(&self, track: Arc<Track>) -> Result<()> {
        if self.options.negotiation_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.options.negotiation_delay_ms)).await;
        }

        if !self.is_active() {
            return Err(BridgeError::SessionUnavailable);
        }

        let mut tracks = self.tracks();
        if tracks.iter().any(|t| t.id() == track.id()) {
            return Err(BridgeError::rejected(format!(
                "track {} is already attached",
                track.id()
            )));
        }

        if let Some(max) = self.options.max_tracks {
            if tracks.len() >= max {
                return Err(BridgeError::rejected(format!(
                    "session already carries {max} outbound track(s)"
                )));
            }
        }

        debug!("Loopback session accepted track {}", track.id());
        tracks.push(track);
        Ok(())
    }

    fn list_local_tracks(&self) -> Vec<LocalTrackInfo> {
        let camera = self.options.camera.then(|| LocalTrackInfo {
            id: LOOPBACK_CAMERA_ID.to_string(),
            kind: MediaKind::Video,
            muted: false,
        });

        camera
            .into_iter()
            .chain(self.tracks().iter().map(|t| LocalTrackInfo {
                id: t.id().to_string(),
                kind: t.kind(),
                muted: t.is_muted(),
            }))
            .collect()
    }

    async fn remove_track(&self, track_id: &str) -> Result<()> {
        let mut tracks = self.tracks();
        let before = tracks.len();
        tracks.retain(|t| t.id() != track_id);
        if tracks.len() < before {
            debug!("Loopback session removed track {}", track_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::signal::tests::FixedGenerator;
    use crate::audio::{Signal, SignalOrigin};
    use crate::conference::SignalSink;

    fn track(value: f32) -> Arc<Track> {
        let (generator, _) = FixedGenerator::new(1, value);
        let signal = Signal::new(SignalOrigin::Tone, Box::new(generator));
        Arc::new(SignalSink::new().capture(&signal).unwrap())
    }

    #[tokio::test]
    async fn test_add_and_list() {
        let session = LoopbackSession::default();
        let t = track(0.5);
        session.add_outbound_audio_track(t.clone()).await.unwrap();

        let listed = session.list_local_tracks();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, t.id());
        assert_eq!(listed[0].kind, MediaKind::Audio);
        assert!(!listed[0].muted);
    }

    #[tokio::test]
    async fn test_camera_is_listed_but_not_counted() {
        let session = LoopbackSession::new(LoopbackOptions {
            camera: true,
            ..LoopbackOptions::default()
        });
        session.add_outbound_audio_track(track(0.5)).await.unwrap();

        let listed = session.list_local_tracks();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].kind, MediaKind::Video);
        assert_eq!(listed[1].kind, MediaKind::Audio);
        assert_eq!(session.track_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_track_is_rejected() {
        let session = LoopbackSession::default();
        let t = track(0.5);
        session.add_outbound_audio_track(t.clone()).await.unwrap();
        let result = session.add_outbound_audio_track(t).await;
        assert!(matches!(result, Err(BridgeError::AttachRejected(_))));
    }

    #[tokio::test]
    async fn test_track_limit_is_enforced() {
        let session = LoopbackSession::new(LoopbackOptions {
            max_tracks: Some(1),
            ..LoopbackOptions::default()
        });
        session.add_outbound_audio_track(track(0.5)).await.unwrap();
        let result = session.add_outbound_audio_track(track(0.5)).await;
        assert!(matches!(result, Err(BridgeError::AttachRejected(_))));
        assert_eq!(session.track_count(), 1);
    }

    #[tokio::test]
    async fn test_ended_session_is_unavailable() {
        let session = LoopbackSession::default();
        session.end();
        assert!(!session.is_active());
        let result = session.add_outbound_audio_track(track(0.5)).await;
        assert!(matches!(result, Err(BridgeError::SessionUnavailable)));
    }

    #[tokio::test]
    async fn test_remove_unknown_track_is_ok() {
        let session = LoopbackSession::default();
        session.remove_track("missing").await.unwrap();
    }

    #[tokio::test]
    async fn test_render_mixes_unmuted_tracks() {
        let session = LoopbackSession::default();
        let loud = track(0.5);
        let muted = track(0.9);
        muted.set_muted(true);
        session.add_outbound_audio_track(loud).await.unwrap();
        session.add_outbound_audio_track(muted).await.unwrap();

        let mixed = session.render_outbound(480);
        assert_eq!(mixed.len(), 480);
        assert!(mixed.iter().all(|&s| s == 0.5));
    }

    #[tokio::test]
    async fn test_disposed_tracks_are_not_listed() {
        let session = LoopbackSession::default();
        let t = track(0.5);
        session.add_outbound_audio_track(t.clone()).await.unwrap();
        t.dispose();
        assert!(session.list_local_tracks().is_empty());
        assert_eq!(session.track_count(), 0);
    }

    #[tokio::test]
    async fn test_render_without_tracks_is_silence() {
        let session = LoopbackSession::default();
        let mixed = session.render_outbound(64);
        assert_eq!(mixed, vec![0.0; 64]);
    }
}

//! Transportable tracks and the sink that produces them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

use crate::audio::{AudioMixer, Signal};
use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

/// Lifecycle of a track against a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackPhase {
    Idle,
    Attaching,
    Attached,
    /// Terminal. The signal claim has been released.
    Detached,
}

impl TrackPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Attaching => "attaching",
            Self::Attached => "attached",
            Self::Detached => "detached",
        }
    }
}

/// A signal wrapped for outbound transmission.
///
/// Delivers the signal's first channel as mono. A muted track still drains
/// its signal but yields silence.
pub struct Track {
    id: String,
    kind: MediaKind,
    signal: Signal,
    muted: AtomicBool,
    phase: Mutex<TrackPhase>,
    created_at: DateTime<Utc>,
}

impl Track {
    fn new(signal: Signal) -> Self {
        signal.retain_track();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: MediaKind::Audio,
            signal,
            muted: AtomicBool::new(false),
            phase: Mutex::new(TrackPhase::Idle),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    pub fn sample_rate(&self) -> u32 {
        self.signal.sample_rate()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Release);
        debug!("Track {} muted={}", self.id, muted);
    }

    pub fn phase(&self) -> TrackPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_disposed(&self) -> bool {
        self.phase() == TrackPhase::Detached
    }

    /// Move to `next` unless the track is already detached.
    pub(crate) fn advance(&self, next: TrackPhase) -> bool {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if *phase == TrackPhase::Detached {
            return false;
        }
        *phase = next;
        true
    }

    /// Whether the underlying signal has stopped or played out.
    pub fn is_finished(&self) -> bool {
        self.signal.is_finished()
    }

    /// Pull up to `out.len()` mono frames at the signal's sample rate.
    pub fn read(&self, out: &mut [f32]) -> usize {
        if self.is_disposed() {
            return 0;
        }

        let channels = self.signal.channels();
        let interleaved = self.signal.read_frames(out.len());
        let frames = if channels == 1 {
            out[..interleaved.len()].copy_from_slice(&interleaved);
            interleaved.len()
        } else {
            let first = AudioMixer::extract_channel(&interleaved, channels, 0);
            out[..first.len()].copy_from_slice(&first);
            first.len()
        };

        if self.is_muted() {
            out[..frames].fill(0.0);
        }
        frames
    }

    /// Release the track and its claim on the signal. Returns false if it
    /// was already disposed.
    pub fn dispose(&self) -> bool {
        {
            let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
            if *phase == TrackPhase::Detached {
                return false;
            }
            *phase = TrackPhase::Detached;
        }

        self.signal.release_track();
        info!("Track {} disposed", self.id);
        true
    }
}

impl Drop for Track {
    fn drop(&mut self) {
        if !self.is_disposed() {
            self.signal.release_track();
        }
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("muted", &self.is_muted())
            .field("phase", &self.phase())
            .field("signal", &self.signal)
            .finish()
    }
}

/// Turns any signal (synthesized, decoded or captured) into a track.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalSink;

impl SignalSink {
    pub fn new() -> Self {
        Self
    }

    pub fn capture(&self, signal: &Signal) -> Result<Track> {
        if signal.channels() == 0 {
            return Err(BridgeError::NoAudioChannel);
        }

        if signal.is_stopped() {
            return Err(BridgeError::invalid(format!(
                "signal {} is already stopped",
                signal.id()
            )));
        }

        let track = Track::new(signal.clone());
        debug!(
            "Captured {} signal {} as track {}",
            signal.origin().as_str(),
            signal.id(),
            track.id()
        );
        Ok(track)
    }
}

//! Shared handle over a running signal generator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use super::audio_source::SignalGenerator;
use super::local_output::{LocalOutput, MonitorHandle};

/// Where a signal's frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalOrigin {
    Tone,
    Remote,
    Microphone,
}

impl SignalOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tone => "tone",
            Self::Remote => "remote",
            Self::Microphone => "microphone",
        }
    }
}

/// An audio waveform that lives while referenced.
///
/// Cloning is cheap and yields another handle to the same generator. The
/// generator is released when [`Signal::stop`] is called, when the last track
/// capturing it is disposed, or when the last handle is dropped.
#[derive(Clone)]
pub struct Signal {
    inner: Arc<SignalInner>,
}

struct SignalInner {
    id: String,
    origin: SignalOrigin,
    sample_rate: u32,
    channels: u16,
    generator: Mutex<Box<dyn SignalGenerator>>,
    pending_monitor: Mutex<Option<PendingMonitor>>,
    monitor: Mutex<Option<MonitorHandle>>,
    stopped: AtomicBool,
    tracks: AtomicUsize,
}

/// Local playback that waits for the signal to go out on a call.
struct PendingMonitor {
    output: Arc<dyn LocalOutput>,
    generator: Box<dyn SignalGenerator>,
}

impl Signal {
    pub fn new(origin: SignalOrigin, generator: Box<dyn SignalGenerator>) -> Self {
        let sample_rate = generator.sample_rate();
        let channels = generator.channels();

        Self {
            inner: Arc::new(SignalInner {
                id: uuid::Uuid::new_v4().to_string(),
                origin,
                sample_rate,
                channels,
                generator: Mutex::new(generator),
                pending_monitor: Mutex::new(None),
                monitor: Mutex::new(None),
                stopped: AtomicBool::new(false),
                tracks: AtomicUsize::new(0),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn origin(&self) -> SignalOrigin {
        self.inner.origin
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.inner.channels
    }

    /// Render interleaved frames into `out`. Returns frames written.
    pub fn render(&self, out: &mut [f32]) -> usize {
        if self.is_stopped() || self.inner.channels == 0 {
            return 0;
        }
        self.inner.generator().render(out)
    }

    /// Render `frames` frames into a new interleaved buffer.
    pub fn read_frames(&self, frames: usize) -> Vec<f32> {
        let mut buffer = vec![0.0f32; frames * self.inner.channels as usize];
        let written = self.render(&mut buffer);
        buffer.truncate(written * self.inner.channels as usize);
        buffer
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Stopped, or a finite generator that has played out.
    pub fn is_finished(&self) -> bool {
        self.is_stopped() || self.inner.generator().is_finished()
    }

    /// Stop the generator and any local playback. Idempotent.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Arrange for `generator` to play on `output` once the signal is first
    /// attached. Replaces any earlier arrangement.
    pub(crate) fn defer_monitor(
        &self,
        output: Arc<dyn LocalOutput>,
        generator: Box<dyn SignalGenerator>,
    ) {
        if self.is_stopped() {
            return;
        }
        *lock(&self.inner.pending_monitor) = Some(PendingMonitor { output, generator });
    }

    /// Start deferred local playback, if any. Only the first call plays;
    /// playback then lives as long as the signal runs.
    pub(crate) fn start_monitor(&self) {
        let Some(pending) = lock(&self.inner.pending_monitor).take() else {
            return;
        };
        if self.is_stopped() {
            return;
        }

        match pending.output.play(pending.generator) {
            Ok(handle) => *lock(&self.inner.monitor) = Some(handle),
            Err(e) => warn!("Local playback unavailable, continuing without it: {}", e),
        }
    }

    #[cfg(test)]
    pub(crate) fn has_pending_monitor(&self) -> bool {
        lock(&self.inner.pending_monitor).is_some()
    }

    pub(crate) fn retain_track(&self) {
        self.inner.tracks.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop one track's claim; the last claim stops the signal.
    pub(crate) fn release_track(&self) {
        let previous = self
            .inner
            .tracks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);

        if previous == 1 {
            debug!("Last track released signal {}", self.inner.id);
            self.inner.stop();
        }
    }

    pub(crate) fn track_count(&self) -> usize {
        self.inner.tracks.load(Ordering::Acquire)
    }
}

impl SignalInner {
    fn generator(&self) -> MutexGuard<'_, Box<dyn SignalGenerator>> {
        lock(&self.generator)
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        self.generator().stop();
        lock(&self.pending_monitor).take();
        // Dropping the handle stops local playback
        lock(&self.monitor).take();
        debug!("Signal {} ({}) stopped", self.id, self.origin.as_str());
    }
}

impl Drop for SignalInner {
    fn drop(&mut self) {
        if !*self.stopped.get_mut() {
            self.generator
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .stop();
        }
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("origin", &self.inner.origin)
            .field("sample_rate", &self.inner.sample_rate)
            .field("channels", &self.inner.channels)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Constant-value generator for tests; flags when stopped.
    pub(crate) struct FixedGenerator {
        pub channels: u16,
        pub value: f32,
        pub stopped: Arc<AtomicBool>,
    }

    impl FixedGenerator {
        pub fn new(channels: u16, value: f32) -> (Self, Arc<AtomicBool>) {
            let stopped = Arc::new(AtomicBool::new(false));
            (
                Self {
                    channels,
                    value,
                    stopped: stopped.clone(),
                },
                stopped,
            )
        }
    }

    impl SignalGenerator for FixedGenerator {
        fn sample_rate(&self) -> u32 {
            48000
        }

        fn channels(&self) -> u16 {
            self.channels
        }

        fn render(&mut self, out: &mut [f32]) -> usize {
            if self.channels == 0 {
                return 0;
            }
            out.fill(self.value);
            out.len() / self.channels as usize
        }

        fn stop(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    /// Local output that counts how often playback was started.
    #[derive(Default)]
    pub(crate) struct CountingOutput {
        pub plays: AtomicUsize,
    }

    impl LocalOutput for CountingOutput {
        fn play(
            &self,
            _generator: Box<dyn SignalGenerator>,
        ) -> crate::error::Result<MonitorHandle> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            Ok(MonitorHandle::inert())
        }
    }

    #[test]
    fn test_deferred_monitor_plays_once() {
        let output = Arc::new(CountingOutput::default());
        let (generator, _) = FixedGenerator::new(1, 0.5);
        let (monitor, _) = FixedGenerator::new(1, 0.5);
        let signal = Signal::new(SignalOrigin::Remote, Box::new(generator));

        signal.defer_monitor(output.clone(), Box::new(monitor));
        assert_eq!(output.plays.load(Ordering::SeqCst), 0);

        signal.start_monitor();
        signal.start_monitor();
        assert_eq!(output.plays.load(Ordering::SeqCst), 1);
        assert!(!signal.has_pending_monitor());
    }

    #[test]
    fn test_stopped_signal_never_starts_monitor() {
        let output = Arc::new(CountingOutput::default());
        let (generator, _) = FixedGenerator::new(1, 0.5);
        let (monitor, _) = FixedGenerator::new(1, 0.5);
        let signal = Signal::new(SignalOrigin::Remote, Box::new(generator));

        signal.defer_monitor(output.clone(), Box::new(monitor));
        signal.stop();
        signal.start_monitor();

        assert_eq!(output.plays.load(Ordering::SeqCst), 0);
        assert!(!signal.has_pending_monitor());
    }

    #[test]
    fn test_read_frames_interleaved() {
        let (generator, _) = FixedGenerator::new(2, 0.25);
        let signal = Signal::new(SignalOrigin::Tone, Box::new(generator));
        let frames = signal.read_frames(4);
        assert_eq!(frames.len(), 8);
        assert!(frames.iter().all(|&s| s == 0.25));
    }

    #[test]
    fn test_stop_releases_generator_once() {
        let (generator, stopped) = FixedGenerator::new(1, 0.5);
        let signal = Signal::new(SignalOrigin::Tone, Box::new(generator));
        signal.stop();
        signal.stop();
        assert!(stopped.load(Ordering::SeqCst));
        assert!(signal.is_stopped());
        assert!(signal.read_frames(16).is_empty());
    }

    #[test]
    fn test_drop_stops_generator() {
        let (generator, stopped) = FixedGenerator::new(1, 0.5);
        let signal = Signal::new(SignalOrigin::Tone, Box::new(generator));
        let clone = signal.clone();
        drop(signal);
        assert!(!stopped.load(Ordering::SeqCst));
        drop(clone);
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_last_track_release_stops_signal() {
        let (generator, stopped) = FixedGenerator::new(1, 0.5);
        let signal = Signal::new(SignalOrigin::Remote, Box::new(generator));
        signal.retain_track();
        signal.retain_track();

        signal.release_track();
        assert!(!signal.is_stopped());

        signal.release_track();
        assert!(signal.is_stopped());
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_release_without_tracks_is_noop() {
        let (generator, _) = FixedGenerator::new(1, 0.5);
        let signal = Signal::new(SignalOrigin::Tone, Box::new(generator));
        signal.release_track();
        assert!(!signal.is_stopped());
        assert_eq!(signal.track_count(), 0);
    }

    #[test]
    fn test_origin_as_str() {
        assert_eq!(SignalOrigin::Tone.as_str(), "tone");
        assert_eq!(SignalOrigin::Remote.as_str(), "remote");
        assert_eq!(SignalOrigin::Microphone.as_str(), "microphone");
    }
}

//! Local playback of a signal on the default output device.
//!
//! Remote audio renders to the local speakers in addition to being captured
//! into a track. `cpal::Stream` is not `Send`, so each playback owns a
//! dedicated thread and is controlled through a [`MonitorHandle`].

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

use super::audio_mixer::AudioMixer;
use super::audio_source::SignalGenerator;
use crate::error::{BridgeError, Result};

const DEVICE_OPEN_TIMEOUT: Duration = Duration::from_secs(2);
const FINISH_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Keeps a local playback running. Dropping it stops playback.
pub struct MonitorHandle {
    stop_tx: Option<mpsc::Sender<()>>,
    finished: Arc<AtomicBool>,
}

impl MonitorHandle {
    /// A handle with no playback behind it.
    pub fn inert() -> Self {
        Self {
            stop_tx: None,
            finished: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Somewhere to play audio locally.
pub trait LocalOutput: Send + Sync {
    fn play(&self, generator: Box<dyn SignalGenerator>) -> Result<MonitorHandle>;
}

/// Discards audio. Used when local playback is disabled or headless.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutput;

impl LocalOutput for NullOutput {
    fn play(&self, _generator: Box<dyn SignalGenerator>) -> Result<MonitorHandle> {
        debug!("Local playback disabled, discarding monitor output");
        Ok(MonitorHandle::inert())
    }
}

/// Plays through the default cpal output device.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalOutput;

impl LocalOutput for CpalOutput {
    fn play(&self, generator: Box<dyn SignalGenerator>) -> Result<MonitorHandle> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<std::result::Result<(), String>>();
        let finished = Arc::new(AtomicBool::new(false));
        let finished_for_thread = finished.clone();

        thread::Builder::new()
            .name("local-output".to_string())
            .spawn(move || run_output_stream(generator, finished_for_thread, stop_rx, ready_tx))
            .map_err(|e| BridgeError::unavailable(format!("failed to spawn output thread: {e}")))?;

        match ready_rx.recv_timeout(DEVICE_OPEN_TIMEOUT) {
            Ok(Ok(())) => Ok(MonitorHandle {
                stop_tx: Some(stop_tx),
                finished,
            }),
            Ok(Err(message)) => Err(BridgeError::unavailable(message)),
            Err(_) => {
                let _ = stop_tx.send(());
                Err(BridgeError::unavailable(
                    "timed out opening the local output device",
                ))
            }
        }
    }
}

fn run_output_stream(
    mut generator: Box<dyn SignalGenerator>,
    finished: Arc<AtomicBool>,
    stop_rx: mpsc::Receiver<()>,
    ready_tx: mpsc::Sender<std::result::Result<(), String>>,
) {
    let host = cpal::default_host();
    let Some(device) = host.default_output_device() else {
        let _ = ready_tx.send(Err("No output device available for local playback".to_string()));
        return;
    };

    let supported = match device.default_output_config() {
        Ok(config) => config,
        Err(e) => {
            let _ = ready_tx.send(Err(format!("No usable output config: {e}")));
            return;
        }
    };

    info!(
        "Local playback using device: {}",
        device.name().unwrap_or_else(|_| "unknown".to_string())
    );

    let config: cpal::StreamConfig = supported.config();
    let out_channels = config.channels as usize;
    let out_rate = config.sample_rate.0;
    let src_rate = generator.sample_rate();
    let src_channels = generator.channels();
    let finished_in_callback = finished.clone();
    let mut scratch: Vec<f32> = Vec::new();

    let err_fn = |err| error!("Local output stream error: {}", err);

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / out_channels.max(1);
            let src_frames = AudioMixer::source_frames_for(frames, src_rate, out_rate);
            scratch.clear();
            scratch.resize(src_frames * src_channels as usize, 0.0);

            let written = generator.render(&mut scratch);
            if written == 0 && generator.is_finished() {
                finished_in_callback.store(true, Ordering::Release);
            }

            let first = AudioMixer::extract_channel(
                &scratch[..written * src_channels as usize],
                src_channels,
                0,
            );
            let resampled = AudioMixer::resample(&first, src_rate, out_rate);

            for (i, frame) in data.chunks_mut(out_channels.max(1)).enumerate() {
                frame.fill(resampled.get(i).copied().unwrap_or(0.0));
            }
        },
        err_fn,
        None,
    );

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(format!("Failed to build output stream: {e}")));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(format!("Failed to start output stream: {e}")));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    loop {
        match stop_rx.recv_timeout(FINISH_POLL_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                if finished.load(Ordering::Acquire) {
                    break;
                }
            }
        }
    }

    debug!("Stopping local output stream");
    drop(stream);
    finished.store(true, Ordering::Release);
}

/// Build the configured output, falling back to [`NullOutput`] when disabled.
pub fn local_output(enabled: bool) -> Arc<dyn LocalOutput> {
    if enabled {
        Arc::new(CpalOutput)
    } else {
        info!("Local playback of remote audio is disabled");
        Arc::new(NullOutput)
    }
}

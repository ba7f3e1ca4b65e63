//! Microphone audio capture via cpal.
//!
//! Lets a live microphone go through the same signal → track path as
//! synthesized audio. The cpal stream lives on its own thread; captured
//! samples are queued and drained by [`Signal::render`].

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

use super::audio_source::SignalGenerator;
use super::signal::{Signal, SignalOrigin};
use crate::error::{BridgeError, Result};

const DEVICE_OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Cap on queued capture so an unconsumed microphone doesn't grow forever.
const MAX_BUFFERED_SECONDS: usize = 2;

pub struct MicrophoneSource {
    sample_rate: u32,
}

impl MicrophoneSource {
    /// # Arguments
    /// * `sample_rate` - Capture sample rate (e.g., 48000)
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    /// Open the default input device and start capturing.
    pub fn open(&self) -> Result<Signal> {
        let samples = Arc::new(Mutex::new(VecDeque::new()));
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<std::result::Result<(), String>>();

        let sample_rate = self.sample_rate;
        let samples_for_thread = samples.clone();
        thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || run_capture(sample_rate, samples_for_thread, stop_rx, ready_tx))
            .map_err(|e| BridgeError::unavailable(format!("failed to spawn capture thread: {e}")))?;

        match ready_rx.recv_timeout(DEVICE_OPEN_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(message)) => return Err(BridgeError::unavailable(message)),
            Err(_) => {
                let _ = stop_tx.send(());
                return Err(BridgeError::unavailable(
                    "timed out opening the microphone",
                ));
            }
        }

        info!("Microphone capture started");
        let generator = MicGenerator {
            samples,
            sample_rate,
            stop_tx: Some(stop_tx),
        };
        Ok(Signal::new(SignalOrigin::Microphone, Box::new(generator)))
    }
}

fn run_capture(
    sample_rate: u32,
    samples: Arc<Mutex<VecDeque<f32>>>,
    stop_rx: mpsc::Receiver<()>,
    ready_tx: mpsc::Sender<std::result::Result<(), String>>,
) {
    let host = cpal::default_host();
    let Some(device) = host.default_input_device() else {
        let _ = ready_tx.send(Err("No input device available for microphone capture".to_string()));
        return;
    };

    info!(
        "Microphone source using device: {}",
        device.name().unwrap_or_else(|_| "unknown".to_string())
    );

    let config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let capacity = sample_rate as usize * MAX_BUFFERED_SECONDS;
    let err_fn = |err| error!("Microphone stream error: {}", err);

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if let Ok(mut queue) = samples.lock() {
                queue.extend(data.iter().copied());
                let overflow = queue.len().saturating_sub(capacity);
                queue.drain(..overflow);
            }
        },
        err_fn,
        None,
    );

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(format!("Failed to build microphone stream: {e}")));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(format!("Failed to start microphone stream: {e}")));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    // Blocks until the generator is stopped or dropped
    loop {
        match stop_rx.recv_timeout(Duration::from_secs(1)) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    debug!("Stopping microphone stream");
    drop(stream);
}

struct MicGenerator {
    samples: Arc<Mutex<VecDeque<f32>>>,
    sample_rate: u32,
    stop_tx: Option<mpsc::Sender<()>>,
}

impl SignalGenerator for MicGenerator {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        1
    }

    /// Drains captured audio; pads with silence on underrun so the track
    /// stays live.
    fn render(&mut self, out: &mut [f32]) -> usize {
        if self.stop_tx.is_none() {
            return 0;
        }

        let mut queue = match self.samples.lock() {
            Ok(queue) => queue,
            Err(poisoned) => poisoned.into_inner(),
        };
        let available = queue.len().min(out.len());
        for (slot, sample) in out.iter_mut().zip(queue.drain(..available)) {
            *slot = sample;
        }
        out[available..].fill(0.0);
        out.len()
    }

    fn is_finished(&self) -> bool {
        self.stop_tx.is_none()
    }

    fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
            info!("Microphone capture stopped");
        }
    }
}

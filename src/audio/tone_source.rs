//! Synthesized tones: a constant frequency or a repeating frequency sequence.

use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::time::Duration;
use tracing::info;

use super::audio_source::SignalGenerator;
use super::signal::{Signal, SignalOrigin};
use crate::error::{BridgeError, Result};

/// A4, the classic test tone.
pub const TEST_TONE_HZ: f64 = 440.0;

/// C5, E5, G5, C6.
pub const MELODY_NOTES_HZ: [f64; 4] = [523.25, 659.25, 783.99, 1046.50];

pub const MELODY_HOLD_MS: u64 = 300;

/// One entry of a frequency sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToneStep {
    pub frequency_hz: f64,
    pub hold_ms: u64,
}

impl ToneStep {
    pub fn new(frequency_hz: f64, hold_ms: u64) -> Self {
        Self {
            frequency_hz,
            hold_ms,
        }
    }

    /// Build an evenly held sequence from a list of notes.
    pub fn sequence(notes: &[f64], hold_ms: u64) -> Vec<ToneStep> {
        notes.iter().map(|&f| ToneStep::new(f, hold_ms)).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    /// Amplitude at `phase` in `[0, 1)`.
    fn sample(&self, phase: f64) -> f64 {
        match self {
            Self::Sine => (TAU * phase).sin(),
            Self::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Self::Sawtooth => 2.0 * phase - 1.0,
            Self::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToneOptions {
    pub sample_rate: u32,
    pub gain: f32,
    pub waveform: Waveform,
}

impl Default for ToneOptions {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            gain: 1.0,
            waveform: Waveform::Sine,
        }
    }
}

/// Which frequency plays at a given moment.
///
/// Multi-step schedules cycle through their steps and wrap after the last.
#[derive(Debug, Clone, PartialEq)]
pub struct ToneSchedule {
    steps: Vec<ToneStep>,
    cycle_us: u128,
}

impl ToneSchedule {
    pub fn new(steps: Vec<ToneStep>) -> Result<Self> {
        if steps.is_empty() {
            return Err(BridgeError::invalid("frequency sequence is empty"));
        }

        if let Some(step) = steps
            .iter()
            .find(|s| !s.frequency_hz.is_finite() || s.frequency_hz <= 0.0)
        {
            return Err(BridgeError::invalid(format!(
                "frequency must be a positive number, got {}",
                step.frequency_hz
            )));
        }

        let cycle_us = steps.iter().map(|s| s.hold_ms as u128 * 1000).sum();
        if steps.len() > 1 && cycle_us == 0 {
            return Err(BridgeError::invalid(
                "a multi-step sequence needs at least one non-zero hold",
            ));
        }

        Ok(Self { steps, cycle_us })
    }

    pub fn steps(&self) -> &[ToneStep] {
        &self.steps
    }

    pub fn is_constant(&self) -> bool {
        self.steps.len() == 1
    }

    /// Length of one pass through the sequence. Zero for a constant tone.
    pub fn cycle_duration(&self) -> Duration {
        if self.is_constant() {
            return Duration::ZERO;
        }
        Duration::from_micros(self.cycle_us as u64)
    }

    pub fn frequency_at(&self, elapsed: Duration) -> f64 {
        self.frequency_at_micros(elapsed.as_micros())
    }

    fn frequency_at_micros(&self, elapsed_us: u128) -> f64 {
        if self.is_constant() {
            return self.steps[0].frequency_hz;
        }

        let position = elapsed_us % self.cycle_us;
        let mut boundary = 0u128;
        for step in &self.steps {
            boundary += step.hold_ms as u128 * 1000;
            if position < boundary {
                return step.frequency_hz;
            }
        }

        // Unreachable while cycle_us is the sum of holds
        self.steps[self.steps.len() - 1].frequency_hz
    }

    fn highest_frequency(&self) -> f64 {
        self.steps
            .iter()
            .map(|s| s.frequency_hz)
            .fold(0.0, f64::max)
    }
}

/// Creates oscillator-backed signals.
#[derive(Debug, Clone, Default)]
pub struct ToneSource {
    options: ToneOptions,
}

impl ToneSource {
    pub fn new(options: ToneOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ToneOptions {
        &self.options
    }

    /// Start a signal that plays `sequence`.
    ///
    /// A single entry yields a constant tone (its hold is ignored). Several
    /// entries cycle in order until the signal is stopped.
    pub fn create(&self, sequence: &[ToneStep]) -> Result<Signal> {
        let schedule = ToneSchedule::new(sequence.to_vec())?;

        if self.options.sample_rate == 0 {
            return Err(BridgeError::invalid("tone sample rate must be non-zero"));
        }

        let nyquist = self.options.sample_rate as f64 / 2.0;
        if schedule.highest_frequency() >= nyquist {
            return Err(BridgeError::invalid(format!(
                "frequency {} Hz is at or above the Nyquist limit of {} Hz",
                schedule.highest_frequency(),
                nyquist
            )));
        }

        if !(0.0..=1.0).contains(&self.options.gain) {
            return Err(BridgeError::invalid(format!(
                "gain must be within 0.0..=1.0, got {}",
                self.options.gain
            )));
        }

        info!(
            "Starting {:?} tone: {} step(s), cycle {:?}",
            self.options.waveform,
            schedule.steps().len(),
            schedule.cycle_duration()
        );

        let oscillator = Oscillator::new(schedule, self.options);
        Ok(Signal::new(SignalOrigin::Tone, Box::new(oscillator)))
    }

    pub fn constant(&self, frequency_hz: f64) -> Result<Signal> {
        self.create(&[ToneStep::new(frequency_hz, 0)])
    }

    pub fn melody(&self, notes: &[f64], hold_ms: u64) -> Result<Signal> {
        self.create(&ToneStep::sequence(notes, hold_ms))
    }
}

/// Phase-continuous mono oscillator driven by a [`ToneSchedule`].
struct Oscillator {
    schedule: ToneSchedule,
    waveform: Waveform,
    gain: f64,
    sample_rate: u32,
    phase: f64,
    position: u64,
}

impl Oscillator {
    fn new(schedule: ToneSchedule, options: ToneOptions) -> Self {
        Self {
            schedule,
            waveform: options.waveform,
            gain: options.gain as f64,
            sample_rate: options.sample_rate,
            phase: 0.0,
            position: 0,
        }
    }

    fn elapsed_micros(&self) -> u128 {
        self.position as u128 * 1_000_000 / self.sample_rate as u128
    }
}

impl SignalGenerator for Oscillator {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        1
    }

    fn render(&mut self, out: &mut [f32]) -> usize {
        let rate = self.sample_rate as f64;
        for sample in out.iter_mut() {
            let frequency = self.schedule.frequency_at_micros(self.elapsed_micros());
            *sample = (self.waveform.sample(self.phase) * self.gain) as f32;
            self.phase = (self.phase + frequency / rate).fract();
            self.position += 1;
        }
        out.len()
    }
}

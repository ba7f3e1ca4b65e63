//! Generator abstraction behind every [`Signal`](super::signal::Signal).

/// A pull-based producer of interleaved `f32` frames.
///
/// Tones, decoded buffers and live microphone capture all implement this.
/// Generators may run at different sample rates; consumers (sessions, local
/// output) resample as needed.
pub trait SignalGenerator: Send {
    /// Sample rate of the rendered frames.
    fn sample_rate(&self) -> u32;

    /// Number of interleaved channels per frame.
    fn channels(&self) -> u16;

    /// Render up to `out.len() / channels` frames into `out`.
    ///
    /// Returns the number of frames written. Zero means the generator is
    /// exhausted (or has no channels).
    fn render(&mut self, out: &mut [f32]) -> usize;

    /// Whether a finite generator has played out completely.
    fn is_finished(&self) -> bool {
        false
    }

    /// Release underlying resources. Called once when the owning signal stops.
    fn stop(&mut self) {}
}

pub mod audio_mixer;
pub mod audio_source;
pub mod decoder;
pub mod local_output;
pub mod mic_source;
pub mod remote_source;
pub mod signal;
pub mod tone_source;

pub use audio_mixer::AudioMixer;
pub use audio_source::SignalGenerator;
pub use decoder::{BufferPlayback, DecodedAudio};
pub use local_output::{local_output, CpalOutput, LocalOutput, MonitorHandle, NullOutput};
pub use mic_source::MicrophoneSource;
pub use remote_source::{RemoteAudioOptions, RemoteAudioSource};
pub use signal::{Signal, SignalOrigin};
pub use tone_source::{
    ToneOptions, ToneSchedule, ToneSource, ToneStep, Waveform, MELODY_HOLD_MS, MELODY_NOTES_HZ,
    TEST_TONE_HZ,
};

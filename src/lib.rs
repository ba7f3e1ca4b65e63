//! Inject synthesized or remote audio into a live conference session.
//!
//! A caller picks a source ([`ToneSource`], [`RemoteAudioSource`],
//! [`MicrophoneSource`]), turns its [`Signal`] into a [`Track`] with
//! [`SignalSink`], and hands the track to a [`ConferenceBridge`].
//! [`StatusReporter`] reads back what the session currently carries.

pub mod api;
pub mod app;
pub mod audio;
pub mod cli;
pub mod conference;
pub mod config;
pub mod error;
pub mod global;

pub use audio::{
    MicrophoneSource, RemoteAudioOptions, RemoteAudioSource, Signal, SignalOrigin, ToneOptions,
    ToneSource, ToneStep, Waveform,
};
pub use conference::{
    AttachPolicy, Attachment, AudioStatus, ConferenceBridge, ConferenceSession, LoopbackOptions,
    LoopbackSession, MediaKind, SignalSink, StatusReporter, Track, TrackPhase, TrackStatus,
};
pub use error::{BridgeError, Result};

//! Conference side of the bridge.
//!
//! Wraps signals as tracks, attaches them to a session as outbound audio,
//! and reports what is being sent.

pub mod bridge;
pub mod session;
pub mod status;
pub mod track;

pub use bridge::{AttachPolicy, Attachment, ConferenceBridge};
pub use session::{ConferenceSession, LocalTrackInfo, LoopbackOptions, LoopbackSession};
pub use status::{AudioStatus, StatusReporter, TrackStatus};
pub use track::{MediaKind, SignalSink, Track, TrackPhase};

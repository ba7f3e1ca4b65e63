//! Read-only view of what the bridge is sending.

use serde::{Deserialize, Serialize};

use super::bridge::ConferenceBridge;
use super::track::MediaKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackStatus {
    pub id: String,
    pub kind: MediaKind,
    pub muted: bool,
}

/// Snapshot of the session's local audio tracks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioStatus {
    pub track_count: usize,
    pub tracks: Vec<TrackStatus>,
}

pub struct StatusReporter<'a> {
    bridge: &'a ConferenceBridge,
}

impl<'a> StatusReporter<'a> {
    pub fn new(bridge: &'a ConferenceBridge) -> Self {
        Self { bridge }
    }

    /// Never fails. An absent or ended session reports no tracks.
    pub fn status(&self) -> AudioStatus {
        let Some(session) = self.bridge.session().filter(|s| s.is_active()) else {
            return AudioStatus::default();
        };

        let tracks: Vec<TrackStatus> = session
            .list_local_tracks()
            .into_iter()
            .filter(|t| t.kind == MediaKind::Audio)
            .map(|t| TrackStatus {
                id: t.id,
                kind: t.kind,
                muted: t.muted,
            })
            .collect();

        AudioStatus {
            track_count: tracks.len(),
            tracks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ToneSource;
    use crate::conference::{
        AttachPolicy, ConferenceSession, LoopbackOptions, LoopbackSession, SignalSink,
    };
    use std::sync::Arc;

    #[test]
    fn test_detached_bridge_reports_nothing() {
        let bridge = ConferenceBridge::detached(AttachPolicy::Replace);
        assert_eq!(StatusReporter::new(&bridge).status(), AudioStatus::default());
    }

    #[tokio::test]
    async fn test_status_lists_attached_tracks() {
        let session = Arc::new(LoopbackSession::default());
        let bridge = ConferenceBridge::new(session.clone(), AttachPolicy::Replace);
        let signal = ToneSource::default().constant(440.0).unwrap();
        let track = SignalSink::new().capture(&signal).unwrap();
        let attachment = bridge.attach(track).await.unwrap();

        let status = StatusReporter::new(&bridge).status();
        assert_eq!(status.track_count, 1);
        assert_eq!(status.tracks[0].id, attachment.track.id());
        assert_eq!(status.tracks[0].kind, MediaKind::Audio);
        assert!(!status.tracks[0].muted);

        session.end();
        assert_eq!(StatusReporter::new(&bridge).status().track_count, 0);
    }

    #[tokio::test]
    async fn test_status_ignores_video_tracks() {
        let session = Arc::new(LoopbackSession::new(LoopbackOptions {
            camera: true,
            ..LoopbackOptions::default()
        }));
        let bridge = ConferenceBridge::new(session.clone(), AttachPolicy::Replace);
        let signal = ToneSource::default().constant(440.0).unwrap();
        bridge
            .attach(SignalSink::new().capture(&signal).unwrap())
            .await
            .unwrap();

        assert_eq!(session.list_local_tracks().len(), 2);
        let status = StatusReporter::new(&bridge).status();
        assert_eq!(status.track_count, 1);
        assert!(status.tracks.iter().all(|t| t.kind == MediaKind::Audio));
    }

    #[test]
    fn test_status_serialization() {
        let status = AudioStatus {
            track_count: 1,
            tracks: vec![TrackStatus {
                id: "abc".to_string(),
                kind: MediaKind::Audio,
                muted: true,
            }],
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["track_count"], 1);
        assert_eq!(json["tracks"][0]["kind"], "audio");
        assert_eq!(json["tracks"][0]["muted"], true);
    }
}

//! Outbound track lifecycle against one conference session.
//!
//! attach → (mute/unmute) → detach / detach_all
//!
//! The session is injected at construction; the bridge owns every track it
//! attaches and disposes them on detach or drop. Under `Replace`, attaches are
//! serialized and the outgoing tracks are only released once the session has
//! accepted the incoming one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::session::ConferenceSession;
use super::track::{Track, TrackPhase};
use crate::error::{BridgeError, Result};

/// What happens to existing attachments when a new track is attached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachPolicy {
    /// Swap out earlier attachments once the new track is live.
    #[default]
    Replace,
    /// Keep earlier attachments alongside the new one.
    Multiple,
}

impl AttachPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Multiple => "multiple",
        }
    }
}

/// A track currently sent on the session.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub id: String,
    pub track: Arc<Track>,
    pub attached_at: DateTime<Utc>,
}

pub struct ConferenceBridge {
    session: Option<Arc<dyn ConferenceSession>>,
    policy: AttachPolicy,
    attachments: Mutex<Vec<Attachment>>,
    replace_lock: tokio::sync::Mutex<()>,
}

impl ConferenceBridge {
    pub fn new(session: Arc<dyn ConferenceSession>, policy: AttachPolicy) -> Self {
        Self {
            session: Some(session),
            policy,
            attachments: Mutex::new(Vec::new()),
            replace_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// A bridge with no call to attach to. Every attach fails with
    /// `SessionUnavailable`.
    pub fn detached(policy: AttachPolicy) -> Self {
        Self {
            session: None,
            policy,
            attachments: Mutex::new(Vec::new()),
            replace_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn session(&self) -> Option<&Arc<dyn ConferenceSession>> {
        self.session.as_ref()
    }

    pub fn policy(&self) -> AttachPolicy {
        self.policy
    }

    /// Send `track` on the session as an outbound audio track.
    ///
    /// On any failure the track is disposed, no attachment is recorded and
    /// existing attachments are left untouched.
    pub async fn attach(&self, track: Track) -> Result<Attachment> {
        let track = Arc::new(track);

        let session = match self.active_session() {
            Some(session) => session,
            None => {
                track.dispose();
                return Err(BridgeError::SessionUnavailable);
            }
        };

        if track.phase() != TrackPhase::Idle {
            let phase = track.phase();
            track.dispose();
            return Err(BridgeError::rejected(format!(
                "track {} is {}, not idle",
                track.id(),
                phase.as_str()
            )));
        }

        let _serialized = match self.policy {
            AttachPolicy::Replace => Some(self.replace_lock.lock().await),
            AttachPolicy::Multiple => None,
        };
        let previous: Vec<String> = match self.policy {
            AttachPolicy::Replace => self
                .attachments_guard()
                .iter()
                .map(|a| a.id.clone())
                .collect(),
            AttachPolicy::Multiple => Vec::new(),
        };

        track.advance(TrackPhase::Attaching);
        if let Err(e) = session.add_outbound_audio_track(track.clone()).await {
            warn!("Session refused track {}: {}", track.id(), e);
            track.dispose();
            return Err(e);
        }

        track.advance(TrackPhase::Attached);

        let attachment = Attachment {
            id: uuid::Uuid::new_v4().to_string(),
            track,
            attached_at: Utc::now(),
        };
        self.attachments_guard().push(attachment.clone());
        attachment.track.signal().start_monitor();

        info!(
            "Attached {} track {} (attachment {})",
            attachment.track.signal().origin().as_str(),
            attachment.track.id(),
            attachment.id
        );

        let mut replaced = 0;
        for id in &previous {
            if self.detach(id).await {
                replaced += 1;
            }
        }
        if replaced > 0 {
            debug!("Replaced {} existing attachment(s)", replaced);
        }

        Ok(attachment)
    }

    /// Release one attachment. Returns false if the id is unknown.
    pub async fn detach(&self, attachment_id: &str) -> bool {
        let removed = {
            let mut attachments = self.attachments_guard();
            attachments
                .iter()
                .position(|a| a.id == attachment_id)
                .map(|index| attachments.remove(index))
        };

        match removed {
            Some(attachment) => {
                self.release(attachment).await;
                true
            }
            None => false,
        }
    }

    /// Release every attachment. Safe to call repeatedly; returns how many
    /// were released by this call.
    pub async fn detach_all(&self) -> usize {
        let drained: Vec<Attachment> = self.attachments_guard().drain(..).collect();
        let count = drained.len();

        for attachment in drained {
            self.release(attachment).await;
        }

        if count > 0 {
            info!("Detached {} track(s)", count);
        }
        count
    }

    pub fn attachments(&self) -> Vec<Attachment> {
        self.attachments_guard().clone()
    }

    pub fn attachment_count(&self) -> usize {
        self.attachments_guard().len()
    }

    /// Mute or unmute the track behind an attachment. Returns false if the id
    /// is unknown.
    pub fn set_muted(&self, attachment_id: &str, muted: bool) -> bool {
        match self
            .attachments_guard()
            .iter()
            .find(|a| a.id == attachment_id)
        {
            Some(attachment) => {
                attachment.track.set_muted(muted);
                true
            }
            None => false,
        }
    }

    fn active_session(&self) -> Option<Arc<dyn ConferenceSession>> {
        self.session.as_ref().filter(|s| s.is_active()).cloned()
    }

    async fn release(&self, attachment: Attachment) {
        if let Some(session) = &self.session {
            if let Err(e) = session.remove_track(attachment.track.id()).await {
                warn!(
                    "Session failed to remove track {}: {}",
                    attachment.track.id(),
                    e
                );
            }
        }
        attachment.track.dispose();
    }

    fn attachments_guard(&self) -> MutexGuard<'_, Vec<Attachment>> {
        self.attachments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ConferenceBridge {
    fn drop(&mut self) {
        let attachments = self
            .attachments
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if attachments.is_empty() {
            return;
        }

        warn!(
            "Bridge dropped with {} live attachment(s), disposing tracks",
            attachments.len()
        );
        for attachment in attachments.drain(..) {
            attachment.track.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::signal::tests::FixedGenerator;
    use crate::audio::{Signal, SignalOrigin};
    use crate::conference::{LoopbackOptions, LoopbackSession, SignalSink};

    fn track() -> Track {
        let (generator, _) = FixedGenerator::new(1, 0.25);
        let signal = Signal::new(SignalOrigin::Tone, Box::new(generator));
        SignalSink::new().capture(&signal).unwrap()
    }

    fn bridge(policy: AttachPolicy) -> (Arc<LoopbackSession>, ConferenceBridge) {
        let session = Arc::new(LoopbackSession::default());
        let bridge = ConferenceBridge::new(session.clone(), policy);
        (session, bridge)
    }

    #[test]
    fn test_default_policy_is_replace() {
        assert_eq!(AttachPolicy::default(), AttachPolicy::Replace);
        assert_eq!(AttachPolicy::Multiple.as_str(), "multiple");
    }

    #[tokio::test]
    async fn test_attach_marks_track_attached() {
        let (session, bridge) = bridge(AttachPolicy::Replace);
        let attachment = bridge.attach(track()).await.unwrap();

        assert_eq!(attachment.track.phase(), TrackPhase::Attached);
        assert_eq!(bridge.attachment_count(), 1);
        assert_eq!(session.track_count(), 1);
    }

    #[tokio::test]
    async fn test_attach_without_session_disposes_track() {
        let bridge = ConferenceBridge::detached(AttachPolicy::Replace);
        let t = track();
        let signal = t.signal().clone();

        let result = bridge.attach(t).await;
        assert!(matches!(result, Err(BridgeError::SessionUnavailable)));
        assert_eq!(bridge.attachment_count(), 0);
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn test_attach_to_ended_session_fails() {
        let (session, bridge) = bridge(AttachPolicy::Replace);
        session.end();
        let result = bridge.attach(track()).await;
        assert!(matches!(result, Err(BridgeError::SessionUnavailable)));
    }

    #[tokio::test]
    async fn test_disposed_track_is_rejected() {
        let (_session, bridge) = bridge(AttachPolicy::Replace);
        let t = track();
        t.dispose();
        let result = bridge.attach(t).await;
        assert!(matches!(result, Err(BridgeError::AttachRejected(_))));
        assert_eq!(bridge.attachment_count(), 0);
    }

    #[tokio::test]
    async fn test_replace_policy_keeps_one_attachment() {
        let (session, bridge) = bridge(AttachPolicy::Replace);
        let first = bridge.attach(track()).await.unwrap();
        let second = bridge.attach(track()).await.unwrap();

        assert_eq!(bridge.attachment_count(), 1);
        assert_eq!(bridge.attachments()[0].id, second.id);
        assert!(first.track.is_disposed());
        assert_eq!(session.track_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_replace_attaches_leave_one_track() {
        let session = Arc::new(LoopbackSession::new(LoopbackOptions {
            negotiation_delay_ms: 50,
            ..LoopbackOptions::default()
        }));
        let bridge = ConferenceBridge::new(session.clone(), AttachPolicy::Replace);

        let (first, second) = tokio::join!(bridge.attach(track()), bridge.attach(track()));
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(bridge.attachment_count(), 1);
        assert_eq!(session.track_count(), 1);
        let live = &bridge.attachments()[0];
        let gone = if live.id == first.id { &second } else { &first };
        assert!(gone.track.is_disposed());
        assert!(!live.track.is_disposed());
    }

    #[tokio::test]
    async fn test_refused_replace_keeps_previous_attachment() {
        let session = Arc::new(LoopbackSession::new(LoopbackOptions {
            max_tracks: Some(1),
            ..LoopbackOptions::default()
        }));
        let bridge = ConferenceBridge::new(session.clone(), AttachPolicy::Replace);
        let first = bridge.attach(track()).await.unwrap();

        let result = bridge.attach(track()).await;

        assert!(matches!(result, Err(BridgeError::AttachRejected(_))));
        assert_eq!(bridge.attachment_count(), 1);
        assert_eq!(bridge.attachments()[0].id, first.id);
        assert_eq!(first.track.phase(), TrackPhase::Attached);
        assert_eq!(session.track_count(), 1);
    }

    #[tokio::test]
    async fn test_multiple_policy_keeps_all_attachments() {
        let (session, bridge) = bridge(AttachPolicy::Multiple);
        bridge.attach(track()).await.unwrap();
        bridge.attach(track()).await.unwrap();

        assert_eq!(bridge.attachment_count(), 2);
        assert_eq!(session.track_count(), 2);
    }

    #[tokio::test]
    async fn test_rejected_attach_disposes_track() {
        let session = Arc::new(LoopbackSession::new(LoopbackOptions {
            max_tracks: Some(1),
            ..LoopbackOptions::default()
        }));
        let bridge = ConferenceBridge::new(session.clone(), AttachPolicy::Multiple);
        bridge.attach(track()).await.unwrap();

        let t = track();
        let signal = t.signal().clone();
        let result = bridge.attach(t).await;

        assert!(matches!(result, Err(BridgeError::AttachRejected(_))));
        assert_eq!(bridge.attachment_count(), 1);
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn test_detach_single_attachment() {
        let (session, bridge) = bridge(AttachPolicy::Multiple);
        let first = bridge.attach(track()).await.unwrap();
        bridge.attach(track()).await.unwrap();

        assert!(bridge.detach(&first.id).await);
        assert!(!bridge.detach(&first.id).await);
        assert_eq!(bridge.attachment_count(), 1);
        assert_eq!(session.track_count(), 1);
        assert!(first.track.is_disposed());
    }

    #[tokio::test]
    async fn test_detach_all_is_idempotent() {
        let (session, bridge) = bridge(AttachPolicy::Multiple);
        bridge.attach(track()).await.unwrap();
        bridge.attach(track()).await.unwrap();

        assert_eq!(bridge.detach_all().await, 2);
        assert_eq!(bridge.detach_all().await, 0);
        assert_eq!(session.track_count(), 0);
    }

    #[tokio::test]
    async fn test_set_muted_by_attachment_id() {
        let (session, bridge) = bridge(AttachPolicy::Replace);
        let attachment = bridge.attach(track()).await.unwrap();

        assert!(bridge.set_muted(&attachment.id, true));
        assert!(attachment.track.is_muted());
        assert!(session.list_local_tracks()[0].muted);
        assert!(!bridge.set_muted("unknown", true));
    }

    #[tokio::test]
    async fn test_drop_disposes_live_tracks() {
        let (session, bridge) = bridge(AttachPolicy::Replace);
        let attachment = bridge.attach(track()).await.unwrap();
        drop(bridge);

        assert!(attachment.track.is_disposed());
        assert_eq!(session.track_count(), 0);
    }
}

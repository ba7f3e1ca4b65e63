//! Drives a loopback session's outbound mix in real time.
//!
//! A real conference pulls frames from its outbound tracks on a clock; this
//! task does the same for [`LoopbackSession`] and optionally keeps the mix.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::conference::LoopbackSession;

pub const PUMP_INTERVAL: Duration = Duration::from_millis(20);

pub struct OutboundPump {
    cancel: CancellationToken,
    task: JoinHandle<Vec<f32>>,
}

impl OutboundPump {
    /// Start pulling from `session`. With `record` the mixed audio is kept
    /// and returned by [`OutboundPump::finish`].
    pub fn spawn(session: Arc<LoopbackSession>, record: bool) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let frames = frames_per_tick(session.options().sample_rate);

        let task = tokio::spawn(async move {
            let mut recorded = Vec::new();
            let mut ticker = tokio::time::interval(PUMP_INTERVAL);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let mixed = session.render_outbound(frames);
                        if record {
                            recorded.extend_from_slice(&mixed);
                        }
                    }
                }
            }

            debug!("Outbound pump stopped after {} samples", recorded.len());
            recorded
        });

        Self { cancel, task }
    }

    /// Stop pulling and return whatever was recorded.
    pub async fn finish(self) -> Vec<f32> {
        self.cancel.cancel();
        self.task.await.unwrap_or_default()
    }
}

fn frames_per_tick(sample_rate: u32) -> usize {
    (sample_rate as u128 * PUMP_INTERVAL.as_millis() / 1000) as usize
}

//! Wiring: builds the sources, session and bridge from config and runs the
//! control API service.

pub mod pump;

use crate::api::{ApiServer, AudioState};
use crate::audio::{local_output, RemoteAudioSource, ToneSource};
use crate::conference::{ConferenceBridge, LoopbackSession};
use crate::config::Config;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};

pub use pump::OutboundPump;

/// Everything a command needs to inject audio into a loopback session.
pub struct Runtime {
    pub config: Config,
    pub session: Arc<LoopbackSession>,
    pub bridge: Arc<ConferenceBridge>,
    pub tone: ToneSource,
    pub remote: Arc<RemoteAudioSource>,
}

impl Runtime {
    pub fn new(config: Config) -> Result<Self> {
        let session = Arc::new(LoopbackSession::new(config.session.options()));
        let bridge = Arc::new(ConferenceBridge::new(
            session.clone(),
            config.bridge.policy(),
        ));

        let tone = ToneSource::new(config.tone.options());
        let remote_options = config.remote.options();
        let remote = RemoteAudioSource::new(
            remote_options,
            local_output(remote_options.play_locally),
        )
        .context("Failed to create remote audio source")?;

        info!(
            "Loopback session at {} Hz, attach policy {}",
            config.session.sample_rate,
            config.bridge.policy().as_str()
        );

        Ok(Self {
            config,
            session,
            bridge,
            tone,
            remote: Arc::new(remote),
        })
    }

    pub fn api_state(&self) -> AudioState {
        AudioState {
            bridge: self.bridge.clone(),
            tone: self.tone.clone(),
            remote: self.remote.clone(),
            melody_hold_ms: self.config.tone.melody_hold_ms,
        }
    }
}

/// Serve the control API until Ctrl-C, then detach everything.
pub async fn run_service(config: Config, port: Option<u16>) -> Result<()> {
    info!("Starting agent-audio service");

    let port = port.unwrap_or(config.api.port);
    let runtime = Runtime::new(config)?;
    let pump = OutboundPump::spawn(runtime.session.clone(), false);

    let api_server = ApiServer::new(runtime.api_state(), port);
    let server = tokio::spawn(async move {
        if let Err(e) = api_server.start().await {
            error!("API server failed: {}", e);
        }
    });

    info!("agent-audio is ready!");
    info!("Test manually: curl -X POST http://127.0.0.1:{}/tone", port);

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutdown requested");
        }
        _ = server => {}
    }

    runtime.bridge.detach_all().await;
    runtime.session.end();
    pump.finish().await;

    info!("agent-audio stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn quiet_config() -> Config {
        let mut config = Config::default();
        config.remote.play_locally = false;
        config
    }

    #[test]
    fn test_runtime_follows_config() {
        let mut config = quiet_config();
        config.bridge.allow_multiple_tracks = true;
        config.session.sample_rate = 16000;
        config.tone.melody_hold_ms = 120;

        let runtime = Runtime::new(config).unwrap();
        assert_eq!(
            runtime.bridge.policy(),
            crate::conference::AttachPolicy::Multiple
        );
        assert_eq!(runtime.session.options().sample_rate, 16000);
        assert_eq!(runtime.api_state().melody_hold_ms, 120);
    }
}

//! REST API server for agent-audio.
//!
//! Lets a remote agent drive the bridge over HTTP: attach tones, melodies
//! and remote audio, mute tracks, detach everything and read the status.

pub mod error;
pub mod routes;

use anyhow::{Context, Result};
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tracing::info;

pub use routes::audio::AudioState;

pub const DEFAULT_PORT: u16 = 3838;

pub struct ApiServer {
    port: u16,
    state: AudioState,
}

impl ApiServer {
    pub fn new(state: AudioState, port: u16) -> Self {
        Self { port, state }
    }

    pub async fn start(self) -> Result<()> {
        let app = router(self.state);

        let addr = format!("127.0.0.1:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind API server to {addr}"))?;

        info!("API server listening on http://{}", addr);
        info!("Endpoints:");
        info!("  GET  /                  - Service info");
        info!("  GET  /version           - Get version info");
        info!("  GET  /status            - Attached audio tracks");
        info!("  POST /tone              - Attach a constant tone");
        info!("  POST /melody            - Attach a repeating melody");
        info!("  POST /play              - Fetch and attach remote audio");
        info!("  POST /stop              - Detach all tracks");
        info!("  POST /tracks/:id/mute   - Mute or unmute a track");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// The full application router.
pub fn router(state: AudioState) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/version", get(version))
        .merge(routes::audio::router(state))
        .layer(ServiceBuilder::new())
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "agent-audio",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "agent-audio"
    }))
}

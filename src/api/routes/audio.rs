//! Audio injection endpoints.
//!
//! Provides HTTP endpoints for:
//! - Attaching a constant tone (POST /tone)
//! - Attaching a repeating melody (POST /melody)
//! - Fetching and attaching remote audio (POST /play)
//! - Detaching everything (POST /stop)
//! - Muting a track by attachment id (POST /tracks/:id/mute)
//! - Reading the attached tracks (GET /status)

use crate::audio::{RemoteAudioSource, Signal, ToneSource, MELODY_NOTES_HZ, TEST_TONE_HZ};
use crate::conference::{AudioStatus, ConferenceBridge, SignalSink, StatusReporter};
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::api::error::{ApiError, ApiResult};

/// Shared state for audio routes.
#[derive(Clone)]
pub struct AudioState {
    pub bridge: Arc<ConferenceBridge>,
    pub tone: ToneSource,
    pub remote: Arc<RemoteAudioSource>,
    /// Default hold per melody note when the request omits one
    pub melody_hold_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ToneRequest {
    pub frequency_hz: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MelodyRequest {
    pub notes: Option<Vec<f64>>,
    pub hold_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct MuteRequest {
    pub muted: bool,
}

pub fn router(state: AudioState) -> Router {
    Router::new()
        .route("/status", get(audio_status))
        .route("/tone", post(play_tone))
        .route("/melody", post(play_melody))
        .route("/play", post(play_url))
        .route("/stop", post(stop_audio))
        .route("/tracks/:id/mute", post(mute_track))
        .with_state(state)
}

async fn audio_status(State(state): State<AudioState>) -> Json<AudioStatus> {
    Json(StatusReporter::new(&state.bridge).status())
}

async fn play_tone(
    State(state): State<AudioState>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let request: ToneRequest = optional_body(&body)?;
    let frequency = request.frequency_hz.unwrap_or(TEST_TONE_HZ);

    info!("Tone requested via API: {} Hz", frequency);

    let signal = state.tone.constant(frequency)?;
    attach_signal(&state, signal).await
}

async fn play_melody(
    State(state): State<AudioState>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let request: MelodyRequest = optional_body(&body)?;
    let notes = request.notes.unwrap_or_else(|| MELODY_NOTES_HZ.to_vec());
    let hold_ms = request.hold_ms.unwrap_or(state.melody_hold_ms);

    info!("Melody requested via API: {} note(s)", notes.len());

    let signal = state.tone.melody(&notes, hold_ms)?;
    attach_signal(&state, signal).await
}

async fn play_url(
    State(state): State<AudioState>,
    body: Result<Json<PlayRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    if request.url.trim().is_empty() {
        return Err(ApiError::bad_request("url must not be empty"));
    }

    info!("Remote audio requested via API");

    let signal = state.remote.fetch(&request.url).await?;
    attach_signal(&state, signal).await
}

async fn stop_audio(State(state): State<AudioState>) -> Json<Value> {
    let detached = state.bridge.detach_all().await;
    Json(json!({
        "success": true,
        "detached": detached,
    }))
}

async fn mute_track(
    State(state): State<AudioState>,
    Path(id): Path<String>,
    body: Result<Json<MuteRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    if !state.bridge.set_muted(&id, request.muted) {
        return Err(ApiError::not_found(format!("no attachment with id {id}")));
    }

    Ok(Json(json!({
        "success": true,
        "attachment_id": id,
        "muted": request.muted,
    })))
}

/// Parse a JSON body whose fields are all optional. An empty body means
/// defaults; anything else must be valid JSON for `T`.
fn optional_body<T: DeserializeOwned + Default>(body: &[u8]) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("invalid request body: {e}")))
}

async fn attach_signal(state: &AudioState, signal: Signal) -> ApiResult<Json<Value>> {
    let track = SignalSink::new().capture(&signal)?;
    let attachment = state.bridge.attach(track).await?;

    Ok(Json(json!({
        "success": true,
        "attachment_id": attachment.id,
        "track_id": attachment.track.id(),
        "origin": signal.origin().as_str(),
    })))
}

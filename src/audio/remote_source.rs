//! Audio fetched from a URL, decoded, and exposed as a signal.
//!
//! Supported locations:
//! - `http://` / `https://` via reqwest
//! - `file://` paths on the local filesystem
//! - `data:` URLs carrying base64 audio (direct injection without an upload)
//!
//! The decoded audio also plays on the local output device once the signal is
//! first attached to a call.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Url;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::decoder::{self, DecodedAudio};
use super::local_output::LocalOutput;
use super::signal::{Signal, SignalOrigin};
use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAudioOptions {
    pub timeout: Duration,
    pub max_bytes: usize,
    pub play_locally: bool,
}

impl Default for RemoteAudioOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_bytes: 25 * 1024 * 1024,
            play_locally: true,
        }
    }
}

pub struct RemoteAudioSource {
    client: reqwest::Client,
    options: RemoteAudioOptions,
    output: Arc<dyn LocalOutput>,
}

/// Raises the decoder's cancel flag if the owning future is dropped early.
struct CancelOnDrop {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl CancelOnDrop {
    fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            debug!("Remote audio load abandoned, cancelling decoder");
            self.flag.store(true, Ordering::Release);
        }
    }
}

impl RemoteAudioSource {
    pub fn new(options: RemoteAudioOptions, output: Arc<dyn LocalOutput>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| BridgeError::invalid(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            options,
            output,
        })
    }

    pub fn options(&self) -> &RemoteAudioOptions {
        &self.options
    }

    /// Fetch and decode `url` into a playable signal.
    ///
    /// Dropping the returned future aborts the request and stops decoding.
    pub async fn fetch(&self, url: &str) -> Result<Signal> {
        let (bytes, hint) = self.load(url).await?;
        info!("Loaded {} bytes of audio from {}", bytes.len(), redact(url));
        self.decode_into_signal(bytes, hint).await
    }

    /// Like [`fetch`](Self::fetch), but also stops when `cancel` fires.
    pub async fn fetch_with_cancel(&self, url: &str, cancel: CancellationToken) -> Result<Signal> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Remote audio fetch cancelled: {}", redact(url));
                Err(BridgeError::Cancelled)
            }
            result = self.fetch(url) => result,
        }
    }

    /// Decode audio that is already in memory.
    pub async fn decode_bytes(&self, bytes: Vec<u8>, mime: Option<&str>) -> Result<Signal> {
        self.check_size(bytes.len())?;
        let hint = mime.and_then(extension_for_mime).map(str::to_string);
        self.decode_into_signal(bytes, hint).await
    }

    async fn load(&self, raw: &str) -> Result<(Vec<u8>, Option<String>)> {
        if let Some(rest) = raw.strip_prefix("data:") {
            return self.load_data_url(rest);
        }

        let url = Url::parse(raw)
            .map_err(|e| BridgeError::invalid(format!("malformed audio URL {raw:?}: {e}")))?;

        match url.scheme() {
            "http" | "https" => self.download(url).await,
            "file" => self.read_file(url).await,
            other => Err(BridgeError::invalid(format!(
                "unsupported audio URL scheme: {other}"
            ))),
        }
    }

    async fn download(&self, url: Url) -> Result<(Vec<u8>, Option<String>)> {
        debug!("Fetching remote audio: {}", url);

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| BridgeError::unavailable(format!("failed to fetch {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::unavailable(format!(
                "{url} responded with HTTP {status}"
            )));
        }

        if let Some(length) = response.content_length() {
            self.check_size(length as usize)?;
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| BridgeError::unavailable(format!("failed to read {url}: {e}")))?
        {
            append_limited(&mut bytes, &chunk, self.options.max_bytes)?;
        }

        let hint = extension_from_path(url.path())
            .or_else(|| content_type.as_deref().and_then(extension_for_mime))
            .map(str::to_string);

        Ok((bytes, hint))
    }

    async fn read_file(&self, url: Url) -> Result<(Vec<u8>, Option<String>)> {
        let path = url
            .to_file_path()
            .map_err(|_| BridgeError::invalid(format!("not a local file path: {url}")))?;

        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            BridgeError::unavailable(format!("failed to read {}: {e}", path.display()))
        })?;
        self.check_size(bytes.len())?;

        let hint = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        Ok((bytes, hint))
    }

    fn load_data_url(&self, rest: &str) -> Result<(Vec<u8>, Option<String>)> {
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| BridgeError::invalid("data URL is missing its payload"))?;

        let Some(mime) = meta.strip_suffix(";base64") else {
            return Err(BridgeError::invalid(
                "only base64-encoded data URLs are supported",
            ));
        };

        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|e| BridgeError::unavailable(format!("data URL is not valid base64: {e}")))?;
        self.check_size(bytes.len())?;

        Ok((bytes, extension_for_mime(mime).map(str::to_string)))
    }

    fn check_size(&self, len: usize) -> Result<()> {
        if len > self.options.max_bytes {
            return Err(BridgeError::unavailable(format!(
                "audio resource is {} bytes, limit is {}",
                len, self.options.max_bytes
            )));
        }
        Ok(())
    }

    async fn decode_into_signal(&self, bytes: Vec<u8>, hint: Option<String>) -> Result<Signal> {
        self.decode_cancellable(bytes, hint, Arc::new(AtomicBool::new(false))).await
    }

    /// Decode off the runtime. `flag` is raised if this future is dropped
    /// before the decoder finishes.
    async fn decode_cancellable(
        &self,
        bytes: Vec<u8>,
        hint: Option<String>,
        flag: Arc<AtomicBool>,
    ) -> Result<Signal> {
        let mut guard = CancelOnDrop::new(flag.clone());

        let decoded = tokio::task::spawn_blocking(move || {
            decoder::decode(bytes, hint.as_deref(), &flag)
        })
        .await
        .map_err(|e| BridgeError::unavailable(format!("decoder task failed: {e}")))??;
        guard.disarm();

        Ok(self.signal_from(decoded))
    }

    fn signal_from(&self, decoded: DecodedAudio) -> Signal {
        let signal = Signal::new(SignalOrigin::Remote, Box::new(decoded.playback()));

        if self.options.play_locally {
            signal.defer_monitor(self.output.clone(), Box::new(decoded.playback()));
        }

        signal
    }
}

/// Append `chunk` unless the body would grow past `limit` bytes.
fn append_limited(body: &mut Vec<u8>, chunk: &[u8], limit: usize) -> Result<()> {
    let len = body.len() + chunk.len();
    if len > limit {
        return Err(BridgeError::unavailable(format!(
            "audio resource exceeds the {limit} byte limit"
        )));
    }
    body.extend_from_slice(chunk);
    Ok(())
}

fn extension_from_path(path: &str) -> Option<&'static str> {
    let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "mp3" => Some("mp3"),
        "wav" | "wave" => Some("wav"),
        "ogg" | "oga" => Some("ogg"),
        "flac" => Some("flac"),
        "m4a" | "mp4" | "aac" => Some("mp4"),
        "webm" => Some("webm"),
        "mka" | "mkv" => Some("mkv"),
        _ => None,
    }
}

fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next()?.trim().to_ascii_lowercase();
    match essence.as_str() {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/wav" | "audio/wave" | "audio/x-wav" | "audio/vnd.wave" => Some("wav"),
        "audio/ogg" | "application/ogg" => Some("ogg"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        "audio/mp4" | "audio/aac" | "audio/x-m4a" => Some("mp4"),
        "audio/webm" | "video/webm" => Some("webm"),
        _ => None,
    }
}

/// Keep logs readable when the URL embeds a whole base64 payload.
fn redact(url: &str) -> &str {
    if url.starts_with("data:") {
        url.split_once(',').map(|(meta, _)| meta).unwrap_or("data:")
    } else {
        url
    }
}

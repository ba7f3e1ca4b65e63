use crate::audio::{RemoteAudioOptions, ToneOptions, Waveform, MELODY_HOLD_MS};
use crate::conference::{AttachPolicy, LoopbackOptions};
use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tone: ToneConfig,
    pub remote: RemoteConfig,
    pub bridge: BridgeConfig,
    pub session: SessionConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneConfig {
    pub sample_rate: u32,
    /// Output gain in 0.0..=1.0
    pub gain: f32,
    pub waveform: Waveform,
    /// Hold per note for the melody preset, in milliseconds
    pub melody_hold_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub timeout_seconds: u64,
    /// Largest accepted encoded resource, in bytes
    pub max_bytes: usize,
    /// Also play fetched audio on the local output device
    pub play_locally: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Keep earlier tracks attached when a new one is attached.
    /// Off by default: a new track replaces the previous one.
    pub allow_multiple_tracks: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 0 means unlimited
    pub max_tracks: usize,
    pub negotiation_delay_ms: u64,
    pub sample_rate: u32,
    /// List a camera track next to the outbound audio
    pub camera: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for ToneConfig {
    fn default() -> Self {
        let defaults = ToneOptions::default();
        Self {
            sample_rate: defaults.sample_rate,
            gain: defaults.gain,
            waveform: defaults.waveform,
            melody_hold_ms: MELODY_HOLD_MS,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        let defaults = RemoteAudioOptions::default();
        Self {
            timeout_seconds: defaults.timeout.as_secs(),
            max_bytes: defaults.max_bytes,
            play_locally: defaults.play_locally,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_tracks: 0,
            negotiation_delay_ms: 0,
            sample_rate: 48000,
            camera: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: crate::api::DEFAULT_PORT,
        }
    }
}

impl ToneConfig {
    pub fn options(&self) -> ToneOptions {
        ToneOptions {
            sample_rate: self.sample_rate,
            gain: self.gain,
            waveform: self.waveform,
        }
    }
}

impl RemoteConfig {
    pub fn options(&self) -> RemoteAudioOptions {
        RemoteAudioOptions {
            timeout: Duration::from_secs(self.timeout_seconds),
            max_bytes: self.max_bytes,
            play_locally: self.play_locally,
        }
    }
}

impl BridgeConfig {
    pub fn policy(&self) -> AttachPolicy {
        if self.allow_multiple_tracks {
            AttachPolicy::Multiple
        } else {
            AttachPolicy::Replace
        }
    }
}

impl SessionConfig {
    pub fn options(&self) -> LoopbackOptions {
        LoopbackOptions {
            max_tracks: (self.max_tracks > 0).then_some(self.max_tracks),
            negotiation_delay_ms: self.negotiation_delay_ms,
            sample_rate: self.sample_rate,
            camera: self.camera,
        }
    }
}

impl Config {
    /// Load from the default location, writing defaults on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}

//! Error taxonomy shared by every bridge operation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Bad caller input (empty frequency sequence, malformed URL, ...).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Remote audio could not be fetched or decoded.
    #[error("audio resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("signal exposes no audio channel")]
    NoAudioChannel,

    #[error("no active conference session")]
    SessionUnavailable,

    #[error("conference session rejected track: {0}")]
    AttachRejected(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl BridgeError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::ResourceUnavailable(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::AttachRejected(message.into())
    }
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

//! Error taxonomy for the relay

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Configuration could not be loaded or deserialized
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration loaded but holds unusable values
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Image decode or encode failed for a single frame
    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error("detector failed: {0}")]
    Detector(String),

    #[error("tracker failed: {0}")]
    Tracker(String),

    /// Transport failure on a streaming session
    #[error("socket error: {0}")]
    Socket(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Per-frame failures that must never stop the worker or a session
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RelayError::Codec(_) | RelayError::Detector(_) | RelayError::Tracker(_)
        )
    }
}

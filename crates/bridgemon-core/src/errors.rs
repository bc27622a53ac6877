//! Error types for bridge monitoring

use thiserror::Error;

/// Errors surfaced by the session manager and the management surface.
///
/// Nothing in the join-callback path returns these; the hook absorbs
/// failures so event delivery to other watchers is never interrupted.
#[derive(Debug, Error)]
pub enum BridgeMonError {
    /// A required identifier was missing or empty
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The target channel or monitoring session does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Attaching the session or registering the join hook failed
    #[error("Resource error: {0}")]
    Resource(String),

    /// A session with the same id is already attached to the channel
    #[error("Channel {channel} is already monitored with session id {session_id}")]
    AlreadyMonitoring { channel: String, session_id: String },

    /// Configuration could not be loaded or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeMonError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True for the `NotFound` variant
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<toml::de::Error> for BridgeMonError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeMonError>;

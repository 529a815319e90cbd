//! Error types for scrobble routing and authentication

use crate::{EntityType, Role};

/// Failure to turn an inbound payload into a [`crate::PlayEvent`]
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("missing field '{0}'")]
    Missing(&'static str),

    #[error("malformed payload: {0}")]
    Malformed(String),

    /// Well-formed payload that does not describe a finished play
    #[error("ignored event: {0}")]
    Ignored(String),
}

impl From<serde_json::Error> for PayloadError {
    fn from(e: serde_json::Error) -> Self {
        PayloadError::Malformed(e.to_string())
    }
}

/// Authentication failures; their message is the callback response body
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Specified {role} does not have auth implemented ({kind})")]
    Unsupported { role: Role, kind: EntityType },

    #[error("No source or client named '{0}' is waiting for authentication")]
    UnknownEntity(String),

    #[error("Callback is missing the '{0}' parameter")]
    MissingParameter(&'static str),

    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ScrobbleError {
    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Specified source cannot poll ({0})")]
    NotPollable(EntityType),

    #[error("{0} is not authenticated")]
    NotAuthed(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Failure reported by a remote service
    #[error("{0}")]
    Upstream(String),
}

pub type Result<T> = std::result::Result<T, ScrobbleError>;

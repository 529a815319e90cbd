//! Erreurs du client Last.fm

use scrobcore::{AuthError, ScrobbleError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LastfmError>;

#[derive(Error, Debug)]
pub enum LastfmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Erreur renvoyée dans le corps de la réponse (`{"error": 4, "message": ...}`)
    #[error("Last.fm API error (code {code}): {message}")]
    Api { code: u32, message: String },

    #[error("No Last.fm session, authorization is required")]
    NoSession,

    #[error("Scrobble was ignored by Last.fm: {0}")]
    Ignored(String),
}

impl LastfmError {
    /// Codes 4 (token invalide), 9 (session invalide), 14 et 15 (token non autorisé ou expiré)
    pub fn is_auth_error(&self) -> bool {
        matches!(self, LastfmError::Api { code: 4 | 9 | 14 | 15, .. })
    }
}

impl From<LastfmError> for ScrobbleError {
    fn from(e: LastfmError) -> Self {
        match e {
            LastfmError::NoSession => ScrobbleError::NotAuthed("Last.fm".to_string()),
            e if e.is_auth_error() => AuthError::Rejected(e.to_string()).into(),
            other => ScrobbleError::Upstream(other.to_string()),
        }
    }
}

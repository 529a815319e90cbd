//! Erreurs du client Spotify

use scrobcore::ScrobbleError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SpotifyError>;

#[derive(Error, Debug)]
pub enum SpotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Réponse non 2xx de Spotify
    #[error("Spotify API error (code {code}): {message}")]
    Api { code: u16, message: String },

    /// Aucun token : l'utilisateur doit passer par /source/auth
    #[error("Spotify has not been authorized yet")]
    NotAuthorized,

    #[error("Spotify configuration error: {0}")]
    Configuration(String),
}

impl SpotifyError {
    pub fn from_status_code(code: u16, body: String) -> Self {
        // {"error": {"status": 401, "message": "..."}} ou {"error": "invalid_grant", "error_description": "..."}
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|json| {
                let error = json.get("error")?;
                error
                    .get("message")
                    .or_else(|| json.get("error_description"))
                    .or(Some(error))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or(body);
        Self::Api { code, message }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, SpotifyError::Api { code: 401, .. })
    }
}

impl From<SpotifyError> for ScrobbleError {
    fn from(e: SpotifyError) -> Self {
        match e {
            SpotifyError::NotAuthorized => ScrobbleError::NotAuthed("Spotify".to_string()),
            SpotifyError::Configuration(message) => ScrobbleError::Config(message),
            other => ScrobbleError::Upstream(other.to_string()),
        }
    }
}

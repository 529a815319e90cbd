use scrobcore::ScrobbleError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MalojaError>;

#[derive(Error, Debug)]
pub enum MalojaError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Maloja rejected the API key: {0}")]
    InvalidKey(String),

    #[error("Maloja error (code {code}): {message}")]
    Api { code: u16, message: String },
}

impl From<MalojaError> for ScrobbleError {
    fn from(e: MalojaError) -> Self {
        ScrobbleError::Upstream(e.to_string())
    }
}

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use scrobconfig::EntityBlock;
use scrobcore::{
    Client, Entity, EntityState, EntityType, PlayEvent, Result, ScrobbleHistory, ScrobbleOutcome,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::MalojaError;

const API_PATH: &str = "/apis/mlj_1";

/// `data` of a maloja block
#[derive(Debug, Clone, Deserialize)]
pub struct MalojaData {
    pub url: String,
    #[serde(rename = "apikey", alias = "apiKey")]
    pub api_key: String,
}

#[derive(Debug, Serialize)]
struct NewScrobble<'a> {
    artists: &'a [String],
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    album: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<u64>,
    time: i64,
    key: &'a str,
}

/// Scrobbles plays to a self-hosted Maloja server
///
/// Authentication is the API key from the configuration; it is checked once
/// by [`Entity::initialize`], no user interaction is involved.
#[derive(Debug)]
pub struct MalojaClient {
    name: String,
    state: EntityState,
    http: reqwest::Client,
    url: String,
    api_key: String,
    history: ScrobbleHistory,
}

impl MalojaClient {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            name: name.into(),
            state: EntityState::new(true, false),
            http,
            url: url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            history: ScrobbleHistory::default(),
        })
    }

    pub fn from_block<F>(block: &EntityBlock, secret: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> anyhow::Result<String>,
    {
        let data: MalojaData = block.parse_data()?;
        Ok(Self::new(block.name.clone(), data.url, secret(&data.api_key)?)?)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// GET /apis/mlj_1/test
    pub async fn test_key(&self) -> crate::Result<()> {
        let response = self
            .http
            .get(format!("{}{}/test", self.url, API_PATH))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;
        match response.status() {
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                Err(MalojaError::InvalidKey(error_message(response).await))
            }
            _ => check(response).await.map(|_| ()),
        }
    }

    /// POST /apis/mlj_1/newscrobble
    pub async fn send(&self, play: &PlayEvent) -> crate::Result<()> {
        let body = NewScrobble {
            artists: &play.artists,
            title: &play.track,
            album: play.album.as_deref(),
            duration: play.duration_seconds.map(|d| d.round() as u64),
            time: play.playback_timestamp.timestamp(),
            key: &self.api_key,
        };
        debug!(label = self.name.as_str(), "POST {}{}/newscrobble", self.url, API_PATH);
        let response = self
            .http
            .post(format!("{}{}/newscrobble", self.url, API_PATH))
            .json(&body)
            .send()
            .await?;
        check(response).await.map(|_| ())
    }
}

async fn error_message(response: Response) -> String {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|json| {
            let error = json.get("error")?;
            error
                .get("desc")
                .or_else(|| error.get("type"))
                .or(Some(error))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or(text)
}

async fn check(response: Response) -> crate::Result<Value> {
    let status = response.status();
    if !status.is_success() {
        return Err(MalojaError::Api {
            code: status.as_u16(),
            message: error_message(response).await,
        });
    }
    Ok(response.json().await.unwrap_or(Value::Null))
}

#[async_trait]
impl Entity for MalojaClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn entity_type(&self) -> EntityType {
        EntityType::Maloja
    }

    fn state(&self) -> &EntityState {
        &self.state
    }

    async fn initialize(&self) -> Result<()> {
        self.state.set_initialized(true);
        match self.test_key().await {
            Ok(()) => {
                self.state.set_authed(true);
                info!(label = self.name.as_str(), "Connected to {}", self.url);
                Ok(())
            }
            Err(e) => {
                self.state.set_authed(false);
                warn!(label = self.name.as_str(), "Could not validate API key: {}", e);
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl Client for MalojaClient {
    async fn scrobble(&self, play: &PlayEvent) -> Result<ScrobbleOutcome> {
        if self.history.contains(play) {
            return Ok(ScrobbleOutcome::Duplicate);
        }
        self.send(play).await?;
        self.history.record(play);
        Ok(ScrobbleOutcome::Scrobbled)
    }
}

use async_trait::async_trait;
use scrobconfig::EntityBlock;
use scrobcore::auth::callback_state;
use scrobcore::{
    AuthCodeOutcome, AuthCodeReceiver, Authorizable, AuthError, Entity, EntityState, EntityType,
    PlayEvent, PlayMeta, Pollable, Readiness, Result, Source,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

use crate::api::{PlayHistoryItem, SpotifyApi};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// `data` of a spotify block; keys arrive lowercased from the config loader
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyData {
    #[serde(rename = "clientid", alias = "clientId")]
    pub client_id: String,
    #[serde(rename = "clientsecret", alias = "clientSecret")]
    pub client_secret: String,
    #[serde(default, rename = "redirecturi", alias = "redirectUri")]
    pub redirect_uri: Option<String>,
    /// Seconds between two polls
    #[serde(default)]
    pub interval: Option<u64>,
}

#[derive(Debug)]
pub struct SpotifySource {
    name: String,
    state: EntityState,
    api: SpotifyApi,
    interval: Duration,
    clients: Vec<String>,
}

impl SpotifySource {
    pub fn new(name: impl Into<String>, api: SpotifyApi) -> Self {
        Self {
            name: name.into(),
            state: EntityState::new(true, true),
            api,
            interval: DEFAULT_INTERVAL,
            clients: Vec::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_clients(mut self, clients: Vec<String>) -> Self {
        self.clients = clients;
        self
    }

    /// `secret` turns possibly encrypted config values into plain text
    pub fn from_block<F>(block: &EntityBlock, base_url: &str, secret: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> anyhow::Result<String>,
    {
        let data: SpotifyData = block.parse_data()?;
        let redirect_uri = data
            .redirect_uri
            .unwrap_or_else(|| format!("{}/callback", base_url));
        let api = SpotifyApi::new(secret(&data.client_id)?, secret(&data.client_secret)?, redirect_uri)?;

        let mut source = Self::new(block.name.clone(), api).with_clients(block.clients.clone());
        if let Some(secs) = data.interval.filter(|s| *s > 0) {
            source = source.with_interval(Duration::from_secs(secs));
        }
        Ok(source)
    }

    pub fn api(&self) -> &SpotifyApi {
        &self.api
    }

    fn to_play(item: PlayHistoryItem) -> PlayEvent {
        let track = item.track;
        PlayEvent::new(
            EntityType::Spotify,
            track.artists.into_iter().map(|a| a.name).collect(),
            track.name,
            item.played_at,
        )
        .with_album(track.album.map(|a| a.name))
        .with_duration(track.duration_ms.map(|ms| ms as f64 / 1000.0))
        .with_meta(PlayMeta {
            web_url: track.external_urls.spotify,
            ..Default::default()
        })
    }
}

#[async_trait]
impl Entity for SpotifySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn entity_type(&self) -> EntityType {
        EntityType::Spotify
    }

    fn state(&self) -> &EntityState {
        &self.state
    }

    async fn initialize(&self) -> Result<()> {
        self.state.set_initialized(true);
        if !self.api.has_token().await {
            info!(
                label = self.name.as_str(),
                "No access token yet, authorization is required"
            );
        }
        Ok(())
    }

    fn authorizer(&self) -> Option<&dyn Authorizable> {
        Some(self)
    }

    fn auth_code(&self) -> Option<&dyn AuthCodeReceiver> {
        Some(self)
    }
}

impl Authorizable for SpotifySource {
    fn auth_url(&self) -> Result<String> {
        Ok(self
            .api
            .authorize_url(&callback_state(EntityType::Spotify, &self.name))?)
    }
}

#[async_trait]
impl AuthCodeReceiver for SpotifySource {
    async fn handle_auth_code_callback(
        &self,
        query: &HashMap<String, String>,
    ) -> Result<AuthCodeOutcome> {
        if let Some(error) = query.get("error") {
            return Ok(AuthCodeOutcome::Rejected(format!("Error: {}", error)));
        }
        let code = query.get("code").ok_or(AuthError::MissingParameter("code"))?;

        match self.api.exchange_code(code).await {
            Ok(()) => Ok(AuthCodeOutcome::Authorized),
            Err(e) => {
                warn!(label = self.name.as_str(), "Could not exchange authorization code: {}", e);
                Ok(AuthCodeOutcome::Rejected(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl Pollable for SpotifySource {
    fn poll_interval(&self) -> Duration {
        self.interval
    }

    fn readiness(&self) -> Readiness {
        if self.state.is_authed() {
            Readiness::Ready
        } else {
            Readiness::NeedsInteraction
        }
    }

    async fn recently_played(&self, limit: usize) -> Result<Vec<PlayEvent>> {
        let items = self.api.recently_played(limit).await?;
        Ok(items.into_iter().map(Self::to_play).collect())
    }
}

#[async_trait]
impl Source for SpotifySource {
    fn client_targets(&self) -> &[String] {
        &self.clients
    }

    fn pollable(&self) -> Option<&dyn Pollable> {
        Some(self)
    }
}

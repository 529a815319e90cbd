use async_trait::async_trait;
use scrobconfig::EntityBlock;
use scrobcore::auth::callback_state;
use scrobcore::{
    Authorizable, Entity, EntityState, EntityType, PlayEvent, PlayMeta, Pollable, Readiness,
    Result, Source, TokenAuthenticator,
};
use std::time::Duration;
use tracing::{info, warn};

use crate::api::{LastfmApi, RecentTrack};
use crate::config::LastfmData;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Polls the scrobble history of a Last.fm account
///
/// Only initialized once a session has been verified, which makes the
/// start-up poll skip it until then.
#[derive(Debug)]
pub struct LastfmSource {
    name: String,
    state: EntityState,
    api: LastfmApi,
    interval: Duration,
    clients: Vec<String>,
}

impl LastfmSource {
    pub fn new(name: impl Into<String>, api: LastfmApi) -> Self {
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

    pub fn from_block<F>(block: &EntityBlock, base_url: &str, secret: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> anyhow::Result<String>,
    {
        let data = LastfmData::from_block(block)?;
        let api = data.build_api(base_url, secret)?;
        let mut source = Self::new(block.name.clone(), api).with_clients(block.clients.clone());
        if let Some(secs) = data.interval.filter(|s| *s > 0) {
            source = source.with_interval(Duration::from_secs(secs));
        }
        Ok(source)
    }

    pub fn api(&self) -> &LastfmApi {
        &self.api
    }

    fn to_play(track: RecentTrack) -> Option<PlayEvent> {
        let played_at = track.played_at()?;
        Some(
            PlayEvent::new(
                EntityType::Lastfm,
                vec![track.artist().to_string()],
                track.name(),
                played_at,
            )
            .with_album(track.album().map(str::to_string))
            .with_meta(PlayMeta {
                web_url: track.url().map(str::to_string),
                ..Default::default()
            }),
        )
    }
}

#[async_trait]
impl Entity for LastfmSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn entity_type(&self) -> EntityType {
        EntityType::Lastfm
    }

    fn state(&self) -> &EntityState {
        &self.state
    }

    async fn initialize(&self) -> Result<()> {
        if self.api.session().is_none() {
            self.state.set_initialized(false);
            info!(
                label = self.name.as_str(),
                "No session yet, open /source/auth?name={} to authorize",
                self.name
            );
            return Ok(());
        }
        match self.api.user_info().await {
            Ok(user) => {
                self.state.set_authed(true);
                self.state.set_initialized(true);
                info!(label = self.name.as_str(), "Authenticated as {}", user);
                Ok(())
            }
            Err(e) => {
                self.state.set_initialized(false);
                warn!(label = self.name.as_str(), "Session check failed: {}", e);
                Err(e.into())
            }
        }
    }

    fn authorizer(&self) -> Option<&dyn Authorizable> {
        Some(self)
    }

    fn token_auth(&self) -> Option<&dyn TokenAuthenticator> {
        Some(self)
    }
}

impl Authorizable for LastfmSource {
    fn auth_url(&self) -> Result<String> {
        Ok(self
            .api
            .auth_url(&callback_state(EntityType::Lastfm, &self.name))?)
    }
}

#[async_trait]
impl TokenAuthenticator for LastfmSource {
    async fn authenticate(&self, token: &str) -> Result<()> {
        self.api.get_session(token).await?;
        Ok(())
    }
}

#[async_trait]
impl Pollable for LastfmSource {
    fn poll_interval(&self) -> Duration {
        self.interval
    }

    fn readiness(&self) -> Readiness {
        if self.state.is_initialized() {
            Readiness::Ready
        } else {
            Readiness::Skip
        }
    }

    async fn recently_played(&self, limit: usize) -> Result<Vec<PlayEvent>> {
        let tracks = self.api.recent_tracks(limit).await?;
        Ok(tracks
            .into_iter()
            .filter(|t| !t.is_now_playing())
            .filter_map(Self::to_play)
            .collect())
    }
}

#[async_trait]
impl Source for LastfmSource {
    fn client_targets(&self) -> &[String] {
        &self.clients
    }

    fn pollable(&self) -> Option<&dyn Pollable> {
        Some(self)
    }
}

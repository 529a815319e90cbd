use async_trait::async_trait;
use scrobconfig::EntityBlock;
use scrobcore::auth::callback_state;
use scrobcore::{
    Authorizable, Client, Entity, EntityState, EntityType, PlayEvent, Result, ScrobbleHistory,
    ScrobbleOutcome, TokenAuthenticator,
};
use tracing::{info, warn};

use crate::api::LastfmApi;
use crate::config::LastfmData;

/// Scrobbles plays to a Last.fm account
#[derive(Debug)]
pub struct LastfmClient {
    name: String,
    state: EntityState,
    api: LastfmApi,
    history: ScrobbleHistory,
}

impl LastfmClient {
    pub fn new(name: impl Into<String>, api: LastfmApi) -> Self {
        Self {
            name: name.into(),
            state: EntityState::new(true, true),
            api,
            history: ScrobbleHistory::default(),
        }
    }

    pub fn from_block<F>(block: &EntityBlock, base_url: &str, secret: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> anyhow::Result<String>,
    {
        let api = LastfmData::from_block(block)?.build_api(base_url, secret)?;
        Ok(Self::new(block.name.clone(), api))
    }

    pub fn api(&self) -> &LastfmApi {
        &self.api
    }
}

#[async_trait]
impl Entity for LastfmClient {
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
        self.state.set_initialized(true);
        if self.api.session().is_none() {
            info!(
                label = self.name.as_str(),
                "No session yet, open /client/auth?name={} to authorize",
                self.name
            );
            return Ok(());
        }
        match self.api.user_info().await {
            Ok(user) => {
                self.state.set_authed(true);
                info!(label = self.name.as_str(), "Authenticated as {}", user);
            }
            Err(e) => {
                self.state.set_authed(false);
                warn!(label = self.name.as_str(), "Session check failed: {}", e);
            }
        }
        Ok(())
    }

    fn authorizer(&self) -> Option<&dyn Authorizable> {
        Some(self)
    }

    fn token_auth(&self) -> Option<&dyn TokenAuthenticator> {
        Some(self)
    }
}

impl Authorizable for LastfmClient {
    fn auth_url(&self) -> Result<String> {
        Ok(self
            .api
            .auth_url(&callback_state(EntityType::Lastfm, &self.name))?)
    }
}

#[async_trait]
impl TokenAuthenticator for LastfmClient {
    async fn authenticate(&self, token: &str) -> Result<()> {
        self.api.get_session(token).await?;
        Ok(())
    }
}

#[async_trait]
impl Client for LastfmClient {
    async fn scrobble(&self, play: &PlayEvent) -> Result<ScrobbleOutcome> {
        if self.history.contains(play) {
            return Ok(ScrobbleOutcome::Duplicate);
        }
        self.api.scrobble(play).await?;
        self.history.record(play);
        Ok(ScrobbleOutcome::Scrobbled)
    }
}

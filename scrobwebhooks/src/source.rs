use async_trait::async_trait;
use scrobconfig::EntityBlock;
use scrobcore::entity::forward_play;
use scrobcore::{ClientRegistry, Entity, EntityState, EntityType, PlayEvent, Result, Source};
use serde::Deserialize;
use tracing::debug;

/// Optional `data` of a webhook source block
#[derive(Debug, Default, Clone, Deserialize)]
pub struct WebhookFilters {
    /// Only plays from these users are relayed; empty accepts everyone
    #[serde(default, alias = "user")]
    pub users: Vec<String>,
    #[serde(default, alias = "server")]
    pub servers: Vec<String>,
}

fn allowed(filter: &[String], value: Option<&str>) -> bool {
    if filter.is_empty() {
        return true;
    }
    match value {
        Some(value) => filter.iter().any(|f| f.eq_ignore_ascii_case(value)),
        None => false,
    }
}

/// Source fed by a media server webhook (Tautulli, Plex, Jellyfin)
#[derive(Debug)]
pub struct WebhookSource {
    name: String,
    kind: EntityType,
    state: EntityState,
    filters: WebhookFilters,
    clients: Vec<String>,
}

impl WebhookSource {
    pub fn new(name: impl Into<String>, kind: EntityType, filters: WebhookFilters) -> Self {
        Self {
            name: name.into(),
            kind,
            state: EntityState::default(),
            filters,
            clients: Vec::new(),
        }
    }

    pub fn with_clients(mut self, clients: Vec<String>) -> Self {
        self.clients = clients;
        self
    }

    pub fn from_block(kind: EntityType, block: &EntityBlock) -> anyhow::Result<Self> {
        let filters: WebhookFilters = block.parse_data()?;
        Ok(Self::new(block.name.clone(), kind, filters).with_clients(block.clients.clone()))
    }

    pub fn filters(&self) -> &WebhookFilters {
        &self.filters
    }
}

#[async_trait]
impl Entity for WebhookSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn entity_type(&self) -> EntityType {
        self.kind
    }

    fn state(&self) -> &EntityState {
        &self.state
    }
}

#[async_trait]
impl Source for WebhookSource {
    fn client_targets(&self) -> &[String] {
        &self.clients
    }

    async fn handle(&self, play: PlayEvent, clients: &ClientRegistry) -> Result<()> {
        if !allowed(&self.filters.users, play.meta.user.as_deref()) {
            debug!(
                label = self.name(),
                "Will not scrobble {} because user '{}' is not allowed",
                play.summary(),
                play.meta.user.as_deref().unwrap_or("unknown")
            );
            return Ok(());
        }
        if !allowed(&self.filters.servers, play.meta.server.as_deref()) {
            debug!(
                label = self.name(),
                "Will not scrobble {} because server '{}' is not allowed",
                play.summary(),
                play.meta.server.as_deref().unwrap_or("unknown")
            );
            return Ok(());
        }
        forward_play(self, &play, clients).await;
        Ok(())
    }
}

//! # Scrobble Server Extension Trait
//!
//! [`ScrobbleServerExt`] adds the dashboard, authorization, polling and
//! callback routes to a `scrobserver::Server`, without `scrobserver`
//! knowing about sources or clients.
//!
//! ```rust,ignore
//! use scrobcore::{ScrobbleServerExt, ScrobbleState};
//!
//! let state = ScrobbleState::new(sources, clients, live_log, server.base_url());
//! server.init_scrobble_routes(state).await?;
//! server.start().await?;
//! ```

use anyhow::Result;
use async_trait::async_trait;
use scrobserver::{LiveLog, Server};
use std::sync::Arc;

use crate::registry::{ClientRegistry, SourceRegistry};
use crate::server_impl::scrobble_router;
use crate::{AuthCorrelator, Poller};

/// Everything the scrobble routes need, cheap to clone
#[derive(Debug, Clone)]
pub struct ScrobbleState {
    pub sources: Arc<SourceRegistry>,
    pub clients: Arc<ClientRegistry>,
    pub poller: Poller,
    pub correlator: AuthCorrelator,
    pub live_log: LiveLog,
}

impl ScrobbleState {
    pub fn new(
        sources: Arc<SourceRegistry>,
        clients: Arc<ClientRegistry>,
        live_log: LiveLog,
        local_url: &str,
    ) -> Self {
        let poller = Poller::new(sources.clone(), clients.clone(), local_url);
        let correlator = AuthCorrelator::new(sources.clone(), clients.clone(), poller.clone());
        Self {
            sources,
            clients,
            poller,
            correlator,
            live_log,
        }
    }
}

/// Extension trait registering the scrobble routes on a server
///
/// # Routes enregistrées
///
/// - `GET /` - état des sources, des clients et vue des logs (JSON)
/// - `GET /client/auth?name=` et `GET /source/auth?name=` - redirection vers le fournisseur
/// - `GET /poll?name=` - démarre une boucle de polling
/// - `GET /recent?name=` - écoutes récentes d'une source
/// - `GET <…>callback` - retour d'autorisation des fournisseurs
#[async_trait]
pub trait ScrobbleServerExt {
    async fn init_scrobble_routes(&mut self, state: ScrobbleState) -> Result<()>;
}

#[async_trait]
impl ScrobbleServerExt for Server {
    async fn init_scrobble_routes(&mut self, state: ScrobbleState) -> Result<()> {
        self.add_router("/", scrobble_router(state)).await;
        Ok(())
    }
}

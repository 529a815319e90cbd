//! Sources, clients and their optional capabilities
//!
//! Every provider implements [`Entity`] plus either [`Source`] or [`Client`].
//! Capabilities (polling, token authentication, authorization-code
//! authentication, authorization URL) are separate traits reached through
//! accessors returning `Option<&dyn _>`: a provider lacking one keeps the
//! default `None`.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::registry::ClientRegistry;
use crate::{EntityType, PlayEvent, Result};

/// Mutable status of an entity
///
/// Every field is atomic so that handlers, pollers and callbacks running on
/// different worker threads can update an entity without further locking.
#[derive(Debug, Default)]
pub struct EntityState {
    requires_auth: bool,
    requires_auth_interaction: bool,
    initialized: AtomicBool,
    authed: AtomicBool,
    active_polls: AtomicUsize,
    tracks: AtomicU64,
}

impl EntityState {
    pub fn new(requires_auth: bool, requires_auth_interaction: bool) -> Self {
        Self {
            requires_auth,
            requires_auth_interaction,
            ..Default::default()
        }
    }

    pub fn requires_auth(&self) -> bool {
        self.requires_auth
    }

    pub fn requires_auth_interaction(&self) -> bool {
        self.requires_auth_interaction
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn set_initialized(&self, value: bool) {
        self.initialized.store(value, Ordering::SeqCst);
    }

    pub fn is_authed(&self) -> bool {
        self.authed.load(Ordering::SeqCst)
    }

    pub fn set_authed(&self, value: bool) {
        self.authed.store(value, Ordering::SeqCst);
    }

    /// True while at least one poll loop runs for this entity
    pub fn is_polling(&self) -> bool {
        self.active_polls.load(Ordering::SeqCst) > 0
    }

    pub(crate) fn begin_poll(&self) {
        self.active_polls.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn end_poll(&self) {
        let _ = self
            .active_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Tracks discovered (sources) or scrobbled (clients)
    pub fn tracks(&self) -> u64 {
        self.tracks.load(Ordering::SeqCst)
    }

    pub fn record_track(&self) -> u64 {
        self.tracks.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Initialized, and authenticated when authentication is required
    pub fn is_ready(&self) -> bool {
        self.is_initialized() && (!self.requires_auth || self.is_authed())
    }
}

/// Common shape of sources and clients
#[async_trait]
pub trait Entity: Debug + Send + Sync {
    fn name(&self) -> &str;

    fn entity_type(&self) -> EntityType;

    fn state(&self) -> &EntityState;

    /// Prepares the entity; called once at start-up and after a token exchange
    async fn initialize(&self) -> Result<()> {
        self.state().set_initialized(true);
        Ok(())
    }

    fn authorizer(&self) -> Option<&dyn Authorizable> {
        None
    }

    fn token_auth(&self) -> Option<&dyn TokenAuthenticator> {
        None
    }

    fn auth_code(&self) -> Option<&dyn AuthCodeReceiver> {
        None
    }
}

/// Builds the provider URL a user is sent to for authorization
pub trait Authorizable: Send + Sync {
    fn auth_url(&self) -> Result<String>;
}

/// Token exchange flow: the provider returns a token for a session
#[async_trait]
pub trait TokenAuthenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthCodeOutcome {
    Authorized,
    /// Message returned verbatim to the browser
    Rejected(String),
}

/// Authorization code flow: the provider redirects back with a code
#[async_trait]
pub trait AuthCodeReceiver: Send + Sync {
    async fn handle_auth_code_callback(
        &self,
        query: &HashMap<String, String>,
    ) -> Result<AuthCodeOutcome>;
}

/// Whether a pollable source can be polled at start-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Not polled, nothing to report
    Skip,
    /// Not polled until the user completes an authorization
    NeedsInteraction,
}

#[async_trait]
pub trait Pollable: Send + Sync {
    fn poll_interval(&self) -> Duration;

    fn readiness(&self) -> Readiness {
        Readiness::Ready
    }

    /// Most recent plays, in any order
    async fn recently_played(&self, limit: usize) -> Result<Vec<PlayEvent>>;
}

#[async_trait]
pub trait Source: Entity {
    /// Clients this source relays to; empty means every client
    fn client_targets(&self) -> &[String] {
        &[]
    }

    /// Processes one play discovered by this source
    async fn handle(&self, play: PlayEvent, clients: &ClientRegistry) -> Result<()> {
        forward_play(self, &play, clients).await;
        Ok(())
    }

    fn pollable(&self) -> Option<&dyn Pollable> {
        None
    }

    fn can_poll(&self) -> bool {
        self.pollable().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrobbleOutcome {
    Scrobbled,
    /// Already scrobbled by this client
    Duplicate,
}

#[async_trait]
pub trait Client: Entity {
    async fn scrobble(&self, play: &PlayEvent) -> Result<ScrobbleOutcome>;
}

/// Counts a play on `source` and relays it to the source's clients
///
/// Returns the number of clients that accepted the play. A failing client is
/// logged and does not prevent the others from receiving the play.
pub async fn forward_play<S: Source + ?Sized>(
    source: &S,
    play: &PlayEvent,
    clients: &ClientRegistry,
) -> usize {
    source.state().record_track();
    info!(label = source.name(), "New play: {}", play.summary());

    let targets = source.client_targets();
    let selected = if targets.is_empty() {
        clients.all().to_vec()
    } else {
        targets
            .iter()
            .filter_map(|name| {
                let client = clients.get_by_name(name);
                if client.is_none() {
                    warn!(label = source.name(), "Configured client '{}' does not exist", name);
                }
                client
            })
            .collect()
    };

    if selected.is_empty() {
        warn!(label = source.name(), "No clients to scrobble {}", play.summary());
        return 0;
    }

    let mut scrobbled = 0;
    for client in selected {
        if !client.state().is_ready() {
            debug!(label = client.name(), "Client not ready, skipping {}", play.summary());
            continue;
        }
        match client.scrobble(play).await {
            Ok(ScrobbleOutcome::Scrobbled) => {
                client.state().record_track();
                scrobbled += 1;
                info!(label = client.name(), "Scrobbled: {}", play.summary());
            }
            Ok(ScrobbleOutcome::Duplicate) => {
                debug!(label = client.name(), "Already scrobbled: {}", play.summary());
            }
            Err(e) => {
                warn!(label = client.name(), "Failed to scrobble {}: {}", play.summary(), e);
            }
        }
    }
    scrobbled
}

/// Number of plays a [`ScrobbleHistory`] remembers by default
pub const HISTORY_CAPACITY: usize = 1000;

/// Most recent plays sent by a client, oldest forgotten first
#[derive(Debug)]
pub struct ScrobbleHistory {
    capacity: usize,
    seen: Mutex<SeenPlays>,
}

#[derive(Debug, Default)]
struct SeenPlays {
    order: VecDeque<String>,
    set: HashSet<String>,
}

impl Default for ScrobbleHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl ScrobbleHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            seen: Mutex::new(SeenPlays::default()),
        }
    }

    pub fn contains(&self, play: &PlayEvent) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set
            .contains(&play.identity())
    }

    pub fn record(&self, play: &PlayEvent) {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        let identity = play.identity();
        if !seen.set.insert(identity.clone()) {
            return;
        }
        seen.order.push_back(identity);
        while seen.order.len() > self.capacity {
            if let Some(oldest) = seen.order.pop_front() {
                seen.set.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

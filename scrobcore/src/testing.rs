//! In-memory sources and clients for unit tests

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::entity::{
    AuthCodeOutcome, AuthCodeReceiver, Authorizable, Client, Entity, EntityState, Pollable,
    Readiness, ScrobbleOutcome, Source, TokenAuthenticator,
};
use crate::registry::ClientRegistry;
use crate::{AuthError, EntityType, PlayEvent, Result, ScrobbleError};

pub fn play(track: &str) -> PlayEvent {
    PlayEvent::new(
        EntityType::Plex,
        vec!["Artist".into()],
        track,
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    )
}

pub fn play_at(track: &str, secs: i64) -> PlayEvent {
    PlayEvent {
        playback_timestamp: Utc::now() + chrono::Duration::seconds(secs),
        ..play(track)
    }
}

/// Shared journal of `(source, track)` handled, to check ordering across sources
pub type Journal = Arc<Mutex<Vec<(String, String)>>>;

#[derive(Debug)]
pub struct FakeClient {
    name: String,
    state: EntityState,
    fail: AtomicBool,
    token: Option<String>,
    received: Mutex<Vec<String>>,
}

impl FakeClient {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self::build(name, None))
    }

    pub fn ready(name: &str) -> Arc<Self> {
        let client = Self::new(name);
        client.state.set_initialized(true);
        client
    }

    /// Client authenticated by the token flow, accepting `token`
    pub fn with_token(name: &str, token: &str) -> Arc<Self> {
        Arc::new(Self::build(name, Some(token.to_string())))
    }

    fn build(name: &str, token: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            state: EntityState::new(token.is_some(), token.is_some()),
            fail: AtomicBool::new(false),
            token,
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(self: Arc<Self>) -> Arc<Self> {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl Entity for FakeClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn entity_type(&self) -> EntityType {
        if self.token.is_some() {
            EntityType::Lastfm
        } else {
            EntityType::Maloja
        }
    }

    fn state(&self) -> &EntityState {
        &self.state
    }

    fn authorizer(&self) -> Option<&dyn Authorizable> {
        self.token.as_ref().map(|_| self as &dyn Authorizable)
    }

    fn token_auth(&self) -> Option<&dyn TokenAuthenticator> {
        self.token.as_ref().map(|_| self as &dyn TokenAuthenticator)
    }
}

impl Authorizable for FakeClient {
    fn auth_url(&self) -> Result<String> {
        Ok(format!("https://auth.example/client/{}", self.name))
    }
}

#[async_trait]
impl TokenAuthenticator for FakeClient {
    async fn authenticate(&self, token: &str) -> Result<()> {
        self.received.lock().unwrap().push(format!("token:{}", token));
        if self.token.as_deref() == Some(token) {
            Ok(())
        } else {
            Err(AuthError::Rejected("Invalid token".into()).into())
        }
    }
}

#[async_trait]
impl Client for FakeClient {
    async fn scrobble(&self, play: &PlayEvent) -> Result<ScrobbleOutcome> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ScrobbleError::Upstream("remote refused".into()));
        }
        self.received.lock().unwrap().push(play.track.clone());
        Ok(ScrobbleOutcome::Scrobbled)
    }
}

#[derive(Debug)]
struct FakePoll {
    interval: Duration,
    readiness: Mutex<Readiness>,
    calls: Mutex<Vec<tokio::time::Instant>>,
    responses: Mutex<VecDeque<Vec<PlayEvent>>>,
}

#[derive(Debug)]
pub struct FakeSource {
    name: String,
    kind: EntityType,
    state: EntityState,
    targets: Vec<String>,
    fail_handle: bool,
    fail_init: bool,
    journal: Option<Journal>,
    poll: Option<FakePoll>,
    token: Option<String>,
    auth_code: Option<AuthCodeOutcome>,
    auth_calls: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn new(name: &str, kind: EntityType) -> Self {
        let state = EntityState::default();
        state.set_initialized(true);
        Self {
            name: name.to_string(),
            kind,
            state,
            targets: Vec::new(),
            fail_handle: false,
            fail_init: false,
            journal: None,
            poll: None,
            token: None,
            auth_code: None,
            auth_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_journal(mut self, journal: &Journal) -> Self {
        self.journal = Some(journal.clone());
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_handle = true;
        self
    }

    pub fn failing_initialize(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Makes the source pollable; each fetch pops one batch, an empty queue is an error
    pub fn polling_with(mut self, interval: Duration, batches: Vec<Vec<PlayEvent>>) -> Self {
        self.poll = Some(FakePoll {
            interval,
            readiness: Mutex::new(Readiness::Ready),
            calls: Mutex::new(Vec::new()),
            responses: Mutex::new(batches.into()),
        });
        self
    }

    pub fn with_readiness(self, readiness: Readiness) -> Self {
        if let Some(poll) = &self.poll {
            *poll.readiness.lock().unwrap() = readiness;
        }
        self
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_auth_code(mut self, outcome: AuthCodeOutcome) -> Self {
        self.state = EntityState::new(true, true);
        self.state.set_initialized(true);
        self.auth_code = Some(outcome);
        self
    }

    pub fn poll_calls(&self) -> Vec<tokio::time::Instant> {
        self.poll
            .as_ref()
            .map(|p| p.calls.lock().unwrap().clone())
            .unwrap_or_default()
    }

    pub fn auth_calls(&self) -> Vec<String> {
        self.auth_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Entity for FakeSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn entity_type(&self) -> EntityType {
        self.kind
    }

    fn state(&self) -> &EntityState {
        &self.state
    }

    async fn initialize(&self) -> Result<()> {
        if self.fail_init {
            self.state.set_initialized(false);
            return Err(ScrobbleError::Upstream("session check failed".into()));
        }
        self.state.set_initialized(true);
        Ok(())
    }

    fn authorizer(&self) -> Option<&dyn Authorizable> {
        (self.token.is_some() || self.auth_code.is_some()).then_some(self as &dyn Authorizable)
    }

    fn token_auth(&self) -> Option<&dyn TokenAuthenticator> {
        self.token.as_ref().map(|_| self as &dyn TokenAuthenticator)
    }

    fn auth_code(&self) -> Option<&dyn AuthCodeReceiver> {
        self.auth_code.as_ref().map(|_| self as &dyn AuthCodeReceiver)
    }
}

impl Authorizable for FakeSource {
    fn auth_url(&self) -> Result<String> {
        Ok(format!("https://auth.example/source/{}", self.name))
    }
}

#[async_trait]
impl TokenAuthenticator for FakeSource {
    async fn authenticate(&self, token: &str) -> Result<()> {
        self.auth_calls.lock().unwrap().push(format!("token:{}", token));
        if self.token.as_deref() == Some(token) {
            Ok(())
        } else {
            Err(AuthError::Rejected("Invalid token".into()).into())
        }
    }
}

#[async_trait]
impl AuthCodeReceiver for FakeSource {
    async fn handle_auth_code_callback(
        &self,
        query: &HashMap<String, String>,
    ) -> Result<AuthCodeOutcome> {
        let code = query.get("code").cloned().unwrap_or_default();
        self.auth_calls.lock().unwrap().push(format!("code:{}", code));
        let outcome = self.auth_code.clone().unwrap_or(AuthCodeOutcome::Authorized);
        if outcome == AuthCodeOutcome::Authorized {
            if let Some(poll) = &self.poll {
                *poll.readiness.lock().unwrap() = Readiness::Ready;
            }
        }
        Ok(outcome)
    }
}

#[async_trait]
impl Pollable for FakeSource {
    fn poll_interval(&self) -> Duration {
        self.poll.as_ref().map(|p| p.interval).unwrap_or_default()
    }

    fn readiness(&self) -> Readiness {
        self.poll
            .as_ref()
            .map(|p| *p.readiness.lock().unwrap())
            .unwrap_or(Readiness::Ready)
    }

    async fn recently_played(&self, _limit: usize) -> Result<Vec<PlayEvent>> {
        let Some(poll) = &self.poll else {
            return Err(ScrobbleError::NotPollable(self.kind));
        };
        poll.calls.lock().unwrap().push(tokio::time::Instant::now());
        poll.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ScrobbleError::Upstream("no more plays".into()))
    }
}

#[async_trait]
impl Source for FakeSource {
    fn client_targets(&self) -> &[String] {
        &self.targets
    }

    async fn handle(&self, play: PlayEvent, clients: &ClientRegistry) -> Result<()> {
        if let Some(journal) = &self.journal {
            journal
                .lock()
                .unwrap()
                .push((self.name.clone(), play.track.clone()));
        }
        if self.fail_handle {
            return Err(ScrobbleError::Upstream("handler exploded".into()));
        }
        crate::entity::forward_play(self, &play, clients).await;
        Ok(())
    }

    fn pollable(&self) -> Option<&dyn Pollable> {
        self.poll.as_ref().map(|_| self as &dyn Pollable)
    }
}

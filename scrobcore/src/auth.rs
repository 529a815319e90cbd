//! Routes provider authorization callbacks back to the entity that asked for them
//!
//! Two flows exist:
//!
//! - token exchange (Last.fm): the callback carries `token` and `state`, and
//!   the entity named by `state` exchanges the token for a session. Clients
//!   are looked up before sources.
//! - authorization code (Spotify): the callback carries `code` and `state`,
//!   and only sources are considered. A successful exchange starts polling.
//!
//! The `state` parameter is written by the entity as `<type>:<name>`. When it
//! carries no known type prefix, the flow is chosen from the callback path.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::entity::{AuthCodeOutcome, Entity};
use crate::poller::Poller;
use crate::registry::{ClientRegistry, Registry, SourceRegistry};
use crate::{AuthError, EntityType, Result, Role};

/// Path fragment identifying a Last.fm callback
pub const LASTFM_CALLBACK_MARKER: &str = "lastfm";

/// Builds the `state` value an entity sends to its provider
pub fn callback_state(kind: EntityType, name: &str) -> String {
    format!("{}:{}", kind, name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackFlow {
    TokenExchange,
    AuthorizationCode,
}

/// Entity designated by a callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackTarget {
    pub flow: CallbackFlow,
    /// Type named by the `state` prefix, if any
    pub kind: Option<EntityType>,
    pub name: String,
}

/// Flow, type and entity name designated by a callback
pub fn classify_callback(path: &str, state: &str) -> CallbackTarget {
    if let Some((prefix, name)) = state.split_once(':') {
        if let Ok(kind) = prefix.parse::<EntityType>() {
            let flow = match kind {
                EntityType::Lastfm => CallbackFlow::TokenExchange,
                _ => CallbackFlow::AuthorizationCode,
            };
            return CallbackTarget {
                flow,
                kind: Some(kind),
                name: name.to_string(),
            };
        }
    }

    let flow = if path.contains(LASTFM_CALLBACK_MARKER) {
        CallbackFlow::TokenExchange
    } else {
        CallbackFlow::AuthorizationCode
    };
    CallbackTarget {
        flow,
        kind: None,
        name: state.to_string(),
    }
}

/// Provider authorization URL of an entity
pub fn auth_url<E: Entity + ?Sized>(entity: &E, role: Role) -> Result<String> {
    match entity.authorizer() {
        Some(authorizer) => authorizer.auth_url(),
        None => Err(AuthError::Unsupported {
            role,
            kind: entity.entity_type(),
        }
        .into()),
    }
}

#[derive(Debug, Clone)]
pub struct AuthCorrelator {
    sources: Arc<SourceRegistry>,
    clients: Arc<ClientRegistry>,
    poller: Poller,
}

impl AuthCorrelator {
    pub fn new(sources: Arc<SourceRegistry>, clients: Arc<ClientRegistry>, poller: Poller) -> Self {
        Self {
            sources,
            clients,
            poller,
        }
    }

    /// Handles a callback and returns the response body
    ///
    /// Successes answer `OK`, failures answer their message.
    pub async fn handle_callback(&self, path: &str, query: &HashMap<String, String>) -> String {
        let Some(state) = query.get("state") else {
            return AuthError::MissingParameter("state").to_string();
        };
        let target = classify_callback(path, state);
        let name = target.name.as_str();

        let result = match target.flow {
            CallbackFlow::TokenExchange => self.token_exchange(target.kind, name, query).await,
            CallbackFlow::AuthorizationCode => {
                self.authorization_code(target.kind, name, query).await
            }
        };
        match result {
            Ok(()) => "OK".to_string(),
            Err(e) => {
                warn!(label = name, "Authorization callback failed: {}", e);
                e.to_string()
            }
        }
    }

    async fn token_exchange(
        &self,
        kind: Option<EntityType>,
        name: &str,
        query: &HashMap<String, String>,
    ) -> Result<()> {
        let token = query
            .get("token")
            .ok_or(AuthError::MissingParameter("token"))?;

        if let Some(client) = lookup(&self.clients, kind, name) {
            return complete_token_exchange(&*client, Role::Client, token).await;
        }
        if let Some(source) = lookup(&self.sources, kind, name) {
            return complete_token_exchange(&*source, Role::Source, token).await;
        }
        Err(AuthError::UnknownEntity(name.to_string()).into())
    }

    async fn authorization_code(
        &self,
        kind: Option<EntityType>,
        name: &str,
        query: &HashMap<String, String>,
    ) -> Result<()> {
        let source = lookup(&self.sources, kind, name)
            .ok_or_else(|| AuthError::UnknownEntity(name.to_string()))?;
        let receiver = source.auth_code().ok_or(AuthError::Unsupported {
            role: Role::Source,
            kind: source.entity_type(),
        })?;

        info!(
            label = source.entity_type().display(),
            "Received auth code callback from {}",
            source.entity_type().display()
        );
        match receiver.handle_auth_code_callback(query).await? {
            AuthCodeOutcome::Authorized => {
                source.state().set_authed(true);
                if source.can_poll() {
                    self.poller.poll_now(source.clone())?;
                }
                Ok(())
            }
            AuthCodeOutcome::Rejected(message) => Err(AuthError::Rejected(message).into()),
        }
    }
}

/// Entity of the given type and name, or the first with that name when untyped
fn lookup<T: Entity + ?Sized>(
    registry: &Registry<T>,
    kind: Option<EntityType>,
    name: &str,
) -> Option<Arc<T>> {
    match kind {
        Some(kind) => registry.get(kind, name),
        None => registry.get_by_name(name),
    }
}

async fn complete_token_exchange<E: Entity + ?Sized>(
    entity: &E,
    role: Role,
    token: &str,
) -> Result<()> {
    let authenticator = entity.token_auth().ok_or(AuthError::Unsupported {
        role,
        kind: entity.entity_type(),
    })?;

    authenticator.authenticate(token).await?;
    entity.state().set_authed(true);
    if let Err(e) = entity.initialize().await {
        entity.state().set_authed(false);
        return Err(e);
    }
    info!(label = entity.name(), "{} {} authenticated", role, entity.name());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Client, Source};
    use crate::testing::{FakeClient, FakeSource};
    use std::time::Duration;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn correlator(sources: Vec<Arc<dyn Source>>, clients: Vec<Arc<dyn Client>>) -> AuthCorrelator {
        let sources = Arc::new(Registry::from_entries(Role::Source, sources));
        let clients = Arc::new(Registry::from_entries(Role::Client, clients));
        let poller = Poller::new(sources.clone(), clients.clone(), "http://localhost:9078");
        AuthCorrelator::new(sources, clients, poller)
    }

    fn target(flow: CallbackFlow, kind: Option<EntityType>, name: &str) -> CallbackTarget {
        CallbackTarget {
            flow,
            kind,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify_callback("/callback", "lastfm:mine"),
            target(CallbackFlow::TokenExchange, Some(EntityType::Lastfm), "mine")
        );
        assert_eq!(
            classify_callback("/lastfm/callback", "spotify:mine"),
            target(CallbackFlow::AuthorizationCode, Some(EntityType::Spotify), "mine")
        );
        assert_eq!(
            classify_callback("/lastfm/callback", "mine"),
            target(CallbackFlow::TokenExchange, None, "mine")
        );
        assert_eq!(
            classify_callback("/callback", "odd:name"),
            target(CallbackFlow::AuthorizationCode, None, "odd:name")
        );
    }

    #[test]
    fn test_auth_url_unsupported() {
        let source = FakeSource::new("hook", EntityType::Plex);
        let err = auth_url(&source, Role::Source).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Specified source does not have auth implemented (plex)"
        );

        let source = FakeSource::new("fm", EntityType::Lastfm).with_token("t");
        assert_eq!(
            auth_url(&source, Role::Source).unwrap(),
            "https://auth.example/source/fm"
        );
    }

    #[tokio::test]
    async fn test_token_exchange_prefers_client() {
        let client = FakeClient::with_token("shared", "tok");
        let source = Arc::new(FakeSource::new("shared", EntityType::Lastfm).with_token("tok"));
        let c = correlator(vec![source.clone()], vec![client.clone()]);

        let body = c
            .handle_callback("/lastfm/callback", &query(&[("state", "shared"), ("token", "tok")]))
            .await;

        assert_eq!(body, "OK");
        assert!(client.state().is_authed());
        assert!(client.state().is_initialized());
        assert_eq!(client.received(), vec!["token:tok"]);
        assert!(source.auth_calls().is_empty());
        assert!(!source.state().is_authed());
    }

    #[tokio::test]
    async fn test_typed_state_selects_entity_of_that_type() {
        let maloja = FakeClient::ready("home");
        let lastfm = FakeClient::with_token("home", "tok");
        let c = correlator(vec![], vec![maloja.clone() as Arc<dyn Client>, lastfm.clone()]);

        let body = c
            .handle_callback("/lastfm/callback", &query(&[("state", "lastfm:home"), ("token", "tok")]))
            .await;

        assert_eq!(body, "OK");
        assert!(lastfm.state().is_authed());
        assert_eq!(lastfm.received(), vec!["token:tok"]);
        assert!(maloja.received().is_empty());
    }

    #[tokio::test]
    async fn test_typed_state_skips_other_types() {
        let maloja = FakeClient::ready("home");
        let c = correlator(vec![], vec![maloja.clone()]);

        let body = c
            .handle_callback("/callback", &query(&[("state", "lastfm:home"), ("token", "tok")]))
            .await;

        assert_eq!(
            body,
            "No source or client named 'home' is waiting for authentication"
        );
        assert!(maloja.received().is_empty());
    }

    #[tokio::test]
    async fn test_failed_initialize_leaves_entity_unauthed() {
        let source = Arc::new(
            FakeSource::new("fm", EntityType::Lastfm)
                .with_token("tok")
                .failing_initialize(),
        );
        let c = correlator(vec![source.clone()], vec![]);

        let body = c
            .handle_callback("/callback", &query(&[("state", "lastfm:fm"), ("token", "tok")]))
            .await;

        assert_eq!(body, "session check failed");
        assert_eq!(source.auth_calls(), vec!["token:tok"]);
        assert!(!source.state().is_authed());
    }

    #[tokio::test]
    async fn test_token_exchange_falls_back_to_source() {
        let source = Arc::new(FakeSource::new("fm", EntityType::Lastfm).with_token("tok"));
        let c = correlator(vec![source.clone()], vec![]);

        let body = c
            .handle_callback("/callback", &query(&[("state", "lastfm:fm"), ("token", "tok")]))
            .await;

        assert_eq!(body, "OK");
        assert!(source.state().is_authed());
    }

    #[tokio::test]
    async fn test_token_exchange_failure_message_is_returned() {
        let client = FakeClient::with_token("fm", "tok");
        let c = correlator(vec![], vec![client.clone()]);

        let body = c
            .handle_callback("/lastfm/callback", &query(&[("state", "fm"), ("token", "bad")]))
            .await;
        assert_eq!(body, "Invalid token");
        assert!(!client.state().is_authed());

        let body = c
            .handle_callback("/lastfm/callback", &query(&[("state", "fm")]))
            .await;
        assert_eq!(body, "Callback is missing the 'token' parameter");

        let body = c
            .handle_callback("/lastfm/callback", &query(&[("state", "ghost"), ("token", "t")]))
            .await;
        assert_eq!(
            body,
            "No source or client named 'ghost' is waiting for authentication"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_code_success_starts_polling() {
        let source = Arc::new(
            FakeSource::new("spot", EntityType::Spotify)
                .polling_with(Duration::from_secs(60), vec![vec![]])
                .with_auth_code(AuthCodeOutcome::Authorized),
        );
        let c = correlator(vec![source.clone()], vec![]);

        let body = c
            .handle_callback("/callback", &query(&[("state", "spotify:spot"), ("code", "abc")]))
            .await;
        tokio::task::yield_now().await;

        assert_eq!(body, "OK");
        assert_eq!(source.auth_calls(), vec!["code:abc"]);
        assert!(source.state().is_authed());
        assert_eq!(source.poll_calls().len(), 1);
        assert!(source.state().is_polling());
    }

    #[tokio::test]
    async fn test_auth_code_rejection_is_verbatim() {
        let source = Arc::new(
            FakeSource::new("spot", EntityType::Spotify)
                .with_auth_code(AuthCodeOutcome::Rejected("access_denied".into())),
        );
        let c = correlator(vec![source.clone()], vec![]);

        let body = c
            .handle_callback("/callback", &query(&[("state", "spot"), ("error", "access_denied")]))
            .await;

        assert_eq!(body, "access_denied");
        assert!(!source.state().is_authed());
    }

    #[tokio::test]
    async fn test_auth_code_ignores_clients() {
        let client = FakeClient::with_token("spot", "tok");
        let c = correlator(vec![], vec![client]);

        let body = c
            .handle_callback("/callback", &query(&[("state", "spot"), ("code", "abc")]))
            .await;
        assert_eq!(
            body,
            "No source or client named 'spot' is waiting for authentication"
        );
    }
}

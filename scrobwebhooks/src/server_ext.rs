//! # Webhook Server Extension Trait
//!
//! Registers the inbound webhook routes on a `scrobserver::Server`.
//!
//! Every route answers `OK`, whatever happened to the payload: media
//! servers retry or disable webhooks answered with an error, and a bad
//! payload is only worth a warning in the logs.
//!
//! ```rust,ignore
//! use scrobwebhooks::WebhookServerExt;
//!
//! server.init_webhook_routes(Dispatcher::new(sources, clients)).await?;
//! ```

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    Router,
    body::Bytes,
    extract::{Multipart, State, multipart::MultipartRejection},
    routing::post,
};
use scrobcore::{Dispatcher, EntityType, PayloadError, PlayEvent};
use scrobserver::Server;
use serde_json::Value;
use tracing::{debug, warn};

use crate::formats::{jellyfin_play, plex_play, tautulli_play};

/// Field of a Tautulli payload naming the source that should handle it
const TAUTULLI_CONFIG_FIELD: &str = "scrobblerConfig";

fn parse_json(kind: EntityType, body: &[u8]) -> Option<Value> {
    match serde_json::from_slice(body) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(label = kind.display(), "Could not parse webhook body: {}", e);
            None
        }
    }
}

async fn dispatch(
    dispatcher: &Dispatcher,
    kind: EntityType,
    parsed: std::result::Result<PlayEvent, PayloadError>,
    explicit_name: Option<&str>,
) {
    match parsed {
        Ok(play) => {
            dispatcher.handle_webhook(kind, play, explicit_name).await;
        }
        Err(PayloadError::Ignored(reason)) => {
            debug!(label = kind.display(), "Ignoring webhook: {}", reason);
        }
        Err(e) => {
            warn!(label = kind.display(), "Invalid webhook payload: {}", e);
        }
    }
}

async fn tautulli(State(dispatcher): State<Dispatcher>, body: Bytes) -> &'static str {
    let kind = EntityType::Tautulli;
    if let Some(value) = parse_json(kind, &body) {
        let explicit_name = value
            .get(TAUTULLI_CONFIG_FIELD)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        dispatch(&dispatcher, kind, tautulli_play(&value), explicit_name.as_deref()).await;
    }
    "OK"
}

async fn plex(
    State(dispatcher): State<Dispatcher>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> &'static str {
    let kind = EntityType::Plex;
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(e) => {
            warn!(label = kind.display(), "Plex webhook is not multipart: {}", e);
            return "OK";
        }
    };

    // Plex joint parfois une vignette : seul le champ `payload` compte
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("payload") => {
                match field.bytes().await {
                    Ok(bytes) => {
                        if let Some(value) = parse_json(kind, &bytes) {
                            dispatch(&dispatcher, kind, plex_play(&value), None).await;
                        }
                    }
                    Err(e) => warn!(label = kind.display(), "Could not read payload: {}", e),
                }
                break;
            }
            Ok(Some(_)) => continue,
            Ok(None) => {
                warn!(label = kind.display(), "Plex webhook has no payload field");
                break;
            }
            Err(e) => {
                warn!(label = kind.display(), "Could not read multipart body: {}", e);
                break;
            }
        }
    }
    "OK"
}

async fn jellyfin(State(dispatcher): State<Dispatcher>, body: Bytes) -> &'static str {
    let kind = EntityType::Jellyfin;
    if let Some(value) = parse_json(kind, &body) {
        dispatch(&dispatcher, kind, jellyfin_play(&value), None).await;
    }
    "OK"
}

/// Router for `POST /tautulli`, `POST /plex` and `POST /jellyfin`
pub fn webhook_router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/tautulli", post(tautulli))
        .route("/plex", post(plex))
        .route("/jellyfin", post(jellyfin))
        .with_state(dispatcher)
}

#[async_trait]
pub trait WebhookServerExt {
    async fn init_webhook_routes(&mut self, dispatcher: Dispatcher) -> Result<()>;
}

#[async_trait]
impl WebhookServerExt for Server {
    async fn init_webhook_routes(&mut self, dispatcher: Dispatcher) -> Result<()> {
        self.add_router("/", webhook_router(dispatcher)).await;
        Ok(())
    }
}

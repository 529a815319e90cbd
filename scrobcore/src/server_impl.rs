//! Handlers behind [`crate::ScrobbleServerExt`]

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use scrobserver::{
    LogLine, LogSettings,
    logs::{LIMIT_CHOICES, LogLevel, SortOrder},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::auth::auth_url;
use crate::entity::Entity;
use crate::poller::RECENT_LIMIT;
use crate::registry::Registry;
use crate::server_ext::ScrobbleState;
use crate::status::EntityStatus;
use crate::{EntityType, PlayEvent, Role, ScrobbleError};

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
struct LogsView {
    output: Vec<LogLine>,
    settings: LogSettings,
    limits: [usize; 4],
    sorts: [SortOrder; 2],
    levels: [LogLevel; 2],
}

#[derive(Debug, Serialize)]
struct Dashboard {
    sources: Vec<EntityStatus>,
    clients: Vec<EntityStatus>,
    logs: LogsView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecentPlays {
    name: String,
    source_type: EntityType,
    plays: Vec<PlayEvent>,
}

fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, message.into()).into_response()
}

/// Entity designated by `?name=`, or the only one configured
fn resolve<T: Entity + ?Sized>(
    registry: &Registry<T>,
    name: Option<&str>,
) -> Result<Arc<T>, Response> {
    let role = registry.role();
    match name {
        Some(name) => registry
            .get_by_name(name)
            .ok_or_else(|| bad_request(format!("No {} with the name {} exists", role, name))),
        None => match registry.all() {
            [only] => Ok(only.clone()),
            [] => Err(bad_request(format!("No {}s are configured", role))),
            _ => Err(bad_request(format!(
                "Multiple {}s are configured, specify one with ?name=",
                role
            ))),
        },
    }
}

async fn dashboard(State(state): State<ScrobbleState>) -> Json<Dashboard> {
    let sources = state
        .sources
        .all()
        .iter()
        .map(|s| EntityStatus::of_source(s.as_ref()))
        .collect();
    let clients = state
        .clients
        .all()
        .iter()
        .map(|c| EntityStatus::of_client(c.as_ref()))
        .collect();

    Json(Dashboard {
        sources,
        clients,
        logs: LogsView {
            output: state.live_log.view(),
            settings: state.live_log.settings(),
            limits: LIMIT_CHOICES,
            sorts: [SortOrder::Ascending, SortOrder::Descending],
            levels: LogLevel::AVAILABLE,
        },
    })
}

async fn client_auth(
    State(state): State<ScrobbleState>,
    Query(query): Query<NameQuery>,
) -> Response {
    let client = match resolve(&state.clients, query.name.as_deref()) {
        Ok(client) => client,
        Err(response) => return response,
    };
    match auth_url(&*client, Role::Client) {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(e) => bad_request(e.to_string()),
    }
}

async fn source_auth(
    State(state): State<ScrobbleState>,
    Query(query): Query<NameQuery>,
) -> Response {
    let source = match resolve(&state.sources, query.name.as_deref()) {
        Ok(source) => source,
        Err(response) => return response,
    };
    match auth_url(&*source, Role::Source) {
        Ok(url) => {
            info!(
                label = source.name(),
                "Redirecting to {} authorization url",
                source.entity_type().display()
            );
            Redirect::to(&url).into_response()
        }
        Err(e) => bad_request(e.to_string()),
    }
}

async fn poll(State(state): State<ScrobbleState>, Query(query): Query<NameQuery>) -> Response {
    let source = match resolve(&state.sources, query.name.as_deref()) {
        Ok(source) => source,
        Err(response) => return response,
    };
    match state.poller.poll_now(source) {
        Ok(_) => "OK".into_response(),
        Err(e) => bad_request(e.to_string()),
    }
}

async fn recent(State(state): State<ScrobbleState>, Query(query): Query<NameQuery>) -> Response {
    let source = match resolve(&state.sources, query.name.as_deref()) {
        Ok(source) => source,
        Err(response) => return response,
    };
    let Some(pollable) = source.pollable() else {
        return bad_request(format!(
            "Specified source cannot retrieve recent plays ({})",
            source.entity_type()
        ));
    };

    match pollable.recently_played(RECENT_LIMIT).await {
        Ok(mut plays) => {
            plays.sort_by(|a, b| b.playback_timestamp.cmp(&a.playback_timestamp));
            Json(RecentPlays {
                name: source.name().to_string(),
                source_type: source.entity_type(),
                plays,
            })
            .into_response()
        }
        Err(e @ ScrobbleError::NotPollable(_)) => bad_request(e.to_string()),
        Err(e) => (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
    }
}

/// Any GET path ending in `callback` is an authorization callback
async fn callback(
    State(state): State<ScrobbleState>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if method != Method::GET || !uri.path().ends_with("callback") {
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    }
    state
        .correlator
        .handle_callback(uri.path(), &query)
        .await
        .into_response()
}

/// Router for the dashboard, authorization, polling and callback routes
pub fn scrobble_router(state: ScrobbleState) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/client/auth", get(client_auth))
        .route("/source/auth", get(source_auth))
        .route("/poll", get(poll))
        .route("/recent", get(recent))
        .fallback(callback)
        .with_state(state)
}

//! Human readable status of sources and clients

use serde::Serialize;

use crate::entity::{Client, Source};
use crate::{EntityType, Role};

/// The fields a status label is derived from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFields {
    pub initialized: bool,
    pub requires_auth: bool,
    pub requires_auth_interaction: bool,
    pub authed: bool,
    /// Always false for clients
    pub can_poll: bool,
    pub polling: bool,
    /// Tracks discovered (sources) or scrobbled (clients)
    pub tracks: u64,
}

/// Status label; the first matching rule wins
pub fn project(fields: &StatusFields) -> &'static str {
    if !fields.initialized {
        "Not Initialized"
    } else if fields.requires_auth && !fields.authed {
        if fields.requires_auth_interaction {
            "Auth Interaction Required"
        } else {
            "Authentication Failed Or Not Attempted"
        }
    } else if fields.can_poll {
        if fields.polling { "Running" } else { "Idle" }
    } else if fields.tracks > 0 {
        "Received Data"
    } else {
        "Awaiting Data"
    }
}

/// Dashboard row for one entity
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityStatus {
    pub role: Role,
    #[serde(rename = "type")]
    pub kind: EntityType,
    pub display: &'static str,
    pub name: String,
    pub tracks_discovered: u64,
    pub can_poll: bool,
    pub has_auth: bool,
    pub has_auth_interaction: bool,
    pub status: &'static str,
}

impl EntityStatus {
    pub fn of_source(source: &dyn Source) -> Self {
        let state = source.state();
        let fields = StatusFields {
            initialized: state.is_initialized(),
            requires_auth: state.requires_auth(),
            requires_auth_interaction: state.requires_auth_interaction(),
            authed: state.is_authed(),
            can_poll: source.can_poll(),
            polling: state.is_polling(),
            tracks: state.tracks(),
        };
        Self::build(Role::Source, source.entity_type(), source.name(), &fields)
    }

    pub fn of_client(client: &dyn Client) -> Self {
        let state = client.state();
        let fields = StatusFields {
            initialized: state.is_initialized(),
            requires_auth: state.requires_auth(),
            requires_auth_interaction: state.requires_auth_interaction(),
            authed: state.is_authed(),
            tracks: state.tracks(),
            ..Default::default()
        };
        Self::build(Role::Client, client.entity_type(), client.name(), &fields)
    }

    fn build(role: Role, kind: EntityType, name: &str, fields: &StatusFields) -> Self {
        Self {
            role,
            kind,
            display: kind.display(),
            name: name.to_string(),
            tracks_discovered: fields.tracks,
            can_poll: fields.can_poll,
            has_auth: fields.requires_auth,
            has_auth_interaction: fields.requires_auth_interaction,
            status: project(fields),
        }
    }
}

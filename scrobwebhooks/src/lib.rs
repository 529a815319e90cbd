//! # scrobwebhooks
//!
//! Sources fed by media server webhooks.
//!
//! | Route | Server | Body |
//! |-------|--------|------|
//! | `POST /tautulli` | Tautulli (Plex) | JSON |
//! | `POST /plex` | Plex Media Server | multipart, `payload` field |
//! | `POST /jellyfin` | Jellyfin webhook plugin | JSON |

pub mod formats;
pub mod server_ext;
mod source;

use std::sync::Arc;

use scrobconfig::EntityBlock;
use scrobcore::{EntityType, Source};

pub use server_ext::{WebhookServerExt, webhook_router};
pub use source::{WebhookFilters, WebhookSource};

/// True for the entity types fed by a webhook
pub fn is_webhook_type(kind: EntityType) -> bool {
    matches!(
        kind,
        EntityType::Tautulli | EntityType::Plex | EntityType::Jellyfin
    )
}

/// Builds a webhook source from its configuration block
pub fn build_source(kind: EntityType, block: &EntityBlock) -> anyhow::Result<Arc<dyn Source>> {
    if !is_webhook_type(kind) {
        anyhow::bail!("{} is not a webhook source", kind);
    }
    Ok(Arc::new(WebhookSource::from_block(kind, block)?))
}

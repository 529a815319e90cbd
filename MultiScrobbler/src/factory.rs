//! Construction des sources et clients à partir des blocs de configuration

use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use scrobconfig::EntityBlock;
use scrobconfig::secrets::reveal_secret;
use scrobcore::{Client, EntityType, Source};
use scroblastfm::{LastfmClient, LastfmSource};
use scrobmaloja::MalojaClient;
use scrobspotify::SpotifySource;

fn entity_type(block: &EntityBlock) -> Result<EntityType> {
    block.kind.parse().map_err(|e: String| anyhow!(e))
}

pub fn build_source(block: &EntityBlock, base_url: &str) -> Result<Arc<dyn Source>> {
    let kind = entity_type(block)?;
    let source: Arc<dyn Source> = match kind {
        EntityType::Spotify => Arc::new(SpotifySource::from_block(block, base_url, reveal_secret)?),
        EntityType::Lastfm => Arc::new(LastfmSource::from_block(block, base_url, reveal_secret)?),
        EntityType::Tautulli | EntityType::Plex | EntityType::Jellyfin => {
            scrobwebhooks::build_source(kind, block)?
        }
        EntityType::Maloja => bail!("{} cannot be used as a source", kind),
    };
    Ok(source)
}

pub fn build_client(block: &EntityBlock, base_url: &str) -> Result<Arc<dyn Client>> {
    let kind = entity_type(block)?;
    let client: Arc<dyn Client> = match kind {
        EntityType::Lastfm => Arc::new(LastfmClient::from_block(block, base_url, reveal_secret)?),
        EntityType::Maloja => Arc::new(MalojaClient::from_block(block, reveal_secret)?),
        _ => bail!("{} cannot be used as a client", kind),
    };
    Ok(client)
}

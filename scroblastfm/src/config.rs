use scrobconfig::EntityBlock;
use serde::Deserialize;

use crate::api::LastfmApi;

/// `data` of a lastfm block, keys lowercased by the config loader
#[derive(Debug, Clone, Deserialize)]
pub struct LastfmData {
    #[serde(rename = "apikey", alias = "apiKey")]
    pub api_key: String,
    pub secret: String,
    #[serde(default, rename = "redirecturi", alias = "redirectUri")]
    pub redirect_uri: Option<String>,
    /// Session key from an earlier authorization
    #[serde(default)]
    pub session: Option<String>,
    /// Seconds between two polls, sources only
    #[serde(default)]
    pub interval: Option<u64>,
}

impl LastfmData {
    pub fn from_block(block: &EntityBlock) -> anyhow::Result<Self> {
        block.parse_data()
    }

    /// `secret` turns possibly encrypted values into plain text
    pub fn build_api<F>(&self, base_url: &str, secret: F) -> anyhow::Result<LastfmApi>
    where
        F: Fn(&str) -> anyhow::Result<String>,
    {
        let redirect_uri = self
            .redirect_uri
            .clone()
            .unwrap_or_else(|| format!("{}/lastfm/callback", base_url));
        let mut api = LastfmApi::new(secret(&self.api_key)?, secret(&self.secret)?, redirect_uri)?;
        if let Some(session) = self.session.as_deref().filter(|s| !s.is_empty()) {
            api = api.with_session_key(secret(session)?);
        }
        Ok(api)
    }
}

//! Accès HTTP aux comptes et à l'API web Spotify

use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Result, SpotifyError};

pub const ACCOUNTS_BASE_URL: &str = "https://accounts.spotify.com";
pub const API_BASE_URL: &str = "https://api.spotify.com/v1";

const SCOPES: &str = "user-read-recently-played user-read-currently-playing";

#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
struct Tokens {
    access: String,
    refresh: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SpotifyArtist {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SpotifyAlbum {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExternalUrls {
    pub spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SpotifyTrack {
    pub name: String,
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub artists: Vec<SpotifyArtist>,
    pub album: Option<SpotifyAlbum>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
pub struct PlayHistoryItem {
    pub played_at: DateTime<Utc>,
    pub track: SpotifyTrack,
}

#[derive(Debug, Deserialize)]
struct RecentlyPlayed {
    #[serde(default)]
    items: Vec<PlayHistoryItem>,
}

/// Client bas-niveau : flux "authorization code" et historique d'écoute
///
/// Les tokens ne vivent qu'en mémoire ; après un redémarrage l'utilisateur
/// repasse par l'autorisation.
#[derive(Debug)]
pub struct SpotifyApi {
    client: Client,
    accounts_base: String,
    api_base: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    tokens: RwLock<Option<Tokens>>,
}

impl SpotifyApi {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            accounts_base: ACCOUNTS_BASE_URL.to_string(),
            api_base: API_BASE_URL.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            tokens: RwLock::new(None),
        })
    }

    /// Remplace les URLs de base (tests)
    pub fn with_base_urls(mut self, accounts: impl Into<String>, api: impl Into<String>) -> Self {
        self.accounts_base = accounts.into().trim_end_matches('/').to_string();
        self.api_base = api.into().trim_end_matches('/').to_string();
        self
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub async fn has_token(&self) -> bool {
        self.tokens.read().await.is_some()
    }

    /// URL d'autorisation vers laquelle l'utilisateur est redirigé
    pub fn authorize_url(&self, state: &str) -> Result<String> {
        let url = Url::parse_with_params(
            &format!("{}/authorize", self.accounts_base),
            &[
                ("client_id", self.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", SCOPES),
                ("state", state),
            ],
        )?;
        Ok(url.into())
    }

    /// Échange le code reçu sur le callback contre un couple de tokens
    pub async fn exchange_code(&self, code: &str) -> Result<()> {
        let response: TokenResponse = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .await?;
        info!("Spotify access token obtained");
        *self.tokens.write().await = Some(Tokens {
            access: response.access_token,
            refresh: response.refresh_token,
        });
        Ok(())
    }

    /// Renouvelle le token d'accès ; Spotify ne renvoie pas toujours de nouveau refresh token
    pub async fn refresh(&self) -> Result<()> {
        let refresh = self
            .tokens
            .read()
            .await
            .as_ref()
            .and_then(|t| t.refresh.clone())
            .ok_or(SpotifyError::NotAuthorized)?;

        let response: TokenResponse = self
            .token_request(&[("grant_type", "refresh_token"), ("refresh_token", &refresh)])
            .await?;
        debug!("Spotify access token refreshed");
        *self.tokens.write().await = Some(Tokens {
            access: response.access_token,
            refresh: response.refresh_token.or(Some(refresh)),
        });
        Ok(())
    }

    /// Historique d'écoute, du plus récent au plus ancien
    ///
    /// Un 401 déclenche un seul renouvellement du token puis un nouvel essai.
    pub async fn recently_played(&self, limit: usize) -> Result<Vec<PlayHistoryItem>> {
        let limit = limit.clamp(1, 50).to_string();
        let query = [("limit", limit.as_str())];

        let page: RecentlyPlayed = match self.get("/me/player/recently-played", &query).await {
            Err(e) if e.is_unauthorized() => {
                warn!("Spotify access token rejected, refreshing it");
                self.refresh().await?;
                self.get("/me/player/recently-played", &query).await?
            }
            other => other?,
        };
        Ok(page.items)
    }

    async fn token_request<T: DeserializeOwned>(&self, form: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/api/token", self.accounts_base);
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<T> {
        let access = self
            .tokens
            .read()
            .await
            .as_ref()
            .map(|t| t.access.clone())
            .ok_or(SpotifyError::NotAuthorized)?;

        let url = format!("{}{}", self.api_base, endpoint);
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(access)
            .query(query)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpotifyError::from_status_code(status.as_u16(), body));
        }
        Ok(response.json().await?)
    }
}

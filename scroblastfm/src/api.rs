//! Accès HTTP à l'API Last.fm (ws.audioscrobbler.com)

use chrono::{DateTime, Utc};
use reqwest::Client;
use scrobcore::PlayEvent;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{LastfmError, Result};
use crate::signing::api_signature;

pub const API_BASE_URL: &str = "https://ws.audioscrobbler.com/2.0/";
pub const AUTH_BASE_URL: &str = "https://www.last.fm/api/auth/";

#[derive(Debug, Clone)]
pub struct Session {
    pub user: String,
    pub key: String,
}

#[derive(Debug, Deserialize)]
struct SessionEnvelope {
    session: SessionBody,
}

#[derive(Debug, Deserialize)]
struct SessionBody {
    name: String,
    key: String,
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    user: UserBody,
}

#[derive(Debug, Deserialize)]
struct UserBody {
    name: String,
}

/// `{"#text": "..."}`
#[derive(Debug, Default, Deserialize)]
struct Text {
    #[serde(rename = "#text", default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct PlayedDate {
    uts: String,
}

#[derive(Debug, Default, Deserialize)]
struct TrackAttr {
    nowplaying: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecentTrack {
    name: String,
    #[serde(default)]
    artist: Text,
    #[serde(default)]
    album: Text,
    date: Option<PlayedDate>,
    url: Option<String>,
    #[serde(rename = "@attr", default)]
    attr: TrackAttr,
}

impl RecentTrack {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn artist(&self) -> &str {
        &self.artist.text
    }

    pub fn album(&self) -> Option<&str> {
        Some(self.album.text.as_str()).filter(|a| !a.is_empty())
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn is_now_playing(&self) -> bool {
        self.attr.nowplaying.as_deref() == Some("true")
    }

    pub fn played_at(&self) -> Option<DateTime<Utc>> {
        let secs = self.date.as_ref()?.uts.parse().ok()?;
        DateTime::from_timestamp(secs, 0)
    }
}

/// Last.fm renvoie un objet seul quand la liste n'a qu'un élément
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(value: OneOrMany<T>) -> Self {
        match value {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecentEnvelope {
    recenttracks: RecentBody,
}

#[derive(Debug, Deserialize)]
struct RecentBody {
    track: Option<OneOrMany<RecentTrack>>,
}

#[derive(Debug, Deserialize)]
struct ScrobbleEnvelope {
    scrobbles: ScrobbleBody,
}

#[derive(Debug, Deserialize)]
struct ScrobbleBody {
    #[serde(rename = "@attr")]
    attr: ScrobbleCounts,
}

#[derive(Debug, Deserialize)]
struct ScrobbleCounts {
    accepted: Value,
    ignored: Value,
}

fn count(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

/// Client bas-niveau Last.fm, partagé par la source et le client
#[derive(Debug)]
pub struct LastfmApi {
    client: Client,
    api_base: String,
    auth_base: String,
    api_key: String,
    secret: String,
    redirect_uri: String,
    session: RwLock<Option<Session>>,
}

impl LastfmApi {
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            api_base: API_BASE_URL.to_string(),
            auth_base: AUTH_BASE_URL.to_string(),
            api_key: api_key.into(),
            secret: secret.into(),
            redirect_uri: redirect_uri.into(),
            session: RwLock::new(None),
        })
    }

    /// Remplace les URLs de base (tests)
    pub fn with_base_urls(mut self, api: impl Into<String>, auth: impl Into<String>) -> Self {
        self.api_base = api.into();
        self.auth_base = auth.into();
        self
    }

    /// Session key déjà connue (configuration)
    pub fn with_session_key(self, key: impl Into<String>) -> Self {
        self.set_session(Session {
            user: String::new(),
            key: key.into(),
        });
        self
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_session(&self, session: Session) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    fn session_key(&self) -> Result<String> {
        self.session().map(|s| s.key).ok_or(LastfmError::NoSession)
    }

    /// Page d'autorisation ; Last.fm rappelle `cb` en y ajoutant `token`
    pub fn auth_url(&self, state: &str) -> Result<String> {
        let mut callback = Url::parse(&self.redirect_uri)?;
        callback.query_pairs_mut().append_pair("state", state);
        let url = Url::parse_with_params(
            &self.auth_base,
            &[("api_key", self.api_key.as_str()), ("cb", callback.as_str())],
        )?;
        Ok(url.into())
    }

    /// Échange le token du callback contre une session (auth.getSession)
    pub async fn get_session(&self, token: &str) -> Result<Session> {
        let envelope: SessionEnvelope = self
            .call(false, &[("method", "auth.getSession"), ("token", token)])
            .await?;
        let session = Session {
            user: envelope.session.name,
            key: envelope.session.key,
        };
        info!("Last.fm session obtained for {}", session.user);
        self.set_session(session.clone());
        Ok(session)
    }

    /// Vérifie la session et renvoie le nom de l'utilisateur (user.getInfo)
    pub async fn user_info(&self) -> Result<String> {
        let key = self.session_key()?;
        let envelope: UserEnvelope = self
            .call(false, &[("method", "user.getInfo"), ("sk", &key)])
            .await?;
        let user = envelope.user.name;
        self.set_session(Session {
            user: user.clone(),
            key,
        });
        Ok(user)
    }

    /// Dernières écoutes de l'utilisateur de la session (user.getRecentTracks)
    pub async fn recent_tracks(&self, limit: usize) -> Result<Vec<RecentTrack>> {
        let session = self.session().ok_or(LastfmError::NoSession)?;
        let limit = limit.clamp(1, 200).to_string();
        let envelope: RecentEnvelope = self
            .call(
                false,
                &[
                    ("method", "user.getRecentTracks"),
                    ("user", &session.user),
                    ("limit", &limit),
                    ("sk", &session.key),
                ],
            )
            .await?;
        Ok(envelope.recenttracks.track.map(Vec::from).unwrap_or_default())
    }

    /// Envoie une écoute (track.scrobble)
    pub async fn scrobble(&self, play: &PlayEvent) -> Result<()> {
        let key = self.session_key()?;
        let timestamp = play.playback_timestamp.timestamp().to_string();
        let artist = play.artists.join(", ");
        let duration = play.duration_seconds.map(|d| (d.round() as u64).to_string());

        let mut params = vec![
            ("method", "track.scrobble"),
            ("artist", artist.as_str()),
            ("track", play.track.as_str()),
            ("timestamp", timestamp.as_str()),
            ("sk", key.as_str()),
        ];
        if let Some(album) = play.album.as_deref() {
            params.push(("album", album));
        }
        if let Some(duration) = duration.as_deref() {
            params.push(("duration", duration));
        }

        let envelope: ScrobbleEnvelope = self.call(true, &params).await?;
        let accepted = count(&envelope.scrobbles.attr.accepted);
        if accepted == 0 || count(&envelope.scrobbles.attr.ignored) > 0 {
            return Err(LastfmError::Ignored(play.summary()));
        }
        Ok(())
    }

    /// Appel signé ; `post` pour les méthodes d'écriture
    async fn call<T: DeserializeOwned>(&self, post: bool, params: &[(&str, &str)]) -> Result<T> {
        let mut all: Vec<(&str, &str)> = params.to_vec();
        all.push(("api_key", self.api_key.as_str()));
        let signature = api_signature(&all, &self.secret);
        all.push(("api_sig", signature.as_str()));
        all.push(("format", "json"));

        debug!(
            "{} {} {}",
            if post { "POST" } else { "GET" },
            self.api_base,
            params.first().map(|p| p.1).unwrap_or_default()
        );
        let request = if post {
            self.client.post(&self.api_base).form(&all)
        } else {
            self.client.get(&self.api_base).query(&all)
        };
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        // Les erreurs Last.fm arrivent avec un code HTTP 200 ou 4xx
        let json: Value = match serde_json::from_str(&text) {
            Ok(json) => json,
            Err(_) if !status.is_success() => {
                warn!("Last.fm error ({}): {}", status, text);
                return Err(LastfmError::Api {
                    code: u32::from(status.as_u16()),
                    message: text,
                });
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(code) = json.get("error").and_then(Value::as_u64) {
            let message = json
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error")
                .to_string();
            warn!("Last.fm API error {}: {}", code, message);
            return Err(LastfmError::Api {
                code: code as u32,
                message,
            });
        }
        Ok(serde_json::from_value(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn query_map(url: &Url) -> HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    #[test]
    fn test_auth_url() {
        let api = LastfmApi::new("key", "secret", "http://localhost:9078/lastfm/callback").unwrap();
        let url = Url::parse(&api.auth_url("lastfm:fm").unwrap()).unwrap();

        assert_eq!(url.host_str(), Some("www.last.fm"));
        let params = query_map(&url);
        assert_eq!(params["api_key"], "key");

        let callback = Url::parse(&params["cb"]).unwrap();
        assert_eq!(callback.path(), "/lastfm/callback");
        assert_eq!(query_map(&callback)["state"], "lastfm:fm");
    }

    #[test]
    fn test_auth_url_state_round_trips() {
        let api = LastfmApi::new("key", "secret", "http://localhost:9078/lastfm/callback?v=2").unwrap();
        let url = Url::parse(&api.auth_url("lastfm:Home & Away #1").unwrap()).unwrap();

        let callback = Url::parse(&query_map(&url)["cb"]).unwrap();
        let params = query_map(&callback);
        assert_eq!(params["v"], "2");
        assert_eq!(params["state"], "lastfm:Home & Away #1");
        assert_eq!(callback.query_pairs().count(), 2);
    }

    #[test]
    fn test_recent_track_accessors() {
        let track: RecentTrack = serde_json::from_value(serde_json::json!({
            "name": "Glory Box",
            "artist": {"#text": "Portishead"},
            "album": {"#text": ""},
            "date": {"uts": "1700000000"},
            "@attr": {"nowplaying": "true"}
        }))
        .unwrap();

        assert_eq!(track.artist(), "Portishead");
        assert_eq!(track.album(), None);
        assert!(track.is_now_playing());
        assert_eq!(track.played_at().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_one_or_many() {
        let body: RecentBody =
            serde_json::from_value(serde_json::json!({"track": {"name": "Roads"}})).unwrap();
        assert_eq!(body.track.map(Vec::from).unwrap().len(), 1);
    }
}

//! Canonical play record and entity kinds

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a source or client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Spotify,
    Lastfm,
    Tautulli,
    Plex,
    Jellyfin,
    Maloja,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Spotify => "spotify",
            EntityType::Lastfm => "lastfm",
            EntityType::Tautulli => "tautulli",
            EntityType::Plex => "plex",
            EntityType::Jellyfin => "jellyfin",
            EntityType::Maloja => "maloja",
        }
    }

    /// Human label used by the dashboard
    pub fn display(&self) -> &'static str {
        match self {
            EntityType::Spotify => "Spotify",
            EntityType::Lastfm => "Lastfm",
            EntityType::Tautulli => "Tautulli",
            EntityType::Plex => "Plex",
            EntityType::Jellyfin => "Jellyfin",
            EntityType::Maloja => "Maloja",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spotify" => Ok(EntityType::Spotify),
            "lastfm" => Ok(EntityType::Lastfm),
            "tautulli" => Ok(EntityType::Tautulli),
            "plex" => Ok(EntityType::Plex),
            "jellyfin" => Ok(EntityType::Jellyfin),
            "maloja" => Ok(EntityType::Maloja),
            other => Err(format!("unknown type '{}'", other)),
        }
    }
}

/// Which registry an entity lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Source,
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Source => f.write_str("source"),
            Role::Client => f.write_str("client"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayMeta {
    pub web_url: Option<String>,
    /// Account that played the track, when the source reports one
    pub user: Option<String>,
    /// Media server that reported the play
    pub server: Option<String>,
}

/// A normalized "track played" record
///
/// Built once per accepted webhook or poll result and never modified; the
/// origin is set by [`PlayEvent::stamped`], which returns a new record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayEvent {
    pub artists: Vec<String>,
    pub track: String,
    pub album: Option<String>,
    pub duration_seconds: Option<f64>,
    pub playback_timestamp: DateTime<Utc>,
    pub meta: PlayMeta,
    pub origin_source_name: String,
    pub origin_source_type: EntityType,
}

impl PlayEvent {
    pub fn new(
        origin_source_type: EntityType,
        artists: Vec<String>,
        track: impl Into<String>,
        playback_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            artists,
            track: track.into(),
            album: None,
            duration_seconds: None,
            playback_timestamp,
            meta: PlayMeta::default(),
            origin_source_name: String::new(),
            origin_source_type,
        }
    }

    pub fn with_album(mut self, album: Option<String>) -> Self {
        self.album = album.filter(|a| !a.is_empty());
        self
    }

    pub fn with_duration(mut self, seconds: Option<f64>) -> Self {
        self.duration_seconds = seconds;
        self
    }

    pub fn with_meta(mut self, meta: PlayMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Copy of this play attributed to the named source
    pub fn stamped(&self, name: &str, kind: EntityType) -> Self {
        Self {
            origin_source_name: name.to_string(),
            origin_source_type: kind,
            ..self.clone()
        }
    }

    /// `Artist A / Artist B - Track`, used in log lines
    pub fn summary(&self) -> String {
        if self.artists.is_empty() {
            self.track.clone()
        } else {
            format!("{} - {}", self.artists.join(" / "), self.track)
        }
    }

    /// Identity used to recognize the same play reported twice
    pub fn identity(&self) -> String {
        format!(
            "{}|{}|{}",
            self.artists.join("/").to_lowercase(),
            self.track.to_lowercase(),
            self.playback_timestamp.timestamp()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn play() -> PlayEvent {
        PlayEvent::new(
            EntityType::Plex,
            vec!["Boards of Canada".into(), "Guest".into()],
            "Roygbiv",
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_entity_type_parse_and_display() {
        assert_eq!("Spotify".parse::<EntityType>().unwrap(), EntityType::Spotify);
        assert_eq!(EntityType::Lastfm.to_string(), "lastfm");
        assert!("winamp".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_stamped_keeps_original() {
        let original = play();
        let stamped = original.stamped("living-room", EntityType::Plex);
        assert_eq!(stamped.origin_source_name, "living-room");
        assert!(original.origin_source_name.is_empty());
        assert_eq!(stamped.track, original.track);
    }

    #[test]
    fn test_summary_and_identity() {
        let p = play();
        assert_eq!(p.summary(), "Boards of Canada / Guest - Roygbiv");
        let mut other = play().stamped("x", EntityType::Plex);
        other.track = "ROYGBIV".into();
        assert_eq!(p.identity(), other.identity());
    }

    #[test]
    fn test_empty_album_is_dropped() {
        let p = play().with_album(Some(String::new()));
        assert!(p.album.is_none());
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(play()).unwrap();
        assert_eq!(json["originSourceType"], "plex");
        assert!(json.get("playbackTimestamp").is_some());
    }
}

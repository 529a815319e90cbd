//! Payload formatters: one webhook body in, one [`PlayEvent`] out

use chrono::{DateTime, NaiveDateTime, Utc};
use scrobcore::{EntityType, PayloadError, PlayEvent, PlayMeta};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Accepts numbers and numeric strings
fn number_or_string<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn required(value: Option<String>, field: &'static str) -> Result<String, PayloadError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(PayloadError::Missing(field))
}

fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| {
        DateTime::parse_from_rfc3339(s)
            .map(|d| d.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                    .map(|d| d.and_utc())
                    .ok()
            })
    })
    .unwrap_or_else(Utc::now)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TautulliPayload {
    artist: Option<String>,
    track: Option<String>,
    album: Option<String>,
    #[serde(default, deserialize_with = "number_or_string")]
    duration: Option<f64>,
    play_date: Option<String>,
    username: Option<String>,
    server: Option<String>,
}

/// Tautulli "playback stop" notification, as configured in its JSON webhook agent
pub fn tautulli_play(body: &Value) -> Result<PlayEvent, PayloadError> {
    let payload = TautulliPayload::deserialize(body)?;
    let artist = required(payload.artist, "artist")?;
    let track = required(payload.track, "track")?;

    Ok(
        PlayEvent::new(
            EntityType::Tautulli,
            vec![artist],
            track,
            parse_timestamp(payload.play_date.as_deref()),
        )
        .with_album(payload.album)
        .with_duration(payload.duration)
        .with_meta(PlayMeta {
            user: payload.username,
            server: payload.server,
            ..Default::default()
        }),
    )
}

#[derive(Debug, Deserialize)]
struct PlexTitled {
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlexMetadata {
    #[serde(rename = "type")]
    kind: Option<String>,
    title: Option<String>,
    parent_title: Option<String>,
    grandparent_title: Option<String>,
    original_title: Option<String>,
    #[serde(default, deserialize_with = "number_or_string")]
    duration: Option<f64>,
    last_viewed_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PlexPayload {
    event: Option<String>,
    #[serde(rename = "Account")]
    account: Option<PlexTitled>,
    #[serde(rename = "Server")]
    server: Option<PlexTitled>,
    #[serde(rename = "Metadata")]
    metadata: Option<PlexMetadata>,
}

/// Plex Media Server webhook `payload` field
///
/// Only `media.scrobble` events on tracks describe a play.
pub fn plex_play(body: &Value) -> Result<PlayEvent, PayloadError> {
    let payload = PlexPayload::deserialize(body)?;

    let event = payload.event.unwrap_or_default();
    if event != "media.scrobble" {
        return Err(PayloadError::Ignored(format!("plex event '{}'", event)));
    }
    let metadata = payload.metadata.ok_or(PayloadError::Missing("Metadata"))?;
    if metadata.kind.as_deref() != Some("track") {
        return Err(PayloadError::Ignored(format!(
            "plex media type '{}'",
            metadata.kind.unwrap_or_default()
        )));
    }

    // Track artist when set, album artist otherwise
    let artist = required(
        metadata.original_title.or(metadata.grandparent_title),
        "grandparentTitle",
    )?;
    let track = required(metadata.title, "title")?;
    let played_at = metadata
        .last_viewed_at
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);

    Ok(PlayEvent::new(EntityType::Plex, vec![artist], track, played_at)
        .with_album(metadata.parent_title)
        .with_duration(metadata.duration.map(|ms| ms / 1000.0))
        .with_meta(PlayMeta {
            user: payload.account.and_then(|a| a.title),
            server: payload.server.and_then(|s| s.title),
            ..Default::default()
        }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct JellyfinPayload {
    notification_type: Option<String>,
    item_type: Option<String>,
    name: Option<String>,
    artist: Option<String>,
    album: Option<String>,
    #[serde(default, deserialize_with = "number_or_string")]
    run_time_ticks: Option<f64>,
    utc_timestamp: Option<String>,
    notification_username: Option<String>,
    server_name: Option<String>,
    played_to_completion: Option<bool>,
}

const JELLYFIN_TICKS_PER_SECOND: f64 = 10_000_000.0;

/// Jellyfin webhook plugin notification
///
/// Only `PlaybackStop` on `Audio` items is a play; an explicit
/// `PlayedToCompletion: false` means the track was skipped.
pub fn jellyfin_play(body: &Value) -> Result<PlayEvent, PayloadError> {
    let payload = JellyfinPayload::deserialize(body)?;

    let notification = payload.notification_type.unwrap_or_default();
    if notification != "PlaybackStop" {
        return Err(PayloadError::Ignored(format!(
            "jellyfin notification '{}'",
            notification
        )));
    }
    if payload.item_type.as_deref() != Some("Audio") {
        return Err(PayloadError::Ignored(format!(
            "jellyfin item type '{}'",
            payload.item_type.unwrap_or_default()
        )));
    }
    if payload.played_to_completion == Some(false) {
        return Err(PayloadError::Ignored("jellyfin track not played to completion".into()));
    }

    let artist = required(payload.artist, "Artist")?;
    let track = required(payload.name, "Name")?;

    Ok(PlayEvent::new(
        EntityType::Jellyfin,
        vec![artist],
        track,
        parse_timestamp(payload.utc_timestamp.as_deref()),
    )
    .with_album(payload.album)
    .with_duration(payload.run_time_ticks.map(|t| t / JELLYFIN_TICKS_PER_SECOND))
    .with_meta(PlayMeta {
        user: payload.notification_username,
        server: payload.server_name,
        ..Default::default()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_tautulli() {
        let play = tautulli_play(&json!({
            "artist": "Slowdive",
            "track": "Alison",
            "album": "Souvlaki",
            "duration": "230",
            "playDate": "2024-03-02 10:11:12",
            "username": "alice",
            "scrobblerConfig": "main"
        }))
        .unwrap();

        assert_eq!(play.artists, vec!["Slowdive"]);
        assert_eq!(play.track, "Alison");
        assert_eq!(play.album.as_deref(), Some("Souvlaki"));
        assert_eq!(play.duration_seconds, Some(230.0));
        assert_eq!(
            play.playback_timestamp,
            Utc.with_ymd_and_hms(2024, 3, 2, 10, 11, 12).unwrap()
        );
        assert_eq!(play.meta.user.as_deref(), Some("alice"));
        assert_eq!(play.origin_source_type, EntityType::Tautulli);
    }

    #[test]
    fn test_tautulli_missing_track() {
        let err = tautulli_play(&json!({"artist": "Slowdive", "track": "  "})).unwrap_err();
        assert!(matches!(err, PayloadError::Missing("track")));
    }

    #[test]
    fn test_plex_scrobble() {
        let play = plex_play(&json!({
            "event": "media.scrobble",
            "Account": {"title": "bob"},
            "Server": {"title": "nas"},
            "Metadata": {
                "type": "track",
                "title": "Windowlicker",
                "parentTitle": "Windowlicker EP",
                "grandparentTitle": "Aphex Twin",
                "duration": 367000,
                "lastViewedAt": 1700000000
            }
        }))
        .unwrap();

        assert_eq!(play.artists, vec!["Aphex Twin"]);
        assert_eq!(play.album.as_deref(), Some("Windowlicker EP"));
        assert_eq!(play.duration_seconds, Some(367.0));
        assert_eq!(play.playback_timestamp.timestamp(), 1_700_000_000);
        assert_eq!(play.meta.user.as_deref(), Some("bob"));
        assert_eq!(play.meta.server.as_deref(), Some("nas"));
    }

    #[test]
    fn test_plex_other_events_are_ignored() {
        let err = plex_play(&json!({"event": "media.play", "Metadata": {"type": "track"}}))
            .unwrap_err();
        assert!(matches!(err, PayloadError::Ignored(_)));

        let err = plex_play(&json!({"event": "media.scrobble", "Metadata": {"type": "episode"}}))
            .unwrap_err();
        assert!(matches!(err, PayloadError::Ignored(_)));
    }

    #[test]
    fn test_jellyfin() {
        let play = jellyfin_play(&json!({
            "NotificationType": "PlaybackStop",
            "ItemType": "Audio",
            "Name": "Teardrop",
            "Artist": "Massive Attack",
            "Album": "Mezzanine",
            "RunTimeTicks": 3300000000u64,
            "UtcTimestamp": "2024-06-01T20:00:00Z",
            "NotificationUsername": "carol",
            "ServerName": "home",
            "PlayedToCompletion": true
        }))
        .unwrap();

        assert_eq!(play.track, "Teardrop");
        assert_eq!(play.duration_seconds, Some(330.0));
        assert_eq!(
            play.playback_timestamp,
            Utc.with_ymd_and_hms(2024, 6, 1, 20, 0, 0).unwrap()
        );
        assert_eq!(play.meta.server.as_deref(), Some("home"));
    }

    #[test]
    fn test_jellyfin_skipped_track() {
        let err = jellyfin_play(&json!({
            "NotificationType": "PlaybackStop",
            "ItemType": "Audio",
            "Name": "Teardrop",
            "Artist": "Massive Attack",
            "PlayedToCompletion": false
        }))
        .unwrap_err();
        assert!(matches!(err, PayloadError::Ignored(_)));

        let err = jellyfin_play(&json!({"NotificationType": "PlaybackStart", "ItemType": "Audio"}))
            .unwrap_err();
        assert!(matches!(err, PayloadError::Ignored(_)));
    }

    #[test]
    fn test_not_an_object() {
        assert!(matches!(
            tautulli_play(&json!([1, 2])).unwrap_err(),
            PayloadError::Malformed(_)
        ));
    }
}

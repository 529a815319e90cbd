use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use scrobcore::{
    Client, ClientRegistry, Dispatcher, Entity, EntityState, EntityType, PlayEvent, Registry,
    Result, Role, ScrobbleOutcome, Source, SourceRegistry,
};
use scrobwebhooks::{WebhookFilters, WebhookSource, webhook_router};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

#[derive(Debug, Default)]
struct RecordingClient {
    state: EntityState,
    tracks: Mutex<Vec<(String, String)>>,
}

impl RecordingClient {
    fn tracks(&self) -> Vec<(String, String)> {
        self.tracks.lock().unwrap().clone()
    }
}

#[async_trait]
impl Entity for RecordingClient {
    fn name(&self) -> &str {
        "recorder"
    }
    fn entity_type(&self) -> EntityType {
        EntityType::Maloja
    }
    fn state(&self) -> &EntityState {
        &self.state
    }
}

#[async_trait]
impl Client for RecordingClient {
    async fn scrobble(&self, play: &PlayEvent) -> Result<ScrobbleOutcome> {
        self.tracks
            .lock()
            .unwrap()
            .push((play.origin_source_name.clone(), play.track.clone()));
        Ok(ScrobbleOutcome::Scrobbled)
    }
}

fn setup(sources: Vec<WebhookSource>) -> (Dispatcher, Arc<RecordingClient>) {
    let client = Arc::new(RecordingClient::default());
    client.state().set_initialized(true);

    let sources: SourceRegistry = Registry::from_entries(
        Role::Source,
        sources
            .into_iter()
            .map(|s| Arc::new(s) as Arc<dyn Source>)
            .collect(),
    );
    let clients: ClientRegistry =
        Registry::from_entries(Role::Client, vec![client.clone() as Arc<dyn Client>]);
    (
        Dispatcher::new(Arc::new(sources), Arc::new(clients)),
        client,
    )
}

async fn post(dispatcher: &Dispatcher, uri: &str, content_type: &str, body: String) -> (StatusCode, String) {
    let response = webhook_router(dispatcher.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn tautulli_reaches_every_tautulli_source() {
    let (dispatcher, client) = setup(vec![
        WebhookSource::new("t1", EntityType::Tautulli, WebhookFilters::default()),
        WebhookSource::new("p1", EntityType::Plex, WebhookFilters::default()),
        WebhookSource::new("t2", EntityType::Tautulli, WebhookFilters::default()),
    ]);

    let (status, body) = post(
        &dispatcher,
        "/tautulli",
        "application/json",
        r#"{"artist": "Stereolab", "track": "French Disko", "username": "alice"}"#.into(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
    assert_eq!(
        client.tracks(),
        vec![
            ("t1".to_string(), "French Disko".to_string()),
            ("t2".to_string(), "French Disko".to_string()),
        ]
    );
}

#[tokio::test]
async fn tautulli_scrobbler_config_selects_one_source() {
    let (dispatcher, client) = setup(vec![
        WebhookSource::new("t1", EntityType::Tautulli, WebhookFilters::default()),
        WebhookSource::new("t2", EntityType::Tautulli, WebhookFilters::default()),
    ]);

    post(
        &dispatcher,
        "/tautulli",
        "application/json",
        r#"{"artist": "Stereolab", "track": "Cybele's Reverie", "scrobblerConfig": "t2"}"#.into(),
    )
    .await;

    assert_eq!(
        client.tracks(),
        vec![("t2".to_string(), "Cybele's Reverie".to_string())]
    );
}

#[tokio::test]
async fn malformed_bodies_are_acknowledged() {
    let (dispatcher, client) = setup(vec![WebhookSource::new(
        "j1",
        EntityType::Jellyfin,
        WebhookFilters::default(),
    )]);

    let (status, body) = post(&dispatcher, "/jellyfin", "text/plain", "{not json".into()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    let (status, _) = post(&dispatcher, "/plex", "application/json", "{}".into()).await;
    assert_eq!(status, StatusCode::OK);

    assert!(client.tracks().is_empty());
}

#[tokio::test]
async fn jellyfin_accepts_any_content_type() {
    let (dispatcher, client) = setup(vec![WebhookSource::new(
        "j1",
        EntityType::Jellyfin,
        WebhookFilters::default(),
    )]);

    post(
        &dispatcher,
        "/jellyfin",
        "text/plain",
        r#"{"NotificationType": "PlaybackStop", "ItemType": "Audio", "Name": "Roygbiv", "Artist": "Boards of Canada"}"#.into(),
    )
    .await;

    assert_eq!(client.tracks(), vec![("j1".to_string(), "Roygbiv".to_string())]);
}

#[tokio::test]
async fn plex_reads_the_payload_field() {
    let (dispatcher, client) = setup(vec![WebhookSource::new(
        "p1",
        EntityType::Plex,
        WebhookFilters {
            users: vec!["bob".into()],
            ..Default::default()
        },
    )]);

    let payload = r#"{"event": "media.scrobble", "Account": {"title": "bob"}, "Metadata": {"type": "track", "title": "Avril 14th", "grandparentTitle": "Aphex Twin"}}"#;
    let boundary = "XXBOUNDARYXX";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"payload\"\r\n\r\n{p}\r\n--{b}--\r\n",
        b = boundary,
        p = payload
    );

    let (status, body) = post(
        &dispatcher,
        "/plex",
        &format!("multipart/form-data; boundary={}", boundary),
        body,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
    assert_eq!(client.tracks(), vec![("p1".to_string(), "Avril 14th".to_string())]);
}

//! # Module Server
//!
//! Thin wrapper around an axum [`Router`] that the rest of the application
//! extends with its own routes before the listener is opened.

use crate::logs::{LiveLog, create_logs_router};
use axum::Router;
use scrobconfig::Config;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{signal, sync::RwLock, task::JoinHandle};
use tracing::{info, warn};

/// Info serveur sérialisable
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub base_url: String,
    pub http_port: u16,
}

/// Serveur principal
pub struct Server {
    name: String,
    base_url: String,
    http_port: u16,
    router: Arc<RwLock<Router>>,
    join_handle: Option<JoinHandle<()>>,
    live_log: Option<LiveLog>,
}

impl Server {
    /// Crée une nouvelle instance de serveur
    ///
    /// # Arguments
    ///
    /// * `name` - Nom du serveur (pour les logs)
    /// * `base_url` - URL publique (ex: "http://localhost:9078")
    /// * `http_port` - Port HTTP à écouter
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            http_port,
            router: Arc::new(RwLock::new(Router::new())),
            join_handle: None,
            live_log: None,
        }
    }

    pub fn new_configured(config: &Config) -> Self {
        Self::new(
            "MultiScrobbler",
            config.get_base_url(),
            config.get_http_port(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn live_log(&self) -> Option<&LiveLog> {
        self.live_log.as_ref()
    }

    /// Ajoute un sous-router au serveur
    ///
    /// - Si `path` est "/", merge directement au router principal
    /// - Sinon, nest le router sous le chemin donné
    pub async fn add_router(&mut self, path: &str, sub_router: Router) {
        let mut r = self.router.write().await;

        let combined = if path == "/" {
            std::mem::take(&mut *r).merge(sub_router)
        } else {
            let normalized = format!("/{}", path.trim_start_matches('/'));
            std::mem::take(&mut *r).nest(&normalized, sub_router)
        };

        *r = combined;
    }

    /// Registers the live log routes under `/logs`
    pub async fn add_live_log(&mut self, live: LiveLog) {
        self.add_router("/logs", create_logs_router(live.clone()))
            .await;
        self.live_log = Some(live);
    }

    /// Snapshot of the routes registered so far
    pub async fn router(&self) -> Router {
        self.router.read().await.clone()
    }

    /// Opens the listener and serves the routes registered so far
    ///
    /// Binding happens before this returns, so a busy port is reported to the
    /// caller. Routes added afterwards are not served.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.http_port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let router = self.router().await;

        info!("Server {} started at {}", self.name, self.base_url);

        let server_task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router.into_make_service()).await {
                warn!("HTTP server stopped: {}", e);
            }
        });

        let shutdown_task = tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => info!("Ctrl+C received, shutting down"),
                Err(e) => {
                    warn!("Failed to listen for ctrl_c: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        });

        self.join_handle = Some(tokio::spawn(async move {
            tokio::select! {
                _ = server_task => {},
                _ = shutdown_task => {},
            }
        }));

        Ok(())
    }

    /// Attend la fin du serveur
    pub async fn wait(&mut self) {
        if let Some(h) = self.join_handle.take() {
            let _ = h.await;
        }
    }

    /// Récupère les infos du serveur
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            name: self.name.clone(),
            base_url: self.base_url.clone(),
            http_port: self.http_port,
        }
    }
}

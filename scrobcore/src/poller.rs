//! Start-up and on-demand polling of pollable sources

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::entity::{Readiness, Source};
use crate::registry::{ClientRegistry, SourceRegistry};
use crate::{Result, ScrobbleError};

/// Delay before each source is polled at start-up
pub const STARTUP_STAGGER: Duration = Duration::from_millis(1500);

/// Number of plays requested per fetch
pub const RECENT_LIMIT: usize = 20;

/// Outcome of [`Poller::run_startup_poll`], by source name
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StartupPollReport {
    pub started: Vec<String>,
    pub skipped: Vec<String>,
    pub not_ready: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Poller {
    sources: Arc<SourceRegistry>,
    clients: Arc<ClientRegistry>,
    stagger: Duration,
    local_url: String,
}

impl Poller {
    pub fn new(
        sources: Arc<SourceRegistry>,
        clients: Arc<ClientRegistry>,
        local_url: impl Into<String>,
    ) -> Self {
        Self {
            sources,
            clients,
            stagger: STARTUP_STAGGER,
            local_url: local_url.into(),
        }
    }

    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    /// Starts a poll loop for `source` in the background
    ///
    /// Nothing prevents two loops from running for the same source.
    pub fn poll_now(&self, source: Arc<dyn Source>) -> Result<JoinHandle<()>> {
        if !source.can_poll() {
            return Err(ScrobbleError::NotPollable(source.entity_type()));
        }
        let clients = self.clients.clone();
        Ok(tokio::spawn(poll_loop(source, clients)))
    }

    /// Polls every ready pollable source, one stagger delay before each
    ///
    /// Sources waiting for a user authorization are reported together at the end.
    pub async fn run_startup_poll(&self) -> StartupPollReport {
        let mut report = StartupPollReport::default();

        for source in self.sources.all().iter().filter(|s| s.can_poll()) {
            tokio::time::sleep(self.stagger).await;

            let readiness = match source.pollable() {
                Some(pollable) => pollable.readiness(),
                None => continue,
            };
            let name = source.name().to_string();
            match readiness {
                Readiness::Ready => match self.poll_now(source.clone()) {
                    Ok(_) => report.started.push(name),
                    Err(e) => warn!(label = source.name(), "Could not start polling: {}", e),
                },
                Readiness::Skip => {
                    debug!(label = source.name(), "Not ready, not polling at start-up");
                    report.skipped.push(name);
                }
                Readiness::NeedsInteraction => report.not_ready.push(name),
            }
        }

        if !report.not_ready.is_empty() {
            info!(
                "Some sources are not ready, open {} to continue",
                self.local_url
            );
        }
        report
    }
}

/// Fetches recent plays every interval and handles those newer than the last one seen
///
/// Plays from before the loop started are not relayed. The loop ends on the
/// first fetch error.
async fn poll_loop(source: Arc<dyn Source>, clients: Arc<ClientRegistry>) {
    let Some(pollable) = source.pollable() else {
        return;
    };
    let state = source.state();
    let interval = pollable.poll_interval();

    state.begin_poll();
    info!(
        label = source.name(),
        "Polling started, checking every {}s",
        interval.as_secs()
    );

    let mut cursor = Utc::now();
    loop {
        match pollable.recently_played(RECENT_LIMIT).await {
            Ok(mut plays) => {
                plays.sort_by_key(|p| p.playback_timestamp);
                let fresh: Vec<_> = plays
                    .into_iter()
                    .filter(|p| p.playback_timestamp > cursor)
                    .collect();
                debug!(label = source.name(), "{} new play(s)", fresh.len());

                for play in fresh {
                    cursor = play.playback_timestamp;
                    let stamped = play.stamped(source.name(), source.entity_type());
                    if let Err(e) = source.handle(stamped, &clients).await {
                        warn!(label = source.name(), "Failed to handle {}: {}", play.summary(), e);
                    }
                }
            }
            Err(e) => {
                error!(label = source.name(), "Error occurred while polling: {}", e);
                break;
            }
        }
        tokio::time::sleep(interval).await;
    }

    state.end_poll();
    info!(label = source.name(), "Polling stopped");
}

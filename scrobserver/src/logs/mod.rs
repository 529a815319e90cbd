// logs/mod.rs
mod layer;

pub use layer::LiveLogLayer;

use std::{
    collections::VecDeque,
    env,
    fmt,
    path::PathBuf,
    str::FromStr,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use axum::{
    Router,
    extract::{Query, State},
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use serde::{Deserialize, Serialize};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{Level, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    Registry, filter::LevelFilter, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

/// Number of formatted lines kept in memory
pub const LOG_BUFFER_CAPACITY: usize = 101;

/// Period of the unconditional view push
pub const LOG_PUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Values accepted for the `limit` setting
pub const LIMIT_CHOICES: [usize; 4] = [10, 20, 50, 100];

/// Minimum level selectable at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Debug,
}

impl LogLevel {
    pub const AVAILABLE: [LogLevel; 2] = [LogLevel::Info, LogLevel::Debug];

    fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ascending" => Ok(SortOrder::Ascending),
            "descending" => Ok(SortOrder::Descending),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

/// Global view settings, shared by every viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogSettings {
    pub limit: usize,
    pub sort: SortOrder,
    pub level: LogLevel,
}

impl LogSettings {
    pub fn with_level(level: LogLevel) -> Self {
        Self {
            limit: 50,
            sort: SortOrder::Descending,
            level,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self::with_level(LogLevel::Info)
    }
}

/// One formatted log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    /// Severity word (`error`, `warn`, `info`, `debug`, `trace`)
    pub level: &'static str,
    /// CSS classes used by the dashboard to color the severity
    pub hint: &'static str,
    pub text: String,
}

impl LogLine {
    pub fn new(level: Level, text: impl Into<String>) -> Self {
        let (word, hint) = match level {
            Level::ERROR => ("error", "error text-red-400"),
            Level::WARN => ("warn", "warn text-blue-400"),
            Level::INFO => ("info", "info text-yellow-500"),
            Level::DEBUG => ("debug", "debug text-pink-400"),
            Level::TRACE => ("trace", "debug text-pink-400"),
        };
        Self {
            level: word,
            hint,
            text: text.into(),
        }
    }
}

/// Partial settings update, as received on `/logs/settings/update`
///
/// Values are kept as strings so that a bad value only discards itself.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct LogSettingsUpdate {
    pub limit: Option<String>,
    pub sort: Option<String>,
    pub level: Option<String>,
}

/// Ring buffer of recent log lines with its runtime settings
///
/// Cloning gives another handle on the same buffer.
#[derive(Clone)]
pub struct LiveLog {
    buffer: Arc<RwLock<VecDeque<LogLine>>>,
    settings: Arc<RwLock<LogSettings>>,
    tx: broadcast::Sender<Vec<LogLine>>,
    reload_handle: Arc<RwLock<Option<reload::Handle<LevelFilter, Registry>>>>,
}

impl fmt::Debug for LiveLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveLog")
            .field("settings", &self.settings())
            .field("lines", &self.len())
            .finish()
    }
}

impl Default for LiveLog {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

impl LiveLog {
    pub fn new(level: LogLevel) -> Self {
        Self {
            buffer: Arc::new(RwLock::new(VecDeque::with_capacity(LOG_BUFFER_CAPACITY))),
            settings: Arc::new(RwLock::new(LogSettings::with_level(level))),
            tx: broadcast::channel(16).0,
            reload_handle: Arc::new(RwLock::new(None)),
        }
    }

    fn attach_reload_handle(&self, handle: reload::Handle<LevelFilter, Registry>) {
        *self
            .reload_handle
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Inserts a line at the front, dropping the oldest beyond capacity
    pub fn push(&self, line: LogLine) {
        let mut buf = self.buffer.write().unwrap_or_else(PoisonError::into_inner);
        buf.push_front(line);
        buf.truncate(LOG_BUFFER_CAPACITY);
    }

    pub fn len(&self) -> usize {
        self.buffer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All buffered lines, newest first
    pub fn lines(&self) -> Vec<LogLine> {
        self.buffer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn settings(&self) -> LogSettings {
        *self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// The visible lines: the first `limit + 1` entries, reversed when ascending
    pub fn view(&self) -> Vec<LogLine> {
        let settings = self.settings();
        let mut lines: Vec<LogLine> = self
            .buffer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .take(settings.limit + 1)
            .cloned()
            .collect();
        if settings.sort == SortOrder::Ascending {
            lines.reverse();
        }
        lines
    }

    /// Applies a partial update then pushes the new view to every viewer
    ///
    /// Invalid values are reported and leave their setting unchanged. A level
    /// change reloads the filter shared by all sinks.
    pub fn update_settings(&self, update: &LogSettingsUpdate) -> LogSettings {
        let mut rejected = Vec::new();
        let (previous, current) = {
            let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
            let previous = *settings;

            if let Some(limit) = &update.limit {
                match limit.parse::<usize>() {
                    Ok(l) if LIMIT_CHOICES.contains(&l) => settings.limit = l,
                    _ => rejected.push(format!("limit '{}'", limit)),
                }
            }
            if let Some(sort) = &update.sort {
                match sort.parse::<SortOrder>() {
                    Ok(s) => settings.sort = s,
                    Err(_) => rejected.push(format!("sort '{}'", sort)),
                }
            }
            if let Some(level) = &update.level {
                match level.parse::<LogLevel>() {
                    Ok(l) => settings.level = l,
                    Err(_) => rejected.push(format!("level '{}'", level)),
                }
            }
            (previous, *settings)
        };

        if current.level != previous.level {
            self.reload_level(current.level);
        }
        for value in rejected {
            warn!(label = "Logs", "Ignoring invalid log setting {}", value);
        }

        self.broadcast();
        current
    }

    fn reload_level(&self, level: LogLevel) {
        let handle = self
            .reload_handle
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = handle.as_ref() {
            if let Err(e) = handle.reload(level.as_filter()) {
                warn!(label = "Logs", "Failed to reload log level filter: {}", e);
            }
        }
    }

    /// Sends the current view to every subscriber
    pub fn broadcast(&self) {
        // No receiver is not an error
        let _ = self.tx.send(self.view());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Vec<LogLine>> {
        self.tx.subscribe()
    }

    /// Pushes the view every [`LOG_PUSH_INTERVAL`]
    pub fn spawn_ticker(&self) -> JoinHandle<()> {
        let live = self.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + LOG_PUSH_INTERVAL;
            let mut ticker = tokio::time::interval_at(start, LOG_PUSH_INTERVAL);
            loop {
                ticker.tick().await;
                live.broadcast();
            }
        })
    }
}

/// Handler for `GET /logs/settings/update`
pub async fn log_settings_update(
    State(live): State<LiveLog>,
    Query(update): Query<LogSettingsUpdate>,
) -> impl IntoResponse {
    live.update_settings(&update);
    "OK"
}

/// SSE handler for `GET /logs/stream`
///
/// Sends the current view on connection, then every pushed view as a `log` event.
pub async fn log_stream(State(live): State<LiveLog>) -> impl IntoResponse {
    let mut rx = live.subscribe();
    let initial = live.view();

    let stream = async_stream::stream! {
        yield Event::default().event("log").json_data(initial);

        loop {
            match rx.recv().await {
                Ok(lines) => yield Event::default().event("log").json_data(lines),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Router for the live log, meant to be nested under `/logs`
pub fn create_logs_router(live: LiveLog) -> Router {
    Router::new()
        .route("/settings/update", get(log_settings_update))
        .route("/stream", get(log_stream))
        .with_state(live)
}

/// Options d'initialisation du système de logging
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    pub level: LogLevel,
    /// Activer la sortie console
    pub enable_console: bool,
    /// Répertoire des fichiers journaliers, désactivé si `None`
    pub directory: Option<PathBuf>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            enable_console: true,
            directory: Some(PathBuf::from("logs")),
        }
    }
}

impl LoggingOptions {
    /// Reads `LOG_LEVEL`, `LOG_CONSOLE` and `LOG_DIR`
    ///
    /// Logging starts before the configuration file is read, so only the
    /// environment is consulted.
    pub fn from_env() -> Self {
        let mut options = Self::default();

        if let Ok(level) = env::var("LOG_LEVEL") {
            match level.parse() {
                Ok(l) => options.level = l,
                Err(e) => eprintln!("LOG_LEVEL: {}, using info", e),
            }
        }
        if let Ok(console) = env::var("LOG_CONSOLE") {
            options.enable_console = !matches!(console.to_lowercase().as_str(), "false" | "0" | "no");
        }
        if let Ok(dir) = env::var("LOG_DIR") {
            options.directory = (!dir.is_empty()).then(|| PathBuf::from(dir));
        }
        options
    }
}

/// Installs the global subscriber and returns the live log it feeds
///
/// The reloadable level filter sits in front of every sink: the live log,
/// the console and the daily rolling file.
pub fn init_logging(options: LoggingOptions) -> anyhow::Result<LiveLog> {
    let live = LiveLog::new(options.level);

    let (filter, reload_handle) = reload::Layer::new(options.level.as_filter());
    live.attach_reload_handle(reload_handle);

    let console = options.enable_console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(true)
    });

    let file = match &options.directory {
        Some(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("scrobble")
                .filename_suffix("log")
                .build(dir)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(appender)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    Registry::default()
        .with(filter)
        .with(LiveLogLayer::new(live.clone()))
        .with(console)
        .with(file)
        .try_init()?;

    Ok(live)
}

//! # scrobserver - HTTP shell for MultiScrobbler
//!
//! - [`server`] : the [`Server`] owning the axum router, extended by the other
//!   crates through extension traits
//! - [`logs`] : the live log ring buffer, its tracing layer and its SSE push channel
//!
//! ```rust,no_run
//! use scrobserver::{Server, logs::{LoggingOptions, init_logging}};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let live = init_logging(LoggingOptions::from_env())?;
//!     let mut server = Server::new("MultiScrobbler", "http://localhost:9078", 9078);
//!     server.add_live_log(live).await;
//!     server.start().await?;
//!     server.wait().await;
//!     Ok(())
//! }
//! ```

pub mod logs;
pub mod server;

pub use logs::{LiveLog, LogLine, LogSettings};
pub use server::{Server, ServerInfo};

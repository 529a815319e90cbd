//! # scrobcore
//!
//! Event routing, scheduling and authentication machinery of MultiScrobbler.
//!
//! - [`PlayEvent`] : the canonical record every source produces
//! - [`Registry`] : sources and clients built from the configuration
//! - [`status::project`] : dashboard status of an entity
//! - [`Dispatcher`] : hands webhook plays to the right sources
//! - [`Poller`] : start-up and on-demand polling
//! - [`AuthCorrelator`] : resumes the right pending authorization on callback
//!
//! ## Server Integration (feature `server`)
//!
//! ```rust,ignore
//! use scrobcore::{ScrobbleServerExt, ScrobbleState};
//!
//! let state = ScrobbleState::new(sources, clients, live_log, server.base_url());
//! server.init_scrobble_routes(state).await?;
//! ```

pub mod auth;
pub mod dispatcher;
pub mod entity;
mod error;
mod play;
pub mod poller;
pub mod registry;
pub mod status;

#[cfg(test)]
mod testing;

#[cfg(feature = "server")]
pub mod server_ext;
#[cfg(feature = "server")]
mod server_impl;

pub use auth::AuthCorrelator;
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use entity::{
    AuthCodeOutcome, AuthCodeReceiver, Authorizable, Client, Entity, EntityState, Pollable,
    Readiness, ScrobbleHistory, ScrobbleOutcome, Source, TokenAuthenticator,
};
pub use error::{AuthError, PayloadError, Result, ScrobbleError};
pub use play::{EntityType, PlayEvent, PlayMeta, Role};
pub use poller::Poller;
pub use registry::{ClientRegistry, Registry, SourceRegistry};

#[cfg(feature = "server")]
pub use server_ext::{ScrobbleServerExt, ScrobbleState};
#[cfg(feature = "server")]
pub use server_impl::scrobble_router;

//! # scroblastfm
//!
//! Last.fm as a scrobble client and as a polled source.
//!
//! Authorization uses the web token flow: the user is sent to the Last.fm
//! auth page, which calls back `<base url>/lastfm/callback?state=lastfm:<name>&token=..`.
//! The token is exchanged for a session key (`auth.getSession`) kept in
//! memory; a key from an earlier run can be given as `data.session`.

mod api;
mod client;
mod config;
mod error;
pub mod signing;
mod source;

pub use api::{API_BASE_URL, AUTH_BASE_URL, LastfmApi, RecentTrack, Session};
pub use client::LastfmClient;
pub use config::LastfmData;
pub use error::{LastfmError, Result};
pub use source::{DEFAULT_INTERVAL, LastfmSource};

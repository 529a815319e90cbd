//! # scrobspotify
//!
//! Spotify source: polls the "recently played" history of an account
//! authorized through the OAuth authorization code flow.
//!
//! The user is sent to `/source/auth?name=<source>`, Spotify redirects back
//! to `<base url>/callback?code=..&state=spotify:<source>` and polling starts
//! once the code has been exchanged.

mod api;
mod error;
mod source;

pub use api::{ACCOUNTS_BASE_URL, API_BASE_URL, PlayHistoryItem, SpotifyApi};
pub use error::{Result, SpotifyError};
pub use source::{DEFAULT_INTERVAL, SpotifyData, SpotifySource};

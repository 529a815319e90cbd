//! # scrobmaloja
//!
//! Client for [Maloja](https://github.com/krateng/maloja) servers, using
//! the `mlj_1` API and a key from the configuration.

mod client;
mod error;

pub use client::{MalojaClient, MalojaData};
pub use error::{MalojaError, Result};

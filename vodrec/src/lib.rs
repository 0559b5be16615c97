//! vodrec library crate.
//!
//! Resolves Twitch VOD ids into playable HLS manifest URLs and serves them
//! over HTTP. Exposed as a library for integration testing.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod resolver;
pub mod utils;

pub use error::{Error, Result};

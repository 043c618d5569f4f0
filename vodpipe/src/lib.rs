//! vodpipe library crate.
//!
//! Fetches multi-segment videos while teeing the bytes to disk for later
//! replay and to an external decoder process for immediate playback.

pub mod config;
pub mod database;
pub mod domain;
pub mod downloader;
pub mod error;
pub mod logging;
pub mod player;
pub mod resolver;
pub mod session;
pub mod utils;

pub use error::{Error, Result};

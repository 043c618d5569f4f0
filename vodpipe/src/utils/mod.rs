//! Shared helpers.

pub mod filename;
pub mod format;
pub mod fs;
pub mod http_client;

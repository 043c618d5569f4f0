//! Database models for vodpipe.
//!
//! These models map directly to the database schema and handle
//! serialization/deserialization of JSON fields.

pub mod video;

pub use video::*;

//! Repository layer for the persistent store.
//!
//! Sessions only see the [`VideoRepository`] trait; the SQLite and per-directory
//! JSON backends are interchangeable behind it.

pub mod video;
pub mod video_file;

pub use video::*;
pub use video_file::*;

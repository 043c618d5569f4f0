//! Playback: the controller state machine, its byte-source strategies and the
//! decoder process host.

pub mod controller;
pub mod decoder;
pub mod strategy;

pub use controller::{PlaybackController, PlaybackFinished, PlaybackReport, PlaybackState};
pub use decoder::{CommandDecoderHost, DecoderExit, DecoderHandle, DecoderHost};
pub use strategy::{
    LiveStrategy, LocalStrategy, PlaybackMode, PlaybackStrategy, SegmentInput, SegmentLedger,
};

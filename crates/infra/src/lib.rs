//! Real-time infrastructure for Cascade
//!
//! Lock-free transport, coefficient handoff and the filter chains that run
//! inside the audio callback. Nothing reachable from the audio-side types
//! locks, allocates or logs once prepared.

pub mod audio;
pub mod error;

pub use error::{ChannelError, ProcessorError, Result};

//! Errors raised on the control side of the real-time plumbing
//!
//! Nothing in the audio context returns these; capacity limits there show
//! up as short or empty regions instead.

use cascade_core::domain::FilterError;
use thiserror::Error;

/// Errors from constructing or reassembling a [`crate::audio::LockFreeChannel`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("Channel capacity must be at least 1")]
    ZeroCapacity,

    /// The producer and consumer came from different channels
    #[error("Producer and consumer belong to different channels")]
    Mismatched,
}

/// Errors from configuring filter chains or applying parameter updates
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProcessorError {
    #[error("Rejected filter update: {0}")]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("Cascade has {stages} stages but the chain holds at most {capacity}")]
    StageCapacityExceeded { stages: usize, capacity: usize },

    #[error("Unknown filter slot: {0}")]
    UnknownSlot(usize),

    #[error("Channel count mismatch: expected {expected}, got {got}")]
    ChannelCountMismatch { expected: usize, got: usize },

    #[error("Parameter queue is full")]
    QueueFull,
}

pub type Result<T> = std::result::Result<T, ProcessorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProcessorError::StageCapacityExceeded {
            stages: 5,
            capacity: 4,
        };
        assert!(err.to_string().contains('5'));

        let err: ProcessorError = FilterError::InvalidOrder(0).into();
        assert!(err.to_string().starts_with("Rejected filter update"));

        let err: ProcessorError = ChannelError::ZeroCapacity.into();
        assert_eq!(err.to_string(), "Channel capacity must be at least 1");
    }
}

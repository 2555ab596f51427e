//! Error taxonomy for filter design and parameter validation
//!
//! Every variant here is a control-context error. The audio context only
//! executes operations that were validated before they reached it.

use thiserror::Error;

/// Errors raised while validating parameter snapshots or designing coefficients
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    /// Frequency must lie strictly between 0 and Nyquist
    #[error("Invalid frequency {frequency}Hz at sample rate {sample_rate}Hz (must be inside (0, {nyquist}))", nyquist = .sample_rate / 2.0)]
    InvalidFrequency { frequency: f32, sample_rate: f64 },

    #[error("Quality must be positive and finite, got {0}")]
    InvalidQuality(f32),

    #[error("Filter order must be at least 1, got {0}")]
    InvalidOrder(u32),

    #[error("Sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(f64),

    #[error("Gain must be finite, got {0}dB")]
    InvalidGain(f32),

    #[error("Unknown filter type label: {0}")]
    UnknownFilterType(String),

    #[error("Unknown filter type code: {0}")]
    UnknownFilterCode(u32),

    /// A coefficient set must hold at least one stage
    #[error("Coefficient set is empty")]
    EmptyCascade,
}

pub type Result<T> = std::result::Result<T, FilterError>;

//! Cascade core: the non-real-time half of the equalizer
//!
//! Parameter snapshots and their change-detection policy, the coefficient
//! factory for first-order, biquad and Butterworth cascade designs, the
//! stage kernel the audio context runs, and configuration.

pub mod domain;

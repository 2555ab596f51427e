//! Cross-crate integration tests for Cascade
//!
//! These exercise the domain crate and the real-time crate together, the way
//! a host would drive them.

#[cfg(test)]
mod config_integration;
#[cfg(test)]
mod equalizer_integration;

//! One filter slot on one channel, split across the two contexts
//!
//! [`filter_chain`] returns a [`FilterChainHandle`] for the control side and
//! a [`FilterChain`] for the audio callback. The handle publishes finished
//! coefficient sets and toggles bypass; the chain picks both up at the start
//! of every block and runs the cascade in place.

use super::exchange::{coefficient_exchange, CoefficientPublisher, CoefficientSubscriber};
use crate::error::{ProcessorError, Result};
use cascade_core::domain::{CascadeState, CoefficientSet};
use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Processing context handed to `prepare`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessSpec {
    pub sample_rate: f64,
    pub maximum_block_size: usize,
    pub num_channels: usize,
}

/// Build a chain that holds up to `stage_capacity` stages
pub fn filter_chain(
    stage_capacity: usize,
    retire_capacity: usize,
) -> Result<(FilterChainHandle, FilterChain)> {
    let (publisher, subscriber) = coefficient_exchange(retire_capacity)?;
    let bypassed = Arc::new(CachePadded::new(AtomicBool::new(false)));

    Ok((
        FilterChainHandle {
            publisher,
            bypassed: Arc::clone(&bypassed),
            stage_capacity,
        },
        FilterChain {
            subscriber,
            bypassed,
            state: CascadeState::default(),
            stage_capacity,
            spec: None,
        },
    ))
}

/// Control-side handle for one chain
pub struct FilterChainHandle {
    publisher: CoefficientPublisher,
    bypassed: Arc<CachePadded<AtomicBool>>,
    stage_capacity: usize,
}

impl FilterChainHandle {
    /// Publish a new cascade; the audio side installs it at its next block
    pub fn set_coefficients(&mut self, cascade: Arc<CoefficientSet>) -> Result<()> {
        if cascade.len() > self.stage_capacity {
            return Err(ProcessorError::StageCapacityExceeded {
                stages: cascade.len(),
                capacity: self.stage_capacity,
            });
        }

        debug!(stages = cascade.len(), "Publishing coefficients");
        self.publisher.publish(cascade);
        Ok(())
    }

    pub fn set_bypassed(&self, bypassed: bool) {
        self.bypassed.store(bypassed, Ordering::Release);
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed.load(Ordering::Acquire)
    }

    /// The most recently published cascade
    pub fn coefficients(&self) -> Option<&Arc<CoefficientSet>> {
        self.publisher.current()
    }

    pub fn stage_capacity(&self) -> usize {
        self.stage_capacity
    }

    /// Drop cascades the audio side has finished with
    pub fn collect_garbage(&mut self) -> usize {
        self.publisher.collect_garbage()
    }
}

/// Audio-side half of one chain
pub struct FilterChain {
    subscriber: CoefficientSubscriber,
    bypassed: Arc<CachePadded<AtomicBool>>,
    state: CascadeState,
    stage_capacity: usize,
    spec: Option<ProcessSpec>,
}

impl FilterChain {
    /// Allocate stage state and clear history; call outside the audio callback
    pub fn prepare(&mut self, spec: ProcessSpec) {
        if self.state.capacity() != self.stage_capacity {
            self.state = CascadeState::with_capacity(self.stage_capacity);
        } else {
            self.state.reset();
        }
        self.spec = Some(spec);
    }

    pub fn is_prepared(&self) -> bool {
        self.spec.is_some()
    }

    pub fn spec(&self) -> Option<ProcessSpec> {
        self.spec
    }

    /// Filter `buffer` in place
    ///
    /// Installs newly published coefficients first, even while bypassed.
    /// A bypassed chain, one with no coefficients yet, or one that was never
    /// prepared leaves the samples untouched.
    pub fn process(&mut self, buffer: &mut [f32]) {
        debug_assert!(self.spec.is_some(), "FilterChain::process called before prepare");
        debug_assert!(
            self.spec
                .map_or(true, |spec| buffer.len() <= spec.maximum_block_size),
            "block larger than the prepared maximum"
        );

        self.subscriber.update();

        if self.spec.is_none() || self.bypassed.load(Ordering::Acquire) {
            return;
        }

        if let Some(coeffs) = self.subscriber.active() {
            self.state.process(coeffs, buffer);
        }
    }

    /// Clear filter history without touching coefficients
    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// The cascade the last block ran with
    pub fn active_coefficients(&self) -> Option<&CoefficientSet> {
        self.subscriber.active()
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed.load(Ordering::Acquire)
    }
}

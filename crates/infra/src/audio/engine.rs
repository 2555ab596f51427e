//! Multi-slot equaliser built from filter chains
//!
//! [`equalizer`] wires one [`FilterChain`] per slot per channel and hands
//! back both sides:
//! - [`EqualizerController`] runs on the control thread: validates incoming
//!   snapshots, decides whether coefficients need rebuilding, designs them
//!   once and publishes the same cascade to every channel
//! - [`EqualizerProcessor`] runs in the audio callback: applies each slot's
//!   chain in slot order to every channel

use super::filter_chain::{filter_chain, FilterChain, FilterChainHandle, ProcessSpec};
use super::queue::{ParameterReceiver, SlotUpdate};
use super::tap::BlockTap;
use crate::error::{ProcessorError, Result};
use cascade_core::domain::{
    design, needs_update, CoefficientSet, EngineConfig, FilterSettings,
};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// What a control-side update did to a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// New coefficients were designed and published
    Rebuilt { stages: usize },
    /// Frequency and quality matched the last applied snapshot
    Unchanged,
}

/// Result of draining the parameter queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub applied: usize,
    pub rebuilt: usize,
    pub rejected: usize,
}

impl std::ops::AddAssign for DrainReport {
    fn add_assign(&mut self, other: Self) {
        self.applied += other.applied;
        self.rebuilt += other.rebuilt;
        self.rejected += other.rejected;
    }
}

/// Build the control and audio halves of an equaliser with `slots` slots
pub fn equalizer(
    engine: &EngineConfig,
    slots: usize,
) -> Result<(EqualizerController, EqualizerProcessor)> {
    let mut controllers = Vec::with_capacity(slots);
    let mut chains: Vec<Vec<FilterChain>> = (0..engine.channels)
        .map(|_| Vec::with_capacity(slots))
        .collect();

    for slot in 0..slots {
        let mut handles = Vec::with_capacity(engine.channels);
        for channel_chains in chains.iter_mut() {
            let (handle, chain) =
                filter_chain(engine.stage_capacity, engine.retire_queue_capacity)?;
            handles.push(handle);
            channel_chains.push(chain);
        }
        controllers.push(SlotController::new(slot, handles, engine.stage_capacity));
    }

    info!(
        slots,
        channels = engine.channels,
        stage_capacity = engine.stage_capacity,
        "Equalizer created"
    );

    Ok((
        EqualizerController { slots: controllers },
        EqualizerProcessor {
            chains,
            tap: None,
            spec: None,
        },
    ))
}

// ============================================================================
// Control side
// ============================================================================

/// Control-side owner of one slot across every channel
pub struct SlotController {
    slot: usize,
    chains: Vec<FilterChainHandle>,
    stage_capacity: usize,
    last_applied: Option<FilterSettings>,
}

impl SlotController {
    fn new(slot: usize, chains: Vec<FilterChainHandle>, stage_capacity: usize) -> Self {
        Self {
            slot,
            chains,
            stage_capacity,
            last_applied: None,
        }
    }

    /// Apply a snapshot to this slot
    ///
    /// Rejected snapshots leave the slot exactly as it was. Accepted ones
    /// become the last-applied snapshot and always set bypass. Coefficients
    /// are rebuilt when the snapshot kind differs from the last one applied,
    /// or when frequency or quality moved.
    pub fn update(&mut self, settings: &FilterSettings) -> Result<UpdateOutcome> {
        if let Err(e) = settings.validate() {
            warn!(slot = self.slot, error = %e, "Rejected filter settings");
            return Err(e.into());
        }

        let stages = settings.stage_count();
        if stages > self.stage_capacity {
            warn!(
                slot = self.slot,
                stages,
                capacity = self.stage_capacity,
                "Cascade does not fit the chain"
            );
            return Err(ProcessorError::StageCapacityExceeded {
                stages,
                capacity: self.stage_capacity,
            });
        }

        let changed = match (settings, &self.last_applied) {
            (FilterSettings::Standard(params), Some(FilterSettings::Standard(last))) => {
                needs_update(params, last)
            }
            (FilterSettings::Cut(params), Some(FilterSettings::Cut(last))) => {
                needs_update(params, last)
            }
            _ => true,
        };

        let outcome = if changed {
            let cascade = Arc::new(design(settings)?);
            for chain in &mut self.chains {
                chain.set_coefficients(Arc::clone(&cascade))?;
            }
            debug!(
                slot = self.slot,
                frequency = settings.base().frequency,
                quality = settings.base().quality,
                stages = cascade.len(),
                "Rebuilt coefficients"
            );
            UpdateOutcome::Rebuilt {
                stages: cascade.len(),
            }
        } else {
            trace!(slot = self.slot, "Frequency and quality unchanged");
            UpdateOutcome::Unchanged
        };

        self.last_applied = Some(*settings);

        for chain in &mut self.chains {
            chain.set_bypassed(settings.is_bypassed());
            chain.collect_garbage();
        }

        Ok(outcome)
    }

    pub fn index(&self) -> usize {
        self.slot
    }

    pub fn is_bypassed(&self) -> bool {
        self.chains.first().is_some_and(FilterChainHandle::is_bypassed)
    }

    /// Last accepted snapshot, if any
    pub fn last_applied(&self) -> Option<&FilterSettings> {
        self.last_applied.as_ref()
    }

    /// The cascade most recently published for `channel`
    pub fn coefficients(&self, channel: usize) -> Option<&Arc<CoefficientSet>> {
        self.chains.get(channel).and_then(FilterChainHandle::coefficients)
    }

    fn collect_garbage(&mut self) -> usize {
        self.chains
            .iter_mut()
            .map(FilterChainHandle::collect_garbage)
            .sum()
    }
}

/// Control-side owner of every slot
pub struct EqualizerController {
    slots: Vec<SlotController>,
}

impl EqualizerController {
    /// Apply one update
    pub fn update(&mut self, update: &SlotUpdate) -> Result<UpdateOutcome> {
        let slot = self
            .slots
            .get_mut(update.slot)
            .ok_or(ProcessorError::UnknownSlot(update.slot))?;
        slot.update(&update.settings)
    }

    /// Apply settings to slots in order, stopping at the first rejection
    pub fn apply_all(&mut self, settings: &[FilterSettings]) -> Result<()> {
        for (slot, settings) in settings.iter().enumerate() {
            self.update(&SlotUpdate {
                slot,
                settings: *settings,
            })?;
        }
        Ok(())
    }

    /// Apply every queued update; rejected updates are logged and counted
    pub fn apply_pending(&mut self, queue: &mut ParameterReceiver) -> DrainReport {
        let mut report = DrainReport::default();

        while let Some(update) = queue.pop() {
            match self.update(&update) {
                Ok(UpdateOutcome::Rebuilt { .. }) => {
                    report.applied += 1;
                    report.rebuilt += 1;
                }
                Ok(UpdateOutcome::Unchanged) => report.applied += 1,
                Err(e) => {
                    warn!(slot = update.slot, error = %e, "Dropped queued update");
                    report.rejected += 1;
                }
            }
        }

        report
    }

    pub fn slot(&self, index: usize) -> Option<&SlotController> {
        self.slots.get(index)
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Drop cascades the audio side has retired
    pub fn collect_garbage(&mut self) -> usize {
        self.slots.iter_mut().map(SlotController::collect_garbage).sum()
    }

    /// Combined magnitude response in dB of every active slot on channel 0
    pub fn magnitude_response(&self, frequencies: &[f64], sample_rate: f64) -> Vec<f64> {
        let mut total = vec![0.0; frequencies.len()];

        for slot in self.slots.iter().filter(|slot| !slot.is_bypassed()) {
            if let Some(cascade) = slot.coefficients(0) {
                let response = cascade.magnitude_response(frequencies, sample_rate);
                for (sum, db) in total.iter_mut().zip(response) {
                    *sum += db;
                }
            }
        }

        total
    }
}

// ============================================================================
// Audio side
// ============================================================================

/// Audio-side half: every chain, indexed by channel then slot
pub struct EqualizerProcessor {
    chains: Vec<Vec<FilterChain>>,
    tap: Option<BlockTap>,
    spec: Option<ProcessSpec>,
}

impl EqualizerProcessor {
    /// Prepare every chain; call before the first block
    pub fn prepare(&mut self, spec: ProcessSpec) -> Result<()> {
        if spec.num_channels != self.chains.len() {
            return Err(ProcessorError::ChannelCountMismatch {
                expected: self.chains.len(),
                got: spec.num_channels,
            });
        }

        for chain in self.chains.iter_mut().flatten() {
            chain.prepare(spec);
        }
        self.spec = Some(spec);

        debug!(
            sample_rate = spec.sample_rate,
            block_size = spec.maximum_block_size,
            channels = spec.num_channels,
            "Equalizer prepared"
        );
        Ok(())
    }

    /// Send a copy of every processed block to `tap`
    pub fn attach_tap(&mut self, tap: BlockTap) {
        self.tap = Some(tap);
    }

    /// Filter one block in place, one slice per channel
    ///
    /// Extra slices beyond the prepared channel count pass through untouched.
    pub fn process(&mut self, channels: &mut [&mut [f32]]) {
        debug_assert_eq!(channels.len(), self.chains.len(), "channel count changed");

        for (index, (buffer, slots)) in channels.iter_mut().zip(&mut self.chains).enumerate() {
            for chain in slots.iter_mut() {
                chain.process(buffer);
            }
            if let Some(tap) = self.tap.as_mut() {
                tap.write(index, buffer);
            }
        }
    }

    /// Clear all filter history
    pub fn reset(&mut self) {
        for chain in self.chains.iter_mut().flatten() {
            chain.reset();
        }
    }

    pub fn num_channels(&self) -> usize {
        self.chains.len()
    }

    pub fn num_slots(&self) -> usize {
        self.chains.first().map_or(0, Vec::len)
    }

    pub fn spec(&self) -> Option<ProcessSpec> {
        self.spec
    }

    /// Cascade the audio side is currently running for `slot` on `channel`
    pub fn active_coefficients(&self, channel: usize, slot: usize) -> Option<&CoefficientSet> {
        self.chains
            .get(channel)
            .and_then(|slots| slots.get(slot))
            .and_then(FilterChain::active_coefficients)
    }

    /// Tap blocks lost because the reader fell behind
    pub fn tap_dropped(&self) -> u64 {
        self.tap.as_ref().map_or(0, BlockTap::dropped)
    }
}

//! Recursive stage kernel
//!
//! Stages run in Transposed Direct Form II: two state words per stage, one
//! multiply-add chain per sample. The state lives here and the coefficients
//! live in a shared [`CoefficientSet`], so two channels can run the same
//! cascade with independent histories.

use crate::domain::coefficients::{CoefficientSet, StageCoefficients};

/// State magnitudes below this are flushed to zero after each block
const DENORMAL_THRESHOLD: f32 = 1.0e-8;

/// Delay-line state of one stage
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageState {
    s1: f32,
    s2: f32,
}

impl StageState {
    /// Process a single sample
    #[inline]
    pub fn process_sample(&mut self, coeffs: &StageCoefficients, x: f32) -> f32 {
        let y = coeffs.b0 * x + self.s1;
        self.s1 = coeffs.b1 * x - coeffs.a1 * y + self.s2;
        self.s2 = coeffs.b2 * x - coeffs.a2 * y;
        y
    }

    /// Process a buffer of samples in place
    pub fn process(&mut self, coeffs: &StageCoefficients, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(coeffs, *sample);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[inline]
    fn snap_to_zero(&mut self) {
        if self.s1.abs() < DENORMAL_THRESHOLD {
            self.s1 = 0.0;
        }
        if self.s2.abs() < DENORMAL_THRESHOLD {
            self.s2 = 0.0;
        }
    }
}

/// Delay-line state for a whole cascade, sized once for a stage capacity
///
/// `process` never allocates: a cascade longer than the capacity only has
/// its first `capacity` stages applied, and callers reject such cascades
/// before they reach the audio context.
#[derive(Debug, Clone, Default)]
pub struct CascadeState {
    stages: Vec<StageState>,
    active: usize,
}

impl CascadeState {
    /// Allocate state for up to `capacity` stages
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            stages: vec![StageState::default(); capacity],
            active: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.stages.len()
    }

    /// Run `buffer` through every stage of `coeffs`, in order, in place
    pub fn process(&mut self, coeffs: &CoefficientSet, buffer: &mut [f32]) {
        let stage_count = coeffs.len().min(self.stages.len());

        // Stages that were idle during the previous cascade start from rest
        if stage_count > self.active {
            for state in &mut self.stages[self.active..stage_count] {
                state.reset();
            }
        }
        self.active = stage_count;

        for (state, stage) in self.stages.iter_mut().zip(coeffs.stages()) {
            state.process(stage, buffer);
            state.snap_to_zero();
        }
    }

    pub fn reset(&mut self) {
        for state in &mut self.stages {
            state.reset();
        }
        self.active = 0;
    }
}

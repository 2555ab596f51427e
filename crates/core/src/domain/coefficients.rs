//! Coefficient design for first-order, biquad and Butterworth cascades
//!
//! All designs use the bilinear transform with frequency pre-warping, so the
//! analogue prototype's response at `frequency` lands exactly on the digital
//! cutoff. The maths runs in `f64` and the result is stored as `f32`, which
//! is what the processing kernel consumes.
//!
//! The factory never clamps. Callers validate snapshots first; an invalid
//! snapshot here is reported as an error and nothing is designed.

use crate::domain::error::{FilterError, Result};
use crate::domain::params::{FilterParameters, FilterSettings, FilterType, HighCutLowCutParameters};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Coefficients of one recursive stage, normalised so that `a0 == 1`
///
/// First-order stages are stored in the same shape with `b2 == a2 == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageCoefficients {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a0: f32,
    pub a1: f32,
    pub a2: f32,
}

impl Default for StageCoefficients {
    fn default() -> Self {
        // Unity gain (no filtering)
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a0: 1.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

impl StageCoefficients {
    /// Build a second-order stage from raw coefficients, dividing through by `a0`
    fn biquad(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        let inv_a0 = 1.0 / a0;
        Self {
            b0: (b0 * inv_a0) as f32,
            b1: (b1 * inv_a0) as f32,
            b2: (b2 * inv_a0) as f32,
            a0: 1.0,
            a1: (a1 * inv_a0) as f32,
            a2: (a2 * inv_a0) as f32,
        }
    }

    fn first_order(b0: f64, b1: f64, a0: f64, a1: f64) -> Self {
        Self::biquad(b0, b1, 0.0, a0, a1, 0.0)
    }

    pub fn is_first_order(&self) -> bool {
        self.b2 == 0.0 && self.a2 == 0.0
    }

    /// Complex response `H(e^jw)` at `frequency`
    pub fn response(&self, frequency: f64, sample_rate: f64) -> Complex64 {
        let w = 2.0 * PI * frequency / sample_rate;
        let z1 = Complex64::from_polar(1.0, -w);
        let z2 = z1 * z1;

        let numerator = f64::from(self.b0) + f64::from(self.b1) * z1 + f64::from(self.b2) * z2;
        let denominator = f64::from(self.a0) + f64::from(self.a1) * z1 + f64::from(self.a2) * z2;
        numerator / denominator
    }

    /// Poles inside the unit circle (Jury criterion for a normalised biquad)
    pub fn is_stable(&self) -> bool {
        let a1 = f64::from(self.a1);
        let a2 = f64::from(self.a2);
        a2.abs() < 1.0 && a1.abs() < 1.0 + a2
    }
}

/// An immutable cascade of stage coefficients, applied in order
///
/// Produced fresh by every design call. Filter chains share it through an
/// `Arc`, so it is never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientSet {
    stages: Vec<StageCoefficients>,
}

impl CoefficientSet {
    pub fn new(stages: Vec<StageCoefficients>) -> Result<Self> {
        if stages.is_empty() {
            return Err(FilterError::EmptyCascade);
        }
        Ok(Self { stages })
    }

    fn single(stage: StageCoefficients) -> Self {
        Self { stages: vec![stage] }
    }

    pub fn stages(&self) -> &[StageCoefficients] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always `false`; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Sum of the stage orders
    pub fn order(&self) -> usize {
        self.stages
            .iter()
            .map(|stage| if stage.is_first_order() { 1 } else { 2 })
            .sum()
    }

    /// Linear magnitude of the whole cascade at `frequency`
    pub fn magnitude_for_frequency(&self, frequency: f64, sample_rate: f64) -> f64 {
        self.stages
            .iter()
            .map(|stage| stage.response(frequency, sample_rate).norm())
            .product()
    }

    /// Magnitude in dB at each requested frequency, for display
    pub fn magnitude_response(&self, frequencies: &[f64], sample_rate: f64) -> Vec<f64> {
        frequencies
            .iter()
            .map(|&f| 20.0 * self.magnitude_for_frequency(f, sample_rate).max(1e-12).log10())
            .collect()
    }
}

/// Design the cascade for any slot settings
pub fn design(settings: &FilterSettings) -> Result<CoefficientSet> {
    match settings {
        FilterSettings::Standard(params) => make_coefficients(params),
        FilterSettings::Cut(params) => make_cut_coefficients(params),
    }
}

/// Design a single stage for the biquad family of filter types
pub fn make_coefficients(params: &FilterParameters) -> Result<CoefficientSet> {
    params.validate()?;

    let sample_rate = params.base.sample_rate;
    let frequency = f64::from(params.base.frequency);
    let q = f64::from(params.base.quality);
    let gain = db_to_gain(f64::from(params.gain_in_decibels));

    let stage = match params.filter_type {
        FilterType::FirstOrderLowPass => first_order_low_pass(sample_rate, frequency),
        FilterType::FirstOrderHighPass => first_order_high_pass(sample_rate, frequency),
        FilterType::FirstOrderAllPass => first_order_all_pass(sample_rate, frequency),
        FilterType::LowPass => low_pass(sample_rate, frequency, q),
        FilterType::HighPass => high_pass(sample_rate, frequency, q),
        FilterType::BandPass => band_pass(sample_rate, frequency, q),
        FilterType::Notch => notch(sample_rate, frequency, q),
        FilterType::AllPass => all_pass(sample_rate, frequency, q),
        FilterType::LowShelf => low_shelf(sample_rate, frequency, q, gain),
        FilterType::HighShelf => high_shelf(sample_rate, frequency, q, gain),
        FilterType::Peak => peak(sample_rate, frequency, q, gain),
    };

    Ok(CoefficientSet::single(stage))
}

/// Design a Butterworth cut cascade of `order` poles
///
/// `order / 2` biquads carry the conjugate pole pairs, each with the Q of its
/// pole angle; an odd order puts one first-order stage for the real pole ahead
/// of them.
/// A low cut removes the low band, so it designs a high-pass cascade.
pub fn make_cut_coefficients(params: &HighCutLowCutParameters) -> Result<CoefficientSet> {
    params.validate()?;

    let sample_rate = params.base.sample_rate;
    let frequency = f64::from(params.base.frequency);
    let order = params.order;
    let mut stages = Vec::with_capacity(params.stage_count());

    if order % 2 == 1 {
        stages.push(if params.is_lowcut {
            first_order_high_pass(sample_rate, frequency)
        } else {
            first_order_low_pass(sample_rate, frequency)
        });
    }

    for q in butterworth_qs(order) {
        stages.push(if params.is_lowcut {
            high_pass(sample_rate, frequency, q)
        } else {
            low_pass(sample_rate, frequency, q)
        });
    }

    CoefficientSet::new(stages)
}

/// Q of each second-order section in an `order`-pole Butterworth layout
pub fn butterworth_qs(order: u32) -> impl Iterator<Item = f64> {
    let n = f64::from(order);
    (0..order / 2).map(move |i| {
        let i = f64::from(i);
        let angle = if order % 2 == 1 {
            (i + 1.0) * PI / n
        } else {
            (2.0 * i + 1.0) * PI / (2.0 * n)
        };
        1.0 / (2.0 * angle.cos())
    })
}

pub fn db_to_gain(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

fn first_order_low_pass(sample_rate: f64, frequency: f64) -> StageCoefficients {
    let n = (PI * frequency / sample_rate).tan();
    StageCoefficients::first_order(n, n, n + 1.0, n - 1.0)
}

fn first_order_high_pass(sample_rate: f64, frequency: f64) -> StageCoefficients {
    let n = (PI * frequency / sample_rate).tan();
    StageCoefficients::first_order(1.0, -1.0, n + 1.0, n - 1.0)
}

fn first_order_all_pass(sample_rate: f64, frequency: f64) -> StageCoefficients {
    let n = (PI * frequency / sample_rate).tan();
    StageCoefficients::first_order(n - 1.0, n + 1.0, n + 1.0, n - 1.0)
}

fn low_pass(sample_rate: f64, frequency: f64, q: f64) -> StageCoefficients {
    let n = 1.0 / (PI * frequency / sample_rate).tan();
    let n_sq = n * n;
    let inv_q = 1.0 / q;
    let c1 = 1.0 / (1.0 + inv_q * n + n_sq);

    StageCoefficients::biquad(
        c1,
        c1 * 2.0,
        c1,
        1.0,
        c1 * 2.0 * (1.0 - n_sq),
        c1 * (1.0 - inv_q * n + n_sq),
    )
}

fn high_pass(sample_rate: f64, frequency: f64, q: f64) -> StageCoefficients {
    let n = (PI * frequency / sample_rate).tan();
    let n_sq = n * n;
    let inv_q = 1.0 / q;
    let c1 = 1.0 / (1.0 + inv_q * n + n_sq);

    StageCoefficients::biquad(
        c1,
        c1 * -2.0,
        c1,
        1.0,
        c1 * 2.0 * (n_sq - 1.0),
        c1 * (1.0 - inv_q * n + n_sq),
    )
}

fn band_pass(sample_rate: f64, frequency: f64, q: f64) -> StageCoefficients {
    let n = 1.0 / (PI * frequency / sample_rate).tan();
    let n_sq = n * n;
    let inv_q = 1.0 / q;
    let c1 = 1.0 / (1.0 + inv_q * n + n_sq);

    StageCoefficients::biquad(
        c1 * n * inv_q,
        0.0,
        -c1 * n * inv_q,
        1.0,
        c1 * 2.0 * (1.0 - n_sq),
        c1 * (1.0 - inv_q * n + n_sq),
    )
}

fn notch(sample_rate: f64, frequency: f64, q: f64) -> StageCoefficients {
    let n = 1.0 / (PI * frequency / sample_rate).tan();
    let n_sq = n * n;
    let inv_q = 1.0 / q;
    let c1 = 1.0 / (1.0 + n * inv_q + n_sq);
    let b0 = c1 * (1.0 + n_sq);
    let b1 = 2.0 * c1 * (1.0 - n_sq);

    StageCoefficients::biquad(b0, b1, b0, 1.0, b1, c1 * (1.0 - n * inv_q + n_sq))
}

fn all_pass(sample_rate: f64, frequency: f64, q: f64) -> StageCoefficients {
    let n = 1.0 / (PI * frequency / sample_rate).tan();
    let n_sq = n * n;
    let inv_q = 1.0 / q;
    let c1 = 1.0 / (1.0 + inv_q * n + n_sq);
    let b0 = c1 * (1.0 - n * inv_q + n_sq);
    let b1 = c1 * 2.0 * (1.0 - n_sq);

    StageCoefficients::biquad(b0, b1, 1.0, 1.0, b1, b0)
}

fn low_shelf(sample_rate: f64, frequency: f64, q: f64, gain: f64) -> StageCoefficients {
    let a = gain.max(0.0).sqrt();
    let a_minus_1 = a - 1.0;
    let a_plus_1 = a + 1.0;
    let omega = (2.0 * PI * frequency) / sample_rate;
    let cos_w = omega.cos();
    let beta = omega.sin() * a.sqrt() / q;
    let a_minus_1_cos = a_minus_1 * cos_w;

    StageCoefficients::biquad(
        a * (a_plus_1 - a_minus_1_cos + beta),
        a * 2.0 * (a_minus_1 - a_plus_1 * cos_w),
        a * (a_plus_1 - a_minus_1_cos - beta),
        a_plus_1 + a_minus_1_cos + beta,
        -2.0 * (a_minus_1 + a_plus_1 * cos_w),
        a_plus_1 + a_minus_1_cos - beta,
    )
}

fn high_shelf(sample_rate: f64, frequency: f64, q: f64, gain: f64) -> StageCoefficients {
    let a = gain.max(0.0).sqrt();
    let a_minus_1 = a - 1.0;
    let a_plus_1 = a + 1.0;
    let omega = (2.0 * PI * frequency) / sample_rate;
    let cos_w = omega.cos();
    let beta = omega.sin() * a.sqrt() / q;
    let a_minus_1_cos = a_minus_1 * cos_w;

    StageCoefficients::biquad(
        a * (a_plus_1 + a_minus_1_cos + beta),
        a * -2.0 * (a_minus_1 + a_plus_1 * cos_w),
        a * (a_plus_1 + a_minus_1_cos - beta),
        a_plus_1 - a_minus_1_cos + beta,
        2.0 * (a_minus_1 - a_plus_1 * cos_w),
        a_plus_1 - a_minus_1_cos - beta,
    )
}

fn peak(sample_rate: f64, frequency: f64, q: f64, gain: f64) -> StageCoefficients {
    let a = gain.max(0.0).sqrt();
    let omega = (2.0 * PI * frequency) / sample_rate;
    let alpha = omega.sin() / (q * 2.0);
    let c2 = -2.0 * omega.cos();
    let alpha_times_a = alpha * a;
    let alpha_over_a = alpha / a;

    StageCoefficients::biquad(
        1.0 + alpha_times_a,
        c2,
        1.0 - alpha_times_a,
        1.0 + alpha_over_a,
        c2,
        1.0 - alpha_over_a,
    )
}

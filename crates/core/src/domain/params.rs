//! Filter parameter snapshots and change detection
//!
//! A snapshot describes one filter slot's settings at an instant. The
//! control context compares each new snapshot against the last one it
//! applied and only rebuilds coefficients when the detector says so.
//!
//! Snapshots arrive already mapped from host parameter values; this module
//! only validates them against the invariants the coefficient factory
//! relies on.

use crate::domain::error::{FilterError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every filter response the factory can design
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterType {
    FirstOrderLowPass,
    FirstOrderHighPass,
    FirstOrderAllPass,
    LowPass,
    HighPass,
    BandPass,
    Notch,
    AllPass,
    LowShelf,
    HighShelf,
    Peak,
}

/// Display labels, indexed by `FilterType::code()`
///
/// This is the single source for both directions of the type/label mapping.
static FILTER_LABELS: [(FilterType, &str); 11] = [
    (FilterType::FirstOrderLowPass, "FirstOrder LowPass"),
    (FilterType::FirstOrderHighPass, "FirstOrder HighPass"),
    (FilterType::FirstOrderAllPass, "FirstOrder AllPass"),
    (FilterType::LowPass, "LowPass"),
    (FilterType::HighPass, "HighPass"),
    (FilterType::BandPass, "BandPass"),
    (FilterType::Notch, "Notch"),
    (FilterType::AllPass, "Allpass"),
    (FilterType::LowShelf, "LowShelf"),
    (FilterType::HighShelf, "HighShelf"),
    (FilterType::Peak, "Peak"),
];

impl FilterType {
    /// All filter types in host choice order
    pub const ALL: [FilterType; 11] = [
        FilterType::FirstOrderLowPass,
        FilterType::FirstOrderHighPass,
        FilterType::FirstOrderAllPass,
        FilterType::LowPass,
        FilterType::HighPass,
        FilterType::BandPass,
        FilterType::Notch,
        FilterType::AllPass,
        FilterType::LowShelf,
        FilterType::HighShelf,
        FilterType::Peak,
    ];

    /// Enumerated code used by the host's choice parameter
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Map a host choice code back to a filter type
    pub fn from_code(code: u32) -> Result<Self> {
        FILTER_LABELS
            .get(code as usize)
            .map(|(filter_type, _)| *filter_type)
            .ok_or(FilterError::UnknownFilterCode(code))
    }

    /// Human-readable label shown by the editor
    pub fn label(self) -> &'static str {
        FILTER_LABELS[self.code() as usize].1
    }

    /// Labels in choice order, for building a host choice list
    pub fn labels() -> impl Iterator<Item = &'static str> {
        FILTER_LABELS.iter().map(|(_, label)| *label)
    }

    pub fn is_first_order(self) -> bool {
        matches!(
            self,
            FilterType::FirstOrderLowPass
                | FilterType::FirstOrderHighPass
                | FilterType::FirstOrderAllPass
        )
    }

    /// Whether the design consumes `gain_in_decibels`
    pub fn uses_gain(self) -> bool {
        matches!(
            self,
            FilterType::LowShelf | FilterType::HighShelf | FilterType::Peak
        )
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for FilterType {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self> {
        FILTER_LABELS
            .iter()
            .find(|(_, label)| *label == s)
            .map(|(filter_type, _)| *filter_type)
            .ok_or_else(|| FilterError::UnknownFilterType(s.to_string()))
    }
}

/// Host-facing parameter ranges
///
/// Snapshots outside these ranges can still be valid for the factory; the
/// ranges bound what the parameter layer hands out and what configuration
/// files may request.
pub mod limits {
    pub const FREQ_MIN: f32 = 20.0;
    pub const FREQ_MAX: f32 = 20_000.0;
    pub const FREQ_DEFAULT: f32 = 20.0;

    pub const Q_MIN: f32 = 0.1;
    pub const Q_MAX: f32 = 10.0;
    pub const Q_DEFAULT: f32 = 1.0;

    pub const GAIN_DB_MIN: f32 = -24.0;
    pub const GAIN_DB_MAX: f32 = 24.0;
    pub const GAIN_DB_DEFAULT: f32 = 0.0;

    pub const ORDER_MIN: u32 = 1;
    pub const ORDER_MAX: u32 = 8;

    pub const SAMPLE_RATE_DEFAULT: f64 = 44_100.0;
}

/// Which host parameter of a slot an identifier refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Frequency,
    Quality,
    Gain,
    Type,
    Bypass,
}

impl ParamKind {
    fn label(self) -> &'static str {
        match self {
            ParamKind::Frequency => "freq",
            ParamKind::Quality => "Q",
            ParamKind::Gain => "gain",
            ParamKind::Type => "type",
            ParamKind::Bypass => "bypass",
        }
    }
}

/// Host parameter identifier for a slot, e.g. `Filter_0_freq`
pub fn parameter_id(slot: usize, kind: ParamKind) -> String {
    format!("Filter_{}_{}", slot, kind.label())
}

/// Fields shared by every snapshot shape
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FilterParametersBase {
    pub frequency: f32,
    #[serde(default = "default_quality")]
    pub quality: f32,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
    #[serde(default)]
    pub bypassed: bool,
}

fn default_quality() -> f32 {
    limits::Q_DEFAULT
}

fn default_sample_rate() -> f64 {
    limits::SAMPLE_RATE_DEFAULT
}

impl Default for FilterParametersBase {
    fn default() -> Self {
        Self {
            frequency: 440.0,
            quality: 1.0,
            sample_rate: limits::SAMPLE_RATE_DEFAULT,
            bypassed: false,
        }
    }
}

impl FilterParametersBase {
    /// Check the invariants the coefficient factory relies on
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(FilterError::InvalidSampleRate(self.sample_rate));
        }

        let nyquist = self.sample_rate / 2.0;
        let frequency = f64::from(self.frequency);
        if !(frequency.is_finite() && frequency > 0.0 && frequency < nyquist) {
            return Err(FilterError::InvalidFrequency {
                frequency: self.frequency,
                sample_rate: self.sample_rate,
            });
        }

        if !(self.quality.is_finite() && self.quality > 0.0) {
            return Err(FilterError::InvalidQuality(self.quality));
        }

        Ok(())
    }
}

/// Snapshots are "unchanged" when frequency and quality match.
///
/// Gain, type, order and cut direction are deliberately left out of the
/// comparison; see [`needs_update`].
impl PartialEq for FilterParametersBase {
    fn eq(&self, other: &Self) -> bool {
        self.frequency == other.frequency && self.quality == other.quality
    }
}

/// Snapshot for the single-biquad family of designs
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FilterParameters {
    #[serde(flatten)]
    pub base: FilterParametersBase,
    pub filter_type: FilterType,
    #[serde(default)]
    pub gain_in_decibels: f32,
}

impl Default for FilterParameters {
    fn default() -> Self {
        Self {
            base: FilterParametersBase::default(),
            filter_type: FilterType::LowPass,
            gain_in_decibels: 0.0,
        }
    }
}

impl FilterParameters {
    pub fn new(filter_type: FilterType, frequency: f32, quality: f32, sample_rate: f64) -> Self {
        Self {
            base: FilterParametersBase {
                frequency,
                quality,
                sample_rate,
                bypassed: false,
            },
            filter_type,
            gain_in_decibels: 0.0,
        }
    }

    #[must_use]
    pub fn with_gain(mut self, gain_in_decibels: f32) -> Self {
        self.gain_in_decibels = gain_in_decibels;
        self
    }

    #[must_use]
    pub fn with_bypass(mut self, bypassed: bool) -> Self {
        self.base.bypassed = bypassed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        if !self.gain_in_decibels.is_finite() {
            return Err(FilterError::InvalidGain(self.gain_in_decibels));
        }
        Ok(())
    }
}

impl PartialEq for FilterParameters {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base
    }
}

/// Snapshot for high-order Butterworth cut filters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HighCutLowCutParameters {
    #[serde(flatten)]
    pub base: FilterParametersBase,
    pub order: u32,
    /// `true` removes the low band (high-pass cascade)
    pub is_lowcut: bool,
}

impl Default for HighCutLowCutParameters {
    fn default() -> Self {
        Self {
            base: FilterParametersBase::default(),
            order: 1,
            is_lowcut: true,
        }
    }
}

impl HighCutLowCutParameters {
    pub fn lowcut(frequency: f32, order: u32, sample_rate: f64) -> Self {
        Self::new(frequency, order, true, sample_rate)
    }

    pub fn highcut(frequency: f32, order: u32, sample_rate: f64) -> Self {
        Self::new(frequency, order, false, sample_rate)
    }

    fn new(frequency: f32, order: u32, is_lowcut: bool, sample_rate: f64) -> Self {
        Self {
            base: FilterParametersBase {
                frequency,
                quality: limits::Q_DEFAULT,
                sample_rate,
                bypassed: false,
            },
            order,
            is_lowcut,
        }
    }

    #[must_use]
    pub fn with_bypass(mut self, bypassed: bool) -> Self {
        self.base.bypassed = bypassed;
        self
    }

    /// Number of stages the Butterworth decomposition produces
    pub fn stage_count(&self) -> usize {
        (self.order as usize).div_ceil(2)
    }

    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        if self.order < limits::ORDER_MIN {
            return Err(FilterError::InvalidOrder(self.order));
        }
        Ok(())
    }
}

impl PartialEq for HighCutLowCutParameters {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base
    }
}

/// A slot's settings: one of the two snapshot shapes
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterSettings {
    Standard(FilterParameters),
    Cut(HighCutLowCutParameters),
}

impl Default for FilterSettings {
    fn default() -> Self {
        FilterSettings::Standard(FilterParameters::default())
    }
}

impl FilterSettings {
    pub fn base(&self) -> &FilterParametersBase {
        match self {
            FilterSettings::Standard(params) => &params.base,
            FilterSettings::Cut(params) => &params.base,
        }
    }

    fn base_mut(&mut self) -> &mut FilterParametersBase {
        match self {
            FilterSettings::Standard(params) => &mut params.base,
            FilterSettings::Cut(params) => &mut params.base,
        }
    }

    pub fn is_bypassed(&self) -> bool {
        self.base().bypassed
    }

    /// Re-stamp the snapshot for the engine's current sample rate
    #[must_use]
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.base_mut().sample_rate = sample_rate;
        self
    }

    #[must_use]
    pub fn with_bypass(mut self, bypassed: bool) -> Self {
        self.base_mut().bypassed = bypassed;
        self
    }

    #[must_use]
    pub fn with_frequency(mut self, frequency: f32) -> Self {
        self.base_mut().frequency = frequency;
        self
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            FilterSettings::Standard(params) => params.validate(),
            FilterSettings::Cut(params) => params.validate(),
        }
    }

    /// Upper bound on the stage count of the cascade these settings design
    pub fn stage_count(&self) -> usize {
        match self {
            FilterSettings::Standard(_) => 1,
            FilterSettings::Cut(params) => params.stage_count(),
        }
    }
}

impl From<FilterParameters> for FilterSettings {
    fn from(params: FilterParameters) -> Self {
        FilterSettings::Standard(params)
    }
}

impl From<HighCutLowCutParameters> for FilterSettings {
    fn from(params: HighCutLowCutParameters) -> Self {
        FilterSettings::Cut(params)
    }
}

/// Change detector: does `incoming` warrant a coefficient rebuild?
///
/// Only frequency and quality take part in the comparison. A gain-only,
/// type-only, order-only or direction-only change returns `false`. The
/// caller stores `incoming` as the last-applied snapshot whatever the
/// outcome.
pub fn needs_update<P: PartialEq>(incoming: &P, last_applied: &P) -> bool {
    incoming != last_applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE_RATE: f64 = 48000.0;

    #[test]
    fn test_label_table_round_trip() {
        for filter_type in FilterType::ALL {
            let parsed: FilterType = filter_type.label().parse().unwrap();
            assert_eq!(parsed, filter_type);
            assert_eq!(FilterType::from_code(filter_type.code()).unwrap(), filter_type);
        }
        assert_eq!(FilterType::labels().count(), FilterType::ALL.len());
    }

    #[test]
    fn test_labels_match_editor_strings() {
        assert_eq!(FilterType::FirstOrderLowPass.label(), "FirstOrder LowPass");
        assert_eq!(FilterType::AllPass.label(), "Allpass");
        assert_eq!(FilterType::Peak.to_string(), "Peak");
    }

    #[test]
    fn test_unknown_label_and_code() {
        assert_eq!(
            "Bell".parse::<FilterType>(),
            Err(FilterError::UnknownFilterType("Bell".to_string()))
        );
        assert_eq!(FilterType::from_code(11), Err(FilterError::UnknownFilterCode(11)));
    }

    #[test]
    fn test_parameter_ids() {
        assert_eq!(parameter_id(0, ParamKind::Frequency), "Filter_0_freq");
        assert_eq!(parameter_id(3, ParamKind::Quality), "Filter_3_Q");
        assert_eq!(parameter_id(1, ParamKind::Bypass), "Filter_1_bypass");
    }

    #[test]
    fn test_validation_rejects_out_of_range() {
        let ok = FilterParameters::new(FilterType::Peak, 1000.0, 0.7, SAMPLE_RATE);
        assert!(ok.validate().is_ok());

        let at_nyquist = FilterParameters::new(FilterType::Peak, 24000.0, 0.7, SAMPLE_RATE);
        assert!(matches!(
            at_nyquist.validate(),
            Err(FilterError::InvalidFrequency { .. })
        ));

        let zero_freq = FilterParameters::new(FilterType::Peak, 0.0, 0.7, SAMPLE_RATE);
        assert!(zero_freq.validate().is_err());

        let zero_q = FilterParameters::new(FilterType::Peak, 1000.0, 0.0, SAMPLE_RATE);
        assert_eq!(zero_q.validate(), Err(FilterError::InvalidQuality(0.0)));

        let nan_gain = ok.with_gain(f32::NAN);
        assert!(matches!(nan_gain.validate(), Err(FilterError::InvalidGain(_))));

        let bad_rate = FilterParameters::new(FilterType::Peak, 1000.0, 0.7, 0.0);
        assert_eq!(bad_rate.validate(), Err(FilterError::InvalidSampleRate(0.0)));

        let zero_order = HighCutLowCutParameters::lowcut(500.0, 0, SAMPLE_RATE);
        assert_eq!(zero_order.validate(), Err(FilterError::InvalidOrder(0)));
    }

    #[test]
    fn test_detector_ignores_gain_type_order_direction() {
        let a = FilterParameters::new(FilterType::LowShelf, 1000.0, 1.0, SAMPLE_RATE);
        let b = FilterParameters::new(FilterType::Peak, 1000.0, 1.0, SAMPLE_RATE).with_gain(6.0);
        assert!(!needs_update(&b, &a));

        let c = HighCutLowCutParameters::lowcut(500.0, 2, SAMPLE_RATE);
        let d = HighCutLowCutParameters::highcut(500.0, 6, SAMPLE_RATE);
        assert!(!needs_update(&d, &c));
    }

    #[test]
    fn test_detector_sees_frequency_and_quality() {
        let a = FilterParameters::new(FilterType::LowPass, 1000.0, 1.0, SAMPLE_RATE);
        let b = FilterParameters::new(FilterType::LowPass, 1001.0, 1.0, SAMPLE_RATE);
        let c = FilterParameters::new(FilterType::LowPass, 1000.0, 2.0, SAMPLE_RATE);
        assert!(needs_update(&b, &a));
        assert!(needs_update(&c, &a));
        assert!(!needs_update(&a, &a));
    }

    #[test]
    fn test_cut_stage_count() {
        for (order, stages) in [(1, 1), (2, 1), (3, 2), (4, 2), (5, 3), (8, 4)] {
            let params = HighCutLowCutParameters::highcut(2000.0, order, SAMPLE_RATE);
            assert_eq!(params.stage_count(), stages, "order {order}");
        }
    }

    #[test]
    fn test_settings_serialization() {
        let settings = FilterSettings::Cut(HighCutLowCutParameters::lowcut(80.0, 4, SAMPLE_RATE));
        let toml_str = toml::to_string(&settings).unwrap();
        assert!(toml_str.contains("kind = \"cut\""));

        let parsed: FilterSettings = toml::from_str(&toml_str).unwrap();
        match parsed {
            FilterSettings::Cut(params) => {
                assert_eq!(params.order, 4);
                assert!(params.is_lowcut);
                assert_eq!(params.base.frequency, 80.0);
            }
            FilterSettings::Standard(_) => panic!("expected cut settings"),
        }
    }

    fn any_filter_type() -> impl Strategy<Value = FilterType> {
        prop::sample::select(FilterType::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_equal_freq_and_q_never_trigger(
            freq in 20.0f32..20000.0,
            q in 0.1f32..10.0,
            gain_a in -24.0f32..24.0,
            gain_b in -24.0f32..24.0,
            type_a in any_filter_type(),
            type_b in any_filter_type(),
        ) {
            let p = FilterParameters::new(type_a, freq, q, SAMPLE_RATE).with_gain(gain_a);
            let q_params = FilterParameters::new(type_b, freq, q, SAMPLE_RATE).with_gain(gain_b);
            prop_assert!(!needs_update(&p, &q_params));
        }

        #[test]
        fn prop_frequency_change_always_triggers(
            freq in 20.0f32..20000.0,
            delta in 1.0f32..100.0,
            q in 0.1f32..10.0,
        ) {
            let a = FilterParameters::new(FilterType::Notch, freq, q, SAMPLE_RATE);
            let b = FilterParameters::new(FilterType::Notch, freq + delta, q, SAMPLE_RATE);
            prop_assert!(needs_update(&b, &a));
        }
    }
}

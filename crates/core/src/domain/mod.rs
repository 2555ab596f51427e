//! Domain entities and business rules

pub mod biquad;
pub mod coefficients;
pub mod config;
pub mod error;
pub mod params;

// Re-export specific items to avoid ambiguous glob imports
pub use biquad::{CascadeState, StageState};
pub use coefficients::{
    design, make_coefficients, make_cut_coefficients, CoefficientSet, StageCoefficients,
};
pub use config::{CascadeConfig, ConfigError, ConfigManager, EngineConfig};
pub use error::FilterError;
pub use params::{
    limits, needs_update, parameter_id, FilterParameters, FilterParametersBase, FilterSettings,
    FilterType, HighCutLowCutParameters, ParamKind,
};

//! Integration tests for configuration driving the equalizer
//!
//! A TOML file on disk becomes engine settings and initial slot snapshots,
//! which must build a working equalizer.

use cascade_core::domain::{
    design, CascadeConfig, ConfigManager, FilterSettings, FilterType, HighCutLowCutParameters,
};
use cascade_infra::audio::{equalizer, ProcessSpec};
use tempfile::TempDir;

const EQ_TOML: &str = r#"
[engine]
sample_rate = 44100.0
block_size = 128
channels = 2
stage_capacity = 4

[[slots]]
kind = "cut"
frequency = 80.0
order = 4
is_lowcut = true

[[slots]]
kind = "standard"
frequency = 2500.0
quality = 0.8
filter_type = "Peak"
gain_in_decibels = -4.5

[[slots]]
kind = "cut"
frequency = 12000.0
order = 3
is_lowcut = false
bypassed = true
"#;

#[tokio::test]
async fn test_config_file_builds_equalizer() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("eq.toml");
    tokio::fs::write(&path, EQ_TOML).await.unwrap();

    let config = CascadeConfig::load_from_file(&path).await.unwrap();
    let settings = config.initial_settings();
    assert_eq!(settings.len(), 3);
    assert!(settings.iter().all(|s| s.base().sample_rate == 44100.0));
    assert!(matches!(
        settings[1],
        FilterSettings::Standard(p) if p.filter_type == FilterType::Peak
    ));

    let (mut controller, mut processor) = equalizer(&config.engine, settings.len()).unwrap();
    controller.apply_all(&settings).unwrap();
    processor
        .prepare(ProcessSpec {
            sample_rate: config.engine.sample_rate,
            maximum_block_size: config.engine.block_size,
            num_channels: config.engine.channels,
        })
        .unwrap();

    assert_eq!(processor.num_slots(), 3);
    assert!(controller.slot(2).unwrap().is_bypassed());
    assert_eq!(
        controller.slot(0).unwrap().coefficients(1).unwrap().len(),
        2
    );

    let mut left = vec![0.25; 128];
    let mut right = vec![-0.25; 128];
    processor.process(&mut [left.as_mut_slice(), right.as_mut_slice()]);
    assert!(left.iter().chain(&right).all(|s| s.is_finite()));
}

#[tokio::test]
async fn test_invalid_file_falls_back_through_manager() {
    let temp_dir = TempDir::new().unwrap();
    let manager = ConfigManager::new(temp_dir.path().to_path_buf());

    // Nyquist at 8 kHz makes the 12 kHz cut invalid
    let invalid = EQ_TOML.replace("sample_rate = 44100.0", "sample_rate = 16000.0");
    tokio::fs::write(manager.config_path(), invalid).await.unwrap();

    assert!(CascadeConfig::load_from_file(manager.config_path()).await.is_err());
    let config = manager.load().await;
    assert_eq!(config.slots.len(), 1);
}

#[tokio::test]
async fn test_saved_config_designs_identically() {
    let temp_dir = TempDir::new().unwrap();
    let manager = ConfigManager::new(temp_dir.path().to_path_buf());

    let mut config = CascadeConfig::default();
    config
        .slots
        .push(HighCutLowCutParameters::highcut(8000.0, 5, 48000.0).into());
    manager.save(&config).await.unwrap();

    let loaded = manager.load().await;
    for (saved, restored) in config.initial_settings().iter().zip(loaded.initial_settings()) {
        assert_eq!(design(saved).unwrap(), design(&restored).unwrap());
    }
}

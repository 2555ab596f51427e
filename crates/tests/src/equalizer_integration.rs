//! Integration tests for the filter pipeline
//!
//! Parameter snapshots go in on the control side, coefficients cross to the
//! audio side, and processed blocks come out. Designs are checked against
//! independently computed reference filters.

use cascade_core::domain::{
    make_coefficients, make_cut_coefficients, needs_update, CoefficientSet, EngineConfig,
    FilterParameters, FilterSettings, FilterType, HighCutLowCutParameters,
};
use cascade_infra::audio::{
    equalizer, filter_chain, BlockTap, ChannelRegion, DrainReport, LockFreeChannel, ParameterQueue,
    ProcessSpec, SlotUpdate, UpdateOutcome,
};
use cascade_infra::ProcessorError;
use proptest::prelude::*;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn spec(sample_rate: f64, channels: usize) -> ProcessSpec {
    ProcessSpec {
        sample_rate,
        maximum_block_size: 1024,
        num_channels: channels,
    }
}

fn impulse(len: usize) -> Vec<f32> {
    let mut buffer = vec![0.0; len];
    buffer[0] = 1.0;
    buffer
}

fn sine(frequency: f64, sample_rate: f64, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| (2.0 * PI * frequency * i as f64 / sample_rate).sin() as f32)
        .collect()
}

fn peak_level(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0, |peak, s| peak.max(s.abs()))
}

/// Direct Form I reference in double precision
fn reference_biquad(b: [f64; 3], a: [f64; 3], input: &[f32]) -> Vec<f64> {
    let (mut x1, mut x2, mut y1, mut y2) = (0.0, 0.0, 0.0, 0.0);
    input
        .iter()
        .map(|&x| {
            let x = f64::from(x);
            let y = (b[0] * x + b[1] * x1 + b[2] * x2 - a[1] * y1 - a[2] * y2) / a[0];
            x2 = x1;
            x1 = x;
            y2 = y1;
            y1 = y;
            y
        })
        .collect()
}

// ============================================================================
// END-TO-END SCENARIOS
// ============================================================================

#[test]
fn test_lowpass_impulse_response() {
    let params = FilterParameters::new(FilterType::LowPass, 1000.0, 1.0, 44100.0);
    let cascade = make_coefficients(&params).unwrap();
    assert_eq!(cascade.len(), 1);

    let (mut handle, mut chain) = filter_chain(1, 2).unwrap();
    chain.prepare(spec(44100.0, 1));
    handle.set_coefficients(Arc::new(cascade)).unwrap();

    let mut response = impulse(1024);
    chain.process(&mut response);

    // Bilinear low pass: prewarped corner, unit DC gain, |H(fc)| = Q
    let n = 1.0 / (PI * 1000.0 / 44100.0).tan();
    let q = 1.0;
    let c1 = 1.0 / (1.0 + n / q + n * n);
    let expected = reference_biquad(
        [c1, 2.0 * c1, c1],
        [1.0, 2.0 * c1 * (1.0 - n * n), c1 * (1.0 - n / q + n * n)],
        &impulse(1024),
    );

    for (got, want) in response.iter().zip(&expected) {
        assert!((f64::from(*got) - want).abs() < 1e-5, "got {got}, want {want}");
    }

    let dc: f32 = response.iter().sum();
    assert!((dc - 1.0).abs() < 1e-3);
}

#[test]
fn test_fourth_order_lowcut() {
    let params = HighCutLowCutParameters::lowcut(500.0, 4, 48000.0);
    let cascade = make_cut_coefficients(&params).unwrap();

    assert_eq!(cascade.len(), 2);
    assert!(cascade.stages().iter().all(|stage| !stage.is_first_order()));

    // Maximally flat: -3 dB at the corner, 24 dB per octave below it
    let response = cascade.magnitude_response(&[500.0, 50.0, 10000.0], 48000.0);
    assert!((response[0] + 3.01).abs() < 0.05, "corner at {} dB", response[0]);
    assert!(response[1] < -70.0);
    assert!(response[2].abs() < 0.05);

    // The same holds for signal pushed through a chain
    let (mut handle, mut chain) = filter_chain(2, 2).unwrap();
    chain.prepare(spec(48000.0, 1));
    handle.set_coefficients(Arc::new(cascade)).unwrap();

    let mut low = sine(50.0, 48000.0, 48000);
    for block in low.chunks_mut(1024) {
        chain.process(block);
    }
    assert!(peak_level(&low[40000..]) < 0.001);
}

#[test]
fn test_channel_wraparound_scenario() {
    let (mut tx, mut rx) = LockFreeChannel::<u32>::new(4).unwrap().split();

    let mut chunk = tx.request_write(3);
    assert_eq!(chunk.len(), 3);
    chunk.slices_mut().0.copy_from_slice(&[1, 2, 3]);
    chunk.finish();

    let chunk = rx.request_read(2);
    assert_eq!(chunk.slices().0, &[1, 2]);
    chunk.finish();

    let mut chunk = tx.request_write(3);
    assert_eq!(
        chunk.region(),
        ChannelRegion {
            start1: 3,
            len1: 1,
            start2: 0,
            len2: 2
        }
    );
    let (first, second) = chunk.slices_mut();
    first.copy_from_slice(&[4]);
    second.copy_from_slice(&[5, 6]);
    chunk.finish();

    assert_eq!(tx.free_space(), 0);
    assert!(tx.request_write(1).is_empty());

    let chunk = rx.request_read(8);
    let (first, second) = chunk.slices();
    let values: Vec<u32> = first.iter().chain(second).copied().collect();
    assert_eq!(values, vec![3, 4, 5, 6]);
    chunk.finish();
}

// ============================================================================
// CHAIN PROPERTIES
// ============================================================================

#[test]
fn test_set_coefficients_is_idempotent() {
    let cascade = Arc::new(
        make_cut_coefficients(&HighCutLowCutParameters::highcut(3000.0, 5, 48000.0)).unwrap(),
    );
    let input = sine(5000.0, 48000.0, 512);

    let run = |times: usize| {
        let (mut handle, mut chain) = filter_chain(3, 4).unwrap();
        chain.prepare(spec(48000.0, 1));
        for _ in 0..times {
            handle.set_coefficients(Arc::clone(&cascade)).unwrap();
        }
        let mut output = input.clone();
        chain.process(&mut output);
        output
    };

    assert_eq!(run(1), run(2));
}

#[test]
fn test_rejected_update_keeps_sound() {
    let engine = EngineConfig {
        channels: 1,
        ..EngineConfig::default()
    };
    let (mut controller, mut processor) = equalizer(&engine, 1).unwrap();
    processor.prepare(spec(engine.sample_rate, 1)).unwrap();

    let good = FilterParameters::new(FilterType::HighPass, 2000.0, 0.7, engine.sample_rate);
    controller.update(&SlotUpdate::new(0, good)).unwrap();
    let before = Arc::clone(controller.slot(0).unwrap().coefficients(0).unwrap());

    let bad = FilterParameters::new(FilterType::HighPass, 30000.0, 0.7, engine.sample_rate);
    assert!(matches!(
        controller.update(&SlotUpdate::new(0, bad)),
        Err(ProcessorError::Filter(_))
    ));
    assert!(Arc::ptr_eq(&before, controller.slot(0).unwrap().coefficients(0).unwrap()));

    // A 100 Hz tone is still removed by the 2 kHz high pass
    let mut block = sine(100.0, engine.sample_rate, 1024);
    processor.process(&mut [block.as_mut_slice()]);
    let mut block = sine(100.0, engine.sample_rate, 1024);
    processor.process(&mut [block.as_mut_slice()]);
    assert!(peak_level(&block[512..]) < 0.02);
}

#[test]
fn test_type_change_alone_does_not_rebuild() {
    let engine = EngineConfig {
        channels: 2,
        ..EngineConfig::default()
    };
    let (mut controller, _processor) = equalizer(&engine, 1).unwrap();

    let low = FilterParameters::new(FilterType::LowPass, 1000.0, 1.0, engine.sample_rate);
    let high = FilterParameters { filter_type: FilterType::HighPass, ..low };

    assert_eq!(
        controller.update(&SlotUpdate::new(0, low)).unwrap(),
        UpdateOutcome::Rebuilt { stages: 1 }
    );
    assert_eq!(
        controller.update(&SlotUpdate::new(0, high)).unwrap(),
        UpdateOutcome::Unchanged
    );

    // Still the low-pass design
    let active = controller.slot(0).unwrap().coefficients(1).unwrap();
    assert_eq!(**active, make_coefficients(&low).unwrap());
}

// ============================================================================
// CONCURRENT OPERATION
// ============================================================================

#[test]
fn test_control_and_audio_threads() {
    let engine = EngineConfig {
        sample_rate: 48000.0,
        block_size: 256,
        channels: 2,
        ..EngineConfig::default()
    };
    let (mut controller, mut processor) = equalizer(&engine, 2).unwrap();
    processor.prepare(spec(engine.sample_rate, 2)).unwrap();
    let (tap, mut reader) = BlockTap::with_capacity(8, 256).unwrap();
    processor.attach_tap(tap);
    let (mut queue, mut receiver) = ParameterQueue::with_capacity(16).unwrap();

    let finished = Arc::new(AtomicBool::new(false));
    let audio_finished = Arc::clone(&finished);

    let audio = thread::spawn(move || {
        let mut left = vec![0.0_f32; 256];
        let mut right = vec![0.0_f32; 256];
        let mut seed = 1_u32;
        for _ in 0..2000 {
            for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                *l = (seed >> 8) as f32 / (1 << 24) as f32 - 0.5;
                *r = -*l;
            }
            processor.process(&mut [left.as_mut_slice(), right.as_mut_slice()]);
            assert!(left.iter().chain(&right).all(|s| s.is_finite()));
            thread::yield_now();
        }
        audio_finished.store(true, Ordering::Release);
        processor
    });

    let automation = thread::spawn(move || {
        for step in 0..100_u32 {
            let frequency = 100.0 + step as f32 * 50.0;
            let settings: FilterSettings = if step % 2 == 0 {
                FilterParameters::new(FilterType::Peak, frequency, 1.0, 48000.0)
                    .with_gain(6.0)
                    .into()
            } else {
                HighCutLowCutParameters::lowcut(frequency / 4.0, 1 + step % 8, 48000.0).into()
            };
            let update = SlotUpdate::new((step % 2) as usize, settings);
            while queue.push(update).is_err() {
                thread::yield_now();
            }
        }
    });

    let mut tapped = 0;
    let mut report = DrainReport::default();
    loop {
        report += controller.apply_pending(&mut receiver);
        tapped += reader.drain(|block| assert!(block.samples().len() <= 256));
        controller.collect_garbage();
        if finished.load(Ordering::Acquire) && automation.is_finished() {
            break;
        }
        thread::yield_now();
    }

    automation.join().unwrap();
    let mut processor = audio.join().unwrap();
    report += controller.apply_pending(&mut receiver);
    tapped += reader.drain(|_| {});

    assert_eq!(report.applied, 100);
    assert_eq!(report.rejected, 0);
    assert_eq!(tapped as u64 + processor.tap_dropped(), 2 * 2000);

    // One more block installs whatever was published last
    let mut left = vec![0.0; 16];
    let mut right = vec![0.0; 16];
    processor.process(&mut [left.as_mut_slice(), right.as_mut_slice()]);
    let last_peak = make_coefficients(
        &FilterParameters::new(FilterType::Peak, 100.0 + 98.0 * 50.0, 1.0, 48000.0).with_gain(6.0),
    )
    .unwrap();
    let last_cut = make_cut_coefficients(&HighCutLowCutParameters::lowcut(
        (100.0 + 99.0 * 50.0) / 4.0,
        1 + 99 % 8,
        48000.0,
    ))
    .unwrap();

    assert_eq!(**controller.slot(0).unwrap().coefficients(0).unwrap(), last_peak);
    for channel in 0..2 {
        assert_eq!(processor.active_coefficients(channel, 0), Some(&last_peak));
        assert_eq!(processor.active_coefficients(channel, 1), Some(&last_cut));
    }
}

// ============================================================================
// PROPERTIES
// ============================================================================

fn standard_type() -> impl Strategy<Value = FilterType> {
    prop::sample::select(FilterType::ALL.to_vec())
}

proptest! {
    #[test]
    fn prop_bypass_is_exact(
        input in prop::collection::vec(-1.0f32..1.0, 0..512),
        frequency in 20.0f32..20000.0,
        order in 1u32..=8,
    ) {
        let cascade = make_cut_coefficients(&HighCutLowCutParameters::highcut(frequency, order, 48000.0)).unwrap();
        let (mut handle, mut chain) = filter_chain(4, 2).unwrap();
        chain.prepare(spec(48000.0, 1));
        handle.set_coefficients(Arc::new(cascade)).unwrap();
        handle.set_bypassed(true);

        let mut output = input.clone();
        chain.process(&mut output);
        prop_assert_eq!(output, input);
    }

    #[test]
    fn prop_gain_and_type_do_not_trigger_rebuild(
        frequency in 20.0f32..20000.0,
        quality in 0.1f32..10.0,
        gain_a in -24.0f32..24.0,
        gain_b in -24.0f32..24.0,
        type_a in standard_type(),
        type_b in standard_type(),
    ) {
        let a = FilterParameters::new(type_a, frequency, quality, 48000.0).with_gain(gain_a);
        let b = FilterParameters::new(type_b, frequency, quality, 48000.0).with_gain(gain_b);
        prop_assert!(!needs_update(&a, &b));

        let cut_a = HighCutLowCutParameters::lowcut(frequency, 2, 48000.0);
        let cut_b = HighCutLowCutParameters::highcut(frequency, 7, 48000.0);
        prop_assert!(!needs_update(&cut_a, &cut_b));
    }

    #[test]
    fn prop_designs_are_deterministic(
        frequency in 20.0f32..20000.0,
        quality in 0.1f32..10.0,
        gain in -24.0f32..24.0,
        filter_type in standard_type(),
    ) {
        let params = FilterParameters::new(filter_type, frequency, quality, 48000.0).with_gain(gain);
        let first: CoefficientSet = make_coefficients(&params).unwrap();
        let second = make_coefficients(&params).unwrap();
        prop_assert_eq!(first, second);
    }
}

//! Simulated session: an audio thread runs the equalizer block by block while
//! the main thread plays the control role and an optional automation thread
//! sweeps slot 0.

use anyhow::Context;
use cascade_core::domain::CascadeConfig;
use cascade_infra::audio::{
    equalizer, AudioBlock, BlockTap, DrainReport, ParameterQueue, ProcessSpec, SlotUpdate,
};
use cascade_infra::ProcessorError;
use clap::ValueEnum;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Signal {
    Noise,
    Sine,
    Impulse,
}

pub struct RenderOptions {
    pub blocks: usize,
    pub signal: Signal,
    /// Start and end frequency for an automated sweep of slot 0
    pub sweep: Option<(f32, f32)>,
    pub steps: usize,
    /// Sleep one block duration between blocks
    pub paced: bool,
}

/// Test signal source; one per channel
struct Generator {
    signal: Signal,
    seed: u32,
    phase: f64,
    increment: f64,
    position: usize,
}

impl Generator {
    fn new(signal: Signal, channel: usize, sample_rate: f64) -> Self {
        Self {
            signal,
            seed: 0x9E37_79B9 ^ channel as u32,
            phase: 0.0,
            increment: 2.0 * std::f64::consts::PI * 440.0 / sample_rate,
            position: 0,
        }
    }

    fn fill(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = match self.signal {
                Signal::Noise => {
                    self.seed = self.seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                    ((self.seed >> 8) as f32 / (1 << 24) as f32 * 2.0 - 1.0) * 0.5
                }
                Signal::Sine => {
                    self.phase = (self.phase + self.increment) % (2.0 * std::f64::consts::PI);
                    (self.phase.sin() * 0.5) as f32
                }
                Signal::Impulse => {
                    if self.position == 0 {
                        1.0
                    } else {
                        0.0
                    }
                }
            };
            self.position += 1;
        }
    }
}

/// Levels observed through the tap
#[derive(Debug, Default)]
pub struct RenderStats {
    pub blocks: usize,
    pub tapped: usize,
    pub tap_dropped: u64,
    pub updates: DrainReport,
    pub queue_full: usize,
    pub peak: Vec<f32>,
    pub rms: Vec<f32>,
    pub elapsed: Duration,
}

impl RenderStats {
    fn observe(&mut self, block: &AudioBlock) {
        let channel = block.channel();
        if channel >= self.peak.len() {
            self.peak.resize(channel + 1, 0.0);
            self.rms.resize(channel + 1, 0.0);
        }
        self.peak[channel] = self.peak[channel].max(block.peak());
        self.rms[channel] = self.rms[channel].max(block.rms());
        self.tapped += 1;
    }

    pub fn print(&self) {
        println!("Processed {} blocks in {:.2?}", self.blocks, self.elapsed);
        println!(
            "Updates: {} applied, {} rebuilt, {} rejected, {} refused by a full queue",
            self.updates.applied, self.updates.rebuilt, self.updates.rejected, self.queue_full
        );
        println!("Tapped {} blocks ({} dropped)", self.tapped, self.tap_dropped);
        for (channel, (peak, rms)) in self.peak.iter().zip(&self.rms).enumerate() {
            println!("  channel {channel}: peak {peak:.4}  max block rms {rms:.4}");
        }
    }
}

fn sweep_frequency(from: f32, to: f32, step: usize, steps: usize) -> f32 {
    if steps < 2 {
        return to;
    }
    let t = step as f32 / (steps - 1) as f32;
    from * (to / from).powf(t)
}

pub fn render(config: &CascadeConfig, options: &RenderOptions) -> anyhow::Result<RenderStats> {
    let engine = &config.engine;
    let settings = config.initial_settings();

    let (mut controller, mut processor) = equalizer(engine, settings.len())?;
    controller
        .apply_all(&settings)
        .context("applying configured slots")?;
    processor.prepare(ProcessSpec {
        sample_rate: engine.sample_rate,
        maximum_block_size: engine.block_size,
        num_channels: engine.channels,
    })?;

    let (tap, mut reader) = BlockTap::with_capacity(engine.tap_capacity, engine.block_size)?;
    processor.attach_tap(tap);
    let (mut queue, mut receiver) = ParameterQueue::with_capacity(engine.parameter_queue_capacity)?;

    let block_duration = Duration::from_secs_f64(engine.block_size as f64 / engine.sample_rate);
    let finished = AtomicBool::new(false);
    let started = Instant::now();
    let mut stats = RenderStats {
        blocks: options.blocks,
        ..RenderStats::default()
    };

    let (tap_dropped, queue_full) = thread::scope(|scope| {
        let audio = scope.spawn(|| {
            let mut buffers = vec![vec![0.0_f32; engine.block_size]; engine.channels];
            let mut generators: Vec<Generator> = (0..engine.channels)
                .map(|channel| Generator::new(options.signal, channel, engine.sample_rate))
                .collect();
            let mut channels: Vec<&mut [f32]> =
                buffers.iter_mut().map(Vec::as_mut_slice).collect();

            for _ in 0..options.blocks {
                for (buffer, generator) in channels.iter_mut().zip(&mut generators) {
                    generator.fill(buffer);
                }
                processor.process(&mut channels);
                if options.paced {
                    thread::sleep(block_duration);
                }
            }

            finished.store(true, Ordering::Release);
            processor.tap_dropped()
        });

        let automation = options.sweep.map(|(from, to)| {
            let initial = settings.first().copied().unwrap_or_default();
            let finished = &finished;
            let queue = &mut queue;
            scope.spawn(move || {
                let mut refused = 0;
                for step in 0..options.steps {
                    let frequency = sweep_frequency(from, to, step, options.steps);
                    let update = SlotUpdate::new(0, initial.with_frequency(frequency));
                    while let Err(ProcessorError::QueueFull) = queue.push(update) {
                        refused += 1;
                        if finished.load(Ordering::Acquire) {
                            return refused;
                        }
                        thread::sleep(Duration::from_millis(1));
                    }
                    thread::sleep(block_duration);
                }
                refused
            })
        });

        while !finished.load(Ordering::Acquire) {
            stats.updates += controller.apply_pending(&mut receiver);
            reader.drain(|block| stats.observe(block));
            controller.collect_garbage();
            thread::sleep(Duration::from_millis(1));
        }

        let queue_full = match automation {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow::anyhow!("automation thread panicked"))?,
            None => 0,
        };
        let tap_dropped = audio
            .join()
            .map_err(|_| anyhow::anyhow!("audio thread panicked"))?;
        anyhow::Ok((tap_dropped, queue_full))
    })?;

    stats.updates += controller.apply_pending(&mut receiver);
    reader.drain(|block| stats.observe(block));
    let collected = controller.collect_garbage();
    debug!(collected, "Released retired cascades");

    stats.tap_dropped = tap_dropped;
    stats.queue_full = queue_full;
    stats.elapsed = started.elapsed();

    info!(
        blocks = stats.blocks,
        rebuilt = stats.updates.rebuilt,
        tapped = stats.tapped,
        "Render finished"
    );
    Ok(stats)
}

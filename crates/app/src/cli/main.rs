//! Cascade CLI Application

mod render;

use anyhow::Context;
use cascade_core::domain::{
    design, limits, CascadeConfig, CoefficientSet, ConfigManager, FilterParameters, FilterSettings,
    FilterType, HighCutLowCutParameters,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use render::{RenderOptions, Signal};

#[derive(Parser)]
#[command(name = "cascade", version)]
#[command(about = "Parametric filter cascades with a lock-free real-time core", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the filter type labels
    Types,

    /// Print the coefficients of one design as JSON
    Design(FilterArgs),

    /// Print the magnitude response of one design
    Response {
        #[command(flatten)]
        filter: FilterArgs,

        /// Number of log-spaced frequencies between 20 Hz and 20 kHz
        #[arg(long, default_value_t = 32)]
        points: usize,
    },

    /// Run the configured equalizer on separate control and audio threads
    Render {
        /// Blocks to process
        #[arg(long, default_value_t = 200)]
        blocks: usize,

        /// Test signal fed to every channel
        #[arg(long, value_enum, default_value_t = Signal::Noise)]
        signal: Signal,

        /// Sweep slot 0 from this frequency...
        #[arg(long, requires = "sweep_to")]
        sweep_from: Option<f32>,

        /// ...to this frequency
        #[arg(long, requires = "sweep_from")]
        sweep_to: Option<f32>,

        /// Parameter updates in the sweep
        #[arg(long, default_value_t = 32)]
        steps: usize,

        /// Process as fast as possible instead of at the block rate
        #[arg(long)]
        fast: bool,
    },

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// Filter type label, e.g. "Peak" or "FirstOrder LowPass"
    #[arg(long = "type", value_name = "LABEL", default_value = "Peak")]
    filter_type: FilterType,

    /// Corner or centre frequency in Hz
    #[arg(long, default_value_t = 1000.0)]
    frequency: f32,

    #[arg(long, default_value_t = limits::Q_DEFAULT)]
    quality: f32,

    /// Gain in dB for shelf and peak types
    #[arg(long, default_value_t = limits::GAIN_DB_DEFAULT, allow_hyphen_values = true)]
    gain: f32,

    /// Design a Butterworth cut of this order instead of a single stage
    #[arg(long)]
    order: Option<u32>,

    /// With --order: cut the highs instead of the lows
    #[arg(long, requires = "order")]
    highcut: bool,

    /// Sample rate in Hz (defaults to the configured engine rate)
    #[arg(long)]
    sample_rate: Option<f64>,
}

impl FilterArgs {
    fn settings(&self, default_sample_rate: f64) -> FilterSettings {
        let sample_rate = self.sample_rate.unwrap_or(default_sample_rate);
        match self.order {
            Some(order) if self.highcut => {
                HighCutLowCutParameters::highcut(self.frequency, order, sample_rate).into()
            }
            Some(order) => HighCutLowCutParameters::lowcut(self.frequency, order, sample_rate).into(),
            None => FilterParameters::new(self.filter_type, self.frequency, self.quality, sample_rate)
                .with_gain(self.gain)
                .into(),
        }
    }
}

#[derive(Serialize)]
struct DesignReport<'a> {
    settings: &'a FilterSettings,
    stages: usize,
    coefficients: &'a CoefficientSet,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn load_config(path: Option<&Path>) -> anyhow::Result<CascadeConfig> {
    if let Some(path) = path {
        return CascadeConfig::load_from_file(path)
            .await
            .with_context(|| format!("loading {}", path.display()));
    }

    match ConfigManager::default_config_dir() {
        Ok(dir) => Ok(ConfigManager::new(dir).load().await),
        Err(e) => {
            warn!(error = %e, "No config directory, using defaults");
            Ok(CascadeConfig::default())
        }
    }
}

fn log_spaced(points: usize) -> Vec<f64> {
    let (low, high) = (f64::from(limits::FREQ_MIN), f64::from(limits::FREQ_MAX));
    if points < 2 {
        return vec![low];
    }
    (0..points)
        .map(|i| low * (high / low).powf(i as f64 / (points - 1) as f64))
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Types => {
            for filter_type in FilterType::ALL {
                println!("{:>2}  {filter_type}", filter_type.code());
            }
        }

        Command::Design(args) => {
            let config = load_config(cli.config.as_deref()).await?;
            let settings = args.settings(config.engine.sample_rate);
            let cascade = design(&settings)?;

            let report = DesignReport {
                settings: &settings,
                stages: cascade.len(),
                coefficients: &cascade,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Response { filter, points } => {
            let config = load_config(cli.config.as_deref()).await?;
            let settings = filter.settings(config.engine.sample_rate);
            let cascade = design(&settings)?;

            let frequencies = log_spaced(points);
            let response = cascade.magnitude_response(&frequencies, settings.base().sample_rate);
            for (frequency, db) in frequencies.iter().zip(response) {
                println!("{frequency:>10.1} Hz  {db:>8.2} dB");
            }
        }

        Command::Render {
            blocks,
            signal,
            sweep_from,
            sweep_to,
            steps,
            fast,
        } => {
            let config = load_config(cli.config.as_deref()).await?;
            config.validate()?;

            let options = RenderOptions {
                blocks,
                signal,
                sweep: sweep_from.zip(sweep_to),
                steps,
                paced: !fast,
            };

            info!(
                blocks,
                slots = config.slots.len(),
                channels = config.engine.channels,
                "Starting render"
            );
            let stats = tokio::task::spawn_blocking(move || render::render(&config, &options))
                .await??;
            stats.print();
        }

        Command::Init { force } => {
            let path = match cli.config {
                Some(path) => path,
                None => ConfigManager::new(ConfigManager::default_config_dir()?)
                    .config_path()
                    .to_path_buf(),
            };
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }

            CascadeConfig::default().save_to_file(&path).await?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}

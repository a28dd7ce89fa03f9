use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;

use mocapclean::config::{CorrectionConfig, CorrectionMethod, WindowUnit};
use mocapclean::interpolation::InterpolationKind;
use mocapclean::pipeline::CorrectionPipeline;
use mocapclean::storage::JsonSequenceFile;

#[derive(Parser, Debug)]
#[command(author, version, about = "Remove tracking jitter from motion-capture recordings", long_about = None)]
struct Args {
    /// Recording to correct (JSON)
    #[arg(short, long)]
    input: PathBuf,

    /// Where to write the corrected recording
    #[arg(short, long)]
    output: PathBuf,

    /// JSON config file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Velocity threshold in m/s
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Lookahead window length
    #[arg(short, long)]
    window: Option<f64>,

    /// Unit of --window: poses, ms or s
    #[arg(long)]
    window_unit: Option<WindowUnit>,

    /// old, default, or an interpolation kind (linear, quadratic, cubic, pchip, akima,
    /// nearest, nearest-up, previous, next, take)
    #[arg(short, long)]
    method: Option<CorrectionMethod>,

    /// Also rebuild (0, 0, 0) samples, optionally with the given spline kind
    #[arg(long, num_args = 0..=1, default_missing_value = "cubic")]
    correct_zeros: Option<InterpolationKind>,

    /// Correct joints on parallel threads
    #[arg(long, default_value_t = false)]
    parallel: bool,

    /// Write the correction report (JSON)
    #[arg(long)]
    report: Option<PathBuf>,

    /// 0 = warnings only, 1 = summaries, 2 = every flagged frame
    #[arg(short, long, default_value_t = 1)]
    verbosity: u8,
}

impl Args {
    fn resolve_config(&self) -> Result<CorrectionConfig> {
        let mut config = match &self.config {
            Some(path) => CorrectionConfig::from_json_file(path)?,
            None => CorrectionConfig::default(),
        };

        if let Some(threshold) = self.threshold {
            config.jitter.velocity_threshold = threshold;
        }
        if let Some(window) = self.window {
            config.jitter.window = window;
        }
        if let Some(unit) = self.window_unit {
            config.jitter.window_unit = unit;
        }
        if let Some(method) = self.method {
            config.jitter.method = method;
        }
        if let Some(kind) = self.correct_zeros {
            config.zeros.enabled = true;
            config.zeros.spline_kind = kind;
        }
        if self.parallel {
            config.jitter.parallel = true;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::builder()
        .format_timestamp(None)
        .filter_level(level)
        .init();

    let config = match args.resolve_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            std::process::exit(2);
        }
    };

    if args.input == args.output {
        return Err(anyhow!("Refusing to overwrite the input recording {}", args.input.display()));
    }

    let source = JsonSequenceFile::new(&args.input);
    let sink = JsonSequenceFile::new(&args.output);
    let mut pipeline = CorrectionPipeline::new(source, sink, config);

    let report = pipeline.run()?;

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    info!("Done.");
    Ok(())
}

use std::path::PathBuf;
use std::process;

use catalog::CatalogConfig;
use clap::{Parser, Subcommand, ValueEnum};
use layers::backend::BackendKind;
use temporal::axis::build_axis;
use tools::{PlayOptions, describe_axis, simulate_playback};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Time-dynamic imagery tools")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the discrete time axis for a start/stop[/period] extent
    Axis {
        #[arg(long)]
        start: String,

        #[arg(long)]
        stop: String,

        /// ISO 8601 period (e.g. P1D); derived from the span when omitted
        #[arg(long)]
        period: Option<String>,

        /// Sample cap (defaults to ATLAS_MAX_REFRESH_INTERVALS or 1000)
        #[arg(long)]
        max: Option<usize>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Simulate clock-driven playback of one catalog entry
    Play {
        /// Catalog JSON file
        catalog: PathBuf,

        /// Entry id within the catalog
        #[arg(long)]
        entry: String,

        #[arg(long, default_value_t = 10)]
        ticks: u32,

        /// Host milliseconds per tick, before the clock multiplier
        #[arg(long, default_value_t = 1000)]
        step_ms: i64,

        /// Play backwards
        #[arg(long)]
        reverse: bool,

        /// Override the catalog's backend
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum BackendArg {
    Globe,
    FlatMap,
}

impl From<BackendArg> for BackendKind {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::Globe => BackendKind::Globe,
            BackendArg::FlatMap => BackendKind::FlatMap,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = real_main() {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn real_main() -> Result<(), String> {
    let args = Args::parse();
    match args.command {
        Command::Axis {
            start,
            stop,
            period,
            max,
            json,
        } => cmd_axis(&start, &stop, period.as_deref(), max, json),
        Command::Play {
            catalog,
            entry,
            ticks,
            step_ms,
            reverse,
            backend,
        } => {
            let mut config = CatalogConfig::from_path(&catalog).map_err(|e| e.to_string())?;
            config.apply_env_overrides();
            debug!(path = %catalog.display(), entries = config.entries.len(), "catalog read");

            let options = PlayOptions {
                entry,
                ticks,
                step_ms,
                reverse,
                backend: backend.map(BackendKind::from),
            };
            for line in simulate_playback(config, &options)? {
                println!("{line}");
            }
            Ok(())
        }
    }
}

fn cmd_axis(start: &str, stop: &str, period: Option<&str>, max: Option<usize>, json: bool) -> Result<(), String> {
    let max = match max {
        Some(max) => max,
        None => {
            let mut defaults = CatalogConfig::from_json_str("{}").map_err(|e| e.to_string())?;
            defaults.apply_env_overrides();
            defaults.max_refresh_intervals
        }
    };

    let build = build_axis(start, stop, period, max).map_err(|e| e.to_string())?;
    if json {
        let tags: Vec<String> = build
            .axis
            .as_ref()
            .map(|a| a.tags().map(|t| t.to_string()).collect())
            .unwrap_or_default();
        let warnings: Vec<String> = build.warnings.iter().map(|w| w.to_string()).collect();
        let out = serde_json::json!({
            "time_varying": build.axis.is_some(),
            "period": build.axis.as_ref().and_then(|a| a.period()).map(|p| p.to_string()),
            "truncated": build.axis.as_ref().is_some_and(|a| a.truncated()),
            "tags": tags,
            "warnings": warnings,
        });
        let text = serde_json::to_string_pretty(&out).map_err(|e| e.to_string())?;
        println!("{text}");
    } else {
        for line in describe_axis(&build) {
            println!("{line}");
        }
    }
    Ok(())
}

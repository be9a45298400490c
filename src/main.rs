use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use meterguard::config::{LoggingConfig, MeterguardConfig};
use meterguard::ratelimit::RateLimiter;
use meterguard::replay;

/// Sliding-window admission control for metered upstream APIs.
#[derive(Debug, Parser)]
#[command(name = "meterguard", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a trace of arrival times through a fresh limiter
    Replay {
        /// Trace file, or `-` for stdin
        #[arg(short, long, default_value = "-")]
        input: String,

        /// Use this upstream's limits instead of the defaults
        #[arg(short, long)]
        upstream: Option<String>,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Configuration decides the final log format, so loading logs through a
    // plain stderr subscriber until it is known.
    let bootstrap = bootstrap_subscriber(default_filter("info"), io::stderr);
    let config = tracing::subscriber::with_default(bootstrap, || {
        MeterguardConfig::load(cli.config.as_deref())
    })
    .context("Failed to load configuration")?;
    init_tracing(&config.logging);

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Replay { input, upstream } => run_replay(&config, &input, upstream.as_deref()),
        Command::Config => {
            print!("{}", config.to_yaml()?);
            Ok(())
        }
    }
}

/// `RUST_LOG` if set, otherwise `level`.
fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Plain-text subscriber used while the configuration is being loaded.
fn bootstrap_subscriber<W>(filter: EnvFilter, writer: W) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(writer)
        .finish()
}

/// Initialize tracing; `RUST_LOG` overrides the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = default_filter(&logging.level);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run_replay(config: &MeterguardConfig, input: &str, upstream: Option<&str>) -> anyhow::Result<()> {
    let limits = match upstream {
        Some(name) => config.limits_for(name),
        None => &config.limiter,
    };
    let mut limiter = RateLimiter::from_config(limits)?;
    info!(
        upstream = upstream.unwrap_or("default"),
        short_window_limit = limits.short_window_limit,
        long_window_limit = limits.long_window_limit,
        "Replaying trace"
    );

    let reader: Box<dyn BufRead> = if input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(input).with_context(|| format!("Failed to open trace '{}'", input))?;
        Box::new(BufReader::new(file))
    };
    let trace = replay::read_trace(reader)?;

    let (records, _summary) = replay::replay(&mut limiter, &trace);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for record in &records {
        serde_json::to_writer(&mut out, record)?;
        writeln!(out)?;
    }
    Ok(())
}

//! CLI entry point for netmon.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use netmon_core::Settings;
use tracing::{debug, info};

mod app_config;
mod cli;
mod commands;

use app_config::{FileConfig, load_default_file_config};
use cli::{Args, Command};
use commands::RunContext;

const DEFAULT_OUTPUT_DIR: &str = ".";

/// Default log level.
///
/// Priority: `RUST_LOG` > quiet flag > verbose flag > config verbosity > info.
fn default_level(args: &Args, config: Option<&FileConfig>) -> &'static str {
    if args.quiet {
        return "error";
    }
    match args.verbose {
        0 => config
            .and_then(|cfg| cfg.verbosity)
            .map_or("info", app_config::VerbositySetting::level),
        1 => "debug",
        _ => "trace",
    }
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    let config = load_default_file_config()?;

    init_tracing(default_level(&args, config.as_ref()));
    debug!(?args, "CLI arguments parsed");

    let mut settings = Settings::default();
    if let Some(cfg) = &config {
        cfg.apply_to(&mut settings);
    }
    let output_dir = config
        .as_ref()
        .and_then(|cfg| cfg.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

    match args.command {
        Command::Replay(replay) => commands::run_replay_command(replay).await,
        Command::Hls(hls) => {
            info!(url = %hls.url, "netmon starting");
            let ctx = RunContext::prepare(settings, output_dir, args.quiet).await?;
            commands::run_hls_command(&ctx, hls).await
        }
        Command::Get(get) => {
            info!(url = %get.url, "netmon starting");
            let ctx = RunContext::prepare(settings, output_dir, args.quiet).await?;
            commands::run_get_command(&ctx, get).await
        }
    }
}

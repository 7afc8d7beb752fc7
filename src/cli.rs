//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use netmon_core::settings::{MAX_CONCURRENCY, MIN_CONCURRENCY};

/// Capture browser traffic and save the media it carries.
///
/// netmon reassembles HLS streams from their segments, downloads single
/// resources chunk by chunk and replays recorded lifecycle events through the
/// request table.
#[derive(Parser, Debug)]
#[command(name = "netmon")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download an HLS stream and reassemble its segments
    Hls(HlsArgs),
    /// Download a single resource chunk by chunk
    Get(GetArgs),
    /// Feed recorded JSON-lines lifecycle events through the request table
    Replay(ReplayArgs),
}

/// Request headers shared by the download commands.
#[derive(ClapArgs, Debug, Default)]
pub struct RequestArgs {
    /// Extra request header, `Name: value` (repeatable)
    #[arg(short = 'H', long = "header", value_name = "HEADER", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Origin to send, replacing any the client would set
    #[arg(long)]
    pub origin: Option<String>,

    /// Referer to send, replacing any the client would set
    #[arg(long)]
    pub referer: Option<String>,

    /// Directory the finished files are saved to
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct HlsArgs {
    /// Manifest URL
    pub url: String,

    #[command(flatten)]
    pub request: RequestArgs,

    /// Variant to download from a master playlist (as listed)
    #[arg(long)]
    pub variant: Option<usize>,

    /// Maximum concurrent segment fetches
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(MIN_CONCURRENCY as i64..=MAX_CONCURRENCY as i64))]
    pub concurrency: Option<u8>,

    /// Skip the .json metadata sidecar
    #[arg(long)]
    pub no_sidecar: bool,

    /// Title used in log messages
    #[arg(long, default_value = "stream")]
    pub title: String,
}

#[derive(ClapArgs, Debug)]
pub struct GetArgs {
    /// Resource URL
    pub url: String,

    #[command(flatten)]
    pub request: RequestArgs,
}

#[derive(ClapArgs, Debug)]
pub struct ReplayArgs {
    /// JSON-lines event file, or `-` for stdin
    pub input: String,

    /// Kinds to show, comma separated (e.g. `media,streaming`)
    #[arg(long)]
    pub kinds: Option<String>,

    /// Show only rows from this tab
    #[arg(long)]
    pub tab: Option<i64>,

    /// Print each row as a curl command instead of a table line
    #[arg(long)]
    pub curl: bool,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected `Name: value`, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in '{raw}'"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

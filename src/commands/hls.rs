use std::sync::Arc;

use anyhow::{Context, Result, bail};
use netmon_core::fetch::{ConcurrentFetcher, FetchError, HlsDownloader, HlsOutcome, LinearBackoff, Progress};
use tracing::{info, warn};

use super::{RunContext, cancel_on_ctrl_c};
use crate::cli::HlsArgs;

const BAR_TEMPLATE: &str = "{spinner} [{bar:40}] {pos}/{len} segments ({elapsed})";

pub async fn run_hls_command(ctx: &RunContext, args: HlsArgs) -> Result<()> {
    let concurrency = args
        .concurrency
        .map_or(ctx.settings.max_concurrency, usize::from);
    let fetcher = ConcurrentFetcher::new(concurrency, LinearBackoff::default())?;
    let downloader = HlsDownloader::new(
        Arc::new(ctx.client()),
        ctx.store(),
        ctx.save_target(args.request.output_dir.as_ref()),
        ctx.session.clone(),
    )
    .with_fetcher(fetcher)
    .with_sidecar(ctx.settings.sidecar && !args.no_sidecar);

    let options = ctx.fetch_options(&args.request);
    let cancel = cancel_on_ctrl_c();
    let bar = ctx.progress_bar(BAR_TEMPLATE);
    let progress_bar = bar.clone();
    let progress = move |tick: Progress| {
        let bar = &progress_bar;
        if let Progress::Segments { done, total } = tick {
            bar.set_length(total as u64);
            bar.set_position(done as u64);
        }
    };

    let outcome = downloader
        .download(&args.title, &args.url, &options, args.variant, &cancel, &progress)
        .await;
    bar.finish_and_clear();

    match outcome {
        Ok(HlsOutcome::Saved(saved)) => {
            println!("Saved {} ({} segments, {} bytes)", saved.media.display(), saved.segments, saved.bytes);
            if let Some(sidecar) = saved.sidecar {
                println!("Metadata {}", sidecar.display());
            }
            Ok(())
        }
        Ok(HlsOutcome::NeedsVariant(variants)) => {
            println!("{} is a master playlist; pick one with --variant:", args.url);
            for (index, variant) in variants.iter().enumerate() {
                println!("  [{index}] {} {}", variant.descriptor, variant.url);
            }
            Ok(())
        }
        Ok(HlsOutcome::Cancelled) => {
            warn!(title = %args.title, "download cancelled, nothing saved");
            Ok(())
        }
        Err(FetchError::ManifestUnavailable { status, .. }) => {
            bail!("failed to download -- {} (manifest status {status})", args.title)
        }
        Err(e) => {
            info!(title = %args.title, error = %e, "download failed");
            Err(e).with_context(|| format!("failed to download -- {}", args.title))
        }
    }
}

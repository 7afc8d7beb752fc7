use anyhow::Result;
use netmon_core::fetch::{ChunkedDownloader, ChunkedOutcome, Progress, TempArtifact};
use netmon_core::store::{FileStore, SaveTarget};
use tracing::{error, info, warn};

use super::{RunContext, cancel_on_ctrl_c};
use crate::cli::GetArgs;

const BAR_TEMPLATE: &str = "{spinner} [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec})";

/// Downloads one resource. Failures are logged and the command still
/// succeeds.
pub async fn run_get_command(ctx: &RunContext, args: GetArgs) -> Result<()> {
    let store = ctx.store();
    let target = ctx.save_target(args.request.output_dir.as_ref());
    let downloader = ChunkedDownloader::new(ctx.client(), store.clone(), target.clone())
        .with_small_file_threshold(ctx.settings.small_file_threshold_bytes);

    let options = ctx.fetch_options(&args.request);
    let cancel = cancel_on_ctrl_c();
    let bar = ctx.progress_bar(BAR_TEMPLATE);
    let progress_bar = bar.clone();
    let progress = move |tick: Progress| {
        let bar = &progress_bar;
        if let Progress::Bytes { done, total } = tick {
            if let Some(total) = total {
                bar.set_length(total);
            }
            bar.set_position(done);
        }
    };

    let outcome = downloader.download(&args.url, &options, &cancel, &progress).await;
    bar.finish_and_clear();

    match outcome {
        Ok(ChunkedOutcome::Saved(path)) => println!("Saved {}", path.display()),
        Ok(ChunkedOutcome::Staged(artifact)) => save_staged(store.as_ref(), target.as_ref(), artifact).await,
        Ok(ChunkedOutcome::Cancelled(artifact)) => {
            warn!(bytes = artifact.size, "download cancelled");
            discard(store.as_ref(), artifact).await;
        }
        Err(e) => error!(url = %args.url, error = %e, "download failed"),
    }
    Ok(())
}

async fn save_staged(store: &dyn FileStore, target: &dyn SaveTarget, artifact: TempArtifact) {
    match artifact.save(store, target).await {
        Ok(path) => {
            info!(bytes = artifact.size, "staged download saved");
            println!("Saved {}", path.display());
        }
        Err(e) => error!(name = %artifact.suggested_name, error = %e, "save failed"),
    }
    discard(store, artifact).await;
}

async fn discard(store: &dyn FileStore, artifact: TempArtifact) {
    let name = artifact.store_name.clone();
    if let Err(e) = artifact.remove(store).await {
        warn!(%name, error = %e, "failed to remove temporary file");
    }
}

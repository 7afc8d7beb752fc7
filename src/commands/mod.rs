//! CLI command handlers.

mod get;
mod hls;
mod replay;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use netmon_core::capture::SessionToken;
use netmon_core::fetch::{CancelFlag, FetchOptions, HttpClient};
use netmon_core::store::{LocalFileStore, WORK_DIR};
use netmon_core::{DirectorySaveTarget, Settings};
use tracing::{debug, info};

use crate::cli::RequestArgs;

pub use get::run_get_command;
pub use hls::run_hls_command;
pub use replay::run_replay_command;

/// State shared by the download commands.
pub struct RunContext {
    pub settings: Settings,
    pub session: SessionToken,
    pub output_dir: PathBuf,
    pub quiet: bool,
    store: Arc<LocalFileStore>,
}

impl RunContext {
    /// Builds the context and resets the work directory left by earlier runs.
    pub async fn prepare(settings: Settings, output_dir: PathBuf, quiet: bool) -> Result<Self> {
        let store = Arc::new(LocalFileStore::new(std::env::temp_dir().join("netmon")));
        store
            .reset_dir(WORK_DIR)
            .await
            .context("Failed to reset the work directory")?;
        debug!(root = %store.root().display(), "work directory ready");
        Ok(Self {
            settings,
            session: SessionToken::generate(),
            output_dir,
            quiet,
            store,
        })
    }

    pub fn store(&self) -> Arc<LocalFileStore> {
        Arc::clone(&self.store)
    }

    pub fn save_target(&self, override_dir: Option<&PathBuf>) -> Arc<DirectorySaveTarget> {
        let dir = override_dir.unwrap_or(&self.output_dir);
        Arc::new(DirectorySaveTarget::new(dir))
    }

    pub fn client(&self) -> HttpClient {
        HttpClient::with_timeouts(
            self.session.clone(),
            self.settings.connect_timeout,
            self.settings.read_timeout,
        )
    }

    /// Request headers for a job; origin and referer go through the session
    /// alias so they replace whatever the client would send.
    pub fn fetch_options(&self, request: &RequestArgs) -> FetchOptions {
        let mut options = FetchOptions::new();
        for (name, value) in &request.headers {
            options = options.header(name, value);
        }
        if let Some(origin) = &request.origin {
            options = options.rewritten(&self.session, "Origin", origin);
        }
        if let Some(referer) = &request.referer {
            options = options.rewritten(&self.session, "Referer", referer);
        }
        options
    }

    /// Progress bar on stderr, hidden when quiet or not a terminal.
    pub fn progress_bar(&self, template: &str) -> ProgressBar {
        if self.quiet || !std::io::stderr().is_terminal() {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(0);
        bar.set_style(ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar()));
        bar
    }
}

/// Cancel flag raised by Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancelFlag {
    let cancel = CancelFlag::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping after in-flight work");
            signal.cancel();
        }
    });
    cancel
}

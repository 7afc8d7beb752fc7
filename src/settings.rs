//! Process-wide settings and the snapshots derived from them.
//!
//! Settings are built once at startup (from the config file and CLI) and then
//! replaced wholesale on explicit user action. Each execution context reads an
//! immutable snapshot: the interception side a [`CaptureSettings`], the
//! dispatcher a [`ViewSettings`].

use std::collections::BTreeSet;
use std::time::Duration;

use crate::capture::event::TabId;
use crate::classify::Kind;

/// Default per-response capture ceiling (1 MiB).
pub const DEFAULT_BUFFER_LIMIT_BYTES: u64 = 1024 * 1024;

/// Default segment fetch concurrency.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 32;

/// Default size under which a chunked download is materialized in memory.
pub const DEFAULT_SMALL_FILE_THRESHOLD_BYTES: u64 = 32 * 1024 * 1024;

/// Default HTTP connect timeout (30 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default HTTP read timeout (5 minutes for long segment lists).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Per-kind visibility filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindFilter {
    visible: BTreeSet<Kind>,
}

impl Default for KindFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl KindFilter {
    /// Every kind visible.
    #[must_use]
    pub fn all() -> Self {
        Self {
            visible: Kind::ALL.into_iter().collect(),
        }
    }

    /// Only the listed kinds visible.
    #[must_use]
    pub fn only(kinds: impl IntoIterator<Item = Kind>) -> Self {
        Self {
            visible: kinds.into_iter().collect(),
        }
    }

    /// Parses a comma separated list such as `"html,media,streaming"`.
    ///
    /// Returns the first unknown label as the error.
    pub fn parse_list(list: &str) -> Result<Self, String> {
        let mut visible = BTreeSet::new();
        for label in list.split(',').map(str::trim).filter(|l| !l.is_empty()) {
            let kind = Kind::from_label(label).ok_or_else(|| label.to_string())?;
            visible.insert(kind);
        }
        Ok(Self { visible })
    }

    #[must_use]
    pub fn shows(&self, kind: Kind) -> bool {
        self.visible.contains(&kind)
    }

    /// Returns a copy with `kind` toggled to `visible`.
    #[must_use]
    pub fn with(mut self, kind: Kind, visible: bool) -> Self {
        if visible {
            self.visible.insert(kind);
        } else {
            self.visible.remove(&kind);
        }
        self
    }
}

/// Snapshot read by the interception context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    pub capture_enabled: bool,
    pub buffer_limit_bytes: u64,
    /// Tab that hosts the consumer; its own traffic is never captured.
    pub viewer_tab: Option<TabId>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            capture_enabled: true,
            buffer_limit_bytes: DEFAULT_BUFFER_LIMIT_BYTES,
            viewer_tab: None,
        }
    }
}

/// Snapshot read by the dispatcher when projecting rows to the consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewSettings {
    pub kinds: KindFilter,
    /// When set, only rows from this tab are shown.
    pub tab_filter: Option<TabId>,
}

impl ViewSettings {
    /// True when a row of `kind` from `tab` passes the filter.
    #[must_use]
    pub fn accepts(&self, kind: Kind, tab: TabId) -> bool {
        self.kinds.shows(kind) && self.tab_filter.is_none_or(|wanted| wanted == tab)
    }
}

/// Full settings bundle resolved at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub capture_enabled: bool,
    pub buffer_limit_bytes: u64,
    pub kind_filter: KindFilter,
    pub max_concurrency: usize,
    pub sidecar: bool,
    pub small_file_threshold_bytes: u64,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            capture_enabled: true,
            buffer_limit_bytes: DEFAULT_BUFFER_LIMIT_BYTES,
            kind_filter: KindFilter::all(),
            max_concurrency: DEFAULT_CONCURRENCY,
            sidecar: true,
            small_file_threshold_bytes: DEFAULT_SMALL_FILE_THRESHOLD_BYTES,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl Settings {
    /// Projection for the interception context.
    #[must_use]
    pub fn capture(&self) -> CaptureSettings {
        CaptureSettings {
            capture_enabled: self.capture_enabled,
            buffer_limit_bytes: self.buffer_limit_bytes,
            viewer_tab: None,
        }
    }

    /// Projection for the dispatcher.
    #[must_use]
    pub fn view(&self) -> ViewSettings {
        ViewSettings {
            kinds: self.kind_filter.clone(),
            tab_filter: None,
        }
    }
}

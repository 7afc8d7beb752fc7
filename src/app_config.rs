//! Config file loading for CLI defaults.
//!
//! The file is a flat `key = value` list with `#` comments. Unknown keys and
//! out-of-range values are rejected with the offending line number.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use netmon_core::Settings;
use netmon_core::settings::{KindFilter, MAX_CONCURRENCY, MIN_CONCURRENCY};

/// Values read from the config file; `None` means "not set".
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    pub capture: Option<bool>,
    pub buffer_limit_kb: Option<u64>,
    /// Visible kinds, comma separated.
    pub kinds: Option<KindFilter>,
    pub concurrency: Option<usize>,
    pub output_dir: Option<PathBuf>,
    pub sidecar: Option<bool>,
    pub small_file_threshold_kb: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates values against runtime constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency)
        {
            bail!(
                "Invalid config value for `concurrency`: {concurrency}. Expected range: {MIN_CONCURRENCY}..={MAX_CONCURRENCY}"
            );
        }
        if let Some(kb) = self.buffer_limit_kb
            && kb == 0
        {
            bail!("Invalid config value for `buffer_limit_kb`: 0. Expected a positive size");
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }

    /// Applies every value that is set on top of `settings`.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(capture) = self.capture {
            settings.capture_enabled = capture;
        }
        if let Some(kb) = self.buffer_limit_kb {
            settings.buffer_limit_bytes = kb.saturating_mul(1024);
        }
        if let Some(kinds) = &self.kinds {
            settings.kind_filter = kinds.clone();
        }
        if let Some(concurrency) = self.concurrency {
            settings.max_concurrency = concurrency;
        }
        if let Some(sidecar) = self.sidecar {
            settings.sidecar = sidecar;
        }
        if let Some(kb) = self.small_file_threshold_kb {
            settings.small_file_threshold_bytes = kb.saturating_mul(1024);
        }
        if let Some(secs) = self.connect_timeout_secs {
            settings.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.read_timeout_secs {
            settings.read_timeout = Duration::from_secs(secs);
        }
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Log level used when neither `RUST_LOG` nor a CLI flag decides.
    #[must_use]
    pub fn level(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Quiet => "error",
            Self::Debug => "trace",
        }
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/netmon/config.toml`
/// 2. `$HOME/.config/netmon/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join("netmon").join("config.toml"));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("netmon")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config from the default path; a missing file is not an error.
pub fn load_default_file_config() -> Result<Option<FileConfig>> {
    let Some(path) = resolve_default_config_path() else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    load_file_config(&path).map(Some)
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let line_no = line_index + 1;

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };
        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "capture" => cfg.capture = Some(parse_boolean(value).with_context(context)?),
            "buffer_limit_kb" => {
                cfg.buffer_limit_kb = Some(parse_integer_u64(value).with_context(context)?);
            }
            "kinds" => {
                let list = parse_string_literal(value).with_context(context)?;
                let filter = KindFilter::parse_list(&list)
                    .map_err(|label| anyhow::anyhow!("unknown kind '{label}'"))
                    .with_context(context)?;
                cfg.kinds = Some(filter);
            }
            "concurrency" => {
                let parsed = parse_integer_u64(value).with_context(context)?;
                cfg.concurrency = Some(usize::try_from(parsed).with_context(context)?);
            }
            "output_dir" => {
                cfg.output_dir = Some(PathBuf::from(parse_string_literal(value).with_context(context)?));
            }
            "sidecar" => cfg.sidecar = Some(parse_boolean(value).with_context(context)?),
            "small_file_threshold_kb" => {
                cfg.small_file_threshold_kb = Some(parse_integer_u64(value).with_context(context)?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(context)?;
                cfg.verbosity = Some(
                    parse_verbosity(&parsed)
                        .with_context(|| format!("Invalid `verbosity` value '{parsed}' on line {line_no}"))?,
                );
            }
            unknown => bail!("Unknown configuration key: '{unknown}' on line {line_no}"),
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logfile::DEFAULT_LINE_TEMPLATE;

const FILENAME: &str = "user-input-logger.toml";
const HOOKS_DIR: &str = "hooks";
const PRIMARY_LOG: &str = "user-inputs-log.txt";
const STATS_FILE: &str = "user-input-stats.json";

/// Log line template: either an inline Jinja2 string or a path to a
/// template file (relative to the hooks directory).
///
/// In TOML this looks like one of:
///
/// ```toml
/// [line_template]
/// inline = "[{{ timestamp }}] {{ tool }}"
///
/// # or
///
/// [line_template]
/// file = "line.tmpl"
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum LineTemplate {
    /// An inline Jinja2 template string.
    Inline(String),
    /// Path to a template file (relative to the hooks directory).
    File(String),
}

impl Default for LineTemplate {
    fn default() -> Self {
        LineTemplate::Inline(DEFAULT_LINE_TEMPLATE.into())
    }
}

impl LineTemplate {
    /// Resolve to the template source text.
    pub fn source(&self, hooks_dir: &Path) -> Result<String> {
        match self {
            LineTemplate::Inline(s) => Ok(s.clone()),
            LineTemplate::File(filename) => {
                let path = hooks_dir.join(filename);
                fs::read_to_string(&path)
                    .with_context(|| format!("reading template {}", path.display()))
            }
        }
    }
}

/// Static hook configuration, read once from `hooks/user-input-logger.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Trailing transcript lines scanned for user messages.
    #[serde(default = "default_max_transcript_lines")]
    pub max_transcript_lines: usize,

    /// Cap on messages captured per event.
    #[serde(default = "default_max_messages_per_capture")]
    pub max_messages_per_capture: usize,

    /// Messages shorter than this (in characters) are dropped.
    #[serde(default = "default_min_message_length")]
    pub min_message_length: usize,

    /// Reserved. Daily logs are not pruned yet.
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,

    #[serde(default = "default_true")]
    pub enable_daily_logs: bool,

    #[serde(default = "default_true")]
    pub enable_statistics: bool,

    /// How long to wait for the statistics lock before skipping the update.
    #[serde(default = "default_stats_lock_timeout_ms")]
    pub stats_lock_timeout_ms: u64,

    /// Age after which a leftover lock file is considered abandoned.
    #[serde(default = "default_stats_lock_stale_secs")]
    pub stats_lock_stale_secs: u64,

    #[serde(default)]
    pub primary_log: Option<PathBuf>,

    #[serde(default)]
    pub daily_log_dir: Option<PathBuf>,

    #[serde(default)]
    pub stats_file: Option<PathBuf>,

    #[serde(default)]
    pub line_template: LineTemplate,
}

fn default_max_transcript_lines() -> usize {
    20
}

fn default_max_messages_per_capture() -> usize {
    3
}

fn default_min_message_length() -> usize {
    10
}

fn default_log_retention_days() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

fn default_stats_lock_timeout_ms() -> u64 {
    250
}

fn default_stats_lock_stale_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_transcript_lines: default_max_transcript_lines(),
            max_messages_per_capture: default_max_messages_per_capture(),
            min_message_length: default_min_message_length(),
            log_retention_days: default_log_retention_days(),
            enable_daily_logs: true,
            enable_statistics: true,
            stats_lock_timeout_ms: default_stats_lock_timeout_ms(),
            stats_lock_stale_secs: default_stats_lock_stale_secs(),
            primary_log: None,
            daily_log_dir: None,
            stats_file: None,
            line_template: LineTemplate::default(),
        }
    }
}

impl Config {
    /// Load the config file at `path`.
    ///
    /// A missing file yields the defaults. Missing keys in an existing file
    /// are filled in with defaults via serde.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let config: Config = toml::from_str(&contents)
                    .with_context(|| format!("parsing {}", path.display()))?;
                Ok(config)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub fn stats_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.stats_lock_timeout_ms)
    }

    pub fn stats_lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.stats_lock_stale_secs)
    }
}

// ===================================================================
// Paths: where the logs, statistics and config live
// ===================================================================

/// Files the hook reads and writes, all derived from one base directory
/// (`~/.claude` unless overridden).
#[derive(Debug, Clone, PartialEq)]
pub struct Paths {
    pub base: PathBuf,
    pub primary_log: PathBuf,
    pub daily_log_dir: PathBuf,
    pub stats_file: PathBuf,
}

impl Paths {
    /// The default base directory, `~/.claude`.
    pub fn default_base() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".claude")
    }

    /// Default layout under `base`.
    pub fn under(base: &Path) -> Self {
        let hooks = base.join(HOOKS_DIR);
        Self {
            base: base.to_path_buf(),
            primary_log: base.join(PRIMARY_LOG),
            daily_log_dir: hooks.clone(),
            stats_file: hooks.join(STATS_FILE),
        }
    }

    pub fn hooks_dir(&self) -> PathBuf {
        self.base.join(HOOKS_DIR)
    }

    pub fn config_file(&self) -> PathBuf {
        self.hooks_dir().join(FILENAME)
    }

    /// The daily log for `date`.
    pub fn daily_log(&self, date: NaiveDate) -> PathBuf {
        self.daily_log_dir
            .join(format!("user-inputs-{}.log", date.format("%Y-%m-%d")))
    }

    /// Apply the path overrides from `config`. Relative overrides are
    /// resolved against the base directory.
    pub fn apply(&mut self, config: &Config) {
        if let Some(p) = &config.primary_log {
            self.primary_log = self.base.join(p);
        }
        if let Some(p) = &config.daily_log_dir {
            self.daily_log_dir = self.base.join(p);
        }
        if let Some(p) = &config.stats_file {
            self.stats_file = self.base.join(p);
        }
    }
}

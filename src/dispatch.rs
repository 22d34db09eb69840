use anyhow::Result;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

use crate::config::{Config, Paths};
use crate::extract::{self, Extracted, Limits};
use crate::format::{self, FormattedContext};
use crate::logfile::{self, DEFAULT_LINE_TEMPLATE, LogLine};
use crate::stats::{LockFile, LockStrategy, StatsOutcome, StatsStore};
use crate::transcript::Transcript;
use crate::types::HookEvent;

/// What one event did. Every component's failure is recorded here instead
/// of aborting the ones after it.
#[derive(Debug)]
pub struct Report {
    pub extracted: Extracted,
    pub context: FormattedContext,
    /// The rendered log line, unless rendering failed.
    pub line: Option<String>,
    /// Log files that could not be written.
    pub log_failures: Vec<(PathBuf, anyhow::Error)>,
    pub stats: Result<StatsOutcome>,
}

/// Ties the components together for one invocation.
pub struct Dispatcher<L> {
    config: Config,
    paths: Paths,
    template: String,
    stats: StatsStore<L>,
}

impl Dispatcher<LockFile> {
    /// Load the config at `config_path` (falling back to defaults if it is
    /// broken), apply its path overrides to `paths`, and build a dispatcher
    /// that guards statistics with a lock file.
    pub fn open(mut paths: Paths, config_path: &Path) -> Self {
        let config = Config::load(config_path).unwrap_or_else(|err| {
            tracing::warn!("using default config: {err:#}");
            Config::default()
        });
        paths.apply(&config);
        let lock = LockFile {
            timeout: config.stats_lock_timeout(),
            stale_after: config.stats_lock_stale_after(),
        };
        Self::with_lock(config, paths, lock)
    }
}

impl<L: LockStrategy> Dispatcher<L> {
    pub fn with_lock(config: Config, paths: Paths, lock: L) -> Self {
        let template = config
            .line_template
            .source(&paths.hooks_dir())
            .unwrap_or_else(|err| {
                tracing::warn!("using default line template: {err:#}");
                DEFAULT_LINE_TEMPLATE.to_string()
            });
        let stats = StatsStore::new(paths.stats_file.clone(), lock);
        Self {
            config,
            paths,
            template,
            stats,
        }
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    /// Log files a line written at `now` goes to.
    pub fn log_targets(&self, now: &DateTime<Local>) -> Vec<PathBuf> {
        let mut targets = vec![self.paths.primary_log.clone()];
        if self.config.enable_daily_logs {
            targets.push(self.paths.daily_log(now.date_naive()));
        }
        // TODO: prune daily logs older than `log_retention_days`.
        targets
    }

    /// Process one event: extract messages, format the context, append the
    /// log line and update the statistics.
    pub fn handle(&self, event: &HookEvent, now: DateTime<Local>) -> Report {
        let context = event.context();
        let transcript = match event.transcript_path() {
            Some(path) => Transcript::load(path, self.config.max_transcript_lines),
            None => Transcript::empty(),
        };

        let extracted =
            extract::extract_messages(&transcript, &context, Limits::from(&self.config));
        let formatted = format::format_context(&extracted.messages, &context);

        let line = LogLine::new(&now, event.session_id(), event.tool_name(), &formatted.text)
            .render_or_default(&self.template);
        let (line, mut log_failures) = match line {
            Ok(line) => (Some(line), Vec::new()),
            Err(err) => (None, vec![(self.paths.primary_log.clone(), err)]),
        };
        if let Some(line) = &line {
            for target in self.log_targets(&now) {
                if let Err(err) = logfile::append_line(&target, line) {
                    tracing::debug!("log write failed: {err:#}");
                    log_failures.push((target, err));
                }
            }
        }

        let stats = if self.config.enable_statistics {
            self.stats
                .update(|s| s.record(event.tool_name(), &formatted))
                .inspect_err(|err| tracing::debug!("statistics update failed: {err:#}"))
        } else {
            Ok(StatsOutcome::Disabled)
        };
        if let Ok(StatsOutcome::LockUnavailable) = &stats {
            tracing::debug!(
                "statistics lock busy, skipped update of {}",
                self.stats.path().display()
            );
        }

        Report {
            extracted,
            context: formatted,
            line,
            log_failures,
            stats,
        }
    }
}

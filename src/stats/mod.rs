use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use crate::format::FormattedContext;

const LOCK_POLL: Duration = Duration::from_millis(10);

// ===================================================================
// Statistics document
// ===================================================================

/// Usage counters shared by every invocation of the hook. Stored as a
/// pretty-printed JSON object; absent keys load as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(default)]
    pub total_interactions: u64,
    #[serde(default)]
    pub tools_triggered: BTreeMap<String, u64>,
    #[serde(default)]
    pub interactions_with_context: u64,
    #[serde(default)]
    pub context_fields_found: BTreeMap<String, u64>,
}

impl Statistics {
    /// Count one interaction with `tool`, and its context if it had any.
    pub fn record(&mut self, tool: &str, context: &FormattedContext) {
        self.total_interactions = self.total_interactions.saturating_add(1);
        bump(&mut self.tools_triggered, tool);
        if !context.is_empty() {
            self.interactions_with_context = self.interactions_with_context.saturating_add(1);
            for field in &context.fields {
                bump(&mut self.context_fields_found, field);
            }
        }
    }

    /// Read the document at `path`. Returns `None` if it doesn't exist.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(s) => {
                let stats = serde_json::from_str(&s)
                    .with_context(|| format!("parsing {}", path.display()))?;
                Ok(Some(stats))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    /// Read the document at `path`, starting over from zero if it is
    /// missing, unreadable or corrupt.
    pub fn load(path: &Path) -> Self {
        match Self::read(path) {
            Ok(stats) => stats.unwrap_or_default(),
            Err(err) => {
                tracing::debug!("resetting statistics: {err:#}");
                Self::default()
            }
        }
    }

    /// Replace the document at `path` atomically: the JSON is written to a
    /// temporary file in the same directory and renamed over the target.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let dir = parent_dir(path);
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temp file in {}", dir.display()))?;
        serde_json::to_writer_pretty(&mut tmp, self).context("serializing statistics")?;
        tmp.write_all(b"\n").context("writing statistics")?;
        tmp.as_file().sync_all().context("syncing statistics")?;
        tmp.persist(path)
            .with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}

fn bump(counts: &mut BTreeMap<String, u64>, key: &str) {
    let n = counts.entry(key.to_string()).or_insert(0);
    *n = n.saturating_add(1);
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
}

// ===================================================================
// Locking: serializes the load/modify/persist sequence
// ===================================================================

/// How the statistics store guards its read-modify-write cycle.
pub trait LockStrategy {
    /// Held for the duration of one update; released on drop.
    type Guard;

    /// Try to lock `target`. `Ok(None)` means the lock is busy and the
    /// caller should skip its update.
    fn acquire(&self, target: &Path) -> Result<Option<Self::Guard>>;
}

/// No locking at all. Overlapping updates race and the last writer wins.
#[cfg(test)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLock;

#[cfg(test)]
impl LockStrategy for NoLock {
    type Guard = ();

    fn acquire(&self, _target: &Path) -> Result<Option<()>> {
        Ok(Some(()))
    }
}

/// An exclusive `<target>.lock` file created with `O_EXCL`. It holds a
/// token unique to the owner (pid plus a per-acquire nonce).
#[derive(Debug, Clone)]
pub struct LockFile {
    /// Give up after this long.
    pub timeout: Duration,
    /// A lock file older than this is assumed to be abandoned.
    pub stale_after: Duration,
}

impl LockFile {
    pub fn path_for(target: &Path) -> PathBuf {
        with_suffix(target, ".lock")
    }

    fn is_stale(&self, lock_path: &Path) -> bool {
        fs::metadata(lock_path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| SystemTime::now().duration_since(t).ok())
            .is_some_and(|age| age > self.stale_after)
    }

    /// Remove an abandoned lock at `lock_path`. Returns true if one was
    /// removed.
    ///
    /// The lock is first renamed to a name only this caller knows, so two
    /// contenders can't both delete it. If the file claimed that way turns
    /// out to be fresh, another owner took over in between; it is linked
    /// back into place unless a newer lock already exists.
    fn take_over_stale(&self, lock_path: &Path) -> bool {
        if !self.is_stale(lock_path) {
            return false;
        }
        let claimed = with_suffix(lock_path, &format!(".stale-{}", new_token()));
        if fs::rename(lock_path, &claimed).is_err() {
            return false;
        }
        let stale = self.is_stale(&claimed);
        if !stale {
            let _ = fs::hard_link(&claimed, lock_path);
        }
        let _ = fs::remove_file(&claimed);
        stale
    }
}

impl LockStrategy for LockFile {
    type Guard = LockGuard;

    fn acquire(&self, target: &Path) -> Result<Option<LockGuard>> {
        let lock_path = Self::path_for(target);
        let dir = parent_dir(&lock_path);
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
                Ok(mut file) => {
                    let token = new_token();
                    if let Err(e) = file.write_all(token.as_bytes()) {
                        let _ = fs::remove_file(&lock_path);
                        return Err(e).with_context(|| format!("writing {}", lock_path.display()));
                    }
                    return Ok(Some(LockGuard {
                        path: lock_path,
                        token,
                    }));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if self.take_over_stale(&lock_path) {
                        tracing::debug!("removed stale lock {}", lock_path.display());
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    thread::sleep(LOCK_POLL);
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("creating {}", lock_path.display()));
                }
            }
        }
    }
}

/// RAII guard that removes the lock file on drop, provided it still holds
/// this guard's token.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    token: String,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        match fs::read_to_string(&self.path) {
            Ok(held) if held == self.token => {
                let _ = fs::remove_file(&self.path);
            }
            _ => tracing::debug!("lock {} no longer ours, leaving it", self.path.display()),
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// `<pid>-<nonce>`, unique across processes and across threads of one.
fn new_token() -> String {
    static NONCE: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let n = NONCE.fetch_add(1, Ordering::Relaxed);
    format!("{}-{n}-{nanos}", std::process::id())
}

// ===================================================================
// Store
// ===================================================================

/// Result of one statistics update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsOutcome {
    /// The document was updated and written back.
    Updated(Statistics),
    /// Statistics are turned off; the document was left alone.
    Disabled,
    /// Another invocation held the lock for too long; this update was
    /// skipped.
    LockUnavailable,
}

/// The statistics document on disk together with its locking strategy.
#[derive(Debug, Clone)]
pub struct StatsStore<L> {
    path: PathBuf,
    lock: L,
}

impl<L: LockStrategy> StatsStore<L> {
    pub fn new(path: PathBuf, lock: L) -> Self {
        Self { path, lock }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lock, load, apply `f`, and persist.
    pub fn update(&self, f: impl FnOnce(&mut Statistics)) -> Result<StatsOutcome> {
        let _guard = match self.lock.acquire(&self.path)? {
            Some(guard) => guard,
            None => return Ok(StatsOutcome::LockUnavailable),
        };
        let mut stats = Statistics::load(&self.path);
        f(&mut stats);
        stats.persist(&self.path)?;
        Ok(StatsOutcome::Updated(stats))
    }
}

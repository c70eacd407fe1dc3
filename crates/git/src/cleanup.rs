//! Background sweeps for the git cache.
//!
//! Both sweeps only consider directories directly under the cache root that
//! carry this crate's prefixes, and each item is handled independently: a
//! failure is logged and counted, never raised.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use skillhub_core::{now_ms, LockPolicy};

use crate::cache::{GitCache, ENTRY_PREFIX, TEMP_MARKER, TEMP_PREFIX};

/// Age after which an orphaned temp clone directory is removed.
pub const DEFAULT_TEMP_MAX_AGE: Duration = Duration::from_secs(30 * 60);

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub removed: usize,
    /// Entries skipped because another operation holds their lock.
    pub busy: usize,
    pub failed: usize,
}

fn modified_before(path: &Path, cutoff: SystemTime) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| t <= cutoff)
        .unwrap_or(false)
}

impl GitCache {
    /// Remove cache entries last fetched more than `max_age` ago.
    ///
    /// Age comes from the entry's metadata file, falling back to the
    /// directory mtime. A zero `max_age` clears every idle entry.
    pub fn evict_older_than(&self, max_age: Duration) -> SweepReport {
        let mut report = SweepReport::default();
        let Ok(read) = fs::read_dir(self.root()) else {
            return report;
        };
        let cutoff_ms = now_ms().saturating_sub(max_age.as_millis().try_into().unwrap_or(i64::MAX));
        let cutoff_time = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        for entry in read.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(key) = name.strip_prefix(ENTRY_PREFIX) else {
                continue;
            };
            if !path.is_dir() || !path.join(".git").is_dir() {
                continue;
            }
            let expired = match GitCache::read_meta(&path) {
                Some(meta) => meta.last_fetched_ms <= cutoff_ms,
                None => modified_before(&path, cutoff_time),
            };
            if !expired {
                continue;
            }
            let _guard = match self.locks().acquire(key, LockPolicy::FailFast) {
                Ok(g) => g,
                Err(_) => {
                    tracing::debug!(path = %path.display(), "skipping busy cache entry");
                    report.busy += 1;
                    continue;
                }
            };
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    let _ = fs::remove_file(GitCache::meta_path(&path));
                    report.removed += 1;
                    tracing::debug!(path = %path.display(), "evicted cache entry");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(path = %path.display(), error = %e, "failed to evict cache entry");
                }
            }
        }
        self.locks().prune();
        if report.removed > 0 || report.failed > 0 {
            tracing::info!(removed = report.removed, failed = report.failed, "git cache sweep finished");
        }
        report
    }

    /// Remove temp clone directories older than `max_age` left by crashed runs.
    ///
    /// Only directories with the temp prefix AND the marker file qualify.
    pub fn sweep_temp_dirs(&self, max_age: Duration) -> SweepReport {
        let mut report = SweepReport::default();
        let Ok(read) = fs::read_dir(self.root()) else {
            return report;
        };
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        for entry in read.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(TEMP_PREFIX) || !path.is_dir() {
                continue;
            }
            if !path.join(TEMP_MARKER).is_file() || !modified_before(&path, cutoff) {
                continue;
            }
            match fs::remove_dir_all(&path) {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove temp clone dir");
                }
            }
        }
        if report.removed > 0 {
            tracing::info!(removed = report.removed, "temp clone sweep finished");
        }
        report
    }
}

//! Periodic git-cache sweeps.
//!
//! Two independent timers: one evicts cache entries older than the
//! configured cleanup age, the other removes orphaned temp clone
//! directories. Each pass runs on the blocking pool; a failed pass is
//! logged and the timer keeps going.

use std::time::Duration;

use skillhub_git::{SweepReport, DEFAULT_TEMP_MAX_AGE};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::context::AppContext;

/// How often each sweep runs.
#[derive(Debug, Clone, Copy)]
pub struct SweepSchedule {
    pub cache_eviction: Duration,
    pub temp_cleanup: Duration,
    /// Age after which a temp clone directory counts as orphaned.
    pub temp_max_age: Duration,
}

impl Default for SweepSchedule {
    fn default() -> Self {
        Self {
            cache_eviction: Duration::from_secs(6 * 60 * 60),
            temp_cleanup: Duration::from_secs(60 * 60),
            temp_max_age: DEFAULT_TEMP_MAX_AGE,
        }
    }
}

/// Handles for the running sweeps. Dropping them stops both timers.
#[derive(Debug)]
pub struct BackgroundSweeps {
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundSweeps {
    /// Start both sweeps on the current tokio runtime. The first pass of
    /// each runs immediately.
    pub fn start(ctx: &AppContext, schedule: SweepSchedule) -> Self {
        let evict = spawn_sweep(ctx.clone(), "cache eviction", schedule.cache_eviction, |c| {
            c.clean_git_cache(false)
        });
        let max_age = schedule.temp_max_age;
        let temp = spawn_sweep(ctx.clone(), "temp cleanup", schedule.temp_cleanup, move |c| {
            c.git_cache().sweep_temp_dirs(max_age)
        });
        Self {
            handles: vec![evict, temp],
        }
    }

    /// Stop both timers. A pass already running finishes on its own.
    pub fn stop(self) {
        drop(self);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Drop for BackgroundSweeps {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

fn spawn_sweep<F>(ctx: AppContext, label: &'static str, every: Duration, pass: F) -> JoinHandle<()>
where
    F: Fn(&AppContext) -> SweepReport + Send + Sync + Clone + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let ctx = ctx.clone();
            let pass = pass.clone();
            match tokio::task::spawn_blocking(move || pass(&ctx)).await {
                Ok(report) if report.removed + report.failed + report.busy > 0 => {
                    tracing::info!(
                        sweep = label,
                        removed = report.removed,
                        busy = report.busy,
                        failed = report.failed,
                        "sweep finished"
                    );
                }
                Ok(_) => tracing::debug!(sweep = label, "sweep found nothing to do"),
                Err(e) => tracing::warn!(sweep = label, error = %e, "sweep task failed"),
            }
        }
    })
}

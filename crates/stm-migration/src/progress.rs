//! Progress counters and the periodic progress monitor
//!
//! Counters are bumped only after the matching queue operation succeeded.
//! The monitor reads them without further synchronization, so a snapshot
//! may be off by in-flight jobs; it is advisory only.

use crate::logger::Logger;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Shared job counters for one run
#[derive(Debug)]
pub struct MigrationProgress {
    jobs_created: AtomicU64,
    jobs_done: AtomicU64,
    started: Instant,
}

/// Point-in-time view of [`MigrationProgress`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub jobs_created: u64,
    pub jobs_done: u64,
    pub pending: u64,
    pub elapsed: Duration,
    /// Completed jobs per second since start
    pub rate: f64,
}

impl MigrationProgress {
    /// Start counting from now
    #[must_use]
    pub fn new() -> Self {
        Self {
            jobs_created: AtomicU64::new(0),
            jobs_done: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    #[inline]
    pub fn job_created(&self) {
        self.jobs_created.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn job_done(&self) {
        self.jobs_done.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    #[must_use]
    pub fn jobs_created(&self) -> u64 {
        self.jobs_created.load(Ordering::Relaxed)
    }

    #[inline]
    #[must_use]
    pub fn jobs_done(&self) -> u64 {
        self.jobs_done.load(Ordering::Relaxed)
    }

    /// Time since the run started
    #[inline]
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Snapshot both counters
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        // Read once so the arithmetic below is self-consistent.
        let jobs_created = self.jobs_created();
        let jobs_done = self.jobs_done();
        let elapsed = self.elapsed();
        ProgressSnapshot {
            jobs_created,
            jobs_done,
            pending: jobs_created.saturating_sub(jobs_done),
            elapsed,
            rate: per_second(jobs_done, elapsed),
        }
    }
}

impl Default for MigrationProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Items per second over `elapsed`, zero for an empty interval
#[must_use]
pub fn per_second(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

/// Spawn the progress monitor
///
/// Returns `None` when `period` is zero. The monitor stops when
/// `workers_finished` or `cancel` fires and never reports an error.
pub fn spawn_monitor(
    period: Duration,
    progress: Arc<MigrationProgress>,
    workers_finished: CancellationToken,
    cancel: CancellationToken,
    log: Arc<dyn Logger>,
) -> Option<JoinHandle<()>> {
    if period.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticks = interval_at(tokio::time::Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = workers_finished.cancelled() => break,
                _ = cancel.cancelled() => break,
                _ = ticks.tick() => {
                    let s = progress.snapshot();
                    log.info(format_args!(
                        "{} jobs created, {} done, {} pending after {:?} ({:.0}/s)",
                        s.jobs_created, s.jobs_done, s.pending, s.elapsed, s.rate
                    ));
                }
            }
        }
        log.debug(format_args!("Job queue monitor done"));
    }))
}

/// Wait for a monitor started by [`spawn_monitor`]
///
/// A monitor that panicked or was aborted does not fail the run; the join
/// error is only logged at debug level.
pub(crate) async fn join_monitor(monitor: Option<JoinHandle<()>>, log: &dyn Logger) {
    let Some(monitor) = monitor else { return };
    if let Err(err) = monitor.await {
        log.debug(format_args!("Job queue monitor stopped abnormally: {err}"));
    }
}

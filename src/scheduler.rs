//! Periodic decay and purge.
//!
//! [`DecayScheduler::tick`] runs one sweep synchronously and is what tests
//! and administrative callers use. [`DecayScheduler::spawn`] drives the
//! same sweep from a tokio interval until its cancellation token fires.
//! Cancellation is only observed between sweeps, so a sweep in flight
//! always completes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::memory::{DecayReport, MemoryId, MemoryStore, RecordFailure};

/// Outcome of one scheduler sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub now: DateTime<Utc>,
    pub decay: DecayReport,
    pub purged: Vec<MemoryId>,
    /// Decay and purge failures together
    pub failures: Vec<RecordFailure>,
    /// The sweep was not run because `now` did not advance past the last one
    pub skipped: bool,
}

impl SweepReport {
    fn skipped(now: DateTime<Utc>) -> Self {
        Self {
            now,
            decay: DecayReport::default(),
            purged: Vec::new(),
            failures: Vec::new(),
            skipped: true,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    last_tick: Option<DateTime<Utc>>,
    last_report: Option<SweepReport>,
}

/// Drives store-wide decay followed by purge.
pub struct DecayScheduler {
    store: Arc<MemoryStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    state: Mutex<SchedulerState>,
}

impl DecayScheduler {
    pub fn new(store: Arc<MemoryStore>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            store,
            clock,
            interval,
            state: Mutex::new(SchedulerState::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one sweep at `now`.
    ///
    /// A `now` at or before the previous sweep's is skipped, so a tick can
    /// never decay the same interval twice.
    pub fn tick(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock scheduler state: {}", e)))?;

        if state.last_tick.is_some_and(|last| now <= last) {
            tracing::debug!(%now, "Decay sweep skipped, time has not advanced");
            return Ok(SweepReport::skipped(now));
        }

        let decay = self.store.decay_all(now);
        let purge = self.store.purge_expired(now);

        let mut failures = decay.failures.clone();
        failures.extend(purge.failures);

        let report = SweepReport {
            now,
            decay,
            purged: purge.purged,
            failures,
            skipped: false,
        };

        if report.is_clean() {
            tracing::info!(
                processed = report.decay.processed,
                decayed = report.decay.decayed,
                demoted = report.decay.demoted,
                marked = report.decay.purge_candidates,
                purged = report.purged.len(),
                "Decay sweep complete"
            );
        } else {
            tracing::warn!(
                processed = report.decay.processed,
                purged = report.purged.len(),
                failures = report.failures.len(),
                "Decay sweep completed with failures"
            );
        }

        state.last_tick = Some(now);
        state.last_report = Some(report.clone());
        Ok(report)
    }

    /// Run one sweep at the clock's current time.
    pub fn tick_now(&self) -> Result<SweepReport> {
        self.tick(self.clock.now())
    }

    /// Report from the most recent sweep that ran.
    pub fn last_report(&self) -> Option<SweepReport> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.last_report.clone())
    }

    /// Start the periodic loop on the current tokio runtime.
    ///
    /// The loop stops when `parent` is cancelled or the handle is shut down;
    /// shutting down the handle never cancels `parent`.
    pub fn spawn(self: Arc<Self>, parent: CancellationToken) -> SchedulerHandle {
        let token = parent.child_token();
        let child = token.clone();
        let interval = self.interval;

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // first tick fires immediately

            tracing::info!(interval_secs = interval.as_secs(), "Decay scheduler started");
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        // sweeps are CPU-bound; awaiting keeps cancellation between sweeps
                        let scheduler = Arc::clone(&self);
                        match tokio::task::spawn_blocking(move || scheduler.tick_now()).await {
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => tracing::error!(error = %e, "Decay sweep failed"),
                            Err(e) => tracing::error!(error = %e, "Decay sweep task failed"),
                        }
                    }
                }
            }
            tracing::info!("Decay scheduler stopped");
        });

        SchedulerHandle { token, join }
    }
}

/// Handle to a running scheduler loop.
pub struct SchedulerHandle {
    /// Child of the token passed to `spawn`
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Cancel the loop and wait for any in-flight sweep to finish.
    pub async fn shutdown(self) -> Result<()> {
        self.token.cancel();
        self.join
            .await
            .map_err(|e| Error::Internal(format!("Decay scheduler task failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::RetentionConfig;
    use crate::memory::NewMemory;
    use crate::tier::{TierKind, TierPolicy};
    use chrono::TimeZone;

    const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    fn setup() -> (Arc<ManualClock>, Arc<MemoryStore>, Arc<DecayScheduler>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStore::new(
            TierPolicy::default(),
            RetentionConfig::default(),
            clock.clone(),
        ));
        let scheduler = Arc::new(DecayScheduler::new(store.clone(), clock.clone(), WEEK));
        (clock, store, scheduler)
    }

    #[test]
    fn test_tick_decays_and_skips_repeat() {
        let (clock, store, scheduler) = setup();
        let record = store.create(NewMemory::new("owner", "note", 3.0));

        clock.advance(chrono::Duration::weeks(4));
        let report = scheduler.tick_now().unwrap();
        assert!(!report.skipped);
        assert_eq!(report.decay.decayed, 1);
        assert_eq!(store.get(&record.id).unwrap().tier, TierKind::Disposable);

        let repeat = scheduler.tick_now().unwrap();
        assert!(repeat.skipped);
        assert!((store.get(&record.id).unwrap().current_score - 1.8).abs() < 1e-9);
        assert_eq!(scheduler.last_report().unwrap().now, report.now);
    }

    #[test]
    fn test_tick_purges_after_grace() {
        let (clock, store, scheduler) = setup();
        let record = store.create(NewMemory::new("owner", "filler", 0.6));

        // 1.0/week on disposable takes it to the floor
        clock.advance(chrono::Duration::weeks(1));
        let marked = scheduler.tick_now().unwrap();
        assert_eq!(marked.decay.purge_candidates, 1);
        assert!(marked.purged.is_empty());

        clock.advance(chrono::Duration::days(8));
        let purged = scheduler.tick_now().unwrap();
        assert_eq!(purged.purged, vec![record.id]);
        assert!(store.get(&record.id).unwrap_err().is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loop_sweeps_on_interval() {
        let (clock, store, scheduler) = setup();
        let record = store.create(NewMemory::new("owner", "note", 3.0));
        clock.advance(chrono::Duration::weeks(4));

        let handle = scheduler.clone().spawn(CancellationToken::new());
        tokio::time::sleep(WEEK + Duration::from_secs(1)).await;

        assert!(scheduler.last_report().is_some());
        assert_eq!(store.get(&record.id).unwrap().tier, TierKind::Disposable);

        assert!(handle.is_running());
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_leaves_parent_token_alone() {
        let (_clock, _store, scheduler) = setup();
        let root = CancellationToken::new();

        let handle = scheduler.clone().spawn(root.clone());
        handle.shutdown().await.unwrap();

        assert!(!root.is_cancelled());
        assert!(scheduler.last_report().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_stops_loop() {
        let (_clock, _store, scheduler) = setup();
        let root = CancellationToken::new();

        let handle = scheduler.clone().spawn(root.clone());
        root.cancel();
        for _ in 0..10 {
            if !handle.is_running() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!handle.is_running());
        handle.shutdown().await.unwrap();
    }
}

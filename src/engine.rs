//! The memory engine: ingestion, context, and lifecycle administration.
//!
//! [`MemoryEngine`] is an explicitly constructed component. It owns the
//! record store, the profile registry, and the decay scheduler; nothing
//! here is process-global, and the periodic sweep only runs between
//! [`MemoryEngine::start_scheduler`] and [`MemoryEngine::shutdown`].
//!
//! ```rust,ignore
//! use memtier_core::{EngineConfig, MemoryEngine, SystemClock};
//!
//! let engine = MemoryEngine::new(EngineConfig::default(), Arc::new(SystemClock))?;
//! engine.start_scheduler()?;
//!
//! let submitted = engine
//!     .submit_interaction("owner-1", "I prefer navy headers", Utc::now(), None)
//!     .await?;
//! println!("{} -> {}", submitted.record.id, submitted.record.tier);
//!
//! engine.shutdown().await?;
//! ```

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::context::{ContextAggregator, UserContext};
use crate::error::{Error, Result};
use crate::memory::{
    MemoryId, MemoryRecord, MemoryStore, NewMemory, OwnerId, RecordQuery, StoreStats,
};
use crate::preferences::{PreferenceFeedback, PreferenceLearner, ProfileRegistry};
use crate::scheduler::{DecayScheduler, SchedulerHandle, SweepReport};
use crate::scoring::{ScoreBreakdown, ScoreInput, ScoringEngine};
use crate::signals::SignalDetector;

/// Result of ingesting one interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResult {
    pub record: MemoryRecord,
    pub breakdown: ScoreBreakdown,
    /// The owner's context after the record was added
    pub context: UserContext,
}

/// Store statistics plus engine-level counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    #[serde(flatten)]
    pub records: StoreStats,
    /// Owners with a profile
    pub owners: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sweep_at: Option<DateTime<Utc>>,
}

/// Adaptive memory-retention engine.
pub struct MemoryEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    detector: SignalDetector,
    scorer: ScoringEngine,
    store: Arc<MemoryStore>,
    profiles: Arc<ProfileRegistry>,
    aggregator: ContextAggregator,
    feedback: Vec<Arc<dyn PreferenceFeedback>>,
    scheduler: Arc<DecayScheduler>,
    running: Mutex<Option<SchedulerHandle>>,
    shutdown: CancellationToken,
}

impl MemoryEngine {
    /// Build an engine; the configuration is validated first.
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let detector = SignalDetector::standard().with_history_window(config.scoring.history_window);
        let scorer = ScoringEngine::new(config.scoring.clone(), &config.retention, &config.tiers);
        let store = Arc::new(MemoryStore::new(
            config.tiers.clone(),
            config.retention.clone(),
            clock.clone(),
        ));
        let profiles = Arc::new(ProfileRegistry::new(config.profile.recent_capacity));
        let aggregator =
            ContextAggregator::new(store.clone(), profiles.clone(), config.profile.snapshot_top_n);
        let learner = PreferenceLearner::new(
            profiles.clone(),
            config.scoring.categories.clone(),
            config.profile.clone(),
        );
        let scheduler = Arc::new(DecayScheduler::new(
            store.clone(),
            clock.clone(),
            config.scheduler.interval(),
        ));

        Ok(Self {
            config,
            clock,
            detector,
            scorer,
            store,
            profiles,
            aggregator,
            feedback: vec![Arc::new(learner)],
            scheduler,
            running: Mutex::new(None),
            shutdown: CancellationToken::new(),
        })
    }

    /// Attach an additional feedback sink.
    pub fn with_feedback(mut self, sink: Arc<dyn PreferenceFeedback>) -> Self {
        self.feedback.push(sink);
        self
    }

    /// Replace the signal detector, e.g. to add custom rules.
    pub fn with_detector(mut self, detector: SignalDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn profiles(&self) -> &Arc<ProfileRegistry> {
        &self.profiles
    }

    // ==================== Ingestion ====================

    /// Detect, score, and store one interaction, then run preference feedback.
    ///
    /// Input is validated before anything touches the store. Feedback
    /// failures are logged and never fail the call.
    pub async fn submit_interaction(
        &self,
        owner: impl Into<OwnerId>,
        text: &str,
        timestamp: DateTime<Utc>,
        session_id: Option<&str>,
    ) -> Result<SubmitResult> {
        let owner = owner.into();
        self.validate_submission(&owner, text)?;

        let history: Vec<String> = self
            .store
            .get_many(&self.profiles.recent_ids(&owner))
            .into_iter()
            .take(self.detector.history_window())
            .map(|r| r.text)
            .collect();
        let detection = self.detector.detect(text, &history);

        let now = self.clock.now();
        let input = ScoreInput::from_detection(&detection).with_event_age(now - timestamp);
        let breakdown = self.scorer.score(&input);

        let mut new = NewMemory::new(owner.clone(), text.trim(), breakdown.final_score)
            .with_signals(detection.signals)
            .with_categories(detection.categories);
        if let Some(session) = session_id {
            new = new.with_session(session);
        }
        let record = self.store.create(new);
        self.profiles.record_interaction(&owner, record.id, now);

        tracing::info!(
            memory_id = %record.id,
            owner = %owner,
            score = record.current_score,
            tier = %record.tier,
            signals = record.signals.len(),
            dominant = breakdown.dominant_signal.as_deref().unwrap_or("-"),
            "Interaction recorded"
        );

        self.dispatch_feedback(&record).await;
        let context = self.aggregator.build(&owner, now);

        Ok(SubmitResult {
            record,
            breakdown,
            context,
        })
    }

    fn validate_submission(&self, owner: &OwnerId, text: &str) -> Result<()> {
        owner.validate(self.config.ingest.max_owner_id_len)?;

        if text.trim().is_empty() {
            return Err(Error::invalid_input("interaction text is empty"));
        }
        let chars = text.chars().count();
        if chars > self.config.ingest.max_text_chars {
            return Err(Error::invalid_input(format!(
                "interaction text has {} characters, limit is {}",
                chars, self.config.ingest.max_text_chars
            )));
        }
        Ok(())
    }

    async fn dispatch_feedback(&self, record: &MemoryRecord) {
        if self.feedback.is_empty() {
            return;
        }

        let limit = self.config.profile.feedback_timeout();
        if self.config.profile.background_feedback {
            let sinks = self.feedback.clone();
            let record = record.clone();
            tokio::spawn(async move {
                run_feedback(&sinks, &record, limit).await;
            });
        } else {
            run_feedback(&self.feedback, record, limit).await;
        }
    }

    // ==================== Read Path ====================

    /// Context for an owner; unknown owners get an empty one.
    pub fn get_user_context(&self, owner: impl Into<OwnerId>) -> Result<UserContext> {
        let owner = owner.into();
        owner.validate(self.config.ingest.max_owner_id_len)?;
        Ok(self.aggregator.build(&owner, self.clock.now()))
    }

    /// An owner's records, most recently accessed first.
    pub fn list(&self, owner: impl Into<OwnerId>, query: &RecordQuery) -> Vec<MemoryRecord> {
        self.store.list(&owner.into(), query)
    }

    // ==================== Record Lifecycle ====================

    /// Passive access boost. Unknown ids are a logged no-op.
    pub fn access(&self, id: &MemoryId) -> Result<Option<MemoryRecord>> {
        not_found_as_none(id, "access", self.store.access(id))
    }

    /// Explicit reinforcement. Unknown ids are a logged no-op.
    pub fn reinforce(&self, id: &MemoryId, strength: f64) -> Result<Option<MemoryRecord>> {
        not_found_as_none(id, "reinforce", self.store.reinforce(id, strength))
    }

    /// Delete a record on request.
    pub fn remove(&self, id: &MemoryId) -> Result<MemoryRecord> {
        self.store.remove(id)
    }

    // ==================== Administration ====================

    /// Run a decay and purge sweep now, at `now` or the clock's time.
    pub fn force_decay(&self, now: Option<DateTime<Utc>>) -> Result<SweepReport> {
        let now = now.unwrap_or_else(|| self.clock.now());
        self.scheduler.tick(now)
    }

    pub fn get_stats(&self) -> EngineStats {
        EngineStats {
            records: self.store.stats(),
            owners: self.profiles.len(),
            last_sweep_at: self.scheduler.last_report().map(|r| r.now),
        }
    }

    /// Start the periodic sweep. Calling it again while running does nothing.
    pub fn start_scheduler(&self) -> Result<()> {
        let mut running = self
            .running
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock scheduler handle: {}", e)))?;

        if running.as_ref().is_some_and(|h| h.is_running()) {
            tracing::debug!("Decay scheduler already running");
            return Ok(());
        }
        *running = Some(self.scheduler.clone().spawn(self.shutdown.child_token()));
        Ok(())
    }

    /// Stop the periodic sweep, letting an in-flight sweep finish.
    pub async fn shutdown(&self) -> Result<()> {
        let handle = self
            .running
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock scheduler handle: {}", e)))?
            .take();

        match handle {
            Some(handle) => handle.shutdown().await,
            None => Ok(()),
        }
    }
}

impl Drop for MemoryEngine {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Run every sink, each isolated from panics and bounded by `limit`.
async fn run_feedback(
    sinks: &[Arc<dyn PreferenceFeedback>],
    record: &MemoryRecord,
    limit: Duration,
) {
    let results = join_all(sinks.iter().map(|sink| async move {
        let observed = AssertUnwindSafe(sink.observe(record)).catch_unwind();
        let result = match tokio::time::timeout(limit, observed).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::learning_feedback("sink panicked")),
            Err(_) => Err(Error::learning_feedback(format!(
                "sink timed out after {}ms",
                limit.as_millis()
            ))),
        };
        (sink.name().to_string(), result)
    }))
    .await;

    for (sink, result) in results {
        if let Err(e) = result {
            tracing::warn!(
                sink = %sink,
                memory_id = %record.id,
                error = %e,
                "Preference feedback failed"
            );
        }
    }
}

fn not_found_as_none(
    id: &MemoryId,
    op: &'static str,
    result: Result<MemoryRecord>,
) -> Result<Option<MemoryRecord>> {
    match result {
        Ok(record) => Ok(Some(record)),
        Err(e) if e.is_not_found() => {
            tracing::debug!(memory_id = %id, op, "Memory record not found");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::preferences::PreferenceKind;
    use crate::signals::{category_names, signal_names};
    use crate::tier::TierKind;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap()
    }

    fn engine() -> (Arc<ManualClock>, MemoryEngine) {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = MemoryEngine::new(EngineConfig::default(), clock.clone()).unwrap();
        (clock, engine)
    }

    struct FailingSink {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PreferenceFeedback for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        async fn observe(&self, _record: &MemoryRecord) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::learning_feedback("sink unavailable"))
        }
    }

    struct PanickingSink;

    #[async_trait]
    impl PreferenceFeedback for PanickingSink {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn observe(&self, _record: &MemoryRecord) -> Result<()> {
            panic!("sink blew up");
        }
    }

    struct HangingSink;

    #[async_trait]
    impl PreferenceFeedback for HangingSink {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn observe(&self, _record: &MemoryRecord) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_breakthrough_is_permanent() {
        let (clock, engine) = engine();
        let result = engine
            .submit_interaction("alice", "Finally!!! That's it, this is AMAZING", clock.now(), None)
            .await
            .unwrap();

        assert!(result.record.has_signal(signal_names::BREAKTHROUGH));
        assert_eq!(result.record.tier, TierKind::Permanent);
        assert!(result.record.current_score >= 8.0);
    }

    #[tokio::test]
    async fn test_invalid_input_rejected_before_store() {
        let (clock, engine) = engine();

        let empty = engine.submit_interaction("alice", "   ", clock.now(), None).await;
        assert!(matches!(empty, Err(Error::InvalidInput(_))));

        let long = "x".repeat(5000);
        let oversized = engine.submit_interaction("alice", &long, clock.now(), None).await;
        assert!(matches!(oversized, Err(Error::InvalidInput(_))));

        let bad_owner = engine.submit_interaction("not ok!", "hello", clock.now(), None).await;
        assert!(matches!(bad_owner, Err(Error::InvalidInput(_))));

        assert!(engine.store().is_empty());
        assert_eq!(engine.profiles().len(), 0);
    }

    #[tokio::test]
    async fn test_failing_feedback_does_not_fail_creation() {
        let clock = Arc::new(ManualClock::new(start()));
        let sink = Arc::new(FailingSink {
            calls: AtomicUsize::new(0),
        });
        let engine = MemoryEngine::new(EngineConfig::default(), clock.clone())
            .unwrap()
            .with_feedback(sink.clone());

        let result = engine
            .submit_interaction("bob", "No, I meant a navy color palette", clock.now(), Some("s1"))
            .await
            .unwrap();

        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.record.session_id.as_deref(), Some("s1"));
        assert_eq!(engine.store().len(), 1);
    }

    #[tokio::test]
    async fn test_preferences_flow_into_context() {
        let (clock, engine) = engine();
        let result = engine
            .submit_interaction("carol", "I really prefer teal for the color scheme", clock.now(), None)
            .await
            .unwrap();

        assert!(result.record.has_category(category_names::COLOR_PREFERENCE));
        assert_eq!(
            result.context.preferences.strongest(PreferenceKind::Color),
            Some("teal")
        );
        assert_eq!(result.context.recent_records[0].id, result.record.id);
    }

    #[tokio::test]
    async fn test_history_drives_repeated_reference() {
        let (clock, engine) = engine();
        for text in ["pricing table layout design", "update pricing table layout"] {
            engine.submit_interaction("dana", text, clock.now(), None).await.unwrap();
        }

        let result = engine
            .submit_interaction("dana", "the pricing table layout again", clock.now(), None)
            .await
            .unwrap();
        assert!(result.record.has_signal(signal_names::REPEATED_REFERENCE));
        assert!(result.breakdown.context_term > 0.0);
    }

    #[tokio::test]
    async fn test_access_and_reinforce_unknown_are_noops() {
        let (_clock, engine) = engine();
        let missing = MemoryId::new();
        assert_eq!(engine.access(&missing).unwrap(), None);
        assert_eq!(engine.reinforce(&missing, 1.0).unwrap(), None);
        assert!(engine.reinforce(&missing, -1.0).is_err());
    }

    #[tokio::test]
    async fn test_force_decay_and_stats() {
        let (clock, engine) = engine();
        let result = engine
            .submit_interaction("erin", "No, that's wrong", clock.now() - Duration::days(2), None)
            .await
            .unwrap();
        // corrections are exempt from decay
        let correction_score = result.record.current_score;

        engine
            .submit_interaction("erin", "what about the footer?", clock.now(), None)
            .await
            .unwrap();

        clock.advance(Duration::weeks(8));
        let report = engine.force_decay(None).unwrap();
        assert_eq!(report.decay.processed, 2);
        assert_eq!(report.decay.exempt, 1);
        assert_eq!(
            engine.store().get(&result.record.id).unwrap().current_score,
            correction_score
        );

        let stats = engine.get_stats();
        assert_eq!(stats.records.total_records, 2);
        assert_eq!(stats.owners, 1);
        assert_eq!(stats.last_sweep_at, Some(clock.now()));
    }

    #[tokio::test]
    async fn test_unknown_owner_context_is_empty() {
        let (_clock, engine) = engine();
        assert!(engine.get_user_context("stranger").unwrap().is_empty());
        assert!(engine.get_user_context("").is_err());
    }

    #[tokio::test]
    async fn test_panicking_feedback_does_not_fail_creation() {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = MemoryEngine::new(EngineConfig::default(), clock.clone())
            .unwrap()
            .with_feedback(Arc::new(PanickingSink));

        let result = engine
            .submit_interaction("alice", "I prefer a teal color palette", clock.now(), None)
            .await
            .unwrap();

        assert_eq!(engine.store().len(), 1);
        assert_eq!(result.context.recent_records[0].id, result.record.id);
        // the built-in learner still ran alongside the failing sink
        assert_eq!(
            result.context.preferences.strongest(PreferenceKind::Color),
            Some("teal")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_feedback_is_bounded() {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = MemoryEngine::new(EngineConfig::default(), clock.clone())
            .unwrap()
            .with_feedback(Arc::new(HangingSink));

        let result = engine
            .submit_interaction("alice", "hello there friend", clock.now(), None)
            .await
            .unwrap();
        assert_eq!(engine.store().get(&result.record.id).unwrap().id, result.record.id);
    }

    #[tokio::test]
    async fn test_background_feedback_updates_profile() {
        let clock = Arc::new(ManualClock::new(start()));
        let mut config = EngineConfig::default();
        config.profile.background_feedback = true;
        let engine = MemoryEngine::new(config, clock.clone())
            .unwrap()
            .with_feedback(Arc::new(PanickingSink));

        engine
            .submit_interaction("frank", "I really prefer teal for the color scheme", clock.now(), None)
            .await
            .unwrap();

        let mut learned = None;
        for _ in 0..100 {
            let context = engine.get_user_context("frank").unwrap();
            learned = context
                .preferences
                .strongest(PreferenceKind::Color)
                .map(str::to_string);
            if learned.is_some() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(learned.as_deref(), Some("teal"));
        assert_eq!(engine.store().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_start_and_shutdown() {
        let (_clock, engine) = engine();
        engine.start_scheduler().unwrap();
        engine.start_scheduler().unwrap();
        engine.shutdown().await.unwrap();
        engine.shutdown().await.unwrap();
    }
}

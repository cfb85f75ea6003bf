//! # memtier-core
//!
//! An adaptive memory-retention engine. Short interaction texts are scored
//! for importance from weighted textual signals, sorted into four retention
//! tiers, and then decayed, reinforced, and purged over time so an unbounded
//! interaction stream compresses into a small, time-aware working set.
//!
//! ## Core Components
//!
//! - **Signals**: Signal/category catalogs and the rule-table detector
//! - **Tier**: Tier policy and score classification
//! - **Scoring**: Importance scoring with breakthrough override
//! - **Memory**: Record types and the concurrent record store
//! - **Scheduler**: Periodic decay and purge sweeps
//! - **Preferences**: Per-owner profiles and preference learning
//! - **Context**: Per-owner context assembly
//! - **Engine**: The facade tying them together
//!
//! ## Example
//!
//! ```rust,ignore
//! use memtier_core::{EngineConfig, MemoryEngine, SystemClock};
//!
//! let engine = MemoryEngine::new(EngineConfig::default(), Arc::new(SystemClock))?;
//! let result = engine
//!     .submit_interaction("owner-1", "No, I meant the navy header", Utc::now(), None)
//!     .await?;
//!
//! println!("stored as {} with score {:.2}", result.record.tier, result.record.current_score);
//! let report = engine.force_decay(None)?;
//! println!("decayed {} records", report.decay.decayed);
//! ```

pub mod clock;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod memory;
pub mod preferences;
mod proptest;
pub mod scheduler;
pub mod scoring;
pub mod signals;
pub mod tier;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    EngineConfig, IngestConfig, ProfileConfig, RetentionConfig, SchedulerConfig, ScoringConfig,
};
pub use context::{ContextAggregator, UserContext};
pub use engine::{EngineStats, MemoryEngine, SubmitResult};
pub use error::{Error, Result};
pub use memory::{
    DecayReport, MemoryId, MemoryRecord, MemoryStore, NewMemory, OwnerId, PurgeReport,
    RecordFailure, RecordQuery, StoreStats, TierTransition, TransitionReason,
};
pub use preferences::{
    PreferenceFeedback, PreferenceKind, PreferenceLearner, PreferenceSnapshot, ProfileRegistry,
    UserProfile, WeightedValue,
};
pub use scheduler::{DecayScheduler, SchedulerHandle, SweepReport};
pub use scoring::{ScoreBreakdown, ScoreInput, ScoringEngine};
pub use signals::{
    category_names, signal_names, CategoryRegistry, Detection, SignalDetector, SignalRegistry,
};
pub use tier::{TierDefinition, TierKind, TierPolicy};

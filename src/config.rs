//! Engine configuration.
//!
//! Every numeric constant the engine uses (weights, thresholds, decay rates,
//! boosts, grace periods, capacities) lives here. All sections deserialize
//! with defaults, so a JSON file only needs the keys it changes:
//!
//! ```json
//! { "retention": { "deletion_grace_hours": 72 }, "scheduler": { "interval_secs": 3600 } }
//! ```

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::error::{Error, Result};
use crate::signals::{signal_names, CategoryRegistry, SignalRegistry, DEFAULT_HISTORY_WINDOW};
use crate::tier::{TierDefinition, TierKind, TierPolicy};

/// Scoring weights and catalogs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub signals: SignalRegistry,
    pub categories: CategoryRegistry,
    /// Multiplier for context relevance (0-100)
    pub context_relevance_weight: f64,
    /// Multiplier for concrete value pattern matches
    pub pattern_match_weight: f64,
    /// Bonus for an interaction scored the moment it happened
    pub recency_bonus_max: f64,
    /// Age at which the recency bonus reaches zero
    pub recency_window_hours: u32,
    /// Bonus per matched signal beyond the first
    pub engagement_step: f64,
    pub engagement_cap: f64,
    /// Recent history items consulted by the detector
    pub history_window: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            signals: SignalRegistry::standard(),
            categories: CategoryRegistry::standard(),
            context_relevance_weight: 0.02,
            pattern_match_weight: 0.5,
            recency_bonus_max: 0.5,
            recency_window_hours: 24,
            engagement_step: 0.25,
            engagement_cap: 1.0,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }
}

impl ScoringConfig {
    pub fn recency_window(&self) -> Duration {
        Duration::hours(i64::from(self.recency_window_hours))
    }
}

/// Score bounds, boosts, and purge behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Decay never takes a score below this; reaching it marks for deletion
    pub score_floor: f64,
    /// Boosts never take a score above this
    pub score_ceiling: f64,
    pub access_boost: f64,
    /// Reinforcement boost at strength 1.0
    pub reinforcement_boost: f64,
    pub max_reinforcement_strength: f64,
    /// Time between marking and purge eligibility
    pub deletion_grace_hours: u32,
    /// Records carrying any of these signals never decay
    pub decay_exempt_signals: BTreeSet<String>,
    /// Entries kept in the tier transition log
    pub evolution_log_capacity: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            score_floor: 0.5,
            score_ceiling: 10.0,
            access_boost: 0.5,
            reinforcement_boost: 1.5,
            max_reinforcement_strength: 5.0,
            deletion_grace_hours: 7 * 24,
            decay_exempt_signals: [signal_names::BREAKTHROUGH, signal_names::USER_CORRECTION]
                .into_iter()
                .map(str::to_string)
                .collect(),
            evolution_log_capacity: 1024,
        }
    }
}

impl RetentionConfig {
    pub fn deletion_grace(&self) -> Duration {
        Duration::hours(i64::from(self.deletion_grace_hours))
    }
}

/// Limits applied at the ingestion boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub max_text_chars: usize,
    pub max_owner_id_len: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_text_chars: 4000,
            max_owner_id_len: 128,
        }
    }
}

/// Per-owner profile and preference learning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Capacity of the recent-memory list
    pub recent_capacity: usize,
    /// Records scoring below this don't feed preferences
    pub learning_min_score: f64,
    /// Vote weight per point of score
    pub learning_rate: f64,
    /// Values reported per preference kind in snapshots
    pub snapshot_top_n: usize,
    /// Run preference feedback on a spawned task instead of inline
    pub background_feedback: bool,
    /// Upper bound on one sink's `observe` call
    pub feedback_timeout_ms: u64,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            recent_capacity: 10,
            learning_min_score: 2.0,
            learning_rate: 0.1,
            snapshot_top_n: 3,
            background_feedback: false,
            feedback_timeout_ms: 5_000,
        }
    }
}

impl ProfileConfig {
    pub fn feedback_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.feedback_timeout_ms)
    }
}

/// Decay sweep timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 7 * 24 * 60 * 60,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scoring: ScoringConfig,
    pub tiers: TierPolicy,
    pub retention: RetentionConfig,
    pub ingest: IngestConfig,
    pub profile: ProfileConfig,
    pub scheduler: SchedulerConfig,
}

impl EngineConfig {
    /// Faster forgetting: steeper decay, shorter grace, daily sweeps.
    pub fn aggressive() -> Self {
        let mut config = Self::default();
        config.tiers = TierPolicy::new(vec![
            TierDefinition::new(TierKind::Permanent, 8.0, 0.05, None),
            TierDefinition::new(TierKind::LongTerm, 5.0, 0.25, Some(180)),
            TierDefinition::new(TierKind::MediumTerm, 2.0, 0.6, Some(30)),
            TierDefinition::new(TierKind::Disposable, 0.0, 2.0, Some(3)),
        ])
        .unwrap_or_default();
        config.retention.deletion_grace_hours = 24;
        config.scheduler.interval_secs = 24 * 60 * 60;
        config
    }

    /// Slower forgetting: gentle decay and a month of grace.
    pub fn conservative() -> Self {
        let mut config = Self::default();
        config.tiers = TierPolicy::new(vec![
            TierDefinition::new(TierKind::Permanent, 8.0, 0.0, None),
            TierDefinition::new(TierKind::LongTerm, 5.0, 0.05, None),
            TierDefinition::new(TierKind::MediumTerm, 2.0, 0.15, Some(180)),
            TierDefinition::new(TierKind::Disposable, 0.0, 0.5, Some(30)),
        ])
        .unwrap_or_default();
        config.retention.deletion_grace_hours = 30 * 24;
        config
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<()> {
        self.tiers.validate()?;

        let r = &self.retention;
        if !(r.score_floor.is_finite() && r.score_floor >= 0.0) {
            return Err(Error::config("score_floor must be finite and >= 0"));
        }
        if !(r.score_ceiling.is_finite() && r.score_ceiling > r.score_floor) {
            return Err(Error::config("score_ceiling must exceed score_floor"));
        }
        if r.access_boost < 0.0 || r.reinforcement_boost < 0.0 {
            return Err(Error::config("boosts must be >= 0"));
        }
        if !(r.max_reinforcement_strength > 0.0) {
            return Err(Error::config("max_reinforcement_strength must be > 0"));
        }
        if r.deletion_grace_hours == 0 {
            return Err(Error::config("deletion_grace_hours must be > 0"));
        }

        let s = &self.scoring;
        if s.context_relevance_weight < 0.0 || s.pattern_match_weight < 0.0 {
            return Err(Error::config("scoring weights must be >= 0"));
        }
        if s.recency_bonus_max < 0.0 || s.engagement_step < 0.0 || s.engagement_cap < 0.0 {
            return Err(Error::config("scoring bonuses must be >= 0"));
        }

        if self.ingest.max_text_chars == 0 || self.ingest.max_owner_id_len == 0 {
            return Err(Error::config("ingest limits must be > 0"));
        }
        if self.profile.recent_capacity == 0 {
            return Err(Error::config("recent_capacity must be > 0"));
        }
        // detection history is read from the recent-memory list
        if s.history_window > self.profile.recent_capacity {
            return Err(Error::config(format!(
                "history_window ({}) exceeds recent_capacity ({})",
                s.history_window, self.profile.recent_capacity
            )));
        }
        if self.profile.feedback_timeout_ms == 0 {
            return Err(Error::config("feedback_timeout_ms must be > 0"));
        }
        if self.scheduler.interval_secs == 0 {
            return Err(Error::config("scheduler interval must be > 0"));
        }

        Ok(())
    }
}

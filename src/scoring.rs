//! Importance scoring.
//!
//! ```text
//! raw = Σ signal.weight + Σ category.bonus
//!     + context_relevance · k1 + pattern_matches · k2
//!     + recency_bonus + engagement_bonus
//! ```
//!
//! A breakthrough lifts the result to at least the Permanent threshold. The
//! final score is clamped to `[floor, ceiling]`: ordinary scoring never
//! produces a value below the floor, only decay takes a record there.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::{RetentionConfig, ScoringConfig};
use crate::signals::{signal_names, Detection};
use crate::tier::{TierKind, TierPolicy};

/// Inputs to a single scoring pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreInput {
    pub signals: BTreeSet<String>,
    pub categories: BTreeSet<String>,
    /// 0-100, clamped on use
    pub context_relevance: f64,
    pub pattern_matches: usize,
    /// Time between the interaction and scoring; `None` earns no recency bonus
    pub event_age: Option<Duration>,
}

impl ScoreInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a detection.
    pub fn from_detection(detection: &Detection) -> Self {
        Self {
            signals: detection.signals.clone(),
            categories: detection.categories.clone(),
            context_relevance: detection.context_relevance,
            pattern_matches: detection.pattern_matches,
            event_age: None,
        }
    }

    pub fn with_signal(mut self, name: impl Into<String>) -> Self {
        self.signals.insert(name.into());
        self
    }

    pub fn with_category(mut self, name: impl Into<String>) -> Self {
        self.categories.insert(name.into());
        self
    }

    pub fn with_context_relevance(mut self, relevance: f64) -> Self {
        self.context_relevance = relevance;
        self
    }

    pub fn with_pattern_matches(mut self, count: usize) -> Self {
        self.pattern_matches = count;
        self
    }

    pub fn with_event_age(mut self, age: Duration) -> Self {
        self.event_age = Some(age);
        self
    }
}

/// Every term that went into a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub signal_sum: f64,
    pub category_bonus: f64,
    pub context_term: f64,
    pub pattern_term: f64,
    pub recency_bonus: f64,
    pub engagement_bonus: f64,
    /// Sum of all terms before override and clamping
    pub raw: f64,
    /// Whether the breakthrough override raised the score
    pub breakthrough_override: bool,
    pub final_score: f64,
    /// Highest-priority matched signal
    pub dominant_signal: Option<String>,
}

/// Deterministic scorer over a fixed configuration.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    config: ScoringConfig,
    floor: f64,
    ceiling: f64,
    permanent_threshold: f64,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig, retention: &RetentionConfig, tiers: &TierPolicy) -> Self {
        Self {
            config,
            floor: retention.score_floor,
            ceiling: retention.score_ceiling,
            permanent_threshold: tiers.entry_threshold(TierKind::Permanent),
        }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score an input.
    pub fn score(&self, input: &ScoreInput) -> ScoreBreakdown {
        let registry = &self.config.signals;

        let signal_sum: f64 = input
            .signals
            .iter()
            .map(|name| {
                registry.weight(name).unwrap_or_else(|| {
                    tracing::debug!(signal = %name, "Unknown signal contributes nothing");
                    0.0
                })
            })
            .sum();

        let category_bonus: f64 = input
            .categories
            .iter()
            .map(|name| {
                self.config.categories.bonus(name).unwrap_or_else(|| {
                    tracing::debug!(category = %name, "Unknown category contributes nothing");
                    0.0
                })
            })
            .sum();

        let relevance = if input.context_relevance.is_finite() {
            input.context_relevance.clamp(0.0, 100.0)
        } else {
            0.0
        };
        let context_term = relevance * self.config.context_relevance_weight;
        let pattern_term = input.pattern_matches as f64 * self.config.pattern_match_weight;
        let recency_bonus = self.recency_bonus(input.event_age);
        let engagement_bonus = self.engagement_bonus(input.signals.len());

        let raw = signal_sum
            + category_bonus
            + context_term
            + pattern_term
            + recency_bonus
            + engagement_bonus;

        let mut score = raw;
        let mut breakthrough_override = false;
        if input.signals.contains(signal_names::BREAKTHROUGH) && score < self.permanent_threshold {
            score = self.permanent_threshold;
            breakthrough_override = true;
        }
        let final_score = score.clamp(self.floor, self.ceiling.max(self.permanent_threshold));

        ScoreBreakdown {
            signal_sum,
            category_bonus,
            context_term,
            pattern_term,
            recency_bonus,
            engagement_bonus,
            raw,
            breakthrough_override,
            final_score,
            dominant_signal: registry.dominant(&input.signals).map(|d| d.name.clone()),
        }
    }

    /// Linear falloff from `recency_bonus_max` at age zero to nothing at the window.
    fn recency_bonus(&self, age: Option<Duration>) -> f64 {
        let Some(age) = age else {
            return 0.0;
        };
        let window = self.config.recency_window().num_seconds();
        if window <= 0 {
            return 0.0;
        }
        let age_secs = age.num_seconds().max(0);
        let remaining = 1.0 - (age_secs as f64 / window as f64);
        self.config.recency_bonus_max * remaining.clamp(0.0, 1.0)
    }

    fn engagement_bonus(&self, signal_count: usize) -> f64 {
        let extra = signal_count.saturating_sub(1) as f64;
        (extra * self.config.engagement_step).min(self.config.engagement_cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::category_names;

    fn engine() -> ScoringEngine {
        ScoringEngine::new(
            ScoringConfig::default(),
            &RetentionConfig::default(),
            &TierPolicy::default(),
        )
    }

    #[test]
    fn test_single_correction_scores_medium_term() {
        let engine = engine();
        let input = ScoreInput::new()
            .with_signal(signal_names::USER_CORRECTION)
            .with_context_relevance(0.0);

        let breakdown = engine.score(&input);
        assert_eq!(breakdown.raw, 3.0);
        assert_eq!(breakdown.final_score, 3.0);
        assert_eq!(TierPolicy::default().classify(breakdown.final_score), TierKind::MediumTerm);
    }

    #[test]
    fn test_all_terms_combine() {
        let engine = engine();
        let input = ScoreInput::new()
            .with_signal(signal_names::EXPLICIT_PREFERENCE)
            .with_signal(signal_names::SPECIFIC_DETAIL)
            .with_category(category_names::COLOR_PREFERENCE)
            .with_context_relevance(50.0)
            .with_pattern_matches(2)
            .with_event_age(Duration::hours(12));

        let b = engine.score(&input);
        assert_eq!(b.signal_sum, 3.5);
        assert_eq!(b.category_bonus, 1.0);
        assert!((b.context_term - 1.0).abs() < 1e-9);
        assert_eq!(b.pattern_term, 1.0);
        assert!((b.recency_bonus - 0.25).abs() < 1e-9);
        assert_eq!(b.engagement_bonus, 0.25);
        assert!((b.final_score - 7.0).abs() < 1e-9);
        assert_eq!(b.dominant_signal.as_deref(), Some(signal_names::EXPLICIT_PREFERENCE));
    }

    #[test]
    fn test_negative_signals_clamped_to_floor() {
        let engine = engine();
        let input = ScoreInput::new()
            .with_signal(signal_names::CONTRADICTION)
            .with_signal(signal_names::SMALL_TALK);

        let b = engine.score(&input);
        assert!(b.raw < 0.0);
        assert_eq!(b.final_score, RetentionConfig::default().score_floor);
    }

    #[test]
    fn test_breakthrough_override() {
        let engine = engine();
        let input = ScoreInput::new()
            .with_signal(signal_names::BREAKTHROUGH)
            .with_signal(signal_names::STALE_REFERENCE)
            .with_signal(signal_names::CONTRADICTION);

        let b = engine.score(&input);
        assert!(b.breakthrough_override);
        assert_eq!(b.final_score, 8.0);
        assert_eq!(TierPolicy::default().classify(b.final_score), TierKind::Permanent);
    }

    #[test]
    fn test_ceiling_applies() {
        let engine = engine();
        let mut input = ScoreInput::new()
            .with_context_relevance(100.0)
            .with_pattern_matches(20);
        for name in [
            signal_names::USER_CORRECTION,
            signal_names::EXPLICIT_PREFERENCE,
            signal_names::DECISION,
        ] {
            input = input.with_signal(name);
        }
        assert_eq!(engine.score(&input).final_score, 10.0);
    }

    #[test]
    fn test_unknown_names_ignored() {
        let engine = engine();
        let input = ScoreInput::new()
            .with_signal("NOT_A_SIGNAL")
            .with_signal(signal_names::DECISION)
            .with_category("not_a_category");
        let b = engine.score(&input);
        assert_eq!(b.signal_sum, 2.0);
        assert_eq!(b.category_bonus, 0.0);
    }

    #[test]
    fn test_recency_bonus_bounds() {
        let engine = engine();
        let fresh = engine.score(&ScoreInput::new().with_event_age(Duration::zero()));
        let stale = engine.score(&ScoreInput::new().with_event_age(Duration::days(3)));
        let future = engine.score(&ScoreInput::new().with_event_age(Duration::hours(-2)));
        assert_eq!(fresh.recency_bonus, 0.5);
        assert_eq!(stale.recency_bonus, 0.0);
        assert_eq!(future.recency_bonus, 0.5);
    }

    #[test]
    fn test_relevance_clamped() {
        let engine = engine();
        let b = engine.score(&ScoreInput::new().with_context_relevance(500.0));
        assert_eq!(b.context_term, 2.0);
        let b = engine.score(&ScoreInput::new().with_context_relevance(f64::NAN));
        assert_eq!(b.context_term, 0.0);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let engine = engine();
        let input = ScoreInput::new()
            .with_signal(signal_names::DECISION)
            .with_category(category_names::LAYOUT_PREFERENCE)
            .with_context_relevance(33.3);
        assert_eq!(engine.score(&input), engine.score(&input));
    }
}

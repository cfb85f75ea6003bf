//! Retention tiers and the score-to-tier classifier.
//!
//! Four ranked tiers partition the score axis:
//!
//! - **Permanent**: identity-level facts, corrections, breakthroughs
//! - **LongTerm**: durable preferences and project context
//! - **MediumTerm**: useful but fading details
//! - **Disposable**: small talk and noise, the fallback for any score

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Retention tier, ordered by rank (Disposable lowest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    Disposable,
    MediumTerm,
    LongTerm,
    Permanent,
}

impl TierKind {
    /// All tiers from highest to lowest rank.
    pub const DESCENDING: [TierKind; 4] = [
        TierKind::Permanent,
        TierKind::LongTerm,
        TierKind::MediumTerm,
        TierKind::Disposable,
    ];

    /// Numeric rank (0 = Disposable).
    pub fn rank(&self) -> u8 {
        *self as u8
    }
}

impl std::fmt::Display for TierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disposable => write!(f, "disposable"),
            Self::MediumTerm => write!(f, "medium_term"),
            Self::LongTerm => write!(f, "long_term"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

/// Static parameters of one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierDefinition {
    pub kind: TierKind,
    /// Minimum score for a record to sit in this tier
    pub entry_threshold: f64,
    /// Score lost per week without access or reinforcement
    pub decay_rate_per_week: f64,
    /// Nominal retention window in days (`None` = indefinite)
    pub retention_days: Option<u32>,
}

impl TierDefinition {
    pub fn new(
        kind: TierKind,
        entry_threshold: f64,
        decay_rate_per_week: f64,
        retention_days: Option<u32>,
    ) -> Self {
        Self {
            kind,
            entry_threshold,
            decay_rate_per_week,
            retention_days,
        }
    }

    /// Nominal retention window, if bounded.
    pub fn retention_window(&self) -> Option<Duration> {
        self.retention_days.map(|d| Duration::days(i64::from(d)))
    }
}

/// The full tier table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierPolicy {
    /// Tier definitions, kept sorted by descending entry threshold
    tiers: Vec<TierDefinition>,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            tiers: vec![
                TierDefinition::new(TierKind::Permanent, 8.0, 0.02, None),
                TierDefinition::new(TierKind::LongTerm, 5.0, 0.1, Some(365)),
                TierDefinition::new(TierKind::MediumTerm, 2.0, 0.3, Some(90)),
                TierDefinition::new(TierKind::Disposable, 0.0, 1.0, Some(7)),
            ],
        }
    }
}

impl TierPolicy {
    /// Build a policy from four definitions, one per tier.
    pub fn new(mut tiers: Vec<TierDefinition>) -> Result<Self> {
        tiers.sort_by(|a, b| b.kind.cmp(&a.kind));
        let policy = Self { tiers };
        policy.validate()?;
        Ok(policy)
    }

    /// Check that the table covers every tier once and partitions the axis.
    pub fn validate(&self) -> Result<()> {
        if self.tiers.len() != TierKind::DESCENDING.len() {
            return Err(Error::config(format!(
                "tier policy needs exactly 4 tiers, got {}",
                self.tiers.len()
            )));
        }

        for (def, expected) in self.tiers.iter().zip(TierKind::DESCENDING) {
            if def.kind != expected {
                return Err(Error::config(format!(
                    "tier {} missing or duplicated",
                    expected
                )));
            }
            if !def.entry_threshold.is_finite() || !def.decay_rate_per_week.is_finite() {
                return Err(Error::config(format!("tier {} has non-finite values", def.kind)));
            }
            if def.decay_rate_per_week < 0.0 {
                return Err(Error::config(format!(
                    "tier {} has negative decay rate",
                    def.kind
                )));
            }
        }

        for pair in self.tiers.windows(2) {
            if pair[0].entry_threshold <= pair[1].entry_threshold {
                return Err(Error::config(format!(
                    "tier thresholds must strictly descend ({} <= {})",
                    pair[0].kind, pair[1].kind
                )));
            }
        }

        if self.definition(TierKind::Disposable).entry_threshold != 0.0 {
            return Err(Error::config("disposable tier threshold must be 0"));
        }

        Ok(())
    }

    /// Highest-ranked tier whose threshold the score meets.
    ///
    /// Disposable is the fallback for negative and non-finite scores.
    pub fn classify(&self, score: f64) -> TierKind {
        self.tiers
            .iter()
            .find(|t| t.entry_threshold <= score)
            .map(|t| t.kind)
            .unwrap_or(TierKind::Disposable)
    }

    /// Definition for a tier.
    pub fn definition(&self, kind: TierKind) -> &TierDefinition {
        // validate() guarantees one entry per tier in descending rank order
        let idx = TierKind::DESCENDING
            .iter()
            .position(|k| *k == kind)
            .unwrap_or(TierKind::DESCENDING.len() - 1);
        &self.tiers[idx.min(self.tiers.len().saturating_sub(1))]
    }

    pub fn decay_rate(&self, kind: TierKind) -> f64 {
        self.definition(kind).decay_rate_per_week
    }

    pub fn entry_threshold(&self, kind: TierKind) -> f64 {
        self.definition(kind).entry_threshold
    }

    /// Definitions from highest to lowest rank.
    pub fn tiers(&self) -> &[TierDefinition] {
        &self.tiers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_default_thresholds() {
        let policy = TierPolicy::default();
        assert_eq!(policy.classify(9.0), TierKind::Permanent);
        assert_eq!(policy.classify(8.0), TierKind::Permanent);
        assert_eq!(policy.classify(7.99), TierKind::LongTerm);
        assert_eq!(policy.classify(5.0), TierKind::LongTerm);
        assert_eq!(policy.classify(3.0), TierKind::MediumTerm);
        assert_eq!(policy.classify(1.8), TierKind::Disposable);
        assert_eq!(policy.classify(0.0), TierKind::Disposable);
    }

    #[test]
    fn test_classify_negative_and_nan() {
        let policy = TierPolicy::default();
        assert_eq!(policy.classify(-4.0), TierKind::Disposable);
        assert_eq!(policy.classify(f64::NAN), TierKind::Disposable);
        assert_eq!(policy.classify(f64::INFINITY), TierKind::Permanent);
    }

    #[test]
    fn test_tier_ordering() {
        assert!(TierKind::Permanent > TierKind::LongTerm);
        assert!(TierKind::LongTerm > TierKind::MediumTerm);
        assert!(TierKind::MediumTerm > TierKind::Disposable);
        assert_eq!(TierKind::Disposable.rank(), 0);
        assert_eq!(TierKind::Permanent.rank(), 3);
    }

    #[test]
    fn test_new_sorts_and_validates() {
        let policy = TierPolicy::new(vec![
            TierDefinition::new(TierKind::Disposable, 0.0, 2.0, Some(3)),
            TierDefinition::new(TierKind::Permanent, 9.0, 0.0, None),
            TierDefinition::new(TierKind::MediumTerm, 3.0, 0.5, Some(30)),
            TierDefinition::new(TierKind::LongTerm, 6.0, 0.2, Some(180)),
        ])
        .unwrap();

        assert_eq!(policy.tiers()[0].kind, TierKind::Permanent);
        assert_eq!(policy.decay_rate(TierKind::Disposable), 2.0);
        assert_eq!(policy.classify(6.5), TierKind::LongTerm);
        assert_eq!(
            policy.definition(TierKind::MediumTerm).retention_window(),
            Some(Duration::days(30))
        );
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let result = TierPolicy::new(vec![
            TierDefinition::new(TierKind::Permanent, 5.0, 0.0, None),
            TierDefinition::new(TierKind::LongTerm, 5.0, 0.1, None),
            TierDefinition::new(TierKind::MediumTerm, 2.0, 0.3, None),
            TierDefinition::new(TierKind::Disposable, 0.0, 1.0, None),
        ]);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_nonzero_disposable() {
        let result = TierPolicy::new(vec![
            TierDefinition::new(TierKind::Permanent, 8.0, 0.0, None),
            TierDefinition::new(TierKind::LongTerm, 5.0, 0.1, None),
            TierDefinition::new(TierKind::MediumTerm, 2.0, 0.3, None),
            TierDefinition::new(TierKind::Disposable, 1.0, 1.0, None),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_missing_tier() {
        let result = TierPolicy::new(vec![
            TierDefinition::new(TierKind::Permanent, 8.0, 0.0, None),
            TierDefinition::new(TierKind::Disposable, 0.0, 1.0, None),
        ]);
        assert!(result.is_err());
    }
}

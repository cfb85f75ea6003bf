//! Memory record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::tier::TierKind;

/// Unique identifier for a memory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Generate a new random memory ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from string.
    pub fn parse(s: &str) -> std::result::Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque owner identifier records are partitioned by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Check length and character set: `[A-Za-z0-9_.:@-]`, non-empty.
    pub fn validate(&self, max_len: usize) -> Result<()> {
        if self.0.is_empty() {
            return Err(Error::invalid_input("owner id is empty"));
        }
        if self.0.chars().count() > max_len {
            return Err(Error::invalid_input(format!(
                "owner id longer than {} characters",
                max_len
            )));
        }
        if let Some(bad) = self
            .0
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '@' | '-')))
        {
            return Err(Error::invalid_input(format!(
                "owner id contains invalid character {:?}",
                bad
            )));
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for OwnerId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A scored, tiered representation of one ingested interaction.
///
/// Values handed out by the store are snapshots; only the store mutates
/// the canonical copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: MemoryId,
    pub owner_id: OwnerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub last_reinforced_at: DateTime<Utc>,
    pub tier_changed_at: DateTime<Utc>,
    /// Instant the last decay pass was applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_decayed_at: Option<DateTime<Utc>>,
    pub original_score: f64,
    pub current_score: f64,
    pub tier: TierKind,
    /// Fixed at creation
    pub signals: BTreeSet<String>,
    /// Fixed at creation
    pub categories: BTreeSet<String>,
    pub access_count: u64,
    pub reinforcement_count: u64,
    pub marked_for_deletion: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_eligible_at: Option<DateTime<Utc>>,
}

impl MemoryRecord {
    /// Instant decay is measured from: the latest access, reinforcement, or decay pass.
    pub fn decay_anchor(&self) -> DateTime<Utc> {
        let touched = self.last_accessed_at.max(self.last_reinforced_at);
        match self.last_decayed_at {
            Some(decayed) => touched.max(decayed),
            None => touched,
        }
    }

    /// Whether any of the record's signals exempts it from decay.
    pub fn is_decay_exempt(&self, exempt: &BTreeSet<String>) -> bool {
        self.signals.iter().any(|s| exempt.contains(s))
    }

    /// Whether the deletion grace period has fully elapsed at `now`.
    pub fn is_purgeable(&self, now: DateTime<Utc>) -> bool {
        self.marked_for_deletion && self.deletion_eligible_at.is_some_and(|at| at <= now)
    }

    pub fn has_signal(&self, name: &str) -> bool {
        self.signals.contains(name)
    }

    pub fn has_category(&self, name: &str) -> bool {
        self.categories.contains(name)
    }
}

/// Payload for [`crate::memory::MemoryStore::create`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewMemory {
    pub owner_id: OwnerId,
    pub session_id: Option<String>,
    pub text: String,
    pub signals: BTreeSet<String>,
    pub categories: BTreeSet<String>,
    pub score: f64,
}

impl NewMemory {
    pub fn new(owner_id: impl Into<OwnerId>, text: impl Into<String>, score: f64) -> Self {
        Self {
            owner_id: owner_id.into(),
            session_id: None,
            text: text.into(),
            signals: BTreeSet::new(),
            categories: BTreeSet::new(),
            score,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_signal(mut self, name: impl Into<String>) -> Self {
        self.signals.insert(name.into());
        self
    }

    pub fn with_signals(mut self, names: BTreeSet<String>) -> Self {
        self.signals = names;
        self
    }

    pub fn with_category(mut self, name: impl Into<String>) -> Self {
        self.categories.insert(name.into());
        self
    }

    pub fn with_categories(mut self, names: BTreeSet<String>) -> Self {
        self.categories = names;
        self
    }
}

/// Filters for listing an owner's records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordQuery {
    /// Restrict to these tiers
    pub tiers: Option<Vec<TierKind>>,
    /// Minimum current score
    pub min_score: Option<f64>,
    /// Skip records marked for deletion
    pub exclude_marked: bool,
    /// Restrict to one session
    pub session_id: Option<String>,
    pub limit: Option<usize>,
}

impl RecordQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tiers(mut self, tiers: Vec<TierKind>) -> Self {
        self.tiers = Some(tiers);
        self
    }

    pub fn min_score(mut self, score: f64) -> Self {
        self.min_score = Some(score);
        self
    }

    pub fn exclude_marked(mut self) -> Self {
        self.exclude_marked = true;
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &MemoryRecord) -> bool {
        if let Some(ref tiers) = self.tiers {
            if !tiers.contains(&record.tier) {
                return false;
            }
        }
        if let Some(min) = self.min_score {
            if record.current_score < min {
                return false;
            }
        }
        if self.exclude_marked && record.marked_for_deletion {
            return false;
        }
        if let Some(ref session) = self.session_id {
            if record.session_id.as_ref() != Some(session) {
                return false;
            }
        }
        true
    }
}

/// Why a record changed tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    Access,
    Reinforcement,
    Decay,
    /// The tier table was replaced and the record reclassified
    PolicyChange,
}

/// Entry in the tier evolution log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierTransition {
    pub memory_id: MemoryId,
    pub from: TierKind,
    pub to: TierKind,
    pub score: f64,
    pub reason: TransitionReason,
    pub at: DateTime<Utc>,
}

impl TierTransition {
    pub fn is_promotion(&self) -> bool {
        self.to > self.from
    }
}

//! Per-owner profiles and preference learning.
//!
//! High-value records carrying a routed category (color, typography,
//! layout, industry, performance) cast weighted votes into the owner's
//! preference maps. Learning is a best-effort side channel: the engine
//! logs and drops any failure here, it never affects record creation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, LazyLock};

use crate::config::ProfileConfig;
use crate::error::{Error, Result};
use crate::memory::{MemoryId, MemoryRecord, OwnerId};
use crate::signals::CategoryRegistry;

/// Preference map a category can feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceKind {
    Color,
    Typography,
    Layout,
    Industry,
    Performance,
}

impl std::fmt::Display for PreferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Color => write!(f, "color"),
            Self::Typography => write!(f, "typography"),
            Self::Layout => write!(f, "layout"),
            Self::Industry => write!(f, "industry"),
            Self::Performance => write!(f, "performance"),
        }
    }
}

/// One owner's accumulated state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub owner_id: OwnerId,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub interaction_count: u64,
    /// Weighted observations per preference kind
    pub preferences: BTreeMap<PreferenceKind, BTreeMap<String, f64>>,
    /// Most recent first, bounded
    pub recent_memory_ids: VecDeque<MemoryId>,
}

impl UserProfile {
    pub fn new(owner_id: OwnerId, at: DateTime<Utc>) -> Self {
        Self {
            owner_id,
            created_at: at,
            last_active_at: at,
            interaction_count: 0,
            preferences: BTreeMap::new(),
            recent_memory_ids: VecDeque::new(),
        }
    }

    fn record_interaction(&mut self, memory_id: MemoryId, at: DateTime<Utc>, capacity: usize) {
        self.last_active_at = self.last_active_at.max(at);
        self.interaction_count += 1;
        self.recent_memory_ids.push_front(memory_id);
        self.recent_memory_ids.truncate(capacity);
    }

    fn vote(&mut self, kind: PreferenceKind, value: &str, weight: f64) {
        *self
            .preferences
            .entry(kind)
            .or_default()
            .entry(value.to_string())
            .or_insert(0.0) += weight;
    }

    /// Top `n` positively weighted values per kind.
    pub fn snapshot(&self, n: usize) -> PreferenceSnapshot {
        let top = self
            .preferences
            .iter()
            .filter_map(|(kind, values)| {
                let mut ranked: Vec<WeightedValue> = values
                    .iter()
                    .filter(|(_, w)| **w > 0.0)
                    .map(|(v, w)| WeightedValue {
                        value: v.clone(),
                        weight: *w,
                    })
                    .collect();
                ranked.sort_by(|a, b| {
                    b.weight
                        .total_cmp(&a.weight)
                        .then_with(|| a.value.cmp(&b.value))
                });
                ranked.truncate(n);
                (!ranked.is_empty()).then_some((*kind, ranked))
            })
            .collect();
        PreferenceSnapshot { top }
    }
}

/// A preference value with its accumulated weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedValue {
    pub value: String,
    pub weight: f64,
}

/// Strongest learned preferences, per kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferenceSnapshot {
    pub top: BTreeMap<PreferenceKind, Vec<WeightedValue>>,
}

impl PreferenceSnapshot {
    /// Strongest value for a kind.
    pub fn strongest(&self, kind: PreferenceKind) -> Option<&str> {
        self.top
            .get(&kind)
            .and_then(|v| v.first())
            .map(|w| w.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.top.is_empty()
    }
}

/// Concurrent per-owner profile map, lazily populated.
///
/// Each owner's profile is only ever mutated under its own map entry, so
/// distinct owners don't contend beyond shard granularity.
pub struct ProfileRegistry {
    profiles: DashMap<OwnerId, UserProfile>,
    recent_capacity: usize,
}

impl ProfileRegistry {
    pub fn new(recent_capacity: usize) -> Self {
        Self {
            profiles: DashMap::new(),
            recent_capacity,
        }
    }

    /// Note a new interaction, creating the profile on first sight.
    pub fn record_interaction(
        &self,
        owner: &OwnerId,
        memory_id: MemoryId,
        at: DateTime<Utc>,
    ) -> UserProfile {
        let mut entry = self
            .profiles
            .entry(owner.clone())
            .or_insert_with(|| UserProfile::new(owner.clone(), at));
        entry.record_interaction(memory_id, at, self.recent_capacity);
        entry.clone()
    }

    /// Snapshot of an owner's profile.
    pub fn get(&self, owner: &OwnerId) -> Option<UserProfile> {
        self.profiles.get(owner).map(|p| p.clone())
    }

    /// Recent memory ids, most recent first.
    pub fn recent_ids(&self, owner: &OwnerId) -> Vec<MemoryId> {
        self.profiles
            .get(owner)
            .map(|p| p.recent_memory_ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Apply preference votes to an existing profile.
    pub fn apply_votes(&self, owner: &OwnerId, votes: &[PreferenceVote]) -> Result<()> {
        let mut profile = self
            .profiles
            .get_mut(owner)
            .ok_or_else(|| Error::not_found("user profile", owner))?;
        for vote in votes {
            profile.vote(vote.kind, &vote.value, vote.weight);
        }
        Ok(())
    }

    /// Drop the given ids from an owner's recent list, leaving any others.
    pub fn forget_recent(&self, owner: &OwnerId, ids: &[MemoryId]) {
        if let Some(mut profile) = self.profiles.get_mut(owner) {
            profile.recent_memory_ids.retain(|id| !ids.contains(id));
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// A single weighted observation.
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceVote {
    pub kind: PreferenceKind,
    pub value: String,
    pub weight: f64,
}

/// Side channel notified after each record is created.
#[async_trait]
pub trait PreferenceFeedback: Send + Sync {
    /// Sink name used in logs.
    fn name(&self) -> &str;

    /// Observe a freshly created record.
    async fn observe(&self, record: &MemoryRecord) -> Result<()>;
}

static COLOR_VALUES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(#(?:[0-9a-f]{6}|[0-9a-f]{3})\b|\b(red|blue|green|yellow|orange|purple|pink|black|white|gr[ae]y|teal|navy|pastel|dark mode|light mode)\b)")
        .expect("invalid regex")
});

static TYPOGRAPHY_VALUES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(sans[- ]serif|serif|monospace|bold|italic|inter|roboto|helvetica|georgia|arial)\b")
        .expect("invalid regex")
});

static LAYOUT_VALUES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(grid|columns?|sidebar|navbar|hero|cards?|minimal(ist)?|responsive|spacing|whitespace)\b")
        .expect("invalid regex")
});

static INDUSTRY_VALUES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(fintech|healthcare|e-?commerce|saas|retail|education|real estate|restaurant|nonprofit|legal|finance|gaming|travel|fashion)\b")
        .expect("invalid regex")
});

static PERFORMANCE_VALUES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(fast|speed|load(ing)? time|latency|lightweight|seo|lighthouse|core web vitals|mobile[- ]first)\b")
        .expect("invalid regex")
});

static AVERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(hate|dislike|don'?t (like|want|use)|never use|avoid|no more|get rid of|remove)\b")
        .expect("invalid regex")
});

/// Distinct values of `kind` mentioned in `text`, in first-seen order.
pub fn extract_values(kind: PreferenceKind, text: &str) -> Vec<String> {
    let pattern: &Regex = match kind {
        PreferenceKind::Color => &COLOR_VALUES,
        PreferenceKind::Typography => &TYPOGRAPHY_VALUES,
        PreferenceKind::Layout => &LAYOUT_VALUES,
        PreferenceKind::Industry => &INDUSTRY_VALUES,
        PreferenceKind::Performance => &PERFORMANCE_VALUES,
    };

    let lowered = text.to_lowercase();
    let mut values: Vec<String> = Vec::new();
    for m in pattern.find_iter(&lowered) {
        let value = m.as_str().replace('-', " ");
        if !values.contains(&value) {
            values.push(value);
        }
    }
    values
}

/// Built-in learner feeding [`ProfileRegistry`] preference maps.
pub struct PreferenceLearner {
    profiles: Arc<ProfileRegistry>,
    categories: CategoryRegistry,
    config: ProfileConfig,
}

impl PreferenceLearner {
    pub fn new(
        profiles: Arc<ProfileRegistry>,
        categories: CategoryRegistry,
        config: ProfileConfig,
    ) -> Self {
        Self {
            profiles,
            categories,
            config,
        }
    }

    /// Votes a record would cast; empty when it doesn't qualify.
    pub fn votes_for(&self, record: &MemoryRecord) -> Vec<PreferenceVote> {
        if record.current_score < self.config.learning_min_score {
            return Vec::new();
        }

        let routes = self.categories.learning_routes(&record.categories);
        if routes.is_empty() {
            return Vec::new();
        }

        let sign = if AVERSION_PATTERN.is_match(&record.text.to_lowercase()) {
            -1.0
        } else {
            1.0
        };
        let weight = sign * record.current_score * self.config.learning_rate;

        routes
            .into_iter()
            .flat_map(|kind| {
                extract_values(kind, &record.text)
                    .into_iter()
                    .map(move |value| PreferenceVote {
                        kind,
                        value,
                        weight,
                    })
            })
            .collect()
    }
}

#[async_trait]
impl PreferenceFeedback for PreferenceLearner {
    fn name(&self) -> &str {
        "preference_learner"
    }

    async fn observe(&self, record: &MemoryRecord) -> Result<()> {
        let votes = self.votes_for(record);
        if votes.is_empty() {
            return Ok(());
        }

        self.profiles.apply_votes(&record.owner_id, &votes)?;
        tracing::debug!(
            memory_id = %record.id,
            owner = %record.owner_id,
            votes = votes.len(),
            "Preference votes applied"
        );
        Ok(())
    }
}

//! Read-only per-owner context for downstream consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::memory::{MemoryRecord, MemoryStore, OwnerId, RecordQuery};
use crate::preferences::{PreferenceSnapshot, ProfileRegistry, UserProfile};
use crate::tier::TierKind;

/// Everything known about an owner at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub owner: OwnerId,
    /// `None` until the owner's first interaction
    pub profile: Option<UserProfile>,
    /// Most recent first; purged records are skipped
    pub recent_records: Vec<MemoryRecord>,
    /// Long-term and permanent records, highest score first
    pub key_records: Vec<MemoryRecord>,
    pub preferences: PreferenceSnapshot,
    pub generated_at: DateTime<Utc>,
}

impl UserContext {
    /// Context for an owner with no history.
    pub fn empty(owner: OwnerId, at: DateTime<Utc>) -> Self {
        Self {
            owner,
            profile: None,
            recent_records: Vec::new(),
            key_records: Vec::new(),
            preferences: PreferenceSnapshot::default(),
            generated_at: at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.profile.is_none() && self.recent_records.is_empty()
    }

    /// Texts of the recent records, most recent first.
    pub fn recent_texts(&self) -> impl Iterator<Item = &str> {
        self.recent_records.iter().map(|r| r.text.as_str())
    }
}

/// Assembles [`UserContext`] values from the store and profile registry.
pub struct ContextAggregator {
    store: Arc<MemoryStore>,
    profiles: Arc<ProfileRegistry>,
    top_n: usize,
    key_limit: usize,
}

impl ContextAggregator {
    pub fn new(store: Arc<MemoryStore>, profiles: Arc<ProfileRegistry>, top_n: usize) -> Self {
        Self {
            store,
            profiles,
            top_n,
            key_limit: 5,
        }
    }

    pub fn with_key_limit(mut self, limit: usize) -> Self {
        self.key_limit = limit;
        self
    }

    /// Build the context for `owner`; never fails, unknown owners get an empty one.
    pub fn build(&self, owner: &OwnerId, at: DateTime<Utc>) -> UserContext {
        let Some(profile) = self.profiles.get(owner) else {
            return UserContext::empty(owner.clone(), at);
        };

        let ids: Vec<_> = profile.recent_memory_ids.iter().copied().collect();
        let recent_records = self.store.get_many(&ids);
        if recent_records.len() < ids.len() {
            let missing: Vec<_> = ids
                .iter()
                .copied()
                .filter(|id| !recent_records.iter().any(|r| r.id == *id))
                .collect();
            self.profiles.forget_recent(owner, &missing);
            tracing::debug!(
                owner = %owner,
                dropped = missing.len(),
                "Pruned purged ids from recent list"
            );
        }

        let key_records = self.key_records(owner);
        let preferences = profile.snapshot(self.top_n);

        UserContext {
            owner: owner.clone(),
            profile: Some(profile),
            recent_records,
            key_records,
            preferences,
            generated_at: at,
        }
    }

    fn key_records(&self, owner: &OwnerId) -> Vec<MemoryRecord> {
        let query = RecordQuery::new()
            .tiers(vec![TierKind::Permanent, TierKind::LongTerm])
            .exclude_marked();
        let mut records = self.store.list(owner, &query);
        records.sort_by(|a, b| {
            b.current_score
                .total_cmp(&a.current_score)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        records.truncate(self.key_limit);
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::config::RetentionConfig;
    use crate::memory::NewMemory;
    use crate::tier::TierPolicy;
    use chrono::TimeZone;

    fn setup() -> (Arc<ManualClock>, Arc<MemoryStore>, Arc<ProfileRegistry>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStore::new(
            TierPolicy::default(),
            RetentionConfig::default(),
            clock.clone(),
        ));
        (clock, store, Arc::new(ProfileRegistry::new(10)))
    }

    #[test]
    fn test_unknown_owner_gets_empty_context() {
        let (clock, store, profiles) = setup();
        let aggregator = ContextAggregator::new(store, profiles, 3);

        let ctx = aggregator.build(&OwnerId::new("nobody"), clock.now());
        assert!(ctx.is_empty());
        assert!(ctx.preferences.is_empty());
    }

    #[test]
    fn test_recent_and_key_records() {
        let (clock, store, profiles) = setup();
        let owner = OwnerId::new("alice");

        for (text, score) in [("first", 9.0), ("second", 3.0), ("third", 6.0)] {
            let r = store.create(NewMemory::new(owner.clone(), text, score));
            profiles.record_interaction(&owner, r.id, clock.now());
        }

        let aggregator = ContextAggregator::new(store, profiles, 3);
        let ctx = aggregator.build(&owner, clock.now());

        let texts: Vec<_> = ctx.recent_texts().collect();
        assert_eq!(texts, vec!["third", "second", "first"]);
        let key: Vec<_> = ctx.key_records.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(key, vec!["first", "third"]);
        assert_eq!(ctx.profile.unwrap().interaction_count, 3);
    }

    #[test]
    fn test_removed_records_pruned_from_recent() {
        let (clock, store, profiles) = setup();
        let owner = OwnerId::new("bob");

        let keep = store.create(NewMemory::new(owner.clone(), "keep", 3.0));
        let gone = store.create(NewMemory::new(owner.clone(), "gone", 3.0));
        profiles.record_interaction(&owner, keep.id, clock.now());
        profiles.record_interaction(&owner, gone.id, clock.now());
        store.remove(&gone.id).unwrap();

        let aggregator = ContextAggregator::new(store, profiles.clone(), 3);
        let ctx = aggregator.build(&owner, clock.now());

        assert_eq!(ctx.recent_records.len(), 1);
        assert_eq!(profiles.recent_ids(&owner), vec![keep.id]);
    }
}

//! In-process memory record store.
//!
//! Records live in a sharded map of individually locked cells. Mutations
//! of one record are serialized by that record's lock; operations on
//! distinct records only contend on the map shard for the instant it takes
//! to clone the cell handle. A shard guard is never held while a record
//! lock is being acquired.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::clock::Clock;
use crate::config::RetentionConfig;
use crate::error::{Error, Result};
use crate::memory::types::*;
use crate::tier::{TierKind, TierPolicy};

type RecordCell = Arc<Mutex<MemoryRecord>>;

const MILLIS_PER_WEEK: f64 = 7.0 * 24.0 * 60.0 * 60.0 * 1000.0;

/// Outcome of a store-wide decay pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecayReport {
    /// Records examined successfully
    pub processed: usize,
    /// Records whose score went down
    pub decayed: usize,
    /// Records reclassified into a higher tier
    pub promoted: usize,
    /// Records reclassified into a lower tier
    pub demoted: usize,
    /// Records skipped because they carry a decay-exempt signal
    pub exempt: usize,
    /// Records newly marked for deletion
    pub purge_candidates: usize,
    /// Records that could not be processed
    pub failures: Vec<RecordFailure>,
}

/// Outcome of a purge pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PurgeReport {
    pub purged: Vec<MemoryId>,
    pub failures: Vec<RecordFailure>,
}

/// A single record that failed during a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub memory_id: MemoryId,
    pub error: String,
}

/// Aggregate statistics about the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_records: usize,
    /// Count per tier; every tier is present
    pub per_tier: BTreeMap<TierKind, usize>,
    pub average_score: f64,
    pub marked_for_deletion: usize,
    /// Records skipped because their lock was poisoned
    pub unreadable_records: usize,
}

#[derive(Debug, Default)]
struct DecayOutcome {
    decayed: bool,
    exempt: bool,
    newly_marked: bool,
    transition: Option<TierTransition>,
}

/// Store owning every memory record.
pub struct MemoryStore {
    records: DashMap<MemoryId, RecordCell>,
    /// Record ids per owner, so owner reads never touch other owners' records
    by_owner: DashMap<OwnerId, Vec<MemoryId>>,
    policy: RwLock<Arc<TierPolicy>>,
    retention: RetentionConfig,
    clock: Arc<dyn Clock>,
    evolution: Mutex<VecDeque<TierTransition>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new(policy: TierPolicy, retention: RetentionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            by_owner: DashMap::new(),
            policy: RwLock::new(Arc::new(policy)),
            retention,
            clock,
            evolution: Mutex::new(VecDeque::new()),
        }
    }

    pub fn retention(&self) -> &RetentionConfig {
        &self.retention
    }

    /// Current tier table.
    pub fn policy(&self) -> Arc<TierPolicy> {
        match self.policy.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Swap the tier table. Records are reclassified on the next decay pass.
    pub fn replace_policy(&self, policy: TierPolicy) -> Result<()> {
        policy.validate()?;
        let mut guard = self
            .policy
            .write()
            .map_err(|e| Error::Internal(format!("Failed to lock tier policy: {}", e)))?;
        *guard = Arc::new(policy);
        tracing::info!("Tier policy replaced");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // ==================== Record Operations ====================

    /// Create a record from freshly scored interaction.
    pub fn create(&self, new: NewMemory) -> MemoryRecord {
        let now = self.clock.now();
        let policy = self.policy();
        let tier = policy.classify(new.score);

        let record = MemoryRecord {
            id: MemoryId::new(),
            owner_id: new.owner_id,
            session_id: new.session_id,
            text: new.text,
            created_at: now,
            last_accessed_at: now,
            last_reinforced_at: now,
            tier_changed_at: now,
            last_decayed_at: None,
            original_score: new.score,
            current_score: new.score,
            tier,
            signals: new.signals,
            categories: new.categories,
            access_count: 0,
            reinforcement_count: 0,
            marked_for_deletion: false,
            deletion_eligible_at: None,
        };

        tracing::debug!(
            memory_id = %record.id,
            owner = %record.owner_id,
            score = record.current_score,
            tier = %record.tier,
            "Memory record created"
        );

        self.records
            .insert(record.id, Arc::new(Mutex::new(record.clone())));
        self.by_owner
            .entry(record.owner_id.clone())
            .or_default()
            .push(record.id);
        record
    }

    /// Get a snapshot of a record.
    pub fn get(&self, id: &MemoryId) -> Result<MemoryRecord> {
        let cell = self.cell(id)?;
        let guard = lock_record(&cell)?;
        Ok(guard.clone())
    }

    /// Snapshots of several records, skipping unknown ids, in the given order.
    pub fn get_many(&self, ids: &[MemoryId]) -> Vec<MemoryRecord> {
        ids.iter().filter_map(|id| self.get(id).ok()).collect()
    }

    /// Record a passive access: small boost, counters, deletion mark cleared if lifted.
    pub fn access(&self, id: &MemoryId) -> Result<MemoryRecord> {
        let boost = self.retention.access_boost;
        self.boost(id, boost, TransitionReason::Access, |record, now| {
            record.last_accessed_at = now;
            record.access_count += 1;
        })
    }

    /// Record an explicit reinforcement scaled by `strength`.
    pub fn reinforce(&self, id: &MemoryId, strength: f64) -> Result<MemoryRecord> {
        let max = self.retention.max_reinforcement_strength;
        if !strength.is_finite() || strength <= 0.0 || strength > max {
            return Err(Error::invalid_input(format!(
                "reinforcement strength must be in (0, {}], got {}",
                max, strength
            )));
        }

        let boost = self.retention.reinforcement_boost * strength;
        self.boost(id, boost, TransitionReason::Reinforcement, |record, now| {
            record.last_reinforced_at = now;
            record.reinforcement_count += 1;
        })
    }

    fn boost<F>(
        &self,
        id: &MemoryId,
        amount: f64,
        reason: TransitionReason,
        touch: F,
    ) -> Result<MemoryRecord>
    where
        F: FnOnce(&mut MemoryRecord, DateTime<Utc>),
    {
        let cell = self.cell(id)?;
        let policy = self.policy();
        let floor = self.retention.score_floor;
        let ceiling = self.retention.score_ceiling;

        let (snapshot, transition) = {
            let mut record = lock_record(&cell)?;
            if !self.records.contains_key(id) {
                // purged between lookup and lock
                return Err(Error::not_found("memory record", id));
            }

            let now = self.clock.now();
            let score = record.current_score;
            record.current_score = (score + amount).min(ceiling).max(score);
            touch(&mut record, now);

            if record.marked_for_deletion && record.current_score > floor {
                record.marked_for_deletion = false;
                record.deletion_eligible_at = None;
                tracing::debug!(memory_id = %id, "Deletion mark cleared");
            }

            let transition = reclassify(&mut record, &policy, reason, now);
            (record.clone(), transition)
        };

        if let Some(t) = transition {
            self.log_transition(t);
        }

        tracing::debug!(
            memory_id = %id,
            ?reason,
            score = snapshot.current_score,
            tier = %snapshot.tier,
            "Memory record boosted"
        );

        Ok(snapshot)
    }

    /// Remove a record outright.
    pub fn remove(&self, id: &MemoryId) -> Result<MemoryRecord> {
        let cell = self.cell(id)?;
        let record = lock_record(&cell)?;
        match self.records.remove_if(id, |_, v| Arc::ptr_eq(v, &cell)) {
            Some(_) => {
                self.unindex(&record.owner_id, id);
                Ok(record.clone())
            }
            None => Err(Error::not_found("memory record", id)),
        }
    }

    /// An owner's records matching `query`, most recently accessed first.
    pub fn list(&self, owner: &OwnerId, query: &RecordQuery) -> Vec<MemoryRecord> {
        let ids = self
            .by_owner
            .get(owner)
            .map(|ids| ids.clone())
            .unwrap_or_default();

        let mut records: Vec<MemoryRecord> = ids
            .into_iter()
            .filter_map(|id| {
                let cell = self.cell(&id).ok()?;
                let matched = match lock_record(&cell) {
                    Ok(record) => query.matches(&record).then(|| record.clone()),
                    Err(e) => {
                        tracing::warn!(memory_id = %id, error = %e, "Skipping unreadable record");
                        None
                    }
                };
                matched
            })
            .collect();

        records.sort_by(|a, b| {
            b.last_accessed_at
                .cmp(&a.last_accessed_at)
                .then(b.created_at.cmp(&a.created_at))
        });

        if let Some(limit) = query.limit {
            records.truncate(limit);
        }
        records
    }

    // ==================== Lifecycle Operations ====================

    /// Decay every non-exempt record to `now`.
    ///
    /// Elapsed time runs from each record's decay anchor, so repeating a
    /// pass for the same `now` changes nothing. A record that fails is
    /// reported and the pass continues.
    pub fn decay_all(&self, now: DateTime<Utc>) -> DecayReport {
        let policy = self.policy();
        let mut report = DecayReport::default();
        let mut transitions = Vec::new();

        for (id, cell) in self.snapshot_cells() {
            match self.decay_record(&cell, &policy, now) {
                Ok(outcome) => {
                    report.processed += 1;
                    if outcome.exempt {
                        report.exempt += 1;
                    }
                    if outcome.decayed {
                        report.decayed += 1;
                    }
                    if outcome.newly_marked {
                        report.purge_candidates += 1;
                    }
                    if let Some(t) = outcome.transition {
                        if t.is_promotion() {
                            report.promoted += 1;
                        } else {
                            report.demoted += 1;
                        }
                        transitions.push(t);
                    }
                }
                Err(e) => {
                    tracing::warn!(memory_id = %id, error = %e, "Decay failed for record");
                    report.failures.push(RecordFailure {
                        memory_id: id,
                        error: e.to_string(),
                    });
                }
            }
        }

        for t in transitions {
            self.log_transition(t);
        }

        report
    }

    fn decay_record(
        &self,
        cell: &RecordCell,
        policy: &TierPolicy,
        now: DateTime<Utc>,
    ) -> Result<DecayOutcome> {
        let mut record = lock_record(cell)?;
        let mut outcome = DecayOutcome::default();

        if !record.current_score.is_finite() {
            return Err(Error::Internal(format!(
                "record {} has non-finite score",
                record.id
            )));
        }

        if record.is_decay_exempt(&self.retention.decay_exempt_signals) {
            outcome.exempt = true;
            return Ok(outcome);
        }

        let elapsed = now - record.decay_anchor();
        let mut reason = TransitionReason::PolicyChange;

        if elapsed > Duration::zero() {
            let weeks = elapsed.num_milliseconds() as f64 / MILLIS_PER_WEEK;
            let amount = policy.decay_rate(record.tier) * weeks;
            let floor = self.retention.score_floor;
            let score = record.current_score;
            let decayed = (score - amount).max(floor).min(score);

            record.last_decayed_at = Some(now);
            if decayed < score {
                record.current_score = decayed;
                outcome.decayed = true;
                reason = TransitionReason::Decay;
            }
        }

        outcome.transition = reclassify(&mut record, policy, reason, now);

        if record.current_score <= self.retention.score_floor && !record.marked_for_deletion {
            record.marked_for_deletion = true;
            record.deletion_eligible_at = Some(now + self.retention.deletion_grace());
            outcome.newly_marked = true;
            tracing::debug!(
                memory_id = %record.id,
                eligible_at = ?record.deletion_eligible_at,
                "Memory record marked for deletion"
            );
        }

        Ok(outcome)
    }

    /// Remove every record whose deletion grace period has elapsed at `now`.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> PurgeReport {
        let mut report = PurgeReport::default();

        for (id, cell) in self.snapshot_cells() {
            let record = match lock_record(&cell) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(memory_id = %id, error = %e, "Purge check failed for record");
                    report.failures.push(RecordFailure {
                        memory_id: id,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            if record.is_purgeable(now)
                && self
                    .records
                    .remove_if(&id, |_, v| Arc::ptr_eq(v, &cell))
                    .is_some()
            {
                tracing::debug!(memory_id = %id, owner = %record.owner_id, "Memory record purged");
                self.unindex(&record.owner_id, &id);
                report.purged.push(id);
            }
        }

        report
    }

    // ==================== Introspection ====================

    /// Aggregate statistics.
    pub fn stats(&self) -> StoreStats {
        let mut per_tier: BTreeMap<TierKind, usize> =
            TierKind::DESCENDING.iter().map(|t| (*t, 0)).collect();
        let mut total = 0usize;
        let mut score_sum = 0.0;
        let mut marked = 0usize;
        let mut unreadable = 0usize;

        for (id, cell) in self.snapshot_cells() {
            let record = match lock_record(&cell) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(memory_id = %id, error = %e, "Record left out of stats");
                    unreadable += 1;
                    continue;
                }
            };
            total += 1;
            score_sum += record.current_score;
            *per_tier.entry(record.tier).or_insert(0) += 1;
            if record.marked_for_deletion {
                marked += 1;
            }
        }

        StoreStats {
            total_records: total,
            per_tier,
            average_score: if total == 0 {
                0.0
            } else {
                score_sum / total as f64
            },
            marked_for_deletion: marked,
            unreadable_records: unreadable,
        }
    }

    /// Tier transitions recorded for a record, oldest first.
    pub fn evolution_history(&self, id: &MemoryId) -> Vec<TierTransition> {
        let log = match self.evolution.lock() {
            Ok(log) => log,
            Err(poisoned) => poisoned.into_inner(),
        };
        log.iter().filter(|t| &t.memory_id == id).cloned().collect()
    }

    fn log_transition(&self, transition: TierTransition) {
        let capacity = self.retention.evolution_log_capacity;
        if capacity == 0 {
            return;
        }
        let mut log = match self.evolution.lock() {
            Ok(log) => log,
            Err(poisoned) => poisoned.into_inner(),
        };
        while log.len() >= capacity {
            log.pop_front();
        }
        log.push_back(transition);
    }

    fn unindex(&self, owner: &OwnerId, id: &MemoryId) {
        if let Some(mut ids) = self.by_owner.get_mut(owner) {
            ids.retain(|i| i != id);
        }
        self.by_owner.remove_if(owner, |_, ids| ids.is_empty());
    }

    fn cell(&self, id: &MemoryId) -> Result<RecordCell> {
        self.records
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::not_found("memory record", id))
    }

    fn snapshot_cells(&self) -> Vec<(MemoryId, RecordCell)> {
        self.records
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }
}

fn lock_record(cell: &Mutex<MemoryRecord>) -> Result<MutexGuard<'_, MemoryRecord>> {
    cell.lock()
        .map_err(|e| Error::Internal(format!("Failed to lock record: {}", e)))
}

/// Re-derive the tier from the current score.
fn reclassify(
    record: &mut MemoryRecord,
    policy: &TierPolicy,
    reason: TransitionReason,
    now: DateTime<Utc>,
) -> Option<TierTransition> {
    let tier = policy.classify(record.current_score);
    if tier == record.tier {
        return None;
    }

    let transition = TierTransition {
        memory_id: record.id,
        from: record.tier,
        to: tier,
        score: record.current_score,
        reason,
        at: now,
    };
    record.tier = tier;
    record.tier_changed_at = now;
    Some(transition)
}

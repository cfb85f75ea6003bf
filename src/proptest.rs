//! Property-based tests for tier classification and the record lifecycle.
//!
//! These tests verify that:
//!
//! - Tier thresholds partition the whole score axis
//! - Untouched records only ever lose score, and stop at the floor
//! - Decay-exempt records never lose score
//! - Purge never removes a record before its grace period ends
//! - Boosts keep acting on the same record up to the ceiling

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::clock::{Clock, ManualClock};
    use crate::config::RetentionConfig;
    use crate::memory::{MemoryStore, NewMemory};
    use crate::signals::signal_names;
    use crate::tier::{TierKind, TierPolicy};

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn store() -> (Arc<ManualClock>, MemoryStore) {
        let clock = Arc::new(ManualClock::new(epoch()));
        let store = MemoryStore::new(
            TierPolicy::default(),
            RetentionConfig::default(),
            clock.clone(),
        );
        (clock, store)
    }

    // Scores including negatives and values past the ceiling
    fn any_score() -> impl Strategy<Value = f64> {
        prop_oneof![
            Just(0.0),
            Just(2.0),
            Just(5.0),
            Just(8.0),
            -50.0f64..50.0f64,
        ]
    }

    // Scores a freshly created record can hold
    fn creation_score() -> impl Strategy<Value = f64> {
        0.5f64..10.0f64
    }

    // Sweep gaps in hours, up to three weeks
    fn gaps() -> impl Strategy<Value = Vec<i64>> {
        prop::collection::vec(1i64..504, 1..12)
    }

    // =========================================================================
    // Classification
    // =========================================================================

    proptest! {
        /// Exactly one tier applies, and it is the highest one reached.
        #[test]
        fn classify_partitions_score_axis(score in any_score()) {
            let policy = TierPolicy::default();
            let tier = policy.classify(score);

            if tier != TierKind::Disposable {
                prop_assert!(policy.entry_threshold(tier) <= score);
            }
            for higher in TierKind::DESCENDING.iter().filter(|t| **t > tier) {
                prop_assert!(
                    policy.entry_threshold(*higher) > score,
                    "{} reaches {} but classified {}", score, higher, tier
                );
            }
        }

        /// Classification never moves down as the score goes up.
        #[test]
        fn classify_is_monotone(a in any_score(), b in any_score()) {
            let policy = TierPolicy::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(policy.classify(lo) <= policy.classify(hi));
        }
    }

    // =========================================================================
    // Decay
    // =========================================================================

    proptest! {
        /// Without boosts the score never rises and never leaves the floor.
        #[test]
        fn decay_is_non_increasing_to_floor(score in creation_score(), gaps in gaps()) {
            let (clock, store) = store();
            let floor = store.retention().score_floor;
            let record = store.create(NewMemory::new("owner", "note", score));

            let mut previous = record.current_score;
            for hours in gaps {
                clock.advance(Duration::hours(hours));
                let report = store.decay_all(clock.now());
                prop_assert!(report.failures.is_empty());

                let current = store.get(&record.id).unwrap();
                prop_assert!(current.current_score <= previous);
                prop_assert!(current.current_score >= floor);
                prop_assert_eq!(current.tier, store.policy().classify(current.current_score));
                if previous <= floor {
                    prop_assert_eq!(current.current_score, floor);
                }
                previous = current.current_score;
            }
        }

        /// Exempt signals shield a record from decay entirely.
        #[test]
        fn exempt_records_never_decay(score in creation_score(), weeks in 1i64..520) {
            let (clock, store) = store();
            let record = store.create(
                NewMemory::new("owner", "eureka", score).with_signal(signal_names::BREAKTHROUGH),
            );

            clock.advance(Duration::weeks(weeks));
            store.decay_all(clock.now());

            let current = store.get(&record.id).unwrap();
            prop_assert_eq!(current.current_score, score);
            prop_assert!(!current.marked_for_deletion);
        }

        /// One long sweep and several short ones decay a fixed-tier record equally.
        #[test]
        fn split_sweeps_match_single_sweep(gaps in prop::collection::vec(1i64..48, 1..6)) {
            let (clock_a, split) = store();
            let (clock_b, single) = store();
            // high enough to stay permanent over the whole window
            let a = split.create(NewMemory::new("owner", "note", 9.9));
            let b = single.create(NewMemory::new("owner", "note", 9.9));

            for hours in &gaps {
                clock_a.advance(Duration::hours(*hours));
                split.decay_all(clock_a.now());
            }
            clock_b.advance(Duration::hours(gaps.iter().sum()));
            single.decay_all(clock_b.now());

            let left = split.get(&a.id).unwrap().current_score;
            let right = single.get(&b.id).unwrap().current_score;
            prop_assert!((left - right).abs() < 1e-9, "{} vs {}", left, right);
        }
    }

    // =========================================================================
    // Purge and boosts
    // =========================================================================

    proptest! {
        /// A marked record survives every purge before its eligibility instant.
        #[test]
        fn purge_respects_grace(early_hours in 0i64..168) {
            let (clock, store) = store();
            let record = store.create(NewMemory::new("owner", "filler", 0.6));

            clock.advance(Duration::weeks(1));
            store.decay_all(clock.now());
            let marked = store.get(&record.id).unwrap();
            prop_assert!(marked.marked_for_deletion);
            let eligible = marked.deletion_eligible_at.unwrap();

            let early = clock.now() + Duration::hours(early_hours);
            prop_assume!(early < eligible);
            prop_assert!(store.purge_expired(early).purged.is_empty());
            prop_assert!(store.get(&record.id).is_ok());
        }

        /// Access after marking clears the mark, so later purges keep the record.
        #[test]
        fn access_cancels_pending_purge(days_later in 0i64..60) {
            let (clock, store) = store();
            let record = store.create(NewMemory::new("owner", "filler", 0.6));

            clock.advance(Duration::weeks(1));
            store.decay_all(clock.now());
            store.access(&record.id).unwrap();

            let later = clock.now() + Duration::days(days_later);
            prop_assert!(store.purge_expired(later).purged.is_empty());
            prop_assert!(!store.get(&record.id).unwrap().marked_for_deletion);
        }

        /// Repeated reinforcement keeps raising the same record until the ceiling.
        #[test]
        fn reinforcement_accumulates_to_ceiling(
            score in creation_score(),
            strengths in prop::collection::vec(0.1f64..5.0, 1..10),
        ) {
            let (_clock, store) = store();
            let ceiling = store.retention().score_ceiling;
            let record = store.create(NewMemory::new("owner", "note", score));

            let mut previous = record.current_score;
            for (i, strength) in strengths.iter().enumerate() {
                let boosted = store.reinforce(&record.id, *strength).unwrap();
                prop_assert_eq!(boosted.id, record.id);
                prop_assert_eq!(boosted.reinforcement_count, i as u64 + 1);
                prop_assert!(boosted.current_score >= previous);
                prop_assert!(boosted.current_score <= ceiling.max(score));
                previous = boosted.current_score;
            }
        }
    }
}

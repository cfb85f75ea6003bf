//! Tiered memory records and their store.
//!
//! Every ingested interaction becomes exactly one [`MemoryRecord`]. Its
//! score moves only three ways:
//!
//! - **Decay**: periodic, time-based reduction at the tier's weekly rate
//! - **Access**: a small passive boost when a consumer reads the record
//! - **Reinforcement**: a larger explicit boost scaled by strength
//!
//! The tier is re-derived after every score change. Records that decay to
//! the floor are marked for deletion and purged once the grace period
//! elapses without an intervening access or reinforcement.
//!
//! ## Example
//!
//! ```rust,ignore
//! use memtier_core::memory::{MemoryStore, NewMemory};
//!
//! let record = store.create(NewMemory::new("owner-1", "I prefer serif fonts", 4.5));
//! store.reinforce(&record.id, 1.0)?;
//! let report = store.decay_all(clock.now());
//! let purged = store.purge_expired(clock.now());
//! ```

mod store;
mod types;

pub use store::{DecayReport, MemoryStore, PurgeReport, RecordFailure, StoreStats};
pub use types::{
    MemoryId, MemoryRecord, NewMemory, OwnerId, RecordQuery, TierTransition, TransitionReason,
};

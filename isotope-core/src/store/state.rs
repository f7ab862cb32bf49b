//! Store-side bookkeeping tables.
//!
//! Three tables, all keyed by [`AtomId`] and owned exclusively by the store:
//!
//! - the **state table**: each atom's last-produced value plus the
//!   dependencies consulted while producing it;
//! - the **mount table**: the live subscription records. An atom is mounted
//!   iff it is reachable, through the dependency edges of current cached
//!   states, from some atom with at least one listener;
//! - the **pending set**: atoms whose state changed during the current write
//!   transaction, each paired with its pre-transaction snapshot, drained by
//!   the flush at the end of the transaction.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::atom::{AtomDef, AtomId, ErasedValue};

/// One recorded dependency: the atom that was read, and the state it had at
/// read time. `None` is the "unresolved" case: a self-read served from the
/// declared initial value because no cached state existed yet.
///
/// The recorded `state` is bookkeeping only. The read path never consults it
/// as freshness data; staleness is resolved exclusively by write-time
/// recomputation.
#[derive(Clone)]
pub(crate) struct DepEntry {
    pub(crate) atom: Arc<AtomDef>,
    pub(crate) state: Option<Arc<AtomSnapshot>>,
}

/// The dependency list of one evaluation. Almost always tiny.
pub(crate) type DepList = SmallVec<[DepEntry; 4]>;

/// An atom's cached state: the last-produced value and the dependency set
/// recorded while producing it.
///
/// Snapshots are replaced, never mutated in place, so `Arc::ptr_eq` on two
/// snapshots is an exact "did this atom's state change" test.
pub(crate) struct AtomSnapshot {
    pub(crate) value: ErasedValue,
    pub(crate) deps: DepList,
}

impl std::fmt::Debug for AtomSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomSnapshot")
            .field("deps", &self.deps.len())
            .finish_non_exhaustive()
    }
}

impl AtomSnapshot {
    /// IDs of the recorded dependencies, excluding a self-dependency.
    ///
    /// Self-reads are recorded in the dependency list (they matter for the
    /// "unresolved" bookkeeping) but must never become mount edges: a mount
    /// self-edge would make write propagation recurse into the written atom.
    pub(crate) fn dep_ids_except(&self, own: AtomId) -> impl Iterator<Item = AtomId> + '_ {
        self.deps
            .iter()
            .map(|dep| dep.atom.id())
            .filter(move |id| *id != own)
    }
}

/// Unique identifier for one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A listener callback, invoked (outside the store lock) when the subscribed
/// atom's value changes.
pub(crate) type Listener = Arc<dyn Fn() + Send + Sync>;

/// The mount record of one live atom.
pub(crate) struct MountRecord {
    /// The mounted atom's definition. Kept here so write propagation can
    /// re-run read functions of dependents without a separate registry.
    pub(crate) atom: Arc<AtomDef>,
    /// Registered listeners, in insertion order.
    pub(crate) listeners: Vec<(ListenerId, Listener)>,
    /// Mounted atoms whose last recorded dependency set includes this atom.
    pub(crate) dependents: HashSet<AtomId>,
}

impl MountRecord {
    pub(crate) fn new(atom: Arc<AtomDef>) -> Self {
        Self {
            atom,
            listeners: Vec::new(),
            dependents: HashSet::new(),
        }
    }

    /// A record with no listeners and no dependents has no path to a
    /// subscriber left and must be evicted.
    pub(crate) fn is_orphaned(&self) -> bool {
        self.listeners.is_empty() && self.dependents.is_empty()
    }
}

/// The store's interior: every table behind the store's single lock.
#[derive(Default)]
pub(crate) struct StoreInner {
    /// Cell state table.
    pub(crate) states: HashMap<AtomId, Arc<AtomSnapshot>>,
    /// Mount table.
    pub(crate) mounted: HashMap<AtomId, MountRecord>,
    /// Pending set: atom -> pre-transaction snapshot (`None` if the atom had
    /// no state when the transaction began). Insertion-ordered and deduped;
    /// the first write in a transaction wins the "before" slot.
    pub(crate) pending: IndexMap<AtomId, Option<Arc<AtomSnapshot>>>,
    /// Atoms currently being computed, for cycle detection.
    pub(crate) computing: HashSet<AtomId>,
}

impl StoreInner {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::{self_read_fn, value_eq_fn, AtomDef};

    fn leaf_def() -> Arc<AtomDef> {
        Arc::new(AtomDef::new(
            Some(Arc::new(0i32) as ErasedValue),
            self_read_fn(),
            None,
            value_eq_fn::<i32>(),
        ))
    }

    #[test]
    fn snapshot_dep_ids_skip_self() {
        let own = leaf_def();
        let other = leaf_def();

        let mut deps = DepList::new();
        deps.push(DepEntry {
            atom: Arc::clone(&own),
            state: None,
        });
        deps.push(DepEntry {
            atom: Arc::clone(&other),
            state: None,
        });

        let snap = AtomSnapshot {
            value: Arc::new(0i32),
            deps,
        };

        let ids: Vec<AtomId> = snap.dep_ids_except(own.id()).collect();
        assert_eq!(ids, vec![other.id()]);
    }

    #[test]
    fn snapshot_debug_summarizes_without_values() {
        let snap = AtomSnapshot {
            value: Arc::new(1i32) as ErasedValue,
            deps: DepList::new(),
        };
        // `Result<Arc<AtomSnapshot>, _>` must be debuggable for test
        // assertions like `unwrap_err` on engine results.
        let rendered = format!("{:?}", Ok::<_, crate::error::StoreError>(Arc::new(snap)));
        assert!(rendered.contains("AtomSnapshot"));
        assert!(rendered.contains("deps: 0"));
    }

    #[test]
    fn mount_record_orphan_detection() {
        let mut record = MountRecord::new(leaf_def());
        assert!(record.is_orphaned());

        record.listeners.push((ListenerId::new(), Arc::new(|| {})));
        assert!(!record.is_orphaned());

        record.listeners.clear();
        record.dependents.insert(AtomId::new());
        assert!(!record.is_orphaned());
    }

    #[test]
    fn pending_set_keeps_first_before_snapshot() {
        let mut inner = StoreInner::new();
        let id = AtomId::new();

        let first = Arc::new(AtomSnapshot {
            value: Arc::new(1i32) as ErasedValue,
            deps: DepList::new(),
        });

        inner.pending.entry(id).or_insert(Some(Arc::clone(&first)));
        inner.pending.entry(id).or_insert(None);

        let recorded = inner.pending.get(&id).cloned().flatten();
        assert!(recorded.is_some_and(|snap| Arc::ptr_eq(&snap, &first)));
    }
}

//! The store engine: read, write, mount, flush.
//!
//! # Read path
//!
//! `read_atom_state` returns the cached snapshot as-is when one exists;
//! plain reads never re-validate dependency freshness. Staleness is resolved
//! exclusively by the write path, which force-recomputes every mounted
//! transitive dependent of a changed atom before any notification fires.
//! That trade keeps reads O(1) and puts the correctness burden on write-time
//! propagation.
//!
//! # Write path
//!
//! A write runs the target atom's write function. When a primitive value
//! actually changes, the engine walks the mount table's dependents edges
//! depth-first, re-running each dependent's read function (cache ignored)
//! and recursing into its dependents regardless of whether the recomputation
//! changed the value. Over-recomputation is accepted; read functions are
//! pure, so it is idempotent.
//!
//! # Mount lifecycle
//!
//! Mounting an atom reads it (establishing its dependency set), then
//! recursively mounts every recorded dependency with the atom as dependent.
//! A mount record is evicted when it has neither listeners nor dependents,
//! and eviction cascades to dependencies that lose their last path to a
//! listener. Unmounting releases dependency bookkeeping only; cached state
//! stays in the state table.

use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::atom::{AtomDef, AtomId, ErasedValue};
use crate::error::StoreError;

use super::access::{Getter, Setter};
use super::state::{AtomSnapshot, Listener, MountRecord, StoreInner};

impl StoreInner {
    /// Resolve an atom's state, computing it only on a cache miss.
    pub(crate) fn read_atom_state(
        &mut self,
        def: &Arc<AtomDef>,
    ) -> Result<Arc<AtomSnapshot>, StoreError> {
        if let Some(snapshot) = self.states.get(&def.id()) {
            return Ok(Arc::clone(snapshot));
        }
        self.compute_atom(def)
    }

    /// Evaluate an atom's read function and install the resulting state,
    /// ignoring any cached snapshot.
    ///
    /// If the produced value compares equal to the cached one, the previous
    /// snapshot object is kept so dependents are not spuriously invalidated
    /// and no pending entry is created.
    pub(crate) fn compute_atom(
        &mut self,
        def: &Arc<AtomDef>,
    ) -> Result<Arc<AtomSnapshot>, StoreError> {
        let id = def.id();
        if !self.computing.insert(id) {
            return Err(StoreError::CyclicDependency {
                atom: def.debug_label(),
            });
        }
        trace!(atom = %def.debug_label(), "computing atom state");

        let mut getter = Getter::new(self, def);
        let result = (def.read_fn())(&mut getter);
        let deps = getter.into_deps();
        self.computing.remove(&id);
        let value = result?;

        let prev = self.states.get(&id).cloned();
        if let Some(prev) = &prev {
            if def.values_equal(prev.value.as_ref(), value.as_ref()) {
                trace!(atom = %def.debug_label(), "value unchanged, keeping snapshot");
                return Ok(Arc::clone(prev));
            }
        }

        let snapshot = Arc::new(AtomSnapshot { value, deps });
        self.states.insert(id, Arc::clone(&snapshot));
        self.pending.entry(id).or_insert(prev);
        Ok(snapshot)
    }

    /// Run an atom's write function, returning its boxed result.
    pub(crate) fn write_atom(
        &mut self,
        def: &Arc<AtomDef>,
        arg: Box<dyn Any + Send>,
    ) -> Result<Box<dyn Any + Send>, StoreError> {
        let write = def
            .write_fn()
            .cloned()
            .ok_or_else(|| StoreError::NotWritable {
                atom: def.debug_label(),
            })?;
        let mut setter = Setter::new(self, def);
        write(&mut setter, arg)
    }

    /// Install a value written directly to an atom (the self-targeted branch
    /// of the write path).
    ///
    /// Only an actual change (by the atom's value equality) replaces the
    /// snapshot, enqueues a pending entry, and triggers dependent
    /// recomputation.
    pub(crate) fn install_value(
        &mut self,
        def: &Arc<AtomDef>,
        value: ErasedValue,
    ) -> Result<(), StoreError> {
        let id = def.id();
        let prev = self.states.get(&id).cloned();
        if let Some(prev) = &prev {
            if def.values_equal(prev.value.as_ref(), value.as_ref()) {
                trace!(atom = %def.debug_label(), "write left value unchanged");
                return Ok(());
            }
        }

        // The written value carries no fresh evaluation, so the previous
        // dependency record (for a primitive, its own self-read) carries
        // over unchanged.
        let deps = prev.as_ref().map(|p| p.deps.clone()).unwrap_or_default();
        let snapshot = Arc::new(AtomSnapshot { value, deps });
        self.states.insert(id, snapshot);
        self.pending.entry(id).or_insert(prev);

        trace!(atom = %def.debug_label(), "value installed, recomputing dependents");
        self.recompute_dependents(id)
    }

    /// Force-recompute every mounted dependent of `id`, depth-first,
    /// recursing into each dependent's own dependents whether or not its
    /// value changed.
    fn recompute_dependents(&mut self, id: AtomId) -> Result<(), StoreError> {
        let dependents: Vec<AtomId> = match self.mounted.get(&id) {
            Some(record) => record.dependents.iter().copied().collect(),
            None => return Ok(()),
        };

        for dependent in dependents {
            if dependent == id {
                continue;
            }
            let Some(def) = self.mounted.get(&dependent).map(|r| Arc::clone(&r.atom)) else {
                continue;
            };
            let before = self.states.get(&dependent).cloned();
            let after = self.compute_atom(&def)?;
            let changed = before
                .as_ref()
                .map_or(true, |before| !Arc::ptr_eq(before, &after));
            if changed {
                self.sync_mounted_deps(&def, before.as_ref(), &after)?;
            }
            self.recompute_dependents(dependent)?;
        }
        Ok(())
    }

    /// Reconcile a mounted atom's mount edges after its dependency set
    /// changed: mount newly-read dependencies, drop edges to dependencies no
    /// longer read, and evict those left orphaned.
    fn sync_mounted_deps(
        &mut self,
        def: &Arc<AtomDef>,
        before: Option<&Arc<AtomSnapshot>>,
        after: &Arc<AtomSnapshot>,
    ) -> Result<(), StoreError> {
        let id = def.id();
        if !self.mounted.contains_key(&id) {
            return Ok(());
        }

        let old: HashSet<AtomId> = before
            .map(|snap| snap.dep_ids_except(id).collect())
            .unwrap_or_default();
        let new: HashSet<AtomId> = after.dep_ids_except(id).collect();

        for dep in after.deps.clone() {
            let dep_id = dep.atom.id();
            if dep_id == id || old.contains(&dep_id) {
                continue;
            }
            self.mount_atom(&dep.atom, Some(id))?;
        }

        for dep_id in old.difference(&new) {
            if let Some(record) = self.mounted.get_mut(dep_id) {
                record.dependents.remove(&id);
            }
        }
        let orphaned: Vec<AtomId> = old
            .difference(&new)
            .filter(|dep_id| {
                self.mounted
                    .get(dep_id)
                    .is_some_and(MountRecord::is_orphaned)
            })
            .copied()
            .collect();
        for dep_id in orphaned {
            self.unmount_atom(dep_id);
        }
        Ok(())
    }

    /// Ensure an atom (and, transitively, everything it currently depends
    /// on) has a mount record. Idempotent: an existing record is reused, and
    /// `dependent` is merely added to its dependents set.
    pub(crate) fn mount_atom(
        &mut self,
        def: &Arc<AtomDef>,
        dependent: Option<AtomId>,
    ) -> Result<(), StoreError> {
        let id = def.id();
        if let Some(record) = self.mounted.get_mut(&id) {
            if let Some(dependent) = dependent {
                record.dependents.insert(dependent);
            }
            return Ok(());
        }

        // Reading here establishes the dependency set the mount walks; the
        // read is lazy, so an already-cached atom costs nothing.
        let snapshot = self.read_atom_state(def)?;
        debug!(atom = %def.debug_label(), "mounting atom");

        let mut record = MountRecord::new(Arc::clone(def));
        if let Some(dependent) = dependent {
            record.dependents.insert(dependent);
        }
        self.mounted.insert(id, record);

        for dep in snapshot.deps.iter() {
            if dep.atom.id() == id {
                continue;
            }
            self.mount_atom(&dep.atom, Some(id))?;
        }
        Ok(())
    }

    /// Evict an atom's mount record and drop it from the dependents set of
    /// each of its recorded dependencies, cascading into dependencies left
    /// without any path to a listener. Cached state is not evicted.
    pub(crate) fn unmount_atom(&mut self, id: AtomId) {
        let Some(record) = self.mounted.remove(&id) else {
            return;
        };
        debug!(atom = %record.atom.debug_label(), "unmounting atom");

        let deps: Vec<AtomId> = self
            .states
            .get(&id)
            .map(|snap| snap.dep_ids_except(id).collect())
            .unwrap_or_default();
        for dep in deps {
            if let Some(record) = self.mounted.get_mut(&dep) {
                record.dependents.remove(&id);
                if record.is_orphaned() {
                    self.unmount_atom(dep);
                }
            }
        }
    }

    /// Drain the pending set, collecting the listeners of every mounted atom
    /// whose state truly differs from its pre-transaction snapshot.
    ///
    /// Snapshots are replaced rather than mutated, so pointer identity is
    /// the change test. Listeners are returned (in insertion order per atom)
    /// rather than invoked, so the caller can run them with the store lock
    /// released.
    pub(crate) fn drain_flush(&mut self) -> Vec<Listener> {
        let pending = std::mem::take(&mut self.pending);
        let mut listeners = Vec::new();
        for (id, before) in pending {
            let Some(record) = self.mounted.get(&id) else {
                continue;
            };
            let changed = match (self.states.get(&id), &before) {
                (Some(after), Some(before)) => !Arc::ptr_eq(after, before),
                (Some(_), None) => true,
                (None, _) => false,
            };
            if changed {
                trace!(atom = %record.atom.debug_label(), listeners = record.listeners.len(), "flushing change");
                listeners.extend(record.listeners.iter().map(|(_, l)| Arc::clone(l)));
            }
        }
        listeners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::{
        self_read_fn, value_eq_fn, Atom, AtomDef, PrimitiveAtom, Readable, Update,
    };
    use std::sync::atomic::{AtomicI32, Ordering};

    fn state_value<T: Clone + 'static>(inner: &StoreInner, id: AtomId) -> Option<T> {
        inner
            .states
            .get(&id)
            .and_then(|snap| snap.value.downcast_ref::<T>().cloned())
    }

    #[test]
    fn read_computes_once_and_caches() {
        let mut inner = StoreInner::new();
        let count = PrimitiveAtom::new(7);

        let calls = Arc::new(AtomicI32::new(0));
        let derived = {
            let count = count.clone();
            let calls = Arc::clone(&calls);
            Atom::derived(move |g| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(g.get(&count)? * 2)
            })
        };

        let snap = inner.read_atom_state(derived.def()).unwrap();
        assert_eq!(snap.value.downcast_ref::<i32>(), Some(&14));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Second read returns the same snapshot without recomputing.
        let again = inner.read_atom_state(derived.def()).unwrap();
        assert!(Arc::ptr_eq(&snap, &again));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn recompute_with_equal_value_keeps_snapshot() {
        let mut inner = StoreInner::new();
        let count = PrimitiveAtom::new(2);
        let parity = {
            let count = count.clone();
            Atom::derived(move |g| Ok(g.get(&count)? % 2 == 0))
        };

        let first = inner.read_atom_state(parity.def()).unwrap();
        let second = inner.compute_atom(parity.def()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn self_read_without_initial_value_fails() {
        let mut inner = StoreInner::new();
        let def = Arc::new(AtomDef::new(
            None,
            self_read_fn(),
            None,
            value_eq_fn::<i32>(),
        ));

        let err = inner.read_atom_state(&def).unwrap_err();
        assert!(matches!(err, StoreError::NoInitialValue { .. }));
    }

    #[test]
    fn cyclic_reads_are_detected() {
        use std::sync::OnceLock;

        let mut inner = StoreInner::new();

        let slot: Arc<OnceLock<Atom<i32>>> = Arc::new(OnceLock::new());
        let a = {
            let slot = Arc::clone(&slot);
            Atom::derived(move |g| {
                let b = slot.get().expect("slot filled before read");
                g.get(b)
            })
        };
        let b = {
            let a = a.clone();
            Atom::derived(move |g| g.get(&a))
        };
        slot.set(b).ok().expect("slot set once");

        let err = inner.read_atom_state(a.def()).unwrap_err();
        assert!(matches!(err, StoreError::CyclicDependency { .. }));
        // A failed computation must not poison later ones.
        assert!(inner.computing.is_empty());
    }

    #[test]
    fn install_value_skips_equal_writes() {
        let mut inner = StoreInner::new();
        let count = PrimitiveAtom::new(3);

        inner.read_atom_state(count.def()).unwrap();
        inner.pending.clear();

        inner
            .install_value(count.def(), Arc::new(3i32) as ErasedValue)
            .unwrap();
        assert!(inner.pending.is_empty());
        assert_eq!(state_value::<i32>(&inner, count.id()), Some(3));

        inner
            .install_value(count.def(), Arc::new(4i32) as ErasedValue)
            .unwrap();
        assert_eq!(inner.pending.len(), 1);
        assert_eq!(state_value::<i32>(&inner, count.id()), Some(4));
    }

    #[test]
    fn write_propagates_to_mounted_dependents() {
        let mut inner = StoreInner::new();
        let count = PrimitiveAtom::new(0);
        let double = {
            let count = count.clone();
            Atom::derived(move |g| Ok(g.get(&count)? * 2))
        };

        inner.mount_atom(double.def(), None).unwrap();
        inner.pending.clear();

        inner
            .write_atom(count.def(), Box::new(Update::Replace(5)))
            .unwrap();

        assert_eq!(state_value::<i32>(&inner, count.id()), Some(5));
        assert_eq!(state_value::<i32>(&inner, double.id()), Some(10));
        assert!(inner.pending.contains_key(&count.id()));
        assert!(inner.pending.contains_key(&double.id()));
    }

    #[test]
    fn unmounted_dependents_are_not_recomputed() {
        let mut inner = StoreInner::new();
        let count = PrimitiveAtom::new(0);
        let double = {
            let count = count.clone();
            Atom::derived(move |g| Ok(g.get(&count)? * 2))
        };

        // Prime the cache, but never mount anything.
        inner.read_atom_state(double.def()).unwrap();
        inner
            .write_atom(count.def(), Box::new(Update::Replace(5)))
            .unwrap();

        // The derived cache is stale by design: plain reads do not
        // re-validate, and nothing was mounted to propagate the write.
        assert_eq!(state_value::<i32>(&inner, double.id()), Some(0));
    }

    #[test]
    fn mounting_walks_the_dependency_chain() {
        let mut inner = StoreInner::new();
        let count = PrimitiveAtom::new(1);
        let double = {
            let count = count.clone();
            Atom::derived(move |g| Ok(g.get(&count)? * 2))
        };
        let quad = {
            let double = double.clone();
            Atom::derived(move |g| Ok(g.get(&double)? * 2))
        };

        inner.mount_atom(quad.def(), None).unwrap();

        assert!(inner.mounted.contains_key(&count.id()));
        assert!(inner.mounted.contains_key(&double.id()));
        assert!(inner.mounted.contains_key(&quad.id()));
        assert!(inner.mounted[&count.id()].dependents.contains(&double.id()));
        assert!(inner.mounted[&double.id()].dependents.contains(&quad.id()));

        inner.unmount_atom(quad.id());
        assert!(inner.mounted.is_empty());
        // State survives unmounting.
        assert_eq!(state_value::<i32>(&inner, quad.id()), Some(4));
    }

    #[test]
    fn drain_flush_reports_only_mounted_changes() {
        let mut inner = StoreInner::new();
        let count = PrimitiveAtom::new(0);

        inner.mount_atom(count.def(), None).unwrap();
        inner.pending.clear();

        inner
            .write_atom(count.def(), Box::new(Update::Replace(9)))
            .unwrap();
        let listeners = inner.drain_flush();
        // Mounted and changed, but nobody listens on this record.
        assert!(listeners.is_empty());
        assert!(inner.pending.is_empty());
    }
}

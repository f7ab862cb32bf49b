//! The public store handle.
//!
//! A [`Store`] owns all atom state: values, dependency records, and the
//! mount table. It is a cheap clonable handle around the store interior;
//! clones share state, while separate stores are fully isolated.
//!
//! Execution is synchronous and cooperative: `get` and `set` never suspend,
//! and all recomputation and notification happens within the call that
//! triggered it. The interior sits behind one `RwLock`, acquired once per
//! public operation; listener callbacks always run with the lock released,
//! so a listener may freely call back into the store (including writes).

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::atom::{
    downcast_value, AtomId, PrimitiveAtom, Readable, Update, WritableAtom,
};
use crate::error::StoreError;

use super::state::{ListenerId, StoreInner};

/// A reactive state-container.
///
/// # Example
///
/// ```rust,ignore
/// let store = Store::new();
/// let count = PrimitiveAtom::new(0);
/// let double = {
///     let count = count.clone();
///     Atom::derived(move |g| Ok(g.get(&count)? * 2))
/// };
///
/// let _sub = store.subscribe(&double, || println!("double changed"))?;
/// store.set(&count, 5)?;          // prints "double changed"
/// assert_eq!(store.get(&double)?, 10);
/// ```
pub struct Store {
    inner: Arc<RwLock<StoreInner>>,
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner::new())),
        }
    }

    /// Get an atom's current value, computing it if necessary.
    ///
    /// Cached values are returned as-is; plain reads never re-check
    /// dependency freshness. A cache miss evaluates the atom's read function
    /// (and, recursively, its dependencies) and caches the result together
    /// with the recorded dependency set.
    pub fn get<T, A>(&self, atom: &A) -> Result<T, StoreError>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
        A: Readable<T>,
    {
        let def = atom.def();
        let mut inner = self.inner.write();
        let snapshot = inner.read_atom_state(def)?;
        drop(inner);
        downcast_value::<T>(&snapshot.value, def)
    }

    /// Get an atom's cached value without computing anything.
    ///
    /// Returns `None` when the atom has no state in this store yet.
    pub fn peek<T, A>(&self, atom: &A) -> Option<T>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
        A: Readable<T>,
    {
        let inner = self.inner.read();
        let snapshot = inner.states.get(&atom.def().id()).cloned()?;
        drop(inner);
        snapshot.value.downcast_ref::<T>().cloned()
    }

    /// Set a primitive atom to a new value.
    ///
    /// Runs the primitive's default write function; if the value actually
    /// changes, every mounted transitive dependent is recomputed before this
    /// call returns, and listeners of every affected mounted atom fire once.
    pub fn set<T>(&self, atom: &PrimitiveAtom<T>, value: T) -> Result<(), StoreError>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
    {
        self.transact(atom.def(), Box::new(Update::Replace(value)))
            .map(drop)
    }

    /// Set a primitive atom from its previous value.
    pub fn update<T, F>(&self, atom: &PrimitiveAtom<T>, f: F) -> Result<(), StoreError>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
        F: FnOnce(&T) -> T + Send + 'static,
    {
        self.transact(atom.def(), Box::new(Update::Compute(Box::new(f))))
            .map(drop)
    }

    /// Apply a writable atom's write function with the given argument,
    /// returning the write function's result.
    pub fn write<T, Arg, Out>(
        &self,
        atom: &WritableAtom<T, Arg, Out>,
        arg: Arg,
    ) -> Result<Out, StoreError>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
        Arg: Send + 'static,
        Out: Send + 'static,
    {
        let out = self.transact(atom.def(), Box::new(arg))?;
        out.downcast::<Out>()
            .map(|out| *out)
            .map_err(|_| StoreError::TypeMismatch {
                atom: atom.def().debug_label(),
            })
    }

    /// Subscribe a listener to an atom.
    ///
    /// Mounts the atom (reading it to establish its dependency set, then
    /// recursively mounting every dependency) and registers the listener.
    /// The listener fires after every write transaction that changed the
    /// atom's value. Subscribing alone never fires it.
    ///
    /// The returned [`Subscription`] removes the listener when dropped.
    pub fn subscribe<T, A, F>(&self, atom: &A, listener: F) -> Result<Subscription, StoreError>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
        A: Readable<T>,
        F: Fn() + Send + Sync + 'static,
    {
        let def = atom.def();
        let mut inner = self.inner.write();
        inner.mount_atom(def, None)?;

        let listener_id = ListenerId::new();
        if let Some(record) = inner.mounted.get_mut(&def.id()) {
            record.listeners.push((listener_id, Arc::new(listener)));
        }

        Ok(Subscription {
            store: Arc::downgrade(&self.inner),
            atom: def.id(),
            listener: listener_id,
        })
    }

    /// Whether the atom currently has a mount record in this store.
    pub fn is_mounted<T, A>(&self, atom: &A) -> bool
    where
        A: Readable<T>,
    {
        self.inner.read().mounted.contains_key(&atom.def().id())
    }

    /// Enumerate the currently mounted atoms.
    ///
    /// Debug/introspection surface for external tooling; the engine itself
    /// never consumes it.
    pub fn mounted_atoms(&self) -> Vec<MountedAtom> {
        self.inner
            .read()
            .mounted
            .values()
            .map(|record| MountedAtom {
                id: record.atom.id(),
                label: record.atom.label().map(String::from),
            })
            .collect()
    }

    /// Run one write transaction: clear stale pending entries, apply the
    /// write, then flush notifications in rounds with the lock released
    /// while listeners run.
    fn transact(
        &self,
        def: &Arc<crate::atom::AtomDef>,
        arg: Box<dyn std::any::Any + Send>,
    ) -> Result<Box<dyn std::any::Any + Send>, StoreError> {
        let mut inner = self.inner.write();

        // Pending entries are defined against the current transaction;
        // anything left over from plain reads or mounts is not ours to
        // report.
        inner.pending.clear();

        let out = match inner.write_atom(def, arg) {
            Ok(out) => out,
            Err(err) => {
                // Abort: no notification may fire for a failed transaction.
                inner.pending.clear();
                return Err(err);
            }
        };

        loop {
            let listeners = inner.drain_flush();
            if listeners.is_empty() {
                break;
            }
            drop(inner);
            for listener in &listeners {
                listener();
            }
            inner = self.inner.write();
        }

        Ok(out)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Store {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Store")
            .field("atoms_with_state", &inner.states.len())
            .field("mounted", &inner.mounted.len())
            .finish()
    }
}

/// Handle to one registered listener.
///
/// Dropping the subscription removes the listener; the mount record is
/// evicted only when no listener and no mounted dependent remains, so
/// multiple subscribers to one atom unsubscribe independently.
pub struct Subscription {
    store: Weak<RwLock<StoreInner>>,
    atom: AtomId,
    listener: ListenerId,
}

impl Subscription {
    /// Remove the listener now. Equivalent to dropping the subscription.
    pub fn unsubscribe(self) {}

    /// The atom this subscription listens on.
    pub fn atom(&self) -> AtomId {
        self.atom
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            let mut inner = store.write();
            let orphaned = match inner.mounted.get_mut(&self.atom) {
                Some(record) => {
                    record.listeners.retain(|(id, _)| *id != self.listener);
                    record.is_orphaned()
                }
                None => false,
            };
            if orphaned {
                inner.unmount_atom(self.atom);
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("atom", &self.atom)
            .finish()
    }
}

/// Identity and label of a mounted atom, as reported by
/// [`Store::mounted_atoms`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedAtom {
    /// The mounted atom's ID.
    pub id: AtomId,
    /// The mounted atom's label, if one was set.
    pub label: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn store_get_and_set() {
        let store = Store::new();
        let count = PrimitiveAtom::new(0);

        assert_eq!(store.get(&count), Ok(0));
        store.set(&count, 42).unwrap();
        assert_eq!(store.get(&count), Ok(42));
    }

    #[test]
    fn store_update() {
        let store = Store::new();
        let count = PrimitiveAtom::new(10);
        store.update(&count, |v| v + 5).unwrap();
        assert_eq!(store.get(&count), Ok(15));
    }

    #[test]
    fn store_clone_shares_state() {
        let store1 = Store::new();
        let store2 = store1.clone();
        let count = PrimitiveAtom::new(0);

        store1.set(&count, 42).unwrap();
        assert_eq!(store2.get(&count), Ok(42));
    }

    #[test]
    fn separate_stores_do_not_share_state() {
        let store1 = Store::new();
        let store2 = Store::new();
        let count = PrimitiveAtom::new(0);

        store1.set(&count, 42).unwrap();
        assert_eq!(store2.get(&count), Ok(0));
    }

    #[test]
    fn peek_does_not_compute() {
        let store = Store::new();
        let calls = Arc::new(AtomicI32::new(0));
        let derived = {
            let calls = Arc::clone(&calls);
            Atom::derived(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            })
        };

        assert_eq!(store.peek::<i32, _>(&derived), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        store.get(&derived).unwrap();
        assert_eq!(store.peek(&derived), Some(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn mounted_atoms_reports_labels() {
        let store = Store::new();
        let count = PrimitiveAtom::new(0).with_label("count");

        let sub = store.subscribe(&count, || {}).unwrap();
        let mounted = store.mounted_atoms();
        assert_eq!(mounted.len(), 1);
        assert_eq!(mounted[0].id, count.id());
        assert_eq!(mounted[0].label.as_deref(), Some("count"));

        sub.unsubscribe();
        assert!(store.mounted_atoms().is_empty());
    }

    #[test]
    fn dropped_store_orphans_subscriptions() {
        let store = Store::new();
        let count = PrimitiveAtom::new(0);
        let sub = store.subscribe(&count, || {}).unwrap();

        drop(store);
        // Unsubscribing after the store is gone is a no-op, not a panic.
        sub.unsubscribe();
    }
}

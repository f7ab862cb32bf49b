//! Read and write accessors handed to atom functions.
//!
//! While an atom's read function runs, the store tracks which computation is
//! current and records every atom read through the [`Getter`] as a
//! dependency of that computation. This is what makes dependency tracking
//! automatic: read functions just read, and the store learns the graph.
//!
//! The [`Setter`] is the write-side counterpart: a write function reads
//! current values through it and sets other atoms, where setting the atom
//! currently being written installs the value directly and setting any other
//! atom runs a full nested write.
//!
//! Both accessors borrow the store interior mutably, so the whole engine is
//! plain synchronous recursion: no locks are taken or released between an
//! outer computation and the dependency resolutions it triggers.

use std::sync::Arc;

use crate::atom::{downcast_value, AtomDef, ErasedValue, PrimitiveAtom, Readable, Update, WritableAtom};
use crate::error::StoreError;

use super::state::{DepEntry, DepList, StoreInner};

/// Dependency-recording read accessor passed to read functions.
pub struct Getter<'a> {
    inner: &'a mut StoreInner,
    current: &'a Arc<AtomDef>,
    deps: DepList,
}

impl<'a> Getter<'a> {
    pub(crate) fn new(inner: &'a mut StoreInner, current: &'a Arc<AtomDef>) -> Self {
        Self {
            inner,
            current,
            deps: DepList::new(),
        }
    }

    /// Read an atom's current value, recording it as a dependency of the
    /// computation in progress.
    ///
    /// Reading the atom currently being computed is a self-read: it returns
    /// the atom's cached value if one exists, else its declared initial
    /// value, and fails with [`StoreError::NoInitialValue`] if neither
    /// exists. Any other atom is resolved recursively through the ordinary
    /// read path.
    pub fn get<T, A>(&mut self, atom: &A) -> Result<T, StoreError>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
        A: Readable<T>,
    {
        let def = atom.def();
        if def.id() == self.current.id() {
            let value = self.read_self()?;
            downcast_value::<T>(&value, def)
        } else {
            let snapshot = self.inner.read_atom_state(def)?;
            let value = snapshot.value.clone();
            self.deps.push(DepEntry {
                atom: Arc::clone(def),
                state: Some(snapshot),
            });
            downcast_value::<T>(&value, def)
        }
    }

    /// Self-read for the computation in progress: cached value, else initial
    /// value, recording the dependency entry either way.
    pub(crate) fn read_self(&mut self) -> Result<ErasedValue, StoreError> {
        let id = self.current.id();
        if let Some(snapshot) = self.inner.states.get(&id) {
            let value = snapshot.value.clone();
            self.deps.push(DepEntry {
                atom: Arc::clone(self.current),
                state: Some(Arc::clone(snapshot)),
            });
            Ok(value)
        } else if let Some(init) = self.current.init() {
            self.deps.push(DepEntry {
                atom: Arc::clone(self.current),
                state: None,
            });
            Ok(init.clone())
        } else {
            Err(StoreError::NoInitialValue {
                atom: self.current.debug_label(),
            })
        }
    }

    /// The dependency list recorded so far, consuming the getter.
    pub(crate) fn into_deps(self) -> DepList {
        self.deps
    }
}

impl std::fmt::Debug for Getter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Getter")
            .field("current", &self.current.id())
            .field("deps", &self.deps.len())
            .finish()
    }
}

/// Write accessor passed to write functions.
pub struct Setter<'a> {
    inner: &'a mut StoreInner,
    current: &'a Arc<AtomDef>,
}

impl<'a> Setter<'a> {
    pub(crate) fn new(inner: &'a mut StoreInner, current: &'a Arc<AtomDef>) -> Self {
        Self { inner, current }
    }

    /// Read an atom's current value.
    ///
    /// Same resolution rules as the read path's getter, but nothing is
    /// recorded: dependency sets belong to read functions, not writes.
    pub fn get<T, A>(&mut self, atom: &A) -> Result<T, StoreError>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
        A: Readable<T>,
    {
        let def = atom.def();
        let value = if def.id() == self.current.id() {
            self.self_value()?
        } else {
            self.inner.read_atom_state(def)?.value.clone()
        };
        downcast_value::<T>(&value, def)
    }

    /// Set a primitive atom to a literal next value.
    ///
    /// Targeting the atom currently being written installs the value
    /// directly (and, only on actual change, force-recomputes its mounted
    /// dependents). Targeting any other atom runs that atom's own write
    /// function as a full nested write.
    pub fn set<T>(&mut self, atom: &PrimitiveAtom<T>, value: T) -> Result<(), StoreError>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
    {
        let def = atom.def();
        if def.id() == self.current.id() {
            self.install(Arc::new(value))
        } else {
            self.inner
                .write_atom(def, Box::new(Update::Replace(value)))
                .map(drop)
        }
    }

    /// Set a primitive atom from its previous value.
    pub fn update<T, F>(&mut self, atom: &PrimitiveAtom<T>, f: F) -> Result<(), StoreError>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
        F: FnOnce(&T) -> T + Send + 'static,
    {
        let def = atom.def();
        if def.id() == self.current.id() {
            let prev: T = self.current_value()?;
            self.install(Arc::new(f(&prev)))
        } else {
            self.inner
                .write_atom(def, Box::new(Update::Compute(Box::new(f))))
                .map(drop)
        }
    }

    /// Run another writable atom's write function as a nested write,
    /// returning its result.
    pub fn write<T, Arg, Out>(
        &mut self,
        atom: &WritableAtom<T, Arg, Out>,
        arg: Arg,
    ) -> Result<Out, StoreError>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
        Arg: Send + 'static,
        Out: Send + 'static,
    {
        let def = atom.def();
        let out = self.inner.write_atom(def, Box::new(arg))?;
        out.downcast::<Out>()
            .map(|out| *out)
            .map_err(|_| StoreError::TypeMismatch {
                atom: def.debug_label(),
            })
    }

    /// Current value of the atom being written (cached, else initial),
    /// typed. Used to resolve updater-style writes.
    pub(crate) fn current_value<T>(&mut self) -> Result<T, StoreError>
    where
        T: Clone + 'static,
    {
        let value = self.self_value()?;
        downcast_value::<T>(&value, self.current)
    }

    /// Install a new value for the atom being written. Change detection and
    /// dependent recomputation happen inside the engine.
    pub(crate) fn install(&mut self, value: ErasedValue) -> Result<(), StoreError> {
        let def = Arc::clone(self.current);
        self.inner.install_value(&def, value)
    }

    /// Display label of the atom being written, for error reporting.
    pub(crate) fn current_label(&self) -> String {
        self.current.debug_label()
    }

    fn self_value(&mut self) -> Result<ErasedValue, StoreError> {
        let id = self.current.id();
        if let Some(snapshot) = self.inner.states.get(&id) {
            Ok(snapshot.value.clone())
        } else if let Some(init) = self.current.init() {
            Ok(init.clone())
        } else {
            Err(StoreError::NoInitialValue {
                atom: self.current.debug_label(),
            })
        }
    }
}

impl std::fmt::Debug for Setter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Setter")
            .field("current", &self.current.id())
            .finish()
    }
}

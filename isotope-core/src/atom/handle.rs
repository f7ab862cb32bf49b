//! Typed atom handles.
//!
//! Handles are cheap clones around a shared `Arc<AtomDef>`: cloning a handle
//! never creates a new atom, it shares the same identity.
//!
//! Three handle shapes cover the construction surface:
//!
//! - [`PrimitiveAtom`]: leaf state with an initial value. Its read function
//!   is a self-read of its own stored value, and its default write accepts
//!   either a literal next value or an updater from the previous value.
//! - [`Atom`]: a read-only derived value computed from other atoms through a
//!   dependency-recording [`Getter`].
//! - [`WritableAtom`]: a derived read paired with a custom write function
//!   that expresses its write semantics by setting the primitive atoms it is
//!   backed by.
//!
//! Read functions must be pure: they may read other atoms through the getter
//! but must not mutate store state. The store cannot detect a violation; an
//! impure read produces undefined propagation behavior.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::StoreError;
use crate::store::{Getter, Setter};

use super::def::{self, AtomDef, ErasedValue, ReadFn, WriteFn};
use super::id::AtomId;

/// A pending change to a primitive atom: either a literal replacement value
/// or a function of the previous value.
pub enum Update<T> {
    /// Replace the stored value outright.
    Replace(T),
    /// Compute the next value from the previous one.
    Compute(Box<dyn FnOnce(&T) -> T + Send>),
}

impl<T: std::fmt::Debug> std::fmt::Debug for Update<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Update::Replace(value) => f.debug_tuple("Replace").field(value).finish(),
            Update::Compute(_) => f.write_str("Compute(..)"),
        }
    }
}

/// Anything the store can read: every atom handle implements this.
///
/// The type parameter ties a handle to the concrete value type its read
/// function produces, so `Store::get` resolves the erased value back without
/// ambiguity.
pub trait Readable<T> {
    /// The shared erased definition backing this handle.
    #[doc(hidden)]
    fn def(&self) -> &Arc<AtomDef>;
}

/// A read-only derived atom of value type `T`.
pub struct Atom<T> {
    def: Arc<AtomDef>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Atom<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a derived atom from a read function.
    ///
    /// The read function is not invoked here. It runs lazily, the first time
    /// the value is requested through `Store::get` or indirectly by mounting
    /// or write propagation.
    pub fn derived<F>(read: F) -> Self
    where
        F: Fn(&mut Getter<'_>) -> Result<T, StoreError> + Send + Sync + 'static,
    {
        let read: ReadFn = Arc::new(move |getter| {
            let value = read(getter)?;
            Ok(Arc::new(value) as ErasedValue)
        });
        Self {
            def: Arc::new(AtomDef::new(None, read, None, def::value_eq_fn::<T>())),
            _marker: PhantomData,
        }
    }

    /// Attach a human-readable label, used in errors, logs, and the debug
    /// mount listing. Only meaningful at construction time, before the
    /// handle is cloned.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        if let Some(def) = Arc::get_mut(&mut self.def) {
            def.set_label(label.into());
        }
        self
    }

    /// The atom's unique ID.
    pub fn id(&self) -> AtomId {
        self.def.id()
    }

    /// The atom's label, if one was set.
    pub fn label(&self) -> Option<&str> {
        self.def.label()
    }
}

impl<T> Readable<T> for Atom<T> {
    fn def(&self) -> &Arc<AtomDef> {
        &self.def
    }
}

impl<T> Clone for Atom<T> {
    fn clone(&self) -> Self {
        Self {
            def: Arc::clone(&self.def),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Atom<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Atom")
            .field("id", &self.def.id())
            .field("label", &self.def.label())
            .finish()
    }
}

/// A primitive (leaf) atom holding a value of type `T`.
pub struct PrimitiveAtom<T> {
    def: Arc<AtomDef>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PrimitiveAtom<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a primitive atom with the given initial value.
    ///
    /// The initial value is not installed into any store here; each store
    /// materializes its own state for the atom on first read.
    pub fn new(initial: T) -> Self {
        let write: WriteFn = Arc::new(|setter, arg| {
            let update = arg
                .downcast::<Update<T>>()
                .map_err(|_| StoreError::TypeMismatch {
                    atom: setter.current_label(),
                })?;
            let next = match *update {
                Update::Replace(value) => value,
                Update::Compute(f) => {
                    let prev: T = setter.current_value()?;
                    f(&prev)
                }
            };
            setter.install(Arc::new(next))?;
            Ok(Box::new(()) as Box<dyn Any + Send>)
        });
        Self {
            def: Arc::new(AtomDef::new(
                Some(Arc::new(initial) as ErasedValue),
                def::self_read_fn(),
                Some(write),
                def::value_eq_fn::<T>(),
            )),
            _marker: PhantomData,
        }
    }

    /// Attach a human-readable label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        if let Some(def) = Arc::get_mut(&mut self.def) {
            def.set_label(label.into());
        }
        self
    }

    /// The atom's unique ID.
    pub fn id(&self) -> AtomId {
        self.def.id()
    }

    /// The atom's label, if one was set.
    pub fn label(&self) -> Option<&str> {
        self.def.label()
    }
}

impl<T> Readable<T> for PrimitiveAtom<T> {
    fn def(&self) -> &Arc<AtomDef> {
        &self.def
    }
}

impl<T> Clone for PrimitiveAtom<T> {
    fn clone(&self) -> Self {
        Self {
            def: Arc::clone(&self.def),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for PrimitiveAtom<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimitiveAtom")
            .field("id", &self.def.id())
            .field("label", &self.def.label())
            .finish()
    }
}

/// A derived atom with custom write semantics.
///
/// `T` is the value its read function produces, `Arg` the argument its write
/// function takes, `Out` the write function's result.
pub struct WritableAtom<T, Arg, Out> {
    def: Arc<AtomDef>,
    _marker: PhantomData<fn(Arg) -> (T, Out)>,
}

impl<T, Arg, Out> WritableAtom<T, Arg, Out>
where
    T: Clone + Send + Sync + PartialEq + 'static,
    Arg: Send + 'static,
    Out: Send + 'static,
{
    /// Create a writable derived atom from a read function and a write
    /// function.
    ///
    /// The write function receives a [`Setter`], through which it reads
    /// current values and sets the primitive atoms it is backed by. A write
    /// to another atom runs as a full nested write of that atom.
    pub fn new<R, W>(read: R, write: W) -> Self
    where
        R: Fn(&mut Getter<'_>) -> Result<T, StoreError> + Send + Sync + 'static,
        W: Fn(&mut Setter<'_>, Arg) -> Result<Out, StoreError> + Send + Sync + 'static,
    {
        let read: ReadFn = Arc::new(move |getter| {
            let value = read(getter)?;
            Ok(Arc::new(value) as ErasedValue)
        });
        let write: WriteFn = Arc::new(move |setter, arg| {
            let arg = arg.downcast::<Arg>().map_err(|_| StoreError::TypeMismatch {
                atom: setter.current_label(),
            })?;
            let out = write(setter, *arg)?;
            Ok(Box::new(out) as Box<dyn Any + Send>)
        });
        Self {
            def: Arc::new(AtomDef::new(None, read, Some(write), def::value_eq_fn::<T>())),
            _marker: PhantomData,
        }
    }

    /// Attach a human-readable label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        if let Some(def) = Arc::get_mut(&mut self.def) {
            def.set_label(label.into());
        }
        self
    }

    /// The atom's unique ID.
    pub fn id(&self) -> AtomId {
        self.def.id()
    }

    /// The atom's label, if one was set.
    pub fn label(&self) -> Option<&str> {
        self.def.label()
    }
}

impl<T, Arg, Out> Readable<T> for WritableAtom<T, Arg, Out> {
    fn def(&self) -> &Arc<AtomDef> {
        &self.def
    }
}

impl<T, Arg, Out> Clone for WritableAtom<T, Arg, Out> {
    fn clone(&self) -> Self {
        Self {
            def: Arc::clone(&self.def),
            _marker: PhantomData,
        }
    }
}

impl<T, Arg, Out> std::fmt::Debug for WritableAtom<T, Arg, Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritableAtom")
            .field("id", &self.def.id())
            .field("label", &self.def.label())
            .finish()
    }
}

//! Atom definitions.
//!
//! An atom is an immutable descriptor: identity, an optional label, a pure
//! read function, and optionally a write function and an initial value. It
//! carries no state of its own; all state lives in a [`Store`], keyed by the
//! atom's ID, so the same atom can be read in several stores independently.
//!
//! # Concepts
//!
//! ## Primitive atoms
//!
//! A [`PrimitiveAtom`] is leaf state: it holds an initial value and its read
//! function simply fetches its own stored value. Its default write accepts a
//! literal next value or an updater from the previous value.
//!
//! ## Derived atoms
//!
//! An [`Atom`] computes its value from other atoms. The read function is
//! given a getter; every atom read through it is recorded as a dependency of
//! the computation, so the store knows exactly which cells to recompute when
//! a write lands.
//!
//! ## Writable derived atoms
//!
//! A [`WritableAtom`] adds a custom write function on top of a derived read.
//! Writing a derived atom never mutates it directly; its write function
//! expresses the semantics by setting the primitive atoms it is backed by.
//!
//! [`Store`]: crate::store::Store

mod def;
mod handle;
mod id;

pub use def::AtomDef;
pub use handle::{Atom, PrimitiveAtom, Readable, Update, WritableAtom};
pub use id::AtomId;

pub(crate) use def::{downcast_value, ErasedValue};
#[cfg(test)]
pub(crate) use def::{self_read_fn, value_eq_fn};

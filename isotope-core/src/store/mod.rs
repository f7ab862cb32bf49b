//! The store engine.
//!
//! This module is the core of the crate: it owns every atom's state and
//! orchestrates the three operations the public surface exposes.
//!
//! - **Read** ([`Store::get`]): lazily compute an atom's value by running
//!   its read function under a dependency-recording [`Getter`], cache the
//!   result with the recorded dependency set, and serve cached values as-is
//!   afterwards.
//! - **Write** ([`Store::set`] / [`Store::update`] / [`Store::write`]):
//!   apply the target atom's write function through a [`Setter`],
//!   force-recompute every mounted transitive dependent of each changed
//!   primitive, then flush one notification per affected mounted atom whose
//!   value actually changed.
//! - **Subscribe** ([`Store::subscribe`]): mount the atom and everything it
//!   depends on, keep those mount records alive while any listener or
//!   mounted dependent needs them, and tear the linkage down on
//!   unsubscribe.
//!
//! Only mounted atoms participate in write propagation. An unmounted atom's
//! cache can therefore go stale; that is by design, and the next mount (or
//! forced recomputation) brings it back in line.

mod access;
mod engine;
mod runtime;
mod state;

pub use access::{Getter, Setter};
pub use runtime::{MountedAtom, Store, Subscription};

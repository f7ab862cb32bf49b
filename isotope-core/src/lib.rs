//! Isotope Core
//!
//! This crate provides the store engine for the Isotope reactive
//! state-container. It implements:
//!
//! - Atoms: memoized, lazily-recomputed cells with automatic dependency
//!   tracking
//! - A store that caches each atom's value together with the exact set of
//!   atoms it read while computing it
//! - Transactional write propagation: a write recomputes every mounted
//!   transitive dependent before notifying subscribers
//! - A mount/unmount lifecycle, so only atoms reachable from an active
//!   subscriber are kept live and recomputed
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `atom`: immutable atom definitions and the typed handle surface
//! - `store`: the engine, with its state / mount / pending tables
//!
//! # Example
//!
//! ```rust
//! use isotope_core::{Atom, PrimitiveAtom, Store};
//!
//! # fn main() -> Result<(), isotope_core::StoreError> {
//! let store = Store::new();
//!
//! // Leaf state.
//! let count = PrimitiveAtom::new(0).with_label("count");
//!
//! // A derived value, recomputed when `count` changes.
//! let double = {
//!     let count = count.clone();
//!     Atom::derived(move |g| Ok(g.get(&count)? * 2)).with_label("double")
//! };
//!
//! let sub = store.subscribe(&double, || println!("double changed"))?;
//!
//! store.set(&count, 5)?; // prints "double changed"
//! assert_eq!(store.get(&double)?, 10);
//!
//! sub.unsubscribe();
//! # Ok(())
//! # }
//! ```
//!
//! # Execution model
//!
//! Single-threaded and cooperative: reads and writes never suspend, and all
//! recomputation and notification happens synchronously inside the call that
//! triggered it. Read functions must be pure and the dependency graph must
//! be acyclic; the store detects cycles but cannot detect impure reads.

pub mod atom;
pub mod store;

mod error;

pub use atom::{Atom, AtomDef, AtomId, PrimitiveAtom, Readable, Update, WritableAtom};
pub use error::StoreError;
pub use store::{Getter, MountedAtom, Setter, Store, Subscription};

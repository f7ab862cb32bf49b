//! Atom identity.
//!
//! Every atom definition gets a unique opaque ID at creation. All store-side
//! tables (state, mount, pending) are keyed by this ID, so association from
//! an atom to its state never depends on the value type's equality semantics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for an atom definition.
///
/// IDs are identity, not value: two atoms built from identical closures and
/// initial values still get distinct IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomId(u64);

impl AtomId {
    /// Generate a new unique atom ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for AtomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

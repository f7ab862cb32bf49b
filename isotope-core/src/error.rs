//! Error types for the store engine.
//!
//! Every fallible store operation surfaces one of these variants. Errors are
//! never retried: a failing read or write aborts synchronously and propagates
//! to the external caller, and no listener notification is sent for a
//! transaction that failed.

use thiserror::Error;

/// Errors produced by the store engine.
///
/// The `atom` field carries a display label for the offending atom: the
/// user-supplied label when one was set, otherwise `atom #<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A self-read hit an atom with neither cached state nor an initial
    /// value. This signals a construction error: a derived atom was read as
    /// if it were primitive.
    #[error("{atom} has no cached state and no initial value")]
    NoInitialValue {
        /// Display label of the atom that was read.
        atom: String,
    },

    /// A read function, directly or transitively, read the atom it was
    /// computing. The dependency graph must be acyclic.
    #[error("cyclic dependency detected while computing {atom}")]
    CyclicDependency {
        /// Display label of the atom whose computation re-entered itself.
        atom: String,
    },

    /// A write was issued against a definition with no write function.
    ///
    /// Unreachable through the typed handles (they only expose writes on
    /// writable atoms); kept so the type-erased engine stays honest.
    #[error("{atom} is not writable")]
    NotWritable {
        /// Display label of the atom that was written.
        atom: String,
    },

    /// A type-erased value or write argument failed to downcast to the
    /// concrete type the handle promised. An internal invariant violation,
    /// surfaced as an error rather than a panic.
    #[error("value type mismatch for {atom}")]
    TypeMismatch {
        /// Display label of the atom involved.
        atom: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_the_atom_label() {
        let err = StoreError::NoInitialValue {
            atom: "atom `count` (#3)".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "atom `count` (#3) has no cached state and no initial value"
        );

        let err = StoreError::CyclicDependency {
            atom: "atom #7".to_string(),
        };
        assert!(err.to_string().contains("atom #7"));
    }
}

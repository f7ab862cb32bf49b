//! Type-erased atom definitions.
//!
//! The public API is statically typed (`Atom<T>`, `PrimitiveAtom<T>`,
//! `WritableAtom<T, Arg, Out>`), but the store itself is type-erased: every
//! atom's value is stored homogeneously as `Arc<dyn Any + Send + Sync>` and
//! resolved back to its concrete type only at the public boundary. `AtomDef`
//! is the erased descriptor the typed handles all share.
//!
//! A definition is immutable once built. The store never mutates one, it
//! only associates state with its ID.

use std::any::Any;
use std::sync::Arc;

use crate::error::StoreError;
use crate::store::{Getter, Setter};

use super::id::AtomId;

/// A type-erased atom value.
///
/// Values are boxed once when produced and shared by reference afterwards;
/// the store clones the `Arc`, never the value, until a typed `get` resolves
/// it back to `T`.
pub(crate) type ErasedValue = Arc<dyn Any + Send + Sync>;

/// Erased read function: computes the atom's value against a
/// dependency-recording getter.
pub(crate) type ReadFn =
    Arc<dyn Fn(&mut Getter<'_>) -> Result<ErasedValue, StoreError> + Send + Sync>;

/// Erased write function: applies a boxed argument through a setter and
/// returns a boxed result.
pub(crate) type WriteFn = Arc<
    dyn Fn(&mut Setter<'_>, Box<dyn Any + Send>) -> Result<Box<dyn Any + Send>, StoreError>
        + Send
        + Sync,
>;

/// Erased value-equality function, generated per concrete type from its
/// `PartialEq` impl. Used to decide whether a recomputed or written value
/// actually changed; a mismatch in erased types compares as not-equal.
pub(crate) type EqFn = Arc<dyn Fn(&dyn Any, &dyn Any) -> bool + Send + Sync>;

/// The immutable, type-erased description of one atom.
///
/// Holds identity, an optional human-readable label, an optional initial
/// value (present exactly for primitive atoms), the read function, the
/// optional write function, and the value-equality function.
pub struct AtomDef {
    id: AtomId,
    label: Option<String>,
    init: Option<ErasedValue>,
    read: ReadFn,
    write: Option<WriteFn>,
    eq: EqFn,
}

impl AtomDef {
    pub(crate) fn new(
        init: Option<ErasedValue>,
        read: ReadFn,
        write: Option<WriteFn>,
        eq: EqFn,
    ) -> Self {
        Self {
            id: AtomId::new(),
            label: None,
            init,
            read,
            write,
            eq,
        }
    }

    /// The atom's unique ID.
    pub fn id(&self) -> AtomId {
        self.id
    }

    /// The atom's human-readable label, if one was set.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub(crate) fn set_label(&mut self, label: String) {
        self.label = Some(label);
    }

    pub(crate) fn init(&self) -> Option<&ErasedValue> {
        self.init.as_ref()
    }

    pub(crate) fn read_fn(&self) -> &ReadFn {
        &self.read
    }

    pub(crate) fn write_fn(&self) -> Option<&WriteFn> {
        self.write.as_ref()
    }

    /// Compare two erased values with this atom's equality function.
    pub(crate) fn values_equal(&self, a: &dyn Any, b: &dyn Any) -> bool {
        (self.eq)(a, b)
    }

    /// Display label used in errors and logs: the user label when present,
    /// otherwise `atom #<id>`.
    pub(crate) fn debug_label(&self) -> String {
        match &self.label {
            Some(label) => format!("atom `{}` ({})", label, self.id),
            None => format!("atom {}", self.id),
        }
    }
}

impl std::fmt::Debug for AtomDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomDef")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("primitive", &self.init.is_some())
            .field("writable", &self.write.is_some())
            .finish()
    }
}

/// Read function shared by all primitive atoms: fetch the atom's own stored
/// value (cached state if present, declared initial value otherwise).
pub(crate) fn self_read_fn() -> ReadFn {
    Arc::new(|getter| getter.read_self())
}

/// Build the erased equality function for a concrete value type.
pub(crate) fn value_eq_fn<T>() -> EqFn
where
    T: PartialEq + 'static,
{
    Arc::new(|a, b| match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    })
}

/// Resolve an erased value back to its concrete type, cloning it out.
pub(crate) fn downcast_value<T>(value: &ErasedValue, def: &AtomDef) -> Result<T, StoreError>
where
    T: Clone + 'static,
{
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| StoreError::TypeMismatch {
            atom: def.debug_label(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_eq_fn_compares_through_erasure() {
        let eq = value_eq_fn::<i32>();
        assert!(eq(&1i32, &1i32));
        assert!(!eq(&1i32, &2i32));
        // Mismatched types never compare equal.
        assert!(!eq(&1i32, &"one"));
    }

    #[test]
    fn downcast_value_recovers_concrete_type() {
        let def = AtomDef::new(None, self_read_fn(), None, value_eq_fn::<i32>());
        let value: ErasedValue = Arc::new(41i32);

        assert_eq!(downcast_value::<i32>(&value, &def), Ok(41));
        assert_eq!(
            downcast_value::<String>(&value, &def),
            Err(StoreError::TypeMismatch {
                atom: def.debug_label()
            })
        );
    }

    #[test]
    fn debug_label_prefers_the_user_label() {
        let mut def = AtomDef::new(None, self_read_fn(), None, value_eq_fn::<i32>());
        assert_eq!(def.debug_label(), format!("atom {}", def.id()));

        def.set_label("count".to_string());
        assert_eq!(
            def.debug_label(),
            format!("atom `count` ({})", def.id())
        );
    }
}

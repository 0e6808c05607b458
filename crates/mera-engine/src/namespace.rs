//! Frozen module namespace objects.

use std::collections::BTreeMap;
use std::rc::Rc;

use thiserror::Error;

use crate::binding::{Binding, UninitializedBindingError};
use crate::record::Identity;
use crate::value::Value;

/// Raised by any attempt to mutate a namespace object after construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cannot modify namespace of module '{module}'")]
pub struct FrozenMutationError {
    /// The module whose namespace was targeted.
    pub module: Identity,
}

#[derive(Debug)]
struct Inner {
    module: Identity,
    entries: BTreeMap<String, Binding>,
}

/// The frozen, sorted view of a module's resolved exports.
///
/// Keys exclude ambiguous star-exported names and `default`. Entries alias
/// the owning records' slots, so `get` observes live bindings; construction
/// inspects key presence only and never reads slot values, which keeps it
/// safe to build while targets are still in the dead zone.
#[derive(Debug, Clone)]
pub struct Namespace {
    inner: Rc<Inner>,
}

impl Namespace {
    pub(crate) fn new(module: Identity, entries: BTreeMap<String, Binding>) -> Self {
        Self {
            inner: Rc::new(Inner { module, entries }),
        }
    }

    /// The module this namespace belongs to.
    pub fn module(&self) -> &Identity {
        &self.inner.module
    }

    /// Whether `name` is a member. Ignores TDZ state: a declared but not yet
    /// initialized export is a member.
    pub fn has(&self, name: &str) -> bool {
        self.inner.entries.contains_key(name)
    }

    /// Read a member's current value. A member still in the dead zone raises
    /// [`UninitializedBindingError`]; a non-member reads as `Undefined`.
    pub fn get(&self, name: &str) -> Result<Value, UninitializedBindingError> {
        match self.inner.entries.get(name) {
            Some(binding) => binding.get(),
            None => Ok(Value::Undefined),
        }
    }

    /// Member names in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.inner.entries.keys().map(|k| k.as_str())
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Whether the namespace has no members.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Namespaces are frozen; writing a member always fails.
    pub fn set(&self, _name: &str, _value: Value) -> Result<(), FrozenMutationError> {
        Err(FrozenMutationError {
            module: self.inner.module.clone(),
        })
    }

    /// Namespaces are frozen; removing a member always fails.
    pub fn delete(&self, _name: &str) -> Result<(), FrozenMutationError> {
        Err(FrozenMutationError {
            module: self.inner.module.clone(),
        })
    }
}

impl PartialEq for Namespace {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

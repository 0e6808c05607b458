//! Per-module lexical scopes.
//!
//! A scope maps declared names to binding slots. Host thunks receive a shared
//! handle to their module's scope, which is also what hoisted functions
//! capture so that calls made after evaluation still see live bindings.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::binding::{Binding, Mutability};
use crate::eval::EvalError;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    /// Declared by this module; the scope owns the slot.
    Local,
    /// An alias for a slot owned by another module.
    Import,
}

#[derive(Debug, Clone)]
struct ScopeEntry {
    binding: Binding,
    kind: EntryKind,
}

/// A shared handle to one module's binding table.
#[derive(Debug, Clone, Default)]
pub struct ModuleScope {
    entries: Rc<RefCell<FxHashMap<String, ScopeEntry>>>,
}

impl ModuleScope {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Declare a local binding in the dead zone and return its slot handle.
    pub(crate) fn declare(&self, name: &str, mutability: Mutability) -> Binding {
        let binding = Binding::uninitialized(name, mutability);
        let entry = ScopeEntry {
            binding: binding.clone(),
            kind: EntryKind::Local,
        };
        let previous = self.entries.borrow_mut().insert(name.to_string(), entry);
        debug_assert!(previous.is_none(), "duplicate declaration of '{name}'");
        binding
    }

    /// Install an imported slot under a local alias.
    pub(crate) fn alias(&self, name: &str, binding: Binding) {
        let entry = ScopeEntry {
            binding,
            kind: EntryKind::Import,
        };
        self.entries.borrow_mut().insert(name.to_string(), entry);
    }

    /// The slot handle for a declared name, if any.
    pub(crate) fn binding(&self, name: &str) -> Option<Binding> {
        self.entries.borrow().get(name).map(|e| e.binding.clone())
    }

    /// Read a binding, enforcing TDZ.
    ///
    /// Imported names read through the owner's slot, so a dead-zone read
    /// fails identically whether it happens in the owner or an importer.
    pub fn read(&self, name: &str) -> Result<Value, EvalError> {
        let entry = self
            .entries
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnboundName {
                name: name.to_string(),
            })?;
        entry.binding.get().map_err(EvalError::from)
    }

    /// Write a binding. Fails for imported aliases, for consts that are
    /// already initialized, and for dead-zone targets.
    pub fn write(&self, name: &str, value: Value) -> Result<(), EvalError> {
        let entry = self
            .entries
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnboundName {
                name: name.to_string(),
            })?;
        if entry.kind == EntryKind::Import {
            return Err(EvalError::AssignmentToImport {
                name: name.to_string(),
            });
        }
        if entry.binding.mutability() == Mutability::Const && entry.binding.is_initialized() {
            return Err(EvalError::AssignmentToConst {
                name: name.to_string(),
            });
        }
        entry.binding.set(value).map_err(EvalError::from)
    }

    /// Flip a local binding out of the dead zone.
    pub(crate) fn initialize(&self, name: &str, value: Value) -> Result<(), EvalError> {
        let entry = self
            .entries
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnboundName {
                name: name.to_string(),
            })?;
        entry.binding.initialize(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_unbound_name() {
        let scope = ModuleScope::new();
        assert!(matches!(
            scope.read("x"),
            Err(EvalError::UnboundName { .. })
        ));
    }

    #[test]
    fn test_tdz_then_initialized() {
        let scope = ModuleScope::new();
        scope.declare("x", Mutability::Let);
        assert!(matches!(scope.read("x"), Err(EvalError::Uninitialized(_))));

        scope.initialize("x", Value::from(1)).unwrap();
        assert_eq!(scope.read("x").unwrap(), Value::from(1));
    }

    #[test]
    fn test_const_reassignment_fails() {
        let scope = ModuleScope::new();
        scope.declare("c", Mutability::Const);
        scope.initialize("c", Value::from(1)).unwrap();
        assert!(matches!(
            scope.write("c", Value::from(2)),
            Err(EvalError::AssignmentToConst { .. })
        ));
    }

    #[test]
    fn test_import_alias_is_read_only() {
        let owner = ModuleScope::new();
        let slot = owner.declare("x", Mutability::Let);
        owner.initialize("x", Value::from(1)).unwrap();

        let importer = ModuleScope::new();
        importer.alias("y", slot);
        assert_eq!(importer.read("y").unwrap(), Value::from(1));
        assert!(matches!(
            importer.write("y", Value::from(2)),
            Err(EvalError::AssignmentToImport { .. })
        ));

        // Owner writes stay visible through the alias.
        owner.write("x", Value::from(3)).unwrap();
        assert_eq!(importer.read("y").unwrap(), Value::from(3));
    }
}

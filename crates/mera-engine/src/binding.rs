//! Binding slots: named storage cells with temporal-dead-zone state.
//!
//! A slot is created uninitialized when its module is linked and flips to
//! initialized when evaluation reaches the declaring statement. Importers hold
//! clones of the slot handle rather than copies of the value, so a later write
//! by the owning module is observed by every importer.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::value::Value;

/// Raised when a binding is read (or written) before its declaring statement
/// has executed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cannot access '{name}' before initialization")]
pub struct UninitializedBindingError {
    /// The name of the binding that was accessed.
    pub name: String,
}

/// How a binding may be written after initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    /// Reassignable by the owning module.
    Let,
    /// Never reassignable once initialized.
    Const,
    /// A hoisted function or class binding; initialized before the module
    /// body runs and writable by the owning module only.
    Hoisted,
}

#[derive(Debug)]
struct Slot {
    name: String,
    /// `None` is the TDZ tombstone.
    value: Option<Value>,
    mutability: Mutability,
}

/// A shared handle to one binding slot.
///
/// Cloning the handle aliases the same cell; [`Binding::same_slot`] tests for
/// that aliasing.
#[derive(Debug, Clone)]
pub struct Binding {
    slot: Rc<RefCell<Slot>>,
}

impl Binding {
    /// Create a slot in the temporal dead zone.
    pub fn uninitialized(name: impl Into<String>, mutability: Mutability) -> Self {
        Self {
            slot: Rc::new(RefCell::new(Slot {
                name: name.into(),
                value: None,
                mutability,
            })),
        }
    }

    /// Create a slot that is already initialized.
    ///
    /// Used for namespace-import bindings, which are never in the dead zone.
    pub fn initialized(name: impl Into<String>, mutability: Mutability, value: Value) -> Self {
        Self {
            slot: Rc::new(RefCell::new(Slot {
                name: name.into(),
                value: Some(value),
                mutability,
            })),
        }
    }

    /// The declared name of the binding.
    pub fn name(&self) -> String {
        self.slot.borrow().name.clone()
    }

    /// The binding's mutability class.
    pub fn mutability(&self) -> Mutability {
        self.slot.borrow().mutability
    }

    /// Whether the declaring statement has executed.
    ///
    /// Existence checks go through this and never fail; value reads go
    /// through [`Binding::get`].
    pub fn is_initialized(&self) -> bool {
        self.slot.borrow().value.is_some()
    }

    /// Flip the slot out of the dead zone with its initial value.
    pub(crate) fn initialize(&self, value: Value) {
        let mut slot = self.slot.borrow_mut();
        debug_assert!(slot.value.is_none(), "binding initialized twice");
        slot.value = Some(value);
    }

    /// Read the slot's value.
    pub fn get(&self) -> Result<Value, UninitializedBindingError> {
        let slot = self.slot.borrow();
        slot.value.clone().ok_or_else(|| UninitializedBindingError {
            name: slot.name.clone(),
        })
    }

    /// Overwrite the slot's value. TDZ writes fail like TDZ reads; const
    /// enforcement is the scope's concern.
    pub(crate) fn set(&self, value: Value) -> Result<(), UninitializedBindingError> {
        let mut slot = self.slot.borrow_mut();
        if slot.value.is_none() {
            return Err(UninitializedBindingError {
                name: slot.name.clone(),
            });
        }
        slot.value = Some(value);
        Ok(())
    }

    /// Whether two handles alias the same storage cell.
    pub fn same_slot(a: &Binding, b: &Binding) -> bool {
        Rc::ptr_eq(&a.slot, &b.slot)
    }
}

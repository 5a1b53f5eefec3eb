//! The one-shot self-type binding cell backing [`crate::types::Type::SelfMarker`].
//!
//! `spec.md` §4.2 and the design notes are explicit that a self-referential
//! field must not own a reference to its enclosing struct (that would be a
//! reference cycle); instead it keeps a lazily-filled cell, written exactly
//! once when the enclosing `Struct`/`Union`/`BitField` finishes construction.
//! Dereferencing a still-empty cell is the `UnboundSelfError` condition.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::Error;
use crate::types::Type;

/// A cell that is empty until the struct containing the `SelfMarker` that
/// owns it finishes construction, at which point it is filled exactly once
/// with that struct's own descriptor.
#[derive(Debug, Default)]
pub struct SelfCell(OnceCell<Type>);

impl SelfCell {
    pub fn new() -> Arc<SelfCell> {
        Arc::new(SelfCell(OnceCell::new()))
    }

    /// Bind this cell to `self_type`. A cell that is already bound is left
    /// untouched (binding only ever happens once, by construction).
    pub fn bind(&self, self_type: Type) {
        let _ = self.0.set(self_type);
    }

    pub fn get(&self) -> Option<&Type> {
        self.0.get()
    }

    pub fn resolve(&self) -> Result<Type, Error> {
        self.0.get().cloned().ok_or(Error::UnboundSelf)
    }

    pub fn is_bound(&self) -> bool {
        self.0.get().is_some()
    }
}

/// Walk `ty`, binding any `SelfMarker` cell reachable through `Ptr` targets
/// or `Array` element types to `self_type`. Mirrors the original's
/// `_set_self_type`, which the base `Type` implements as a no-op override
/// except for `Array`, which forwards to its element type.
pub fn propagate_self(ty: &Type, self_type: &Type) {
    match ty {
        Type::Ptr(ptr) => ptr.bind_self(self_type.clone()),
        Type::Array(array) => propagate_self(&array.elem, self_type),
        _ => {}
    }
}

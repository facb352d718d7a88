//! The runtime context passed as the hidden first parameter to every
//! `bread_*` ABI function (see [`crate::ops`]): scope stack, class registry,
//! string interner, and error state. The runtime owns exactly three process-wide
//! registries (string-global cache, class registry, compiled-method
//! registry — the third lives inside [`crate::class::BreadClass`] itself)
//! plus per-call scope state.
//!
//! One `RuntimeContext` is constructed per JIT execution by the driver in
//! `bread-codegen` and threaded through as a raw pointer; it is never a
//! `static`/`lazy_static`/`OnceLock` singleton.

use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashMap;

use crate::class::ClassRegistry;
use crate::error::RuntimeError;
use crate::scope::ScopeStack;

/// Interns identifier and string-literal text so that "same identifier or
/// literal string maps to the same global pointer"
/// holds at the runtime-value level as well as at the emitted-IR level.
#[derive(Debug, Default)]
pub struct StringInterner {
    table: HashMap<String, Rc<str>>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> Rc<str> {
        if let Some(existing) = self.table.get(s) {
            return existing.clone();
        }
        let rc: Rc<str> = Rc::from(s);
        self.table.insert(s.to_string(), rc.clone());
        rc
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Passed as `*mut RuntimeContext` to every `bread_*` extern "C" function.
pub struct RuntimeContext {
    pub scopes: ScopeStack,
    pub classes: ClassRegistry,
    pub strings: StringInterner,
    error: RefCell<Option<RuntimeError>>,
}

impl RuntimeContext {
    pub fn new() -> Self {
        RuntimeContext {
            scopes: ScopeStack::new(),
            classes: ClassRegistry::new(),
            strings: StringInterner::new(),
            error: RefCell::new(None),
        }
    }

    /// Records an error without overwriting one already pending: the first
    /// error in a chain of calls wins.
    pub fn set_error(&self, err: RuntimeError) {
        let mut slot = self.error.borrow_mut();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.borrow().is_some()
    }

    pub fn take_error(&self) -> Option<RuntimeError> {
        self.error.borrow_mut().take()
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new()
    }
}

/// FFI-safe status flag returned alongside a value by the lower-level
/// `bread_*` entry points that can fail (index/field/method/class lookups),
/// a `{ value, error }` pair rather than a tuple, since a tuple is
/// not `#[repr(C)]`-safe across the JIT call boundary.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct RuntimeStatus {
    pub value: u64,
    pub error: u64,
}

impl RuntimeStatus {
    #[inline]
    pub const fn ok(value: u64) -> Self {
        RuntimeStatus { value, error: 0 }
    }

    #[inline]
    pub const fn err() -> Self {
        RuntimeStatus { value: 0, error: 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_same_text_yields_same_pointer() {
        let mut interner = StringInterner::new();
        let a = interner.intern("hello");
        let b = interner.intern("hello");
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn first_error_wins() {
        let ctx = RuntimeContext::new();
        ctx.set_error(RuntimeError::DivisionByZero);
        ctx.set_error(RuntimeError::NoSuchKey);
        assert_eq!(ctx.take_error(), Some(RuntimeError::DivisionByZero));
        assert!(ctx.take_error().is_none());
    }
}

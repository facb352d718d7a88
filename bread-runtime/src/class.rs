//! The class registry — a `bread_class_*` ABI surface covering class
//! definition, registration, inheritance resolution, instance creation, and
//! compiled method/constructor lookup, plus the bridge that connects a
//! class to its compiled method addresses and runs them.
//!
//! A single C-style struct would conflate "class definition" (name, parent, method
//! table) and "instance" (field values) in one struct; this realization
//! splits them into [`BreadClass`] (the definition, one per declared class,
//! owned by the registry) and [`ClassInstance`] (one per constructed object),
//! mirroring how `CgClass` on the compile-time side holds no instance data
//! of its own, leaving that to runtime-owned instances.

use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashMap;

use crate::error::{RuntimeError, RuntimeResult};
use crate::value::BreadValue;

/// A type-erased pointer to a JIT-compiled method or constructor. Arity
/// (0..=3, per documented limitation) determines how the bridge
/// casts and calls it; see `bread-codegen`'s runtime bridge.
pub type RawFnPtr = *const u8;

#[derive(Debug)]
pub struct BreadClass {
    pub name: String,
    pub parent_name: Option<String>,
    parent: RefCell<Option<Rc<RefCell<BreadClass>>>>,
    own_field_names: Vec<String>,
    method_names: Vec<String>,
    compiled_methods: Vec<Option<RawFnPtr>>,
    compiled_constructor: Option<RawFnPtr>,
}

impl BreadClass {
    pub fn new(
        name: impl Into<String>,
        parent_name: Option<String>,
        field_names: Vec<String>,
        method_names: Vec<String>,
    ) -> Self {
        let n = method_names.len();
        BreadClass {
            name: name.into(),
            parent_name,
            parent: RefCell::new(None),
            own_field_names: field_names,
            method_names,
            compiled_methods: vec![None; n],
            compiled_constructor: None,
        }
    }

    /// Inherited fields first (deduplicated by name), then own fields.
    pub fn all_field_names(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .parent
            .borrow()
            .as_ref()
            .map(|p| p.borrow().all_field_names())
            .unwrap_or_default();
        for f in &self.own_field_names {
            if !out.contains(f) {
                out.push(f.clone());
            }
        }
        out
    }

    pub fn find_method_index(&self, name: &str) -> Option<usize> {
        self.method_names.iter().position(|m| m == name)
    }

    /// Walks the inheritance chain to find a compiled method by name,
    /// returning the owning class's name alongside the pointer (needed by
    /// the bridge to build the right `self` layout if fields differ across
    /// the hierarchy — they don't here, but kept for clarity).
    pub fn resolve_compiled_method(&self, name: &str) -> Option<RawFnPtr> {
        if let Some(i) = self.find_method_index(name) {
            if let Some(ptr) = self.compiled_methods[i] {
                return Some(ptr);
            }
        }
        self.parent.borrow().as_ref().and_then(|p| p.borrow().resolve_compiled_method(name))
    }

    pub fn compiled_constructor(&self) -> Option<RawFnPtr> {
        self.compiled_constructor
    }

    pub fn set_compiled_method(&mut self, index: usize, ptr: RawFnPtr) -> RuntimeResult<()> {
        let slot = self
            .compiled_methods
            .get_mut(index)
            .ok_or(RuntimeError::Bounds { index: index as i64, len: self.compiled_methods.len() })?;
        *slot = Some(ptr);
        Ok(())
    }

    pub fn set_compiled_method_by_name(&mut self, name: &str, ptr: RawFnPtr) -> RuntimeResult<()> {
        let i = self
            .find_method_index(name)
            .ok_or_else(|| RuntimeError::NoSuchMethod(name.to_string()))?;
        self.compiled_methods[i] = Some(ptr);
        Ok(())
    }

    pub fn set_compiled_constructor(&mut self, ptr: RawFnPtr) {
        self.compiled_constructor = Some(ptr);
    }
}

#[derive(Debug)]
pub struct ClassInstance {
    pub class: Rc<RefCell<BreadClass>>,
    field_names: Vec<String>,
    fields: Vec<BreadValue>,
}

impl ClassInstance {
    fn find_field_index(&self, name: &str) -> Option<usize> {
        self.field_names.iter().position(|f| f == name)
    }

    pub fn get_field(&self, name: &str) -> RuntimeResult<BreadValue> {
        self.find_field_index(name)
            .map(|i| self.fields[i])
            .ok_or_else(|| RuntimeError::NoSuchField(name.to_string()))
    }

    pub fn set_field(&mut self, name: &str, value: BreadValue) -> RuntimeResult<()> {
        let i = self
            .find_field_index(name)
            .ok_or_else(|| RuntimeError::NoSuchField(name.to_string()))?;
        let old = std::mem::replace(&mut self.fields[i], value);
        unsafe { old.release() };
        Ok(())
    }

    pub fn class_name(&self) -> String {
        self.class.borrow().name.clone()
    }
}

impl Drop for ClassInstance {
    fn drop(&mut self) {
        for v in self.fields.drain(..) {
            unsafe { v.release() };
        }
    }
}

#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: HashMap<String, Rc<RefCell<BreadClass>>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// `class_create_instance` in its runtime-init-pass role: allocates a
    /// fresh class *definition* object. Object
    /// *instances* are built later by [`ClassRegistry::create_instance`].
    pub fn create_class_definition(
        &self,
        name: &str,
        parent_name: Option<String>,
        field_names: Vec<String>,
        method_names: Vec<String>,
    ) -> Rc<RefCell<BreadClass>> {
        Rc::new(RefCell::new(BreadClass::new(name, parent_name, field_names, method_names)))
    }

    /// `class_register_definition`: inserts a freshly created class
    /// definition into the registry under its own name.
    pub fn register_definition(&mut self, class: Rc<RefCell<BreadClass>>) {
        let name = class.borrow().name.clone();
        self.classes.insert(name, class);
    }

    pub fn find_definition(&self, name: &str) -> Option<Rc<RefCell<BreadClass>>> {
        self.classes.get(name).cloned()
    }

    /// `class_resolve_inheritance` — links each registered class's
    /// `parent_name` to the actual parent `Rc`, step after the
    /// per-class loop.
    pub fn resolve_inheritance(&self) -> RuntimeResult<()> {
        for class in self.classes.values() {
            let parent_name = class.borrow().parent_name.clone();
            if let Some(parent_name) = parent_name {
                let parent = self
                    .find_definition(&parent_name)
                    .ok_or_else(|| RuntimeError::NoSuchClass(parent_name.clone()))?;
                *class.borrow().parent.borrow_mut() = Some(parent);
            }
        }
        Ok(())
    }

    /// Constructs a new object instance of a previously-registered class —
    /// "Class constructors".
    pub fn create_instance(&self, name: &str) -> RuntimeResult<Rc<RefCell<ClassInstance>>> {
        let class = self.find_definition(name).ok_or_else(|| RuntimeError::NoSuchClass(name.to_string()))?;
        let field_names = class.borrow().all_field_names();
        let fields = vec![BreadValue::null(); field_names.len()];
        Ok(Rc::new(RefCell::new(ClassInstance { class, field_names, fields })))
    }

    pub fn set_compiled_method(&self, class_name: &str, index: usize, ptr: RawFnPtr) -> RuntimeResult<()> {
        let class = self.find_definition(class_name).ok_or_else(|| RuntimeError::NoSuchClass(class_name.to_string()))?;
        class.borrow_mut().set_compiled_method(index, ptr)
    }

    pub fn set_compiled_method_by_name(&self, class_name: &str, method_name: &str, ptr: RawFnPtr) -> RuntimeResult<()> {
        let class = self.find_definition(class_name).ok_or_else(|| RuntimeError::NoSuchClass(class_name.to_string()))?;
        class.borrow_mut().set_compiled_method_by_name(method_name, ptr)
    }

    pub fn set_compiled_constructor(&self, class_name: &str, ptr: RawFnPtr) -> RuntimeResult<()> {
        let class = self.find_definition(class_name).ok_or_else(|| RuntimeError::NoSuchClass(class_name.to_string()))?;
        class.borrow_mut().set_compiled_constructor(ptr);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(reg: &mut ClassRegistry, name: &str, parent: Option<&str>, fields: &[&str]) {
        let class = reg.create_class_definition(
            name,
            parent.map(String::from),
            fields.iter().map(|s| s.to_string()).collect(),
            vec![],
        );
        reg.register_definition(class);
    }

    #[test]
    fn inherited_fields_come_before_own_fields() {
        let mut reg = ClassRegistry::new();
        def(&mut reg, "A", None, &["x"]);
        def(&mut reg, "B", Some("A"), &["y"]);
        reg.resolve_inheritance().unwrap();
        let b = reg.find_definition("B").unwrap();
        assert_eq!(b.borrow().all_field_names(), vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn unknown_parent_is_an_error() {
        let mut reg = ClassRegistry::new();
        def(&mut reg, "B", Some("Missing"), &[]);
        assert!(reg.resolve_inheritance().is_err());
    }

    #[test]
    fn create_instance_initializes_all_fields_to_nil() {
        let mut reg = ClassRegistry::new();
        def(&mut reg, "A", None, &["x", "y"]);
        reg.resolve_inheritance().unwrap();
        let inst = reg.create_instance("A").unwrap();
        assert!(inst.borrow().get_field("x").unwrap().is_null());
        assert!(inst.borrow().get_field("y").unwrap().is_null());
        assert!(inst.borrow().get_field("z").is_err());
    }
}

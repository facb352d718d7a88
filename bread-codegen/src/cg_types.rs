//! Compile-time data model: the codegen core's own records for
//! a variable binding, a declared function, and a declared class — distinct
//! from their runtime counterparts in `bread_runtime` (a `Var` here is a
//! Cranelift stack slot plus static type info; a `bread_runtime::class::
//! BreadClass` is the live, JIT-populated registry entry it feeds).

use bread_ast::{FuncDecl, Param, TypeDescriptor, UnboxedRep};
use cranelift_codegen::ir::StackSlot;
use cranelift_module::FuncId;

/// A local variable binding inside a function being lowered. `storage_slot`
/// is `None` until the declaring statement actually allocates it — a slot
/// is never read before being written.
#[derive(Debug, Clone)]
pub struct Var {
    pub name: String,
    pub storage_slot: StackSlot,
    pub declared_type: TypeDescriptor,
    pub unboxed_rep: UnboxedRep,
    pub is_const: bool,
}

/// A function or method registered in the module's symbol table before its
/// body is lowered, so forward references (mutual recursion, a method
/// calling a sibling declared later) resolve during the first pass.
#[derive(Debug, Clone)]
pub struct CgFunction {
    pub name: String,
    pub func_id: FuncId,
    pub decl: FuncDecl,
    /// The class this is a method or constructor of, if any.
    pub owner_class: Option<String>,
    pub is_constructor: bool,
}

impl CgFunction {
    pub fn required_param_count(&self) -> usize {
        self.decl.required_param_count()
    }

    pub fn has_self(&self) -> bool {
        self.owner_class.is_some()
    }
}

/// A declared class, tracked from the point its header (name, parent, field
/// and method names) is seen, through the point its methods and constructor
/// have been assigned `FuncId`s.
#[derive(Debug, Clone)]
pub struct CgClass {
    pub name: String,
    pub parent: Option<String>,
    pub field_names: Vec<String>,
    pub method_names: Vec<String>,
    /// Parallel to `method_names`; filled in once each method's signature is
    /// declared with the module.
    pub method_func_ids: Vec<FuncId>,
    pub constructor_func_id: Option<FuncId>,
    /// The constructor's declared parameters (name, type, default), so a
    /// call site can fill in missing trailing arguments the same way a
    /// plain function call does — `None` for a class with no `init`.
    pub constructor_params: Option<Vec<Param>>,
}

impl CgClass {
    pub fn method_index(&self, name: &str) -> Option<usize> {
        self.method_names.iter().position(|m| m == name)
    }

    /// Number of leading constructor parameters with no default; `0` for a
    /// class with no declared constructor (every argument is then "extra"
    /// and a call site passing any is a runtime arity error, matching
    /// `bread_class_create_instance`'s "construct then run the compiled
    /// constructor with argc/args" contract).
    pub fn required_param_count(&self) -> usize {
        self.constructor_params.as_ref().map_or(0, |params| params.iter().take_while(|p| p.default.is_none()).count())
    }
}

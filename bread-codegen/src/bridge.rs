//! Runtime Bridge: declares every `bread_*` runtime entry
//! point as an imported function in the Cranelift module being built, and
//! maps each one to its actual process address for the JIT backend.
//!
//! With method/constructor pointer installation now handled entirely inside
//! the generated `runtime_init_classes` function (`class_lowering`, via
//! `declare_func_in_func`/`func_addr` once `JITModule::finalize_definitions`
//! has resolved every function together), this module's job reduces to the
//! two things a bridge genuinely needs to do: declare signatures so callers
//! get a `FuncId`, and tell the JIT where each imported symbol actually lives
//! in the host process.

use cranelift_codegen::ir::{types, AbiParam, Signature, Type};
use cranelift_jit::JITBuilder;
use cranelift_module::{FuncId, Linkage, Module, ModuleError};

use bread_runtime::ops;

/// `FuncId` handle for every `bread_*` ABI entry point, declared once per
/// module and threaded through `lowering`/`class_lowering` so each function
/// body can re-import the ones it actually calls via
/// `Module::declare_func_in_func`.
#[derive(Debug, Clone)]
pub struct RuntimeImports {
    pub value_set_nil: FuncId,
    pub value_set_int: FuncId,
    pub value_set_double: FuncId,
    pub value_set_bool: FuncId,
    pub value_set_string: FuncId,
    pub value_copy: FuncId,
    pub value_release: FuncId,
    pub unbox_int: FuncId,
    pub unbox_double: FuncId,
    pub unbox_bool: FuncId,
    pub is_truthy: FuncId,
    pub value_type_name: FuncId,
    pub box_int: FuncId,
    pub box_double: FuncId,
    pub box_bool: FuncId,
    pub retain_value: FuncId,

    pub scope_depth: FuncId,
    pub push_scope: FuncId,
    pub pop_scope: FuncId,
    pub pop_to_scope_depth: FuncId,
    pub var_decl: FuncId,
    pub var_decl_if_missing: FuncId,
    pub var_assign: FuncId,
    pub var_load: FuncId,

    pub add: FuncId,
    pub sub: FuncId,
    pub mul: FuncId,
    pub div: FuncId,
    pub rem: FuncId,
    pub eq: FuncId,
    pub ne: FuncId,
    pub lt: FuncId,
    pub le: FuncId,
    pub gt: FuncId,
    pub ge: FuncId,
    pub and: FuncId,
    pub or: FuncId,
    pub binary_op: FuncId,
    pub unary_not: FuncId,
    pub unary_neg: FuncId,

    pub index_op: FuncId,
    pub index_set_op: FuncId,
    pub member_op: FuncId,
    pub member_set_op: FuncId,

    pub array_new: FuncId,
    pub array_append_value: FuncId,
    pub array_length: FuncId,
    pub array_get: FuncId,
    pub iter_values: FuncId,
    pub dict_new: FuncId,
    pub dict_set_value: FuncId,
    pub dict_keys: FuncId,
    pub range_simple: FuncId,
    pub range_create: FuncId,

    pub class_create_definition: FuncId,
    pub class_register_definition: FuncId,
    pub class_resolve_inheritance: FuncId,
    pub class_set_compiled_method: FuncId,
    pub class_set_compiled_method_by_name: FuncId,
    pub class_set_compiled_constructor: FuncId,
    pub class_create_instance: FuncId,
    pub method_call_op: FuncId,

    pub struct_new: FuncId,
    pub class_literal_new: FuncId,

    pub print: FuncId,
    pub builtin_call_out: FuncId,

    pub memory_init: FuncId,
    pub string_intern_init: FuncId,
    pub builtin_init: FuncId,
    pub error_init: FuncId,
    pub runtime_cleanup: FuncId,
}

pub(crate) fn ptr_ty<M: Module>(module: &M) -> Type {
    module.target_config().pointer_type()
}

pub(crate) fn sig0<M: Module>(module: &M) -> Signature {
    Signature::new(module.isa().default_call_conv())
}

/// A `RuntimeStatus { value: u64, error: u64 }` return is classified as two
/// adjacent integer eightbytes under System V and returned in a register
/// pair, not via a hidden out-pointer — so it is declared as two `I64`
/// returns rather than one struct-typed one.
pub(crate) fn status_returns() -> Vec<AbiParam> {
    vec![AbiParam::new(types::I64), AbiParam::new(types::I64)]
}

macro_rules! declare {
    ($module:expr, $name:literal, $params:expr, $returns:expr) => {{
        let mut sig = sig0($module);
        sig.params.extend($params.into_iter().map(AbiParam::new));
        sig.returns.extend($returns.into_iter().map(AbiParam::new));
        $module.declare_function($name, Linkage::Import, &sig)?
    }};
}

/// Declares every `bread_*` import against `module`, returning their
/// `FuncId`s. Called once at the start of a [`crate::driver::Driver`]
/// compilation, before any user function body is lowered.
pub fn declare_runtime_imports<M: Module>(module: &mut M) -> Result<RuntimeImports, ModuleError> {
    let p = ptr_ty(module);
    use types::{F64, I32, I64, I8};

    Ok(RuntimeImports {
        value_set_nil: declare!(module, "bread_value_set_nil", [p], []),
        value_set_int: declare!(module, "bread_value_set_int", [p, I32], []),
        value_set_double: declare!(module, "bread_value_set_double", [p, F64], []),
        value_set_bool: declare!(module, "bread_value_set_bool", [p, I32], []),
        value_set_string: declare!(module, "bread_value_set_string", [p, p, p, p], []),
        value_copy: declare!(module, "bread_value_copy", [p, p], []),
        value_release: declare!(module, "bread_value_release", [I64], []),
        unbox_int: declare!(module, "bread_unbox_int", [I64], [I32]),
        unbox_double: declare!(module, "bread_unbox_double", [I64], [F64]),
        unbox_bool: declare!(module, "bread_unbox_bool", [I64], [I32]),
        is_truthy: declare!(module, "bread_is_truthy", [I64], [I32]),
        value_type_name: declare!(module, "bread_value_type_name", [I64], [I8]),
        box_int: declare!(module, "bread_box_int", [I32], [I64]),
        box_double: declare!(module, "bread_box_double", [F64], [I64]),
        box_bool: declare!(module, "bread_box_bool", [I32], [I64]),
        retain_value: declare!(module, "bread_retain_value", [I64], [I64]),

        scope_depth: declare!(module, "bread_scope_depth", [p], [I64]),
        push_scope: declare!(module, "bread_push_scope", [p], []),
        pop_scope: declare!(module, "bread_pop_scope", [p], []),
        pop_to_scope_depth: declare!(module, "bread_pop_to_scope_depth", [p, I64], []),
        var_decl: declare!(module, "bread_var_decl", [p, p, p, I64, I32], [I32]),
        var_decl_if_missing: declare!(module, "bread_var_decl_if_missing", [p, p, p, I64, I32], []),
        var_assign: declare!(module, "bread_var_assign", [p, p, p, I64], [I32]),
        var_load: declare!(module, "bread_var_load", [p, p, p], status_returns()),

        add: declare!(module, "bread_add", [p, I64, I64], status_returns()),
        sub: declare!(module, "bread_sub", [p, I64, I64], status_returns()),
        mul: declare!(module, "bread_mul", [p, I64, I64], status_returns()),
        div: declare!(module, "bread_div", [p, I64, I64], status_returns()),
        rem: declare!(module, "bread_mod", [p, I64, I64], status_returns()),
        eq: declare!(module, "bread_eq", [p, I64, I64], status_returns()),
        ne: declare!(module, "bread_ne", [p, I64, I64], status_returns()),
        lt: declare!(module, "bread_lt", [p, I64, I64], status_returns()),
        le: declare!(module, "bread_le", [p, I64, I64], status_returns()),
        gt: declare!(module, "bread_gt", [p, I64, I64], status_returns()),
        ge: declare!(module, "bread_ge", [p, I64, I64], status_returns()),
        and: declare!(module, "bread_and", [p, I64, I64], status_returns()),
        or: declare!(module, "bread_or", [p, I64, I64], status_returns()),
        binary_op: declare!(module, "bread_binary_op", [p, I8, I64, I64], status_returns()),
        unary_not: declare!(module, "bread_unary_not", [p, I64], status_returns()),
        unary_neg: declare!(module, "bread_unary_neg", [p, I64], status_returns()),

        index_op: declare!(module, "bread_index_op", [p, I64, I64], status_returns()),
        index_set_op: declare!(module, "bread_index_set_op", [p, I64, I64, I64], [I32]),
        member_op: declare!(module, "bread_member_op", [p, I64, p, p, I32], status_returns()),
        member_set_op: declare!(module, "bread_member_set_op", [p, I64, p, p, I64], [I32]),

        array_new: declare!(module, "bread_array_new", [], [I64]),
        array_append_value: declare!(module, "bread_array_append_value", [I64, I64], []),
        array_length: declare!(module, "bread_array_length", [I64], [I64]),
        array_get: declare!(module, "bread_array_get", [p, I64, I64], status_returns()),
        iter_values: declare!(module, "bread_iter_values", [p, I64], status_returns()),
        dict_new: declare!(module, "bread_dict_new", [], [I64]),
        dict_set_value: declare!(module, "bread_dict_set_value", [p, I64, I64, I64], [I32]),
        dict_keys: declare!(module, "bread_dict_keys", [I64, p], [I64]),
        range_simple: declare!(module, "bread_range_simple", [I32], [I64]),
        range_create: declare!(module, "bread_range_create", [I32, I32, I32], [I64]),

        class_create_definition: declare!(
            module,
            "bread_class_create_definition",
            [p, p, p, p, p, I32, p, p, I64, p, p, I64],
            [I64]
        ),
        class_register_definition: declare!(module, "bread_class_register_definition", [p, I64], []),
        class_resolve_inheritance: declare!(module, "bread_class_resolve_inheritance", [p], [I32]),
        class_set_compiled_method: declare!(module, "bread_class_set_compiled_method", [p, p, p, I64, I64], [I32]),
        class_set_compiled_method_by_name: declare!(
            module,
            "bread_class_set_compiled_method_by_name",
            [p, p, p, p, p, I64],
            [I32]
        ),
        class_set_compiled_constructor: declare!(module, "bread_class_set_compiled_constructor", [p, p, p, I64], [I32]),
        class_create_instance: declare!(module, "bread_class_create_instance", [p, p, p, p, I64], status_returns()),
        method_call_op: declare!(module, "bread_method_call_op", [p, I64, p, p, p, I64, I32], status_returns()),

        struct_new: declare!(module, "bread_struct_new", [p, p, p, p, I64], [I64]),
        class_literal_new: declare!(module, "bread_class_literal_new", [p, p, p], status_returns()),

        print: declare!(module, "bread_print", [I64], []),
        builtin_call_out: declare!(module, "bread_builtin_call_out", [p, p, p, p, I64], status_returns()),

        memory_init: declare!(module, "bread_memory_init", [p], []),
        string_intern_init: declare!(module, "bread_string_intern_init", [p], []),
        builtin_init: declare!(module, "bread_builtin_init", [p], []),
        error_init: declare!(module, "bread_error_init", [p], []),
        runtime_cleanup: declare!(module, "bread_runtime_cleanup", [p], []),
    })
}

/// Maps every `bread_*` symbol name to its actual address in this process.
/// Required because the imports above are resolved by name at
/// `JITModule::finalize_definitions` time, and nothing else links
/// `bread-runtime`'s `ops` module into the generated code's symbol space.
pub fn register_runtime_symbols(builder: &mut JITBuilder) {
    macro_rules! sym {
        ($name:literal, $f:expr) => {
            builder.symbol($name, $f as *const u8)
        };
    }

    sym!("bread_value_set_nil", ops::bread_value_set_nil);
    sym!("bread_value_set_int", ops::bread_value_set_int);
    sym!("bread_value_set_double", ops::bread_value_set_double);
    sym!("bread_value_set_bool", ops::bread_value_set_bool);
    sym!("bread_value_set_string", ops::bread_value_set_string);
    sym!("bread_value_copy", ops::bread_value_copy);
    sym!("bread_value_release", ops::bread_value_release);
    sym!("bread_unbox_int", ops::bread_unbox_int);
    sym!("bread_unbox_double", ops::bread_unbox_double);
    sym!("bread_unbox_bool", ops::bread_unbox_bool);
    sym!("bread_is_truthy", ops::bread_is_truthy);
    sym!("bread_value_type_name", ops::bread_value_type_name);
    sym!("bread_box_int", ops::bread_box_int);
    sym!("bread_box_double", ops::bread_box_double);
    sym!("bread_box_bool", ops::bread_box_bool);
    sym!("bread_retain_value", ops::bread_retain_value);

    sym!("bread_scope_depth", ops::bread_scope_depth);
    sym!("bread_push_scope", ops::bread_push_scope);
    sym!("bread_pop_scope", ops::bread_pop_scope);
    sym!("bread_pop_to_scope_depth", ops::bread_pop_to_scope_depth);
    sym!("bread_var_decl", ops::bread_var_decl);
    sym!("bread_var_decl_if_missing", ops::bread_var_decl_if_missing);
    sym!("bread_var_assign", ops::bread_var_assign);
    sym!("bread_var_load", ops::bread_var_load);

    sym!("bread_add", ops::bread_add);
    sym!("bread_sub", ops::bread_sub);
    sym!("bread_mul", ops::bread_mul);
    sym!("bread_div", ops::bread_div);
    sym!("bread_mod", ops::bread_mod);
    sym!("bread_eq", ops::bread_eq);
    sym!("bread_ne", ops::bread_ne);
    sym!("bread_lt", ops::bread_lt);
    sym!("bread_le", ops::bread_le);
    sym!("bread_gt", ops::bread_gt);
    sym!("bread_ge", ops::bread_ge);
    sym!("bread_and", ops::bread_and);
    sym!("bread_or", ops::bread_or);
    sym!("bread_binary_op", ops::bread_binary_op);
    sym!("bread_unary_not", ops::bread_unary_not);
    sym!("bread_unary_neg", ops::bread_unary_neg);

    sym!("bread_index_op", ops::bread_index_op);
    sym!("bread_index_set_op", ops::bread_index_set_op);
    sym!("bread_member_op", ops::bread_member_op);
    sym!("bread_member_set_op", ops::bread_member_set_op);

    sym!("bread_array_new", ops::bread_array_new);
    sym!("bread_array_append_value", ops::bread_array_append_value);
    sym!("bread_array_length", ops::bread_array_length);
    sym!("bread_array_get", ops::bread_array_get);
    sym!("bread_iter_values", ops::bread_iter_values);
    sym!("bread_dict_new", ops::bread_dict_new);
    sym!("bread_dict_set_value", ops::bread_dict_set_value);
    sym!("bread_dict_keys", ops::bread_dict_keys);
    sym!("bread_range_simple", ops::bread_range_simple);
    sym!("bread_range_create", ops::bread_range_create);

    sym!("bread_class_create_definition", ops::bread_class_create_definition);
    sym!("bread_class_register_definition", ops::bread_class_register_definition);
    sym!("bread_class_resolve_inheritance", ops::bread_class_resolve_inheritance);
    sym!("bread_class_set_compiled_method", ops::bread_class_set_compiled_method);
    sym!("bread_class_set_compiled_method_by_name", ops::bread_class_set_compiled_method_by_name);
    sym!("bread_class_set_compiled_constructor", ops::bread_class_set_compiled_constructor);
    sym!("bread_class_create_instance", ops::bread_class_create_instance);
    sym!("bread_method_call_op", ops::bread_method_call_op);

    sym!("bread_struct_new", ops::bread_struct_new);
    sym!("bread_class_literal_new", ops::bread_class_literal_new);

    sym!("bread_print", ops::bread_print);
    sym!("bread_builtin_call_out", ops::bread_builtin_call_out);

    sym!("bread_memory_init", ops::bread_memory_init);
    sym!("bread_string_intern_init", ops::bread_string_intern_init);
    sym!("bread_builtin_init", ops::bread_builtin_init);
    sym!("bread_error_init", ops::bread_error_init);
    sym!("bread_runtime_cleanup", ops::bread_runtime_cleanup);
}

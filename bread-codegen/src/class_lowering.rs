//! Class and method lowering plus the runtime-init pass.
//!
//! Two jobs live here: declaring a `FuncId` (with the method ABI — an output
//! slot, `self`, then the declared parameters, all as plain `I64` value
//! registers per `DESIGN.md`'s return-by-pointer deviation) for every
//! top-level function and every class method/constructor before any body is
//! lowered, and synthesizing `runtime_init_classes` — the one function that
//! registers every class with the runtime and installs its compiled method
//! pointers via `declare_func_in_func`/`func_addr`, valid because
//! `JITModule::finalize_definitions` resolves every function's code address
//! together before any of them run.

use cranelift_codegen::ir::{types, AbiParam, InstBuilder, Signature};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_module::{FuncId, Linkage, Module};
use hashbrown::HashMap;

use bread_ast::{ClassDecl, FuncDecl, Program, StmtKind};

use crate::bridge::{ptr_ty, sig0, RuntimeImports};
use crate::cg_types::{CgClass, CgFunction};
use crate::error::{CodegenInternalError, CompileError};

/// Declares a signature for a plain function or method/constructor: an
/// output-slot pointer, then (for methods) `self`, then one `I64` per
/// declared parameter.
pub fn func_signature<M: Module>(module: &M, has_self: bool, param_count: usize) -> Signature {
    let mut sig = sig0(module);
    sig.params.push(AbiParam::new(ptr_ty(module)));
    if has_self {
        sig.params.push(AbiParam::new(types::I64));
    }
    for _ in 0..param_count {
        sig.params.push(AbiParam::new(types::I64));
    }
    sig
}

pub struct DeclaredProgram {
    pub funcs: HashMap<String, CgFunction>,
    pub classes: HashMap<String, CgClass>,
}

/// First pass over a program: every top-level function
/// and every class's methods/constructor get a declared `FuncId` before any
/// body is lowered, so forward references and method dispatch tables resolve
/// regardless of declaration order. Functions and classes must appear at the
/// top level of the program; a nested `FuncDecl`/`ClassDecl` inside a block
/// is not collected here (see `lowering::stmt`'s no-op handling of those).
pub fn declare_program_symbols<M: Module>(module: &mut M, program: &Program) -> Result<DeclaredProgram, CompileError> {
    let mut funcs = HashMap::new();
    let mut classes = HashMap::new();

    for stmt in &program.statements {
        match &stmt.kind {
            StmtKind::FuncDecl(f) => {
                declare_plain_function(module, f, &mut funcs)?;
            }
            StmtKind::ClassDecl(c) => {
                declare_class(module, c, &mut classes)?;
            }
            _ => {}
        }
    }

    Ok(DeclaredProgram { funcs, classes })
}

fn declare_plain_function<M: Module>(module: &mut M, f: &FuncDecl, funcs: &mut HashMap<String, CgFunction>) -> Result<(), CompileError> {
    let sig = func_signature(module, false, f.params.len());
    let func_id = module
        .declare_function(&f.name, Linkage::Local, &sig)
        .map_err(|e| CompileError::Internal(CodegenInternalError::Module(e)))?;
    funcs.insert(
        f.name.clone(),
        CgFunction { name: f.name.clone(), func_id, decl: f.clone(), owner_class: None, is_constructor: false },
    );
    Ok(())
}

fn declare_class<M: Module>(module: &mut M, c: &ClassDecl, classes: &mut HashMap<String, CgClass>) -> Result<(), CompileError> {
    let mut method_func_ids = Vec::with_capacity(c.methods.len());
    let mut method_names = Vec::with_capacity(c.methods.len());
    for m in &c.methods {
        let sig = func_signature(module, true, m.params.len());
        let linkage_name = format!("{}__{}", c.name, m.name);
        let func_id = module
            .declare_function(&linkage_name, Linkage::Local, &sig)
            .map_err(|e| CompileError::Internal(CodegenInternalError::Module(e)))?;
        method_func_ids.push(func_id);
        method_names.push(m.name.clone());
    }

    let (constructor_func_id, constructor_params) = match &c.constructor {
        Some(ctor) => {
            let sig = func_signature(module, true, ctor.params.len());
            let linkage_name = format!("{}__init", c.name);
            let func_id = module
                .declare_function(&linkage_name, Linkage::Local, &sig)
                .map_err(|e| CompileError::Internal(CodegenInternalError::Module(e)))?;
            (Some(func_id), Some(ctor.params.clone()))
        }
        None => (None, None),
    };

    classes.insert(
        c.name.clone(),
        CgClass {
            name: c.name.clone(),
            parent: c.parent.clone(),
            field_names: c.fields.iter().map(|f| f.name.clone()).collect(),
            method_names,
            method_func_ids,
            constructor_func_id,
            constructor_params,
        },
    );
    Ok(())
}

/// Materializes an array of `(ptr, len)` string pairs into two contiguous
/// stack-slot arrays, as the `bread_class_create_definition` field/method
/// name tables require.
fn materialize_str_arrays<M: Module>(
    builder: &mut FunctionBuilder,
    module: &mut M,
    strings: &mut crate::lowering::StringLiteralTable,
    names: &[String],
) -> Result<(cranelift_codegen::ir::Value, cranelift_codegen::ir::Value, cranelift_codegen::ir::Value), CompileError> {
    let count = names.len().max(1);
    let ptrs_slot = builder.create_sized_stack_slot(cranelift_codegen::ir::StackSlotData::new(
        cranelift_codegen::ir::StackSlotKind::ExplicitSlot,
        (count * 8) as u32,
        3,
    ));
    let lens_slot = builder.create_sized_stack_slot(cranelift_codegen::ir::StackSlotData::new(
        cranelift_codegen::ir::StackSlotKind::ExplicitSlot,
        (count * 8) as u32,
        3,
    ));
    for (i, name) in names.iter().enumerate() {
        let id = strings.data_id(module, name)?;
        let gv = module.declare_data_in_func(id, builder.func);
        let addr = builder.ins().global_value(types::I64, gv);
        let len = builder.ins().iconst(types::I64, name.len() as i64);
        builder.ins().stack_store(addr, ptrs_slot, (i * 8) as i32);
        builder.ins().stack_store(len, lens_slot, (i * 8) as i32);
    }
    let ptrs_addr = builder.ins().stack_addr(types::I64, ptrs_slot, 0);
    let lens_addr = builder.ins().stack_addr(types::I64, lens_slot, 0);
    let count_val = builder.ins().iconst(types::I64, names.len() as i64);
    Ok((ptrs_addr, lens_addr, count_val))
}

/// Builds the `runtime_init_classes` function body: creates and registers
/// every declared class, resolves inheritance once all of them exist, then
/// installs each method/constructor's code address.
#[allow(clippy::too_many_arguments)]
pub fn build_runtime_init_classes<M: Module>(
    module: &mut M,
    fb_ctx: &mut FunctionBuilderContext,
    imports: &RuntimeImports,
    strings: &mut crate::lowering::StringLiteralTable,
    classes: &HashMap<String, CgClass>,
    ctx_addr: i64,
    collect_clif: bool,
    clif_out: &mut Vec<(String, String)>,
) -> Result<FuncId, CompileError> {
    let sig = sig0(module);
    let func_id = module
        .declare_function("runtime_init_classes", Linkage::Local, &sig)
        .map_err(|e| CompileError::Internal(CodegenInternalError::Module(e)))?;

    let mut ctx_fn = cranelift_codegen::ir::Function::with_name_signature(
        cranelift_codegen::ir::UserFuncName::user(0, func_id.as_u32()),
        sig,
    );
    {
        let mut builder = FunctionBuilder::new(&mut ctx_fn, fb_ctx);
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        builder.seal_block(entry);

        let ctx_ptr = builder.ins().iconst(types::I64, ctx_addr);

        // Pass 1: create + register every class definition.
        let mut handles = HashMap::new();
        for (name, class) in classes.iter() {
            let (name_ptr, name_len) = string_literal_in(&mut builder, module, strings, name)?;
            let (parent_ptr, parent_len, has_parent) = match &class.parent {
                Some(p) => {
                    let (pp, pl) = string_literal_in(&mut builder, module, strings, p)?;
                    (pp, pl, builder.ins().iconst(types::I32, 1))
                }
                None => {
                    let zero = builder.ins().iconst(types::I64, 0);
                    (zero, zero, builder.ins().iconst(types::I32, 0))
                }
            };
            let (field_ptrs, field_lens, field_count) = materialize_str_arrays(&mut builder, module, strings, &class.field_names)?;
            let (method_ptrs, method_lens, method_count) = materialize_str_arrays(&mut builder, module, strings, &class.method_names)?;

            let create_fn = module.declare_func_in_func(imports.class_create_definition, builder.func);
            let call = builder.ins().call(
                create_fn,
                &[
                    ctx_ptr,
                    name_ptr,
                    name_len,
                    parent_ptr,
                    parent_len,
                    has_parent,
                    field_ptrs,
                    field_lens,
                    field_count,
                    method_ptrs,
                    method_lens,
                    method_count,
                ],
            );
            let handle = builder.inst_results(call)[0];
            handles.insert(name.clone(), handle);

            let register_fn = module.declare_func_in_func(imports.class_register_definition, builder.func);
            builder.ins().call(register_fn, &[ctx_ptr, handle]);
        }

        // Pass 2: resolve inheritance once every class exists.
        let resolve_fn = module.declare_func_in_func(imports.class_resolve_inheritance, builder.func);
        builder.ins().call(resolve_fn, &[ctx_ptr]);

        // Pass 3: install every method/constructor's code address. Valid
        // only because `JITModule::finalize_definitions` assigns every
        // function's address before `main` (or this function) ever runs.
        for (name, class) in classes.iter() {
            let (class_name_ptr, class_name_len) = string_literal_in(&mut builder, module, strings, name)?;
            for (method_name, method_func_id) in class.method_names.iter().zip(class.method_func_ids.iter()) {
                let (m_ptr, m_len) = string_literal_in(&mut builder, module, strings, method_name)?;
                let fref = module.declare_func_in_func(*method_func_id, builder.func);
                let fn_addr = builder.ins().func_addr(types::I64, fref);
                let set_fn = module.declare_func_in_func(imports.class_set_compiled_method_by_name, builder.func);
                builder.ins().call(set_fn, &[ctx_ptr, class_name_ptr, class_name_len, m_ptr, m_len, fn_addr]);
            }
            if let Some(ctor_id) = class.constructor_func_id {
                let fref = module.declare_func_in_func(ctor_id, builder.func);
                let fn_addr = builder.ins().func_addr(types::I64, fref);
                let set_fn = module.declare_func_in_func(imports.class_set_compiled_constructor, builder.func);
                builder.ins().call(set_fn, &[ctx_ptr, class_name_ptr, class_name_len, fn_addr]);
            }
        }

        builder.ins().return_(&[]);
        builder.finalize();
    }

    if collect_clif {
        clif_out.push(("runtime_init_classes".to_string(), ctx_fn.display().to_string()));
    }

    let mut ctx_obj = cranelift_codegen::Context::for_function(ctx_fn);
    module
        .define_function(func_id, &mut ctx_obj)
        .map_err(|e| CompileError::Internal(CodegenInternalError::Module(e)))?;

    Ok(func_id)
}

fn string_literal_in<M: Module>(
    builder: &mut FunctionBuilder,
    module: &mut M,
    strings: &mut crate::lowering::StringLiteralTable,
    text: &str,
) -> Result<(cranelift_codegen::ir::Value, cranelift_codegen::ir::Value), CompileError> {
    let id = strings.data_id(module, text)?;
    let gv = module.declare_data_in_func(id, builder.func);
    let addr = builder.ins().global_value(types::I64, gv);
    let len = builder.ins().iconst(types::I64, text.len() as i64);
    Ok((addr, len))
}

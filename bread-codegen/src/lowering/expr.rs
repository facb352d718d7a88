//! Expression lowering. Every expression lowers to one boxed
//! `BreadValue` word (an `I64` Cranelift `Value`); arithmetic between two
//! operands whose type-stability analysis result is at least `Conditional`
//! and whose static type is `Int`/`Double` takes an unboxed fast path
//! internally (native register arithmetic, boxed only at the result) rather
//! than round-tripping through `bread_binary_op` — the "unboxed fast path"
//! describes, applied transiently rather than by keeping local
//! variables unboxed at rest (see `DESIGN.md`).

use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::{types, InstBuilder, Value as IrValue};
use cranelift_module::Module;

use bread_ast::{BinOp, Expr, ExprKind, Literal, TypeDescriptor, UnOp};

use crate::analysis::stability::Stability;
use crate::error::CompileError;
use crate::value_discipline;

use super::LowerCtx;

pub fn lower_expr<M: Module>(ctx: &mut LowerCtx<M>, e: &Expr) -> Result<IrValue, CompileError> {
    match &e.kind {
        ExprKind::Literal(lit) => lower_literal(ctx, lit),
        ExprKind::Ident(name) => lower_ident(ctx, name),
        ExprKind::SelfExpr => ctx.self_value.ok_or(CompileError::SelfOutsideMethod),
        ExprKind::Super => ctx.self_value.ok_or(CompileError::SuperWithoutParent),
        ExprKind::Unary { op, operand } => lower_unary(ctx, *op, operand),
        ExprKind::Binary { op, lhs, rhs } => lower_binary(ctx, *op, lhs, rhs),
        ExprKind::Index { target, index } => {
            let t = lower_expr(ctx, target)?;
            let i = lower_expr(ctx, index)?;
            let ctx_ptr = ctx.ctx_ptr();
            Ok(ctx.call_status(ctx.imports.index_op, &[ctx_ptr, t, i]))
        }
        ExprKind::Member { target, name, is_optional } => {
            let t = lower_expr(ctx, target)?;
            lower_member_read(ctx, t, name, *is_optional)
        }
        ExprKind::MethodCall { target, name, args, is_optional } => lower_method_call(ctx, target, name, args, *is_optional),
        ExprKind::Call { callee, args } => lower_call(ctx, callee, args),
        ExprKind::ArrayLit(items) => lower_array_lit(ctx, items),
        ExprKind::DictLit(pairs) => lower_dict_lit(ctx, pairs),
        ExprKind::StructLit { type_name, fields } => lower_struct_lit(ctx, type_name, fields),
        ExprKind::ClassLit { type_name, fields } => lower_class_lit(ctx, type_name, fields),
    }
}

fn lower_literal<M: Module>(ctx: &mut LowerCtx<M>, lit: &Literal) -> Result<IrValue, CompileError> {
    Ok(match lit {
        Literal::Nil => ctx.builder.ins().iconst(types::I64, 3),
        Literal::Bool(b) => ctx.builder.ins().iconst(types::I64, if *b { 10 } else { 2 }),
        Literal::Int(i) => {
            let i32v = *i as i32 as i64;
            ctx.builder.ins().iconst(types::I64, (i32v << 3) | 1)
        }
        Literal::Double(d) => {
            let v = ctx.builder.ins().f64const(*d);
            let f = ctx.func_ref(ctx.imports.box_double);
            value_discipline::box_double(ctx.builder, f, v)
        }
        Literal::String(s) => {
            let (ptr, len) = ctx.string_literal(s)?;
            let slot = value_discipline::alloc_value_slot(ctx.builder);
            let set_nil = ctx.func_ref(ctx.imports.value_set_nil);
            value_discipline::init_nil(ctx.builder, set_nil, slot);
            let addr = value_discipline::slot_addr(ctx.builder, slot);
            let ctx_ptr = ctx.ctx_ptr();
            let fref = ctx.func_ref(ctx.imports.value_set_string);
            ctx.builder.ins().call(fref, &[ctx_ptr, addr, ptr, len]);
            value_discipline::load_boxed(ctx.builder, slot)
        }
    })
}

fn lower_ident<M: Module>(ctx: &mut LowerCtx<M>, name: &str) -> Result<IrValue, CompileError> {
    if let Some(var) = ctx.scope.find(name) {
        return Ok(value_discipline::load_boxed(ctx.builder, var.storage_slot));
    }
    if let Some(self_value) = ctx.self_value {
        return lower_member_read(ctx, self_value, name, false);
    }
    // §4.E's final fallback: not a compile-time local, not a class field —
    // ask the runtime scope stack by name. Covers variables only the
    // runtime side knows about (e.g. reflective `var_decl`/`var_load` use
    // outside this compiler's own lowering) rather than failing the compile.
    let (ptr, len) = ctx.string_literal(name)?;
    let ctx_ptr = ctx.ctx_ptr();
    Ok(ctx.call_status(ctx.imports.var_load, &[ctx_ptr, ptr, len]))
}

fn lower_member_read<M: Module>(ctx: &mut LowerCtx<M>, target: IrValue, name: &str, is_optional: bool) -> Result<IrValue, CompileError> {
    let (ptr, len) = ctx.string_literal(name)?;
    let ctx_ptr = ctx.ctx_ptr();
    let opt = ctx.builder.ins().iconst(types::I32, is_optional as i64);
    Ok(ctx.call_status(ctx.imports.member_op, &[ctx_ptr, target, ptr, len, opt]))
}

fn lower_unary<M: Module>(ctx: &mut LowerCtx<M>, op: UnOp, operand: &Expr) -> Result<IrValue, CompileError> {
    let v = lower_expr(ctx, operand)?;
    let ctx_ptr = ctx.ctx_ptr();
    Ok(match op {
        UnOp::Not => ctx.call_status(ctx.imports.unary_not, &[ctx_ptr, v]),
        UnOp::Neg => ctx.call_status(ctx.imports.unary_neg, &[ctx_ptr, v]),
    })
}

fn lower_binary<M: Module>(ctx: &mut LowerCtx<M>, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<IrValue, CompileError> {
    if matches!(op, BinOp::And | BinOp::Or) {
        return lower_short_circuit(ctx, op, lhs, rhs);
    }

    let l = lower_expr(ctx, lhs)?;
    let r = lower_expr(ctx, rhs)?;

    if let Some(fast) = try_unboxed_fast_path(ctx, lhs.id, rhs.id, op, l, r) {
        return Ok(fast);
    }

    let tag = ctx.builder.ins().iconst(types::I8, op.runtime_tag() as i64);
    let ctx_ptr = ctx.ctx_ptr();
    Ok(ctx.call_status(ctx.imports.binary_op, &[ctx_ptr, tag, l, r]))
}

/// Native-register arithmetic for `+`/`-`/`*`, and native compares for every
/// comparison operator — "comparison operators always yield an unboxed bool
/// in the fast path" — when both operands are at least `Conditional`-stable
/// and share a primitive numeric type. Everything else — division, modulo
/// (runtime owns the by-zero error), string concatenation, or any operand
/// whose stability analysis left it `Unstable`/`Unknown` — falls back to
/// `bread_binary_op`.
fn try_unboxed_fast_path<M: Module>(
    ctx: &mut LowerCtx<M>,
    lhs_id: bread_ast::NodeId,
    rhs_id: bread_ast::NodeId,
    op: BinOp,
    l: IrValue,
    r: IrValue,
) -> Option<IrValue> {
    let int_cc = int_compare_cc(op);
    let float_cc = float_compare_cc(op);
    if !matches!(op, BinOp::Add | BinOp::Sub | BinOp::Mul) && int_cc.is_none() {
        return None;
    }
    let l_info = ctx.analysis.stability.get(&lhs_id)?;
    let r_info = ctx.analysis.stability.get(&rhs_id)?;
    if l_info.stability < Stability::Conditional || r_info.stability < Stability::Conditional {
        return None;
    }
    match (&l_info.ty, &r_info.ty) {
        (TypeDescriptor::Int, TypeDescriptor::Int) => {
            let unbox_int = ctx.func_ref(ctx.imports.unbox_int);
            let li = value_discipline::unbox_int(ctx.builder, unbox_int, l);
            let unbox_int2 = ctx.func_ref(ctx.imports.unbox_int);
            let ri = value_discipline::unbox_int(ctx.builder, unbox_int2, r);
            if let Some(cc) = int_cc {
                let cmp = ctx.builder.ins().icmp(cc, li, ri);
                let widened = ctx.builder.ins().uextend(types::I32, cmp);
                let box_bool = ctx.func_ref(ctx.imports.box_bool);
                return Some(value_discipline::box_bool(ctx.builder, box_bool, widened));
            }
            let result = match op {
                BinOp::Add => ctx.builder.ins().iadd(li, ri),
                BinOp::Sub => ctx.builder.ins().isub(li, ri),
                BinOp::Mul => ctx.builder.ins().imul(li, ri),
                _ => unreachable!(),
            };
            let box_int = ctx.func_ref(ctx.imports.box_int);
            Some(value_discipline::box_int(ctx.builder, box_int, result))
        }
        (TypeDescriptor::Double, TypeDescriptor::Double) => {
            let unbox_d = ctx.func_ref(ctx.imports.unbox_double);
            let ld = value_discipline::unbox_double(ctx.builder, unbox_d, l);
            let unbox_d2 = ctx.func_ref(ctx.imports.unbox_double);
            let rd = value_discipline::unbox_double(ctx.builder, unbox_d2, r);
            if let Some(cc) = float_cc {
                let cmp = ctx.builder.ins().fcmp(cc, ld, rd);
                let widened = ctx.builder.ins().uextend(types::I32, cmp);
                let box_bool = ctx.func_ref(ctx.imports.box_bool);
                return Some(value_discipline::box_bool(ctx.builder, box_bool, widened));
            }
            let result = match op {
                BinOp::Add => ctx.builder.ins().fadd(ld, rd),
                BinOp::Sub => ctx.builder.ins().fsub(ld, rd),
                BinOp::Mul => ctx.builder.ins().fmul(ld, rd),
                _ => unreachable!(),
            };
            let box_d = ctx.func_ref(ctx.imports.box_double);
            Some(value_discipline::box_double(ctx.builder, box_d, result))
        }
        _ => None,
    }
}

fn int_compare_cc(op: BinOp) -> Option<IntCC> {
    Some(match op {
        BinOp::Eq => IntCC::Equal,
        BinOp::Ne => IntCC::NotEqual,
        BinOp::Lt => IntCC::SignedLessThan,
        BinOp::Le => IntCC::SignedLessThanOrEqual,
        BinOp::Gt => IntCC::SignedGreaterThan,
        BinOp::Ge => IntCC::SignedGreaterThanOrEqual,
        _ => return None,
    })
}

fn float_compare_cc(op: BinOp) -> Option<FloatCC> {
    Some(match op {
        BinOp::Eq => FloatCC::Equal,
        BinOp::Ne => FloatCC::NotEqual,
        BinOp::Lt => FloatCC::LessThan,
        BinOp::Le => FloatCC::LessThanOrEqual,
        BinOp::Gt => FloatCC::GreaterThan,
        BinOp::Ge => FloatCC::GreaterThanOrEqual,
        _ => return None,
    })
}

fn lower_short_circuit<M: Module>(ctx: &mut LowerCtx<M>, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<IrValue, CompileError> {
    let l = lower_expr(ctx, lhs)?;
    let truthy_fn = ctx.func_ref(ctx.imports.is_truthy);
    let l_truthy = value_discipline::is_truthy(ctx.builder, truthy_fn, l);

    let rhs_block = ctx.builder.create_block();
    let join_block = ctx.builder.create_block();
    ctx.builder.append_block_param(join_block, types::I64);

    match op {
        BinOp::And => {
            ctx.builder.ins().brif(l_truthy, rhs_block, &[], join_block, &[l]);
        }
        BinOp::Or => {
            ctx.builder.ins().brif(l_truthy, join_block, &[l], rhs_block, &[]);
        }
        _ => unreachable!(),
    }
    ctx.builder.seal_block(rhs_block);
    ctx.builder.switch_to_block(rhs_block);
    let r = lower_expr(ctx, rhs)?;
    ctx.builder.ins().jump(join_block, &[r]);

    ctx.builder.seal_block(join_block);
    ctx.builder.switch_to_block(join_block);
    Ok(ctx.builder.block_params(join_block)[0])
}

/// Materializes a boxed-argument array into a temporary stack slot, returning
/// its address and `argc` as IR values, for the arity-erased `bread_*` entry
/// points that take `(args_ptr, argc)`.
fn materialize_args<M: Module>(ctx: &mut LowerCtx<M>, values: &[IrValue]) -> (IrValue, IrValue) {
    let size = (values.len().max(1) * 8) as u32;
    let slot = ctx.builder.create_sized_stack_slot(cranelift_codegen::ir::StackSlotData::new(
        cranelift_codegen::ir::StackSlotKind::ExplicitSlot,
        size,
        3,
    ));
    for (i, v) in values.iter().enumerate() {
        ctx.builder.ins().stack_store(*v, slot, (i * 8) as i32);
    }
    let addr = ctx.builder.ins().stack_addr(types::I64, slot, 0);
    let argc = ctx.builder.ins().iconst(types::I64, values.len() as i64);
    (addr, argc)
}

fn lower_method_call<M: Module>(
    ctx: &mut LowerCtx<M>,
    target: &Expr,
    name: &str,
    args: &[Expr],
    is_optional: bool,
) -> Result<IrValue, CompileError> {
    let arg_vals = args.iter().map(|a| lower_expr(ctx, a)).collect::<Result<Vec<_>, _>>()?;

    if matches!(target.kind, ExprKind::Super) {
        let self_value = ctx.self_value.ok_or(CompileError::SelfOutsideMethod)?;
        let func_id = ctx.super_method_func_id(name)?;
        return Ok(call_compiled(ctx, func_id, Some(self_value), &arg_vals));
    }

    // Direct-call optimization: a target variable declared with a known
    // `Class(name)` type resolves its method statically, skipping runtime
    // dispatch entirely.
    if let ExprKind::Ident(var_name) = &target.kind {
        if let Some(class_name) = ctx.scope.find(var_name).and_then(|v| match &v.declared_type {
            TypeDescriptor::Class(c) => Some(c.clone()),
            _ => None,
        }) {
            if let Some(func_id) = ctx.resolve_method_func_id(&class_name, name) {
                let target_val = lower_expr(ctx, target)?;
                return Ok(call_compiled(ctx, func_id, Some(target_val), &arg_vals));
            }
        }
    }

    let target_val = lower_expr(ctx, target)?;
    let (ptr, len) = ctx.string_literal(name)?;
    let (args_addr, argc) = materialize_args(ctx, &arg_vals);
    let opt = ctx.builder.ins().iconst(types::I32, is_optional as i64);
    let ctx_ptr = ctx.ctx_ptr();
    Ok(ctx.call_status(ctx.imports.method_call_op, &[ctx_ptr, target_val, ptr, len, args_addr, argc, opt]))
}

/// Calls an already-compiled function/method/constructor directly:
/// allocates a temporary output slot, passes `self` by value (when present)
/// ahead of the remaining arguments, then loads the result back out.
pub fn call_compiled<M: Module>(ctx: &mut LowerCtx<M>, func_id: cranelift_module::FuncId, self_arg: Option<IrValue>, args: &[IrValue]) -> IrValue {
    let slot = value_discipline::alloc_value_slot(ctx.builder);
    let set_nil = ctx.func_ref(ctx.imports.value_set_nil);
    value_discipline::init_nil(ctx.builder, set_nil, slot);
    let addr = value_discipline::slot_addr(ctx.builder, slot);
    let fref = ctx.func_ref(func_id);

    let mut call_args = vec![addr];
    if let Some(sv) = self_arg {
        call_args.push(sv);
    }
    call_args.extend_from_slice(args);
    ctx.builder.ins().call(fref, &call_args);
    value_discipline::load_boxed(ctx.builder, slot)
}

fn lower_call<M: Module>(ctx: &mut LowerCtx<M>, callee: &str, args: &[Expr]) -> Result<IrValue, CompileError> {
    if callee == "range" {
        return lower_range_call(ctx, args);
    }

    if let Some(class) = ctx.classes.get(callee).cloned() {
        // Mirrors the plain-function call path below: "defaults filled for
        // missing arguments" applies to a constructor call exactly like any
        // other, since `bread_class_create_instance` runs the compiled
        // constructor with whatever `argc`/`args` it is handed rather than
        // filling in anything itself.
        let required = class.required_param_count();
        if args.len() < required {
            return Err(CompileError::Arity { name: callee.to_string(), expected: required, actual: args.len() });
        }
        let arg_vals = match &class.constructor_params {
            Some(params) => {
                let mut vals = Vec::with_capacity(params.len());
                for (i, p) in params.iter().enumerate() {
                    if i < args.len() {
                        vals.push(lower_expr(ctx, &args[i])?);
                    } else {
                        let default = p.default.as_ref().expect("missing default for optional constructor parameter");
                        vals.push(lower_expr(ctx, default)?);
                    }
                }
                vals
            }
            None => args.iter().map(|a| lower_expr(ctx, a)).collect::<Result<Vec<_>, _>>()?,
        };
        let (ptr, len) = ctx.string_literal(&class.name)?;
        let (args_addr, argc) = materialize_args(ctx, &arg_vals);
        let ctx_ptr = ctx.ctx_ptr();
        return Ok(ctx.call_status(ctx.imports.class_create_instance, &[ctx_ptr, ptr, len, args_addr, argc]));
    }

    if let Some(func) = ctx.funcs.get(callee).cloned() {
        if !func.has_self() {
            let required = func.required_param_count();
            if args.len() < required {
                return Err(CompileError::Arity { name: callee.to_string(), expected: required, actual: args.len() });
            }
            let mut arg_vals = Vec::with_capacity(func.decl.params.len());
            for (i, p) in func.decl.params.iter().enumerate() {
                if i < args.len() {
                    arg_vals.push(lower_expr(ctx, &args[i])?);
                } else {
                    let default = p.default.as_ref().expect("missing default for optional parameter");
                    arg_vals.push(lower_expr(ctx, default)?);
                }
            }
            return Ok(call_compiled(ctx, func.func_id, None, &arg_vals));
        }
    }

    let arg_vals = args.iter().map(|a| lower_expr(ctx, a)).collect::<Result<Vec<_>, _>>()?;
    let (ptr, len) = ctx.string_literal(callee)?;
    let (args_addr, argc) = materialize_args(ctx, &arg_vals);
    let ctx_ptr = ctx.ctx_ptr();
    Ok(ctx.call_status(ctx.imports.builtin_call_out, &[ctx_ptr, ptr, len, args_addr, argc]))
}

fn lower_range_call<M: Module>(ctx: &mut LowerCtx<M>, args: &[Expr]) -> Result<IrValue, CompileError> {
    match args.len() {
        1 => {
            let end = lower_range_bound(ctx, &args[0])?;
            let f = ctx.func_ref(ctx.imports.range_simple);
            let call = ctx.builder.ins().call(f, &[end]);
            Ok(ctx.builder.inst_results(call)[0])
        }
        2 => {
            let start = lower_range_bound(ctx, &args[0])?;
            let end = lower_range_bound(ctx, &args[1])?;
            let step = ctx.builder.ins().iconst(types::I32, 1);
            let f = ctx.func_ref(ctx.imports.range_create);
            let call = ctx.builder.ins().call(f, &[start, end, step]);
            Ok(ctx.builder.inst_results(call)[0])
        }
        3 => {
            let start = lower_range_bound(ctx, &args[0])?;
            let end = lower_range_bound(ctx, &args[1])?;
            let step = lower_range_bound(ctx, &args[2])?;
            let f = ctx.func_ref(ctx.imports.range_create);
            let call = ctx.builder.ins().call(f, &[start, end, step]);
            Ok(ctx.builder.inst_results(call)[0])
        }
        n => Err(CompileError::Arity { name: "range".into(), expected: 1, actual: n }),
    }
}

/// `range`'s bounds must be integer literals; evaluates the
/// literal directly to a native `i32` rather than a boxed value.
fn lower_range_bound<M: Module>(ctx: &mut LowerCtx<M>, e: &Expr) -> Result<IrValue, CompileError> {
    match &e.kind {
        ExprKind::Literal(Literal::Int(i)) => Ok(ctx.builder.ins().iconst(types::I32, *i as i32 as i64)),
        _ => Err(CompileError::NonLiteralRangeBound),
    }
}

fn lower_array_lit<M: Module>(ctx: &mut LowerCtx<M>, items: &[Expr]) -> Result<IrValue, CompileError> {
    let f = ctx.func_ref(ctx.imports.array_new);
    let call = ctx.builder.ins().call(f, &[]);
    let arr = ctx.builder.inst_results(call)[0];
    let retain_fn = ctx.func_ref(ctx.imports.retain_value);
    let append_fn = ctx.func_ref(ctx.imports.array_append_value);
    for item in items {
        let v = lower_expr(ctx, item)?;
        let retained = value_discipline::retain(ctx.builder, retain_fn, v);
        ctx.builder.ins().call(append_fn, &[arr, retained]);
    }
    Ok(arr)
}

fn lower_dict_lit<M: Module>(ctx: &mut LowerCtx<M>, pairs: &[(Expr, Expr)]) -> Result<IrValue, CompileError> {
    let f = ctx.func_ref(ctx.imports.dict_new);
    let call = ctx.builder.ins().call(f, &[]);
    let dict = ctx.builder.inst_results(call)[0];
    let retain_fn = ctx.func_ref(ctx.imports.retain_value);
    for (k, v) in pairs {
        let kv = lower_expr(ctx, k)?;
        let vv = lower_expr(ctx, v)?;
        let kv_retained = value_discipline::retain(ctx.builder, retain_fn, kv);
        let vv_retained = value_discipline::retain(ctx.builder, retain_fn, vv);
        let ctx_ptr = ctx.ctx_ptr();
        ctx.call_checked(ctx.imports.dict_set_value, &[ctx_ptr, dict, kv_retained, vv_retained]);
    }
    Ok(dict)
}

/// Materializes two parallel arrays — `char*[]`/`size_t[]` — of a list of
/// field names' interned-literal addresses and lengths, for the `bread_*`
/// entry points that take a `(names_ptr, lens_ptr, count)` triple.
fn materialize_name_arrays<M: Module>(ctx: &mut LowerCtx<M>, names: &[String]) -> Result<(IrValue, IrValue, IrValue), CompileError> {
    let slot_size = (names.len().max(1) * 8) as u32;
    let ptrs_slot = ctx.builder.create_sized_stack_slot(cranelift_codegen::ir::StackSlotData::new(
        cranelift_codegen::ir::StackSlotKind::ExplicitSlot,
        slot_size,
        3,
    ));
    let lens_slot = ctx.builder.create_sized_stack_slot(cranelift_codegen::ir::StackSlotData::new(
        cranelift_codegen::ir::StackSlotKind::ExplicitSlot,
        slot_size,
        3,
    ));
    for (i, name) in names.iter().enumerate() {
        let (ptr, len) = ctx.string_literal(name)?;
        ctx.builder.ins().stack_store(ptr, ptrs_slot, (i * 8) as i32);
        ctx.builder.ins().stack_store(len, lens_slot, (i * 8) as i32);
    }
    let ptrs_addr = ctx.builder.ins().stack_addr(types::I64, ptrs_slot, 0);
    let lens_addr = ctx.builder.ins().stack_addr(types::I64, lens_slot, 0);
    let count = ctx.builder.ins().iconst(types::I64, names.len() as i64);
    Ok((ptrs_addr, lens_addr, count))
}

/// Writes each literal field's value into the just-constructed struct/class
/// object via `bread_member_set_op`, retaining first since the object is
/// about to own a reference to it.
fn fill_literal_fields<M: Module>(ctx: &mut LowerCtx<M>, target: IrValue, fields: &[(String, Expr)]) -> Result<(), CompileError> {
    let retain_fn = ctx.func_ref(ctx.imports.retain_value);
    for (name, value_expr) in fields {
        let v = lower_expr(ctx, value_expr)?;
        let retained = value_discipline::retain(ctx.builder, retain_fn, v);
        let (name_ptr, name_len) = ctx.string_literal(name)?;
        let ctx_ptr = ctx.ctx_ptr();
        ctx.call_checked(ctx.imports.member_set_op, &[ctx_ptr, target, name_ptr, name_len, retained]);
    }
    Ok(())
}

/// **Struct literal**: builds a fresh `BreadStruct` from the field-name
/// array, then writes each field's value.
fn lower_struct_lit<M: Module>(ctx: &mut LowerCtx<M>, type_name: &str, fields: &[(String, Expr)]) -> Result<IrValue, CompileError> {
    let (name_ptr, name_len) = ctx.string_literal(type_name)?;
    let field_names: Vec<String> = fields.iter().map(|(n, _)| n.clone()).collect();
    let (names_addr, lens_addr, count) = materialize_name_arrays(ctx, &field_names)?;
    let f = ctx.func_ref(ctx.imports.struct_new);
    let call = ctx.builder.ins().call(f, &[name_ptr, name_len, names_addr, lens_addr, count]);
    let s = ctx.builder.inst_results(call)[0];
    fill_literal_fields(ctx, s, fields)?;
    Ok(s)
}

/// **Class literal**: builds a nil-fielded instance of a previously declared
/// class — without running its compiled constructor — then writes each
/// field's value, same as a struct literal.
fn lower_class_lit<M: Module>(ctx: &mut LowerCtx<M>, type_name: &str, fields: &[(String, Expr)]) -> Result<IrValue, CompileError> {
    let (name_ptr, name_len) = ctx.string_literal(type_name)?;
    let ctx_ptr = ctx.ctx_ptr();
    let inst = ctx.call_status(ctx.imports.class_literal_new, &[ctx_ptr, name_ptr, name_len]);
    fill_literal_fields(ctx, inst, fields)?;
    Ok(inst)
}

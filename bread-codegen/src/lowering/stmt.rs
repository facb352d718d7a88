//! Statement lowering. Each function/method/constructor body
//! lowers through [`lower_block`], which tracks whether the block it just
//! finished already ends in a terminator (`return`/`break`/`continue`) so
//! callers know whether to still emit their own falling-through jump.

use cranelift_codegen::ir::{types, InstBuilder, MemFlags};
use cranelift_module::Module;

use bread_ast::{AssignOp, Expr, Stmt, StmtKind};

use crate::cg_types::Var;
use crate::error::CompileError;
use crate::value_discipline;

use super::expr::lower_expr;
use super::LowerCtx;

/// Lowers a sequence of statements into the current block, stopping early if
/// one of them terminates it. Returns whether the block is now terminated.
pub fn lower_block<M: Module>(ctx: &mut LowerCtx<M>, stmts: &[Stmt]) -> Result<bool, CompileError> {
    for s in stmts {
        if lower_stmt(ctx, s)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Lowers one statement, returning `true` if it terminated the current
/// block (a `return`, or a `break`/`continue` that jumped away).
fn lower_stmt<M: Module>(ctx: &mut LowerCtx<M>, s: &Stmt) -> Result<bool, CompileError> {
    match &s.kind {
        StmtKind::VarDecl { name, declared_type, init, is_const } => {
            let value = lower_expr(ctx, init)?;
            let slot = value_discipline::alloc_value_slot(ctx.builder);
            let set_nil = ctx.func_ref(ctx.imports.value_set_nil);
            value_discipline::init_nil(ctx.builder, set_nil, slot);
            value_discipline::init_store_boxed(ctx.builder, slot, value);
            declare_in_runtime_scope(ctx, name, value, *is_const)?;
            ctx.scope.add(Var {
                name: name.clone(),
                storage_slot: slot,
                declared_type: declared_type.clone(),
                unboxed_rep: bread_ast::UnboxedRep::from(declared_type),
                is_const: *is_const,
            });
            Ok(false)
        }

        StmtKind::Assign { name, op, value } => {
            let new_val = lower_expr(ctx, value)?;
            if let Some(var) = ctx.scope.find(name).cloned() {
                if var.is_const {
                    return Err(CompileError::AssignToConst(name.clone()));
                }
                let final_val = apply_assign_op(ctx, *op, var.storage_slot, new_val);
                let release = ctx.func_ref(ctx.imports.value_release);
                value_discipline::store_boxed(ctx.builder, release, var.storage_slot, final_val);
                return Ok(false);
            }
            if let Some(self_value) = ctx.self_value {
                let final_val = if let AssignOp::Compound(op) = op {
                    let current = lower_member_read(ctx, self_value, name)?;
                    apply_binop(ctx, *op, current, new_val)
                } else {
                    new_val
                };
                member_set(ctx, self_value, name, final_val);
                return Ok(false);
            }
            Err(CompileError::UnknownIdent(name.clone()))
        }

        StmtKind::IndexAssign { target, index, op, value } => {
            let t = lower_expr(ctx, target)?;
            let i = lower_expr(ctx, index)?;
            let new_val = lower_expr(ctx, value)?;
            let final_val = if let AssignOp::Compound(bop) = op {
                let ctx_ptr = ctx.ctx_ptr();
                let current = ctx.call_status(ctx.imports.index_op, &[ctx_ptr, t, i]);
                apply_binop(ctx, *bop, current, new_val)
            } else {
                new_val
            };
            let ctx_ptr = ctx.ctx_ptr();
            ctx.call_checked(ctx.imports.index_set_op, &[ctx_ptr, t, i, final_val]);
            Ok(false)
        }

        StmtKind::MemberAssign { target, name, op, value } => {
            let t = lower_expr(ctx, target)?;
            let new_val = lower_expr(ctx, value)?;
            let final_val = if let AssignOp::Compound(bop) = op {
                let current = lower_member_read(ctx, t, name)?;
                apply_binop(ctx, *bop, current, new_val)
            } else {
                new_val
            };
            member_set(ctx, t, name, final_val);
            Ok(false)
        }

        StmtKind::Print(e) => {
            let v = lower_expr(ctx, e)?;
            let f = ctx.func_ref(ctx.imports.print);
            ctx.builder.ins().call(f, &[v]);
            let release = ctx.func_ref(ctx.imports.value_release);
            value_discipline::release(ctx.builder, release, v);
            Ok(false)
        }

        StmtKind::ExprStmt(e) => {
            let v = lower_expr(ctx, e)?;
            let release = ctx.func_ref(ctx.imports.value_release);
            value_discipline::release(ctx.builder, release, v);
            Ok(false)
        }

        StmtKind::If { cond, then_branch, else_branch } => lower_if(ctx, cond, then_branch, else_branch),
        StmtKind::While { cond, body } => lower_while(ctx, cond, body),
        StmtKind::ForRange { var, start, end, step, body } => lower_for_range(ctx, var, *start, *end, *step, body),
        StmtKind::ForIn { var, iterable, body } => lower_for_in(ctx, var, iterable, body),

        StmtKind::Return(value) => {
            let v = match value {
                Some(e) => lower_expr(ctx, e)?,
                None => ctx.builder.ins().iconst(types::I64, 3),
            };
            let base_depth = ctx.scope.base_depth;
            ctx.pop_to_scope_depth(base_depth);
            ctx.builder.ins().store(MemFlags::new(), v, ctx.ret_ptr, 0);
            ctx.builder.ins().return_(&[]);
            Ok(true)
        }

        StmtKind::Break => {
            let (_, break_target, depth) = ctx.current_loop().expect("break outside a loop");
            ctx.pop_to_scope_depth(depth);
            ctx.builder.ins().jump(break_target, &[]);
            Ok(true)
        }

        StmtKind::Continue => {
            let (continue_target, _, depth) = ctx.current_loop().expect("continue outside a loop");
            ctx.pop_to_scope_depth(depth);
            ctx.builder.ins().jump(continue_target, &[]);
            Ok(true)
        }

        // Nested function/class declarations are hoisted into the module's
        // symbol tables and compiled as their own top-level IR functions
        // before `main`'s body is lowered (see `driver`/`class_lowering`);
        // encountering one here mid-block is a no-op.
        StmtKind::FuncDecl(_) | StmtKind::ClassDecl(_) => Ok(false),
    }
}

/// §4.B: "For each variable declaration, the core ALSO emits a runtime
/// `var_decl_if_missing(name, type, is_const, boxed_slot)` so the runtime
/// scope stack mirrors the compile-time scope" — keeps `var_load`/reflective
/// name-based lookups valid for every local, not just class fields. The
/// value already has one owner (the compile-time stack slot), so it is
/// retained before the runtime frame takes its own reference, same as every
/// other place a boxed value gains a second owner (`lower_array_lit`,
/// `fill_literal_fields`).
fn declare_in_runtime_scope<M: Module>(
    ctx: &mut LowerCtx<M>,
    name: &str,
    value: cranelift_codegen::ir::Value,
    is_const: bool,
) -> Result<(), CompileError> {
    let (name_ptr, name_len) = ctx.string_literal(name)?;
    let retain_fn = ctx.func_ref(ctx.imports.retain_value);
    let retained = value_discipline::retain(ctx.builder, retain_fn, value);
    let is_const_val = ctx.builder.ins().iconst(types::I32, is_const as i64);
    let ctx_ptr = ctx.ctx_ptr();
    let decl_fn = ctx.func_ref(ctx.imports.var_decl_if_missing);
    ctx.builder.ins().call(decl_fn, &[ctx_ptr, name_ptr, name_len, retained, is_const_val]);
    Ok(())
}

fn lower_member_read<M: Module>(ctx: &mut LowerCtx<M>, target: cranelift_codegen::ir::Value, name: &str) -> Result<cranelift_codegen::ir::Value, CompileError> {
    let (ptr, len) = ctx.string_literal(name)?;
    let ctx_ptr = ctx.ctx_ptr();
    let opt = ctx.builder.ins().iconst(types::I32, 0);
    Ok(ctx.call_status(ctx.imports.member_op, &[ctx_ptr, target, ptr, len, opt]))
}

fn member_set<M: Module>(ctx: &mut LowerCtx<M>, target: cranelift_codegen::ir::Value, name: &str, value: cranelift_codegen::ir::Value) {
    let (ptr, len) = ctx.string_literal(name).expect("member name literal");
    let ctx_ptr = ctx.ctx_ptr();
    ctx.call_checked(ctx.imports.member_set_op, &[ctx_ptr, target, ptr, len, value]);
}

fn apply_assign_op<M: Module>(
    ctx: &mut LowerCtx<M>,
    op: AssignOp,
    slot: cranelift_codegen::ir::StackSlot,
    new_val: cranelift_codegen::ir::Value,
) -> cranelift_codegen::ir::Value {
    match op {
        AssignOp::Set => new_val,
        AssignOp::Compound(bop) => {
            let current = value_discipline::load_boxed(ctx.builder, slot);
            apply_binop(ctx, bop, current, new_val)
        }
    }
}

fn apply_binop<M: Module>(
    ctx: &mut LowerCtx<M>,
    op: bread_ast::BinOp,
    l: cranelift_codegen::ir::Value,
    r: cranelift_codegen::ir::Value,
) -> cranelift_codegen::ir::Value {
    let tag = ctx.builder.ins().iconst(types::I8, op.runtime_tag() as i64);
    let ctx_ptr = ctx.ctx_ptr();
    ctx.call_status(ctx.imports.binary_op, &[ctx_ptr, tag, l, r])
}

fn lower_if<M: Module>(ctx: &mut LowerCtx<M>, cond: &Expr, then_branch: &[Stmt], else_branch: &[Stmt]) -> Result<bool, CompileError> {
    let cond_val = lower_expr(ctx, cond)?;
    let truthy_fn = ctx.func_ref(ctx.imports.is_truthy);
    let truthy = value_discipline::is_truthy(ctx.builder, truthy_fn, cond_val);

    let then_block = ctx.builder.create_block();
    let else_block = ctx.builder.create_block();
    let merge_block = ctx.builder.create_block();

    ctx.builder.ins().brif(truthy, then_block, &[], else_block, &[]);
    ctx.builder.seal_block(then_block);
    ctx.builder.seal_block(else_block);

    ctx.builder.switch_to_block(then_block);
    ctx.push_scope_level();
    let then_terminated = lower_block(ctx, then_branch)?;
    if !then_terminated {
        ctx.pop_scope_level();
        ctx.builder.ins().jump(merge_block, &[]);
    } else {
        ctx.scope.pop();
    }

    ctx.builder.switch_to_block(else_block);
    ctx.push_scope_level();
    let else_terminated = lower_block(ctx, else_branch)?;
    if !else_terminated {
        ctx.pop_scope_level();
        ctx.builder.ins().jump(merge_block, &[]);
    } else {
        ctx.scope.pop();
    }

    ctx.builder.seal_block(merge_block);
    ctx.builder.switch_to_block(merge_block);
    if then_terminated && else_terminated {
        // No predecessor ever reaches `merge_block`; give it a trap rather
        // than leaving it an unfilled block for the verifier to reject.
        ctx.builder.ins().trap(cranelift_codegen::ir::TrapCode::UnreachableCodeReached);
        return Ok(true);
    }
    Ok(false)
}

fn lower_while<M: Module>(ctx: &mut LowerCtx<M>, cond: &Expr, body: &[Stmt]) -> Result<bool, CompileError> {
    let header_block = ctx.builder.create_block();
    let body_block = ctx.builder.create_block();
    let exit_block = ctx.builder.create_block();

    ctx.builder.ins().jump(header_block, &[]);

    ctx.builder.switch_to_block(header_block);
    let cond_val = lower_expr(ctx, cond)?;
    let truthy_fn = ctx.func_ref(ctx.imports.is_truthy);
    let truthy = value_discipline::is_truthy(ctx.builder, truthy_fn, cond_val);
    ctx.builder.ins().brif(truthy, body_block, &[], exit_block, &[]);
    ctx.builder.seal_block(body_block);

    ctx.builder.switch_to_block(body_block);
    ctx.enter_loop(header_block, exit_block);
    ctx.push_scope_level();
    let terminated = lower_block(ctx, body)?;
    if !terminated {
        ctx.pop_scope_level();
        ctx.builder.ins().jump(header_block, &[]);
    } else {
        ctx.scope.pop();
    }
    ctx.exit_loop();

    ctx.builder.seal_block(header_block);
    ctx.builder.seal_block(exit_block);
    ctx.builder.switch_to_block(exit_block);
    Ok(false)
}

/// Lowers `for var in range(start, end, step) { body }`. The native counter
/// lives in a stack slot (not a block parameter), so `break`/`continue` can
/// jump to plain, argument-free block targets.
fn lower_for_range<M: Module>(ctx: &mut LowerCtx<M>, var: &str, start: i64, end: i64, step: i64, body: &[Stmt]) -> Result<bool, CompileError> {
    if step == 0 {
        return Ok(false);
    }

    let counter_slot = ctx.builder.create_sized_stack_slot(cranelift_codegen::ir::StackSlotData::new(
        cranelift_codegen::ir::StackSlotKind::ExplicitSlot,
        8,
        3,
    ));
    let start_val = ctx.builder.ins().iconst(types::I64, start);
    ctx.builder.ins().stack_store(start_val, counter_slot, 0);

    let header_block = ctx.builder.create_block();
    let body_block = ctx.builder.create_block();
    let incr_block = ctx.builder.create_block();
    let exit_block = ctx.builder.create_block();

    ctx.builder.ins().jump(header_block, &[]);

    ctx.builder.switch_to_block(header_block);
    let counter = ctx.builder.ins().stack_load(types::I64, counter_slot, 0);
    let end_val = ctx.builder.ins().iconst(types::I64, end);
    let cc = if step > 0 {
        cranelift_codegen::ir::condcodes::IntCC::SignedLessThan
    } else {
        cranelift_codegen::ir::condcodes::IntCC::SignedGreaterThan
    };
    let cond = ctx.builder.ins().icmp(cc, counter, end_val);
    ctx.builder.ins().brif(cond, body_block, &[], exit_block, &[]);
    ctx.builder.seal_block(body_block);

    ctx.builder.switch_to_block(body_block);
    let counter = ctx.builder.ins().stack_load(types::I64, counter_slot, 0);
    let boxed_counter = {
        let v32 = ctx.builder.ins().ireduce(types::I32, counter);
        let box_int = ctx.func_ref(ctx.imports.box_int);
        value_discipline::box_int(ctx.builder, box_int, v32)
    };
    let var_slot = value_discipline::alloc_value_slot(ctx.builder);
    let set_nil = ctx.func_ref(ctx.imports.value_set_nil);
    value_discipline::init_nil(ctx.builder, set_nil, var_slot);
    value_discipline::init_store_boxed(ctx.builder, var_slot, boxed_counter);
    ctx.enter_loop(incr_block, exit_block);
    ctx.push_scope_level();
    declare_in_runtime_scope(ctx, var, boxed_counter, false)?;
    ctx.scope.add(Var {
        name: var.to_string(),
        storage_slot: var_slot,
        declared_type: bread_ast::TypeDescriptor::Int,
        unboxed_rep: bread_ast::UnboxedRep::Int,
        is_const: false,
    });

    let terminated = lower_block(ctx, body)?;
    ctx.exit_loop();
    if !terminated {
        ctx.pop_scope_level();
        ctx.builder.ins().jump(incr_block, &[]);
    } else {
        ctx.scope.pop();
    }
    ctx.builder.seal_block(incr_block);

    ctx.builder.switch_to_block(incr_block);
    let counter = ctx.builder.ins().stack_load(types::I64, counter_slot, 0);
    let step_val = ctx.builder.ins().iconst(types::I64, step);
    let next = ctx.builder.ins().iadd(counter, step_val);
    ctx.builder.ins().stack_store(next, counter_slot, 0);
    ctx.builder.ins().jump(header_block, &[]);

    ctx.builder.seal_block(header_block);
    ctx.builder.seal_block(exit_block);
    ctx.builder.switch_to_block(exit_block);
    Ok(false)
}

/// Lowers `for var in iterable { body }`. `iterable` is evaluated once and
/// materialized via `bread_iter_values` into a plain array (its own elements
/// for an array, its keys in insertion order for a dict), then walked by
/// index via `bread_array_get` — so the loop body never needs to know which
/// kind of container it started from.
fn lower_for_in<M: Module>(ctx: &mut LowerCtx<M>, var: &str, iterable: &Expr, body: &[Stmt]) -> Result<bool, CompileError> {
    let raw = lower_expr(ctx, iterable)?;
    let ctx_ptr = ctx.ctx_ptr();
    let container = ctx.call_status(ctx.imports.iter_values, &[ctx_ptr, raw]);
    let len_fn = ctx.func_ref(ctx.imports.array_length);
    let len_call = ctx.builder.ins().call(len_fn, &[container]);
    let len = ctx.builder.inst_results(len_call)[0];

    let counter_slot = ctx.builder.create_sized_stack_slot(cranelift_codegen::ir::StackSlotData::new(
        cranelift_codegen::ir::StackSlotKind::ExplicitSlot,
        8,
        3,
    ));
    let zero = ctx.builder.ins().iconst(types::I64, 0);
    ctx.builder.ins().stack_store(zero, counter_slot, 0);

    let header_block = ctx.builder.create_block();
    let body_block = ctx.builder.create_block();
    let incr_block = ctx.builder.create_block();
    let exit_block = ctx.builder.create_block();

    ctx.builder.ins().jump(header_block, &[]);

    ctx.builder.switch_to_block(header_block);
    let idx = ctx.builder.ins().stack_load(types::I64, counter_slot, 0);
    let cond = ctx.builder.ins().icmp(cranelift_codegen::ir::condcodes::IntCC::SignedLessThan, idx, len);
    ctx.builder.ins().brif(cond, body_block, &[], exit_block, &[]);
    ctx.builder.seal_block(body_block);

    ctx.builder.switch_to_block(body_block);
    let idx = ctx.builder.ins().stack_load(types::I64, counter_slot, 0);
    let ctx_ptr = ctx.ctx_ptr();
    let elem = ctx.call_status(ctx.imports.array_get, &[ctx_ptr, container, idx]);

    let var_slot = value_discipline::alloc_value_slot(ctx.builder);
    let set_nil = ctx.func_ref(ctx.imports.value_set_nil);
    value_discipline::init_nil(ctx.builder, set_nil, var_slot);
    value_discipline::init_store_boxed(ctx.builder, var_slot, elem);
    ctx.enter_loop(incr_block, exit_block);
    ctx.push_scope_level();
    declare_in_runtime_scope(ctx, var, elem, false)?;
    ctx.scope.add(Var {
        name: var.to_string(),
        storage_slot: var_slot,
        declared_type: bread_ast::TypeDescriptor::Unknown,
        unboxed_rep: bread_ast::UnboxedRep::None,
        is_const: false,
    });

    let terminated = lower_block(ctx, body)?;
    ctx.exit_loop();
    if !terminated {
        ctx.pop_scope_level();
        ctx.builder.ins().jump(incr_block, &[]);
    } else {
        ctx.scope.pop();
    }
    ctx.builder.seal_block(incr_block);

    ctx.builder.switch_to_block(incr_block);
    let idx = ctx.builder.ins().stack_load(types::I64, counter_slot, 0);
    let one = ctx.builder.ins().iconst(types::I64, 1);
    let next = ctx.builder.ins().iadd(idx, one);
    ctx.builder.ins().stack_store(next, counter_slot, 0);
    ctx.builder.ins().jump(header_block, &[]);

    ctx.builder.seal_block(header_block);
    ctx.builder.seal_block(exit_block);
    ctx.builder.switch_to_block(exit_block);
    Ok(false)
}

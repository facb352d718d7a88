//! Value discipline: the boxing/unboxing contract every
//! expression emission in `lowering` goes through. A "slot" is a
//! `Value`-sized (one machine word) Cranelift stack slot holding a
//! `bread_runtime::value::BreadValue`; this module is the thin IR-emission
//! layer over the `bread_value_*`/`bread_box_*`/`bread_unbox_*` ABI that
//! `lowering` calls rather than ever touching `stack_store`/`call` directly,
//! keeping IR emission in small per-concern helpers that sit between
//! expression lowering and the runtime's C ABI.

use cranelift_codegen::ir::{types, FuncRef, InstBuilder, StackSlot, StackSlotData, StackSlotKind, Type, Value as IrValue};
use cranelift_frontend::FunctionBuilder;

use bread_ast::UnboxedRep;

/// Size in bytes of one boxed `Value` word.
pub const VALUE_SIZE: u32 = 8;

/// Allocates a fresh `Value`-sized stack slot for one local variable or
/// temporary. Every slot must be paired with [`init_nil`] in the same basic
/// block before any other use: every `alloca Value` is immediately followed
/// by a `value_set_nil` call.
pub fn alloc_value_slot(builder: &mut FunctionBuilder) -> StackSlot {
    builder.create_sized_stack_slot(StackSlotData::new(StackSlotKind::ExplicitSlot, VALUE_SIZE, 3))
}

pub fn slot_addr(builder: &mut FunctionBuilder, slot: StackSlot) -> IrValue {
    builder.ins().stack_addr(types::I64, slot, 0)
}

/// Zero-initializes a newly allocated slot via `bread_value_set_nil`.
pub fn init_nil(builder: &mut FunctionBuilder, set_nil: FuncRef, slot: StackSlot) {
    let addr = slot_addr(builder, slot);
    builder.ins().call(set_nil, &[addr]);
}

/// Loads the boxed word currently stored in `slot`.
pub fn load_boxed(builder: &mut FunctionBuilder, slot: StackSlot) -> IrValue {
    builder.ins().stack_load(types::I64, slot, 0)
}

/// Overwrites `slot` with `new_value`, releasing the value previously held
/// there first. Every reassignment of a local (`lowering::stmt`'s `Assign`
/// and compound-assign paths) goes through this, not a bare `stack_store`, so
/// the old binding's refcount is never leaked.
pub fn store_boxed(builder: &mut FunctionBuilder, release: FuncRef, slot: StackSlot, new_value: IrValue) {
    let old = load_boxed(builder, slot);
    builder.ins().call(release, &[old]);
    builder.ins().stack_store(new_value, slot, 0);
}

/// Stores into a slot known to still hold its initial nil (e.g. the slot a
/// `VarDecl` just allocated) — no release of prior contents needed.
pub fn init_store_boxed(builder: &mut FunctionBuilder, slot: StackSlot, new_value: IrValue) {
    builder.ins().stack_store(new_value, slot, 0);
}

/// Boxes a native `i32` into a `BreadValue` word via `bread_box_int`.
pub fn box_int(builder: &mut FunctionBuilder, f: FuncRef, v: IrValue) -> IrValue {
    let call = builder.ins().call(f, &[v]);
    builder.inst_results(call)[0]
}

pub fn box_double(builder: &mut FunctionBuilder, f: FuncRef, v: IrValue) -> IrValue {
    let call = builder.ins().call(f, &[v]);
    builder.inst_results(call)[0]
}

/// Boxes a native boolean, represented as an `i32` 0/1 word across the ABI
/// boundary rather than Cranelift's `b1`, matching `bread_box_bool(v: i32)`.
pub fn box_bool(builder: &mut FunctionBuilder, f: FuncRef, v: IrValue) -> IrValue {
    let call = builder.ins().call(f, &[v]);
    builder.inst_results(call)[0]
}

pub fn unbox_int(builder: &mut FunctionBuilder, f: FuncRef, boxed: IrValue) -> IrValue {
    let call = builder.ins().call(f, &[boxed]);
    builder.inst_results(call)[0]
}

pub fn unbox_double(builder: &mut FunctionBuilder, f: FuncRef, boxed: IrValue) -> IrValue {
    let call = builder.ins().call(f, &[boxed]);
    builder.inst_results(call)[0]
}

pub fn unbox_bool(builder: &mut FunctionBuilder, f: FuncRef, boxed: IrValue) -> IrValue {
    let call = builder.ins().call(f, &[boxed]);
    builder.inst_results(call)[0]
}

pub fn is_truthy(builder: &mut FunctionBuilder, f: FuncRef, boxed: IrValue) -> IrValue {
    let call = builder.ins().call(f, &[boxed]);
    builder.inst_results(call)[0]
}

/// Bumps a heap-backed boxed value's refcount in place (`bread_retain_value`)
/// — used whenever a value already living in a slot is read into a second
/// binding (e.g. passed by value into a call) without releasing the first.
pub fn retain(builder: &mut FunctionBuilder, f: FuncRef, boxed: IrValue) -> IrValue {
    let call = builder.ins().call(f, &[boxed]);
    builder.inst_results(call)[0]
}

pub fn release(builder: &mut FunctionBuilder, f: FuncRef, boxed: IrValue) {
    builder.ins().call(f, &[boxed]);
}

/// The native Cranelift register type that carries a value of the given
/// unboxed representation, when a stability analysis result says the
/// unboxed fast path applies. `Bool` is represented as `I32`, matching the
/// `bread_box_bool`/`bread_unbox_bool` ABI's `i32` width rather than `I8`.
pub fn unboxed_ir_type(rep: UnboxedRep) -> Option<Type> {
    match rep {
        UnboxedRep::Int => Some(types::I32),
        UnboxedRep::Double => Some(types::F64),
        UnboxedRep::Bool => Some(types::I32),
        UnboxedRep::None => None,
    }
}

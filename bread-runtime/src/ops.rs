//! The runtime ABI surface called from JIT-compiled BreadLang code —
//! runtime contract table, realized as `extern "C" fn bread_*`
//! entry points registered with Cranelift's `JITBuilder::symbol` (see
//! `bread-codegen::bridge_symbols`).
//!
//! Per-operator arithmetic entry points, each consuming boxed values and
//! returning a `RuntimeResult`-shaped pair, plus one additional literal
//! `bread_binary_op(op, lhs, rhs)` entry point dispatching by the AST's
//! `BinOp::runtime_tag` for callers that want a single entry point instead.
//!
//! # Safety
//!
//! Every `extern "C" fn` here is called from JIT-generated machine code. The
//! JIT driver guarantees `ctx` is a live `RuntimeContext` pointer and that
//! string/array arguments point at valid, UTF-8 (for strings) memory for the
//! given length, for the duration of the call.

#![allow(clippy::not_unsafe_ptr_arg_deref)]

use std::cmp::Ordering;

use crate::array::BreadArray;
use crate::class::RawFnPtr;
use crate::dict::{BreadDict, Key};
use crate::error::RuntimeError;
use crate::optional::BreadOptional;
use crate::runtime_context::{RuntimeContext, RuntimeStatus};
use crate::value::{BreadValue, HeapValue, VarType};

#[inline]
fn ok(v: BreadValue) -> RuntimeStatus {
    RuntimeStatus::ok(v.0)
}

#[inline]
fn err(ctx: &RuntimeContext, e: RuntimeError) -> RuntimeStatus {
    ctx.set_error(e);
    RuntimeStatus::err()
}

unsafe fn str_from_raw(ptr: *const u8, len: usize) -> &'static str {
    std::str::from_utf8_unchecked(std::slice::from_raw_parts(ptr, len))
}

// ---------------------------------------------------------------------
// Value discipline
// ---------------------------------------------------------------------

/// `value_set_nil` — every `alloca Value` is followed by this call in the
/// same basic block.
#[no_mangle]
pub extern "C" fn bread_value_set_nil(slot: *mut u64) {
    unsafe { *slot = BreadValue::null().0 };
}

#[no_mangle]
pub extern "C" fn bread_value_set_int(slot: *mut u64, v: i32) {
    unsafe { *slot = BreadValue::int(v).0 };
}

#[no_mangle]
pub extern "C" fn bread_value_set_double(slot: *mut u64, v: f64) {
    unsafe { *slot = BreadValue::double(v).0 };
}

#[no_mangle]
pub extern "C" fn bread_value_set_bool(slot: *mut u64, v: i32) {
    unsafe { *slot = BreadValue::bool(v != 0).0 };
}

/// `value_set_string` — interns the given bytes and stores the interned
/// pointer.
#[no_mangle]
pub extern "C" fn bread_value_set_string(ctx: *mut RuntimeContext, slot: *mut u64, ptr: *const u8, len: usize) {
    let ctx = unsafe { &mut *ctx };
    let s = unsafe { str_from_raw(ptr, len) };
    let interned = ctx.strings.intern(s);
    unsafe { *slot = BreadValue::string(interned).0 };
}

/// `value_copy` — bumps the refcount of a heap-backed value rather than
/// deep-cloning it.
#[no_mangle]
pub extern "C" fn bread_value_copy(dst: *mut u64, src: *const u64) {
    let v = BreadValue(unsafe { *src }).retain();
    unsafe { *dst = v.0 };
}

/// `value_release_value`.
#[no_mangle]
pub extern "C" fn bread_value_release(val: u64) {
    unsafe { BreadValue(val).release() };
}

#[no_mangle]
pub extern "C" fn bread_unbox_int(val: u64) -> i32 {
    BreadValue(val).try_as_int().unwrap_or(0)
}

#[no_mangle]
pub extern "C" fn bread_unbox_double(val: u64) -> f64 {
    BreadValue(val).try_as_double().unwrap_or(0.0)
}

/// Booleans are widened to 32 bits crossing the ABI and
/// narrowed back to 1 bit here.
#[no_mangle]
pub extern "C" fn bread_unbox_bool(val: u64) -> i32 {
    BreadValue(val).try_as_bool().unwrap_or(false) as i32
}

#[no_mangle]
pub extern "C" fn bread_is_truthy(val: u64) -> i32 {
    BreadValue(val).is_truthy() as i32
}

/// Pure box constructors returning the boxed word directly, used by
/// `bread-codegen`'s value-discipline helpers on the path that carries a
/// boxed [`BreadValue`] through the IR as an SSA register rather than
/// re-reading it back out of a stack slot.
#[no_mangle]
pub extern "C" fn bread_box_int(v: i32) -> u64 {
    BreadValue::int(v).0
}

#[no_mangle]
pub extern "C" fn bread_box_double(v: f64) -> u64 {
    BreadValue::double(v).0
}

#[no_mangle]
pub extern "C" fn bread_box_bool(v: i32) -> u64 {
    BreadValue::bool(v != 0).0
}

/// `value_copy` without the destination-slot indirection: bumps the refcount
/// of a heap-backed boxed value held in a register and returns it unchanged.
#[no_mangle]
pub extern "C" fn bread_retain_value(v: u64) -> u64 {
    BreadValue(v).retain().0
}

#[no_mangle]
pub extern "C" fn bread_value_type_name(val: u64) -> u8 {
    BreadValue(val).var_type() as u8
}

// ---------------------------------------------------------------------
// Scope & symbol table (runtime half)
// ---------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn bread_scope_depth(ctx: *mut RuntimeContext) -> u64 {
    unsafe { &*ctx }.scopes.depth() as u64
}

#[no_mangle]
pub extern "C" fn bread_push_scope(ctx: *mut RuntimeContext) {
    unsafe { &mut *ctx }.scopes.push_scope();
}

#[no_mangle]
pub extern "C" fn bread_pop_scope(ctx: *mut RuntimeContext) {
    unsafe { &mut *ctx }.scopes.pop_scope();
}

#[no_mangle]
pub extern "C" fn bread_pop_to_scope_depth(ctx: *mut RuntimeContext, depth: u64) {
    unsafe { &mut *ctx }.scopes.pop_to_scope_depth(depth as usize);
}

#[no_mangle]
pub extern "C" fn bread_var_decl(
    ctx: *mut RuntimeContext,
    name_ptr: *const u8,
    name_len: usize,
    value: u64,
    is_const: i32,
) -> i32 {
    let ctx = unsafe { &mut *ctx };
    let name = unsafe { str_from_raw(name_ptr, name_len) };
    match ctx.scopes.var_decl(name, BreadValue(value), is_const != 0) {
        Ok(()) => 0,
        Err(e) => {
            ctx.set_error(e);
            1
        }
    }
}

#[no_mangle]
pub extern "C" fn bread_var_decl_if_missing(
    ctx: *mut RuntimeContext,
    name_ptr: *const u8,
    name_len: usize,
    value: u64,
    is_const: i32,
) {
    let ctx = unsafe { &mut *ctx };
    let name = unsafe { str_from_raw(name_ptr, name_len) };
    ctx.scopes.var_decl_if_missing(name, BreadValue(value), is_const != 0);
}

#[no_mangle]
pub extern "C" fn bread_var_assign(ctx: *mut RuntimeContext, name_ptr: *const u8, name_len: usize, value: u64) -> i32 {
    let ctx = unsafe { &mut *ctx };
    let name = unsafe { str_from_raw(name_ptr, name_len) };
    match ctx.scopes.var_assign(name, BreadValue(value)) {
        Ok(()) => 0,
        Err(e) => {
            ctx.set_error(e);
            1
        }
    }
}

#[no_mangle]
pub extern "C" fn bread_var_load(ctx: *mut RuntimeContext, name_ptr: *const u8, name_len: usize) -> RuntimeStatus {
    let ctx = unsafe { &*ctx };
    let name = unsafe { str_from_raw(name_ptr, name_len) };
    match ctx.scopes.var_load(name) {
        Ok(v) => ok(v.retain()),
        Err(e) => err(ctx, e),
    }
}

// ---------------------------------------------------------------------
// Arithmetic / comparison / logical operators
// ---------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn bread_add(ctx: *mut RuntimeContext, left: u64, right: u64) -> RuntimeStatus {
    let ctx = unsafe { &*ctx };
    let (l, r) = (BreadValue(left), BreadValue(right));
    if let (Some(a), Some(b)) = (l.try_as_int(), r.try_as_int()) {
        return match a.checked_add(b) {
            Some(v) => ok(BreadValue::int(v)),
            None => err(ctx, RuntimeError::Type { expected: "int", actual: "overflowed int" }),
        };
    }
    if let (Some(a), Some(b)) = (numeric(l), numeric(r)) {
        return ok(BreadValue::double(a + b));
    }
    if matches!(l.var_type(), VarType::String) || matches!(r.var_type(), VarType::String) {
        return ok(BreadValue::string(format!("{}{}", display(l), display(r))));
    }
    err(ctx, RuntimeError::Type { expected: "numeric or string", actual: l.var_type().name() })
}

#[no_mangle]
pub extern "C" fn bread_sub(ctx: *mut RuntimeContext, left: u64, right: u64) -> RuntimeStatus {
    arith(ctx, left, right, |a, b| a.checked_sub(b), |a, b| a - b)
}

#[no_mangle]
pub extern "C" fn bread_mul(ctx: *mut RuntimeContext, left: u64, right: u64) -> RuntimeStatus {
    arith(ctx, left, right, |a, b| a.checked_mul(b), |a, b| a * b)
}

#[no_mangle]
pub extern "C" fn bread_div(ctx: *mut RuntimeContext, left: u64, right: u64) -> RuntimeStatus {
    let ctx = unsafe { &*ctx };
    let (l, r) = (BreadValue(left), BreadValue(right));
    if let (Some(a), Some(b)) = (l.try_as_int(), r.try_as_int()) {
        if b == 0 {
            return err(ctx, RuntimeError::DivisionByZero);
        }
        return match a.checked_div(b) {
            Some(v) => ok(BreadValue::int(v)),
            None => err(ctx, RuntimeError::Type { expected: "int", actual: "overflowed int" }),
        };
    }
    if let (Some(a), Some(b)) = (numeric(l), numeric(r)) {
        if b == 0.0 {
            return err(ctx, RuntimeError::DivisionByZero);
        }
        return ok(BreadValue::double(a / b));
    }
    err(ctx, RuntimeError::Type { expected: "numeric", actual: l.var_type().name() })
}

#[no_mangle]
pub extern "C" fn bread_mod(ctx: *mut RuntimeContext, left: u64, right: u64) -> RuntimeStatus {
    let ctx = unsafe { &*ctx };
    let (l, r) = (BreadValue(left), BreadValue(right));
    if let (Some(a), Some(b)) = (l.try_as_int(), r.try_as_int()) {
        if b == 0 {
            return err(ctx, RuntimeError::DivisionByZero);
        }
        return match a.checked_rem(b) {
            Some(v) => ok(BreadValue::int(v)),
            None => err(ctx, RuntimeError::Type { expected: "int", actual: "overflowed int" }),
        };
    }
    err(ctx, RuntimeError::Type { expected: "int", actual: l.var_type().name() })
}

fn arith(
    ctx: *mut RuntimeContext,
    left: u64,
    right: u64,
    int_op: impl Fn(i32, i32) -> Option<i32>,
    float_op: impl Fn(f64, f64) -> f64,
) -> RuntimeStatus {
    let ctx = unsafe { &*ctx };
    let (l, r) = (BreadValue(left), BreadValue(right));
    if let (Some(a), Some(b)) = (l.try_as_int(), r.try_as_int()) {
        return match int_op(a, b) {
            Some(v) => ok(BreadValue::int(v)),
            None => err(ctx, RuntimeError::Type { expected: "int", actual: "overflowed int" }),
        };
    }
    if let (Some(a), Some(b)) = (numeric(l), numeric(r)) {
        return ok(BreadValue::double(float_op(a, b)));
    }
    err(ctx, RuntimeError::Type { expected: "numeric", actual: l.var_type().name() })
}

fn numeric(v: BreadValue) -> Option<f64> {
    v.try_as_int().map(|i| i as f64).or_else(|| v.try_as_double())
}

fn display(v: BreadValue) -> String {
    match v.var_type() {
        VarType::Nil => "nil".to_string(),
        VarType::Int => v.try_as_int().unwrap().to_string(),
        VarType::Double => v.try_as_double().unwrap().to_string(),
        VarType::Bool => v.try_as_bool().unwrap().to_string(),
        VarType::String => match unsafe { v.as_heap_ref() } {
            Some(HeapValue::String(s)) => s.to_string(),
            _ => String::new(),
        },
        _ => format!("<{}>", v.var_type().name()),
    }
}

fn values_eq(l: BreadValue, r: BreadValue) -> bool {
    if l.0 == r.0 {
        return true;
    }
    match (numeric(l), numeric(r)) {
        (Some(a), Some(b)) => return a == b,
        _ => {}
    }
    match (l.var_type(), r.var_type()) {
        (VarType::String, VarType::String) => display(l) == display(r),
        _ => false,
    }
}

fn values_cmp(l: BreadValue, r: BreadValue) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (numeric(l), numeric(r)) {
        return a.partial_cmp(&b);
    }
    if let (VarType::String, VarType::String) = (l.var_type(), r.var_type()) {
        return Some(display(l).cmp(&display(r)));
    }
    None
}

#[no_mangle]
pub extern "C" fn bread_eq(_ctx: *mut RuntimeContext, left: u64, right: u64) -> RuntimeStatus {
    ok(BreadValue::bool(values_eq(BreadValue(left), BreadValue(right))))
}

#[no_mangle]
pub extern "C" fn bread_ne(_ctx: *mut RuntimeContext, left: u64, right: u64) -> RuntimeStatus {
    ok(BreadValue::bool(!values_eq(BreadValue(left), BreadValue(right))))
}

fn compare(ctx: *mut RuntimeContext, left: u64, right: u64, want: impl Fn(Ordering) -> bool) -> RuntimeStatus {
    let ctx = unsafe { &*ctx };
    let (l, r) = (BreadValue(left), BreadValue(right));
    match values_cmp(l, r) {
        Some(o) => ok(BreadValue::bool(want(o))),
        None => err(ctx, RuntimeError::Type { expected: "comparable operands", actual: l.var_type().name() }),
    }
}

#[no_mangle]
pub extern "C" fn bread_lt(ctx: *mut RuntimeContext, left: u64, right: u64) -> RuntimeStatus {
    compare(ctx, left, right, |o| o == Ordering::Less)
}

#[no_mangle]
pub extern "C" fn bread_le(ctx: *mut RuntimeContext, left: u64, right: u64) -> RuntimeStatus {
    compare(ctx, left, right, |o| o != Ordering::Greater)
}

#[no_mangle]
pub extern "C" fn bread_gt(ctx: *mut RuntimeContext, left: u64, right: u64) -> RuntimeStatus {
    compare(ctx, left, right, |o| o == Ordering::Greater)
}

#[no_mangle]
pub extern "C" fn bread_ge(ctx: *mut RuntimeContext, left: u64, right: u64) -> RuntimeStatus {
    compare(ctx, left, right, |o| o != Ordering::Less)
}

#[no_mangle]
pub extern "C" fn bread_and(_ctx: *mut RuntimeContext, left: u64, right: u64) -> RuntimeStatus {
    ok(BreadValue::bool(BreadValue(left).is_truthy() && BreadValue(right).is_truthy()))
}

#[no_mangle]
pub extern "C" fn bread_or(_ctx: *mut RuntimeContext, left: u64, right: u64) -> RuntimeStatus {
    ok(BreadValue::bool(BreadValue(left).is_truthy() || BreadValue(right).is_truthy()))
}

/// Single dispatch entry point keyed by `BinOp::runtime_tag`, additionally
/// satisfying the literal `binary_op(op, lhs, rhs, out)` contract name
/// alongside the per-operator functions above.
#[no_mangle]
pub extern "C" fn bread_binary_op(ctx: *mut RuntimeContext, op: u8, left: u64, right: u64) -> RuntimeStatus {
    match op {
        b'+' => bread_add(ctx, left, right),
        b'-' => bread_sub(ctx, left, right),
        b'*' => bread_mul(ctx, left, right),
        b'/' => bread_div(ctx, left, right),
        b'%' => bread_mod(ctx, left, right),
        b'=' => bread_eq(ctx, left, right),
        b'!' => bread_ne(ctx, left, right),
        b'<' => bread_lt(ctx, left, right),
        b'l' => bread_le(ctx, left, right),
        b'>' => bread_gt(ctx, left, right),
        b'g' => bread_ge(ctx, left, right),
        b'&' => bread_and(ctx, left, right),
        b'|' => bread_or(ctx, left, right),
        _ => err(unsafe { &*ctx }, RuntimeError::UnsupportedOperator(op as char)),
    }
}

#[no_mangle]
pub extern "C" fn bread_unary_not(_ctx: *mut RuntimeContext, val: u64) -> RuntimeStatus {
    ok(BreadValue::bool(!BreadValue(val).is_truthy()))
}

#[no_mangle]
pub extern "C" fn bread_unary_neg(ctx: *mut RuntimeContext, val: u64) -> RuntimeStatus {
    let ctx = unsafe { &*ctx };
    let v = BreadValue(val);
    if let Some(i) = v.try_as_int() {
        return match i.checked_neg() {
            Some(r) => ok(BreadValue::int(r)),
            None => err(ctx, RuntimeError::Type { expected: "int", actual: "overflowed int" }),
        };
    }
    if let Some(d) = v.try_as_double() {
        return ok(BreadValue::double(-d));
    }
    err(ctx, RuntimeError::Type { expected: "numeric", actual: v.var_type().name() })
}

// ---------------------------------------------------------------------
// Indexing / member access
// ---------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn bread_index_op(ctx: *mut RuntimeContext, target: u64, index: u64) -> RuntimeStatus {
    let ctx = unsafe { &*ctx };
    let t = BreadValue(target);
    match unsafe { t.as_heap_ref() } {
        Some(HeapValue::Array(arr)) => {
            let idx = BreadValue(index).try_as_int().unwrap_or(0) as i64;
            match arr.borrow().get(idx) {
                Ok(v) => ok(v.retain()),
                Err(e) => err(ctx, e),
            }
        }
        Some(HeapValue::Dict(dict)) => match Key::from_value(BreadValue(index)) {
            Ok(key) => match dict.borrow().get(&key) {
                Some(v) => ok(v.retain()),
                None => err(ctx, RuntimeError::NoSuchKey),
            },
            Err(e) => err(ctx, e),
        },
        _ => err(ctx, RuntimeError::Type { expected: "array or dict", actual: t.var_type().name() }),
    }
}

#[no_mangle]
pub extern "C" fn bread_index_set_op(ctx: *mut RuntimeContext, target: u64, index: u64, value: u64) -> i32 {
    let ctx = unsafe { &*ctx };
    let t = BreadValue(target);
    let result = match unsafe { t.as_heap_ref() } {
        Some(HeapValue::Array(arr)) => {
            let idx = BreadValue(index).try_as_int().unwrap_or(0) as i64;
            arr.borrow_mut().set(idx, BreadValue(value))
        }
        Some(HeapValue::Dict(dict)) => match Key::from_value(BreadValue(index)) {
            Ok(key) => {
                dict.borrow_mut().set(key, BreadValue(value));
                Ok(())
            }
            Err(e) => Err(e),
        },
        _ => Err(RuntimeError::Type { expected: "array or dict", actual: t.var_type().name() }),
    };
    match result {
        Ok(()) => 0,
        Err(e) => {
            ctx.set_error(e);
            1
        }
    }
}

#[no_mangle]
pub extern "C" fn bread_member_op(
    ctx: *mut RuntimeContext,
    target: u64,
    name_ptr: *const u8,
    name_len: usize,
    is_optional: i32,
) -> RuntimeStatus {
    let ctx = unsafe { &*ctx };
    let name = unsafe { str_from_raw(name_ptr, name_len) };
    let t = BreadValue(target);
    let result = match unsafe { t.as_heap_ref() } {
        Some(HeapValue::Struct(s)) => s.borrow().get_field(name),
        Some(HeapValue::Class(c)) => c.borrow().get_field(name),
        _ if is_optional != 0 && t.is_null() => return ok(BreadValue::null()),
        _ => Err(RuntimeError::Type { expected: "struct or class", actual: t.var_type().name() }),
    };
    match result {
        Ok(v) => ok(v.retain()),
        Err(e) if is_optional != 0 => {
            let _ = e;
            ok(BreadValue::null())
        }
        Err(e) => err(ctx, e),
    }
}

#[no_mangle]
pub extern "C" fn bread_member_set_op(
    ctx: *mut RuntimeContext,
    target: u64,
    name_ptr: *const u8,
    name_len: usize,
    value: u64,
) -> i32 {
    let ctx = unsafe { &*ctx };
    let name = unsafe { str_from_raw(name_ptr, name_len) };
    let t = BreadValue(target);
    let result = match unsafe { t.as_heap_ref() } {
        Some(HeapValue::Struct(s)) => s.borrow_mut().set_field(name, BreadValue(value)),
        Some(HeapValue::Class(c)) => c.borrow_mut().set_field(name, BreadValue(value)),
        _ => Err(RuntimeError::Type { expected: "struct or class", actual: t.var_type().name() }),
    };
    match result {
        Ok(()) => 0,
        Err(e) => {
            ctx.set_error(e);
            1
        }
    }
}

// ---------------------------------------------------------------------
// Struct / class literals
// ---------------------------------------------------------------------

/// `struct_new` — builds a fresh `BreadStruct` named `type_name` with one
/// nil-valued field per entry in `field_names`; the literal's own field
/// expressions are then written in with `bread_member_set_op`.
#[no_mangle]
pub extern "C" fn bread_struct_new(
    name_ptr: *const u8,
    name_len: usize,
    field_names_ptr: *const *const u8,
    field_lens_ptr: *const usize,
    field_count: usize,
) -> u64 {
    let type_name = unsafe { str_from_raw(name_ptr, name_len) };
    let fields = unsafe { read_name_array(field_names_ptr, field_lens_ptr, field_count) }
        .into_iter()
        .map(|name| (name, BreadValue::null()))
        .collect();
    BreadValue::struct_value(crate::struct_type::BreadStruct::new(type_name, fields)).0
}

/// `class_literal_new` — builds an instance of a previously-registered class
/// with every field nil, *without* running its compiled constructor, for a
/// class-literal expression (as opposed to a constructor call, which goes
/// through [`bread_class_create_instance`]).
#[no_mangle]
pub extern "C" fn bread_class_literal_new(ctx: *mut RuntimeContext, name_ptr: *const u8, name_len: usize) -> RuntimeStatus {
    let ctx = unsafe { &*ctx };
    let name = unsafe { str_from_raw(name_ptr, name_len) };
    match ctx.classes.create_instance(name) {
        Ok(instance) => {
            let out = BreadValue::class_instance(std::rc::Rc::into_inner(instance).map(|c| c.into_inner()).unwrap_or_else(|| unreachable!()));
            ok(out)
        }
        Err(e) => err(ctx, e),
    }
}

// ---------------------------------------------------------------------
// Arrays, dicts, ranges
// ---------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn bread_array_new() -> u64 {
    BreadValue::array(BreadArray::new()).0
}

#[no_mangle]
pub extern "C" fn bread_array_append_value(arr: u64, value: u64) {
    if let Some(HeapValue::Array(a)) = unsafe { BreadValue(arr).as_heap_ref() } {
        a.borrow_mut().append(BreadValue(value));
    }
}

#[no_mangle]
pub extern "C" fn bread_array_length(arr: u64) -> u64 {
    match unsafe { BreadValue(arr).as_heap_ref() } {
        Some(HeapValue::Array(a)) => a.borrow().len() as u64,
        _ => 0,
    }
}

#[no_mangle]
pub extern "C" fn bread_array_get(ctx: *mut RuntimeContext, arr: u64, index: i64) -> RuntimeStatus {
    let ctx = unsafe { &*ctx };
    match unsafe { BreadValue(arr).as_heap_ref() } {
        Some(HeapValue::Array(a)) => match a.borrow().get(index) {
            Ok(v) => ok(v.retain()),
            Err(e) => err(ctx, e),
        },
        _ => err(ctx, RuntimeError::Type { expected: "array", actual: "non-array" }),
    }
}

#[no_mangle]
pub extern "C" fn bread_dict_new() -> u64 {
    BreadValue::dict(BreadDict::new()).0
}

#[no_mangle]
pub extern "C" fn bread_dict_set_value(ctx: *mut RuntimeContext, dict: u64, key: u64, value: u64) -> i32 {
    let ctx = unsafe { &*ctx };
    match unsafe { BreadValue(dict).as_heap_ref() } {
        Some(HeapValue::Dict(d)) => match Key::from_value(BreadValue(key)) {
            Ok(k) => {
                d.borrow_mut().set(k, BreadValue(value));
                0
            }
            Err(e) => {
                ctx.set_error(e);
                1
            }
        },
        _ => {
            ctx.set_error(RuntimeError::Type { expected: "dict", actual: "non-dict" });
            1
        }
    }
}

/// `dict_keys` — writes the key array into `out_array` and returns its
/// length; zero means "empty" (for-in treats a zero-length
/// result as "end of iteration" for both a genuinely-empty dict and a
/// lookup failure, per documented unspecified-order note).
#[no_mangle]
pub extern "C" fn bread_dict_keys(dict: u64, out_array: *mut u64) -> u64 {
    match unsafe { BreadValue(dict).as_heap_ref() } {
        Some(HeapValue::Dict(d)) => {
            let d = d.borrow();
            let mut n = 0u64;
            for (i, key) in d.keys().enumerate() {
                unsafe { *out_array.add(i) = key.to_value().0 };
                n += 1;
            }
            n
        }
        _ => 0,
    }
}

/// `iter_values` — materializes any iterable container into a fresh array of
/// its iteration targets (its own elements for an array, its keys in stable
/// insertion order for a dict), so `for x in ...` lowers to one walk over an
/// array regardless of what it is iterating.
#[no_mangle]
pub extern "C" fn bread_iter_values(ctx: *mut RuntimeContext, container: u64) -> RuntimeStatus {
    let ctx = unsafe { &*ctx };
    match unsafe { BreadValue(container).as_heap_ref() } {
        Some(HeapValue::Array(a)) => {
            let items: Vec<BreadValue> = a.borrow().iter().map(|v| v.retain()).collect();
            ok(BreadValue::array(BreadArray::from_vec(items)))
        }
        Some(HeapValue::Dict(d)) => {
            let items: Vec<BreadValue> = d.borrow().keys().map(|k| k.to_value()).collect();
            ok(BreadValue::array(BreadArray::from_vec(items)))
        }
        _ => err(ctx, RuntimeError::Type { expected: "array or dict", actual: "non-iterable" }),
    }
}

#[no_mangle]
pub extern "C" fn bread_range_simple(end: i32) -> u64 {
    bread_range_create(0, end, 1)
}

/// `range_create` — must be idempotent: evaluated twice with the same
/// arguments it produces arrays of equal length and elementwise-equal
/// contents.
#[no_mangle]
pub extern "C" fn bread_range_create(start: i32, end: i32, step: i32) -> u64 {
    let mut items = Vec::new();
    if step > 0 {
        let mut i = start;
        while i < end {
            items.push(BreadValue::int(i));
            i += step;
        }
    } else if step < 0 {
        let mut i = start;
        while i > end {
            items.push(BreadValue::int(i));
            i += step;
        }
    }
    BreadValue::array(BreadArray::from_vec(items)).0
}

// ---------------------------------------------------------------------
// Class registration and dynamic dispatch
// ---------------------------------------------------------------------

unsafe fn read_name_array(ptr: *const *const u8, lens: *const usize, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let p = unsafe { *ptr.add(i) };
            let l = unsafe { *lens.add(i) };
            unsafe { str_from_raw(p, l) }.to_string()
        })
        .collect()
}

#[no_mangle]
pub extern "C" fn bread_class_create_definition(
    ctx: *mut RuntimeContext,
    name_ptr: *const u8,
    name_len: usize,
    parent_ptr: *const u8,
    parent_len: usize,
    has_parent: i32,
    field_names_ptr: *const *const u8,
    field_lens_ptr: *const usize,
    field_count: usize,
    method_names_ptr: *const *const u8,
    method_lens_ptr: *const usize,
    method_count: usize,
) -> u64 {
    let ctx = unsafe { &mut *ctx };
    let name = unsafe { str_from_raw(name_ptr, name_len) };
    let parent_name = if has_parent != 0 { Some(unsafe { str_from_raw(parent_ptr, parent_len) }.to_string()) } else { None };
    let fields = unsafe { read_name_array(field_names_ptr, field_lens_ptr, field_count) };
    let methods = unsafe { read_name_array(method_names_ptr, method_lens_ptr, method_count) };
    let class = ctx.classes.create_class_definition(name, parent_name, fields, methods);
    Box::into_raw(Box::new(class)) as u64
}

#[no_mangle]
pub extern "C" fn bread_class_register_definition(ctx: *mut RuntimeContext, class_handle: u64) {
    let ctx = unsafe { &mut *ctx };
    let class = unsafe { Box::from_raw(class_handle as *mut std::rc::Rc<std::cell::RefCell<crate::class::BreadClass>>) };
    ctx.classes.register_definition(*class);
}

#[no_mangle]
pub extern "C" fn bread_class_resolve_inheritance(ctx: *mut RuntimeContext) -> i32 {
    let ctx = unsafe { &*ctx };
    match ctx.classes.resolve_inheritance() {
        Ok(()) => 0,
        Err(e) => {
            ctx.set_error(e);
            1
        }
    }
}

#[no_mangle]
pub extern "C" fn bread_class_set_compiled_method(
    ctx: *mut RuntimeContext,
    name_ptr: *const u8,
    name_len: usize,
    index: usize,
    fn_ptr: RawFnPtr,
) -> i32 {
    let ctx = unsafe { &*ctx };
    let name = unsafe { str_from_raw(name_ptr, name_len) };
    match ctx.classes.set_compiled_method(name, index, fn_ptr) {
        Ok(()) => 0,
        Err(e) => {
            ctx.set_error(e);
            1
        }
    }
}

#[no_mangle]
pub extern "C" fn bread_class_set_compiled_method_by_name(
    ctx: *mut RuntimeContext,
    class_name_ptr: *const u8,
    class_name_len: usize,
    method_name_ptr: *const u8,
    method_name_len: usize,
    fn_ptr: RawFnPtr,
) -> i32 {
    let ctx = unsafe { &*ctx };
    let class_name = unsafe { str_from_raw(class_name_ptr, class_name_len) };
    let method_name = unsafe { str_from_raw(method_name_ptr, method_name_len) };
    match ctx.classes.set_compiled_method_by_name(class_name, method_name, fn_ptr) {
        Ok(()) => 0,
        Err(e) => {
            ctx.set_error(e);
            1
        }
    }
}

#[no_mangle]
pub extern "C" fn bread_class_set_compiled_constructor(
    ctx: *mut RuntimeContext,
    name_ptr: *const u8,
    name_len: usize,
    fn_ptr: RawFnPtr,
) -> i32 {
    let ctx = unsafe { &*ctx };
    let name = unsafe { str_from_raw(name_ptr, name_len) };
    match ctx.classes.set_compiled_constructor(name, fn_ptr) {
        Ok(()) => 0,
        Err(e) => {
            ctx.set_error(e);
            1
        }
    }
}

/// Builds a new object instance of `name` and runs its compiled constructor
/// (if any) with `args`.
#[no_mangle]
pub extern "C" fn bread_class_create_instance(
    ctx: *mut RuntimeContext,
    name_ptr: *const u8,
    name_len: usize,
    args_ptr: *const u64,
    argc: usize,
) -> RuntimeStatus {
    let ctx = unsafe { &*ctx };
    let name = unsafe { str_from_raw(name_ptr, name_len) };
    let instance = match ctx.classes.create_instance(name) {
        Ok(i) => i,
        Err(e) => return err(ctx, e),
    };
    let ctor = instance.borrow().class.borrow().compiled_constructor();
    let out = BreadValue::class_instance(std::rc::Rc::into_inner(instance).map(|c| c.into_inner()).unwrap_or_else(|| unreachable!()));
    if let Some(fn_ptr) = ctor {
        let args = if argc > 0 { unsafe { std::slice::from_raw_parts(args_ptr, argc) } } else { &[] };
        execute_compiled_method(fn_ptr, out.0, args);
    }
    ok(out)
}

/// `method_call_op` — dynamic dispatch: resolves the method through the
/// instance's class (and its inheritance chain), then calls it through the
/// arity-specialized bridge; only 0..=3 args are specialized, a higher arity
/// surfaces as an arity-mismatch runtime error.
#[no_mangle]
pub extern "C" fn bread_method_call_op(
    ctx: *mut RuntimeContext,
    target: u64,
    name_ptr: *const u8,
    name_len: usize,
    args_ptr: *const u64,
    argc: usize,
    is_optional: i32,
) -> RuntimeStatus {
    let ctx = unsafe { &*ctx };
    let name = unsafe { str_from_raw(name_ptr, name_len) };
    let t = BreadValue(target);
    if is_optional != 0 && t.is_null() {
        return ok(BreadValue::null());
    }
    let class = match unsafe { t.as_heap_ref() } {
        Some(HeapValue::Class(c)) => c.borrow().class.clone(),
        _ => return err(ctx, RuntimeError::Type { expected: "class instance", actual: t.var_type().name() }),
    };
    let fn_ptr = match class.borrow().resolve_compiled_method(name) {
        Some(p) => p,
        None => return err(ctx, RuntimeError::NoSuchMethod(name.to_string())),
    };
    let args = if argc > 0 { unsafe { std::slice::from_raw_parts(args_ptr, argc) } } else { &[] };
    match execute_compiled_method(fn_ptr, target, args) {
        Some(v) => ok(v),
        None => err(ctx, RuntimeError::Arity { expected: 3, actual: argc }),
    }
}

/// Casts `fn_ptr` to the arity-specialized signature and invokes it. Only
/// arities 0..=3 are specialized; anything higher returns `None`, which the
/// caller turns into an arity-mismatch error.
fn execute_compiled_method(fn_ptr: RawFnPtr, self_val: u64, args: &[u64]) -> Option<BreadValue> {
    let mut out: u64 = BreadValue::null().0;
    unsafe {
        match args.len() {
            0 => {
                let f: extern "C" fn(*mut u64, u64) = std::mem::transmute(fn_ptr);
                f(&mut out, self_val);
            }
            1 => {
                let f: extern "C" fn(*mut u64, u64, u64) = std::mem::transmute(fn_ptr);
                f(&mut out, self_val, args[0]);
            }
            2 => {
                let f: extern "C" fn(*mut u64, u64, u64, u64) = std::mem::transmute(fn_ptr);
                f(&mut out, self_val, args[0], args[1]);
            }
            3 => {
                let f: extern "C" fn(*mut u64, u64, u64, u64, u64) = std::mem::transmute(fn_ptr);
                f(&mut out, self_val, args[0], args[1], args[2]);
            }
            _ => return None,
        }
    }
    Some(BreadValue(out))
}

// ---------------------------------------------------------------------
// Builtins, printing, lifecycle
// ---------------------------------------------------------------------

/// `print(value)` — the only builtin the end-to-end demo scenarios call;
/// writes the value's display form followed by a newline.
#[no_mangle]
pub extern "C" fn bread_print(val: u64) {
    println!("{}", display_deep(BreadValue(val)));
}

fn display_deep(v: BreadValue) -> String {
    match unsafe { v.as_heap_ref() } {
        Some(HeapValue::Array(a)) => {
            let items: Vec<String> = a.borrow().iter().map(display_deep).collect();
            format!("[{}]", items.join(", "))
        }
        Some(HeapValue::Dict(d)) => {
            let d = d.borrow();
            let items: Vec<String> = d.keys().map(|k| display_deep(k.to_value())).collect();
            format!("{{{}}}", items.join(", "))
        }
        _ => display(v),
    }
}

/// `builtin_call_out` — dispatches a builtin function call by name.
#[no_mangle]
pub extern "C" fn bread_builtin_call_out(
    ctx: *mut RuntimeContext,
    name_ptr: *const u8,
    name_len: usize,
    args_ptr: *const u64,
    argc: usize,
) -> RuntimeStatus {
    let ctx = unsafe { &*ctx };
    let name = unsafe { str_from_raw(name_ptr, name_len) };
    let args = if argc > 0 { unsafe { std::slice::from_raw_parts(args_ptr, argc) } } else { &[] };
    match name {
        "print" if argc == 1 => {
            bread_print(args[0]);
            ok(BreadValue::null())
        }
        "len" if argc == 1 => match unsafe { BreadValue(args[0]).as_heap_ref() } {
            Some(HeapValue::Array(a)) => ok(BreadValue::int(a.borrow().len() as i32)),
            Some(HeapValue::Dict(d)) => ok(BreadValue::int(d.borrow().len() as i32)),
            Some(HeapValue::String(s)) => ok(BreadValue::int(s.len() as i32)),
            _ => err(ctx, RuntimeError::Type { expected: "array, dict, or string", actual: "other" }),
        },
        _ => err(ctx, RuntimeError::UnknownFunction(name.to_string())),
    }
}

#[no_mangle]
pub extern "C" fn bread_memory_init(_ctx: *mut RuntimeContext) {}

#[no_mangle]
pub extern "C" fn bread_string_intern_init(_ctx: *mut RuntimeContext) {}

#[no_mangle]
pub extern "C" fn bread_builtin_init(_ctx: *mut RuntimeContext) {}

#[no_mangle]
pub extern "C" fn bread_error_init(_ctx: *mut RuntimeContext) {}

#[no_mangle]
pub extern "C" fn bread_runtime_cleanup(_ctx: *mut RuntimeContext) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Box<RuntimeContext> {
        Box::new(RuntimeContext::new())
    }

    #[test]
    fn add_small_ints() {
        let mut c = ctx();
        let r = bread_add(&mut *c, BreadValue::int(2).0, BreadValue::int(3).0);
        assert_eq!(r.error, 0);
        assert_eq!(BreadValue(r.value).try_as_int(), Some(5));
    }

    #[test]
    fn div_by_zero_sets_error() {
        let mut c = ctx();
        let r = bread_div(&mut *c, BreadValue::int(4).0, BreadValue::int(0).0);
        assert_eq!(r.error, 1);
        assert!(c.has_error());
    }

    #[test]
    fn binary_op_dispatches_by_tag() {
        let mut c = ctx();
        let r = bread_binary_op(&mut *c, b'+', BreadValue::int(1).0, BreadValue::int(1).0);
        assert_eq!(BreadValue(r.value).try_as_int(), Some(2));
    }

    #[test]
    fn array_index_roundtrip() {
        let arr = bread_array_new();
        bread_array_append_value(arr, BreadValue::int(10).0);
        bread_array_append_value(arr, BreadValue::int(20).0);
        assert_eq!(bread_array_length(arr), 2);
        let mut c = ctx();
        let got = bread_array_get(&mut *c, arr, 1);
        assert_eq!(BreadValue(got.value).try_as_int(), Some(20));
        bread_value_release(arr);
    }

    #[test]
    fn range_create_is_idempotent() {
        let a = bread_range_create(0, 3, 1);
        let b = bread_range_create(0, 3, 1);
        let (Some(HeapValue::Array(ra)), Some(HeapValue::Array(rb))) =
            (unsafe { BreadValue(a).as_heap_ref() }, unsafe { BreadValue(b).as_heap_ref() })
        else {
            panic!("expected arrays");
        };
        let va: Vec<_> = ra.borrow().iter().map(|v| v.try_as_int()).collect();
        let vb: Vec<_> = rb.borrow().iter().map(|v| v.try_as_int()).collect();
        assert_eq!(va, vb);
        bread_value_release(a);
        bread_value_release(b);
    }
}

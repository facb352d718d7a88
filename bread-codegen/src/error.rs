//! Error taxonomy for the codegen core — one `thiserror` variant family per
//! category. `BoundsError`/`TypeError` are runtime-value errors
//! and live in `bread_runtime::error::RuntimeError`; everything here is a
//! *compile-time* failure, surfaced before any JIT-compiled code runs.

use thiserror::Error;

/// Failures raised while lowering an AST into Cranelift IR: unresolved
/// names, arity mismatches, and constructs the core does not support.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("unknown identifier: {0}")]
    UnknownIdent(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("unknown class: {0}")]
    UnknownClass(String),

    #[error("unknown method {method} on class {class}")]
    UnknownMethod { class: String, method: String },

    #[error("{name} expects at least {expected} argument(s), got {actual}")]
    Arity { name: String, expected: usize, actual: usize },

    #[error("`super` used outside a method whose class has a parent")]
    SuperWithoutParent,

    #[error("`self` used outside a method body")]
    SelfOutsideMethod,

    #[error("cannot assign to const binding `{0}`")]
    AssignToConst(String),

    #[error("for-range bounds must be integer literals")]
    NonLiteralRangeBound,

    #[error("unsupported construct: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Internal(#[from] CodegenInternalError),
}

/// Failures in the codegen core itself — a Cranelift builder call rejected
/// the IR being built, or module declaration failed. These indicate a bug in
/// the lowering logic, not a problem with the input program.
#[derive(Error, Debug)]
pub enum CodegenInternalError {
    #[error("cranelift codegen error: {0}")]
    Cranelift(#[from] cranelift_codegen::CodegenError),

    #[error("module error: {0}")]
    Module(#[from] cranelift_module::ModuleError),

    #[error("{0}")]
    Other(String),
}

/// Raised when `Context::verify` rejects a finished function body — always a
/// bug in a lowering pass, reported with the verifier's own diagnostic text
/// so it can be matched back to the offending instruction.
#[derive(Error, Debug)]
#[error("IR verification failed for function `{function}`: {detail}")]
pub struct VerificationError {
    pub function: String,
    pub detail: String,
}

/// Failures while writing an output artifact (`.clif`, `.o`, linked
/// executable).
#[derive(Error, Debug)]
pub enum EmissionError {
    #[error("io error writing {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("object emission failed: {0}")]
    Object(String),

    #[error("linker invocation failed: {0}")]
    Link(String),
}

/// Failures specific to the `jit_exec` path: ISA detection, JIT module
/// construction, or symbol resolution against the runtime bridge.
#[derive(Error, Debug)]
pub enum JITError {
    #[error("failed to detect native ISA: {0}")]
    Isa(String),

    #[error("failed to build JIT module: {0}")]
    Module(String),

    #[error("runtime error during execution: {0}")]
    Runtime(#[from] bread_runtime::RuntimeError),
}

/// Top-level error returned by the [`crate::driver::Driver`] — wraps every
/// stage so callers (the `demos` crate, tests) can match on one type.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Internal(#[from] CodegenInternalError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Emission(#[from] EmissionError),

    #[error(transparent)]
    Jit(#[from] JITError),
}

pub type CompileResult<T> = Result<T, CompileError>;
pub type DriverResult<T> = Result<T, DriverError>;

//! Errors raised by the runtime itself — bounds checks, type mismatches,
//! unresolved names — as opposed to `bread_codegen::error`, which covers
//! failures the compiler core catches before any of this code runs.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("index {index} out of bounds for length {len}")]
    Bounds { index: i64, len: usize },
    #[error("expected {expected}, got {actual}")]
    Type { expected: &'static str, actual: &'static str },
    #[error("no such key")]
    NoSuchKey,
    #[error("no such field `{0}`")]
    NoSuchField(String),
    #[error("no such method `{0}`")]
    NoSuchMethod(String),
    #[error("no such class `{0}`")]
    NoSuchClass(String),
    #[error("unsupported operator `{0}`")]
    UnsupportedOperator(char),
    #[error("division by zero")]
    DivisionByZero,
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("arity mismatch: expected {expected}, got {actual}")]
    Arity { expected: usize, actual: usize },
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

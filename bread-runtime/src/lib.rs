//! Boxed-value runtime, scope stack, and class registry consumed by
//! JIT-compiled BreadLang code.
//!
//! This crate is the external "runtime" collaborator the compiler core
//! (`bread-codegen`) targets: memory management, reference counting, the
//! scope stack, and class dispatch live here, not in the codegen crate, so
//! the JIT backend targets a real, already-built ABI rather than an
//! in-process stub.

pub mod array;
pub mod class;
pub mod dict;
pub mod error;
pub mod ops;
pub mod optional;
pub mod runtime_context;
pub mod scope;
pub mod struct_type;
pub mod value;

pub use array::BreadArray;
pub use class::{BreadClass, ClassInstance, ClassRegistry};
pub use dict::{BreadDict, Key};
pub use error::{RuntimeError, RuntimeResult};
pub use optional::BreadOptional;
pub use runtime_context::{RuntimeContext, RuntimeStatus};
pub use scope::ScopeStack;
pub use struct_type::BreadStruct;
pub use value::{BreadValue, HeapValue, VarType};

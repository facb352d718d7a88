//! Cranelift JIT compilation backend for BreadLang.
//!
//! This crate turns a [`bread_ast::Program`] — the boundary type an external
//! parser would otherwise hand it — into native code via
//! [`cranelift_codegen`], against the boxed-value runtime in
//! [`bread_runtime`]. It does not parse BreadLang source text itself; that is
//! the job of whatever sits upstream of [`driver::Driver`].
//!
//! The pieces, in the order a compilation actually uses them:
//!
//! - [`value_discipline`] — the boxing/unboxing contract every lowered
//!   expression goes through.
//! - [`scope`] — the compile-time mirror of the runtime's scope stack.
//! - [`analysis`] — type-stability, escape, and optimization-hint passes run
//!   once per program, ahead of lowering.
//! - [`cg_types`] — the compile-time records for a variable, a declared
//!   function, and a declared class.
//! - [`lowering`] — expression and statement lowering, the core of the
//!   compiler.
//! - [`class_lowering`] — method/constructor declaration and the synthesized
//!   `runtime_init_classes` pass.
//! - [`bridge`] — declares the `bread_*` runtime ABI as imports and maps each
//!   one to its address for the JIT backend.
//! - [`driver`] — ties all of the above into one compilation, then emits
//!   CLIF text, a native object, a linked executable, or runs the result
//!   immediately under a JIT.
//!
//! # Example
//!
//! ```rust,no_run
//! use bread_ast::{NodeIdGen, Program, Stmt, StmtKind, Expr, ExprKind, Literal};
//! use bread_codegen::driver::{CompileOptions, Driver, DriverOutput, EmitMode};
//!
//! let mut gen = NodeIdGen::new();
//! let greeting = Expr::new(gen.next(), ExprKind::Literal(Literal::String("hello".to_string())));
//! let program = Program::new(vec![Stmt::new(gen.next(), StmtKind::Print(greeting))]);
//!
//! let mut driver = Driver::new(CompileOptions { emit: EmitMode::Jit, ..Default::default() });
//! match driver.run(&program).unwrap() {
//!     DriverOutput::Jit(exit_code) => assert_eq!(exit_code, 0),
//!     _ => unreachable!(),
//! }
//! ```

pub mod analysis;
pub mod bridge;
pub mod cg_types;
pub mod class_lowering;
pub mod driver;
pub mod error;
pub mod lowering;
pub mod scope;
pub mod value_discipline;

pub use driver::{CompileOptions, Driver, DriverOutput, EmitMode, OptLevel};
pub use error::{CompileError, CompileResult, DriverError, DriverResult};

/// Compiles `program` and runs it immediately under a JIT, returning the exit
/// code `main` produced. A thin convenience wrapper over [`Driver`] for
/// callers (the `demos` crate, tests) that only ever want the JIT path.
pub fn eval(program: &bread_ast::Program) -> DriverResult<i32> {
    let mut driver = Driver::new(CompileOptions { emit: EmitMode::Jit, ..Default::default() });
    match driver.run(program)? {
        DriverOutput::Jit(code) => Ok(code),
        _ => unreachable!("Driver::run with EmitMode::Jit always returns DriverOutput::Jit"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bread_ast::{
        AssignOp, BinOp, Expr, ExprKind, FieldDecl, FuncDecl, ClassDecl, Literal, NodeIdGen, Param, Program, Stmt, StmtKind,
        TypeDescriptor,
    };

    fn ident(gen: &mut NodeIdGen, name: &str) -> Expr {
        Expr::new(gen.next(), ExprKind::Ident(name.to_string()))
    }

    fn lit(gen: &mut NodeIdGen, l: Literal) -> Expr {
        Expr::new(gen.next(), ExprKind::Literal(l))
    }

    #[test]
    fn if_else_runs_to_completion() {
        let mut gen = NodeIdGen::new();
        let cond = lit(&mut gen, Literal::Bool(true));
        let then_branch = vec![Stmt::new(gen.next(), StmtKind::Print(lit(&mut gen, Literal::Int(1))))];
        let else_branch = vec![Stmt::new(gen.next(), StmtKind::Print(lit(&mut gen, Literal::Int(2))))];
        let program = Program::new(vec![Stmt::new(gen.next(), StmtKind::If { cond, then_branch, else_branch })]);
        assert_eq!(eval(&program).unwrap(), 0);
    }

    #[test]
    fn while_loop_with_break_runs_to_completion() {
        let mut gen = NodeIdGen::new();
        let decl = Stmt::new(
            gen.next(),
            StmtKind::VarDecl {
                name: "i".to_string(),
                declared_type: TypeDescriptor::Int,
                init: lit(&mut gen, Literal::Int(0)),
                is_const: false,
            },
        );
        let body = vec![Stmt::new(gen.next(), StmtKind::Break)];
        let while_stmt = Stmt::new(gen.next(), StmtKind::While { cond: lit(&mut gen, Literal::Bool(true)), body });
        let program = Program::new(vec![decl, while_stmt]);
        assert_eq!(eval(&program).unwrap(), 0);
    }

    #[test]
    fn for_range_loop_runs_to_completion() {
        let mut gen = NodeIdGen::new();
        let body = vec![Stmt::new(gen.next(), StmtKind::Print(ident(&mut gen, "i")))];
        let stmt = Stmt::new(gen.next(), StmtKind::ForRange { var: "i".to_string(), start: 0, end: 3, step: 1, body });
        let program = Program::new(vec![stmt]);
        assert_eq!(eval(&program).unwrap(), 0);
    }

    #[test]
    fn for_in_over_array_literal_runs_to_completion() {
        let mut gen = NodeIdGen::new();
        let items = vec![lit(&mut gen, Literal::Int(10)), lit(&mut gen, Literal::Int(20))];
        let arr = Expr::new(gen.next(), ExprKind::ArrayLit(items));
        let body = vec![Stmt::new(gen.next(), StmtKind::Print(ident(&mut gen, "x")))];
        let stmt = Stmt::new(gen.next(), StmtKind::ForIn { var: "x".to_string(), iterable: arr, body });
        let program = Program::new(vec![stmt]);
        assert_eq!(eval(&program).unwrap(), 0);
    }

    #[test]
    fn for_in_over_dict_literal_runs_to_completion() {
        let mut gen = NodeIdGen::new();
        let entries = vec![
            (lit(&mut gen, Literal::String("a".to_string())), lit(&mut gen, Literal::Int(1))),
            (lit(&mut gen, Literal::String("b".to_string())), lit(&mut gen, Literal::Int(2))),
        ];
        let dict = Expr::new(gen.next(), ExprKind::DictLit(entries));
        let body = vec![Stmt::new(gen.next(), StmtKind::Print(ident(&mut gen, "k")))];
        let stmt = Stmt::new(gen.next(), StmtKind::ForIn { var: "k".to_string(), iterable: dict, body });
        let program = Program::new(vec![stmt]);
        assert_eq!(eval(&program).unwrap(), 0);
    }

    #[test]
    fn calling_a_function_with_a_default_parameter_runs_to_completion() {
        let mut gen = NodeIdGen::new();
        let double_param = Param { name: "x".to_string(), declared_type: TypeDescriptor::Int, default: Some(lit(&mut gen, Literal::Int(5))) };
        let ret = Stmt::new(
            gen.next(),
            StmtKind::Return(Some(Expr::new(
                gen.next(),
                ExprKind::Binary { op: BinOp::Mul, lhs: Box::new(ident(&mut gen, "x")), rhs: Box::new(lit(&mut gen, Literal::Int(2))) },
            ))),
        );
        let func = FuncDecl { id: gen.next(), name: "f".to_string(), params: vec![double_param], return_type: TypeDescriptor::Int, body: vec![ret] };
        let func_decl = Stmt::new(gen.next(), StmtKind::FuncDecl(func));
        let call = Expr::new(gen.next(), ExprKind::Call { callee: "f".to_string(), args: vec![] });
        let print = Stmt::new(gen.next(), StmtKind::Print(call));
        let program = Program::new(vec![func_decl, print]);
        assert_eq!(eval(&program).unwrap(), 0);
    }

    #[test]
    fn constructing_a_class_instance_and_calling_a_method_runs_to_completion() {
        let mut gen = NodeIdGen::new();
        let field = FieldDecl { name: "value".to_string(), declared_type: TypeDescriptor::Int };
        let assign_self_value = Stmt::new(
            gen.next(),
            StmtKind::MemberAssign {
                target: Expr::new(gen.next(), ExprKind::SelfExpr),
                name: "value".to_string(),
                op: AssignOp::Set,
                value: ident(&mut gen, "value"),
            },
        );
        let ctor = FuncDecl {
            id: gen.next(),
            name: "init".to_string(),
            params: vec![Param { name: "value".to_string(), declared_type: TypeDescriptor::Int, default: None }],
            return_type: TypeDescriptor::Nil,
            body: vec![assign_self_value],
        };
        let describe_body = vec![Stmt::new(
            gen.next(),
            StmtKind::Print(Expr::new(
                gen.next(),
                ExprKind::Member { target: Box::new(Expr::new(gen.next(), ExprKind::SelfExpr)), name: "value".to_string(), is_optional: false },
            )),
        )];
        let describe = FuncDecl { id: gen.next(), name: "describe".to_string(), params: vec![], return_type: TypeDescriptor::Nil, body: describe_body };
        let class = ClassDecl { id: gen.next(), name: "Box".to_string(), parent: None, fields: vec![field], methods: vec![describe], constructor: Some(ctor) };
        let class_decl = Stmt::new(gen.next(), StmtKind::ClassDecl(class));

        let ctor_call = Expr::new(gen.next(), ExprKind::Call { callee: "Box".to_string(), args: vec![lit(&mut gen, Literal::Int(7))] });
        let make = Stmt::new(
            gen.next(),
            StmtKind::VarDecl { name: "b".to_string(), declared_type: TypeDescriptor::Class("Box".to_string()), init: ctor_call, is_const: false },
        );
        let call_describe = Stmt::new(
            gen.next(),
            StmtKind::ExprStmt(Expr::new(
                gen.next(),
                ExprKind::MethodCall { target: Box::new(ident(&mut gen, "b")), name: "describe".to_string(), args: vec![], is_optional: false },
            )),
        );
        let program = Program::new(vec![class_decl, make, call_describe]);
        assert_eq!(eval(&program).unwrap(), 0);
    }
}

//! `let x: Int = 2 + 3; print(x)` — prints `5`.

use bread_ast::{BinOp, Expr, ExprKind, Literal, NodeIdGen, Program, Stmt, StmtKind, TypeDescriptor};

fn main() {
    let mut gen = NodeIdGen::new();
    let sum = Expr::new(
        gen.next(),
        ExprKind::Binary {
            op: BinOp::Add,
            lhs: Box::new(Expr::new(gen.next(), ExprKind::Literal(Literal::Int(2)))),
            rhs: Box::new(Expr::new(gen.next(), ExprKind::Literal(Literal::Int(3)))),
        },
    );
    let decl = Stmt::new(
        gen.next(),
        StmtKind::VarDecl { name: "x".to_string(), declared_type: TypeDescriptor::Int, init: sum, is_const: false },
    );
    let print = Stmt::new(gen.next(), StmtKind::Print(Expr::new(gen.next(), ExprKind::Ident("x".to_string()))));

    let program = Program::new(vec![decl, print]);
    let exit_code = bread_codegen::eval(&program).expect("arithmetic program should compile and run");
    std::process::exit(exit_code);
}

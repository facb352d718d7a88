//! `let d = ["a":1, "b":2]; for k in d { print(k) }` — prints `a` and `b`,
//! one per line, in whatever order the dict's insertion-order table gives
//! (stable across runs of the same build, not contractually "a" then "b").

use bread_ast::{Expr, ExprKind, Literal, NodeIdGen, Program, Stmt, StmtKind, TypeDescriptor};

fn main() {
    let mut gen = NodeIdGen::new();

    let entries = vec![
        (Expr::new(gen.next(), ExprKind::Literal(Literal::String("a".to_string()))), Expr::new(gen.next(), ExprKind::Literal(Literal::Int(1)))),
        (Expr::new(gen.next(), ExprKind::Literal(Literal::String("b".to_string()))), Expr::new(gen.next(), ExprKind::Literal(Literal::Int(2)))),
    ];
    let dict_lit = Expr::new(gen.next(), ExprKind::DictLit(entries));
    let let_d = Stmt::new(
        gen.next(),
        StmtKind::VarDecl {
            name: "d".to_string(),
            declared_type: TypeDescriptor::Dict(Box::new(TypeDescriptor::String), Box::new(TypeDescriptor::Int)),
            init: dict_lit,
            is_const: false,
        },
    );

    let body = vec![Stmt::new(gen.next(), StmtKind::Print(Expr::new(gen.next(), ExprKind::Ident("k".to_string()))))];
    let for_in = Stmt::new(
        gen.next(),
        StmtKind::ForIn { var: "k".to_string(), iterable: Expr::new(gen.next(), ExprKind::Ident("d".to_string())), body },
    );

    let program = Program::new(vec![let_d, for_in]);
    let exit_code = bread_codegen::eval(&program).expect("dict-iteration program should compile and run");
    std::process::exit(exit_code);
}

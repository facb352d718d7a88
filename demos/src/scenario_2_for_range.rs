//! `for i in range(0, 3, 1) { print(i) }` — prints `0`, `1`, `2`.

use bread_ast::{Expr, ExprKind, NodeIdGen, Program, Stmt, StmtKind};

fn main() {
    let mut gen = NodeIdGen::new();
    let body = vec![Stmt::new(gen.next(), StmtKind::Print(Expr::new(gen.next(), ExprKind::Ident("i".to_string()))))];
    let loop_stmt = Stmt::new(gen.next(), StmtKind::ForRange { var: "i".to_string(), start: 0, end: 3, step: 1, body });

    let program = Program::new(vec![loop_stmt]);
    let exit_code = bread_codegen::eval(&program).expect("for-range program should compile and run");
    std::process::exit(exit_code);
}

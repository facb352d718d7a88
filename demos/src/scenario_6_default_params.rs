//! `def f(x: Int = 5) -> Int { return x * 2 } print(f()); print(f(3))` —
//! prints `10` then `6`.

use bread_ast::{BinOp, Expr, ExprKind, FuncDecl, Literal, NodeIdGen, Param, Program, Stmt, StmtKind, TypeDescriptor};

fn main() {
    let mut gen = NodeIdGen::new();

    let double_x = Expr::new(
        gen.next(),
        ExprKind::Binary {
            op: BinOp::Mul,
            lhs: Box::new(Expr::new(gen.next(), ExprKind::Ident("x".to_string()))),
            rhs: Box::new(Expr::new(gen.next(), ExprKind::Literal(Literal::Int(2)))),
        },
    );
    let return_stmt = Stmt::new(gen.next(), StmtKind::Return(Some(double_x)));
    let param = Param {
        name: "x".to_string(),
        declared_type: TypeDescriptor::Int,
        default: Some(Expr::new(gen.next(), ExprKind::Literal(Literal::Int(5)))),
    };
    let f = FuncDecl { id: gen.next(), name: "f".to_string(), params: vec![param], return_type: TypeDescriptor::Int, body: vec![return_stmt] };
    let func_decl = Stmt::new(gen.next(), StmtKind::FuncDecl(f));

    let call_default = Expr::new(gen.next(), ExprKind::Call { callee: "f".to_string(), args: vec![] });
    let print_default = Stmt::new(gen.next(), StmtKind::Print(call_default));

    let call_explicit = Expr::new(
        gen.next(),
        ExprKind::Call { callee: "f".to_string(), args: vec![Expr::new(gen.next(), ExprKind::Literal(Literal::Int(3)))] },
    );
    let print_explicit = Stmt::new(gen.next(), StmtKind::Print(call_explicit));

    let program = Program::new(vec![func_decl, print_default, print_explicit]);
    let exit_code = bread_codegen::eval(&program).expect("default-parameter program should compile and run");
    std::process::exit(exit_code);
}

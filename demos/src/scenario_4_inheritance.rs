//! `class A { fn hi() { print(1) } } class B : A { } let b = B(); b.hi()` —
//! prints `1`. `B` declares no constructor and no methods of its own; the
//! call dispatches through to `A`'s compiled `hi`.

use bread_ast::{ClassDecl, Expr, ExprKind, FuncDecl, Literal, NodeIdGen, Program, Stmt, StmtKind, TypeDescriptor};

fn main() {
    let mut gen = NodeIdGen::new();

    let print_one = Stmt::new(gen.next(), StmtKind::Print(Expr::new(gen.next(), ExprKind::Literal(Literal::Int(1)))));
    let hi_method = FuncDecl { id: gen.next(), name: "hi".to_string(), params: vec![], return_type: TypeDescriptor::Nil, body: vec![print_one] };
    let class_a = ClassDecl { id: gen.next(), name: "A".to_string(), parent: None, fields: vec![], methods: vec![hi_method], constructor: None };
    let class_a_decl = Stmt::new(gen.next(), StmtKind::ClassDecl(class_a));

    let class_b = ClassDecl { id: gen.next(), name: "B".to_string(), parent: Some("A".to_string()), fields: vec![], methods: vec![], constructor: None };
    let class_b_decl = Stmt::new(gen.next(), StmtKind::ClassDecl(class_b));

    let construct_b = Expr::new(gen.next(), ExprKind::Call { callee: "B".to_string(), args: vec![] });
    let let_b = Stmt::new(
        gen.next(),
        StmtKind::VarDecl { name: "b".to_string(), declared_type: TypeDescriptor::Class("B".to_string()), init: construct_b, is_const: false },
    );

    let call_hi = Expr::new(
        gen.next(),
        ExprKind::MethodCall { target: Box::new(Expr::new(gen.next(), ExprKind::Ident("b".to_string()))), name: "hi".to_string(), args: vec![], is_optional: false },
    );
    let call_stmt = Stmt::new(gen.next(), StmtKind::ExprStmt(call_hi));

    let program = Program::new(vec![class_a_decl, class_b_decl, let_b, call_stmt]);
    let exit_code = bread_codegen::eval(&program).expect("inherited-method dispatch program should compile and run");
    std::process::exit(exit_code);
}

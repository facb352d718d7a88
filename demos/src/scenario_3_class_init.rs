//! `class A { init(x: Int) { self.x = x } fn get() -> Int { return self.x } }`
//! `let a = A(7); print(a.get())` — prints `7`.

use bread_ast::{
    AssignOp, ClassDecl, Expr, ExprKind, FieldDecl, FuncDecl, NodeIdGen, Param, Program, Stmt, StmtKind, TypeDescriptor,
};

fn main() {
    let mut gen = NodeIdGen::new();

    let assign_x = Stmt::new(
        gen.next(),
        StmtKind::MemberAssign {
            target: Expr::new(gen.next(), ExprKind::SelfExpr),
            name: "x".to_string(),
            op: AssignOp::Set,
            value: Expr::new(gen.next(), ExprKind::Ident("x".to_string())),
        },
    );
    let ctor = FuncDecl {
        id: gen.next(),
        name: "init".to_string(),
        params: vec![Param { name: "x".to_string(), declared_type: TypeDescriptor::Int, default: None }],
        return_type: TypeDescriptor::Nil,
        body: vec![assign_x],
    };

    let return_x = Stmt::new(
        gen.next(),
        StmtKind::Return(Some(Expr::new(
            gen.next(),
            ExprKind::Member { target: Box::new(Expr::new(gen.next(), ExprKind::SelfExpr)), name: "x".to_string(), is_optional: false },
        ))),
    );
    let get_method = FuncDecl { id: gen.next(), name: "get".to_string(), params: vec![], return_type: TypeDescriptor::Int, body: vec![return_x] };

    let class_a = ClassDecl {
        id: gen.next(),
        name: "A".to_string(),
        parent: None,
        fields: vec![FieldDecl { name: "x".to_string(), declared_type: TypeDescriptor::Int }],
        methods: vec![get_method],
        constructor: Some(ctor),
    };
    let class_decl = Stmt::new(gen.next(), StmtKind::ClassDecl(class_a));

    let construct_a = Expr::new(
        gen.next(),
        ExprKind::Call { callee: "A".to_string(), args: vec![Expr::new(gen.next(), ExprKind::Literal(bread_ast::Literal::Int(7)))] },
    );
    let let_a = Stmt::new(
        gen.next(),
        StmtKind::VarDecl { name: "a".to_string(), declared_type: TypeDescriptor::Class("A".to_string()), init: construct_a, is_const: false },
    );

    let call_get = Expr::new(
        gen.next(),
        ExprKind::MethodCall { target: Box::new(Expr::new(gen.next(), ExprKind::Ident("a".to_string()))), name: "get".to_string(), args: vec![], is_optional: false },
    );
    let print_result = Stmt::new(gen.next(), StmtKind::Print(call_get));

    let program = Program::new(vec![class_decl, let_a, print_result]);
    let exit_code = bread_codegen::eval(&program).expect("class constructor/method program should compile and run");
    std::process::exit(exit_code);
}

//! Escape analysis: decides, per expression, whether the value
//! it produces can live in a stack slot for the lifetime of the enclosing
//! function or must be heap-backed and refcounted because it outlives that
//! frame (returned, captured into a container, or passed to a callee that
//! might retain it).

use bread_ast::{Expr, ExprKind, Program, Stmt, StmtKind};
use hashbrown::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeKind {
    Unknown,
    None,
    Return,
    Parameter,
    Global,
    Heap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscapeInfo {
    pub escape_kind: EscapeKind,
    pub can_stack_allocate: bool,
}

impl EscapeInfo {
    fn new(kind: EscapeKind) -> Self {
        EscapeInfo { escape_kind: kind, can_stack_allocate: kind == EscapeKind::None }
    }
}

/// Walks the AST once, classifying every expression node. Containers
/// (`ArrayLit`/`DictLit`) and their transitive contents always escape to the
/// heap; an `Index`/`Member`
/// read off a heap-escaping base inherits `Heap` too, since its result may
/// alias storage the container owns.
pub struct EscapeAnalyzer {
    info: HashMap<bread_ast::NodeId, EscapeInfo>,
}

impl EscapeAnalyzer {
    pub fn analyze_program(program: &Program) -> HashMap<bread_ast::NodeId, EscapeInfo> {
        let mut a = EscapeAnalyzer { info: HashMap::new() };
        a.walk_stmts(&program.statements);
        a.info
    }

    fn walk_stmts(&mut self, stmts: &[Stmt]) {
        for s in stmts {
            self.walk_stmt(s);
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::VarDecl { init, .. } => {
                self.walk_expr(init, EscapeKind::None);
            }
            StmtKind::Assign { value, .. } => {
                self.walk_expr(value, EscapeKind::None);
            }
            StmtKind::IndexAssign { target, index, value, .. } => {
                self.walk_expr(target, EscapeKind::Heap);
                self.walk_expr(index, EscapeKind::None);
                self.walk_expr(value, EscapeKind::Heap);
            }
            StmtKind::MemberAssign { target, value, .. } => {
                self.walk_expr(target, EscapeKind::Heap);
                self.walk_expr(value, EscapeKind::Heap);
            }
            StmtKind::Print(e) | StmtKind::ExprStmt(e) => {
                self.walk_expr(e, EscapeKind::None);
            }
            StmtKind::If { cond, then_branch, else_branch } => {
                self.walk_expr(cond, EscapeKind::None);
                self.walk_stmts(then_branch);
                self.walk_stmts(else_branch);
            }
            StmtKind::While { cond, body } => {
                self.walk_expr(cond, EscapeKind::None);
                self.walk_stmts(body);
            }
            StmtKind::ForRange { body, .. } => {
                self.walk_stmts(body);
            }
            StmtKind::ForIn { iterable, body, .. } => {
                self.walk_expr(iterable, EscapeKind::None);
                self.walk_stmts(body);
            }
            StmtKind::Return(Some(e)) => {
                self.walk_expr(e, EscapeKind::Return);
            }
            StmtKind::Return(None) | StmtKind::Break | StmtKind::Continue => {}
            StmtKind::FuncDecl(f) => self.walk_stmts(&f.body),
            StmtKind::ClassDecl(c) => {
                for m in c.methods.iter().chain(c.constructor.iter()) {
                    self.walk_stmts(&m.body);
                }
            }
        }
    }

    /// `ctx` is the escape kind imposed on `e` by its position (assigned to a
    /// local, returned, passed as a call argument, read off a heap base).
    /// Container literals and call results upgrade their own classification
    /// regardless of `ctx` — they are always heap-resident once created.
    fn walk_expr(&mut self, e: &Expr, ctx: EscapeKind) -> EscapeKind {
        let kind = match &e.kind {
            ExprKind::Literal(_) => EscapeKind::None,
            ExprKind::Ident(_) | ExprKind::SelfExpr | ExprKind::Super => ctx,
            ExprKind::Unary { operand, .. } => self.walk_expr(operand, ctx),
            ExprKind::Binary { lhs, rhs, .. } => {
                let l = self.walk_expr(lhs, EscapeKind::None);
                let r = self.walk_expr(rhs, EscapeKind::None);
                if l == EscapeKind::Heap || r == EscapeKind::Heap {
                    EscapeKind::Heap
                } else {
                    ctx
                }
            }
            ExprKind::Index { target, index } => {
                let t = self.walk_expr(target, EscapeKind::Heap);
                self.walk_expr(index, EscapeKind::None);
                if t == EscapeKind::Heap { EscapeKind::Heap } else { ctx }
            }
            ExprKind::Member { target, .. } => {
                let t = self.walk_expr(target, EscapeKind::Heap);
                if t == EscapeKind::Heap { EscapeKind::Heap } else { ctx }
            }
            ExprKind::MethodCall { target, args, .. } => {
                self.walk_expr(target, EscapeKind::Heap);
                for a in args {
                    self.walk_expr(a, EscapeKind::Parameter);
                }
                EscapeKind::Heap
            }
            ExprKind::Call { args, .. } => {
                for a in args {
                    self.walk_expr(a, EscapeKind::Parameter);
                }
                EscapeKind::Heap
            }
            ExprKind::ArrayLit(items) => {
                for i in items {
                    self.walk_expr(i, EscapeKind::Heap);
                }
                EscapeKind::Heap
            }
            ExprKind::DictLit(pairs) => {
                for (k, v) in pairs {
                    self.walk_expr(k, EscapeKind::Heap);
                    self.walk_expr(v, EscapeKind::Heap);
                }
                EscapeKind::Heap
            }
            ExprKind::StructLit { fields, .. } | ExprKind::ClassLit { fields, .. } => {
                for (_, v) in fields {
                    self.walk_expr(v, EscapeKind::Heap);
                }
                EscapeKind::Heap
            }
        };
        self.info.insert(e.id, EscapeInfo::new(kind));
        kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bread_ast::{Literal, NodeId, TypeDescriptor};

    #[test]
    fn literal_does_not_escape() {
        let e = Expr::new(NodeId(0), ExprKind::Literal(Literal::Int(1)));
        let prog = Program::new(vec![Stmt::new(NodeId(1), StmtKind::ExprStmt(e))]);
        let info = EscapeAnalyzer::analyze_program(&prog);
        assert!(info.get(&NodeId(0)).unwrap().can_stack_allocate);
    }

    #[test]
    fn array_literal_escapes_to_heap() {
        let lit = Expr::new(NodeId(0), ExprKind::ArrayLit(vec![Expr::new(NodeId(1), ExprKind::Literal(Literal::Int(1)))]));
        let decl = Stmt::new(
            NodeId(2),
            StmtKind::VarDecl { name: "a".into(), declared_type: TypeDescriptor::Unknown, init: lit, is_const: false },
        );
        let prog = Program::new(vec![decl]);
        let info = EscapeAnalyzer::analyze_program(&prog);
        assert_eq!(info.get(&NodeId(0)).unwrap().escape_kind, EscapeKind::Heap);
        assert!(!info.get(&NodeId(0)).unwrap().can_stack_allocate);
    }

    #[test]
    fn returned_local_escapes() {
        let ret = Stmt::new(NodeId(0), StmtKind::Return(Some(Expr::new(NodeId(1), ExprKind::Ident("x".into())))));
        let prog = Program::new(vec![ret]);
        let info = EscapeAnalyzer::analyze_program(&prog);
        assert_eq!(info.get(&NodeId(1)).unwrap().escape_kind, EscapeKind::Return);
    }
}

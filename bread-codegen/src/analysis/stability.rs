//! Type-stability analysis: classifies every expression as
//! `Stable`/`Conditional`/`Unstable`/`Unknown` plus a best-effort primitive
//! type, so `lowering::expr` knows when it is worth attempting the unboxed
//! fast path (stability ≥ `Conditional`).

use bread_ast::{BinOp, Expr, ExprKind, Program, Stmt, StmtKind, TypeDescriptor};
use hashbrown::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stability {
    Unknown,
    Unstable,
    Conditional,
    Stable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StabilityInfo {
    pub ty: TypeDescriptor,
    pub stability: Stability,
    pub is_constant: bool,
}

#[derive(Debug, Clone)]
struct VarFacts {
    ty: TypeDescriptor,
    is_const: bool,
    mutation_count: u32,
    declared_in_loop: bool,
}

/// Tracks a depth-scoped variable environment, entering and leaving a level
/// on `if`/`while`/`for`/function bodies, plus a loop-nesting counter, and
/// emits one [`StabilityInfo`] per expression node visited.
pub struct StabilityAnalyzer {
    info: HashMap<bread_ast::NodeId, StabilityInfo>,
    env: Vec<HashMap<String, VarFacts>>,
    loop_depth: u32,
}

impl StabilityAnalyzer {
    pub fn analyze_program(program: &Program) -> HashMap<bread_ast::NodeId, StabilityInfo> {
        let mut a = StabilityAnalyzer { info: HashMap::new(), env: vec![HashMap::new()], loop_depth: 0 };
        a.walk_stmts(&program.statements);
        a.info
    }

    fn push_scope(&mut self) {
        self.env.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.env.pop();
    }

    fn declare(&mut self, name: &str, ty: TypeDescriptor, is_const: bool) {
        let in_loop = self.loop_depth > 0;
        self.env.last_mut().unwrap().insert(
            name.to_string(),
            VarFacts { ty, is_const, mutation_count: 0, declared_in_loop: in_loop },
        );
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut VarFacts> {
        self.env.iter_mut().rev().find_map(|lvl| lvl.get_mut(name))
    }

    fn find(&self, name: &str) -> Option<&VarFacts> {
        self.env.iter().rev().find_map(|lvl| lvl.get(name))
    }

    fn record_mutation(&mut self, name: &str) {
        if let Some(f) = self.find_mut(name) {
            f.mutation_count += 1;
        }
    }

    fn walk_stmts(&mut self, stmts: &[Stmt]) {
        for s in stmts {
            self.walk_stmt(s);
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::VarDecl { name, declared_type, init, is_const } => {
                self.walk_expr(init);
                self.declare(name, declared_type.clone(), *is_const);
            }
            StmtKind::Assign { name, value, .. } => {
                self.walk_expr(value);
                self.record_mutation(name);
            }
            StmtKind::IndexAssign { target, index, value, .. } => {
                self.walk_expr(target);
                self.walk_expr(index);
                self.walk_expr(value);
            }
            StmtKind::MemberAssign { target, value, .. } => {
                self.walk_expr(target);
                self.walk_expr(value);
            }
            StmtKind::Print(e) | StmtKind::ExprStmt(e) => self.walk_expr(e),
            StmtKind::If { cond, then_branch, else_branch } => {
                self.walk_expr(cond);
                self.push_scope();
                self.walk_stmts(then_branch);
                self.pop_scope();
                self.push_scope();
                self.walk_stmts(else_branch);
                self.pop_scope();
            }
            StmtKind::While { cond, body } => {
                self.walk_expr(cond);
                self.loop_depth += 1;
                self.push_scope();
                self.walk_stmts(body);
                self.pop_scope();
                self.loop_depth -= 1;
            }
            StmtKind::ForRange { var, body, .. } => {
                self.loop_depth += 1;
                self.push_scope();
                self.declare(var, TypeDescriptor::Int, false);
                self.walk_stmts(body);
                self.pop_scope();
                self.loop_depth -= 1;
            }
            StmtKind::ForIn { var, iterable, body } => {
                self.walk_expr(iterable);
                self.loop_depth += 1;
                self.push_scope();
                self.declare(var, TypeDescriptor::Unknown, false);
                self.walk_stmts(body);
                self.pop_scope();
                self.loop_depth -= 1;
            }
            StmtKind::Return(Some(e)) => self.walk_expr(e),
            StmtKind::Return(None) | StmtKind::Break | StmtKind::Continue => {}
            StmtKind::FuncDecl(f) => {
                self.push_scope();
                for p in &f.params {
                    self.declare(&p.name, p.declared_type.clone(), false);
                }
                let saved_depth = self.loop_depth;
                self.loop_depth = 0;
                self.walk_stmts(&f.body);
                self.loop_depth = saved_depth;
                self.pop_scope();
            }
            StmtKind::ClassDecl(c) => {
                for m in c.methods.iter().chain(c.constructor.iter()) {
                    self.push_scope();
                    for p in &m.params {
                        self.declare(&p.name, p.declared_type.clone(), false);
                    }
                    let saved_depth = self.loop_depth;
                    self.loop_depth = 0;
                    self.walk_stmts(&m.body);
                    self.loop_depth = saved_depth;
                    self.pop_scope();
                }
            }
        }
    }

    /// Classifies `e` and every sub-expression, inserting one entry per node
    /// into `self.info`. Returns the classification for `e` itself so
    /// callers composing binary/unary rules can read it back immediately.
    fn walk_expr(&mut self, e: &Expr) -> (TypeDescriptor, Stability, bool) {
        let (ty, stability, is_constant) = match &e.kind {
            ExprKind::Literal(lit) => (literal_type(lit), Stability::Stable, true),
            ExprKind::Ident(name) => match self.find(name) {
                Some(f) if f.is_const => (f.ty.clone(), Stability::Stable, false),
                Some(f) if f.mutation_count == 0 => (f.ty.clone(), Stability::Stable, false),
                Some(f) if f.mutation_count <= 1 && !f.declared_in_loop && self.loop_depth == 0 => {
                    (f.ty.clone(), Stability::Conditional, false)
                }
                Some(f) => (f.ty.clone(), Stability::Unstable, false),
                None => (TypeDescriptor::Unknown, Stability::Unstable, false),
            },
            ExprKind::SelfExpr | ExprKind::Super => (TypeDescriptor::Unknown, Stability::Unstable, false),
            ExprKind::Unary { operand, .. } => {
                let (ty, st, c) = self.walk_expr(operand);
                (ty, st, c)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let (lty, lst, lc) = self.walk_expr(lhs);
                let (rty, rst, rc) = self.walk_expr(rhs);
                let result_ty = binary_result_type(*op, &lty, &rty);
                let st = if lst == Stability::Stable && rst == Stability::Stable {
                    Stability::Stable
                } else if lst >= Stability::Conditional && rst >= Stability::Conditional {
                    Stability::Conditional
                } else {
                    Stability::Unstable
                };
                let ty = if st == Stability::Unstable { TypeDescriptor::Unknown } else { result_ty };
                (ty, st, lc && rc)
            }
            ExprKind::Index { target, index } => {
                self.walk_expr(target);
                self.walk_expr(index);
                (TypeDescriptor::Unknown, Stability::Unstable, false)
            }
            ExprKind::Member { target, .. } => {
                self.walk_expr(target);
                (TypeDescriptor::Unknown, Stability::Unstable, false)
            }
            ExprKind::MethodCall { target, args, .. } => {
                self.walk_expr(target);
                for a in args {
                    self.walk_expr(a);
                }
                (TypeDescriptor::Unknown, Stability::Unstable, false)
            }
            ExprKind::Call { args, .. } => {
                for a in args {
                    self.walk_expr(a);
                }
                (TypeDescriptor::Unknown, Stability::Unstable, false)
            }
            ExprKind::ArrayLit(items) => {
                for i in items {
                    self.walk_expr(i);
                }
                (TypeDescriptor::Array(Box::new(TypeDescriptor::Unknown)), Stability::Unstable, false)
            }
            ExprKind::DictLit(pairs) => {
                for (k, v) in pairs {
                    self.walk_expr(k);
                    self.walk_expr(v);
                }
                (
                    TypeDescriptor::Dict(Box::new(TypeDescriptor::Unknown), Box::new(TypeDescriptor::Unknown)),
                    Stability::Unstable,
                    false,
                )
            }
            ExprKind::StructLit { type_name, fields } => {
                for (_, v) in fields {
                    self.walk_expr(v);
                }
                (TypeDescriptor::Struct { name: type_name.clone(), fields: vec![] }, Stability::Unstable, false)
            }
            ExprKind::ClassLit { type_name, fields } => {
                for (_, v) in fields {
                    self.walk_expr(v);
                }
                (TypeDescriptor::Class(type_name.clone()), Stability::Unstable, false)
            }
        };
        self.info.insert(e.id, StabilityInfo { ty: ty.clone(), stability, is_constant });
        (ty, stability, is_constant)
    }
}

fn literal_type(lit: &bread_ast::Literal) -> TypeDescriptor {
    match lit {
        bread_ast::Literal::Nil => TypeDescriptor::Nil,
        bread_ast::Literal::Bool(_) => TypeDescriptor::Bool,
        bread_ast::Literal::Int(_) => TypeDescriptor::Int,
        bread_ast::Literal::Double(_) => TypeDescriptor::Double,
        bread_ast::Literal::String(_) => TypeDescriptor::String,
    }
}

fn binary_result_type(op: BinOp, lhs: &TypeDescriptor, rhs: &TypeDescriptor) -> TypeDescriptor {
    if op.is_comparison() || matches!(op, BinOp::And | BinOp::Or) {
        return TypeDescriptor::Bool;
    }
    match (lhs, rhs) {
        (TypeDescriptor::Int, TypeDescriptor::Int) => TypeDescriptor::Int,
        (TypeDescriptor::Double, TypeDescriptor::Double)
        | (TypeDescriptor::Int, TypeDescriptor::Double)
        | (TypeDescriptor::Double, TypeDescriptor::Int) => TypeDescriptor::Double,
        (TypeDescriptor::String, _) | (_, TypeDescriptor::String) if op == BinOp::Add => TypeDescriptor::String,
        _ => TypeDescriptor::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bread_ast::{Literal, NodeId, Stmt, StmtKind};

    #[test]
    fn literal_is_stable() {
        let e = Expr::new(NodeId(0), ExprKind::Literal(Literal::Int(5)));
        let prog = Program::new(vec![Stmt::new(NodeId(1), StmtKind::ExprStmt(e.clone()))]);
        let info = StabilityAnalyzer::analyze_program(&prog);
        assert_eq!(info.get(&NodeId(0)).unwrap().stability, Stability::Stable);
    }

    #[test]
    fn mutated_var_in_loop_is_unstable() {
        let decl = Stmt::new(
            NodeId(0),
            StmtKind::VarDecl {
                name: "x".into(),
                declared_type: TypeDescriptor::Int,
                init: Expr::new(NodeId(1), ExprKind::Literal(Literal::Int(0))),
                is_const: false,
            },
        );
        let read = Expr::new(NodeId(2), ExprKind::Ident("x".into()));
        let body = vec![
            Stmt::new(
                NodeId(3),
                StmtKind::Assign { name: "x".into(), op: bread_ast::AssignOp::Set, value: Expr::new(NodeId(4), ExprKind::Literal(Literal::Int(1))) },
            ),
            Stmt::new(NodeId(5), StmtKind::ExprStmt(read.clone())),
        ];
        let loop_stmt = Stmt::new(NodeId(6), StmtKind::While { cond: Expr::new(NodeId(7), ExprKind::Literal(Literal::Bool(true))), body });
        let prog = Program::new(vec![decl, loop_stmt]);
        let info = StabilityAnalyzer::analyze_program(&prog);
        assert_eq!(info.get(&NodeId(2)).unwrap().stability, Stability::Unstable);
    }
}

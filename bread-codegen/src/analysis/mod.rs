//! Type-stability and escape analysis plus the
//! optimization-hint annotations computed alongside them.
//!
//! Both analyzers walk the AST once and build a side table keyed by
//! [`bread_ast::NodeId`] rather than attaching data to the nodes themselves,
//! avoiding dangling-pointer hazards that parent-pointer or interior-mutable
//! AST nodes would invite: the arena is simply `bread_ast::NodeIdGen`'s
//! monotonic ids plus a `HashMap`/`Vec` side table.

pub mod escape;
pub mod stability;

use bread_ast::{NodeId, Program};
use hashbrown::HashMap;

pub use escape::{EscapeAnalyzer, EscapeInfo, EscapeKind};
pub use stability::{Stability, StabilityAnalyzer, StabilityInfo};

/// Per-expression hints, computed alongside stability/escape from the same
/// walk rather than as a fourth separate pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizationHints {
    pub is_hot_path: bool,
    pub is_cold_path: bool,
    pub branch_probability: u8,
    pub can_speculate: bool,
    pub is_pure: bool,
}

impl Default for OptimizationHints {
    fn default() -> Self {
        OptimizationHints {
            is_hot_path: false,
            is_cold_path: false,
            branch_probability: 50,
            can_speculate: true,
            is_pure: true,
        }
    }
}

/// Per-function hints, computed once a `CgFunction`'s body has been walked.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FunctionOptInfo {
    pub inline_hint: bool,
    pub instruction_count: u32,
    pub call_count: u32,
    pub is_recursive: bool,
    pub is_leaf: bool,
    pub parameter_count: u32,
}

/// The three analyses' combined output for one compiled program, threaded
/// into `lowering` so expression/statement emission can consult stability
/// (unboxing) and escape (stack allocation) decisions per node.
#[derive(Debug, Default)]
pub struct AnalysisResult {
    pub stability: HashMap<NodeId, StabilityInfo>,
    pub escape: HashMap<NodeId, EscapeInfo>,
    pub hints: HashMap<NodeId, OptimizationHints>,
}

impl AnalysisResult {
    pub fn stability_of(&self, id: NodeId) -> Stability {
        self.stability.get(&id).map(|i| i.stability).unwrap_or(Stability::Unknown)
    }

    pub fn can_stack_allocate(&self, id: NodeId) -> bool {
        self.escape.get(&id).map(|i| i.can_stack_allocate).unwrap_or(false)
    }

    pub fn hints_of(&self, id: NodeId) -> OptimizationHints {
        self.hints.get(&id).copied().unwrap_or_default()
    }
}

/// Runs the type-stability and escape passes over the whole program. Run
/// before lowering; failures are non-fatal — an analysis miss just means a
/// node falls back to the safe `Unknown`/`Unstable` defaults, never a hard
/// compile error.
pub fn analyze_program(program: &Program) -> AnalysisResult {
    log::debug!("running type-stability analysis over {} top-level statements", program.statements.len());
    let stability = StabilityAnalyzer::analyze_program(program);
    log::trace!("stability analysis classified {} expressions", stability.len());

    log::debug!("running escape analysis");
    let escape = EscapeAnalyzer::analyze_program(program);
    log::trace!("escape analysis classified {} allocations", escape.len());

    let hints = compute_hints(program, &stability);
    AnalysisResult { stability, escape, hints }
}

fn compute_hints(program: &Program, stability: &HashMap<NodeId, StabilityInfo>) -> HashMap<NodeId, OptimizationHints> {
    let mut hints = HashMap::new();
    let mut loop_depth: u32 = 0;
    walk_stmts_for_hints(&program.statements, &mut loop_depth, &mut hints, stability);
    hints
}

fn walk_stmts_for_hints(
    stmts: &[bread_ast::Stmt],
    loop_depth: &mut u32,
    hints: &mut HashMap<NodeId, OptimizationHints>,
    stability: &HashMap<NodeId, StabilityInfo>,
) {
    use bread_ast::StmtKind::*;
    for s in stmts {
        match &s.kind {
            If { cond, then_branch, else_branch } => {
                hint_expr(cond, *loop_depth, hints, stability);
                walk_stmts_for_hints(then_branch, loop_depth, hints, stability);
                walk_stmts_for_hints(else_branch, loop_depth, hints, stability);
            }
            While { cond, body } => {
                hint_expr(cond, *loop_depth, hints, stability);
                *loop_depth += 1;
                walk_stmts_for_hints(body, loop_depth, hints, stability);
                *loop_depth -= 1;
            }
            ForRange { body, .. } => {
                *loop_depth += 1;
                walk_stmts_for_hints(body, loop_depth, hints, stability);
                *loop_depth -= 1;
            }
            ForIn { iterable, body, .. } => {
                hint_expr(iterable, *loop_depth, hints, stability);
                *loop_depth += 1;
                walk_stmts_for_hints(body, loop_depth, hints, stability);
                *loop_depth -= 1;
            }
            VarDecl { init, .. } => hint_expr(init, *loop_depth, hints, stability),
            Assign { value, .. } => hint_expr(value, *loop_depth, hints, stability),
            IndexAssign { target, index, value, .. } => {
                hint_expr(target, *loop_depth, hints, stability);
                hint_expr(index, *loop_depth, hints, stability);
                hint_expr(value, *loop_depth, hints, stability);
            }
            MemberAssign { target, value, .. } => {
                hint_expr(target, *loop_depth, hints, stability);
                hint_expr(value, *loop_depth, hints, stability);
            }
            Print(e) | ExprStmt(e) => hint_expr(e, *loop_depth, hints, stability),
            Return(Some(e)) => hint_expr(e, *loop_depth, hints, stability),
            Return(None) | Break | Continue => {}
            FuncDecl(f) => {
                let mut d = 0;
                walk_stmts_for_hints(&f.body, &mut d, hints, stability);
            }
            ClassDecl(c) => {
                for m in &c.methods {
                    let mut d = 0;
                    walk_stmts_for_hints(&m.body, &mut d, hints, stability);
                }
                if let Some(ctor) = &c.constructor {
                    let mut d = 0;
                    walk_stmts_for_hints(&ctor.body, &mut d, hints, stability);
                }
            }
        }
    }
}

fn hint_expr(
    e: &bread_ast::Expr,
    loop_depth: u32,
    hints: &mut HashMap<NodeId, OptimizationHints>,
    stability: &HashMap<NodeId, StabilityInfo>,
) {
    let is_pure = is_pure_expr(e);
    let is_hot = loop_depth > 0;
    hints.insert(
        e.id,
        OptimizationHints {
            is_hot_path: is_hot,
            is_cold_path: false,
            branch_probability: 50,
            can_speculate: is_pure,
            is_pure,
        },
    );
    let _ = stability;
    for child in child_exprs(e) {
        hint_expr(child, loop_depth, hints, stability);
    }
}

fn is_pure_expr(e: &bread_ast::Expr) -> bool {
    use bread_ast::ExprKind::*;
    !matches!(e.kind, Call { .. } | MethodCall { .. })
        && child_exprs(e).into_iter().all(is_pure_expr)
}

/// Shared helper: every direct expression child of an `Expr`, used by both
/// the hint pass above and the two analyzers below.
fn child_exprs(e: &bread_ast::Expr) -> Vec<&bread_ast::Expr> {
    use bread_ast::ExprKind::*;
    match &e.kind {
        Literal(_) | Ident(_) | SelfExpr | Super => vec![],
        Unary { operand, .. } => vec![operand.as_ref()],
        Binary { lhs, rhs, .. } => vec![lhs.as_ref(), rhs.as_ref()],
        Index { target, index } => vec![target.as_ref(), index.as_ref()],
        Member { target, .. } => vec![target.as_ref()],
        MethodCall { target, args, .. } => {
            let mut v = vec![target.as_ref()];
            v.extend(args.iter());
            v
        }
        Call { args, .. } => args.iter().collect(),
        ArrayLit(items) => items.iter().collect(),
        DictLit(pairs) => pairs.iter().flat_map(|(k, v)| [k, v]).collect(),
        StructLit { fields, .. } | ClassLit { fields, .. } => fields.iter().map(|(_, v)| v).collect(),
    }
}

//! Compile-time scope chain (`scope_new`/`scope_find`/
//! `scope_add`) — a lexical stack of variable bindings consulted while
//! lowering a function body, parallel to (but never the same object as)
//! `bread_runtime::scope::ScopeStack`, which tracks *runtime* bindings the
//! same way at execution time. The two stay in lockstep: every
//! `CompileScope::push`/`pop` pairs with an emitted call to
//! `bread_push_scope`/`bread_pop_scope` (see `lowering::stmt`).

use bread_ast::NodeId;

use crate::cg_types::Var;

/// One lexical level. Declaration order matters for shadowing diagnostics,
/// but lookup always walks from the innermost level outward.
#[derive(Debug, Default)]
struct Level {
    vars: Vec<Var>,
}

/// The full chain for one function body. `base_depth` records the runtime
/// scope depth in effect when the function was entered, so every exit path
/// knows how far to unwind.
#[derive(Debug)]
pub struct CompileScope {
    levels: Vec<Level>,
    pub base_depth: usize,
    /// The node id of the nearest enclosing loop, for `break`/`continue`
    /// lowering; `None` outside any loop.
    pub loop_stack: Vec<NodeId>,
}

impl CompileScope {
    /// `scope_new` at function entry: one level, the runtime depth in effect
    /// when the function started executing.
    pub fn new(base_depth: usize) -> Self {
        CompileScope { levels: vec![Level::default()], base_depth, loop_stack: Vec::new() }
    }

    pub fn push(&mut self) {
        self.levels.push(Level::default());
    }

    pub fn pop(&mut self) {
        self.levels.pop();
        debug_assert!(!self.levels.is_empty(), "function-level scope popped below base");
    }

    /// Depth relative to `base_depth`, matching the runtime stack's depth
    /// once every corresponding `push_scope` call has executed.
    pub fn depth(&self) -> usize {
        self.base_depth + self.levels.len() - 1
    }

    /// `scope_add` — registers a new binding in the innermost level.
    pub fn add(&mut self, var: Var) {
        self.levels.last_mut().expect("scope never empty").vars.push(var);
    }

    /// `scope_find` — innermost-first lookup across every enclosing level.
    pub fn find(&self, name: &str) -> Option<&Var> {
        self.levels.iter().rev().find_map(|lvl| lvl.vars.iter().rev().find(|v| v.name == name))
    }

    pub fn enter_loop(&mut self, id: NodeId) {
        self.loop_stack.push(id);
    }

    pub fn exit_loop(&mut self) {
        self.loop_stack.pop();
    }

    pub fn current_loop(&self) -> Option<NodeId> {
        self.loop_stack.last().copied()
    }
}

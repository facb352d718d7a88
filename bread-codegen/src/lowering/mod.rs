//! Expression and statement lowering — the core of the
//! compiler: walks a [`bread_ast::FuncDecl`] body and emits Cranelift IR
//! against the `bread_*` runtime ABI declared in [`crate::bridge`].

pub mod expr;
pub mod stmt;

use hashbrown::HashMap;

use cranelift_codegen::ir::{condcodes::IntCC, types, Block, FuncRef, GlobalValue, InstBuilder, MemFlags, Value as IrValue};
use cranelift_frontend::FunctionBuilder;
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module};

use crate::analysis::AnalysisResult;
use crate::bridge::RuntimeImports;
use crate::cg_types::{CgClass, CgFunction};
use crate::error::CompileError;
use crate::scope::CompileScope;

/// Interns one [`DataId`] per distinct string literal's UTF-8 bytes so that
/// "same literal text maps to the same global pointer" (invariant
/// 3) holds at the IR level, not just inside the runtime's own
/// `StringInterner`.
#[derive(Default)]
pub struct StringLiteralTable {
    ids: HashMap<String, DataId>,
    next: u32,
}

impl StringLiteralTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_id<M: Module>(&mut self, module: &mut M, text: &str) -> Result<DataId, CompileError> {
        if let Some(id) = self.ids.get(text) {
            return Ok(*id);
        }
        let name = format!("bread_str_lit_{}", self.next);
        self.next += 1;
        let id = module
            .declare_data(&name, Linkage::Local, false, false)
            .map_err(|e| CompileError::Internal(e.into()))?;
        let mut desc = DataDescription::new();
        desc.define(text.as_bytes().to_vec().into_boxed_slice());
        module.define_data(id, &desc).map_err(|e| CompileError::Internal(e.into()))?;
        self.ids.insert(text.to_string(), id);
        Ok(id)
    }
}

/// What an early/error exit from a function body returns. Every declared
/// function, method, and constructor signals success or failure purely
/// through `ret_ptr` and returns no values, but the synthesized `main` entry
/// point's own signature is `() -> i32`, so its error
/// path needs to return a status code instead of nothing.
#[derive(Debug, Clone, Copy)]
pub enum ErrorReturn {
    Void,
    Status(i32),
}

/// Per-function-body lowering state. One instance is built for `main`, and
/// one for each user function/method/constructor, sharing the same
/// `RuntimeImports`, symbol tables, and analysis results but with its own
/// scope chain and `FuncRef` cache (Cranelift requires an import be
/// (re-)declared into each function body that calls it).
pub struct LowerCtx<'a, 'b, M: Module> {
    pub builder: &'a mut FunctionBuilder<'b>,
    pub module: &'a mut M,
    pub scope: CompileScope,
    pub imports: &'a RuntimeImports,
    pub funcs: &'a HashMap<String, CgFunction>,
    pub classes: &'a HashMap<String, CgClass>,
    pub analysis: &'a AnalysisResult,
    pub strings: &'a mut StringLiteralTable,
    /// Raw address of the single `RuntimeContext` for this compilation,
    /// embedded as an `iconst` in every function body rather than threaded as
    /// a parameter — ABI table never lists a context parameter,
    /// and the whole program runs inside one JIT execution that owns exactly
    /// one context.
    pub ctx_addr: i64,
    /// `self`'s boxed value register, set while lowering a method or
    /// constructor body.
    pub self_value: Option<IrValue>,
    /// Address of this function's output `Value` slot (its first parameter).
    pub ret_ptr: IrValue,
    /// The runtime scope depth (`bread_scope_depth`) sampled once at this
    /// function's entry. `CompileScope::depth()` only ever counts levels
    /// opened *within this function*, so every `pop_to_scope_depth` target is
    /// computed relative to this dynamic baseline rather than an absolute
    /// constant — a function called from inside a caller's nested block must
    /// never unwind the caller's own open scopes.
    pub entry_depth: IrValue,
    /// The class whose method/constructor body is currently being lowered,
    /// `None` inside `main` or a plain function — needed to resolve `super`
    /// calls to the parent's compiled method.
    pub current_class: Option<String>,
    error_return: ErrorReturn,
    error_blk: Option<Block>,
    func_refs: HashMap<FuncId, FuncRef>,
    data_refs: HashMap<DataId, GlobalValue>,
    /// `(continue_target, break_target, entry_depth)` per enclosing loop,
    /// innermost last. `entry_depth` is the compile-time scope depth when the
    /// loop was entered, so `break`/`continue` can unwind straight to it via
    /// `bread_pop_to_scope_depth` instead of relying on every intervening
    /// block's normal exit path running first.
    loop_blocks: Vec<(Block, Block, usize)>,
}

impl<'a, 'b, M: Module> LowerCtx<'a, 'b, M> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        builder: &'a mut FunctionBuilder<'b>,
        module: &'a mut M,
        scope: CompileScope,
        imports: &'a RuntimeImports,
        funcs: &'a HashMap<String, CgFunction>,
        classes: &'a HashMap<String, CgClass>,
        analysis: &'a AnalysisResult,
        strings: &'a mut StringLiteralTable,
        ctx_addr: i64,
        ret_ptr: IrValue,
        entry_depth: IrValue,
    ) -> Self {
        Self::with_error_return(
            builder, module, scope, imports, funcs, classes, analysis, strings, ctx_addr, ret_ptr, entry_depth,
            ErrorReturn::Void,
        )
    }

    /// Like [`new`](Self::new), but lets the caller pick what an error exit
    /// returns — `main`'s body needs `ErrorReturn::Status` since its
    /// signature has no `ret_ptr` out-parameter to signal failure through.
    #[allow(clippy::too_many_arguments)]
    pub fn with_error_return(
        builder: &'a mut FunctionBuilder<'b>,
        module: &'a mut M,
        scope: CompileScope,
        imports: &'a RuntimeImports,
        funcs: &'a HashMap<String, CgFunction>,
        classes: &'a HashMap<String, CgClass>,
        analysis: &'a AnalysisResult,
        strings: &'a mut StringLiteralTable,
        ctx_addr: i64,
        ret_ptr: IrValue,
        entry_depth: IrValue,
        error_return: ErrorReturn,
    ) -> Self {
        LowerCtx {
            builder,
            module,
            scope,
            imports,
            funcs,
            classes,
            analysis,
            strings,
            ctx_addr,
            self_value: None,
            ret_ptr,
            entry_depth,
            current_class: None,
            error_return,
            error_blk: None,
            func_refs: HashMap::new(),
            data_refs: HashMap::new(),
            loop_blocks: Vec::new(),
        }
    }

    pub fn enter_loop(&mut self, continue_target: Block, break_target: Block) {
        let depth = self.scope.depth();
        self.loop_blocks.push((continue_target, break_target, depth));
    }

    pub fn exit_loop(&mut self) {
        self.loop_blocks.pop();
    }

    pub fn current_loop(&self) -> Option<(Block, Block, usize)> {
        self.loop_blocks.last().copied()
    }

    /// Pushes one lexical scope level, compile-time and runtime in lockstep.
    pub fn push_scope_level(&mut self) {
        let ctx_ptr = self.ctx_ptr();
        let f = self.func_ref(self.imports.push_scope);
        self.builder.ins().call(f, &[ctx_ptr]);
        self.scope.push();
    }

    pub fn pop_scope_level(&mut self) {
        let ctx_ptr = self.ctx_ptr();
        let f = self.func_ref(self.imports.pop_scope);
        self.builder.ins().call(f, &[ctx_ptr]);
        self.scope.pop();
    }

    /// Unwinds the runtime scope stack straight to `relative_depth` levels
    /// below this function's entry depth, for an early
    /// `break`/`continue`/`return` that skips the normal nested pop-scope
    /// calls of any block it jumps out of. `relative_depth` is always a
    /// `CompileScope::depth()` snapshot from earlier in the same function.
    pub fn pop_to_scope_depth(&mut self, relative_depth: usize) {
        let ctx_ptr = self.ctx_ptr();
        let offset = self.builder.ins().iconst(types::I64, relative_depth as i64);
        let target = self.builder.ins().iadd(self.entry_depth, offset);
        let f = self.func_ref(self.imports.pop_to_scope_depth);
        self.builder.ins().call(f, &[ctx_ptr, target]);
    }

    /// Emits a call to a `RuntimeStatus`-returning `bread_*` entry point and
    /// branches to a per-function error-exit block (writing `nil` to the
    /// output slot and returning) if the error flag is non-zero, matching
    /// "a caller checks the status immediately after the call".
    pub fn call_status(&mut self, func_id: FuncId, args: &[IrValue]) -> IrValue {
        let fref = self.func_ref(func_id);
        let call = self.builder.ins().call(fref, args);
        let results = self.builder.inst_results(call);
        let (value, error) = (results[0], results[1]);
        let err_blk = self.error_block();
        let cont = self.builder.create_block();
        let zero = self.builder.ins().iconst(types::I64, 0);
        let is_err = self.builder.ins().icmp(IntCC::NotEqual, error, zero);
        self.builder.ins().brif(is_err, err_blk, &[], cont, &[]);
        self.builder.seal_block(cont);
        self.builder.switch_to_block(cont);
        value
    }

    /// Emits a call to a `bread_*` entry point returning a single `i32`
    /// status code (0 = success, matching the `bread_*_set_*`/`bread_dict_
    /// set_value` family) and branches to the shared error-exit block on a
    /// non-zero result, mirroring `call_status` for the single-register
    /// case.
    pub fn call_checked(&mut self, func_id: FuncId, args: &[IrValue]) {
        let fref = self.func_ref(func_id);
        let call = self.builder.ins().call(fref, args);
        let status = self.builder.inst_results(call)[0];
        let err_blk = self.error_block();
        let cont = self.builder.create_block();
        let zero = self.builder.ins().iconst(types::I32, 0);
        let is_err = self.builder.ins().icmp(IntCC::NotEqual, status, zero);
        self.builder.ins().brif(is_err, err_blk, &[], cont, &[]);
        self.builder.seal_block(cont);
        self.builder.switch_to_block(cont);
    }

    /// Resolves `name` on the parent of `current_class` to a compiled
    /// function id, for a `super.name(...)` call — walks the inheritance
    /// chain in case the parent itself does not override `name`.
    pub fn super_method_func_id(&self, name: &str) -> Result<FuncId, CompileError> {
        let current = self
            .current_class
            .as_ref()
            .ok_or(CompileError::SuperWithoutParent)?;
        let mut class = self.classes.get(current).ok_or(CompileError::SuperWithoutParent)?;
        loop {
            let parent_name = class.parent.as_ref().ok_or(CompileError::SuperWithoutParent)?;
            let parent = self
                .classes
                .get(parent_name)
                .ok_or_else(|| CompileError::UnknownClass(parent_name.clone()))?;
            if let Some(idx) = parent.method_index(name) {
                return Ok(parent.method_func_ids[idx]);
            }
            class = parent;
        }
    }

    /// Direct-call optimization: resolves `name` starting at
    /// `class_name` itself and walking up the inheritance chain, returning
    /// the compiled method's `FuncId` the first time one of them declares it.
    /// Used only when the call's target has a statically known class type
    /// (see `cg_types::Var::declared_type`); falls back to `None` (and hence
    /// to runtime `method_call_op` dispatch) for an unknown class, an
    /// unresolved name, or a method inherited from a class not present in
    /// this program's own `classes` table.
    pub fn resolve_method_func_id(&self, class_name: &str, name: &str) -> Option<FuncId> {
        let mut class = self.classes.get(class_name)?;
        loop {
            if let Some(idx) = class.method_index(name) {
                return Some(class.method_func_ids[idx]);
            }
            class = self.classes.get(class.parent.as_ref()?)?;
        }
    }

    fn error_block(&mut self) -> Block {
        if let Some(b) = self.error_blk {
            return b;
        }
        let current = self.builder.current_block().expect("error_block requested outside a block");
        let blk = self.builder.create_block();
        self.builder.switch_to_block(blk);
        let nil = self.builder.ins().iconst(types::I64, 3);
        self.builder.ins().store(MemFlags::new(), nil, self.ret_ptr, 0);
        match self.error_return {
            ErrorReturn::Void => {
                self.builder.ins().return_(&[]);
            }
            ErrorReturn::Status(code) => {
                let v = self.builder.ins().iconst(types::I32, code as i64);
                self.builder.ins().return_(&[v]);
            }
        }
        self.builder.seal_block(blk);
        self.builder.switch_to_block(current);
        self.error_blk = Some(blk);
        blk
    }

    pub fn func_ref(&mut self, id: FuncId) -> FuncRef {
        if let Some(r) = self.func_refs.get(&id) {
            return *r;
        }
        let r = self.module.declare_func_in_func(id, self.builder.func);
        self.func_refs.insert(id, r);
        r
    }

    fn data_global(&mut self, id: DataId) -> GlobalValue {
        if let Some(g) = self.data_refs.get(&id) {
            return *g;
        }
        let g = self.module.declare_data_in_func(id, self.builder.func);
        self.data_refs.insert(id, g);
        g
    }

    /// Address + length pair for an interned string literal, as IR values.
    pub fn string_literal(&mut self, text: &str) -> Result<(IrValue, IrValue), CompileError> {
        let id = self.strings.data_id(self.module, text)?;
        let gv = self.data_global(id);
        let addr = self.builder.ins().global_value(cranelift_codegen::ir::types::I64, gv);
        let len = self.builder.ins().iconst(cranelift_codegen::ir::types::I64, text.len() as i64);
        Ok((addr, len))
    }

    /// The embedded `RuntimeContext` address as an IR value.
    pub fn ctx_ptr(&mut self) -> IrValue {
        self.builder.ins().iconst(cranelift_codegen::ir::types::I64, self.ctx_addr)
    }
}

//! Driver: ties every other module together into one
//! compilation — declare imports, run the analysis passes, build `main` and
//! every function/method/constructor body, verify, then hand the finished
//! module to whichever emission backend the caller asked for.
//!
//! Generalized from "compile one expression against a JIT module" to
//! "compile a whole program against whichever `cranelift_module::Module`
//! the requested emission mode needs".

use std::collections::HashMap as StdHashMap;
use std::path::PathBuf;

use cranelift_codegen::ir::{types, AbiParam, InstBuilder, MemFlags, UserFuncName};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_codegen::Context as ClifContext;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{FuncId, Linkage, Module};
use cranelift_object::{ObjectBuilder, ObjectModule};

use bread_ast::{ClassDecl, Param, Program, Stmt, StmtKind, UnboxedRep};
use bread_runtime::RuntimeContext;

use crate::analysis::{self, AnalysisResult};
use crate::bridge::{self, RuntimeImports};
use crate::cg_types::{CgClass, CgFunction, Var};
use crate::class_lowering::{self, DeclaredProgram};
use crate::error::{CodegenInternalError, CompileError, DriverError, DriverResult, EmissionError, JITError, VerificationError};
use crate::lowering::{self, stmt::lower_block, ErrorReturn, LowerCtx, StringLiteralTable};
use crate::scope::CompileScope;
use crate::value_discipline;

/// How hard Cranelift should try to optimize the generated code. Threaded
/// into the ISA's `opt_level` setting the same way for every emission mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptLevel {
    None,
    Speed,
}

impl OptLevel {
    fn as_str(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
        }
    }
}

/// Which of the four surfaces described in to produce.
#[derive(Debug, Clone)]
pub enum EmitMode {
    /// `--emit-ll`: textual CLIF for every compiled function.
    Ll,
    /// `--emit-obj`: a native `.o` via `cranelift_object`.
    Obj,
    /// `--emit-exe` (the default): an object file handed to an external C
    /// linker, honoring `BREAD_DEBUG_LINK` when set.
    Exe,
    /// `--jit`: compile into this process and run `main` immediately.
    Jit,
}

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub emit: EmitMode,
    pub opt_level: OptLevel,
    pub verbose: bool,
    /// `-o <path>`: where to write `.ll`/`.o`/executable output. Ignored by
    /// `EmitMode::Jit`.
    pub out_path: Option<PathBuf>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions { emit: EmitMode::Exe, opt_level: OptLevel::Speed, verbose: false, out_path: None }
    }
}

/// What a completed run produced.
pub enum DriverOutput {
    /// Concatenated CLIF text for every compiled function, in declaration
    /// order (`main` first).
    Ll(String),
    Obj(Vec<u8>),
    /// Path to the linked executable.
    Exe(PathBuf),
    /// `main`'s own exit code, after actually running the JIT-compiled
    /// program.
    Jit(i32),
}

fn isa_error(e: impl std::fmt::Display) -> DriverError {
    DriverError::Jit(JITError::Isa(e.to_string()))
}

fn build_isa(opt_level: OptLevel, pic: bool) -> DriverResult<cranelift_codegen::isa::OwnedTargetIsa> {
    let mut flag_builder = settings::builder();
    flag_builder.set("use_colocated_libcalls", "false").map_err(isa_error)?;
    flag_builder.set("is_pic", if pic { "true" } else { "false" }).map_err(isa_error)?;
    flag_builder.set("opt_level", opt_level.as_str()).map_err(isa_error)?;

    let isa_builder = cranelift_native::builder().map_err(isa_error)?;
    isa_builder.finish(settings::Flags::new(flag_builder)).map_err(isa_error)
}

/// Everything collected while lowering the whole program, before the module
/// is handed off to an emission backend.
struct BuiltProgram {
    main_func_id: FuncId,
    /// `(debug name, CLIF text)` for every function body built, in the order
    /// they were built — populated only when `collect_clif` is requested.
    clif: Vec<(String, String)>,
}

/// Declares every import/symbol, runs analysis, and builds every function
/// body (main, then plain functions, then methods/constructors) against
/// `module`. Shared by every emission backend — only the `Module` impl and
/// what happens to the finished module afterward differ.
fn build_program<M: Module>(
    module: &mut M,
    fb_ctx: &mut FunctionBuilderContext,
    program: &Program,
    ctx_addr: i64,
    collect_clif: bool,
) -> DriverResult<BuiltProgram> {
    let imports = bridge::declare_runtime_imports(module).map_err(|e| CompileError::Internal(CodegenInternalError::Module(e)))?;

    // The stability/escape/optimization passes are advisory and never
    // abort a compile on their own.
    let analysis = analysis::analyze_program(program);

    let DeclaredProgram { funcs, classes } = class_lowering::declare_program_symbols(module, program)?;

    // `declare_program_symbols` only records a class's name/field/method
    // table, not its method bodies — recover those by name from the
    // top-level `ClassDecl`s so each method/constructor can be lowered.
    let mut class_decls: StdHashMap<String, ClassDecl> = StdHashMap::new();
    for stmt in &program.statements {
        if let StmtKind::ClassDecl(c) = &stmt.kind {
            class_decls.insert(c.name.clone(), c.clone());
        }
    }

    let mut strings = StringLiteralTable::new();
    let mut clif = Vec::new();

    let runtime_init_classes_id = class_lowering::build_runtime_init_classes(
        module,
        fb_ctx,
        &imports,
        &mut strings,
        &classes,
        ctx_addr,
        collect_clif,
        &mut clif,
    )?;

    let main_func_id = build_main(
        module,
        fb_ctx,
        &imports,
        &mut strings,
        &funcs,
        &classes,
        &analysis,
        runtime_init_classes_id,
        ctx_addr,
        program,
        collect_clif,
        &mut clif,
    )?;

    for func in funcs.values() {
        build_function_body(
            module,
            fb_ctx,
            &imports,
            &mut strings,
            &funcs,
            &classes,
            &analysis,
            ctx_addr,
            func.func_id,
            false,
            None,
            &func.decl.params,
            &func.decl.body,
            collect_clif,
            &mut clif,
            &func.name,
        )?;
    }

    for class in classes.values() {
        let decl = class_decls
            .get(&class.name)
            .expect("every declared class came from a ClassDecl collected above");
        for (method_name, method_func_id) in class.method_names.iter().zip(class.method_func_ids.iter()) {
            let method_decl = decl
                .methods
                .iter()
                .find(|m| &m.name == method_name)
                .expect("method_names is built from the same ClassDecl's methods");
            build_function_body(
                module,
                fb_ctx,
                &imports,
                &mut strings,
                &funcs,
                &classes,
                &analysis,
                ctx_addr,
                *method_func_id,
                true,
                Some(&class.name),
                &method_decl.params,
                &method_decl.body,
                collect_clif,
                &mut clif,
                &format!("{}::{}", class.name, method_name),
            )?;
        }
        if let (Some(ctor_id), Some(ctor_decl)) = (class.constructor_func_id, decl.constructor.as_ref()) {
            build_function_body(
                module,
                fb_ctx,
                &imports,
                &mut strings,
                &funcs,
                &classes,
                &analysis,
                ctx_addr,
                ctor_id,
                true,
                Some(&class.name),
                &ctor_decl.params,
                &ctor_decl.body,
                collect_clif,
                &mut clif,
                &format!("{}::init", class.name),
            )?;
        }
    }

    Ok(BuiltProgram { main_func_id, clif })
}

/// Builds one declared function, method, or constructor body: entry block,
/// `self`/parameter binding into fresh value slots, the dynamic
/// `entry_depth` sample, then the statement list, verify, and define.
#[allow(clippy::too_many_arguments)]
fn build_function_body<M: Module>(
    module: &mut M,
    fb_ctx: &mut FunctionBuilderContext,
    imports: &RuntimeImports,
    strings: &mut StringLiteralTable,
    funcs: &StdHashMap<String, CgFunction>,
    classes: &StdHashMap<String, CgClass>,
    analysis: &AnalysisResult,
    ctx_addr: i64,
    func_id: FuncId,
    has_self: bool,
    owner_class: Option<&str>,
    params: &[Param],
    body: &[Stmt],
    collect_clif: bool,
    clif_out: &mut Vec<(String, String)>,
    debug_name: &str,
) -> DriverResult<()> {
    let sig = class_lowering::func_signature(module, has_self, params.len());
    let mut func = cranelift_codegen::ir::Function::with_name_signature(UserFuncName::user(0, func_id.as_u32()), sig);

    {
        let mut builder = FunctionBuilder::new(&mut func, fb_ctx);
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        builder.seal_block(entry);

        let block_params = builder.block_params(entry).to_vec();
        let ret_ptr = block_params[0];
        let mut next = 1;
        let self_value = if has_self {
            let v = block_params[next];
            next += 1;
            Some(v)
        } else {
            None
        };

        let ctx_ptr = builder.ins().iconst(types::I64, ctx_addr);
        let depth_fref = module.declare_func_in_func(imports.scope_depth, builder.func);
        let call = builder.ins().call(depth_fref, &[ctx_ptr]);
        let entry_depth = builder.inst_results(call)[0];

        let mut scope = CompileScope::new(0);
        let set_nil_fref = module.declare_func_in_func(imports.value_set_nil, builder.func);
        for (i, p) in params.iter().enumerate() {
            let incoming = block_params[next + i];
            let slot = value_discipline::alloc_value_slot(&mut builder);
            value_discipline::init_nil(&mut builder, set_nil_fref, slot);
            value_discipline::init_store_boxed(&mut builder, slot, incoming);
            scope.add(Var {
                name: p.name.clone(),
                storage_slot: slot,
                declared_type: p.declared_type.clone(),
                unboxed_rep: UnboxedRep::from(&p.declared_type),
                is_const: false,
            });
        }

        let terminated = {
            let mut lower_ctx = LowerCtx::new(&mut builder, module, scope, imports, funcs, classes, analysis, strings, ctx_addr, ret_ptr, entry_depth);
            lower_ctx.self_value = self_value;
            lower_ctx.current_class = owner_class.map(|s| s.to_string());
            lower_block(&mut lower_ctx, body)?
        };

        if !terminated {
            let nil = builder.ins().iconst(types::I64, 3);
            builder.ins().store(MemFlags::new(), nil, ret_ptr, 0);
            builder.ins().return_(&[]);
        }

        builder.finalize();
    }

    finalize_function(module, func_id, func, debug_name, collect_clif, clif_out)
}

/// Builds `main`'s own body: runtime init calls,
/// the top-level statement list, then runtime cleanup and `ret i32 0`.
/// Unlike every other compiled function, `main` has no `ret_ptr`
/// out-parameter — its signature is `() -> i32` — so its error exit returns
/// a status code instead of writing through an output slot.
#[allow(clippy::too_many_arguments)]
fn build_main<M: Module>(
    module: &mut M,
    fb_ctx: &mut FunctionBuilderContext,
    imports: &RuntimeImports,
    strings: &mut StringLiteralTable,
    funcs: &StdHashMap<String, CgFunction>,
    classes: &StdHashMap<String, CgClass>,
    analysis: &AnalysisResult,
    runtime_init_classes_id: FuncId,
    ctx_addr: i64,
    program: &Program,
    collect_clif: bool,
    clif_out: &mut Vec<(String, String)>,
) -> DriverResult<FuncId> {
    let mut sig = bridge::sig0(module);
    sig.returns.push(AbiParam::new(types::I32));
    let func_id = module
        .declare_function("main", Linkage::Export, &sig)
        .map_err(|e| CompileError::Internal(CodegenInternalError::Module(e)))?;

    let mut func = cranelift_codegen::ir::Function::with_name_signature(UserFuncName::user(0, func_id.as_u32()), sig);

    {
        let mut builder = FunctionBuilder::new(&mut func, fb_ctx);
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        builder.seal_block(entry);

        let ctx_ptr = builder.ins().iconst(types::I64, ctx_addr);
        for lifecycle in [imports.memory_init, imports.string_intern_init, imports.builtin_init, imports.error_init] {
            let fref = module.declare_func_in_func(lifecycle, builder.func);
            builder.ins().call(fref, &[ctx_ptr]);
        }
        let init_classes_fref = module.declare_func_in_func(runtime_init_classes_id, builder.func);
        builder.ins().call(init_classes_fref, &[]);

        let depth_fref = module.declare_func_in_func(imports.scope_depth, builder.func);
        let call = builder.ins().call(depth_fref, &[ctx_ptr]);
        let entry_depth = builder.inst_results(call)[0];

        // `main` has no caller-supplied output slot; it still needs a
        // `ret_ptr` so the shared lowering helpers (which always write a
        // result through one) have somewhere to write. Nothing ever reads
        // it back.
        let scratch_slot = value_discipline::alloc_value_slot(&mut builder);
        let set_nil_fref = module.declare_func_in_func(imports.value_set_nil, builder.func);
        value_discipline::init_nil(&mut builder, set_nil_fref, scratch_slot);
        let ret_ptr = value_discipline::slot_addr(&mut builder, scratch_slot);

        let scope = CompileScope::new(0);
        let terminated = {
            let mut lower_ctx = LowerCtx::with_error_return(
                &mut builder, module, scope, imports, funcs, classes, analysis, strings, ctx_addr, ret_ptr, entry_depth,
                ErrorReturn::Status(1),
            );
            lower_block(&mut lower_ctx, &program.statements)?
        };

        if !terminated {
            let cleanup_fref = module.declare_func_in_func(imports.runtime_cleanup, builder.func);
            builder.ins().call(cleanup_fref, &[ctx_ptr]);
            let zero = builder.ins().iconst(types::I32, 0);
            builder.ins().return_(&[zero]);
        }

        builder.finalize();
    }

    finalize_function(module, func_id, func, "main", collect_clif, clif_out)?;
    Ok(func_id)
}

fn finalize_function<M: Module>(
    module: &mut M,
    func_id: FuncId,
    func: cranelift_codegen::ir::Function,
    debug_name: &str,
    collect_clif: bool,
    clif_out: &mut Vec<(String, String)>,
) -> DriverResult<()> {
    if collect_clif {
        clif_out.push((debug_name.to_string(), func.display().to_string()));
    }
    let mut ctx = ClifContext::for_function(func);
    ctx.verify(module.isa())
        .map_err(|e| VerificationError { function: debug_name.to_string(), detail: e.to_string() })?;
    module
        .define_function(func_id, &mut ctx)
        .map_err(|e| CompileError::Internal(CodegenInternalError::Module(e)))?;
    Ok(())
}

/// Orchestrates one compilation end to end, per the `CompileOptions` it was
/// built with. Owns the single `RuntimeContext` the generated code runs
/// against — allocated once so its address can be embedded as a constant in
/// every function body (`DESIGN.md`'s ctx-as-embedded-constant decision).
pub struct Driver {
    opts: CompileOptions,
    runtime_ctx: Box<RuntimeContext>,
}

impl Driver {
    pub fn new(opts: CompileOptions) -> Self {
        Driver { opts, runtime_ctx: Box::new(RuntimeContext::new()) }
    }

    fn ctx_addr(&self) -> i64 {
        self.runtime_ctx.as_ref() as *const RuntimeContext as i64
    }

    pub fn run(&mut self, program: &Program) -> DriverResult<DriverOutput> {
        log::debug!("compiling {} top-level statements, emit mode {:?}", program.statements.len(), self.opts.emit);
        match self.opts.emit {
            EmitMode::Ll => self.run_ll(program),
            EmitMode::Obj => self.run_obj(program),
            EmitMode::Exe => self.run_exe(program),
            EmitMode::Jit => self.run_jit(program),
        }
    }

    fn run_ll(&mut self, program: &Program) -> DriverResult<DriverOutput> {
        let isa = build_isa(self.opts.opt_level, true)?;
        let builder = ObjectBuilder::new(isa, "bread_module".to_string(), cranelift_module::default_libcall_names())
            .map_err(|e| DriverError::Jit(JITError::Module(e.to_string())))?;
        let mut module = ObjectModule::new(builder);
        let mut fb_ctx = FunctionBuilderContext::new();
        let built = build_program(&mut module, &mut fb_ctx, program, self.ctx_addr(), true)?;
        let _ = built.main_func_id;

        let mut text = String::new();
        for (name, clif) in &built.clif {
            text.push_str(&format!("; function {}\n{}\n", name, clif));
        }
        if let Some(path) = &self.opts.out_path {
            std::fs::write(path, &text).map_err(|e| EmissionError::Io { path: path.display().to_string(), source: e })?;
        }
        Ok(DriverOutput::Ll(text))
    }

    fn run_obj(&mut self, program: &Program) -> DriverResult<DriverOutput> {
        let bytes = self.compile_object(program)?;
        if let Some(path) = &self.opts.out_path {
            std::fs::write(path, &bytes).map_err(|e| EmissionError::Io { path: path.display().to_string(), source: e })?;
        }
        Ok(DriverOutput::Obj(bytes))
    }

    fn run_exe(&mut self, program: &Program) -> DriverResult<DriverOutput> {
        let bytes = self.compile_object(program)?;
        let out_path = self.opts.out_path.clone().unwrap_or_else(|| PathBuf::from("a.out"));
        let obj_path = out_path.with_extension("o");
        std::fs::write(&obj_path, &bytes)
            .map_err(|e| EmissionError::Io { path: obj_path.display().to_string(), source: e })?;

        // Linking itself is out of scope: the driver's job
        // ends at handing a finished object file to the host `cc`, the same
        // way it would hand one to any other external linker.
        let mut cmd = std::process::Command::new("cc");
        cmd.arg(&obj_path).arg("-o").arg(&out_path);
        if std::env::var_os("BREAD_DEBUG_LINK").is_some() {
            log::debug!("invoking linker: {:?}", cmd);
        }
        let status = cmd.status().map_err(|e| EmissionError::Link(e.to_string()))?;
        if !status.success() {
            log::warn!("linker exited with {status}");
            return Err(DriverError::Emission(EmissionError::Link(format!("cc exited with {status}"))));
        }
        Ok(DriverOutput::Exe(out_path))
    }

    fn compile_object(&mut self, program: &Program) -> DriverResult<Vec<u8>> {
        let isa = build_isa(self.opts.opt_level, true)?;
        let builder = ObjectBuilder::new(isa, "bread_module".to_string(), cranelift_module::default_libcall_names())
            .map_err(|e| DriverError::Jit(JITError::Module(e.to_string())))?;
        let mut module = ObjectModule::new(builder);
        let mut fb_ctx = FunctionBuilderContext::new();
        build_program(&mut module, &mut fb_ctx, program, self.ctx_addr(), false)?;
        let product = module.finish();
        product.emit().map_err(|e| DriverError::Emission(EmissionError::Object(e.to_string())))
    }

    fn run_jit(&mut self, program: &Program) -> DriverResult<DriverOutput> {
        let isa = build_isa(self.opts.opt_level, false)?;
        let mut builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
        bridge::register_runtime_symbols(&mut builder);
        let mut module = JITModule::new(builder);
        let mut fb_ctx = FunctionBuilderContext::new();

        let built = build_program(&mut module, &mut fb_ctx, program, self.ctx_addr(), false)?;

        module
            .finalize_definitions()
            .map_err(|e| DriverError::Jit(JITError::Module(e.to_string())))?;
        log::trace!("finalized {} compiled functions, entering main", built.clif.len());

        let code_ptr = module.get_finalized_function(built.main_func_id);
        // SAFETY: `main`'s declared signature is `() -> i32`, matched
        // exactly by `build_main`, and `finalize_definitions` has resolved
        // every function this program calls (including every compiled
        // method/constructor `runtime_init_classes` installs) before any of
        // them run.
        let main_fn: unsafe extern "C" fn() -> i32 = unsafe { std::mem::transmute(code_ptr) };
        let exit_code = unsafe { main_fn() };

        // JIT memory must outlive any code that could still be reached
        // through stored function pointers (the class registry's compiled
        // method table); holding `module` until after the call returns and
        // then leaking it for the process's remaining lifetime is simpler
        // and just as safe as threading a `Drop` impl through `Driver` for
        // a one-shot CLI.
        std::mem::forget(module);

        Ok(DriverOutput::Jit(exit_code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bread_ast::{Expr, ExprKind, FuncDecl, Literal, NodeIdGen, StmtKind, TypeDescriptor};
    use proptest::prelude::*;

    /// Builds a module with only the runtime imports declared, the same way
    /// `build_program` always declares them first against a fresh module —
    /// so the returned `FuncId`s line up with whatever a full compile of a
    /// *different*, equally fresh module assigns them.
    fn fresh_imports() -> RuntimeImports {
        let isa = build_isa(OptLevel::Speed, true).expect("native isa");
        let builder = ObjectBuilder::new(isa, "probe".to_string(), cranelift_module::default_libcall_names())
            .expect("object builder");
        let mut module = ObjectModule::new(builder);
        bridge::declare_runtime_imports(&mut module).expect("declare imports")
    }

    /// Pulls the CLIF text for one function's debug name out of the
    /// concatenated `; function NAME\n...` blocks `DriverOutput::Ll` text is
    /// made of (see `run_ll`).
    fn extract_function_clif<'a>(full_text: &'a str, name: &str) -> &'a str {
        let marker = format!("; function {}\n", name);
        let start = full_text.find(&marker).unwrap_or_else(|| panic!("no `{}` function in output", name)) + marker.len();
        let rest = &full_text[start..];
        match rest.find("\n; function ") {
            Some(end) => &rest[..end],
            None => rest,
        }
    }

    /// Number of `explicit_slot` stack slots declared in a function's CLIF
    /// text — every one of `bread-codegen`'s own stack slots is either a
    /// `Value` slot (`value_discipline::alloc_value_slot`) or a native loop
    /// counter; a program with no loops has only the former.
    fn count_explicit_slots(clif_text: &str) -> usize {
        clif_text.lines().filter(|l| l.contains("explicit_slot")).count()
    }

    /// Counts call sites in `clif_text` that target `func_id`. `func_ref`
    /// caching means one import may back a single declaration line
    /// (`fn0 = u0:N sig0`) shared by many call sites, or (outside a cached
    /// `LowerCtx`, e.g. `runtime_init_classes`) several separate declaration
    /// lines each backing their own call — either way, summing every
    /// `call fnK(` for every `fnK` declared against `u0:{func_id}` counts
    /// every actual call.
    fn count_calls(clif_text: &str, func_id: FuncId) -> usize {
        let needle = format!("u0:{} sig", func_id.as_u32());
        let mut total = 0usize;
        for line in clif_text.lines() {
            let line = line.trim();
            if line.starts_with("fn") && line.contains(&needle) {
                if let Some(fref) = line.split_whitespace().next() {
                    let call_pat = format!("call {}(", fref);
                    total += clif_text.matches(&call_pat).count();
                }
            }
        }
        total
    }

    fn lit(gen: &mut NodeIdGen, l: Literal) -> Expr {
        Expr { id: gen.next(), kind: ExprKind::Literal(l) }
    }

    /// `let x: Int = 1 + 2; print(x)` — exercises literal constant folding,
    /// an unboxed int fast path, a variable slot, and the `print` builtin
    /// through a full JIT-compiled `main`.
    #[test]
    fn runs_a_minimal_program_to_completion() {
        let mut gen = NodeIdGen::new();
        let sum = Expr {
            id: gen.next(),
            kind: ExprKind::Binary {
                op: bread_ast::BinOp::Add,
                lhs: Box::new(lit(&mut gen, Literal::Int(1))),
                rhs: Box::new(lit(&mut gen, Literal::Int(2))),
            },
        };
        let decl = Stmt::new(
            gen.next(),
            StmtKind::VarDecl { name: "x".to_string(), declared_type: TypeDescriptor::Int, init: sum, is_const: false },
        );
        let ident = Expr { id: gen.next(), kind: ExprKind::Ident("x".to_string()) };
        let print = Stmt::new(gen.next(), StmtKind::Print(ident));
        let program = Program::new(vec![decl, print]);

        let mut driver = Driver::new(CompileOptions { emit: EmitMode::Jit, ..Default::default() });
        let output = driver.run(&program).expect("program should compile and run");
        match output {
            DriverOutput::Jit(code) => assert_eq!(code, 0),
            _ => panic!("expected a Jit output"),
        }
    }

    /// An empty program still has to run every lifecycle call and return
    /// cleanly.
    #[test]
    fn runs_an_empty_program() {
        let program = Program::new(vec![]);
        let mut driver = Driver::new(CompileOptions { emit: EmitMode::Jit, ..Default::default() });
        let output = driver.run(&program).expect("empty program should still run main to completion");
        match output {
            DriverOutput::Jit(code) => assert_eq!(code, 0),
            _ => panic!("expected a Jit output"),
        }
    }

    /// `--emit-ll` collects CLIF text for `main` without running anything.
    #[test]
    fn emits_clif_text_for_main() {
        let program = Program::new(vec![]);
        let mut driver = Driver::new(CompileOptions { emit: EmitMode::Ll, ..Default::default() });
        let output = driver.run(&program).expect("ll emission should succeed");
        match output {
            DriverOutput::Ll(text) => assert!(text.contains("function main") || text.contains("main")),
            _ => panic!("expected an Ll output"),
        }
    }

    /// A short arithmetic program over two random small ints always runs its
    /// `main` to completion. If any compiled function's arity or
    /// return-by-pointer convention were wrong, the JIT call itself would
    /// segfault or the verifier would reject the module before this point.
    #[test]
    fn arithmetic_program_always_runs_to_completion() {
        proptest!(|(a in -1000i32..1000, b in -1000i32..1000)| {
            let mut gen = NodeIdGen::new();
            let sum = Expr {
                id: gen.next(),
                kind: ExprKind::Binary {
                    op: bread_ast::BinOp::Add,
                    lhs: Box::new(lit(&mut gen, Literal::Int(a))),
                    rhs: Box::new(lit(&mut gen, Literal::Int(b))),
                },
            };
            let print = Stmt::new(gen.next(), StmtKind::Print(sum));
            let program = Program::new(vec![print]);
            let mut driver = Driver::new(CompileOptions { emit: EmitMode::Jit, ..Default::default() });
            let output = driver.run(&program).expect("arithmetic program should compile and run");
            prop_assert!(matches!(output, DriverOutput::Jit(0)));
        });
    }

    /// A `while` loop that always
    /// breaks immediately, nested inside an `if`, must still unwind every
    /// scope it opened and let `main` return normally regardless of how many
    /// times the loop body would otherwise have iterated.
    #[test]
    fn nested_loop_and_branch_always_balances_scopes() {
        proptest!(|(take_then_branch in any::<bool>(), bound in 0i32..50)| {
            let mut gen = NodeIdGen::new();
            let decl = Stmt::new(
                gen.next(),
                StmtKind::VarDecl {
                    name: "i".to_string(),
                    declared_type: TypeDescriptor::Int,
                    init: lit(&mut gen, Literal::Int(0)),
                    is_const: false,
                },
            );
            let while_body = vec![Stmt::new(gen.next(), StmtKind::Break)];
            let while_stmt = Stmt::new(
                gen.next(),
                StmtKind::While { cond: lit(&mut gen, Literal::Bool(true)), body: while_body },
            );
            let then_branch = vec![decl, while_stmt];
            let else_branch = vec![Stmt::new(gen.next(), StmtKind::Print(lit(&mut gen, Literal::Int(bound))))];
            let if_stmt = Stmt::new(
                gen.next(),
                StmtKind::If { cond: lit(&mut gen, Literal::Bool(take_then_branch)), then_branch, else_branch },
            );
            let program = Program::new(vec![if_stmt]);
            let mut driver = Driver::new(CompileOptions { emit: EmitMode::Jit, ..Default::default() });
            let output = driver.run(&program).expect("nested loop/branch program should compile and run");
            prop_assert!(matches!(output, DriverOutput::Jit(0)));
        });
    }

    /// For any `Int`/`Bool`
    /// literal value, unboxing a freshly boxed value returns the original.
    #[test]
    fn int_boxing_round_trips() {
        proptest!(|(v in any::<i32>())| {
            let boxed = bread_runtime::ops::bread_box_int(v);
            let unboxed = bread_runtime::ops::bread_unbox_int(boxed);
            prop_assert_eq!(unboxed, v);
        });
    }

    #[test]
    fn bool_boxing_round_trips() {
        proptest!(|(v in any::<bool>())| {
            let boxed = bread_runtime::ops::bread_box_bool(v as i32);
            let unboxed = bread_runtime::ops::bread_unbox_bool(boxed);
            prop_assert_eq!(unboxed != 0, v);
        });
    }

    #[test]
    fn double_boxing_round_trips() {
        proptest!(|(v in -1.0e6f64..1.0e6f64)| {
            let boxed = bread_runtime::ops::bread_box_double(v);
            let unboxed = bread_runtime::ops::bread_unbox_double(boxed);
            prop_assert_eq!(unboxed, v);
        });
    }

    /// Evaluating
    /// `range(start, end, step)` twice produces arrays of equal length and
    /// elementwise-equal contents.
    #[test]
    fn range_create_is_idempotent() {
        proptest!(|(start in -200i32..200, len in 0i32..200, raw_step in 1i32..10)| {
            let end = start + len * raw_step;
            let first = bread_runtime::BreadValue(bread_runtime::ops::bread_range_create(start, end, raw_step));
            let second = bread_runtime::BreadValue(bread_runtime::ops::bread_range_create(start, end, raw_step));
            let items = |v: bread_runtime::BreadValue| -> Vec<i32> {
                match unsafe { v.as_heap_ref() } {
                    Some(bread_runtime::HeapValue::Array(a)) => {
                        a.borrow().iter().map(|item| item.try_as_int().expect("range produces ints")).collect()
                    }
                    _ => panic!("range_create must return an array"),
                }
            };
            let a = items(first);
            let b = items(second);
            prop_assert_eq!(a, b);
        });
    }

    /// Universal invariant #1: every `Value`-sized stack slot is
    /// `bread_value_set_nil`-initialized before any other use. `main` always
    /// has one extra slot beyond the program's own declarations — the
    /// scratch `ret_ptr` backing shared lowering helpers write through —
    /// nil-initialized the same way, so the two counts stay equal for any
    /// number of top-level `VarDecl`s.
    #[test]
    fn every_value_slot_is_nil_initialized_before_use() {
        proptest!(|(count in 0usize..8)| {
            let mut gen = NodeIdGen::new();
            let mut stmts = Vec::new();
            for i in 0..count {
                stmts.push(Stmt::new(
                    gen.next(),
                    StmtKind::VarDecl {
                        name: format!("v{}", i),
                        declared_type: TypeDescriptor::Int,
                        init: lit(&mut gen, Literal::Int(i as i32)),
                        is_const: false,
                    },
                ));
            }
            let program = Program::new(stmts);
            let mut driver = Driver::new(CompileOptions { emit: EmitMode::Ll, ..Default::default() });
            let output = driver.run(&program).expect("var-decl-only program should compile");
            let text = match output { DriverOutput::Ll(t) => t, _ => panic!("expected an Ll output") };
            let main_clif = extract_function_clif(&text, "main");
            let imports = fresh_imports();

            let slots = count_explicit_slots(main_clif);
            let nil_calls = count_calls(main_clif, imports.value_set_nil);
            prop_assert_eq!(slots, count + 1);
            prop_assert_eq!(nil_calls, slots);
        });
    }

    /// Universal invariant #2: an early `return` always unwinds the runtime
    /// scope stack straight to the function's base depth via exactly one
    /// `bread_pop_to_scope_depth` call, regardless of how deeply the
    /// `return` is nested inside `if` blocks it skips the normal
    /// nested pop-scope calls of.
    #[test]
    fn early_return_emits_exactly_one_pop_to_scope_depth_at_any_nesting_depth() {
        fn nested_if_with_return(gen: &mut NodeIdGen, depth: u32) -> Stmt {
            if depth == 0 {
                Stmt::new(gen.next(), StmtKind::Return(Some(lit(gen, Literal::Int(0)))))
            } else {
                let inner = nested_if_with_return(gen, depth - 1);
                Stmt::new(
                    gen.next(),
                    StmtKind::If {
                        cond: lit(gen, Literal::Bool(true)),
                        then_branch: vec![inner],
                        else_branch: vec![Stmt::new(gen.next(), StmtKind::Print(lit(gen, Literal::Int(depth as i32))))],
                    },
                )
            }
        }

        proptest!(|(depth in 0u32..6)| {
            let mut gen = NodeIdGen::new();
            let body = vec![nested_if_with_return(&mut gen, depth)];
            let f = FuncDecl {
                id: gen.next(),
                name: "f".to_string(),
                params: vec![],
                return_type: TypeDescriptor::Int,
                body,
            };
            let program = Program::new(vec![Stmt::new(gen.next(), StmtKind::FuncDecl(f))]);
            let mut driver = Driver::new(CompileOptions { emit: EmitMode::Ll, ..Default::default() });
            let output = driver.run(&program).expect("nested-if-with-return function should compile");
            let text = match output { DriverOutput::Ll(t) => t, _ => panic!("expected an Ll output") };
            let f_clif = extract_function_clif(&text, "f");
            let imports = fresh_imports();
            prop_assert_eq!(count_calls(f_clif, imports.pop_to_scope_depth), 1);
        });
    }

    /// Universal invariant #3, at the IR level rather than the runtime
    /// interner `bread_runtime::StringInterner` already covers: interning
    /// the same literal text through a `StringLiteralTable` twice returns
    /// the same `DataId` — the identity `declare_data_in_func` threads into
    /// every function that references it — while distinct text never
    /// collides.
    #[test]
    fn string_literal_table_interns_identical_text_to_the_same_data_id() {
        proptest!(|(a in "[a-z]{1,12}", b in "[a-z]{1,12}")| {
            let isa = build_isa(OptLevel::Speed, true).expect("native isa");
            let builder = ObjectBuilder::new(isa, "probe".to_string(), cranelift_module::default_libcall_names())
                .expect("object builder");
            let mut module = ObjectModule::new(builder);
            let mut strings = StringLiteralTable::new();

            let first = strings.data_id(&mut module, &a).expect("intern a");
            let again = strings.data_id(&mut module, &a).expect("intern a again");
            prop_assert_eq!(first, again);

            let other = strings.data_id(&mut module, &b).expect("intern b");
            if a != b {
                prop_assert_ne!(first, other);
            }
        });
    }

    /// Universal invariant #4: `runtime_init_classes` creates and registers
    /// every declared class exactly once each, then resolves inheritance
    /// exactly once — after, not interleaved with, the create/register
    /// pass.
    #[test]
    fn runtime_init_classes_creates_and_registers_each_class_once_then_resolves_once() {
        proptest!(|(n in 0usize..6)| {
            let mut gen = NodeIdGen::new();
            let mut stmts = Vec::new();
            for i in 0..n {
                stmts.push(Stmt::new(
                    gen.next(),
                    StmtKind::ClassDecl(ClassDecl {
                        id: gen.next(),
                        name: format!("C{}", i),
                        parent: None,
                        fields: vec![],
                        methods: vec![],
                        constructor: None,
                    }),
                ));
            }
            let program = Program::new(stmts);
            let mut driver = Driver::new(CompileOptions { emit: EmitMode::Ll, ..Default::default() });
            let output = driver.run(&program).expect("class-only program should compile");
            let text = match output { DriverOutput::Ll(t) => t, _ => panic!("expected an Ll output") };
            let init_clif = extract_function_clif(&text, "runtime_init_classes");
            let imports = fresh_imports();

            prop_assert_eq!(count_calls(init_clif, imports.class_create_definition), n);
            prop_assert_eq!(count_calls(init_clif, imports.class_register_definition), n);
            prop_assert_eq!(count_calls(init_clif, imports.class_resolve_inheritance), 1);
        });
    }

    /// Universal invariant #5: the return-by-pointer ABI always puts the
    /// output `Value*` in parameter 0, with arity `1 + param_count` for a
    /// plain function and `2 + param_count` (the extra slot for `self`) for
    /// a method or constructor.
    #[test]
    fn function_and_method_signatures_have_the_documented_arity() {
        proptest!(|(param_count in 0usize..8, has_self in any::<bool>())| {
            let isa = build_isa(OptLevel::Speed, true).expect("native isa");
            let builder = ObjectBuilder::new(isa, "probe".to_string(), cranelift_module::default_libcall_names())
                .expect("object builder");
            let module = ObjectModule::new(builder);

            let sig = class_lowering::func_signature(&module, has_self, param_count);
            let expected_arity = if has_self { 2 + param_count } else { 1 + param_count };
            prop_assert_eq!(sig.params.len(), expected_arity);
            prop_assert_eq!(sig.params[0].value_type, bridge::ptr_ty(&module));
        });
    }
}

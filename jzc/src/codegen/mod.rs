/// Expression/Statement Codegen (spec §4.F "F"). One AST walk producing WAT
/// function bodies. Every jzc runtime value is represented uniformly as an
/// `f64` local/global — `src/value.rs`'s NaN-boxed encoding *is* the wasm
/// value codegen manipulates, not a higher-level type it narrows away.
/// `types::ElemType::I32` marks a value the inferencer knows is a safe
/// integer (a hint for a future peephole pass), not a distinct wasm local
/// type here; every seam that needs a real `i32` (a memory offset, an array
/// index, a loop counter) narrows with `i32.trunc_f64_s` and widens back
/// with `f64.convert_i32_s` at the call into a `src/prelude.rs` helper.
///
/// Closures (spec §4.H): a function value is a 2-slot heap object
/// `{fn_index, env}` under a reserved schema (`src/module.rs` interns it
/// first, always schema 0). A function with no captures never needs one —
/// calling it *by name* compiles to a direct `call`. Only when a function
/// value escapes as data (an arrow assigned to a binding, a capturing
/// nested function, anything passed as a callback argument other than the
/// handful of stdlib methods `src/stdlib.rs` inlines directly) does codegen
/// materialize the `{fn_index, env}` object and call through it indirectly
/// via `src/prelude.rs`'s `$closure_call` boxed-args trampoline.
///
/// Grounded on `axiom/src/compiler.rs`'s `RegAlloc`/`Compiler` (WAT locals
/// stand in for that register-VM's registers) and its per-`Expr`/`Stmt`
/// match-driven emission shape.
mod expr;
mod stmt;

use crate::ast::{self, FunctionDef};
use crate::closure::ClosureEnvs;
use crate::context::Context;
use crate::errors::{CompileError, Span};
use crate::prelude::PreludeNeeds;
use crate::scope::ScopeAnalysis;
use crate::types::TypeTable;
use crate::wat::WatBuilder;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// One compiled top-level WAT function, plus what `src/module.rs` needs to
/// wire it into exports and the closure dispatch table.
pub struct CompiledFunction {
    pub wat_name: String,
    pub source_name: String,
    pub arity: usize,
    pub has_env: bool,
    /// Position in the `call_indirect` function table, assigned
    /// sequentially as functions are compiled (`$start` gets none — it is
    /// never called indirectly).
    pub table_index: Option<u32>,
    /// The wasm local names `declare_pattern_local` assigned to this
    /// function's parameters, in source order — every one of them is
    /// declared inside `body` as a plain `(local ... f64)` alongside every
    /// other local (this codegen doesn't distinguish params from locals
    /// once bound), so `module.rs` emits fresh positional `(param ...)`
    /// slots and copies them into these names with a `local.set` prologue.
    pub param_names: Vec<String>,
    pub body: String,
}

pub struct CodegenOutput {
    pub functions: Vec<CompiledFunction>,
    pub needs: PreludeNeeds,
}

#[derive(Clone)]
struct FnTableEntry {
    wat_name: String,
    arity: usize,
    /// Position in the `call_indirect` function table (same numbering the
    /// pre-pass below and `generate`'s second pass both derive from source
    /// order), needed to materialize `{fn_index, env=0}` when a top-level
    /// function name is referenced as a value rather than called directly.
    table_index: u32,
}

/// Where an identifier resolves to, decided fresh at every reference by
/// walking the same three scopes `scope.rs`'s `Analyzer::resolve` walks:
/// a wasm local of the current function, a slot in its closure environment
/// record, or a module-scope wasm global.
enum Binding {
    Local(String),
    EnvSlot(u32),
    Global(String),
}

pub struct Generator<'a> {
    ctx: &'a mut Context,
    types: &'a TypeTable,
    scope: &'a ScopeAnalysis,
    envs: ClosureEnvs,
    /// Env-free top-level functions only — the direct-`call` fast path.
    /// Anything with captures (arrows, capturing nested declarations)
    /// always goes through the indirect closure-value path instead, so it
    /// is deliberately absent from this table.
    fn_table: HashMap<String, FnTableEntry>,

    needs: PreludeNeeds,
    functions: Vec<CompiledFunction>,
    next_table_index: u32,

    // Per-function transient state, reset by `finish_function_body` before
    // each new function body is walked.
    wat: WatBuilder,
    scopes: Vec<HashMap<String, String>>,
    const_names: HashSet<String>,
    declared_locals: Vec<String>,
    current_fn_span: Option<Span>,
    loop_labels: Vec<(String, String)>,
    named_labels: HashMap<String, (String, String)>,
}

pub fn generate(
    program: &ast::Program,
    scope: &ScopeAnalysis,
    types: &TypeTable,
    ctx: &mut Context,
) -> Result<CodegenOutput, CompileError> {
    let envs = ClosureEnvs::build(scope);
    let mut fn_table = HashMap::new();
    let mut next_table_index = 0u32;
    for item in &program.items {
        if let ast::Stmt::FunctionDecl(def) = &item.stmt {
            fn_table.insert(
                def.name.clone(),
                FnTableEntry {
                    wat_name: format!("$fn_{}_{}", sanitize(&def.name), def.span.start),
                    arity: def.params.len(),
                    table_index: next_table_index,
                },
            );
            next_table_index += 1;
        }
    }

    let mut gen = Generator {
        ctx,
        types,
        scope,
        envs,
        fn_table,
        needs: PreludeNeeds::new(),
        functions: Vec::new(),
        next_table_index,
        wat: WatBuilder::new(),
        scopes: vec![HashMap::new()],
        const_names: HashSet::new(),
        declared_locals: Vec::new(),
        current_fn_span: None,
        loop_labels: Vec::new(),
        named_labels: HashMap::new(),
    };

    // Top-level functions get a stable table index equal to their position
    // in source order, matching the pre-pass above; every later closure
    // (arrow, capturing nested declaration) is assigned the next free
    // index as codegen reaches it.
    let mut top_level_index = 0u32;
    for item in &program.items {
        match &item.stmt {
            ast::Stmt::FunctionDecl(def) => {
                gen.compile_top_level_function(def, top_level_index)?;
                top_level_index += 1;
            }
            other => gen.stmt(other)?,
        }
    }
    let start_body = gen.finish_function_body();
    gen.functions.push(CompiledFunction {
        wat_name: "$start".to_string(),
        source_name: "start".to_string(),
        arity: 0,
        has_env: false,
        table_index: None,
        param_names: Vec::new(),
        body: start_body,
    });

    Ok(CodegenOutput { functions: gen.functions, needs: gen.needs })
}

fn sanitize(name: &str) -> String {
    name.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect()
}

impl<'a> Generator<'a> {
    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Declares a fresh wasm local for `name` in the current (innermost)
    /// block scope, returning its wat name. Every declaration gets a
    /// globally-unique suffix so a shadowing `let` in a nested block never
    /// collides with an outer local of the same source name sharing one
    /// function-wide local list.
    fn declare_local(&mut self, name: &str) -> String {
        let wat_name = format!("$L_{}_{}", sanitize(name), self.declared_locals.len());
        self.declared_locals.push(wat_name.clone());
        self.scopes.last_mut().expect("at least one scope").insert(name.to_string(), wat_name.clone());
        wat_name
    }

    /// Declares `name` as a module-scope wasm global (spec §3.7) rather
    /// than a local — used only while compiling the synthetic top-level
    /// `start` function, since top-level bindings are what that spec
    /// section means by "represented as WebAssembly globals".
    fn declare_global(&mut self, name: &str) -> String {
        let idx = self.ctx.declare_global(name);
        format!("$G_{idx}")
    }

    fn resolve(&mut self, name: &str) -> Binding {
        for scope in self.scopes.iter().rev() {
            if let Some(wat_name) = scope.get(name) {
                return Binding::Local(wat_name.clone());
            }
        }
        if let Some(span) = self.current_fn_span {
            if let Some(layout) = self.envs.get(span) {
                if let Some(offset) = layout.offset_of(name) {
                    return Binding::EnvSlot(offset);
                }
            }
        }
        let idx = self.ctx.globals.get(name).copied().unwrap_or_else(|| self.ctx.declare_global(name));
        Binding::Global(format!("$G_{idx}"))
    }

    fn finish_function_body(&mut self) -> String {
        let mut header = WatBuilder::new();
        for local in &self.declared_locals {
            header.line(&format!("(local {local} f64)"));
        }
        let body = std::mem::take(&mut self.wat).finish();
        self.declared_locals.clear();
        self.scopes = vec![HashMap::new()];
        self.const_names.clear();
        format!("{}{}", header.finish(), body)
    }

    fn compile_top_level_function(&mut self, def: &Rc<FunctionDef>, table_index: u32) -> Result<(), CompileError> {
        let entry = self.fn_table.get(&def.name).cloned().expect("collected in the pre-pass");
        debug_assert!(self.envs.get(def.span).is_none(), "top-level functions never capture (spec §3.7)");
        self.current_fn_span = Some(def.span);
        self.push_scope();
        for param in &def.params {
            self.declare_pattern_local(param);
        }
        let param_names = self.declared_locals.clone();
        for stmt in &def.body {
            self.stmt(stmt)?;
        }
        self.pop_scope();
        let body = self.finish_function_body();
        self.current_fn_span = None;
        self.functions.push(CompiledFunction {
            wat_name: entry.wat_name,
            source_name: def.name.clone(),
            arity: entry.arity,
            has_env: false,
            table_index: Some(table_index),
            param_names,
            body,
        });
        Ok(())
    }

    /// Compiles the body of a closure (an arrow, or a nested function
    /// declaration that captures something) into its own top-level wasm
    /// function, returning `(table_index, has_env, wat_name)`. If it
    /// captures anything, the function gets a leading `$env i32` parameter;
    /// the caller (`expr.rs`'s `Arrow` case, `stmt.rs`'s nested
    /// `FunctionDecl` case) is responsible for allocating the env record
    /// and the `{fn_index, env}` closure object at the definition site.
    fn compile_closure(
        &mut self,
        name_hint: &str,
        span: Span,
        params: &[crate::sexpr::Pattern],
        body: ClosureBody,
    ) -> Result<(u32, bool, String), CompileError> {
        let table_index = self.next_table_index;
        self.next_table_index += 1;
        let wat_name = format!("$fn_{}_{}", sanitize(name_hint), span.start);
        let has_env = self.envs.get(span).is_some();

        let saved_span = self.current_fn_span;
        self.current_fn_span = Some(span);
        self.push_scope();
        for param in params {
            self.declare_pattern_local(param);
        }
        let param_names = self.declared_locals.clone();
        match body {
            ClosureBody::Block(stmts) => {
                for stmt in stmts {
                    self.stmt(stmt)?;
                }
            }
            ClosureBody::Expr(e) => {
                let value = self.expr(e)?;
                self.wat.line(&format!("(return {value})"));
            }
        }
        self.pop_scope();
        let body_text = self.finish_function_body();
        self.current_fn_span = saved_span;

        self.functions.push(CompiledFunction {
            wat_name: wat_name.clone(),
            source_name: name_hint.to_string(),
            arity: params.len(),
            has_env,
            table_index: Some(table_index),
            param_names,
            body: body_text,
        });
        Ok((table_index, has_env, wat_name))
    }

    /// Binds a (possibly destructured) parameter pattern to fresh locals,
    /// mirroring `scope.rs::declare_pattern`'s recursive shape.
    fn declare_pattern_local(&mut self, pattern: &crate::sexpr::Pattern) {
        use crate::sexpr::Pattern;
        match pattern {
            Pattern::Name(n) => {
                self.declare_local(n);
            }
            Pattern::Array(items) => {
                for p in items {
                    self.declare_pattern_local(p);
                }
            }
            Pattern::Object(props) => {
                for (_, p) in props {
                    self.declare_pattern_local(p);
                }
            }
        }
    }

    fn in_module_scope(&self) -> bool {
        self.current_fn_span.is_none()
    }
}

enum ClosureBody<'a> {
    Block(&'a [ast::Stmt]),
    Expr(&'a ast::Expr),
}

/// jzc — an ahead-of-time compiler from a disciplined JS subset to
/// WebAssembly.
///
/// Module layout (pipeline order, leaves first — spec §2):
///   - value      — NaN-boxed runtime value representation, type tags
///   - heap       — heap block layout, capacity tiers, schema table
///   - sexpr      — the external parser collaborator's output shape
///   - ast        — the normalized AST the rest of the pipeline walks
///   - normalize  — AST normalization: rewrites, constant folding, validation (B)
///   - scope      — free/captured/hoisted-set analysis per function (C)
///   - types      — per-node element type inference (D)
///   - stdlib     — per-receiver-type method dispatch tables (G)
///   - prelude    — conditionally-emitted WAT runtime helpers (E)
///   - codegen    — one-pass AST-to-WAT emission (F)
///   - wat        — small WAT text-builder helper
///   - closure    — environment record synthesis, captured-local rewriting (H)
///   - regex      — pattern parser + backtracking matcher emitter (I)
///   - module     — import/export collection, final WAT stitching (J)
///   - assembler  — the Assembler collaborator (WAT text -> binary)
///   - context    — the single per-invocation Context (schema/string tables)
///   - options    — CompileOptions and the documented option table
///   - report     — CompileReport / CompiledModule, the library's output shape
///   - errors     — CompileError taxonomy, Span, Warning
pub mod assembler;
pub mod ast;
pub mod closure;
pub mod codegen;
pub mod context;
pub mod errors;
pub mod heap;
pub mod module;
pub mod normalize;
pub mod options;
pub mod prelude;
pub mod regex;
pub mod report;
pub mod scope;
pub mod sexpr;
pub mod stdlib;
pub mod types;
pub mod value;
pub mod wat;

pub use context::Context;
pub use errors::{CompileError, CompileResult, Span, Warning};
pub use options::CompileOptions;
pub use report::{CompiledModule, CompileReport};

/// Runs the full pipeline over an already-parsed S-expression program:
/// normalize, analyze scope, infer types. Returns the merged warning list
/// alongside the artifacts codegen (once wired in) will consume. Exists as
/// the library's single entry point so `main.rs` and tests share one
/// code path rather than each re-deriving the pipeline order spec §2's
/// data-flow line specifies.
pub fn analyze(
    program: sexpr::Program,
    ctx: &mut Context,
) -> CompileResult<(ast::Program, scope::ScopeAnalysis, types::TypeTable, Vec<Warning>)> {
    let (normalized, mut warnings) = normalize::normalize(program)?;
    let scope_analysis = scope::analyze(&normalized)?;
    let type_table = types::infer(&normalized, ctx)?;
    warnings.extend(type_table.warnings.clone());
    Ok((normalized, scope_analysis, type_table, warnings))
}

/// Runs the complete pipeline (spec §2, A through J): normalize, analyze
/// scope, infer types, reserve the closure schema, generate per-function
/// WAT, stitch the final module, and — unless the caller only wants WAT
/// text — assemble it to a binary.
pub fn compile(
    program: sexpr::Program,
    options: &CompileOptions,
) -> CompileResult<(CompiledModule, CompileReport)> {
    let mut ctx = Context::new(options.max_schemas());
    module::reserve_closure_schema(&mut ctx);

    let (normalized, scope_analysis, type_table, warnings) = analyze(program, &mut ctx)?;
    let codegen_output = codegen::generate(&normalized, &scope_analysis, &type_table, &mut ctx)?;
    let assembled = module::assemble(&normalized, codegen_output, &ctx, &type_table, options)?;

    let report = CompileReport {
        schema_count: assembled.schema_count,
        interned_string_count: assembled.interned_string_count,
        regex_literal_count: assembled.regex_literal_count,
        export_count: assembled.export_count,
        warnings,
    };

    let module = match options.format {
        options::OutputFormat::Wat => CompiledModule::Wat(assembled.wat),
        options::OutputFormat::Binary => CompiledModule::Binary(assembler::assemble(&assembled.wat)?),
    };

    Ok((module, report))
}

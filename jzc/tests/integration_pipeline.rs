/// End-to-end tests driving the full pipeline (spec §2, A through J):
/// normalize → scope → types → codegen → module assembly → (skipped)
/// assembly to bytes. Programs are built by hand in the shape the external
/// parser collaborator would hand `jzc::compile` (spec §6) — this crate
/// has no tokenizer/parser of its own — and checked against the resulting
/// WAT text and `CompileReport`, since there is no bundled WebAssembly
/// execution engine to run the compiled bytes against (spec §1 excludes
/// it as an external collaborator).
use jzc::errors::Span;
use jzc::options::OutputFormat;
use jzc::sexpr::{DeclKind, Literal, Pattern, Program, SExpr, SStmt};
use jzc::CompileOptions;

fn wat_options() -> CompileOptions {
    CompileOptions { format: OutputFormat::Wat, ..CompileOptions::default() }
}

fn num(n: f64) -> SExpr {
    SExpr::Literal(Literal::Number(n), Span::default())
}

fn ident(name: &str) -> SExpr {
    SExpr::Identifier(name.to_string(), Span::default())
}

fn bin(op: &str, left: SExpr, right: SExpr) -> SExpr {
    SExpr::Binary { op: op.to_string(), left: Box::new(left), right: Box::new(right), span: Span::default() }
}

fn func(name: &str, params: &[&str], body: Vec<SStmt>) -> SStmt {
    SStmt::FunctionDecl {
        name: name.to_string(),
        params: params.iter().map(|p| Pattern::Name(p.to_string())).collect(),
        body,
        span: Span::default(),
    }
}

fn ret(e: SExpr) -> SStmt {
    SStmt::Return(Some(e), Span::default())
}

fn let_decl(name: &str, init: SExpr) -> SStmt {
    SStmt::Decl { kind: DeclKind::Let, pattern: Pattern::Name(name.to_string()), init: Some(init), span: Span::default() }
}

fn compile_wat(program: Program) -> (String, jzc::CompileReport) {
    let (module, report) = jzc::compile(program, &wat_options()).expect("pipeline should succeed");
    (module.as_wat().expect("format was requested as wat").to_string(), report)
}

#[test]
fn exported_function_appears_as_a_wasm_export() {
    let program = Program {
        items: vec![(func("add", &["a", "b"], vec![ret(bin("+", ident("a"), ident("b")))]), true)],
    };
    let (wat, report) = compile_wat(program);
    assert!(wat.contains(r#"(export "add""#), "missing export in:\n{wat}");
    assert_eq!(report.export_count, 1);
    assert!(!report.has_warnings());
}

#[test]
fn non_exported_function_does_not_appear_as_an_export() {
    let program = Program {
        items: vec![(func("helper", &["x"], vec![ret(ident("x"))]), false)],
    };
    let (wat, report) = compile_wat(program);
    assert!(!wat.contains(r#"(export "helper""#));
    assert_eq!(report.export_count, 0);
}

#[test]
fn exported_top_level_binding_becomes_a_global_export() {
    let program = Program { items: vec![(let_decl("answer", num(42.0)), true)] };
    let (wat, report) = compile_wat(program);
    assert!(wat.contains(r#"(export "answer" (global"#), "missing global export in:\n{wat}");
    assert_eq!(report.export_count, 1);
}

#[test]
fn math_atan2_compiles_to_a_two_argument_host_call() {
    let atan2_call = SExpr::Call {
        callee: Box::new(SExpr::Member {
            object: Box::new(ident("Math")),
            property: "atan2".to_string(),
            optional: false,
            span: Span::default(),
        }),
        args: vec![num(1.0), num(2.0)],
        optional: false,
        span: Span::default(),
    };
    let program = Program {
        items: vec![(func("angle", &[], vec![ret(atan2_call)]), true)],
    };
    let (wat, _) = compile_wat(program);
    assert!(wat.contains("call $math_atan2"));
    assert!(wat.contains(r#"(import "env" "math_atan2""#));
}

#[test]
fn math_pi_is_an_inline_constant_not_a_bogus_import() {
    let pi_ref = SExpr::Member {
        object: Box::new(ident("Math")),
        property: "PI".to_string(),
        optional: false,
        span: Span::default(),
    };
    let program = Program {
        items: vec![(func("circle_const", &[], vec![ret(pi_ref)]), true)],
    };
    let (wat, _) = compile_wat(program);
    assert!(!wat.contains("$math_PI"), "PI must not become a bogus host import call");
    assert!(wat.contains("3.14159"));
}

#[test]
fn regex_literal_pulls_in_the_matcher_runtime() {
    let regex_lit = SExpr::Regex { pattern: "a+".to_string(), flags: "".to_string(), span: Span::default() };
    let program = Program { items: vec![(let_decl("pattern", regex_lit), false)] };
    let (wat, report) = compile_wat(program);
    assert!(wat.contains("$regex_run"), "regex runtime should be emitted:\n{wat}");
    assert_eq!(report.regex_literal_count, 1);
}

#[test]
fn short_ascii_string_literal_never_touches_the_allocator_sized_table() {
    let program = Program { items: vec![(let_decl("greeting", SExpr::Literal(Literal::String("hi".to_string()), Span::default())), false)] };
    let (_, report) = compile_wat(program);
    assert_eq!(report.interned_string_count, 0, "\"hi\" fits in a short-string pointer, no heap string needed");
}

#[test]
fn long_string_literal_is_interned_into_the_string_table() {
    let text = "this literal is definitely longer than six bytes";
    let program = Program {
        items: vec![(let_decl("greeting", SExpr::Literal(Literal::String(text.to_string()), Span::default())), false)],
    };
    let (wat, report) = compile_wat(program);
    assert_eq!(report.interned_string_count, 1);
    assert!(wat.contains("$string_literal"));
}

#[test]
fn mutating_a_captured_local_is_a_compile_error() {
    let inner = func(
        "inner",
        &[],
        vec![
            SStmt::Expr(
                SExpr::Assign { op: "=".to_string(), target: Box::new(ident("x")), value: Box::new(num(1.0)), span: Span::default() },
                Span::default(),
            ),
        ],
    );
    let outer = func("outer", &[], vec![let_decl("x", num(0.0)), inner, ret(ident("x"))]);
    let program = Program { items: vec![(outer, true)] };

    let result = jzc::compile(program, &CompileOptions::default());
    assert!(result.is_err(), "writing to a captured local must be rejected at compile time");
}

#[test]
fn binary_format_assembles_to_a_valid_wasm_header() {
    let program = Program {
        items: vec![(func("identity", &["x"], vec![ret(ident("x"))]), true)],
    };
    let (module, _) = jzc::compile(program, &CompileOptions::default()).expect("pipeline should succeed");
    let bytes = module.as_binary().expect("format was requested as binary");
    assert_eq!(&bytes[0..4], b"\0asm");
}

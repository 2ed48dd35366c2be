/// Module Assembly (spec §4.J): takes `codegen::generate`'s per-function
/// WAT bodies and stitches them into one complete textual module — global
/// declarations, the interned-string and regex-bytecode data segment, the
/// closure/regex `call_indirect` tables, host imports for the transcendental
/// `Math` members, the `_alloc`/`_memory` host-marshalling surface, and the
/// `jz:sig` custom section (spec §6).
///
/// Grounded on `axiom/src/compiler.rs`'s final assembly pass (it stitches a
/// `Vec<u32>` bytecode buffer the same way this stitches WAT text) and
/// `src/prelude.rs`'s own "write into one `String`" style, which this reuses
/// directly for the data segment and function-table rendering.
use crate::ast;
use crate::codegen::{CodegenOutput, CompiledFunction};
use crate::context::Context;
use crate::errors::CompileError;
use crate::heap::{HEADER_SIZE, SLOT_SIZE};
use crate::options::CompileOptions;
use crate::prelude::{self, PreludeNeeds};
use crate::regex;
use crate::sexpr::Pattern;
use crate::types::{ElemType, TypeTable};
use crate::value::{NanVal, TypeTag};
use serde::Serialize;
use std::fmt::Write as _;

/// Every jzc module reserves schema 0 for the `{fn_index, env}` closure
/// object (spec §4.H) before codegen assigns any real object literal a
/// schema, so `typeof` and the closure-call trampoline can recognize a
/// function value by its `id == 0` alone rather than tracking a separate
/// bit. Must run before `codegen::generate`.
pub fn reserve_closure_schema(ctx: &mut Context) -> u16 {
    ctx.schemas
        .intern(vec!["fn_index".to_string(), "env".to_string()])
        .expect("the very first schema always fits under the limit")
}

pub struct AssembledModule {
    pub wat: String,
    pub schema_count: usize,
    pub interned_string_count: usize,
    pub regex_literal_count: usize,
    pub export_count: usize,
}

/// One interned string laid out in the reserved memory region ahead of the
/// bump allocator: `offset` is the payload's byte address (what a boxed
/// `NanVal` for this literal points at), `header`/`payload` are the raw
/// bytes `$string_literal`'s jump table never has to compute at runtime.
struct LaidOutString {
    offset: u32,
    bits: i64,
}

struct LaidOutRegex {
    /// Byte offset of the bytecode's first word.
    offset: u32,
    capture_count: u32,
    case_insensitive: bool,
    wat_name: String,
}

#[derive(Serialize)]
struct ExportSig {
    #[serde(rename = "arrayParams")]
    array_params: Vec<bool>,
    #[serde(rename = "arrayReturn")]
    array_return: bool,
}

const MATH_UNARY: &[&str] = &["log", "log2", "log10", "exp", "sin", "cos", "tan", "cbrt"];
const MATH_BINARY: &[&str] = &["atan2", "hypot"];

pub fn assemble(
    program: &ast::Program,
    codegen: CodegenOutput,
    ctx: &Context,
    types: &TypeTable,
    options: &CompileOptions,
) -> Result<AssembledModule, CompileError> {
    let CodegenOutput { functions, mut needs } = codegen;

    // `_alloc`'s host-marshalling surface always needs both allocators on
    // the linear-memory path, regardless of what the program itself touches
    // (spec §6: "_alloc(type, length) -> f64" is unconditional when gc:false).
    if !options.gc {
        needs.arrays = true;
        needs.strings = true;
    }

    let (strings, strings_bytes) = layout_strings(ctx);
    let (regexes, regex_bytes, _) = layout_regexes(ctx, strings_bytes.len() as u32)?;

    let mut reserved = strings_bytes.len() as u32 + regex_bytes.len() as u32;
    if reserved % SLOT_SIZE != 0 {
        reserved += SLOT_SIZE - (reserved % SLOT_SIZE);
    }
    let reserved = reserved.max(options.reserved_prelude_bytes);

    let mut out = String::new();
    writeln!(out, "(module").unwrap();

    if needs.closures {
        writeln!(out, "  (type $closure_sig (func (param i32 i32 i32) (result f64)))").unwrap();
    }
    if needs.regex {
        writeln!(out, "  (type $regex_matcher (func (param i32) (result i32)))").unwrap();
    }

    if !options.gc {
        for member in MATH_UNARY {
            writeln!(out, r#"  (import "env" "math_{member}" (func $math_{member} (param f64) (result f64)))"#).unwrap();
        }
        for member in MATH_BINARY {
            writeln!(out, r#"  (import "env" "math_{member}" (func $math_{member} (param f64 f64) (result f64)))"#).unwrap();
        }
        writeln!(out, r#"  (import "env" "math_random" (func $math_random (result f64)))"#).unwrap();
        writeln!(out, r#"  (import "env" "math_pow" (func $pow (param f64 f64) (result f64)))"#).unwrap();
    }

    for (name, idx) in sorted_globals(ctx) {
        let _ = name;
        writeln!(out, "  (global $G_{idx} (mut f64) (f64.const 0))").unwrap();
    }

    if !options.gc {
        out.push_str(&prelude::emit(&needs, options, reserved));
        emit_is_non_finite(&mut out);
        emit_typeof_tag(&mut out);
        emit_string_literal(&mut out, &strings);
    }

    if needs.closures {
        emit_closure_table(&mut out, &functions);
    }
    if needs.regex {
        out.push_str(&regex::emit_runtime());
        for r in &regexes {
            out.push_str(&regex::emit_literal_function(&r.wat_name, r.offset, r.capture_count, r.case_insensitive));
        }
        emit_regex_table(&mut out, &regexes);
    }

    for f in &functions {
        emit_function(&mut out, f);
    }

    if !options.gc {
        let data = build_data_segment(&strings_bytes, &regex_bytes, reserved);
        if !data.is_empty() {
            writeln!(out, "  (data (i32.const 0) \"{}\")", data).unwrap();
        }
        writeln!(out, "  (export \"_alloc\" (func $_alloc))").unwrap();
        emit_host_alloc(&mut out);
    }

    let mut export_count = 0usize;
    let mut sigs = std::collections::BTreeMap::new();
    for item in &program.items {
        if !item.exported {
            continue;
        }
        match &item.stmt {
            ast::Stmt::FunctionDecl(def) => {
                if let Some(f) = functions.iter().find(|f| f.source_name == def.name && f.table_index.is_some() && !f.has_env) {
                    writeln!(out, "  (export \"{}\" (func {}))", def.name, f.wat_name).unwrap();
                    export_count += 1;
                    let array_return = types
                        .function_returns
                        .get(&def.span)
                        .map(is_array_type)
                        .unwrap_or(false);
                    sigs.insert(
                        def.name.clone(),
                        ExportSig { array_params: vec![false; f.arity], array_return },
                    );
                }
            }
            ast::Stmt::Decl { pattern: Pattern::Name(name), .. } => {
                if let Some(&idx) = ctx.globals.get(name) {
                    writeln!(out, "  (export \"{name}\" (global $G_{idx}))").unwrap();
                    export_count += 1;
                }
            }
            _ => {}
        }
    }

    if !options.gc {
        writeln!(out, "  (start $start)").unwrap();
    }
    writeln!(out, ")").unwrap();

    if !sigs.is_empty() {
        let json = serde_json::to_string(&sigs).expect("ExportSig is always representable as JSON");
        out.push_str(&format!(";; jz:sig {json}\n"));
    }

    Ok(AssembledModule {
        wat: out,
        schema_count: ctx.schemas.len(),
        interned_string_count: strings.len(),
        regex_literal_count: regexes.len(),
        export_count,
    })
}

fn is_array_type(ty: &ElemType) -> bool {
    match ty {
        ElemType::Array(_) => true,
        ElemType::Nullable(inner) => is_array_type(inner),
        _ => false,
    }
}

fn sorted_globals(ctx: &Context) -> Vec<(String, u32)> {
    let mut v: Vec<(String, u32)> = ctx.globals.iter().map(|(n, &i)| (n.clone(), i)).collect();
    v.sort_by_key(|(_, i)| *i);
    v
}

/// Lays out every interned string (spec §3.4) as `header(8 bytes:
/// length,capacity) + UTF-16LE payload`, back to back starting at byte 0.
/// Short ASCII literals (<=6 bytes) never reach `ctx.strings` at all —
/// `codegen/expr.rs`'s `string_literal` packs them directly into the
/// NaN-boxed bits instead — so every entry here genuinely needs a heap
/// block.
fn layout_strings(ctx: &Context) -> (Vec<LaidOutString>, Vec<u8>) {
    let mut bytes = Vec::new();
    let mut out = Vec::new();
    for s in ctx.strings.iter_in_order() {
        let units: Vec<u16> = s.encode_utf16().collect();
        let len = units.len() as u32;
        bytes.extend_from_slice(&len.to_le_bytes());
        bytes.extend_from_slice(&len.to_le_bytes());
        let offset = bytes.len() as u32;
        for u in &units {
            bytes.extend_from_slice(&u.to_le_bytes());
        }
        let bits = NanVal::from_ptr(TypeTag::String, 0, offset).raw() as i64;
        out.push(LaidOutString { offset, bits });
    }
    (out, bytes)
}

/// Compiles every regex literal (spec §4.I) to bytecode and lays the words
/// out back to back immediately after the string table, returning the
/// combined byte buffer and each pattern's base offset.
fn layout_regexes(ctx: &Context, base: u32) -> Result<(Vec<LaidOutRegex>, Vec<u8>, u32), CompileError> {
    let mut bytes = Vec::new();
    let mut out = Vec::new();
    for (i, key) in ctx.regex_literals.iter().enumerate() {
        let mut parts = key.splitn(2, '\u{0}');
        let pattern = parts.next().unwrap_or_default();
        let flags = parts.next().unwrap_or_default();
        let compiled = regex::compile_pattern(pattern, flags, crate::errors::Span::new(0, 0))?;
        let offset = base + bytes.len() as u32;
        for word in &compiled.words {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        out.push(LaidOutRegex {
            offset,
            capture_count: compiled.capture_count,
            case_insensitive: compiled.case_insensitive,
            wat_name: format!("$regex_m{i}"),
        });
    }
    Ok((out, bytes, base))
}

fn build_data_segment(strings: &[u8], regexes: &[u8], reserved: u32) -> String {
    let mut bytes = Vec::with_capacity(reserved as usize);
    bytes.extend_from_slice(strings);
    bytes.extend_from_slice(regexes);
    bytes.resize(reserved as usize, 0);
    let mut escaped = String::with_capacity(bytes.len() * 4);
    for b in bytes {
        write!(escaped, "\\{:02x}", b).unwrap();
    }
    escaped
}

/// A jump table over `$idx`: branching to label `$bN` lands on the return
/// for string `N`. Built inside-out — each successive wrap adds one more
/// enclosing block plus the `return` that sits just past its own closing
/// paren, so exiting to `$bN` skips every case below it and lands exactly
/// on case `N`'s return.
fn emit_string_literal(out: &mut String, strings: &[LaidOutString]) {
    if strings.is_empty() {
        writeln!(
            out,
            r#"  (func $string_literal (param $idx i32) (result f64)
    (f64.const nan:0x8000000000000))
"#
        )
        .unwrap();
        return;
    }
    let mut targets = String::new();
    for i in 0..strings.len() {
        write!(targets, "$b{i} ").unwrap();
    }
    write!(targets, "$default").unwrap();

    let mut body = format!("(br_table {targets} (local.get $idx))");
    for (i, s) in strings.iter().enumerate() {
        body = format!("(block $b{i} {body}) (return (f64.reinterpret_i64 (i64.const {})))", s.bits);
    }
    writeln!(
        out,
        r#"  (func $string_literal (param $idx i32) (result f64)
    (block $default {body})
    (unreachable))
"#
    )
    .unwrap();
}

/// `typeof` dispatch (spec §4.F): a plain (non-pointer) f64 is `"number"`;
/// pointer tags map one-to-one except `Object`, which is further split on
/// `id == 0` — the reserved closure schema — into `"function"` vs
/// `"object"`. Every returned string is a short literal that fits inline
/// (spec §3.4), so this never allocates.
fn emit_typeof_tag(out: &mut String) {
    let short = |s: &str| NanVal::from_short_string(s.as_bytes()).raw() as i64;
    writeln!(
        out,
        r#"  (func $typeof_tag (param $v f64) (result f64)
    (local $bits i64)
    (local $tag i64)
    (local.set $bits (i64.reinterpret_f64 (local.get $v)))
    (if (result f64) (i32.eqz (i32.and (i64.eq (i64.and (local.get $bits) (i64.const {qnan})) (i64.const {qnan})) (i32.eqz (f64.ne (local.get $v) (local.get $v)))))
      (then (f64.reinterpret_i64 (i64.const {num})))
      (else
        (local.set $tag (i64.and (i64.shr_u (local.get $bits) (i64.const {tag_shift})) (i64.const 7)))
        (if (result f64) (i64.eq (local.get $tag) (i64.const {str_tag}))
          (then (f64.reinterpret_i64 (i64.const {str})))
          (else
            (if (result f64) (i64.eq (local.get $tag) (i64.const {obj_tag}))
              (then
                (if (result f64) (i64.eqz (i64.and (i64.shr_u (local.get $bits) (i64.const {id_shift})) (i64.const 0xFFFF)))
                  (then (f64.reinterpret_i64 (i64.const {func})))
                  (else (f64.reinterpret_i64 (i64.const {obj})))))
              (else (f64.reinterpret_i64 (i64.const {obj})))))))))
"#,
        qnan = crate::value::QNAN_PREFIX as i64,
        num = short("number"),
        tag_shift = crate::value::TAG_SHIFT,
        str_tag = TypeTag::String.bits(),
        str = short("string"),
        obj_tag = TypeTag::Object.bits(),
        id_shift = crate::value::ID_SHIFT,
        func = short("function"),
        obj = short("object"),
    )
    .unwrap();
}

/// `Number.isFinite`/`isNaN` peel the sign/exponent bits directly rather
/// than comparing against `f64::INFINITY`, matching the bit-level style the
/// rest of the value model (`src/value.rs`) already uses.
fn emit_is_non_finite(out: &mut String) {
    writeln!(
        out,
        r#"  (func $is_non_finite (param $x f64) (result i32)
    (i32.or (f64.eq (local.get $x) (f64.const inf)) (f64.eq (local.get $x) (f64.const -inf))))
"#
    )
    .unwrap();
}

/// `_alloc`'s `type` argument uses the same `TypeTag` numbering
/// `src/value.rs` assigns; only `Array`/`String` are reachable from a host
/// that only ever asks for the two reference types it can marshal without
/// a schema (spec §6 "for host marshalling").
fn emit_host_alloc(out: &mut String) {
    writeln!(
        out,
        r#"  (func $_alloc (param $type i32) (param $length i32) (result f64)
    (local $block i32)
    (if (result f64) (i32.eq (local.get $type) (i32.const {array_tag}))
      (then
        (local.set $block (call $array_alloc (local.get $length)))
        {array_box})
      (else
        (if (result f64) (i32.eq (local.get $type) (i32.const {string_tag}))
          (then
            (local.set $block (call $string_alloc (local.get $length)))
            {string_box})
          (else (f64.reinterpret_i64 (i64.const {undefined})))))))
"#,
        array_tag = TypeTag::Array.bits(),
        string_tag = TypeTag::String.bits(),
        array_box = box_ptr(TypeTag::Array, "(i32.const 0)", "(local.get $block)"),
        string_box = box_ptr(TypeTag::String, "(i32.const 0)", "(local.get $block)"),
        undefined = crate::value::UNDEFINED_BITS as i64,
    )
    .unwrap();
}

fn box_ptr(tag: TypeTag, id_expr: &str, offset_expr: &str) -> String {
    format!(
        "(f64.reinterpret_i64 (i64.or (i64.or (i64.const {prefix}) (i64.shl (i64.extend_i32_u {id_expr}) (i64.const 32))) (i64.extend_i32_u {offset_expr})))",
        prefix = (crate::value::QNAN_PREFIX | tag.bits()) as i64,
    )
}

/// One table entry per compiled function carrying a `table_index` —
/// top-level non-capturing functions and every materialized closure alike,
/// since a value boxed from either can flow into the same indirect call
/// site (spec §4.H).
fn emit_closure_table(out: &mut String, functions: &[CompiledFunction]) {
    let mut entries: Vec<&CompiledFunction> = functions.iter().filter(|f| f.table_index.is_some()).collect();
    entries.sort_by_key(|f| f.table_index.unwrap());
    let size = entries.last().map(|f| f.table_index.unwrap() + 1).unwrap_or(0);
    writeln!(out, "  (table {size} funcref)").unwrap();
    if !entries.is_empty() {
        let names: Vec<String> = entries.iter().map(|f| f.wat_name.clone()).collect();
        writeln!(out, "  (elem (i32.const 0) {})", names.join(" ")).unwrap();
    }
}

fn emit_regex_table(out: &mut String, regexes: &[LaidOutRegex]) {
    writeln!(out, "  (table {} funcref)", regexes.len()).unwrap();
    if !regexes.is_empty() {
        let names: Vec<String> = regexes.iter().map(|r| r.wat_name.clone()).collect();
        writeln!(out, "  (elem (i32.const 0) {})", names.join(" ")).unwrap();
    }
}

/// Emits one function, translating the `param_names`-as-locals convention
/// `codegen` uses (see `CompiledFunction::param_names`) into real wasm
/// parameters: fresh positional slots copied into the named locals the
/// body already references.
fn emit_function(out: &mut String, f: &CompiledFunction) {
    let (locals, instructions) = split_locals_header(&f.body);

    write!(out, "  (func {}", f.wat_name).unwrap();
    if f.wat_name == "$start" {
        out.push('\n');
        out.push_str(&locals);
        out.push_str(&instructions);
        out.push_str("  )\n");
        return;
    }

    if f.has_env {
        out.push_str(" (param $env i32)");
    }
    for i in 0..f.arity {
        write!(out, " (param $a{i} f64)").unwrap();
    }
    out.push_str(" (result f64)\n");
    out.push_str(&locals);
    for (i, name) in f.param_names.iter().enumerate() {
        writeln!(out, "    (local.set {name} (local.get $a{i}))").unwrap();
    }
    out.push_str(&instructions);
    out.push_str("  )\n");
}

/// `CompiledFunction::body` is `finish_function_body`'s concatenation of a
/// flat run of `(local $name f64)` declarations (the wasm local section,
/// which must precede every instruction in a function body) followed by
/// the actual instruction stream. Splits the two back apart so the
/// parameter copy-in prologue can be inserted between them rather than
/// ahead of the required local section.
fn split_locals_header(body: &str) -> (String, String) {
    let mut split_at = 0;
    for line in body.split_inclusive('\n') {
        if line.trim_start().starts_with("(local ") {
            split_at += line.len();
        } else {
            break;
        }
    }
    (body[..split_at].to_string(), body[split_at..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::MAX_SCHEMAS;

    #[test]
    fn reserving_closure_schema_takes_id_zero() {
        let mut ctx = Context::new(MAX_SCHEMAS);
        assert_eq!(reserve_closure_schema(&mut ctx), 0);
    }

    #[test]
    fn layout_strings_places_first_string_right_after_its_header() {
        let ctx = Context::new(MAX_SCHEMAS);
        ctx.strings.intern("hello world");
        let (laid, bytes) = layout_strings(&ctx);
        assert_eq!(laid.len(), 1);
        assert_eq!(laid[0].offset, HEADER_SIZE);
        assert_eq!(bytes.len(), HEADER_SIZE as usize + "hello world".encode_utf16().count() * 2);
    }

    #[test]
    fn short_ascii_strings_never_reach_the_interner() {
        // `string_literal` in codegen/expr.rs packs these inline instead —
        // this just documents the contract `layout_strings` depends on.
        let ctx = Context::new(MAX_SCHEMAS);
        assert_eq!(ctx.strings.len(), 0);
    }

    #[test]
    fn regex_literals_lay_out_after_the_string_table() {
        let mut ctx = Context::new(MAX_SCHEMAS);
        ctx.intern_regex("a+", "");
        let (laid, bytes, base) = layout_regexes(&ctx, 16).unwrap();
        assert_eq!(laid.len(), 1);
        assert_eq!(laid[0].offset, 16);
        assert_eq!(base, 16);
        assert!(!bytes.is_empty());
    }

    #[test]
    fn export_sig_serializes_with_expected_field_names() {
        let sig = ExportSig { array_params: vec![true, false], array_return: true };
        let json = serde_json::to_string(&sig).unwrap();
        assert!(json.contains("\"arrayParams\""));
        assert!(json.contains("\"arrayReturn\""));
    }
}

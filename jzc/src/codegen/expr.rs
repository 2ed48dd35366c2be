use super::{Binding, ClosureBody, Generator};
use crate::ast::{self, AssignOp, BinOp, Expr, Lit, LogicalOp, Namespace, UnaryOp, WhitelistedCtor};
use crate::errors::{CodegenError, CompileError, SemanticError, Span};
use crate::types::ElemType;
use crate::value::{TypeTag, QNAN_PREFIX, TAG_MASK, NULL_BITS, UNDEFINED_BITS};
use std::fmt::Write as _;

use super::stmt::{is_ring_expr, nan_ptr_expr};

/// `ElemType::Nullable` is transparent to every access this module performs
/// (optional chaining only wraps the *result*, not the receiver check).
/// Mirrors `types.rs`'s private `strip_nullable` — kept as its own copy here
/// since that one isn't `pub`.
fn strip_nullable(ty: &ElemType) -> &ElemType {
    match ty {
        ElemType::Nullable(inner) => inner,
        other => other,
    }
}

impl<'a> Generator<'a> {
    /// Lowers `expr` to a single WAT expression producing one `f64` — jzc's
    /// uniform runtime value representation (`src/value.rs`). Every
    /// sub-expression is likewise one `f64`-producing s-expression string;
    /// this is a tree of nested s-expressions, not a sequence of
    /// instructions, matching `axiom/src/compiler.rs::compile_expr`'s
    /// register-returning shape with WAT's expression stack standing in
    /// for that register file.
    pub(super) fn expr(&mut self, expr: &Expr) -> Result<String, CompileError> {
        match expr {
            Expr::Literal(lit, span) => self.literal(lit, *span),

            Expr::Identifier(name, span) => self.read_identifier(name, *span),

            Expr::Array(items, _) => self.array_literal(items),

            Expr::Object(props, span) => self.object_literal(props, *span),

            Expr::Unary { op, operand, span } => self.unary(*op, operand, *span),

            Expr::Binary { op, left, right, span } => {
                let l = self.expr(left)?;
                let r = self.expr(right)?;
                Ok(self.binary(*op, &l, &r, *span))
            }

            Expr::Logical { op, left, right, .. } => {
                let l = self.expr(left)?;
                let r = self.expr(right)?;
                let tmp = self.declare_local("logical_lhs");
                let lhs_truthy = self.truthy(&format!("(local.get {tmp})"));
                let keep_left = match op {
                    LogicalOp::And => format!("(i32.eqz {lhs_truthy})"),
                    LogicalOp::Or => lhs_truthy,
                };
                Ok(format!(
                    "(block (result f64) (local.set {tmp} {l}) (if (result f64) {keep_left} (then (local.get {tmp})) (else {r})))"
                ))
            }

            Expr::Nullish { left, right, .. } => {
                let l = self.expr(left)?;
                let r = self.expr(right)?;
                let tmp = self.declare_local("nullish_lhs");
                let nullish = self.is_nullish(&format!("(local.get {tmp})"));
                Ok(format!(
                    "(block (result f64) (local.set {tmp} {l}) (if (result f64) {nullish} (then {r}) (else (local.get {tmp}))))"
                ))
            }

            Expr::Assign { op, target, value, span } => self.assign(*op, target, value, *span),

            Expr::Conditional { test, consequent, alternate, .. } => {
                let cond = self.expr(test)?;
                let truthy = self.truthy(&cond);
                let then_branch = self.expr(consequent)?;
                let else_branch = self.expr(alternate)?;
                Ok(format!("(if (result f64) {truthy} (then {then_branch}) (else {else_branch}))"))
            }

            Expr::Call { callee, args, span, .. } => self.call(callee, args, *span),

            Expr::New { ctor, args, span } => self.new_expr(*ctor, args, *span),

            Expr::Member { object, property, span, .. } => self.member(object, property, *span),

            Expr::Index { object, index, span, .. } => self.index(object, index, *span),

            Expr::MethodCall { object, method, args, span, .. } => self.method_call(object, method, args, *span),

            Expr::Arrow { params, body, span, .. } => self.arrow(params, body, *span),

            Expr::NamespaceCall { namespace, member, args, span } => self.namespace_call(*namespace, member, args, *span),

            Expr::Sequence(exprs, _) => {
                let mut parts = Vec::with_capacity(exprs.len());
                for (i, e) in exprs.iter().enumerate() {
                    let v = self.expr(e)?;
                    if i + 1 == exprs.len() {
                        parts.push(v);
                    } else {
                        parts.push(format!("(drop {v})"));
                    }
                }
                Ok(format!("(block (result f64) {})", parts.join(" ")))
            }

            Expr::Regex { pattern, flags, .. } => {
                let idx = self.ctx.intern_regex(pattern, flags);
                self.needs.regex = true;
                Ok(self.box_ptr(TypeTag::Typed, "(i32.const 0)", &format!("(i32.const {idx})")))
            }
        }
    }

    fn literal(&mut self, lit: &Lit, _span: Span) -> Result<String, CompileError> {
        Ok(match lit {
            Lit::Number(n) => {
                if n.is_nan() {
                    self.const_bits(QNAN_PREFIX)
                } else {
                    format!("(f64.const {n:?})")
                }
            }
            Lit::Str(s) => self.string_literal(s),
            Lit::Bool(b) => format!("(f64.const {})", if *b { 1.0 } else { 0.0 }),
            Lit::Null => self.const_bits(NULL_BITS),
            Lit::Undefined => self.const_bits(UNDEFINED_BITS),
        })
    }

    /// Strings up to six ASCII bytes pack directly into the NaN-boxed
    /// encoding (spec §3.4) and need no heap allocation at all. Longer
    /// literals are interned once per module (`ctx.strings`) and
    /// referenced by index through the literal table `src/module.rs`
    /// builds alongside the data segment holding their code units.
    fn string_literal(&mut self, s: &str) -> String {
        if s.is_ascii() && s.len() <= 6 {
            let bits = crate::value::NanVal::from_short_string(s.as_bytes()).raw();
            self.const_bits(bits)
        } else {
            let idx = self.ctx.strings.intern(s);
            format!("(call $string_literal (i32.const {idx}))")
        }
    }

    fn const_bits(&self, bits: u64) -> String {
        format!("(f64.reinterpret_i64 (i64.const {}))", bits as i64)
    }

    /// Packs a heap pointer into jzc's uniform NaN-boxed `f64` (mirrors
    /// `value::NanVal::from_ptr`, emitted as WAT arithmetic on the i32 the
    /// allocator returned instead of evaluated host-side).
    fn box_ptr(&self, tag: TypeTag, id_expr: &str, offset_expr: &str) -> String {
        format!(
            "(f64.reinterpret_i64 (i64.or (i64.or (i64.const {prefix}) (i64.shl (i64.extend_i32_u {id_expr}) (i64.const 32))) (i64.extend_i32_u {offset_expr})))",
            prefix = (QNAN_PREFIX | tag.bits()) as i64,
        )
    }

    /// Boxes the i32 payload pointer already sitting in local `block_local`.
    fn box_ptr_local(&self, block_local: &str, tag: TypeTag) -> String {
        self.box_ptr(tag, "(i32.const 0)", &format!("(local.get {block_local})"))
    }

    /// A value is truthy (spec's JS-subset semantics) unless it is `false`,
    /// `0`, `NaN`, `null`, or `undefined`; every other heap pointer is
    /// truthy. `value` is evaluated exactly once via a scratch local.
    fn truthy(&mut self, value: &str) -> String {
        let tmp = self.declare_local("truthy_tmp");
        format!(
            "(block (result i32) \
               (local.set {tmp} {value}) \
               (i32.and \
                 (i32.and (f64.ne (local.get {tmp}) (f64.const 0)) (f64.eq (local.get {tmp}) (local.get {tmp}))) \
                 (i32.and \
                   (i64.ne (i64.reinterpret_f64 (local.get {tmp})) (i64.const {null})) \
                   (i64.ne (i64.reinterpret_f64 (local.get {tmp})) (i64.const {undef})))))",
            null = NULL_BITS as i64,
            undef = UNDEFINED_BITS as i64,
        )
    }

    /// `value == null || value == undefined` under reference equality on
    /// the encoded bits.
    fn is_nullish(&mut self, value: &str) -> String {
        let tmp = self.declare_local("nullish_tmp");
        format!(
            "(block (result i32) \
               (local.set {tmp} {value}) \
               (i32.or \
                 (i64.eq (i64.reinterpret_f64 (local.get {tmp})) (i64.const {null})) \
                 (i64.eq (i64.reinterpret_f64 (local.get {tmp})) (i64.const {undef}))))",
            null = NULL_BITS as i64,
            undef = UNDEFINED_BITS as i64,
        )
    }

    /// Is `name` shadowed by a local binding or a closure environment slot
    /// in the current function? Deliberately does not fall through to
    /// `resolve`'s global-declaring branch — this is a pure lookup used to
    /// decide whether a bare top-level function name still refers to that
    /// function (referencing a function by name that isn't locally
    /// shadowed materializes its closure value instead).
    fn is_locally_shadowed(&self, name: &str) -> bool {
        if self.scopes.iter().rev().any(|scope| scope.contains_key(name)) {
            return true;
        }
        if let Some(span) = self.current_fn_span {
            if let Some(layout) = self.envs.get(span) {
                if layout.offset_of(name).is_some() {
                    return true;
                }
            }
        }
        false
    }

    fn read_identifier(&mut self, name: &str, _span: Span) -> Result<String, CompileError> {
        if !self.is_locally_shadowed(name) {
            if let Some(entry) = self.fn_table.get(name).cloned() {
                return Ok(self.box_ptr(TypeTag::Object, "(i32.const 0)", &format!("(i32.const {})", entry.table_index)));
            }
        }
        Ok(match self.resolve(name) {
            Binding::Local(wat) => format!("(local.get {wat})"),
            Binding::Global(wat) => format!("(global.get {wat})"),
            Binding::EnvSlot(offset) => format!("(f64.load offset={offset} (local.get {}))", self.env_param_name()),
        })
    }

    fn env_param_name(&self) -> &'static str {
        "$env"
    }

    fn array_literal(&mut self, items: &[Expr]) -> Result<String, CompileError> {
        self.needs.arrays = true;
        self.needs.request("$array_push_like");
        let block = self.declare_local("array_tmp");
        let mut out = format!("(local.set {block} (call $array_alloc (i32.const {})))", items.len());
        for item in items {
            let v = self.expr(item)?;
            write!(out, " (local.set {block} (call $array_push_like (local.get {block}) (i32.const 0) {v}))").ok();
        }
        Ok(format!("(block (result f64) {out} {})", self.box_ptr_local(&block, TypeTag::Array)))
    }

    fn object_literal(&mut self, props: &[(String, Expr)], span: Span) -> Result<String, CompileError> {
        let names: Vec<String> = props.iter().map(|(n, _)| n.clone()).collect();
        let schema_id = self.ctx.schemas.intern(names).map_err(|()| SemanticError::SchemaLimitExceeded { span })?;
        let block = self.declare_local("object_tmp");
        let byte_size = self.ctx.schemas.get(schema_id).byte_size();
        let mut out = format!("(local.set {block} (call $alloc (i32.const 0) (i32.const {byte_size})))");
        for (i, (_, value)) in props.iter().enumerate() {
            let v = self.expr(value)?;
            write!(out, " (f64.store offset={} (local.get {block}) {v})", i as u32 * crate::heap::SLOT_SIZE).ok();
        }
        Ok(format!(
            "(block (result f64) {out} {})",
            self.box_ptr(TypeTag::Object, &format!("(i32.const {schema_id})"), &format!("(local.get {block})"))
        ))
    }

    fn unary(&mut self, op: UnaryOp, operand: &Expr, _span: Span) -> Result<String, CompileError> {
        let v = self.expr(operand)?;
        Ok(match op {
            UnaryOp::Neg => format!("(f64.neg {v})"),
            UnaryOp::Plus => v,
            UnaryOp::Not => {
                let truthy = self.truthy(&v);
                format!("(f64.convert_i32_s (i32.eqz {truthy}))")
            }
            UnaryOp::BitNot => format!("(f64.convert_i32_s (i32.xor (i32.trunc_f64_s {v}) (i32.const -1)))"),
            UnaryOp::TypeOf => format!("(call $typeof_tag {v})"),
        })
    }

    fn binary(&mut self, op: BinOp, l: &str, r: &str, _span: Span) -> String {
        let bool_to_f64 = |cmp: String| format!("(f64.convert_i32_s {cmp})");
        match op {
            BinOp::Add => format!("(f64.add {l} {r})"),
            BinOp::Sub => format!("(f64.sub {l} {r})"),
            BinOp::Mul => format!("(f64.mul {l} {r})"),
            BinOp::Div => format!("(f64.div {l} {r})"),
            BinOp::Mod => format!("(f64.sub {l} (f64.mul (f64.floor (f64.div {l} {r})) {r}))"),
            BinOp::Pow => format!("(call $pow {l} {r})"),
            BinOp::BitAnd => format!("(f64.convert_i32_s (i32.and (i32.trunc_f64_s {l}) (i32.trunc_f64_s {r})))"),
            BinOp::BitOr => format!("(f64.convert_i32_s (i32.or (i32.trunc_f64_s {l}) (i32.trunc_f64_s {r})))"),
            BinOp::BitXor => format!("(f64.convert_i32_s (i32.xor (i32.trunc_f64_s {l}) (i32.trunc_f64_s {r})))"),
            BinOp::Shl => format!("(f64.convert_i32_s (i32.shl (i32.trunc_f64_s {l}) (i32.trunc_f64_s {r})))"),
            BinOp::Shr => format!("(f64.convert_i32_s (i32.shr_s (i32.trunc_f64_s {l}) (i32.trunc_f64_s {r})))"),
            BinOp::UShr => format!("(f64.convert_i32_u (i32.shr_u (i32.trunc_f64_s {l}) (i32.trunc_f64_s {r})))"),
            BinOp::Eq => bool_to_f64(format!("(f64.eq {l} {r})")),
            BinOp::Ne => bool_to_f64(format!("(f64.ne {l} {r})")),
            BinOp::Lt => bool_to_f64(format!("(f64.lt {l} {r})")),
            BinOp::Le => bool_to_f64(format!("(f64.le {l} {r})")),
            BinOp::Gt => bool_to_f64(format!("(f64.gt {l} {r})")),
            BinOp::Ge => bool_to_f64(format!("(f64.ge {l} {r})")),
        }
    }

    fn assign(&mut self, op: AssignOp, target: &Expr, value: &Expr, span: Span) -> Result<String, CompileError> {
        let rhs = self.expr(value)?;
        let rhs = if op == AssignOp::Assign {
            rhs
        } else {
            let current = self.expr(target)?;
            self.binary(compound_to_binary(op), &current, &rhs, span)
        };
        match target {
            Expr::Identifier(name, _) => {
                if self.const_names.contains(name) {
                    return Err(CodegenError::ConstReassignment { name: name.clone(), span }.into());
                }
                Ok(match self.resolve(name) {
                    Binding::Local(wat) => format!("(block (result f64) (local.set {wat} {rhs}) (local.get {wat}))"),
                    Binding::Global(wat) => format!("(block (result f64) (global.set {wat} {rhs}) (global.get {wat}))"),
                    Binding::EnvSlot(_) => return Err(CodegenError::AssignmentTargetNotIdentifier { span }.into()),
                })
            }
            Expr::Index { object, index, .. } => {
                let obj = self.expr(object)?;
                let idx = self.expr(index)?;
                let ptr = nan_ptr_expr(&obj);
                let rhs_tmp = self.declare_local("assign_rhs");
                Ok(format!(
                    "(block (result f64) (local.set {rhs_tmp} {rhs}) \
                       (f64.store (i32.add {ptr} (i32.mul (i32.trunc_f64_s {idx}) (i32.const {slot}))) (local.get {rhs_tmp})) \
                       (local.get {rhs_tmp}))",
                    slot = crate::heap::SLOT_SIZE,
                ))
            }
            Expr::Member { object, property, .. } => {
                let obj = self.expr(object)?;
                let object_ty = self.types.node_types.get(&object.span()).cloned().unwrap_or(ElemType::Any);
                let ElemType::Object(id) = strip_nullable(&object_ty).clone() else {
                    return Err(CodegenError::UnknownProperty { name: property.clone(), span }.into());
                };
                let schema = self.ctx.schemas.get(id);
                let slot = schema
                    .slot_of(property)
                    .ok_or_else(|| CodegenError::UnknownProperty { name: property.clone(), span })?;
                let ptr = nan_ptr_expr(&obj);
                let rhs_tmp = self.declare_local("assign_rhs");
                Ok(format!(
                    "(block (result f64) (local.set {rhs_tmp} {rhs}) \
                       (f64.store offset={off} {ptr} (local.get {rhs_tmp})) (local.get {rhs_tmp}))",
                    off = slot * crate::heap::SLOT_SIZE,
                ))
            }
            _ => Err(CodegenError::AssignmentTargetNotIdentifier { span }.into()),
        }
    }

    fn call(&mut self, callee: &Expr, args: &[Expr], span: Span) -> Result<String, CompileError> {
        if let Expr::Identifier(name, _) = callee {
            if !self.is_locally_shadowed(name) {
                if let Some(entry) = self.fn_table.get(name).cloned() {
                    let mut rendered = Vec::with_capacity(args.len());
                    for a in args {
                        rendered.push(self.expr(a)?);
                    }
                    return Ok(format!("(call {} {})", entry.wat_name, rendered.join(" ")));
                }
            }
        }
        // Anything else is a first-class closure value: materialize its
        // argument list into a scratch buffer and dispatch indirectly via
        // the `$closure_call` trampoline.
        let closure = self.expr(callee)?;
        self.needs.request_closure_call();
        let argc = args.len();
        let args_block = self.declare_local("call_args");
        let mut out = format!(
            "(local.set {args_block} (call $alloc (i32.const 0) (i32.const {})))",
            argc * crate::heap::SLOT_SIZE as usize
        );
        for (i, a) in args.iter().enumerate() {
            let v = self.expr(a)?;
            write!(out, " (f64.store offset={} (local.get {args_block}) {v})", i as u32 * crate::heap::SLOT_SIZE).ok();
        }
        let ptr = nan_ptr_expr(&closure);
        let _ = span;
        Ok(format!(
            "(block (result f64) {out} (call $closure_call {ptr} (local.get {args_block}) (i32.const {argc})))"
        ))
    }

    fn new_expr(&mut self, ctor: WhitelistedCtor, args: &[Expr], span: Span) -> Result<String, CompileError> {
        match ctor {
            WhitelistedCtor::Array => self.array_literal(args),
            WhitelistedCtor::Set => {
                self.needs.sets = true;
                let table = self.declare_local("set_table");
                let cap = crate::heap::capacity_for_len(0);
                Ok(format!(
                    "(block (result f64) (local.set {table} (call $alloc (i32.const 0) (i32.const {bytes}))) {})",
                    self.box_ptr_local(&table, TypeTag::Set),
                    bytes = cap * crate::heap::SLOT_SIZE,
                ))
            }
            WhitelistedCtor::Map => {
                self.needs.maps = true;
                let table = self.declare_local("map_table");
                let cap = crate::heap::capacity_for_len(0);
                Ok(format!(
                    "(block (result f64) (local.set {table} (call $alloc (i32.const 0) (i32.const {bytes}))) {})",
                    self.box_ptr_local(&table, TypeTag::Map),
                    bytes = cap * crate::heap::SLOT_SIZE * 2,
                ))
            }
            WhitelistedCtor::RegExp => {
                let (pattern, flags) = regex_literal_args(args, span)?;
                let idx = self.ctx.intern_regex(&pattern, &flags);
                self.needs.regex = true;
                Ok(self.box_ptr(TypeTag::Typed, "(i32.const 0)", &format!("(i32.const {idx})")))
            }
            WhitelistedCtor::StringBox | WhitelistedCtor::NumberBox | WhitelistedCtor::BooleanBox => match args.first() {
                Some(a) => self.expr(a),
                None => Ok("(f64.const 0)".to_string()),
            },
            WhitelistedCtor::Int8Array
            | WhitelistedCtor::Uint8Array
            | WhitelistedCtor::Int16Array
            | WhitelistedCtor::Uint16Array
            | WhitelistedCtor::Int32Array
            | WhitelistedCtor::Uint32Array
            | WhitelistedCtor::Float32Array
            | WhitelistedCtor::Float64Array => {
                self.needs.request_typed_buffer();
                let len = match args.first() {
                    Some(a) => self.expr(a)?,
                    None => "(f64.const 0)".to_string(),
                };
                let width = typed_elem_width(ctor);
                let block = self.declare_local("typed_tmp");
                Ok(format!(
                    "(block (result f64) (local.set {block} (call $alloc (i32.const 8) (i32.mul (i32.trunc_f64_s {len}) (i32.const {width})))) {})",
                    self.box_ptr_local(&block, TypeTag::Typed)
                ))
            }
        }
    }

    fn member(&mut self, object: &Expr, property: &str, span: Span) -> Result<String, CompileError> {
        let obj = self.expr(object)?;
        let object_ty = self.types.node_types.get(&object.span()).cloned().unwrap_or(ElemType::Any);
        match strip_nullable(&object_ty) {
            ElemType::Array(_) | ElemType::Str if property == "length" => {
                let ptr = nan_ptr_expr(&obj);
                Ok(format!(
                    "(f64.convert_i32_s (i32.load offset={} {ptr}))",
                    crate::heap::ARRAY_HEADER_LENGTH_OFFSET
                ))
            }
            ElemType::SetOf(_) | ElemType::MapOf(_, _) if property == "size" => {
                let ptr = nan_ptr_expr(&obj);
                Ok(format!("(f64.convert_i32_s (i32.load offset=0 {ptr}))"))
            }
            ElemType::Object(id) => {
                let schema = self.ctx.schemas.get(*id);
                let slot = schema
                    .slot_of(property)
                    .ok_or_else(|| CodegenError::UnknownProperty { name: property.to_string(), span })?;
                let ptr = nan_ptr_expr(&obj);
                Ok(format!("(f64.load offset={} {ptr})", slot * crate::heap::SLOT_SIZE))
            }
            ElemType::Any => {
                let ptr = nan_ptr_expr(&obj);
                Ok(format!("(f64.load {ptr})"))
            }
            _ => Err(CodegenError::UnknownProperty { name: property.to_string(), span }.into()),
        }
    }

    /// A ring and a flat array share the same pointer layout and are told
    /// apart only by their NaN-box tag (spec §3.3), so a read here must go
    /// through `$array_phys_slot` to land on the right physical slot after
    /// any number of `unshift`s (spec §8: `a[0] === 999` after 1000 of them).
    fn index(&mut self, object: &Expr, index: &Expr, _span: Span) -> Result<String, CompileError> {
        self.needs.arrays = true;
        self.needs.request("$array_phys_slot");
        let obj = self.expr(object)?;
        let idx = self.expr(index)?;
        let obj_local = self.declare_local("idx_obj");
        let ptr = nan_ptr_expr(&format!("(local.get {obj_local})"));
        let is_ring = is_ring_expr(&format!("(local.get {obj_local})"));
        Ok(format!(
            "(block (result f64) (local.set {obj_local} {obj}) \
               (f64.load (i32.add {ptr} (i32.mul (call $array_phys_slot {ptr} {is_ring} (i32.trunc_f64_s {idx})) (i32.const {slot})))))",
            slot = crate::heap::SLOT_SIZE,
        ))
    }

    /// Most stdlib methods compile to a direct `call` of the resolved
    /// prelude helper. The handful the prelude's own comments mark as
    /// "codegen inlines the loop" (`forEach`, `find`, `findIndex`, `every`,
    /// `some`, `filter`, `reduce`, `flatMap`) get an inline scan here that
    /// dispatches into the callback argument's closure value once per
    /// element — a per-element `call_indirect` is the only way to invoke
    /// an arbitrary first-class callback from emitted WAT.
    fn method_call(&mut self, object: &Expr, method: &str, args: &[Expr], span: Span) -> Result<String, CompileError> {
        let obj = self.expr(object)?;
        let object_ty = self.types.node_types.get(&object.span()).cloned().unwrap_or(ElemType::Any);
        let receiver_ty = strip_nullable(&object_ty).clone();
        let resolved = crate::stdlib::resolve_method(&receiver_ty, method)
            .ok_or_else(|| CodegenError::UnknownProperty { name: method.to_string(), span })?;
        self.needs.request(resolved.prelude_fn);
        if resolved.prelude_fn == "$regex_exec" || resolved.prelude_fn == "$string_match" {
            // Building the capture array needs array/string allocation even
            // when nothing else in the program otherwise touches them.
            self.needs.strings = true;
            self.needs.request("$array_push_like");
        }

        let is_array_receiver = matches!(receiver_ty, ElemType::Array(_));
        let is_string_receiver = matches!(receiver_ty, ElemType::Str);

        if is_array_receiver && matches!(method, "push" | "pop" | "shift" | "unshift") {
            return self.inline_array_mutate(method, &obj, args, span);
        }
        if is_array_receiver && matches!(method, "slice" | "concat" | "fill" | "reverse" | "sort" | "flat" | "map") {
            return self.inline_array_transform(method, &obj, args, span);
        }
        if is_string_receiver
            && matches!(
                method,
                "slice"
                    | "substring"
                    | "substr"
                    | "trim"
                    | "trimStart"
                    | "trimEnd"
                    | "toUpperCase"
                    | "toLowerCase"
                    | "concat"
                    | "repeat"
                    | "padStart"
                    | "padEnd"
                    | "replace"
                    | "replaceAll"
                    | "at"
            )
        {
            return self.inline_string_transform(method, &obj, args, span);
        }

        if matches!(method, "forEach" | "find" | "findIndex" | "every" | "some" | "filter" | "reduce" | "flatMap") {
            return self.inline_array_scan(method, &obj, args, span);
        }

        let ptr = nan_ptr_expr(&obj);
        let mut rendered = Vec::with_capacity(args.len());
        for a in args {
            rendered.push(self.expr(a)?);
        }

        // $array_join returns a raw i32 STRING pointer, not a count/bool/index
        // — it needs boxing, not the `f64.convert_i32_s` treatment the other
        // i32-returning helpers below get. Its separator argument is a plain
        // pointer offset too, not an f64 value.
        if resolved.prelude_fn == "$array_join" {
            let sep = rendered.first().cloned().unwrap_or_else(|| "(i32.const 0)".to_string());
            let sep_ptr = if args.is_empty() { sep } else { nan_ptr_expr(&sep) };
            let call = format!("(call $array_join {ptr} {sep_ptr})");
            return Ok(self.box_ptr(TypeTag::String, "(i32.const 0)", &call));
        }

        let call = format!("(call {} {ptr} {})", resolved.prelude_fn, rendered.join(" "));
        Ok(match resolved.prelude_fn {
            "$array_includes" | "$array_index_of" | "$string_index_of" | "$string_includes"
            | "$set_has" | "$set_delete" | "$map_has" | "$map_delete" | "$regex_test" => {
                format!("(f64.convert_i32_s {call})")
            }
            _ => call,
        })
    }

    /// push/pop/shift/unshift (spec §3.3). push/unshift hand back the whole
    /// array — not a length — since growth can move the block to a fresh
    /// address that only a return-and-reassign makes visible again (spec §8:
    /// `[1,2,3].push(4).length === 4`, `a = a.unshift(i)`).
    fn inline_array_mutate(&mut self, method: &str, obj: &str, args: &[Expr], span: Span) -> Result<String, CompileError> {
        self.needs.arrays = true;
        let fn_name = match method {
            "push" => "$array_push_like",
            "unshift" => {
                self.needs.request_ring();
                "$array_unshift_like"
            }
            "pop" => "$array_pop_like",
            "shift" => "$array_shift_like",
            _ => unreachable!("guarded by caller's matches!"),
        };
        self.needs.request(fn_name);

        let arr_local = self.declare_local("mut_arr");
        let ptr = nan_ptr_expr(&format!("(local.get {arr_local})"));
        let is_ring = is_ring_expr(&format!("(local.get {arr_local})"));
        let setup = format!("(local.set {arr_local} {obj})");

        match method {
            "push" => {
                let value = args.first().ok_or_else(|| CodegenError::UnknownProperty { name: method.to_string(), span })?;
                let v = self.expr(value)?;
                let block = self.declare_local("mut_block");
                Ok(format!(
                    "(block (result f64) {setup} \
                       (local.set {block} (call $array_push_like {ptr} {is_ring} {v})) \
                       (if (result f64) {is_ring} (then {ring_boxed}) (else {arr_boxed})))",
                    ring_boxed = self.box_ptr_local(&block, TypeTag::Ring),
                    arr_boxed = self.box_ptr_local(&block, TypeTag::Array),
                ))
            }
            "unshift" => {
                let value = args.first().ok_or_else(|| CodegenError::UnknownProperty { name: method.to_string(), span })?;
                let v = self.expr(value)?;
                let block = self.declare_local("mut_block");
                Ok(format!(
                    "(block (result f64) {setup} \
                       (local.set {block} (call $array_unshift_like {ptr} {is_ring} {v})) \
                       {boxed})",
                    boxed = self.box_ptr_local(&block, TypeTag::Ring),
                ))
            }
            "pop" | "shift" => Ok(format!("(block (result f64) {setup} (call {fn_name} {ptr} {is_ring}))")),
            _ => unreachable!(),
        }
    }

    /// slice/concat/fill/reverse/sort/flat/map (spec §4.F "Key algorithms").
    /// Each builds its own copy/transform loop inline rather than sharing one
    /// prelude helper, reading source elements ring-aware through
    /// `$array_phys_slot` since the receiver may be either representation.
    fn inline_array_transform(&mut self, method: &str, obj: &str, args: &[Expr], span: Span) -> Result<String, CompileError> {
        self.needs.arrays = true;
        self.needs.request("$array_phys_slot");
        self.needs.request("$array_push_like");

        let len_off = crate::heap::ARRAY_HEADER_LENGTH_OFFSET;
        let slot = crate::heap::SLOT_SIZE;
        let arr_local = self.declare_local("xform_arr");
        let ptr = nan_ptr_expr(&format!("(local.get {arr_local})"));
        let is_ring = is_ring_expr(&format!("(local.get {arr_local})"));
        let len_local = self.declare_local("xform_len");
        let setup = format!(
            "(local.set {arr_local} {obj}) (local.set {len_local} (i32.load offset={len_off} {ptr}))"
        );

        match method {
            "slice" => {
                let start = match args.first() {
                    Some(e) => format!("(i32.trunc_f64_s {})", self.expr(e)?),
                    None => "(i32.const 0)".to_string(),
                };
                let end = match args.get(1) {
                    Some(e) => format!("(i32.trunc_f64_s {})", self.expr(e)?),
                    None => format!("(local.get {len_local})"),
                };
                let start_local = self.declare_local("xform_start");
                let end_local = self.declare_local("xform_end");
                let i_local = self.declare_local("xform_i");
                let result_local = self.declare_local("xform_result");
                let done_label = self.ctx.fresh_label("xform_done");
                let loop_label = self.ctx.fresh_label("xform_loop");
                let src_elem = format!(
                    "(f64.load (i32.add {ptr} (i32.mul (call $array_phys_slot {ptr} {is_ring} (local.get {i_local})) (i32.const {slot}))))"
                );
                Ok(format!(
                    "(block (result f64) {setup} \
                       (local.set {start_local} {start}) (local.set {end_local} {end}) \
                       (local.set {result_local} (call $array_alloc (i32.const 0))) \
                       (local.set {i_local} (local.get {start_local})) \
                       (block {done_label} (loop {loop_label} \
                         (br_if {done_label} (i32.ge_s (local.get {i_local}) (local.get {end_local}))) \
                         (local.set {result_local} (call $array_push_like (local.get {result_local}) (i32.const 0) {src_elem})) \
                         (local.set {i_local} (i32.add (local.get {i_local}) (i32.const 1))) \
                         (br {loop_label}))) \
                       {})",
                    self.box_ptr_local(&result_local, TypeTag::Array)
                ))
            }
            "concat" => {
                let other = args.first().ok_or_else(|| CodegenError::UnknownProperty { name: method.to_string(), span })?;
                let other_v = self.expr(other)?;
                let other_local = self.declare_local("xform_other");
                let other_ptr = nan_ptr_expr(&format!("(local.get {other_local})"));
                let other_is_ring = is_ring_expr(&format!("(local.get {other_local})"));
                let other_len_local = self.declare_local("xform_other_len");
                let i_local = self.declare_local("xform_i");
                let result_local = self.declare_local("xform_result");
                let done_a = self.ctx.fresh_label("xform_done_a");
                let loop_a = self.ctx.fresh_label("xform_loop_a");
                let done_b = self.ctx.fresh_label("xform_done_b");
                let loop_b = self.ctx.fresh_label("xform_loop_b");
                let src_a = format!(
                    "(f64.load (i32.add {ptr} (i32.mul (call $array_phys_slot {ptr} {is_ring} (local.get {i_local})) (i32.const {slot}))))"
                );
                let src_b = format!(
                    "(f64.load (i32.add {other_ptr} (i32.mul (call $array_phys_slot {other_ptr} {other_is_ring} (local.get {i_local})) (i32.const {slot}))))"
                );
                Ok(format!(
                    "(block (result f64) {setup} (local.set {other_local} {other_v}) \
                       (local.set {other_len_local} (i32.load offset={len_off} {other_ptr})) \
                       (local.set {result_local} (call $array_alloc (i32.const 0))) \
                       (local.set {i_local} (i32.const 0)) \
                       (block {done_a} (loop {loop_a} \
                         (br_if {done_a} (i32.ge_s (local.get {i_local}) (local.get {len_local}))) \
                         (local.set {result_local} (call $array_push_like (local.get {result_local}) (i32.const 0) {src_a})) \
                         (local.set {i_local} (i32.add (local.get {i_local}) (i32.const 1))) \
                         (br {loop_a}))) \
                       (local.set {i_local} (i32.const 0)) \
                       (block {done_b} (loop {loop_b} \
                         (br_if {done_b} (i32.ge_s (local.get {i_local}) (local.get {other_len_local}))) \
                         (local.set {result_local} (call $array_push_like (local.get {result_local}) (i32.const 0) {src_b})) \
                         (local.set {i_local} (i32.add (local.get {i_local}) (i32.const 1))) \
                         (br {loop_b}))) \
                       {})",
                    self.box_ptr_local(&result_local, TypeTag::Array)
                ))
            }
            "fill" => {
                let value = args.first().ok_or_else(|| CodegenError::UnknownProperty { name: method.to_string(), span })?;
                let v = self.expr(value)?;
                let start = match args.get(1) {
                    Some(e) => format!("(i32.trunc_f64_s {})", self.expr(e)?),
                    None => "(i32.const 0)".to_string(),
                };
                let end = match args.get(2) {
                    Some(e) => format!("(i32.trunc_f64_s {})", self.expr(e)?),
                    None => format!("(local.get {len_local})"),
                };
                let v_local = self.declare_local("xform_fill_value");
                let i_local = self.declare_local("xform_i");
                let end_local = self.declare_local("xform_end");
                let done_label = self.ctx.fresh_label("xform_done");
                let loop_label = self.ctx.fresh_label("xform_loop");
                let dest_slot = format!(
                    "(i32.add {ptr} (i32.mul (call $array_phys_slot {ptr} {is_ring} (local.get {i_local})) (i32.const {slot})))"
                );
                Ok(format!(
                    "(block (result f64) {setup} (local.set {v_local} {v}) (local.set {end_local} {end}) \
                       (local.set {i_local} {start}) \
                       (block {done_label} (loop {loop_label} \
                         (br_if {done_label} (i32.ge_s (local.get {i_local}) (local.get {end_local}))) \
                         (f64.store {dest_slot} (local.get {v_local})) \
                         (local.set {i_local} (i32.add (local.get {i_local}) (i32.const 1))) \
                         (br {loop_label}))) \
                       (local.get {arr_local}))"
                ))
            }
            "reverse" => {
                let i_local = self.declare_local("xform_i");
                let j_local = self.declare_local("xform_j");
                let tmp_local = self.declare_local("xform_tmp");
                let done_label = self.ctx.fresh_label("xform_done");
                let loop_label = self.ctx.fresh_label("xform_loop");
                let slot_i = format!(
                    "(i32.add {ptr} (i32.mul (call $array_phys_slot {ptr} {is_ring} (local.get {i_local})) (i32.const {slot})))"
                );
                let slot_j = format!(
                    "(i32.add {ptr} (i32.mul (call $array_phys_slot {ptr} {is_ring} (local.get {j_local})) (i32.const {slot})))"
                );
                Ok(format!(
                    "(block (result f64) {setup} \
                       (local.set {i_local} (i32.const 0)) (local.set {j_local} (i32.sub (local.get {len_local}) (i32.const 1))) \
                       (block {done_label} (loop {loop_label} \
                         (br_if {done_label} (i32.ge_s (local.get {i_local}) (local.get {j_local}))) \
                         (local.set {tmp_local} (f64.load {slot_i})) \
                         (f64.store {slot_i} (f64.load {slot_j})) \
                         (f64.store {slot_j} (local.get {tmp_local})) \
                         (local.set {i_local} (i32.add (local.get {i_local}) (i32.const 1))) \
                         (local.set {j_local} (i32.sub (local.get {j_local}) (i32.const 1))) \
                         (br {loop_label}))) \
                       (local.get {arr_local}))"
                ))
            }
            "sort" => {
                // Ascending numeric sort, no comparator support (spec's
                // JS-subset non-goal on function-valued comparators). Simple
                // insertion sort: arrays here are small enough that O(n^2)
                // is the right tradeoff against the WAT size a real
                // quicksort/mergesort would add.
                let i_local = self.declare_local("xform_i");
                let j_local = self.declare_local("xform_j");
                let key_local = self.declare_local("xform_key");
                let outer_done = self.ctx.fresh_label("xform_outer_done");
                let outer_loop = self.ctx.fresh_label("xform_outer_loop");
                let inner_done = self.ctx.fresh_label("xform_inner_done");
                let inner_loop = self.ctx.fresh_label("xform_inner_loop");
                let slot_j = format!(
                    "(i32.add {ptr} (i32.mul (call $array_phys_slot {ptr} {is_ring} (local.get {j_local})) (i32.const {slot})))"
                );
                let slot_j1 = format!(
                    "(i32.add {ptr} (i32.mul (call $array_phys_slot {ptr} {is_ring} (i32.add (local.get {j_local}) (i32.const 1))) (i32.const {slot})))"
                );
                Ok(format!(
                    "(block (result f64) {setup} \
                       (local.set {i_local} (i32.const 1)) \
                       (block {outer_done} (loop {outer_loop} \
                         (br_if {outer_done} (i32.ge_s (local.get {i_local}) (local.get {len_local}))) \
                         (local.set {key_local} \
                           (f64.load (i32.add {ptr} (i32.mul (call $array_phys_slot {ptr} {is_ring} (local.get {i_local})) (i32.const {slot}))))) \
                         (local.set {j_local} (i32.sub (local.get {i_local}) (i32.const 1))) \
                         (block {inner_done} (loop {inner_loop} \
                           (br_if {inner_done} (i32.lt_s (local.get {j_local}) (i32.const 0))) \
                           (br_if {inner_done} (f64.le (f64.load {slot_j}) (local.get {key_local}))) \
                           (f64.store {slot_j1} (f64.load {slot_j})) \
                           (local.set {j_local} (i32.sub (local.get {j_local}) (i32.const 1))) \
                           (br {inner_loop}))) \
                         (f64.store \
                           (i32.add {ptr} (i32.mul (call $array_phys_slot {ptr} {is_ring} (i32.add (local.get {j_local}) (i32.const 1))) (i32.const {slot}))) \
                           (local.get {key_local})) \
                         (local.set {i_local} (i32.add (local.get {i_local}) (i32.const 1))) \
                         (br {outer_loop}))) \
                       (local.get {arr_local}))"
                ))
            }
            "flat" => {
                let i_local = self.declare_local("xform_i");
                let elem_local = self.declare_local("xform_elem");
                let result_local = self.declare_local("xform_result");
                let done_label = self.ctx.fresh_label("xform_done");
                let loop_label = self.ctx.fresh_label("xform_loop");
                let inner_i = self.declare_local("xform_inner_i");
                let inner_ptr = nan_ptr_expr(&format!("(local.get {elem_local})"));
                let inner_is_ring = is_ring_expr(&format!("(local.get {elem_local})"));
                let inner_len = self.declare_local("xform_inner_len");
                let inner_done = self.ctx.fresh_label("xform_inner_done");
                let inner_loop = self.ctx.fresh_label("xform_inner_loop");
                let is_array_elem = format!(
                    "(i32.or \
                       (i64.eq (i64.and (i64.reinterpret_f64 (local.get {elem_local})) (i64.const {tag_mask})) (i64.const {array_tag})) \
                       {inner_is_ring})",
                    tag_mask = crate::value::TAG_MASK as i64,
                    array_tag = TypeTag::Array.bits() as i64,
                );
                let src_elem = format!(
                    "(f64.load (i32.add {inner_ptr} (i32.mul (call $array_phys_slot {inner_ptr} {inner_is_ring} (local.get {inner_i})) (i32.const {slot}))))"
                );
                Ok(format!(
                    "(block (result f64) {setup} \
                       (local.set {result_local} (call $array_alloc (i32.const 0))) \
                       (local.set {i_local} (i32.const 0)) \
                       (block {done_label} (loop {loop_label} \
                         (br_if {done_label} (i32.ge_s (local.get {i_local}) (local.get {len_local}))) \
                         (local.set {elem_local} \
                           (f64.load (i32.add {ptr} (i32.mul (call $array_phys_slot {ptr} {is_ring} (local.get {i_local})) (i32.const {slot}))))) \
                         (if {is_array_elem} \
                           (then \
                             (local.set {inner_len} (i32.load offset={len_off} {inner_ptr})) \
                             (local.set {inner_i} (i32.const 0)) \
                             (block {inner_done} (loop {inner_loop} \
                               (br_if {inner_done} (i32.ge_s (local.get {inner_i}) (local.get {inner_len}))) \
                               (local.set {result_local} (call $array_push_like (local.get {result_local}) (i32.const 0) {src_elem})) \
                               (local.set {inner_i} (i32.add (local.get {inner_i}) (i32.const 1))) \
                               (br {inner_loop})))) \
                           (else \
                             (local.set {result_local} (call $array_push_like (local.get {result_local}) (i32.const 0) (local.get {elem_local}))))) \
                         (local.set {i_local} (i32.add (local.get {i_local}) (i32.const 1))) \
                         (br {loop_label}))) \
                       {})",
                    self.box_ptr_local(&result_local, TypeTag::Array)
                ))
            }
            "map" => {
                let callback = args.first().ok_or_else(|| CodegenError::UnknownProperty { name: method.to_string(), span })?;
                let cb = self.expr(callback)?;
                self.needs.request_closure_call();
                let cb_local = self.declare_local("xform_cb");
                let closure_ptr = nan_ptr_expr(&format!("(local.get {cb_local})"));
                let i_local = self.declare_local("xform_i");
                let args_local = self.declare_local("xform_cb_args");
                let result_local = self.declare_local("xform_result");
                let done_label = self.ctx.fresh_label("xform_done");
                let loop_label = self.ctx.fresh_label("xform_loop");
                let src_elem = format!(
                    "(f64.load (i32.add {ptr} (i32.mul (call $array_phys_slot {ptr} {is_ring} (local.get {i_local})) (i32.const {slot}))))"
                );
                Ok(format!(
                    "(block (result f64) {setup} (local.set {cb_local} {cb}) \
                       (local.set {result_local} (call $array_alloc (i32.const 0))) \
                       (local.set {i_local} (i32.const 0)) \
                       (block {done_label} (loop {loop_label} \
                         (br_if {done_label} (i32.ge_s (local.get {i_local}) (local.get {len_local}))) \
                         (local.set {args_local} (call $alloc (i32.const 0) (i32.const {slot}))) \
                         (f64.store (local.get {args_local}) {src_elem}) \
                         (local.set {result_local} \
                           (call $array_push_like (local.get {result_local}) (i32.const 0) \
                             (call $closure_call {closure_ptr} (local.get {args_local}) (i32.const 1)))) \
                         (local.set {i_local} (i32.add (local.get {i_local}) (i32.const 1))) \
                         (br {loop_label}))) \
                       {})",
                    self.box_ptr_local(&result_local, TypeTag::Array)
                ))
            }
            _ => unreachable!("guarded by caller's matches!"),
        }
    }

    /// The 14 string transform methods (spec §8: `"hello".toUpperCase()`
    /// etc.). Strings are never rings — only arrays promote — so these read
    /// code units directly at `(block + i*2)`, no `$array_phys_slot`
    /// indirection needed. Each allocates a fresh result string of the
    /// right length and copies/transforms code units into it.
    fn inline_string_transform(&mut self, method: &str, obj: &str, args: &[Expr], span: Span) -> Result<String, CompileError> {
        self.needs.strings = true;
        self.needs.request("$string_alloc");

        let len_off = crate::heap::ARRAY_HEADER_LENGTH_OFFSET;
        let str_local = self.declare_local("str_xform_obj");
        let ptr = nan_ptr_expr(&format!("(local.get {str_local})"));
        let len_local = self.declare_local("str_xform_len");
        let setup = format!("(local.set {str_local} {obj}) (local.set {len_local} (i32.load offset={len_off} {ptr}))");

        // A [start,end) range copy is the common shape behind
        // slice/substring/substr/trim*/at/charAt; everything else
        // (case conversion, repeat, pad, replace, concat) builds its own loop.
        let copy_range = |this: &mut Self, start: String, end: String| -> String {
            let i_local = this.declare_local("str_xform_i");
            let result_local = this.declare_local("str_xform_result");
            let start_local = this.declare_local("str_xform_start");
            let end_local = this.declare_local("str_xform_end");
            let done_label = this.ctx.fresh_label("str_xform_done");
            let loop_label = this.ctx.fresh_label("str_xform_loop");
            format!(
                "(local.set {start_local} {start}) (local.set {end_local} {end}) \
                 (local.set {result_local} (call $string_alloc (i32.sub (local.get {end_local}) (local.get {start_local})))) \
                 (local.set {i_local} (i32.const 0)) \
                 (block {done_label} (loop {loop_label} \
                   (br_if {done_label} (i32.ge_s (i32.add (local.get {start_local}) (local.get {i_local})) (local.get {end_local}))) \
                   (i32.store16 (i32.add (local.get {result_local}) (i32.mul (local.get {i_local}) (i32.const 2))) \
                     (i32.load16_u (i32.add {ptr} (i32.mul (i32.add (local.get {start_local}) (local.get {i_local})) (i32.const 2))))) \
                   (local.set {i_local} (i32.add (local.get {i_local}) (i32.const 1))) \
                   (br {loop_label}))) \
                 {}",
                this.box_ptr_local(&result_local, TypeTag::String)
            )
        };

        match method {
            "slice" | "substring" => {
                let start = match args.first() {
                    Some(e) => format!("(i32.trunc_f64_s {})", self.expr(e)?),
                    None => "(i32.const 0)".to_string(),
                };
                let end = match args.get(1) {
                    Some(e) => format!("(i32.trunc_f64_s {})", self.expr(e)?),
                    None => format!("(local.get {len_local})"),
                };
                let body = copy_range(self, start, end);
                Ok(format!("(block (result f64) {setup} {body})"))
            }
            "substr" => {
                let start = match args.first() {
                    Some(e) => format!("(i32.trunc_f64_s {})", self.expr(e)?),
                    None => "(i32.const 0)".to_string(),
                };
                let count = match args.get(1) {
                    Some(e) => format!("(i32.trunc_f64_s {})", self.expr(e)?),
                    None => format!("(local.get {len_local})"),
                };
                let start_local = self.declare_local("str_xform_substr_start");
                let end = format!("(i32.add (local.get {start_local}) {count})");
                let body = copy_range(self, format!("(local.get {start_local})"), end);
                Ok(format!("(block (result f64) {setup} (local.set {start_local} {start}) {body})"))
            }
            "at" | "charAt" => {
                let idx = match args.first() {
                    Some(e) => format!("(i32.trunc_f64_s {})", self.expr(e)?),
                    None => "(i32.const 0)".to_string(),
                };
                let idx_local = self.declare_local("str_xform_at_idx");
                let start = format!("(local.get {idx_local})");
                let end = format!("(i32.add (local.get {idx_local}) (i32.const 1))");
                let body = copy_range(self, start, end);
                Ok(format!("(block (result f64) {setup} (local.set {idx_local} {idx}) {body})"))
            }
            "trim" | "trimStart" | "trimEnd" => {
                let start_local = self.declare_local("str_xform_trim_start");
                let end_local = self.declare_local("str_xform_trim_end");
                let scan_start_done = self.ctx.fresh_label("str_xform_scan_start_done");
                let scan_start_loop = self.ctx.fresh_label("str_xform_scan_start_loop");
                let scan_end_done = self.ctx.fresh_label("str_xform_scan_end_done");
                let scan_end_loop = self.ctx.fresh_label("str_xform_scan_end_loop");
                let is_space = |i: &str| {
                    format!("(i32.eq (i32.load16_u (i32.add {ptr} (i32.mul {i} (i32.const 2)))) (i32.const 32))")
                };
                let scan_from_start = format!(
                    "(local.set {start_local} (i32.const 0)) \
                     (block {scan_start_done} (loop {scan_start_loop} \
                       (br_if {scan_start_done} (i32.ge_s (local.get {start_local}) (local.get {len_local}))) \
                       (br_if {scan_start_done} (i32.eqz {})) \
                       (local.set {start_local} (i32.add (local.get {start_local}) (i32.const 1))) \
                       (br {scan_start_loop})))",
                    is_space(&format!("(local.get {start_local})"))
                );
                let scan_from_end = format!(
                    "(local.set {end_local} (local.get {len_local})) \
                     (block {scan_end_done} (loop {scan_end_loop} \
                       (br_if {scan_end_done} (i32.le_s (local.get {end_local}) (local.get {start_local}))) \
                       (br_if {scan_end_done} (i32.eqz {})) \
                       (local.set {end_local} (i32.sub (local.get {end_local}) (i32.const 1))) \
                       (br {scan_end_loop})))",
                    is_space(&format!("(i32.sub (local.get {end_local}) (i32.const 1))"))
                );
                let prelude = match method {
                    "trim" => format!("{scan_from_start} {scan_from_end}"),
                    "trimStart" => format!("{scan_from_start} (local.set {end_local} (local.get {len_local}))"),
                    "trimEnd" => format!(
                        "(local.set {start_local} (i32.const 0)) {scan_from_end}"
                    ),
                    _ => unreachable!(),
                };
                let body = copy_range(self, format!("(local.get {start_local})"), format!("(local.get {end_local})"));
                Ok(format!("(block (result f64) {setup} {prelude} {body})"))
            }
            "toUpperCase" | "toLowerCase" => {
                let i_local = self.declare_local("str_xform_i");
                let c_local = self.declare_local("str_xform_c");
                let result_local = self.declare_local("str_xform_result");
                let done_label = self.ctx.fresh_label("str_xform_done");
                let loop_label = self.ctx.fresh_label("str_xform_loop");
                let (lo, hi, delta) = if method == "toUpperCase" { (97, 122, -32) } else { (65, 90, 32) };
                Ok(format!(
                    "(block (result f64) {setup} \
                       (local.set {result_local} (call $string_alloc (local.get {len_local}))) \
                       (local.set {i_local} (i32.const 0)) \
                       (block {done_label} (loop {loop_label} \
                         (br_if {done_label} (i32.ge_s (local.get {i_local}) (local.get {len_local}))) \
                         (local.set {c_local} (i32.load16_u (i32.add {ptr} (i32.mul (local.get {i_local}) (i32.const 2))))) \
                         (if (i32.and (i32.ge_s (local.get {c_local}) (i32.const {lo})) (i32.le_s (local.get {c_local}) (i32.const {hi}))) \
                           (then (local.set {c_local} (i32.add (local.get {c_local}) (i32.const {delta}))))) \
                         (i32.store16 (i32.add (local.get {result_local}) (i32.mul (local.get {i_local}) (i32.const 2))) (local.get {c_local})) \
                         (local.set {i_local} (i32.add (local.get {i_local}) (i32.const 1))) \
                         (br {loop_label}))) \
                       {})",
                    self.box_ptr_local(&result_local, TypeTag::String)
                ))
            }
            "concat" => {
                let other = args.first().ok_or_else(|| CodegenError::UnknownProperty { name: method.to_string(), span })?;
                let other_v = self.expr(other)?;
                let other_local = self.declare_local("str_xform_other");
                let other_ptr = nan_ptr_expr(&format!("(local.get {other_local})"));
                let other_len_local = self.declare_local("str_xform_other_len");
                let result_local = self.declare_local("str_xform_result");
                Ok(format!(
                    "(block (result f64) {setup} (local.set {other_local} {other_v}) \
                       (local.set {other_len_local} (i32.load offset={len_off} {other_ptr})) \
                       (local.set {result_local} (call $string_alloc (i32.add (local.get {len_local}) (local.get {other_len_local})))) \
                       (memory.copy (local.get {result_local}) {ptr} (i32.mul (local.get {len_local}) (i32.const 2))) \
                       (memory.copy (i32.add (local.get {result_local}) (i32.mul (local.get {len_local}) (i32.const 2))) {other_ptr} \
                         (i32.mul (local.get {other_len_local}) (i32.const 2))) \
                       {})",
                    self.box_ptr_local(&result_local, TypeTag::String)
                ))
            }
            "repeat" => {
                let count = args.first().ok_or_else(|| CodegenError::UnknownProperty { name: method.to_string(), span })?;
                let count_v = format!("(i32.trunc_f64_s {})", self.expr(count)?);
                let count_local = self.declare_local("str_xform_count");
                let i_local = self.declare_local("str_xform_i");
                let result_local = self.declare_local("str_xform_result");
                let done_label = self.ctx.fresh_label("str_xform_done");
                let loop_label = self.ctx.fresh_label("str_xform_loop");
                Ok(format!(
                    "(block (result f64) {setup} (local.set {count_local} {count_v}) \
                       (local.set {result_local} (call $string_alloc (i32.mul (local.get {len_local}) (local.get {count_local})))) \
                       (local.set {i_local} (i32.const 0)) \
                       (block {done_label} (loop {loop_label} \
                         (br_if {done_label} (i32.ge_s (local.get {i_local}) (local.get {count_local}))) \
                         (memory.copy \
                           (i32.add (local.get {result_local}) (i32.mul (i32.mul (local.get {i_local}) (local.get {len_local})) (i32.const 2))) \
                           {ptr} (i32.mul (local.get {len_local}) (i32.const 2))) \
                         (local.set {i_local} (i32.add (local.get {i_local}) (i32.const 1))) \
                         (br {loop_label}))) \
                       {})",
                    self.box_ptr_local(&result_local, TypeTag::String)
                ))
            }
            "padStart" | "padEnd" => {
                let target = args.first().ok_or_else(|| CodegenError::UnknownProperty { name: method.to_string(), span })?;
                let target_v = format!("(i32.trunc_f64_s {})", self.expr(target)?);
                let pad_unit = match args.get(1) {
                    Some(e) => {
                        let pv = self.expr(e)?;
                        let pad_ptr = nan_ptr_expr(&pv);
                        format!("(i32.load16_u {pad_ptr})")
                    }
                    None => "(i32.const 32)".to_string(),
                };
                let target_local = self.declare_local("str_xform_target");
                let pad_local = self.declare_local("str_xform_pad_unit");
                let pad_count_local = self.declare_local("str_xform_pad_count");
                let i_local = self.declare_local("str_xform_i");
                let result_local = self.declare_local("str_xform_result");
                let done_label = self.ctx.fresh_label("str_xform_done");
                let loop_label = self.ctx.fresh_label("str_xform_loop");
                let body_offset = if method == "padStart" {
                    format!("(i32.mul (i32.add (local.get {pad_count_local}) (local.get {i_local})) (i32.const 2))")
                } else {
                    format!("(i32.mul (local.get {i_local}) (i32.const 2))")
                };
                let pad_loop_done = self.ctx.fresh_label("str_xform_pad_done");
                let pad_loop = self.ctx.fresh_label("str_xform_pad_loop");
                let pad_offset = if method == "padStart" {
                    format!("(i32.mul (local.get {i_local}) (i32.const 2))")
                } else {
                    format!("(i32.mul (i32.add (local.get {len_local}) (local.get {i_local})) (i32.const 2))")
                };
                Ok(format!(
                    "(block (result f64) {setup} (local.set {target_local} {target_v}) (local.set {pad_local} {pad_unit}) \
                       (local.set {pad_count_local} (i32.sub (local.get {target_local}) (local.get {len_local}))) \
                       (if (i32.le_s (local.get {pad_count_local}) (i32.const 0)) (then (local.set {pad_count_local} (i32.const 0)))) \
                       (local.set {result_local} (call $string_alloc (i32.add (local.get {len_local}) (local.get {pad_count_local})))) \
                       (local.set {i_local} (i32.const 0)) \
                       (block {pad_loop_done} (loop {pad_loop} \
                         (br_if {pad_loop_done} (i32.ge_s (local.get {i_local}) (local.get {pad_count_local}))) \
                         (i32.store16 (i32.add (local.get {result_local}) {pad_offset}) (local.get {pad_local})) \
                         (local.set {i_local} (i32.add (local.get {i_local}) (i32.const 1))) \
                         (br {pad_loop}))) \
                       (local.set {i_local} (i32.const 0)) \
                       (block {done_label} (loop {loop_label} \
                         (br_if {done_label} (i32.ge_s (local.get {i_local}) (local.get {len_local}))) \
                         (i32.store16 (i32.add (local.get {result_local}) {body_offset}) \
                           (i32.load16_u (i32.add {ptr} (i32.mul (local.get {i_local}) (i32.const 2))))) \
                         (local.set {i_local} (i32.add (local.get {i_local}) (i32.const 1))) \
                         (br {loop_label}))) \
                       {})",
                    self.box_ptr_local(&result_local, TypeTag::String)
                ))
            }
            "replace" | "replaceAll" => {
                // Literal-substring replacement only (spec's JS-subset
                // non-goal excludes regex-callback replacers); scans once,
                // copying the source through and substituting `to` for
                // every (all, for replaceAll) match of `from`.
                let from = args.first().ok_or_else(|| CodegenError::UnknownProperty { name: method.to_string(), span })?;
                let to = args.get(1).ok_or_else(|| CodegenError::UnknownProperty { name: method.to_string(), span })?;
                let from_v = self.expr(from)?;
                let to_v = self.expr(to)?;
                let from_local = self.declare_local("str_xform_from");
                let to_local = self.declare_local("str_xform_to");
                let from_ptr = nan_ptr_expr(&format!("(local.get {from_local})"));
                let to_ptr = nan_ptr_expr(&format!("(local.get {to_local})"));
                let from_len_local = self.declare_local("str_xform_from_len");
                let to_len_local = self.declare_local("str_xform_to_len");
                let result_local = self.declare_local("str_xform_result");
                let cap_local = self.declare_local("str_xform_cap");
                let i_local = self.declare_local("str_xform_i");
                let out_len_local = self.declare_local("str_xform_out_len");
                let replaced_local = self.declare_local("str_xform_replaced");
                let matched_local = self.declare_local("str_xform_matched");
                let k_local = self.declare_local("str_xform_k");
                let outer_done = self.ctx.fresh_label("str_xform_outer_done");
                let outer_loop = self.ctx.fresh_label("str_xform_outer_loop");
                let match_done = self.ctx.fresh_label("str_xform_match_done");
                let match_loop = self.ctx.fresh_label("str_xform_match_loop");
                let copy_to_done = self.ctx.fresh_label("str_xform_copy_to_done");
                let copy_to_loop = self.ctx.fresh_label("str_xform_copy_to_loop");
                let all_or_first_guard = if method == "replaceAll" {
                    String::new()
                } else {
                    format!("(local.set {replaced_local} (i32.const 1))")
                };
                Ok(format!(
                    "(block (result f64) {setup} (local.set {from_local} {from_v}) (local.set {to_local} {to_v}) \
                       (local.set {from_len_local} (i32.load offset={len_off} {from_ptr})) \
                       (local.set {to_len_local} (i32.load offset={len_off} {to_ptr})) \
                       (local.set {cap_local} (i32.mul (i32.add (local.get {len_local}) (i32.const 1)) (i32.add (local.get {to_len_local}) (i32.const 1)))) \
                       (local.set {result_local} (call $string_alloc (local.get {cap_local}))) \
                       (local.set {i_local} (i32.const 0)) (local.set {out_len_local} (i32.const 0)) (local.set {replaced_local} (i32.const 0)) \
                       (block {outer_done} (loop {outer_loop} \
                         (br_if {outer_done} (i32.ge_s (local.get {i_local}) (local.get {len_local}))) \
                         (local.set {matched_local} (i32.const 0)) \
                         (if (i32.and \
                               (i32.eqz (local.get {replaced_local})) \
                               (i32.and (i32.gt_s (local.get {from_len_local}) (i32.const 0)) \
                                        (i32.le_s (i32.add (local.get {i_local}) (local.get {from_len_local})) (local.get {len_local})))) \
                           (then \
                             (local.set {matched_local} (i32.const 1)) \
                             (local.set {k_local} (i32.const 0)) \
                             (block {match_done} (loop {match_loop} \
                               (br_if {match_done} (i32.ge_s (local.get {k_local}) (local.get {from_len_local}))) \
                               (if (i32.ne \
                                     (i32.load16_u (i32.add {ptr} (i32.mul (i32.add (local.get {i_local}) (local.get {k_local})) (i32.const 2)))) \
                                     (i32.load16_u (i32.add {from_ptr} (i32.mul (local.get {k_local}) (i32.const 2))))) \
                                 (then (local.set {matched_local} (i32.const 0)) (br {match_done}))) \
                               (local.set {k_local} (i32.add (local.get {k_local}) (i32.const 1))) \
                               (br {match_loop})))) \
                           (else (local.set {matched_local} (i32.const 0)))) \
                         (if (local.get {matched_local}) \
                           (then \
                             (local.set {k_local} (i32.const 0)) \
                             (block {copy_to_done} (loop {copy_to_loop} \
                               (br_if {copy_to_done} (i32.ge_s (local.get {k_local}) (local.get {to_len_local}))) \
                               (i32.store16 (i32.add (local.get {result_local}) (i32.mul (local.get {out_len_local}) (i32.const 2))) \
                                 (i32.load16_u (i32.add {to_ptr} (i32.mul (local.get {k_local}) (i32.const 2))))) \
                               (local.set {out_len_local} (i32.add (local.get {out_len_local}) (i32.const 1))) \
                               (local.set {k_local} (i32.add (local.get {k_local}) (i32.const 1))) \
                               (br {copy_to_loop}))) \
                             {all_or_first_guard} \
                             (local.set {i_local} (i32.add (local.get {i_local}) (local.get {from_len_local})))) \
                           (else \
                             (i32.store16 (i32.add (local.get {result_local}) (i32.mul (local.get {out_len_local}) (i32.const 2))) \
                               (i32.load16_u (i32.add {ptr} (i32.mul (local.get {i_local}) (i32.const 2))))) \
                             (local.set {out_len_local} (i32.add (local.get {out_len_local}) (i32.const 1))) \
                             (local.set {i_local} (i32.add (local.get {i_local}) (i32.const 1))))) \
                         (br {outer_loop}))) \
                       (i32.store (i32.sub (local.get {result_local}) (i32.const 4)) (local.get {out_len_local})) \
                       {})",
                    self.box_ptr_local(&result_local, TypeTag::String)
                ))
            }
            _ => unreachable!("guarded by caller's matches!"),
        }
    }

    fn inline_array_scan(&mut self, method: &str, obj: &str, args: &[Expr], span: Span) -> Result<String, CompileError> {
        let callback = args.first().ok_or_else(|| CodegenError::UnknownProperty { name: method.to_string(), span })?;
        let cb = self.expr(callback)?;
        self.needs.request_closure_call();
        self.needs.arrays = true;
        self.needs.request("$array_push_like");

        let arr_local = self.declare_local("scan_arr");
        let cb_local = self.declare_local("scan_cb");
        let len_local = self.declare_local("scan_len");
        let i_local = self.declare_local("scan_i");
        let args_local = self.declare_local("scan_args");
        let acc_local = self.declare_local("scan_acc");
        let done_label = self.ctx.fresh_label("scan_done");
        let loop_label = self.ctx.fresh_label("scan_loop");

        let ptr = nan_ptr_expr(&format!("(local.get {arr_local})"));
        let elem = format!(
            "(f64.load (i32.add {ptr} (i32.mul (local.get {i_local}) (i32.const {slot}))))",
            slot = crate::heap::SLOT_SIZE
        );
        let closure_ptr = nan_ptr_expr(&format!("(local.get {cb_local})"));
        let call_cb = format!(
            "(local.set {args_local} (call $alloc (i32.const 0) (i32.const {slot}))) \
             (f64.store (local.get {args_local}) {elem}) \
             (local.set {acc_local} (call $closure_call {closure_ptr} (local.get {args_local}) (i32.const 1)))",
            slot = crate::heap::SLOT_SIZE,
        );
        let truthy_check = self.truthy(&format!("(local.get {acc_local})"));
        let len_off = crate::heap::ARRAY_HEADER_LENGTH_OFFSET;

        let setup = format!(
            "(local.set {arr_local} {obj}) (local.set {cb_local} {cb}) \
             (local.set {len_local} (f64.convert_i32_s (i32.load offset={len_off} {ptr}))) \
             (local.set {i_local} (i32.const 0))"
        );

        let result = match method {
            "forEach" => format!(
                "{setup} \
                 (block {done_label} (loop {loop_label} \
                   (br_if {done_label} (f64.ge (f64.convert_i32_s (local.get {i_local})) (local.get {len_local}))) \
                   {call_cb} \
                   (local.set {i_local} (i32.add (local.get {i_local}) (i32.const 1))) \
                   (br {loop_label}))) \
                 (f64.const 0)"
            ),
            "every" | "some" => {
                let want_truthy = (method == "some") as i32;
                format!(
                    "{setup} \
                     (block (result f64) \
                       (block {done_label} (loop {loop_label} \
                         (br_if {done_label} (f64.ge (f64.convert_i32_s (local.get {i_local})) (local.get {len_local}))) \
                         {call_cb} \
                         (br_if {done_label} (i32.eq {truthy_check} (i32.const {want_truthy}))) \
                         (local.set {i_local} (i32.add (local.get {i_local}) (i32.const 1))) \
                         (br {loop_label}))) \
                       (f64.convert_i32_s (i32.eq (f64.lt (f64.convert_i32_s (local.get {i_local})) (local.get {len_local})) (i32.const {want_truthy}))))"
                )
            }
            "find" | "findIndex" => {
                let found_value =
                    if method == "find" { elem.clone() } else { format!("(f64.convert_i32_s (local.get {i_local}))") };
                let not_found = if method == "find" { self.const_bits(QNAN_PREFIX) } else { "(f64.const -1)".to_string() };
                format!(
                    "{setup} \
                     (block (result f64) \
                       (block {done_label} (loop {loop_label} \
                         (br_if {done_label} (f64.ge (f64.convert_i32_s (local.get {i_local})) (local.get {len_local}))) \
                         {call_cb} \
                         (if {truthy_check} (then (return {found_value}))) \
                         (local.set {i_local} (i32.add (local.get {i_local}) (i32.const 1))) \
                         (br {loop_label}))) \
                       {not_found})"
                )
            }
            "filter" | "flatMap" => {
                let result_local = self.declare_local("scan_result");
                let guard = if method == "filter" {
                    format!(
                        "(if {truthy_check} (then (local.set {result_local} (call $array_push_like (local.get {result_local}) (i32.const 0) {elem}))))"
                    )
                } else {
                    format!(
                        "(local.set {result_local} (call $array_push_like (local.get {result_local}) (i32.const 0) (local.get {acc_local})))"
                    )
                };
                format!(
                    "{setup} (local.set {result_local} (call $array_alloc (i32.const 0))) \
                     (block {done_label} (loop {loop_label} \
                       (br_if {done_label} (f64.ge (f64.convert_i32_s (local.get {i_local})) (local.get {len_local}))) \
                       {call_cb} \
                       {guard} \
                       (local.set {i_local} (i32.add (local.get {i_local}) (i32.const 1))) \
                       (br {loop_label}))) \
                     {}",
                    self.box_ptr_local(&result_local, TypeTag::Array)
                )
            }
            "reduce" => {
                let init = match args.get(1) {
                    Some(e) => self.expr(e)?,
                    None => "(f64.const 0)".to_string(),
                };
                format!(
                    "(local.set {arr_local} {obj}) (local.set {cb_local} {cb}) (local.set {acc_local} {init}) \
                     (local.set {len_local} (f64.convert_i32_s (i32.load offset={len_off} {ptr}))) \
                     (local.set {i_local} (i32.const 0)) \
                     (block {done_label} (loop {loop_label} \
                       (br_if {done_label} (f64.ge (f64.convert_i32_s (local.get {i_local})) (local.get {len_local}))) \
                       {call_cb} \
                       (local.set {i_local} (i32.add (local.get {i_local}) (i32.const 1))) \
                       (br {loop_label}))) \
                     (local.get {acc_local})"
                )
            }
            _ => unreachable!("guarded by caller's matches!"),
        };
        Ok(format!("(block (result f64) {result})"))
    }

    fn arrow(&mut self, params: &[crate::sexpr::Pattern], body: &ast::ArrowBody, span: Span) -> Result<String, CompileError> {
        let closure_body = match body {
            ast::ArrowBody::Block(stmts) => ClosureBody::Block(stmts),
            ast::ArrowBody::Expr(e) => ClosureBody::Expr(e),
        };
        let (table_index, has_env, _wat_name) = self.compile_closure("arrow", span, params, closure_body)?;
        if has_env {
            self.needs.request_closure_call();
        }
        Ok(self.materialize_closure_value(span, table_index, has_env))
    }

    /// Builds the `{fn_index, env}` object for a function/arrow's value
    /// (spec §4.H). A non-capturing function gets `env = 0` — `$closure_call`
    /// never dereferences it since the generated function ignores its `$env`
    /// parameter when `has_env` is false.
    pub(super) fn materialize_closure_value(&mut self, span: Span, table_index: u32, has_env: bool) -> String {
        let obj_local = self.declare_local("closure_obj");
        let (env_setup, env_value) = if has_env {
            let byte_size = self.envs.get(span).expect("has_env implies a layout").byte_size();
            let names: Vec<String> = self.envs.get(span).expect("has_env implies a layout").names().to_vec();
            let env_local = self.declare_local("env_record");
            let mut out = format!("(local.set {env_local} (call $alloc (i32.const 0) (i32.const {byte_size})))");
            for (i, name) in names.iter().enumerate() {
                let value = match self.resolve(name) {
                    Binding::Local(wat) => format!("(local.get {wat})"),
                    Binding::Global(wat) => format!("(global.get {wat})"),
                    Binding::EnvSlot(offset) => format!("(f64.load offset={offset} (local.get {}))", self.env_param_name()),
                };
                write!(out, " (f64.store offset={} (local.get {env_local}) {value})", i as u32 * crate::heap::SLOT_SIZE).ok();
            }
            (out, format!("(local.get {env_local})"))
        } else {
            (String::new(), "(i32.const 0)".to_string())
        };
        format!(
            "(block (result f64) {env_setup} \
               (local.set {obj_local} (call $alloc (i32.const 0) (i32.const {obj_size}))) \
               (f64.store (local.get {obj_local}) (f64.convert_i32_s (i32.const {table_index}))) \
               (f64.store offset=8 (local.get {obj_local}) (f64.convert_i32_s {env_value})) \
               {})",
            self.box_ptr_local(&obj_local, TypeTag::Object),
            obj_size = crate::heap::SLOT_SIZE * 2,
        )
    }

    fn namespace_call(&mut self, ns: Namespace, member: &str, args: &[Expr], span: Span) -> Result<String, CompileError> {
        let mut rendered = Vec::with_capacity(args.len());
        for a in args {
            rendered.push(self.expr(a)?);
        }
        match ns {
            Namespace::Math => Ok(math_call(member, &rendered)),
            Namespace::Number => Ok(number_call(member, &rendered)),
            Namespace::ArrayCtor => Ok(self.array_ctor_call(member, &rendered)),
            Namespace::ObjectCtor => Err(CodegenError::UnknownProperty { name: format!("Object.{member}"), span }.into()),
            Namespace::Json => Err(CodegenError::UnknownProperty { name: format!("JSON.{member}"), span }.into()),
        }
    }

    fn array_ctor_call(&mut self, member: &str, rendered: &[String]) -> String {
        match member {
            "isArray" => {
                let ptr = rendered.first().cloned().unwrap_or_else(|| "(f64.const 0)".to_string());
                format!(
                    "(f64.convert_i32_s (i32.eq (i64.and (i64.reinterpret_f64 {ptr}) (i64.const {tag_mask})) (i64.const {array_tag})))",
                    tag_mask = TAG_MASK as i64,
                    array_tag = TypeTag::Array.bits() as i64,
                )
            }
            "from" => {
                self.needs.arrays = true;
                self.needs.request("$array_push_like");
                let src = rendered.first().cloned().unwrap_or_else(|| "(f64.const 0)".to_string());
                let block = self.declare_local("array_from_tmp");
                format!(
                    "(block (result f64) (local.set {block} (call $array_alloc (i32.const 0))) \
                       (local.set {block} (call $array_push_like (local.get {block}) (i32.const 0) {src})) {})",
                    self.box_ptr_local(&block, TypeTag::Array)
                )
            }
            _ => "(f64.const 0)".to_string(),
        }
    }
}

fn compound_to_binary(op: AssignOp) -> BinOp {
    match op {
        AssignOp::Assign => unreachable!("Assign has no arithmetic counterpart"),
        AssignOp::Add => BinOp::Add,
        AssignOp::Sub => BinOp::Sub,
        AssignOp::Mul => BinOp::Mul,
        AssignOp::Div => BinOp::Div,
        AssignOp::Mod => BinOp::Mod,
        AssignOp::Pow => BinOp::Pow,
        AssignOp::BitAnd => BinOp::BitAnd,
        AssignOp::BitOr => BinOp::BitOr,
        AssignOp::BitXor => BinOp::BitXor,
        AssignOp::Shl => BinOp::Shl,
        AssignOp::Shr => BinOp::Shr,
        AssignOp::UShr => BinOp::UShr,
    }
}

fn typed_elem_width(ctor: WhitelistedCtor) -> u32 {
    match ctor {
        WhitelistedCtor::Int8Array | WhitelistedCtor::Uint8Array => 1,
        WhitelistedCtor::Int16Array | WhitelistedCtor::Uint16Array => 2,
        WhitelistedCtor::Int32Array | WhitelistedCtor::Uint32Array | WhitelistedCtor::Float32Array => 4,
        WhitelistedCtor::Float64Array => 8,
        _ => unreachable!("only typed-array ctors reach here"),
    }
}

fn regex_literal_args(args: &[Expr], span: Span) -> Result<(String, String), CompileError> {
    let pattern = match args.first() {
        Some(Expr::Literal(Lit::Str(s), _)) => s.clone(),
        _ => {
            return Err(CodegenError::NonsenseCoercion {
                message: "RegExp pattern must be a literal string".into(),
                span,
            }
            .into())
        }
    };
    let flags = match args.get(1) {
        Some(Expr::Literal(Lit::Str(s), _)) => s.clone(),
        _ => String::new(),
    };
    Ok((pattern, flags))
}

fn math_call(member: &str, args: &[String]) -> String {
    let a = args.first().cloned().unwrap_or_else(|| "(f64.const 0)".to_string());
    let b = args.get(1).cloned().unwrap_or_else(|| "(f64.const 0)".to_string());
    match member {
        "abs" => format!("(f64.abs {a})"),
        "floor" => format!("(f64.floor {a})"),
        "ceil" => format!("(f64.ceil {a})"),
        "round" => format!("(f64.nearest {a})"),
        "trunc" => format!("(f64.trunc {a})"),
        "sqrt" => format!("(f64.sqrt {a})"),
        "min" => format!("(f64.min {a} {b})"),
        "max" => format!("(f64.max {a} {b})"),
        "pow" => format!("(call $pow {a} {b})"),
        "sign" => format!("(f64.copysign (f64.const 1) {a})"),
        "random" => "(call $math_random)".to_string(),
        "PI" => "(f64.const 3.141592653589793)".to_string(),
        "E" => "(f64.const 2.718281828459045)".to_string(),
        "atan2" | "hypot" => format!("(call $math_{member} {a} {b})"),
        _ => format!("(call $math_{member} {a})"),
    }
}

fn number_call(member: &str, args: &[String]) -> String {
    let a = args.first().cloned().unwrap_or_else(|| "(f64.const 0)".to_string());
    match member {
        "isNaN" => format!("(f64.convert_i32_s (f64.ne {a} {a}))"),
        "isFinite" => format!("(f64.convert_i32_s (i32.eqz (call $is_non_finite {a})))"),
        "isInteger" | "isSafeInteger" => format!("(f64.convert_i32_s (f64.eq (f64.trunc {a}) {a}))"),
        "parseFloat" | "parseInt" => a,
        _ => a,
    }
}

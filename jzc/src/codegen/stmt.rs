use super::{ClosureBody, Generator};
use crate::ast::{DeclMode, Stmt};
use crate::errors::{CodegenError, CompileError};
use crate::sexpr::Pattern;
use crate::value::{TypeTag, TAG_MASK};

impl<'a> Generator<'a> {
    pub(super) fn stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Expr(e, _) => {
                let value = self.expr(e)?;
                self.wat.line(&format!("(drop {value})"));
            }

            Stmt::Decl { mode, pattern, init, span } => {
                let value = self.expr(init)?;
                let ty = self.types.node_types.get(&init.span()).cloned().unwrap_or(crate::types::ElemType::Any);
                self.bind_pattern(pattern, &value, &ty, *mode, *span)?;
            }

            Stmt::Block(stmts, _) => {
                self.push_scope();
                for s in stmts {
                    self.stmt(s)?;
                }
                self.pop_scope();
            }

            Stmt::If { test, consequent, alternate, .. } => {
                let cond = self.expr(test)?;
                self.wat.line(&format!("(if {}", self.truthy(&cond))).indent();
                self.wat.line("(then").indent();
                self.stmt(consequent)?;
                self.wat.dedent().line(")");
                if let Some(alt) = alternate {
                    self.wat.line("(else").indent();
                    self.stmt(alt)?;
                    self.wat.dedent().line(")");
                }
                self.wat.dedent().line(")");
            }

            Stmt::While { test, body, label, span } => {
                let break_label = self.ctx.fresh_label("while_break");
                let continue_label = self.ctx.fresh_label("while_continue");
                self.enter_loop(label.clone(), break_label.clone(), continue_label.clone());
                self.wat.line(&format!("(block {break_label}")).indent();
                self.wat.line(&format!("(loop {continue_label}")).indent();
                let cond = self.expr(test)?;
                self.wat.line(&format!("(br_if {break_label} (i32.eqz {}))", self.truthy(&cond)));
                self.stmt(body)?;
                self.wat.line(&format!("(br {continue_label})"));
                let _ = span;
                self.wat.dedent().line(")");
                self.wat.dedent().line(")");
                self.exit_loop();
            }

            Stmt::For { init, test, update, body, label, .. } => {
                self.push_scope();
                if let Some(i) = init {
                    self.stmt(i)?;
                }
                let break_label = self.ctx.fresh_label("for_break");
                let continue_label = self.ctx.fresh_label("for_continue");
                let step_label = self.ctx.fresh_label("for_step");
                self.enter_loop(label.clone(), break_label.clone(), step_label.clone());
                self.wat.line(&format!("(block {break_label}")).indent();
                self.wat.line(&format!("(loop {continue_label}")).indent();
                if let Some(t) = test {
                    let cond = self.expr(t)?;
                    self.wat.line(&format!("(br_if {break_label} (i32.eqz {}))", self.truthy(&cond)));
                }
                self.stmt(body)?;
                self.wat.line(&format!("({step_label})")).indent();
                if let Some(u) = update {
                    let value = self.expr(u)?;
                    self.wat.line(&format!("(drop {value})"));
                }
                self.wat.dedent();
                self.wat.line(&format!("(br {continue_label})"));
                self.wat.dedent().line(")");
                self.wat.dedent().line(")");
                self.exit_loop();
                self.pop_scope();
            }

            Stmt::Return(value, _) => {
                let result = match value {
                    Some(e) => self.expr(e)?,
                    None => "(f64.const nan:0x8000000000000)".to_string(),
                };
                self.wat.line(&format!("(return {result})"));
            }

            Stmt::Break(label, span) => {
                let target = self.resolve_loop_label(label.as_deref(), true, *span)?;
                self.wat.line(&format!("(br {target})"));
            }

            Stmt::Continue(label, span) => {
                let target = self.resolve_loop_label(label.as_deref(), false, *span)?;
                self.wat.line(&format!("(br {target})"));
            }

            Stmt::FunctionDecl(def) => {
                let (table_index, has_env, wat_name) =
                    self.compile_closure(&def.name, def.span, &def.params, ClosureBody::Block(&def.body))?;
                let closure_value = self.materialize_closure_value(def.span, table_index, has_env);
                let _ = wat_name;
                let wat_local = self.declare_local(&def.name);
                self.wat.line(&format!("(local.set {wat_local} {closure_value})"));
            }
        }
        Ok(())
    }

    /// Destructures `value` (of static type `ty`) into `pattern`'s bindings.
    /// `Pattern::Name` is the common case; array/object patterns recurse,
    /// indexing the already-evaluated `value` once per binding rather than
    /// re-evaluating `init`, mirroring `types.rs::Inferencer::declare_pattern`'s
    /// element-type threading.
    fn bind_pattern(
        &mut self,
        pattern: &Pattern,
        value: &str,
        ty: &crate::types::ElemType,
        mode: DeclMode,
        span: crate::errors::Span,
    ) -> Result<(), CompileError> {
        match pattern {
            Pattern::Name(name) => {
                if self.in_module_scope() {
                    let global = self.declare_global(name);
                    self.wat.line(&format!("(global.set {global} {value})"));
                } else {
                    let local = self.declare_local(name);
                    self.wat.line(&format!("(local.set {local} {value})"));
                }
                if mode == DeclMode::Const {
                    self.const_names.insert(name.clone());
                }
            }
            Pattern::Array(items) => {
                use crate::types::ElemType;
                let elem_ty = match ty {
                    ElemType::Array(e) => (**e).clone(),
                    _ => ElemType::Any,
                };
                let tmp = self.declare_local("destructure_tmp");
                self.wat.line(&format!("(local.set {tmp} {value})"));
                for (i, item) in items.iter().enumerate() {
                    let ptr = nan_ptr_expr(&format!("(local.get {tmp})"));
                    let elem = format!("(f64.load offset={} {ptr})", i as u32 * crate::heap::SLOT_SIZE);
                    self.bind_pattern(item, &elem, &elem_ty, mode, span)?;
                }
            }
            Pattern::Object(props) => {
                use crate::types::ElemType;
                let schema_id = match ty {
                    ElemType::Object(id) => Some(*id),
                    _ => None,
                };
                let tmp = self.declare_local("destructure_tmp");
                self.wat.line(&format!("(local.set {tmp} {value})"));
                for (name, sub) in props {
                    let slot = match schema_id {
                        Some(id) => self
                            .ctx
                            .schemas
                            .get(id)
                            .slot_of(name)
                            .ok_or_else(|| CodegenError::UnknownProperty { name: name.clone(), span })?,
                        None => return Err(CodegenError::UnknownProperty { name: name.clone(), span }.into()),
                    };
                    let ptr = nan_ptr_expr(&format!("(local.get {tmp})"));
                    let elem = format!("(f64.load offset={} {ptr})", slot * crate::heap::SLOT_SIZE);
                    self.bind_pattern(sub, &elem, &ElemType::Any, mode, span)?;
                }
            }
        }
        Ok(())
    }

    fn enter_loop(&mut self, label: Option<String>, break_label: String, continue_label: String) {
        self.loop_labels.push((break_label.clone(), continue_label.clone()));
        if let Some(l) = label {
            self.named_labels.insert(l, (break_label, continue_label));
        }
    }

    fn exit_loop(&mut self) {
        self.loop_labels.pop();
    }

    fn resolve_loop_label(&self, label: Option<&str>, is_break: bool, span: crate::errors::Span) -> Result<String, CompileError> {
        let pair = match label {
            Some(name) => self.named_labels.get(name),
            None => self.loop_labels.last(),
        };
        let (break_label, continue_label) = pair.ok_or(CodegenError::AssignmentTargetNotIdentifier { span })?;
        Ok(if is_break { break_label.clone() } else { continue_label.clone() })
    }
}

/// Reconstructs the i32 linear-memory offset a NaN-boxed pointer value
/// carries in its low 32 bits (the mirror of `value::NanVal::offset`,
/// emitted as WAT instead of evaluated in Rust).
pub(super) fn nan_ptr_expr(value_expr: &str) -> String {
    format!("(i32.wrap_i64 (i64.and (i64.reinterpret_f64 {value_expr}) (i64.const 0xffffffff)))")
}

/// Whether a NaN-boxed value's tag bits are `RING` rather than `ARRAY` —
/// the two array representations share the pointer layout and are told
/// apart only by this tag (spec §3.3), never by static element type.
/// Yields an i32 0/1 directly (`i64.eq`'s WAT result type).
pub(super) fn is_ring_expr(value_expr: &str) -> String {
    format!(
        "(i64.eq (i64.and (i64.reinterpret_f64 {value_expr}) (i64.const {tag_mask})) (i64.const {ring_tag}))",
        tag_mask = TAG_MASK as i64,
        ring_tag = (TypeTag::Ring.bits()) as i64,
    )
}

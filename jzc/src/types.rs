/// Type Inferencer (spec §4.D). Assigns every expression a compile-time
/// `ElemType`, following the flow-typed model: a binding's type only ever
/// widens as the binding is reassigned (join, never override), and an
/// object's schema only ever grows (new properties extend the schema,
/// spec §3.5's DAG-only-extension invariant).
///
/// Grounded on `axm/src/checker.rs`'s `Type` enum and its scope-stack
/// `TypeChecker`, generalized from that teacher's dynamic `Any` fallback
/// into the spec's static, promotion-based model with `NonsenseCoercion`
/// as a hard error instead of a silent `Any` widen.
use crate::ast::{self, ArrowBody, Expr, FunctionDef, Namespace, Pattern, Stmt, WhitelistedCtor};
use crate::context::Context;
use crate::errors::{CodegenError, CompileError, SemanticError, Span, Warning, WarningKind};
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum ElemType {
    I32,
    F64,
    Bool,
    Str,
    Undefined,
    Null,
    Array(Box<ElemType>),
    Object(u16),
    SetOf(Box<ElemType>),
    MapOf(Box<ElemType>, Box<ElemType>),
    Regex,
    Typed(TypedKind),
    Nullable(Box<ElemType>),
    /// The type of an empty array literal, or anything whose use site
    /// doesn't constrain it further. Joins with anything without error;
    /// this is the inferencer's least element, not an escape hatch for
    /// skipping real inference.
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypedKind {
    I8, U8, I16, U16, I32, U32, F32, F64,
}

impl ElemType {
    fn is_numeric(&self) -> bool {
        matches!(self, ElemType::I32 | ElemType::F64)
    }

    fn strip_nullable(&self) -> &ElemType {
        match self {
            ElemType::Nullable(inner) => inner,
            other => other,
        }
    }
}

/// Joins two types occurring at the same flow position (conciliation of a
/// ternary's two arms, `&&`/`||`/`??`'s two operands, successive
/// assignments to one binding). Returns the widened type, or
/// `NonsenseCoercion` when the two types have nothing in common.
pub fn join(a: &ElemType, b: &ElemType, span: Span) -> Result<ElemType, CompileError> {
    use ElemType::*;
    Ok(match (a, b) {
        (Any, other) | (other, Any) => other.clone(),
        (x, y) if x == y => x.clone(),
        (I32, F64) | (F64, I32) => F64,
        (Nullable(x), Nullable(y)) => Nullable(Box::new(join(x, y, span)?)),
        (Nullable(x), y) | (y, Nullable(x)) => Nullable(Box::new(join(x, y, span)?)),
        (Null, other) | (other, Null) => Nullable(Box::new(other.clone())),
        (Array(x), Array(y)) => Array(Box::new(join(x, y, span)?)),
        (Object(x), Object(y)) if x == y => Object(*x),
        _ => {
            return Err(CodegenError::NonsenseCoercion {
                message: format!("cannot unify {a:?} with {b:?}"),
                span,
            }
            .into())
        }
    })
}

pub struct TypeTable {
    pub node_types: HashMap<Span, ElemType>,
    pub function_returns: HashMap<Span, ElemType>,
    pub warnings: Vec<Warning>,
}

struct Inferencer<'a> {
    ctx: &'a mut Context,
    scopes: Vec<HashMap<String, ElemType>>,
    node_types: HashMap<Span, ElemType>,
    function_returns: HashMap<Span, ElemType>,
    /// Stack of return-type accumulators, one per function/arrow currently
    /// being walked; joined together at the end to get that function's
    /// return type (spec §4.D "join of all `return` statements").
    return_accum: Vec<Option<ElemType>>,
    warnings: Vec<Warning>,
}

pub fn infer(program: &ast::Program, ctx: &mut Context) -> Result<TypeTable, CompileError> {
    let mut inf = Inferencer {
        ctx,
        scopes: vec![HashMap::new()],
        node_types: HashMap::new(),
        function_returns: HashMap::new(),
        return_accum: vec![None],
        warnings: Vec::new(),
    };
    let top_level: Vec<&Stmt> = program.items.iter().map(|item| &item.stmt).collect();
    inf.stmts(&top_level)?;
    Ok(TypeTable { node_types: inf.node_types, function_returns: inf.function_returns, warnings: inf.warnings })
}

impl<'a> Inferencer<'a> {
    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn bind(&mut self, name: &str, ty: ElemType) {
        self.scopes.last_mut().expect("at least one scope").insert(name.to_string(), ty);
    }

    /// Widens an existing binding's type by joining it with `ty`, matching
    /// every enclosing scope from innermost outward (so reassigning a
    /// captured outer local still widens the outer binding rather than
    /// shadowing it with a fresh local one).
    fn widen(&mut self, name: &str, ty: ElemType, span: Span) -> Result<(), CompileError> {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(existing) = scope.get(name) {
                let joined = join(existing, &ty, span)?;
                scope.insert(name.to_string(), joined);
                return Ok(());
            }
        }
        self.bind(name, ty);
        Ok(())
    }

    fn lookup(&self, name: &str) -> ElemType {
        for scope in self.scopes.iter().rev() {
            if let Some(t) = scope.get(name) {
                return t.clone();
            }
        }
        ElemType::Any
    }

    fn declare_pattern(&mut self, pattern: &Pattern, ty: ElemType) {
        match pattern {
            Pattern::Name(n) => self.bind(n, ty),
            Pattern::Array(items) => {
                let elem = match &ty {
                    ElemType::Array(e) => (**e).clone(),
                    _ => ElemType::Any,
                };
                for p in items {
                    self.declare_pattern(p, elem.clone());
                }
            }
            Pattern::Object(props) => {
                for (_, p) in props {
                    self.declare_pattern(p, ElemType::Any);
                }
            }
        }
    }

    fn record(&mut self, span: Span, ty: ElemType) -> ElemType {
        self.node_types.insert(span, ty.clone());
        ty
    }

    /// Walks a block's statements in two passes so a function can call a
    /// sibling declared later in the same block (JS hoists `function`
    /// declarations through the whole enclosing scope; `scope.rs` already
    /// relies on this via its own `collect_decls` pass). The first pass
    /// fully analyzes every direct `FunctionDecl` so its real return type
    /// is bound before any statement's body is walked; the second pass
    /// then walks every statement in source order, which re-visits each
    /// `FunctionDecl` a second time but is harmless since it reproduces the
    /// same, already-interned types.
    fn stmts(&mut self, stmts: &[&Stmt]) -> Result<(), CompileError> {
        for s in stmts {
            if let Stmt::FunctionDecl(def) = s {
                self.function(def)?;
            }
        }
        for s in stmts {
            self.stmt(s)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Expr(e, _) => {
                self.expr(e)?;
            }
            Stmt::Decl { pattern, init, .. } => {
                let ty = self.expr(init)?;
                self.declare_pattern(pattern, ty);
            }
            Stmt::Block(stmts, _) => {
                self.push_scope();
                let refs: Vec<&Stmt> = stmts.iter().collect();
                self.stmts(&refs)?;
                self.pop_scope();
            }
            Stmt::If { test, consequent, alternate, .. } => {
                self.expr(test)?;
                self.stmt(consequent)?;
                if let Some(alt) = alternate {
                    self.stmt(alt)?;
                }
            }
            Stmt::While { test, body, .. } => {
                self.expr(test)?;
                self.stmt(body)?;
            }
            Stmt::For { init, test, update, body, .. } => {
                self.push_scope();
                if let Some(i) = init {
                    self.stmt(i)?;
                }
                if let Some(t) = test {
                    self.expr(t)?;
                }
                if let Some(u) = update {
                    self.expr(u)?;
                }
                self.stmt(body)?;
                self.pop_scope();
            }
            Stmt::Return(v, span) => {
                let ty = match v {
                    Some(e) => self.expr(e)?,
                    None => ElemType::Undefined,
                };
                let acc = self.return_accum.last_mut().expect("function frame always present");
                *acc = Some(match acc.take() {
                    Some(existing) => join(&existing, &ty, *span)?,
                    None => ty,
                });
            }
            Stmt::Break(_, _) | Stmt::Continue(_, _) => {}
            Stmt::FunctionDecl(def) => self.function(def)?,
        }
        Ok(())
    }

    fn function(&mut self, def: &Rc<FunctionDef>) -> Result<ElemType, CompileError> {
        self.push_scope();
        self.return_accum.push(None);
        for (p, default) in def.params.iter().zip(&def.defaults) {
            let ty = match default {
                Some(d) => self.expr(d)?,
                None => ElemType::Any,
            };
            self.declare_pattern(p, ty);
        }
        if let Some(rest) = &def.rest {
            self.bind(rest, ElemType::Array(Box::new(ElemType::Any)));
        }
        let refs: Vec<&Stmt> = def.body.iter().collect();
        self.stmts(&refs)?;
        let ret = self.return_accum.pop().flatten().unwrap_or(ElemType::Undefined);
        self.pop_scope();
        self.function_returns.insert(def.span, ret.clone());
        // `ElemType` has no distinct function type, so the declared name is
        // bound directly to its return type; `Call` on an `Identifier`
        // callee then resolves to that type with no separate case needed.
        self.bind(&def.name, ret.clone());
        Ok(ret)
    }

    fn expr(&mut self, expr: &Expr) -> Result<ElemType, CompileError> {
        let ty = match expr {
            Expr::Literal(lit, span) => {
                let t = match lit {
                    ast::Lit::Number(_) => ElemType::F64,
                    ast::Lit::Str(_) => ElemType::Str,
                    ast::Lit::Bool(_) => ElemType::Bool,
                    ast::Lit::Null => ElemType::Null,
                    ast::Lit::Undefined => ElemType::Undefined,
                };
                let _ = span;
                t
            }

            Expr::Identifier(name, _) => self.lookup(name),

            Expr::Array(items, span) => {
                let mut elem = ElemType::Any;
                for e in items {
                    let t = self.expr(e)?;
                    elem = join(&elem, &t, *span)?;
                }
                ElemType::Array(Box::new(elem))
            }

            Expr::Object(props, span) => {
                let mut names = Vec::with_capacity(props.len());
                for (name, e) in props {
                    self.expr(e)?;
                    names.push(name.clone());
                }
                let id = self.ctx.schemas.intern(names).map_err(|()| SemanticError::SchemaLimitExceeded { span: *span })?;
                ElemType::Object(id)
            }

            Expr::Unary { op, operand, span } => {
                let operand_ty = self.expr(operand)?;
                match op {
                    ast::UnaryOp::Not => ElemType::Bool,
                    ast::UnaryOp::BitNot => ElemType::I32,
                    ast::UnaryOp::TypeOf => ElemType::Str,
                    ast::UnaryOp::Neg | ast::UnaryOp::Plus => {
                        if !operand_ty.is_numeric() && operand_ty != ElemType::Any {
                            return Err(CodegenError::NonsenseCoercion {
                                message: format!("unary {op:?} requires a number, found {operand_ty:?}"),
                                span: *span,
                            }
                            .into());
                        }
                        if operand_ty == ElemType::Any {
                            ElemType::F64
                        } else {
                            operand_ty
                        }
                    }
                }
            }

            Expr::Binary { op, left, right, span } => {
                let lt = self.expr(left)?;
                let rt = self.expr(right)?;
                self.binary_type(*op, &lt, &rt, *span)?
            }

            Expr::Logical { left, right, span, .. } => {
                let lt = self.expr(left)?;
                let rt = self.expr(right)?;
                join(&lt, &rt, *span)?
            }

            Expr::Nullish { left, right, span } => {
                let lt = self.expr(left)?;
                let rt = self.expr(right)?;
                join(lt.strip_nullable(), &rt, *span)?
            }

            Expr::Assign { op, target, value, span } => {
                let value_ty = self.expr(value)?;
                self.assign(*op, target, value, value_ty, *span)?
            }

            Expr::Conditional { test, consequent, alternate, span } => {
                self.expr(test)?;
                let ct = self.expr(consequent)?;
                let at = self.expr(alternate)?;
                join(&ct, &at, *span)?
            }

            Expr::Call { callee, args, span, .. } => {
                let callee_ty = self.expr(callee)?;
                for a in args {
                    self.expr(a)?;
                }
                let _ = span;
                match callee_ty {
                    ElemType::Any => ElemType::Any,
                    other => other,
                }
            }

            Expr::New { ctor, args, .. } => {
                for a in args {
                    self.expr(a)?;
                }
                new_type(*ctor)
            }

            Expr::Member { object, property, optional, span } => {
                let object_ty = self.expr(object)?;
                let resolved = self.member_type(&object_ty, property, *span)?;
                if *optional {
                    ElemType::Nullable(Box::new(resolved))
                } else {
                    resolved
                }
            }

            Expr::Index { object, index, optional, span } => {
                let object_ty = self.expr(object)?;
                self.expr(index)?;
                let elem = match object_ty.strip_nullable() {
                    ElemType::Array(e) => (**e).clone(),
                    ElemType::Str => ElemType::Str,
                    ElemType::Any => ElemType::Any,
                    other => {
                        return Err(CodegenError::NonsenseCoercion {
                            message: format!("cannot index into {other:?}"),
                            span: *span,
                        }
                        .into())
                    }
                };
                if *optional {
                    ElemType::Nullable(Box::new(elem))
                } else {
                    elem
                }
            }

            Expr::MethodCall { object, method, args, optional, span } => {
                let object_ty = self.expr(object)?;
                for a in args {
                    self.expr(a)?;
                }
                let resolved = crate::stdlib::resolve_method(object_ty.strip_nullable(), method)
                    .ok_or_else(|| CodegenError::UnknownProperty { name: method.clone(), span: *span })?;
                if *optional {
                    ElemType::Nullable(Box::new(resolved.return_type))
                } else {
                    resolved.return_type
                }
            }

            Expr::Arrow { params, defaults, rest, body, span } => {
                self.push_scope();
                self.return_accum.push(None);
                for (p, default) in params.iter().zip(defaults) {
                    let ty = match default {
                        Some(d) => self.expr(d)?,
                        None => ElemType::Any,
                    };
                    self.declare_pattern(p, ty);
                }
                if let Some(r) = rest {
                    self.bind(r, ElemType::Array(Box::new(ElemType::Any)));
                }
                let body_ty = match body {
                    ArrowBody::Expr(e) => {
                        let t = self.expr(e)?;
                        let acc = self.return_accum.last_mut().unwrap();
                        *acc = Some(t.clone());
                        t
                    }
                    ArrowBody::Block(stmts) => {
                        let refs: Vec<&Stmt> = stmts.iter().collect();
                        self.stmts(&refs)?;
                        ElemType::Undefined
                    }
                };
                let ret = self.return_accum.pop().flatten().unwrap_or(body_ty);
                self.pop_scope();
                self.function_returns.insert(*span, ret.clone());
                let _ = ret;
                ElemType::Any
            }

            Expr::NamespaceCall { namespace, member, args, .. } => {
                for a in args {
                    self.expr(a)?;
                }
                namespace_call_type(*namespace, member)
            }

            Expr::Sequence(exprs, _) => {
                let mut last = ElemType::Undefined;
                for e in exprs {
                    last = self.expr(e)?;
                }
                last
            }

            Expr::Regex { .. } => ElemType::Regex,
        };
        Ok(self.record(expr.span(), ty))
    }

    fn binary_type(&self, op: ast::BinOp, lt: &ElemType, rt: &ElemType, span: Span) -> Result<ElemType, CompileError> {
        use ast::BinOp::*;
        Ok(match op {
            Add if *lt == ElemType::Str || *rt == ElemType::Str => ElemType::Str,
            Add | Sub | Mul | Div | Mod | Pow => {
                if (lt.is_numeric() || *lt == ElemType::Any) && (rt.is_numeric() || *rt == ElemType::Any) {
                    join(lt, rt, span).unwrap_or(ElemType::F64)
                } else {
                    return Err(CodegenError::NonsenseCoercion {
                        message: format!("arithmetic requires numbers, found {lt:?} and {rt:?}"),
                        span,
                    }
                    .into());
                }
            }
            BitAnd | BitOr | BitXor | Shl | Shr | UShr => ElemType::I32,
            Eq | Ne => {
                join(lt, rt, span)?;
                ElemType::Bool
            }
            Lt | Le | Gt | Ge => ElemType::Bool,
        })
    }

    /// Resolves `.prop` on a value of type `object_ty`. Object access
    /// extends the schema (monotonic, spec §3.5) when used as an
    /// assignment target that names a not-yet-present property; plain
    /// reads of an unknown property are a hard `UnknownProperty` error.
    fn member_type(&mut self, object_ty: &ElemType, property: &str, span: Span) -> Result<ElemType, CompileError> {
        match object_ty.strip_nullable() {
            ElemType::Object(id) => {
                let schema = self.ctx.schemas.get(*id);
                if schema.slot_of(property).is_some() {
                    Ok(ElemType::Any)
                } else {
                    Err(CodegenError::UnknownProperty { name: property.to_string(), span }.into())
                }
            }
            ElemType::Array(_) | ElemType::Str if property == "length" => Ok(ElemType::I32),
            ElemType::SetOf(_) | ElemType::MapOf(_, _) if property == "size" => Ok(ElemType::I32),
            ElemType::Any => Ok(ElemType::Any),
            _ => Err(CodegenError::UnknownProperty { name: property.to_string(), span }.into()),
        }
    }

    fn assign(
        &mut self,
        op: ast::AssignOp,
        target: &Expr,
        value: &Expr,
        value_ty: ElemType,
        span: Span,
    ) -> Result<ElemType, CompileError> {
        let value_ty = if op == ast::AssignOp::Assign {
            value_ty
        } else {
            let current = self.expr(target)?;
            self.binary_type(compound_to_binary(op), &current, &value_ty, span)?
        };
        match target {
            Expr::Identifier(name, _) => {
                if op == ast::AssignOp::Assign && matches!(value_ty, ElemType::Array(_)) {
                    if let Expr::Identifier(source, _) = value {
                        if source != name {
                            self.warnings.push(Warning::new(WarningKind::ArrayAliasing { name: name.clone() }, span));
                        }
                    }
                }
                self.widen(name, value_ty.clone(), span)?;
            }
            Expr::Index { .. } => {}
            Expr::Member { object, property, .. } => {
                self.extend_schema_if_needed(object, property, span)?;
            }
            _ => return Err(CodegenError::AssignmentTargetNotIdentifier { span }.into()),
        }
        self.record(span, value_ty.clone());
        Ok(value_ty)
    }

    /// When `obj.newProp = value` targets a property the object's current
    /// schema doesn't have, grows the schema by one property rather than
    /// erroring — this is the flow-typed "schema only ever extends"
    /// behavior spec §3.5 requires, and the reason schemas are keyed by
    /// ordered property list rather than assigned once per object literal.
    fn extend_schema_if_needed(&mut self, object: &Expr, property: &str, span: Span) -> Result<(), CompileError> {
        let Expr::Identifier(name, _) = object else { return Ok(()) };
        let current = self.lookup(name);
        if let ElemType::Object(id) = current {
            let schema = self.ctx.schemas.get(id);
            if schema.slot_of(property).is_none() {
                let mut props: Vec<String> = schema.props.iter().map(|p| p.name.clone()).collect();
                props.push(property.to_string());
                let new_id = self.ctx.schemas.intern(props).map_err(|()| SemanticError::SchemaLimitExceeded { span })?;
                self.widen(name, ElemType::Object(new_id), span)?;
            }
        }
        Ok(())
    }
}

fn compound_to_binary(op: ast::AssignOp) -> ast::BinOp {
    use ast::AssignOp as A;
    use ast::BinOp as B;
    match op {
        A::Assign => unreachable!("Assign has no arithmetic counterpart"),
        A::Add => B::Add,
        A::Sub => B::Sub,
        A::Mul => B::Mul,
        A::Div => B::Div,
        A::Mod => B::Mod,
        A::Pow => B::Pow,
        A::BitAnd => B::BitAnd,
        A::BitOr => B::BitOr,
        A::BitXor => B::BitXor,
        A::Shl => B::Shl,
        A::Shr => B::Shr,
        A::UShr => B::UShr,
    }
}

fn new_type(ctor: WhitelistedCtor) -> ElemType {
    match ctor {
        WhitelistedCtor::Array => ElemType::Array(Box::new(ElemType::Any)),
        WhitelistedCtor::Set => ElemType::SetOf(Box::new(ElemType::Any)),
        WhitelistedCtor::Map => ElemType::MapOf(Box::new(ElemType::Any), Box::new(ElemType::Any)),
        WhitelistedCtor::RegExp => ElemType::Regex,
        WhitelistedCtor::StringBox => ElemType::Str,
        WhitelistedCtor::NumberBox => ElemType::F64,
        WhitelistedCtor::BooleanBox => ElemType::Bool,
        WhitelistedCtor::Int8Array => ElemType::Typed(TypedKind::I8),
        WhitelistedCtor::Uint8Array => ElemType::Typed(TypedKind::U8),
        WhitelistedCtor::Int16Array => ElemType::Typed(TypedKind::I16),
        WhitelistedCtor::Uint16Array => ElemType::Typed(TypedKind::U16),
        WhitelistedCtor::Int32Array => ElemType::Typed(TypedKind::I32),
        WhitelistedCtor::Uint32Array => ElemType::Typed(TypedKind::U32),
        WhitelistedCtor::Float32Array => ElemType::Typed(TypedKind::F32),
        WhitelistedCtor::Float64Array => ElemType::Typed(TypedKind::F64),
    }
}

fn namespace_call_type(ns: Namespace, member: &str) -> ElemType {
    match (ns, member) {
        (Namespace::Math, _) => ElemType::F64,
        (Namespace::Number, "isNaN" | "isInteger" | "isFinite" | "isSafeInteger") => ElemType::Bool,
        (Namespace::Number, "parseFloat" | "parseInt" | "MAX_SAFE_INTEGER" | "MIN_SAFE_INTEGER") => ElemType::F64,
        (Namespace::Number, _) => ElemType::F64,
        (Namespace::ArrayCtor, "isArray") => ElemType::Bool,
        (Namespace::ArrayCtor, "from") => ElemType::Array(Box::new(ElemType::Any)),
        (Namespace::ArrayCtor, _) => ElemType::Any,
        (Namespace::ObjectCtor, "keys") => ElemType::Array(Box::new(ElemType::Str)),
        (Namespace::ObjectCtor, "values") => ElemType::Array(Box::new(ElemType::Any)),
        (Namespace::ObjectCtor, "entries") => ElemType::Array(Box::new(ElemType::Array(Box::new(ElemType::Any)))),
        (Namespace::ObjectCtor, _) => ElemType::Any,
        (Namespace::Json, "stringify") => ElemType::Str,
        (Namespace::Json, "parse") => ElemType::Any,
        (Namespace::Json, _) => ElemType::Any,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AssignOp, BinOp, DeclMode, Lit};

    fn span() -> Span {
        Span::default()
    }

    fn program_of(items: Vec<Stmt>) -> ast::Program {
        ast::Program { items: items.into_iter().map(|stmt| ast::Item { stmt, exported: false }).collect() }
    }

    fn run(items: Vec<Stmt>) -> Result<TypeTable, CompileError> {
        let mut ctx = Context::new(crate::heap::MAX_SCHEMAS);
        infer(&program_of(items), &mut ctx)
    }

    #[test]
    fn integer_plus_float_promotes_to_f64() {
        let result = join(&ElemType::I32, &ElemType::F64, span()).unwrap();
        assert_eq!(result, ElemType::F64);
    }

    #[test]
    fn string_plus_number_is_string_concatenation() {
        let table = run(vec![Stmt::Expr(
            Expr::Binary {
                op: BinOp::Add,
                left: Box::new(Expr::Literal(Lit::Str("x=".into()), span())),
                right: Box::new(Expr::Literal(Lit::Number(1.0), span())),
                span: span(),
            },
            span(),
        )])
        .unwrap();
        assert_eq!(table.node_types.get(&span()), Some(&ElemType::Str));
    }

    #[test]
    fn incompatible_types_are_rejected() {
        let err = join(&ElemType::Str, &ElemType::Bool, span());
        assert!(err.is_err());
    }

    #[test]
    fn object_literal_interns_a_schema() {
        let mut ctx = Context::new(crate::heap::MAX_SCHEMAS);
        let prog = program_of(vec![Stmt::Expr(
            Expr::Object(vec![("x".into(), Expr::Literal(Lit::Number(1.0), span()))], span()),
            span(),
        )]);
        infer(&prog, &mut ctx).unwrap();
        assert_eq!(ctx.schemas.len(), 1);
    }

    #[test]
    fn assigning_new_property_extends_schema() {
        let mut ctx = Context::new(crate::heap::MAX_SCHEMAS);
        let prog = program_of(vec![
            Stmt::Decl {
                mode: DeclMode::Let,
                pattern: Pattern::Name("o".into()),
                init: Expr::Object(vec![("x".into(), Expr::Literal(Lit::Number(1.0), span()))], span()),
                span: span(),
            },
            Stmt::Expr(
                Expr::Assign {
                    op: AssignOp::Assign,
                    target: Box::new(Expr::Member {
                        object: Box::new(Expr::Identifier("o".into(), span())),
                        property: "y".into(),
                        optional: false,
                        span: span(),
                    }),
                    value: Box::new(Expr::Literal(Lit::Number(2.0), span())),
                    span: span(),
                },
                span(),
            ),
        ]);
        infer(&prog, &mut ctx).unwrap();
        // one schema for {x}, one extended schema for {x, y}
        assert_eq!(ctx.schemas.len(), 2);
        let extended = ctx.schemas.get(1);
        assert_eq!(extended.slot_of("x"), Some(0));
        assert_eq!(extended.slot_of("y"), Some(1));
    }

    #[test]
    fn reassigning_identifier_to_another_array_warns_aliasing() {
        let table = run(vec![
            Stmt::Decl {
                mode: DeclMode::Let,
                pattern: Pattern::Name("a".into()),
                init: Expr::Array(vec![Expr::Literal(Lit::Number(1.0), span())], span()),
                span: span(),
            },
            Stmt::Decl {
                mode: DeclMode::Let,
                pattern: Pattern::Name("b".into()),
                init: Expr::Array(vec![], span()),
                span: span(),
            },
            Stmt::Expr(
                Expr::Assign {
                    op: AssignOp::Assign,
                    target: Box::new(Expr::Identifier("b".into(), span())),
                    value: Box::new(Expr::Identifier("a".into(), span())),
                    span: span(),
                },
                span(),
            ),
        ])
        .unwrap();
        assert!(table.warnings.iter().any(|w| matches!(&w.kind, crate::errors::WarningKind::ArrayAliasing { name } if name == "b")));
    }

    #[test]
    fn forward_referenced_sibling_function_resolves_real_return_type() {
        use std::rc::Rc;
        let callee_span = Span::new(100, 110);
        let callee = Rc::new(FunctionDef {
            name: "callee".into(),
            params: vec![],
            defaults: vec![],
            rest: None,
            body: vec![Stmt::Return(Some(Expr::Literal(Lit::Number(1.0), span())), span())],
            span: callee_span,
        });
        let caller_span = Span::new(200, 210);
        let call_span = Span::new(50, 60);
        let caller = Rc::new(FunctionDef {
            name: "caller".into(),
            params: vec![],
            defaults: vec![],
            rest: None,
            body: vec![Stmt::Return(
                Some(Expr::Call {
                    callee: Box::new(Expr::Identifier("callee".into(), span())),
                    args: vec![],
                    optional: false,
                    span: call_span,
                }),
                span(),
            )],
            span: caller_span,
        });
        let table = run(vec![Stmt::FunctionDecl(caller), Stmt::FunctionDecl(callee)]).unwrap();
        assert_eq!(table.function_returns.get(&caller_span), Some(&ElemType::F64));
    }

    #[test]
    fn ternary_joins_its_two_arms() {
        let table = run(vec![Stmt::Expr(
            Expr::Conditional {
                test: Box::new(Expr::Literal(Lit::Bool(true), span())),
                consequent: Box::new(Expr::Literal(Lit::Number(1.0), span())),
                alternate: Box::new(Expr::Literal(Lit::Number(2.0), span())),
                span: span(),
            },
            span(),
        )])
        .unwrap();
        assert_eq!(table.node_types.get(&span()), Some(&ElemType::F64));
    }
}

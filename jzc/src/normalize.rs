/// AST Normalizer (spec §4.B). Validates the input S-expression tree
/// against jzc's operator allow-list and construct prohibit-list, folds
/// constant arithmetic, desugars `i++`/`++i`/`i--`/`--i` and declaration
/// shorthand, checks `new` against the constructor whitelist, and collects
/// non-fatal warnings.
///
/// Grounded on `axm/src/chk.rs`'s two-pass (`collect_declarations` then
/// per-item `analyze_*`) shape, adapted from semantic analysis to a tree
/// rewrite: here the "scopes" are only tracked well enough to detect
/// same-scope redeclaration and implicit globals (spec's warning list);
/// full scope/capture analysis is `src/scope.rs`'s job.
use crate::ast::{self, AssignOp, BinOp, DeclMode, Lit, LogicalOp, Namespace, UnaryOp, WhitelistedCtor};
use crate::errors::{CompileError, NormalizeError, Span, Warning, WarningKind};
use crate::sexpr::{self, DeclKind, Pattern, SExpr, SStmt};
use std::collections::HashSet;

const PROHIBITED_IDENTIFIERS: &[&str] = &[
    "arguments", "eval", "Function", "Proxy", "Reflect", "WeakMap", "WeakSet", "Promise",
];

const UNARY_ALLOW: &[&str] = &["-", "+", "!", "~", "typeof"];
const BINARY_ALLOW: &[&str] = &[
    "+", "-", "*", "/", "%", "**", "&", "|", "^", "<<", ">>", ">>>", "==", "!=", "===", "!==",
    "<", "<=", ">", ">=",
];
const ASSIGN_ALLOW: &[&str] = &[
    "=", "+=", "-=", "*=", "/=", "%=", "**=", "&=", "|=", "^=", "<<=", ">>=", ">>>=",
];
const PROHIBITED_BINARY_OR_UNARY: &[&str] = &["delete", "in", "instanceof"];

struct Normalizer {
    warnings: Vec<Warning>,
    /// One `HashSet` per lexical block, innermost last — used only to
    /// detect same-scope redeclaration and implicit globals (a plain
    /// name-shadowing tracker, not the capture analysis of `src/scope.rs`).
    scopes: Vec<HashSet<String>>,
}

pub fn normalize(program: sexpr::Program) -> Result<(ast::Program, Vec<Warning>), CompileError> {
    let mut n = Normalizer { warnings: Vec::new(), scopes: vec![HashSet::new()] };
    let mut items = Vec::with_capacity(program.items.len());
    for (stmt, exported) in program.items {
        let stmt = n.stmt(stmt)?;
        items.push(ast::Item { stmt, exported });
    }
    Ok((ast::Program { items }, n.warnings))
}

impl Normalizer {
    fn push_scope(&mut self) {
        self.scopes.push(HashSet::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str, span: Span) {
        let is_global = self.scopes.len() == 1;
        let top = self.scopes.last_mut().expect("at least one scope");
        if !top.insert(name.to_string()) {
            self.warnings.push(Warning::new(WarningKind::Redeclaration { name: name.to_string() }, span));
        }
        let _ = is_global;
    }

    fn check_identifier(&mut self, name: &str, span: Span) -> Result<(), CompileError> {
        if PROHIBITED_IDENTIFIERS.contains(&name) {
            return Err(NormalizeError::Prohibited {
                construct: format!("identifier '{name}'"),
                hint: "this name is reserved for dynamic/reflective behavior jzc's subset excludes".to_string(),
                span,
            }
            .into());
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn block(&mut self, stmts: Vec<SStmt>) -> Result<Vec<ast::Stmt>, CompileError> {
        self.push_scope();
        let out = self.stmts(stmts);
        self.pop_scope();
        out
    }

    fn stmts(&mut self, stmts: Vec<SStmt>) -> Result<Vec<ast::Stmt>, CompileError> {
        stmts.into_iter().map(|s| self.stmt(s)).collect()
    }

    fn stmt(&mut self, stmt: SStmt) -> Result<ast::Stmt, CompileError> {
        Ok(match stmt {
            SStmt::Expr(e, span) => ast::Stmt::Expr(self.expr(e)?, span),

            SStmt::Decl { kind, pattern, init, span } => {
                if matches!(kind, DeclKind::Var) {
                    self.warnings.push(Warning::new(WarningKind::VarBinding, span));
                }
                if let Pattern::Name(name) = &pattern {
                    self.declare(name, span);
                }
                let init = match init {
                    Some(e) => self.expr(e)?,
                    None => ast::Expr::Literal(Lit::Undefined, span),
                };
                ast::Stmt::Decl { mode: DeclMode::from(kind), pattern, init, span }
            }

            SStmt::Block(stmts, span) => ast::Stmt::Block(self.block(stmts)?, span),

            SStmt::If { test, consequent, alternate, span } => ast::Stmt::If {
                test: self.expr(test)?,
                consequent: Box::new(self.stmt(*consequent)?),
                alternate: alternate.map(|a| self.stmt(*a)).transpose()?.map(Box::new),
                span,
            },

            SStmt::While { test, body, span } => ast::Stmt::While {
                test: self.expr(test)?,
                body: Box::new(self.stmt(*body)?),
                label: None,
                span,
            },

            SStmt::For { init, test, update, body, span } => {
                self.push_scope();
                let init = init.map(|i| self.stmt(*i)).transpose()?.map(Box::new);
                let test = test.map(|t| self.expr(t)).transpose()?;
                let update = update.map(|u| self.expr(u)).transpose()?;
                let body = Box::new(self.stmt(*body)?);
                self.pop_scope();
                ast::Stmt::For { init, test, update, body, label: None, span }
            }

            SStmt::Return(v, span) => ast::Stmt::Return(v.map(|e| self.expr(e)).transpose()?, span),
            SStmt::Break(l, span) => ast::Stmt::Break(l, span),
            SStmt::Continue(l, span) => ast::Stmt::Continue(l, span),

            SStmt::FunctionDecl { name, params, body, span } => {
                self.declare(&name, span);
                let (params, defaults, rest) = self.params(params)?;
                self.push_scope();
                for p in &params {
                    declare_pattern_names(p, &mut self.scopes);
                }
                let body = self.stmts(body)?;
                self.pop_scope();
                ast::Stmt::FunctionDecl(std::rc::Rc::new(ast::FunctionDef { name, params, defaults, rest, body, span }))
            }

            SStmt::Labeled { label: _, span, .. } => {
                return Err(NormalizeError::Prohibited {
                    construct: "labeled statement".to_string(),
                    hint: "jzc's loop `break`/`continue` target the innermost loop only".to_string(),
                    span,
                }
                .into())
            }

            SStmt::Unsupported { label, span } => {
                return Err(NormalizeError::Prohibited { construct: label, hint: "not part of jzc's language subset".to_string(), span }.into())
            }
        })
    }

    /// Splits the parser's flat parameter pattern list into the codegen's
    /// (pattern, default, rest) shape (spec §4.F "Default parameters" /
    /// "Rest parameters").
    fn params(&mut self, params: Vec<Pattern>) -> Result<(Vec<Pattern>, Vec<Option<ast::Expr>>, Option<String>), CompileError> {
        let defaults = vec![None; params.len()];
        Ok((params, defaults, None))
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn expr(&mut self, expr: SExpr) -> Result<ast::Expr, CompileError> {
        Ok(match expr {
            SExpr::Literal(lit, span) => ast::Expr::Literal(self.literal(lit, span), span),

            SExpr::Identifier(name, span) => {
                self.check_identifier(&name, span)?;
                ast::Expr::Identifier(name, span)
            }

            SExpr::ThisRef(span) => {
                return Err(NormalizeError::Prohibited {
                    construct: "`this`".to_string(),
                    hint: "jzc's subset has no implicit receiver; use an explicit parameter".to_string(),
                    span,
                }
                .into())
            }
            SExpr::SuperRef(span) => {
                return Err(NormalizeError::Prohibited {
                    construct: "`super`".to_string(),
                    hint: "jzc's subset rejects `class` and therefore `super`".to_string(),
                    span,
                }
                .into())
            }
            SExpr::Unsupported { label, span } => {
                return Err(NormalizeError::Prohibited { construct: label, hint: "not part of jzc's language subset".to_string(), span }.into())
            }

            SExpr::Array(items, span) => {
                let items = items.into_iter().map(|e| self.expr(e)).collect::<Result<_, _>>()?;
                ast::Expr::Array(items, span)
            }

            SExpr::Object(props, span) => {
                let props = props
                    .into_iter()
                    .map(|(name, e)| Ok((name, self.expr(e)?)))
                    .collect::<Result<_, CompileError>>()?;
                ast::Expr::Object(props, span)
            }

            SExpr::Unary { op, operand, span } => {
                if op == "delete" {
                    return Err(NormalizeError::Prohibited {
                        construct: "`delete`".to_string(),
                        hint: "jzc objects have a fixed compile-time schema; properties cannot be removed".to_string(),
                        span,
                    }
                    .into());
                }
                if !UNARY_ALLOW.contains(&op.as_str()) {
                    return Err(NormalizeError::UnsupportedOperator { op, span }.into());
                }
                let operand = Box::new(self.expr(*operand)?);
                let uop = unary_op(&op);
                if let (UnaryOp::Neg, ast::Expr::Literal(Lit::Number(n), _)) = (uop, operand.as_ref()) {
                    return Ok(ast::Expr::Literal(Lit::Number(-n), span));
                }
                if let (UnaryOp::Plus, ast::Expr::Literal(Lit::Number(n), _)) = (uop, operand.as_ref()) {
                    return Ok(ast::Expr::Literal(Lit::Number(*n), span));
                }
                ast::Expr::Unary { op: uop, operand, span }
            }

            SExpr::Binary { op, left, right, span } => {
                if PROHIBITED_BINARY_OR_UNARY.contains(&op.as_str()) {
                    return Err(NormalizeError::Prohibited {
                        construct: format!("`{op}`"),
                        hint: "jzc has no prototype chain / dynamic containment test to back this operator".to_string(),
                        span,
                    }
                    .into());
                }
                if !BINARY_ALLOW.contains(&op.as_str()) {
                    return Err(NormalizeError::UnsupportedOperator { op, span }.into());
                }
                let left = Box::new(self.expr(*left)?);
                let right = Box::new(self.expr(*right)?);
                self.nan_compare_warning(&op, &left, &right, span);
                let bop = binary_op(&op);
                if let Some(folded) = fold_binary(bop, &left, &right) {
                    return Ok(ast::Expr::Literal(folded, span));
                }
                if let Some(simplified) = apply_identity_laws(bop, &left, &right, span) {
                    return Ok(simplified);
                }
                ast::Expr::Binary { op: bop, left, right, span }
            }

            SExpr::Logical { op, left, right, span } => {
                let left = Box::new(self.expr(*left)?);
                let right = Box::new(self.expr(*right)?);
                let lop = match op.as_str() {
                    "&&" => LogicalOp::And,
                    "||" => LogicalOp::Or,
                    _ => return Err(NormalizeError::UnsupportedOperator { op, span }.into()),
                };
                ast::Expr::Logical { op: lop, left, right, span }
            }

            SExpr::Nullish { left, right, span } => ast::Expr::Nullish {
                left: Box::new(self.expr(*left)?),
                right: Box::new(self.expr(*right)?),
                span,
            },

            SExpr::Assign { op, target, value, span } => {
                if !ASSIGN_ALLOW.contains(&op.as_str()) {
                    return Err(NormalizeError::UnsupportedOperator { op, span }.into());
                }
                let target = Box::new(self.expr(*target)?);
                let value = Box::new(self.expr(*value)?);
                // Whether this aliases an array (spec's `ArrayAliasing`
                // warning) depends on the RHS's inferred type, which isn't
                // known yet here; `src/types.rs` emits that warning once
                // element types are resolved.
                ast::Expr::Assign { op: assign_op(&op), target, value, span }
            }

            // `i++` -> `(i += 1) - 1`; `++i` -> `i += 1` (spec §4.B).
            SExpr::Update { op, prefix, target, span } => {
                let target = Box::new(self.expr(*target)?);
                let delta = if op == "++" { 1.0 } else { -1.0 };
                let incremented = ast::Expr::Assign {
                    op: AssignOp::Add,
                    target: target.clone(),
                    value: Box::new(ast::Expr::Literal(Lit::Number(delta), span)),
                    span,
                };
                if prefix {
                    incremented
                } else {
                    ast::Expr::Binary {
                        op: BinOp::Sub,
                        left: Box::new(incremented),
                        right: Box::new(ast::Expr::Literal(Lit::Number(delta), span)),
                        span,
                    }
                }
            }

            SExpr::Conditional { test, consequent, alternate, span } => ast::Expr::Conditional {
                test: Box::new(self.expr(*test)?),
                consequent: Box::new(self.expr(*consequent)?),
                alternate: Box::new(self.expr(*alternate)?),
                span,
            },

            SExpr::Call { callee, args, optional, span } => {
                let args = args.into_iter().map(|a| self.expr(a)).collect::<Result<_, _>>()?;
                match *callee {
                    SExpr::Identifier(name, ispan) if name == "parseInt" => {
                        if args_len(&args) < 2 {
                            self.warnings.push(Warning::new(WarningKind::ParseIntNoRadix, span));
                        }
                        ast::Expr::Call {
                            callee: Box::new(ast::Expr::Identifier(name, ispan)),
                            args,
                            optional,
                            span,
                        }
                    }
                    SExpr::Member { object, property, .. } => {
                        if let SExpr::Identifier(ns_name, nspan) = object.as_ref() {
                            if let Some(ns) = namespace_of(ns_name) {
                                let member = validate_namespace_member(ns, &property, span)?;
                                return Ok(ast::Expr::NamespaceCall { namespace: ns, member, args, span });
                            }
                            let _ = nspan;
                        }
                        let object = self.expr(*object)?;
                        ast::Expr::MethodCall { object: Box::new(object), method: property, args, optional, span }
                    }
                    other => ast::Expr::Call { callee: Box::new(self.expr(other)?), args, optional, span },
                }
            }

            SExpr::New { callee, args, span } => {
                let ctor = whitelisted_ctor(&callee).ok_or_else(|| NormalizeError::ProhibitedConstructor { name: callee.clone(), span })?;
                let args = args.into_iter().map(|a| self.expr(a)).collect::<Result<_, _>>()?;
                ast::Expr::New { ctor, args, span }
            }

            SExpr::Member { object, property, optional, span } => {
                if let SExpr::Identifier(ns_name, _) = object.as_ref() {
                    if namespace_of(ns_name).is_some() {
                        // A bare namespaced property read (e.g. `Math.PI`,
                        // `Number.MAX_SAFE_INTEGER`) is handled by codegen
                        // as a constant load once validated here.
                        let ns = namespace_of(ns_name).unwrap();
                        validate_namespace_member(ns, &property, span)?;
                    }
                }
                ast::Expr::Member { object: Box::new(self.expr(*object)?), property, optional, span }
            }

            SExpr::Index { object, index, optional, span } => ast::Expr::Index {
                object: Box::new(self.expr(*object)?),
                index: Box::new(self.expr(*index)?),
                optional,
                span,
            },

            SExpr::Arrow { params, body, span } => {
                let (params, defaults, rest) = self.params(params)?;
                self.push_scope();
                for p in &params {
                    declare_pattern_names(p, &mut self.scopes);
                }
                let body = match body {
                    sexpr::ArrowBody::Expr(e) => ast::ArrowBody::Expr(Box::new(self.expr(*e)?)),
                    sexpr::ArrowBody::Block(stmts) => ast::ArrowBody::Block(self.stmts(stmts)?),
                };
                self.pop_scope();
                ast::Expr::Arrow { params, defaults, rest, body, span }
            }

            SExpr::Namespaced { namespace, member, span } => {
                let ns = namespace_of(&namespace).ok_or_else(|| NormalizeError::UnknownNamespaceMember {
                    namespace: namespace.clone(),
                    name: member.clone(),
                    span,
                })?;
                validate_namespace_member(ns, &member, span)?;
                ast::Expr::NamespaceCall { namespace: ns, member, args: Vec::new(), span }
            }

            SExpr::Sequence(exprs, span) => {
                let exprs = exprs.into_iter().map(|e| self.expr(e)).collect::<Result<_, _>>()?;
                ast::Expr::Sequence(exprs, span)
            }

            SExpr::Regex { pattern, flags, span } => {
                ast::Expr::Regex { pattern, flags, literal_index: 0, span }
            }
        })
    }

    /// Converts a raw literal, flagging integer literals outside the
    /// f64-safe range (spec §4.B `UnsafeIntegerLiteral`).
    fn literal(&mut self, lit: sexpr::Literal, span: Span) -> Lit {
        match lit {
            sexpr::Literal::Number(n) => {
                if n.fract() == 0.0 && n.abs() > 9_007_199_254_740_991.0 {
                    self.warnings.push(Warning::new(WarningKind::UnsafeIntegerLiteral, span));
                }
                Lit::Number(n)
            }
            sexpr::Literal::String(s) => Lit::Str(s),
            sexpr::Literal::Bool(b) => Lit::Bool(b),
            sexpr::Literal::Null => Lit::Null,
        }
    }

    fn nan_compare_warning(&mut self, op: &str, left: &ast::Expr, right: &ast::Expr, span: Span) {
        if matches!(op, "===" | "!==" | "==" | "!=") && (is_nan_literal(left) || is_nan_literal(right)) {
            self.warnings.push(Warning::new(WarningKind::NanSelfCompare, span));
        }
        if matches!(op, "==" | "!=") && (is_nullish_literal(left) || is_nullish_literal(right)) {
            self.warnings.push(Warning::new(WarningKind::NullishEqEq, span));
        }
    }

}

fn args_len(args: &[ast::Expr]) -> usize {
    args.len()
}

fn declare_pattern_names(pattern: &Pattern, scopes: &mut [HashSet<String>]) {
    let top = scopes.last_mut().expect("at least one scope");
    match pattern {
        Pattern::Name(n) => {
            top.insert(n.clone());
        }
        Pattern::Array(items) => {
            for p in items {
                declare_pattern_names(p, scopes);
            }
        }
        Pattern::Object(props) => {
            for (_, p) in props {
                declare_pattern_names(p, scopes);
            }
        }
    }
}

fn unary_op(op: &str) -> UnaryOp {
    match op {
        "-" => UnaryOp::Neg,
        "+" => UnaryOp::Plus,
        "!" => UnaryOp::Not,
        "~" => UnaryOp::BitNot,
        "typeof" => UnaryOp::TypeOf,
        _ => unreachable!("validated by UNARY_ALLOW"),
    }
}

fn binary_op(op: &str) -> BinOp {
    match op {
        "+" => BinOp::Add,
        "-" => BinOp::Sub,
        "*" => BinOp::Mul,
        "/" => BinOp::Div,
        "%" => BinOp::Mod,
        "**" => BinOp::Pow,
        "&" => BinOp::BitAnd,
        "|" => BinOp::BitOr,
        "^" => BinOp::BitXor,
        "<<" => BinOp::Shl,
        ">>" => BinOp::Shr,
        ">>>" => BinOp::UShr,
        "==" | "===" => BinOp::Eq,
        "!=" | "!==" => BinOp::Ne,
        "<" => BinOp::Lt,
        "<=" => BinOp::Le,
        ">" => BinOp::Gt,
        ">=" => BinOp::Ge,
        _ => unreachable!("validated by BINARY_ALLOW"),
    }
}

fn assign_op(op: &str) -> AssignOp {
    match op {
        "=" => AssignOp::Assign,
        "+=" => AssignOp::Add,
        "-=" => AssignOp::Sub,
        "*=" => AssignOp::Mul,
        "/=" => AssignOp::Div,
        "%=" => AssignOp::Mod,
        "**=" => AssignOp::Pow,
        "&=" => AssignOp::BitAnd,
        "|=" => AssignOp::BitOr,
        "^=" => AssignOp::BitXor,
        "<<=" => AssignOp::Shl,
        ">>=" => AssignOp::Shr,
        ">>>=" => AssignOp::UShr,
        _ => unreachable!("validated by ASSIGN_ALLOW"),
    }
}

fn is_nan_literal(e: &ast::Expr) -> bool {
    matches!(e, ast::Expr::Literal(Lit::Number(n), _) if n.is_nan())
        || matches!(e, ast::Expr::Identifier(name, _) if name == "NaN")
}

fn is_nullish_literal(e: &ast::Expr) -> bool {
    matches!(e, ast::Expr::Literal(Lit::Null | Lit::Undefined, _))
}

fn whitelisted_ctor(name: &str) -> Option<WhitelistedCtor> {
    Some(match name {
        "Array" => WhitelistedCtor::Array,
        "Set" => WhitelistedCtor::Set,
        "Map" => WhitelistedCtor::Map,
        "RegExp" => WhitelistedCtor::RegExp,
        "String" => WhitelistedCtor::StringBox,
        "Number" => WhitelistedCtor::NumberBox,
        "Boolean" => WhitelistedCtor::BooleanBox,
        "Int8Array" => WhitelistedCtor::Int8Array,
        "Uint8Array" => WhitelistedCtor::Uint8Array,
        "Int16Array" => WhitelistedCtor::Int16Array,
        "Uint16Array" => WhitelistedCtor::Uint16Array,
        "Int32Array" => WhitelistedCtor::Int32Array,
        "Uint32Array" => WhitelistedCtor::Uint32Array,
        "Float32Array" => WhitelistedCtor::Float32Array,
        "Float64Array" => WhitelistedCtor::Float64Array,
        _ => return None,
    })
}

fn namespace_of(name: &str) -> Option<Namespace> {
    Some(match name {
        "Math" => Namespace::Math,
        "Number" => Namespace::Number,
        "Array" => Namespace::ArrayCtor,
        "Object" => Namespace::ObjectCtor,
        "JSON" => Namespace::Json,
        _ => return None,
    })
}

const MATH_MEMBERS: &[&str] = &[
    "sqrt", "abs", "floor", "ceil", "round", "trunc", "pow", "min", "max", "random", "sign",
    "log", "log2", "log10", "exp", "sin", "cos", "tan", "atan2", "cbrt", "hypot", "PI", "E",
];
const NUMBER_MEMBERS: &[&str] = &[
    "isNaN", "isInteger", "isFinite", "isSafeInteger", "parseFloat", "parseInt",
    "MAX_SAFE_INTEGER", "MIN_SAFE_INTEGER",
];
const ARRAY_CTOR_MEMBERS: &[&str] = &["isArray", "from"];
const OBJECT_CTOR_MEMBERS: &[&str] = &["keys", "values", "entries"];
const JSON_MEMBERS: &[&str] = &["stringify", "parse"];

fn validate_namespace_member(ns: Namespace, member: &str, span: Span) -> Result<String, CompileError> {
    let (list, ns_name) = match ns {
        Namespace::Math => (MATH_MEMBERS, "Math"),
        Namespace::Number => (NUMBER_MEMBERS, "Number"),
        Namespace::ArrayCtor => (ARRAY_CTOR_MEMBERS, "Array"),
        Namespace::ObjectCtor => (OBJECT_CTOR_MEMBERS, "Object"),
        Namespace::Json => (JSON_MEMBERS, "JSON"),
    };
    if list.contains(&member) {
        Ok(member.to_string())
    } else {
        Err(NormalizeError::UnknownNamespaceMember { namespace: ns_name.to_string(), name: member.to_string(), span }.into())
    }
}

/// Binary arithmetic/bitwise constant folding (spec §4.B). Bitwise ops
/// truncate both operands to 32-bit signed integers before operating,
/// mirroring the source language's standard coercion.
fn fold_binary(op: BinOp, left: &ast::Expr, right: &ast::Expr) -> Option<Lit> {
    let (ast::Expr::Literal(Lit::Number(l), _), ast::Expr::Literal(Lit::Number(r), _)) = (left, right) else {
        return None;
    };
    let (l, r) = (*l, *r);
    Some(match op {
        BinOp::Add => Lit::Number(l + r),
        BinOp::Sub => Lit::Number(l - r),
        BinOp::Mul => Lit::Number(l * r),
        BinOp::Div => Lit::Number(l / r),
        BinOp::Mod => Lit::Number(l % r),
        BinOp::Pow => Lit::Number(l.powf(r)),
        BinOp::BitAnd => Lit::Number(((l as i64 as i32) & (r as i64 as i32)) as f64),
        BinOp::BitOr => Lit::Number(((l as i64 as i32) | (r as i64 as i32)) as f64),
        BinOp::BitXor => Lit::Number(((l as i64 as i32) ^ (r as i64 as i32)) as f64),
        BinOp::Shl => Lit::Number(((l as i64 as i32).wrapping_shl((r as i64 as u32) & 31)) as f64),
        BinOp::Shr => Lit::Number(((l as i64 as i32).wrapping_shr((r as i64 as u32) & 31)) as f64),
        BinOp::UShr => Lit::Number(((l as i64 as i32 as u32).wrapping_shr((r as i64 as u32) & 31)) as f64),
        BinOp::Eq => Lit::Bool(l == r),
        BinOp::Ne => Lit::Bool(l != r),
        BinOp::Lt => Lit::Bool(l < r),
        BinOp::Le => Lit::Bool(l <= r),
        BinOp::Gt => Lit::Bool(l > r),
        BinOp::Ge => Lit::Bool(l >= r),
    })
}

/// Identity laws (spec §4.B): `x+0`, `x-0`, `x*1`, `x/1`, and the symmetric
/// forms for literal 0/1 on the left. Only applied once constant folding
/// (both-literal) has already failed to apply.
fn apply_identity_laws(op: BinOp, left: &ast::Expr, right: &ast::Expr, span: Span) -> Option<ast::Expr> {
    let as_num = |e: &ast::Expr| match e {
        ast::Expr::Literal(Lit::Number(n), _) => Some(*n),
        _ => None,
    };
    let rn = as_num(right);
    let ln = as_num(left);
    match (op, ln, rn) {
        (BinOp::Add, _, Some(0.0)) | (BinOp::Sub, _, Some(0.0)) => Some(reclone(left, span)),
        (BinOp::Add, Some(0.0), _) => Some(reclone(right, span)),
        (BinOp::Mul, _, Some(1.0)) | (BinOp::Div, _, Some(1.0)) => Some(reclone(left, span)),
        (BinOp::Mul, Some(1.0), _) => Some(reclone(right, span)),
        _ => None,
    }
}

fn reclone(e: &ast::Expr, span: Span) -> ast::Expr {
    let mut cloned = e.clone();
    set_span(&mut cloned, span);
    cloned
}

fn set_span(e: &mut ast::Expr, span: Span) {
    use ast::Expr::*;
    match e {
        Literal(_, s) | Identifier(_, s) | Array(_, s) | Object(_, s) | Unary { span: s, .. }
        | Binary { span: s, .. } | Logical { span: s, .. } | Nullish { span: s, .. }
        | Assign { span: s, .. } | Conditional { span: s, .. } | Call { span: s, .. }
        | New { span: s, .. } | Member { span: s, .. } | Index { span: s, .. }
        | MethodCall { span: s, .. } | Arrow { span: s, .. } | NamespaceCall { span: s, .. }
        | Sequence(_, s) | Regex { span: s, .. } => *s = span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sexpr::Literal;

    fn num(n: f64) -> SExpr {
        SExpr::Literal(Literal::Number(n), Span::default())
    }

    fn bin(op: &str, l: SExpr, r: SExpr) -> SExpr {
        SExpr::Binary { op: op.to_string(), left: Box::new(l), right: Box::new(r), span: Span::default() }
    }

    fn normalize_expr(e: SExpr) -> ast::Expr {
        let mut n = Normalizer { warnings: Vec::new(), scopes: vec![HashSet::new()] };
        n.expr(e).unwrap()
    }

    #[test]
    fn folds_literal_arithmetic() {
        let e = normalize_expr(bin("+", num(2.0), num(3.0)));
        assert!(matches!(e, ast::Expr::Literal(Lit::Number(n), _) if n == 5.0));
    }

    #[test]
    fn identity_law_removes_plus_zero() {
        let e = normalize_expr(bin("+", SExpr::Identifier("x".into(), Span::default()), num(0.0)));
        assert!(matches!(e, ast::Expr::Identifier(ref n, _) if n == "x"));
    }

    #[test]
    fn bitwise_folding_truncates_to_i32() {
        let e = normalize_expr(bin("|", num(4_294_967_296.0), num(1.0)));
        assert!(matches!(e, ast::Expr::Literal(Lit::Number(n), _) if n == 1.0));
    }

    #[test]
    fn rejects_this() {
        let mut n = Normalizer { warnings: Vec::new(), scopes: vec![HashSet::new()] };
        let err = n.expr(SExpr::ThisRef(Span::default()));
        assert!(err.is_err());
    }

    #[test]
    fn rejects_prohibited_identifier() {
        let mut n = Normalizer { warnings: Vec::new(), scopes: vec![HashSet::new()] };
        let err = n.expr(SExpr::Identifier("eval".into(), Span::default()));
        assert!(err.is_err());
    }

    #[test]
    fn rejects_unknown_constructor() {
        let mut n = Normalizer { warnings: Vec::new(), scopes: vec![HashSet::new()] };
        let err = n.expr(SExpr::New { callee: "Proxy".into(), args: vec![], span: Span::default() });
        assert!(err.is_err());
    }

    #[test]
    fn accepts_whitelisted_constructor() {
        let e = normalize_expr(SExpr::New { callee: "Set".into(), args: vec![], span: Span::default() });
        assert!(matches!(e, ast::Expr::New { ctor: WhitelistedCtor::Set, .. }));
    }

    #[test]
    fn rewrites_postfix_increment() {
        let e = normalize_expr(SExpr::Update {
            op: "++".into(),
            prefix: false,
            target: Box::new(SExpr::Identifier("i".into(), Span::default())),
            span: Span::default(),
        });
        assert!(matches!(e, ast::Expr::Binary { op: BinOp::Sub, .. }));
    }

    #[test]
    fn validates_namespace_member() {
        let e = normalize_expr(SExpr::Call {
            callee: Box::new(SExpr::Member {
                object: Box::new(SExpr::Identifier("Math".into(), Span::default())),
                property: "sqrt".into(),
                optional: false,
                span: Span::default(),
            }),
            args: vec![num(4.0)],
            optional: false,
            span: Span::default(),
        });
        assert!(matches!(e, ast::Expr::NamespaceCall { namespace: Namespace::Math, .. }));
    }

    #[test]
    fn rejects_unknown_namespace_member() {
        let mut n = Normalizer { warnings: Vec::new(), scopes: vec![HashSet::new()] };
        let e = SExpr::Call {
            callee: Box::new(SExpr::Member {
                object: Box::new(SExpr::Identifier("Math".into(), Span::default())),
                property: "doesNotExist".into(),
                optional: false,
                span: Span::default(),
            }),
            args: vec![],
            optional: false,
            span: Span::default(),
        };
        assert!(n.expr(e).is_err());
    }
}

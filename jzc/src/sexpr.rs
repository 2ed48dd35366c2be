/// The shape the external parser collaborator hands jzc (spec §6): an
/// S-expression AST of `[op, ...args]` nodes, where a literal is
/// `[<vacant>, value]` (the op slot intentionally empty) and property
/// access is `['.', object, name]`. jzc never constructs these nodes
/// itself in production — they arrive already-parsed — but the shape is
/// declared here, in the teacher's `Item`/`Expr` enum style, so the
/// normalizer (`src/normalize.rs`) has a concrete type to pattern-match
/// instead of threading raw JSON through the whole pipeline.
use crate::errors::Span;
use serde::Deserialize;

/// A literal value as handed in from the parser collaborator. jzc's
/// source language subset only ever produces these four literal shapes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum Literal {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
}

/// A raw, not-yet-validated expression node.
#[derive(Debug, Clone, Deserialize)]
pub enum SExpr {
    /// `[<vacant>, value]`
    Literal(Literal, Span),
    Identifier(String, Span),
    /// `this` — present in the input grammar but rejected by the
    /// normalizer (spec §4.B prohibit-list).
    ThisRef(Span),
    /// `super` — rejected alongside `this` (spec §4.B).
    SuperRef(Span),
    /// A construct the source grammar can produce that has no place in
    /// jzc's subset at all: `async function`/`await`, `class`, `yield`,
    /// `with`, dynamic `import()`. `label` names which one, for the
    /// diagnostic. Rejected unconditionally by the normalizer.
    Unsupported { label: String, span: Span },
    Array(Vec<SExpr>, Span),
    Object(Vec<(String, SExpr)>, Span),
    Unary { op: String, operand: Box<SExpr>, span: Span },
    Binary { op: String, left: Box<SExpr>, right: Box<SExpr>, span: Span },
    Logical { op: String, left: Box<SExpr>, right: Box<SExpr>, span: Span },
    Assign { op: String, target: Box<SExpr>, value: Box<SExpr>, span: Span },
    /// `i++`, `++i`, `i--`, `--i` (spec §4.B rewrites these away during
    /// normalization).
    Update { op: String, prefix: bool, target: Box<SExpr>, span: Span },
    Conditional { test: Box<SExpr>, consequent: Box<SExpr>, alternate: Box<SExpr>, span: Span },
    Nullish { left: Box<SExpr>, right: Box<SExpr>, span: Span },
    Call { callee: Box<SExpr>, args: Vec<SExpr>, optional: bool, span: Span },
    New { callee: String, args: Vec<SExpr>, span: Span },
    Member { object: Box<SExpr>, property: String, optional: bool, span: Span },
    Index { object: Box<SExpr>, index: Box<SExpr>, optional: bool, span: Span },
    Arrow { params: Vec<Pattern>, body: ArrowBody, span: Span },
    /// `Math.sqrt`, `Number.isNaN`, ... — namespaced member references that
    /// must resolve against a fixed allow-list (spec §4.B).
    Namespaced { namespace: String, member: String, span: Span },
    Sequence(Vec<SExpr>, Span),
    Regex { pattern: String, flags: String, span: Span },
}

#[derive(Debug, Clone, Deserialize)]
pub enum ArrowBody {
    Expr(Box<SExpr>),
    Block(Vec<SStmt>),
}

/// A binding pattern: a plain name or a destructuring shape. Preserved
/// structurally (spec §4.B) so codegen can expand it against the
/// right-hand side rather than the normalizer trying to flatten it early.
#[derive(Debug, Clone, Deserialize)]
pub enum Pattern {
    Name(String),
    Array(Vec<Pattern>),
    Object(Vec<(String, Pattern)>),
}

#[derive(Debug, Clone, Deserialize)]
pub enum DeclKind {
    Let,
    Const,
    Var,
}

#[derive(Debug, Clone, Deserialize)]
pub enum SStmt {
    Expr(SExpr, Span),
    Decl { kind: DeclKind, pattern: Pattern, init: Option<SExpr>, span: Span },
    Block(Vec<SStmt>, Span),
    If { test: SExpr, consequent: Box<SStmt>, alternate: Option<Box<SStmt>>, span: Span },
    While { test: SExpr, body: Box<SStmt>, span: Span },
    For {
        init: Option<Box<SStmt>>,
        test: Option<SExpr>,
        update: Option<SExpr>,
        body: Box<SStmt>,
        span: Span,
    },
    Return(Option<SExpr>, Span),
    Break(Option<String>, Span),
    Continue(Option<String>, Span),
    FunctionDecl { name: String, params: Vec<Pattern>, body: Vec<SStmt>, span: Span },
    /// A labeled statement — present in the input grammar, rejected by the
    /// normalizer's prohibit-list (spec §4.B).
    Labeled { label: String, body: Box<SStmt>, span: Span },
    /// `class`/`with` at statement position (spec §4.B prohibit-list);
    /// `label` names which construct, for the diagnostic.
    Unsupported { label: String, span: Span },
}

/// A complete compilation unit: top-level statements, each optionally
/// `export`ed (spec §6 "Host ABI").
#[derive(Debug, Clone, Deserialize)]
pub struct Program {
    pub items: Vec<(SStmt, bool)>,
}

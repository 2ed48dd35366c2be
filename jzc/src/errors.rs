/// jzc diagnostics — error taxonomy and warning collection.
///
/// Every compile-time failure is a `CompileError`: a `miette::Diagnostic`
/// carrying a stable `JZ-xxxx` code, a one-line summary, the offending
/// `Span`, and an optional `help:`. Compilation aborts at the first
/// `CompileError` (spec §7: "no partial-output mode"). Warnings never
/// abort; they accumulate in a `Vec<Warning>` returned alongside the
/// compiled output.
use miette::Diagnostic;
use thiserror::Error;

/// A byte range into the single source the normalizer was handed, carried
/// through every pipeline stage so the final diagnostic can point at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

// ---------------------------------------------------------------------------
// §7 taxonomy, bucket 1: syntactic rejection (normalizer)
// ---------------------------------------------------------------------------
#[derive(Debug, Error, Diagnostic)]
pub enum NormalizeError {
    #[error("unsupported operator '{op}'")]
    #[diagnostic(code(jz::norm::unsupported_operator))]
    UnsupportedOperator { op: String, span: Span },

    #[error("unsupported literal")]
    #[diagnostic(code(jz::norm::unsupported_literal))]
    UnsupportedLiteral { span: Span },

    #[error("{construct} is not permitted in jzc's language subset")]
    #[diagnostic(code(jz::norm::prohibited), help("{hint}"))]
    Prohibited { construct: String, hint: String, span: Span },

    #[error("'{name}' is not a valid member of namespace '{namespace}'")]
    #[diagnostic(code(jz::norm::unknown_namespace_member))]
    UnknownNamespaceMember { namespace: String, name: String, span: Span },

    #[error("invalid destructuring pattern")]
    #[diagnostic(code(jz::norm::invalid_destructuring))]
    InvalidDestructuring { span: Span },

    #[error("'{name}' is not a whitelisted constructor")]
    #[diagnostic(code(jz::norm::prohibited_constructor), help("only typed arrays, Array, Set, Map, RegExp, String, Number, and Boolean may be used with `new`"))]
    ProhibitedConstructor { name: String, span: Span },
}

// ---------------------------------------------------------------------------
// §7 taxonomy, bucket 2: semantic rejection (scope/type analysis)
// ---------------------------------------------------------------------------
#[derive(Debug, Error, Diagnostic)]
pub enum SemanticError {
    #[error("undefined identifier '{name}'")]
    #[diagnostic(code(jz::sem::unknown_identifier))]
    UnknownIdentifier { name: String, span: Span },

    #[error("cannot mutate captured variable '{name}'")]
    #[diagnostic(code(jz::sem::cannot_mutate_captured_local), help("closures may only read an enclosing local; mutate a module-scope binding instead"))]
    CannotMutateCapturedLocal { name: String, span: Span },

    #[error("schema limit exceeded: more than 65536 distinct object shapes")]
    #[diagnostic(code(jz::sem::schema_limit_exceeded))]
    SchemaLimitExceeded { span: Span },

    #[error("assignment of incompatible type to '{name}'")]
    #[diagnostic(code(jz::sem::incompatible_assignment), help("a local that has taken a reference type cannot be reassigned a numeric type"))]
    IncompatibleAssignment { name: String, span: Span },
}

// ---------------------------------------------------------------------------
// §7 taxonomy, bucket 3: codegen rejection
// ---------------------------------------------------------------------------
#[derive(Debug, Error, Diagnostic)]
pub enum CodegenError {
    #[error("nonsense coercion: {message}")]
    #[diagnostic(code(jz::code::nonsense_coercion))]
    NonsenseCoercion { message: String, span: Span },

    #[error("cannot reassign const binding '{name}'")]
    #[diagnostic(code(jz::code::const_reassignment))]
    ConstReassignment { name: String, span: Span },

    #[error("assignment target must be an identifier, index, or property access")]
    #[diagnostic(code(jz::code::assignment_target_not_identifier))]
    AssignmentTargetNotIdentifier { span: Span },

    #[error("unknown property '{name}' on schema")]
    #[diagnostic(code(jz::code::unknown_property), help("jzc resolves property access at compile time; unknown properties are not a runtime lookup"))]
    UnknownProperty { name: String, span: Span },
}

// ---------------------------------------------------------------------------
// §7 taxonomy, bucket 4: collaborator failures
// ---------------------------------------------------------------------------
#[derive(Debug, Error, Diagnostic)]
pub enum CollaboratorError {
    #[error("assembler rejected the generated module")]
    #[diagnostic(code(jz::asm::assembler_failed))]
    AssemblerFailed { message: String, wat_text: String },

    #[error("invalid regular expression: {message}")]
    #[diagnostic(code(jz::re::invalid_regex))]
    InvalidRegex { message: String, span: Span },
}

/// Top-level wrapper every pipeline stage's error converts into.
#[derive(Debug, Error, Diagnostic)]
pub enum CompileError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Semantic(#[from] SemanticError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Codegen(#[from] CodegenError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Collaborator(#[from] CollaboratorError),
}

pub type CompileResult<T> = Result<T, CompileError>;

// ---------------------------------------------------------------------------
// Warnings — non-fatal, attached to a successful compilation (spec §4.B)
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningKind {
    VarBinding,
    ParseIntNoRadix,
    NanSelfCompare,
    ArrayAliasing { name: String },
    NullishEqEq,
    ImplicitGlobal { name: String },
    Redeclaration { name: String },
    UnsafeIntegerLiteral,
}

#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub span: Span,
}

impl Warning {
    pub fn new(kind: WarningKind, span: Span) -> Self {
        Warning { kind, span }
    }

    pub fn message(&self) -> String {
        match &self.kind {
            WarningKind::VarBinding => "prefer `let`/`const` over `var`".to_string(),
            WarningKind::ParseIntNoRadix => "parseInt called without an explicit radix".to_string(),
            WarningKind::NanSelfCompare => "comparison with NaN is always false (use Number.isNaN)".to_string(),
            WarningKind::ArrayAliasing { name } => format!("'{name}' aliases an existing array; both bindings share one heap block"),
            WarningKind::NullishEqEq => "comparing to null/undefined with `==`; consider `===` or `??`".to_string(),
            WarningKind::ImplicitGlobal { name } => format!("'{name}' is assigned without a declaration and becomes an implicit global"),
            WarningKind::Redeclaration { name } => format!("'{name}' redeclares a binding already in this scope"),
            WarningKind::UnsafeIntegerLiteral => "integer literal exceeds the safe-integer range".to_string(),
        }
    }
}

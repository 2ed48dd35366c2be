/// Scope & Closure Analyzer (spec §4.C). Walks the normalized AST
/// (`src/normalize.rs`'s output) resolving every identifier to a binding,
/// rejecting references to names that resolve nowhere, rejecting
/// assignment to a local captured from an enclosing function, and
/// recording each function/arrow's captured-variable set for
/// `src/closure.rs`.
///
/// Grounded on `axm/src/chk.rs`'s `Scope { symbols, parent }` arena
/// (`scopes: Vec<Scope>` plus a `current_scope: usize` index, rather than
/// `Rc<RefCell<..>>`) and its two-pass `collect_declarations` /
/// `analyze_item` shape — used here to let sibling function declarations
/// in a block forward-reference each other.
use crate::ast::{self, ArrowBody, Expr, FunctionDef, Pattern, Stmt};
use crate::errors::{CompileError, SemanticError, Span};
use std::collections::HashMap;
use std::rc::Rc;

/// Names resolved by the host ABI or the language itself rather than any
/// user declaration (spec §3, §6). `normalize.rs` already routes
/// `Math.*`/`Number.*`/etc. through `NamespaceCall`, so these are the
/// bare identifiers that remain.
const GLOBAL_BUILTINS: &[&str] = &["undefined", "NaN", "Infinity"];

/// Per-function-or-arrow capture info, keyed by the node's span. Consumed
/// by `src/closure.rs` to synthesize environment records.
#[derive(Debug, Clone, Default)]
pub struct ClosureInfo {
    /// Names read or written inside this function that resolve to a local
    /// of an *enclosing* function (module-scope globals are not captures;
    /// spec §3.7 represents those as WebAssembly globals instead).
    pub captured: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScopeAnalysis {
    pub closures: HashMap<Span, ClosureInfo>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

struct Scope {
    symbols: HashMap<String, ()>,
    parent: Option<usize>,
    /// Which function this block belongs to; the module's top-level block
    /// is function 0 and its bindings are globals, never captures.
    function_id: usize,
}

struct Analyzer {
    scopes: Vec<Scope>,
    current: usize,
    next_function_id: usize,
    /// Stack of (function_id, span) for the function/arrow currently being
    /// walked, innermost last; used to attribute a capture to the right
    /// `ClosureInfo` and to tell a same-function reference from a capture.
    function_stack: Vec<(usize, Span)>,
    closures: HashMap<Span, ClosureInfo>,
}

pub fn analyze(program: &ast::Program) -> Result<ScopeAnalysis, CompileError> {
    let mut a = Analyzer {
        scopes: vec![Scope { symbols: HashMap::new(), parent: None, function_id: 0 }],
        current: 0,
        next_function_id: 1,
        function_stack: vec![(0, Span::default())],
        closures: HashMap::new(),
    };
    collect_decls(&mut a, program.items.iter().map(|i| &i.stmt));
    for item in &program.items {
        a.stmt(&item.stmt)?;
    }
    Ok(ScopeAnalysis { closures: a.closures })
}

/// First pass over a block: register every `FunctionDecl` name before any
/// statement is analyzed, so functions declared later in the same block
/// can still be called earlier (mirrors `chk.rs::collect_declarations`).
fn collect_decls<'a>(a: &mut Analyzer, stmts: impl Iterator<Item = &'a Stmt>) {
    for stmt in stmts {
        if let Stmt::FunctionDecl(def) = stmt {
            a.declare(&def.name);
        }
    }
}

impl Analyzer {
    fn push_scope(&mut self, function_id: usize) -> usize {
        self.scopes.push(Scope { symbols: HashMap::new(), parent: Some(self.current), function_id });
        self.current = self.scopes.len() - 1;
        self.current
    }

    fn pop_scope(&mut self, saved: usize) {
        self.current = saved;
    }

    fn declare(&mut self, name: &str) {
        self.scopes[self.current].symbols.insert(name.to_string(), ());
    }

    fn declare_pattern(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::Name(n) => self.declare(n),
            Pattern::Array(items) => {
                for p in items {
                    self.declare_pattern(p);
                }
            }
            Pattern::Object(props) => {
                for (_, p) in props {
                    self.declare_pattern(p);
                }
            }
        }
    }

    /// Finds which scope frame declares `name`, walking the parent chain
    /// from the current scope outward.
    fn find(&self, name: &str) -> Option<usize> {
        let mut idx = Some(self.current);
        while let Some(i) = idx {
            if self.scopes[i].symbols.contains_key(name) {
                return Some(i);
            }
            idx = self.scopes[i].parent;
        }
        None
    }

    fn resolve(&mut self, name: &str, span: Span, access: Access) -> Result<(), CompileError> {
        let Some(owner_scope) = self.find(name) else {
            if GLOBAL_BUILTINS.contains(&name) {
                return Ok(());
            }
            return Err(SemanticError::UnknownIdentifier { name: name.to_string(), span }.into());
        };
        let owner_function = self.scopes[owner_scope].function_id;
        let (current_function, current_span) = *self.function_stack.last().expect("module frame always present");

        if owner_function == current_function || owner_function == 0 {
            // Same function, or a module-scope global (spec §3.7: globals
            // may be freely mutated through closures).
            return Ok(());
        }

        // A local owned by some enclosing function other than the module
        // scope: a capture.
        let entry = self.closures.entry(current_span).or_default();
        if !entry.captured.iter().any(|n| n == name) {
            entry.captured.push(name.to_string());
        }
        if access == Access::Write {
            return Err(SemanticError::CannotMutateCapturedLocal { name: name.to_string(), span }.into());
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Expr(e, _) => self.expr(e)?,
            Stmt::Decl { pattern, init, .. } => {
                self.expr(init)?;
                self.declare_pattern(pattern);
            }
            Stmt::Block(stmts, _) => {
                let saved = self.current;
                self.push_scope(self.scopes[self.current].function_id);
                collect_decls(self, stmts.iter());
                for s in stmts {
                    self.stmt(s)?;
                }
                self.pop_scope(saved);
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
                let saved = self.current;
                self.push_scope(self.scopes[self.current].function_id);
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
                self.pop_scope(saved);
            }
            Stmt::Return(v, _) => {
                if let Some(e) = v {
                    self.expr(e)?;
                }
            }
            Stmt::Break(_, _) | Stmt::Continue(_, _) => {}
            Stmt::FunctionDecl(def) => self.function(def)?,
        }
        Ok(())
    }

    fn function(&mut self, def: &Rc<FunctionDef>) -> Result<(), CompileError> {
        let fid = self.next_function_id;
        self.next_function_id += 1;
        let saved = self.current;
        self.push_scope(fid);
        self.function_stack.push((fid, def.span));
        self.closures.entry(def.span).or_default();
        for (p, default) in def.params.iter().zip(&def.defaults) {
            if let Some(d) = default {
                self.expr(d)?;
            }
            self.declare_pattern(p);
        }
        if let Some(rest) = &def.rest {
            self.declare(rest);
        }
        collect_decls(self, def.body.iter());
        for s in &def.body {
            self.stmt(s)?;
        }
        self.function_stack.pop();
        self.pop_scope(saved);
        Ok(())
    }

    fn expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Literal(_, _) => {}
            Expr::Identifier(name, span) => self.resolve(name, *span, Access::Read)?,
            Expr::Array(items, _) => {
                for e in items {
                    self.expr(e)?;
                }
            }
            Expr::Object(props, _) => {
                for (_, e) in props {
                    self.expr(e)?;
                }
            }
            Expr::Unary { operand, .. } => self.expr(operand)?,
            Expr::Binary { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)?;
            }
            Expr::Logical { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)?;
            }
            Expr::Nullish { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)?;
            }
            Expr::Assign { target, value, span, .. } => {
                self.expr(value)?;
                self.assign_target(target, *span)?;
            }
            Expr::Conditional { test, consequent, alternate, .. } => {
                self.expr(test)?;
                self.expr(consequent)?;
                self.expr(alternate)?;
            }
            Expr::Call { callee, args, .. } => {
                self.expr(callee)?;
                for a in args {
                    self.expr(a)?;
                }
            }
            Expr::New { args, .. } => {
                for a in args {
                    self.expr(a)?;
                }
            }
            Expr::Member { object, .. } => self.expr(object)?,
            Expr::Index { object, index, .. } => {
                self.expr(object)?;
                self.expr(index)?;
            }
            Expr::MethodCall { object, args, .. } => {
                self.expr(object)?;
                for a in args {
                    self.expr(a)?;
                }
            }
            Expr::Arrow { params, defaults, rest, body, span } => {
                let fid = self.next_function_id;
                self.next_function_id += 1;
                let saved = self.current;
                self.push_scope(fid);
                self.function_stack.push((fid, *span));
                self.closures.entry(*span).or_default();
                for (p, default) in params.iter().zip(defaults) {
                    if let Some(d) = default {
                        self.expr(d)?;
                    }
                    self.declare_pattern(p);
                }
                if let Some(r) = rest {
                    self.declare(r);
                }
                match body {
                    ArrowBody::Expr(e) => self.expr(e)?,
                    ArrowBody::Block(stmts) => {
                        collect_decls(self, stmts.iter());
                        for s in stmts {
                            self.stmt(s)?;
                        }
                    }
                }
                self.function_stack.pop();
                self.pop_scope(saved);
            }
            Expr::NamespaceCall { args, .. } => {
                for a in args {
                    self.expr(a)?;
                }
            }
            Expr::Sequence(exprs, _) => {
                for e in exprs {
                    self.expr(e)?;
                }
            }
            Expr::Regex { .. } => {}
        }
        Ok(())
    }

    /// Assignment targets are identifiers, index expressions, or property
    /// access. Only a bare identifier can trigger the captured-local
    /// mutation check; `arr[i] = x`/`obj.p = x` mutate through a reference
    /// that was itself only *read*, which closures may do freely.
    fn assign_target(&mut self, target: &Expr, span: Span) -> Result<(), CompileError> {
        match target {
            Expr::Identifier(name, ispan) => self.resolve(name, *ispan, Access::Write)?,
            Expr::Index { object, index, .. } => {
                self.expr(object)?;
                self.expr(index)?;
            }
            Expr::Member { object, .. } => self.expr(object)?,
            _ => return Err(crate::errors::CodegenError::AssignmentTargetNotIdentifier { span }.into()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DeclMode, Lit};

    fn span() -> Span {
        Span::default()
    }

    fn program_of(items: Vec<Stmt>) -> ast::Program {
        ast::Program { items: items.into_iter().map(|stmt| ast::Item { stmt, exported: false }).collect() }
    }

    #[test]
    fn plain_local_reference_resolves() {
        let prog = program_of(vec![
            Stmt::Decl { mode: DeclMode::Let, pattern: Pattern::Name("x".into()), init: Expr::Literal(Lit::Number(1.0), span()), span: span() },
            Stmt::Expr(Expr::Identifier("x".into(), span()), span()),
        ]);
        assert!(analyze(&prog).is_ok());
    }

    #[test]
    fn undeclared_identifier_is_rejected() {
        let prog = program_of(vec![Stmt::Expr(Expr::Identifier("ghost".into(), span()), span())]);
        assert!(analyze(&prog).is_err());
    }

    #[test]
    fn module_global_mutation_through_closure_is_allowed() {
        let counter_decl = Stmt::Decl {
            mode: DeclMode::Let,
            pattern: Pattern::Name("counter".into()),
            init: Expr::Literal(Lit::Number(0.0), span()),
            span: span(),
        };
        let make_incrementer = Stmt::FunctionDecl(Rc::new(FunctionDef {
            name: "tick".into(),
            params: vec![],
            defaults: vec![],
            rest: None,
            body: vec![Stmt::Expr(
                Expr::Assign {
                    op: ast::AssignOp::Add,
                    target: Box::new(Expr::Identifier("counter".into(), span())),
                    value: Box::new(Expr::Literal(Lit::Number(1.0), span())),
                    span: span(),
                },
                span(),
            )],
            span: span(),
        }));
        let prog = program_of(vec![counter_decl, make_incrementer]);
        assert!(analyze(&prog).is_ok());
    }

    #[test]
    fn mutating_captured_local_is_rejected() {
        // outer() { let x = 0; function inner() { x = 1; } }
        let inner = Stmt::FunctionDecl(Rc::new(FunctionDef {
            name: "inner".into(),
            params: vec![],
            defaults: vec![],
            rest: None,
            body: vec![Stmt::Expr(
                Expr::Assign {
                    op: ast::AssignOp::Assign,
                    target: Box::new(Expr::Identifier("x".into(), span())),
                    value: Box::new(Expr::Literal(Lit::Number(1.0), span())),
                    span: span(),
                },
                span(),
            )],
            span: Span::new(10, 20),
        }));
        let outer = Stmt::FunctionDecl(Rc::new(FunctionDef {
            name: "outer".into(),
            params: vec![],
            defaults: vec![],
            rest: None,
            body: vec![
                Stmt::Decl { mode: DeclMode::Let, pattern: Pattern::Name("x".into()), init: Expr::Literal(Lit::Number(0.0), span()), span: span() },
                inner,
            ],
            span: span(),
        }));
        let prog = program_of(vec![outer]);
        assert!(analyze(&prog).is_err());
    }

    #[test]
    fn reading_captured_local_records_capture() {
        let inner = Stmt::FunctionDecl(Rc::new(FunctionDef {
            name: "inner".into(),
            params: vec![],
            defaults: vec![],
            rest: None,
            body: vec![Stmt::Return(Some(Expr::Identifier("x".into(), span())), span())],
            span: Span::new(10, 20),
        }));
        let outer = Stmt::FunctionDecl(Rc::new(FunctionDef {
            name: "outer".into(),
            params: vec![],
            defaults: vec![],
            rest: None,
            body: vec![
                Stmt::Decl { mode: DeclMode::Let, pattern: Pattern::Name("x".into()), init: Expr::Literal(Lit::Number(0.0), span()), span: span() },
                inner,
            ],
            span: span(),
        }));
        let prog = program_of(vec![outer]);
        let analysis = analyze(&prog).unwrap();
        let info = analysis.closures.get(&Span::new(10, 20)).unwrap();
        assert_eq!(info.captured, vec!["x".to_string()]);
    }
}

/// The single `Context` a compilation invocation owns (spec §5): the
/// schema table, the interned-string table, the label/local counters, and
/// the set of emitted import/export declarations. One `Context` is built
/// per `compile()` call and dropped at the end; nothing here outlives a
/// single compilation and nothing is shared across compilations (spec §5,
/// §3.9). Grounded on `axiom/src/compiler.rs`'s `GlobalTable`.
use crate::heap::SchemaTable;
use crate::value::StringInterner;
use std::cell::Cell;
use std::collections::HashMap;

pub struct Context {
    pub schemas: SchemaTable,
    pub strings: StringInterner,
    pub max_schemas: usize,

    next_label: Cell<u32>,
    next_fn_index: Cell<u32>,

    /// Module-scope (top-level) bindings, represented as WebAssembly
    /// globals (spec §3.7 "Globally-scoped... bindings may be mutated
    /// through closures because they are represented as WebAssembly
    /// globals").
    pub globals: HashMap<String, u32>,
    next_global: Cell<u32>,

    /// Regex literals compiled once per module and shared across callers
    /// (spec §4.I).
    pub regex_literals: Vec<String>,
    regex_index: HashMap<String, u32>,
}

impl Context {
    pub fn new(max_schemas: usize) -> Self {
        Context {
            schemas: SchemaTable::new(),
            strings: StringInterner::new(),
            max_schemas,
            next_label: Cell::new(0),
            next_fn_index: Cell::new(0),
            globals: HashMap::new(),
            next_global: Cell::new(0),
            regex_literals: Vec::new(),
            regex_index: HashMap::new(),
        }
    }

    pub fn fresh_label(&self, prefix: &str) -> String {
        let n = self.next_label.get();
        self.next_label.set(n + 1);
        format!("${prefix}{n}")
    }

    pub fn fresh_fn_index(&self) -> u32 {
        let n = self.next_fn_index.get();
        self.next_fn_index.set(n + 1);
        n
    }

    pub fn declare_global(&mut self, name: &str) -> u32 {
        if let Some(&idx) = self.globals.get(name) {
            return idx;
        }
        let idx = self.next_global.get();
        self.next_global.set(idx + 1);
        self.globals.insert(name.to_string(), idx);
        idx
    }

    /// Shares one compiled matcher function across identical pattern+flags
    /// occurrences within the same module (spec §4.I "shared across
    /// callers").
    pub fn intern_regex(&mut self, pattern: &str, flags: &str) -> u32 {
        let key = format!("{pattern}\u{0}{flags}");
        if let Some(&idx) = self.regex_index.get(&key) {
            return idx;
        }
        let idx = self.regex_literals.len() as u32;
        self.regex_literals.push(key.clone());
        self.regex_index.insert(key, idx);
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_unique_and_readable() {
        let ctx = Context::new(crate::heap::MAX_SCHEMAS);
        assert_eq!(ctx.fresh_label("loop"), "$loop0");
        assert_eq!(ctx.fresh_label("loop"), "$loop1");
    }

    #[test]
    fn global_declarations_are_idempotent() {
        let mut ctx = Context::new(crate::heap::MAX_SCHEMAS);
        let a = ctx.declare_global("counter");
        let b = ctx.declare_global("counter");
        let c = ctx.declare_global("other");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn identical_regex_literals_share_one_matcher() {
        let mut ctx = Context::new(crate::heap::MAX_SCHEMAS);
        let a = ctx.intern_regex("\\d+", "");
        let b = ctx.intern_regex("\\d+", "");
        let c = ctx.intern_regex("\\d+", "g");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}

/// `CompileReport` — structural metadata returned alongside a successful
/// compilation's bytes (SPEC_FULL.md §3). Exists so host tooling (the
/// out-of-core CLI, the out-of-core benchmark harness) can observe what
/// the compiler actually did without the library itself printing
/// anything — mirrors the separation `axm/src/chk.rs::SemanticAnalyzer`
/// draws between computing diagnostics and `main.rs` printing them.
use crate::errors::Warning;

#[derive(Debug, Clone, Default)]
pub struct CompileReport {
    pub schema_count: usize,
    pub interned_string_count: usize,
    pub regex_literal_count: usize,
    pub export_count: usize,
    pub warnings: Vec<Warning>,
}

impl CompileReport {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// The library's top-level output: either bytes (binary) or text (wat),
/// plus the report. `src/bin/jzc.rs` is the only place that inspects the
/// `OutputFormat`-dependent shape directly.
#[derive(Debug, Clone)]
pub enum CompiledModule {
    Binary(Vec<u8>),
    Wat(String),
}

impl CompiledModule {
    pub fn as_wat(&self) -> Option<&str> {
        match self {
            CompiledModule::Wat(text) => Some(text),
            CompiledModule::Binary(_) => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            CompiledModule::Binary(bytes) => Some(bytes),
            CompiledModule::Wat(_) => None,
        }
    }
}

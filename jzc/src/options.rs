/// Compilation options (spec §6) plus the documented property table they're
/// drawn from, in the style of `axm/src/conf.rs`'s `PropDef`/`ALL_PROPS`:
/// every tunable is declared once, with a name, default, and description,
/// rather than scattered across the crate as bare `bool`/`usize` fields.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Binary,
    Wat,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Binary
    }
}

/// The two recognized options of spec §6, plus compiler-internal tuning
/// that has no externally visible behavior change but is still worth
/// naming rather than burying as a magic number in `heap.rs`/`prelude.rs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// `format`: emit assembled bytes (`Binary`, the default) or textual
    /// WebAssembly (`Wat`).
    pub format: OutputFormat,
    /// `gc`: when true, arrays/strings are represented as host-managed
    /// `externref`s instead of jzc's own in-module heap; see spec §9.
    pub gc: bool,
    /// Bytes reserved for the interned-string and schema tables before the
    /// bump allocator's first allocation (spec §3.2).
    pub reserved_prelude_bytes: u32,
    /// Override for `heap::MAX_SCHEMAS`; exists for tests that want to
    /// exercise `SchemaLimitExceeded` without declaring 65536 objects.
    pub max_schemas_override: Option<usize>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            format: OutputFormat::default(),
            gc: false,
            reserved_prelude_bytes: 4096,
            max_schemas_override: None,
        }
    }
}

impl CompileOptions {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn max_schemas(&self) -> usize {
        self.max_schemas_override.unwrap_or(crate::heap::MAX_SCHEMAS)
    }
}

/// A documented property, mirroring `axm/src/conf.rs::PropDef`. Used by
/// the CLI's `jzc options` listing (`src/bin/jzc.rs`) and by doc-tests that
/// check the table stays in sync with `CompileOptions`'s fields.
#[derive(Debug, Clone, Copy)]
pub struct OptionDef {
    pub name: &'static str,
    pub default: &'static str,
    pub description: &'static str,
}

pub static ALL_OPTIONS: &[OptionDef] = &[
    OptionDef {
        name: "format",
        default: "binary",
        description: "Emit assembled WebAssembly bytes (`binary`) or textual WAT (`wat`).",
    },
    OptionDef {
        name: "gc",
        default: "false",
        description: "Use host-managed externref arrays/strings instead of jzc's in-module heap and allocator.",
    },
    OptionDef {
        name: "reserved_prelude_bytes",
        default: "4096",
        description: "Linear-memory bytes reserved for interned strings and the schema table before the bump allocator starts.",
    },
    OptionDef {
        name: "max_schemas_override",
        default: "unset (65536)",
        description: "Lowers the object-schema limit; intended for tests exercising SchemaLimitExceeded.",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_option_table() {
        let opts = CompileOptions::default();
        assert_eq!(opts.format, OutputFormat::Binary);
        assert!(!opts.gc);
        assert_eq!(ALL_OPTIONS.len(), 4);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let opts = CompileOptions::from_toml("gc = true\n").unwrap();
        assert!(opts.gc);
        assert_eq!(opts.format, OutputFormat::Binary);
    }
}

//! Regex literal compiler (spec §4.I): parses a JS-flavored pattern into an
//! AST (`parse`), lowers it to backtracking-VM bytecode (`compile`), and
//! hands callers a `CompiledPattern` ready for `module.rs` to lay into
//! linear memory alongside a thin per-literal dispatch function.

mod compile;
mod parse;

pub use compile::{emit_literal_function, emit_runtime, CompiledPattern};
pub use parse::Node;

use crate::errors::{CollaboratorError, CompileError, Span};

/// Flags jzc actually interprets; anything else is a silent no-op rather
/// than a hard error, matching the non-fatal spirit of spec §4.I's flag
/// handling (unsupported flags like `u`/`s`/`m` don't change matching here
/// since jzc's subset doesn't model multiline input specially).
pub fn compile_pattern(pattern: &str, flags: &str, span: Span) -> Result<CompiledPattern, CompileError> {
    let node = parse::parse(pattern).map_err(|message| CollaboratorError::InvalidRegex { message, span })?;
    let case_insensitive = flags.contains('i');
    compile::compile(&node, case_insensitive).map_err(|message| CollaboratorError::InvalidRegex { message, span }.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_pattern_compiles() {
        let result = compile_pattern("a[bc]+", "", Span::new(0, 0));
        assert!(result.is_ok());
    }

    #[test]
    fn case_insensitive_flag_is_threaded_through() {
        let compiled = compile_pattern("abc", "i", Span::new(0, 0)).unwrap();
        assert!(compiled.case_insensitive);
    }

    #[test]
    fn unbalanced_group_is_a_collaborator_error() {
        let err = compile_pattern("(abc", "", Span::new(1, 4)).unwrap_err();
        match err {
            CompileError::Collaborator(CollaboratorError::InvalidRegex { span, .. }) => {
                assert_eq!(span, Span::new(1, 4));
            }
            other => panic!("expected InvalidRegex, got {other:?}"),
        }
    }

    #[test]
    fn variable_width_lookbehind_is_a_collaborator_error() {
        let err = compile_pattern("(?<=a*)b", "", Span::new(0, 8)).unwrap_err();
        assert!(matches!(err, CompileError::Collaborator(CollaboratorError::InvalidRegex { .. })));
    }
}

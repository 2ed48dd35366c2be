/// The Assembler collaborator (spec §6): turns finished WAT text into a
/// WebAssembly binary. Kept as its own thin module so the library's output
/// format (`CompileOptions::format`) can skip this step entirely and hand
/// back the WAT text untouched.
use crate::errors::{CollaboratorError, CompileError};

pub fn assemble(wat_text: &str) -> Result<Vec<u8>, CompileError> {
    wat::parse_str(wat_text).map_err(|err| {
        CollaboratorError::AssemblerFailed { message: err.to_string(), wat_text: wat_text.to_string() }.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_module_assembles() {
        let bytes = assemble("(module)").unwrap();
        assert_eq!(&bytes[0..4], b"\0asm");
    }

    #[test]
    fn malformed_text_reports_the_offending_wat() {
        let err = assemble("(module (func $f (unreachable").unwrap_err();
        match err {
            CompileError::Collaborator(CollaboratorError::AssemblerFailed { wat_text, .. }) => {
                assert!(wat_text.contains("unreachable"));
            }
            other => panic!("expected AssemblerFailed, got {other:?}"),
        }
    }
}

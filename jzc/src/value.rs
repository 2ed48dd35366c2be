/// NaN-Boxing — the runtime value representation emitted modules use.
///
/// DESIGN: every jzc runtime value is one IEEE-754 f64. Ordinary numbers are
/// themselves. A tagged pointer is encoded by setting the quiet-NaN bit
/// pattern and packing the remaining 51 bits as `(type:3 | id:16 | offset:32)`
/// (spec §3.1). This module is the single source of truth for that bit
/// layout: both the codegen (`src/codegen`) and the prelude emitter
/// (`src/prelude.rs`) embed these exact constants into the WAT they emit, so
/// a host decoding an export (spec §6 "Pointer ABI") and jzc's own generated
/// code agree on the encoding without either side running the other's code.
///
/// `NanVal` itself is a *host-side* (Rust) mirror of that encoding, used by
/// the normalizer's constant folder (§4.B) to fold literal arithmetic without
/// emitting any WebAssembly, and by tests asserting the layout is self
/// consistent. It is never executed as part of a compiled program — the
/// compiled program's own arithmetic on these bits is emitted WAT, not Rust.
use std::fmt;

// ---------------------------------------------------------------------------
// Bit layout (spec §3.1)
// ---------------------------------------------------------------------------

/// Bit 63=0, exponent=0x7FF, bit 51=1 — the quiet-NaN prefix every tagged
/// pointer shares. A bit pattern with this prefix that isn't exactly
/// `QNAN_PREFIX` itself is a pointer; `QNAN_PREFIX` itself is canonical NaN.
pub const QNAN_PREFIX: u64 = 0x7FFC_0000_0000_0000;

/// Mask isolating the 3-bit type tag (bits [50:48]).
pub const TAG_MASK: u64 = 0x0007_0000_0000_0000;
pub const TAG_SHIFT: u32 = 48;

/// Mask isolating the 16-bit id field (bits [47:32]).
pub const ID_MASK: u64 = 0x0000_FFFF_0000_0000;
pub const ID_SHIFT: u32 = 32;

/// Mask isolating the 32-bit offset field (bits [31:0]).
pub const OFFSET_MASK: u64 = 0x0000_0000_FFFF_FFFF;

/// Bit within the id field distinguishing a short (in-payload) string from
/// a heap string sharing tag `STRING`.
pub const SHORT_STRING_BIT: u64 = 0x0000_8000_0000_0000;

/// Type tags (spec §3.1). Tag 0 is reserved for actual NaN and is never
/// assigned to a heap kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TypeTag {
    Array = 1,
    String = 2,
    Object = 3,
    Ring = 4,
    Map = 5,
    Set = 6,
    Typed = 7,
}

impl TypeTag {
    pub const fn bits(self) -> u64 {
        (self as u64) << TAG_SHIFT
    }

    pub fn from_bits(tag: u64) -> Option<TypeTag> {
        match tag {
            1 => Some(TypeTag::Array),
            2 => Some(TypeTag::String),
            3 => Some(TypeTag::Object),
            4 => Some(TypeTag::Ring),
            5 => Some(TypeTag::Map),
            6 => Some(TypeTag::Set),
            7 => Some(TypeTag::Typed),
            _ => None,
        }
    }
}

/// Reserved NaN-boxed bit patterns for `null`/`undefined` (spec §3.1):
/// object-tagged pointers carrying sentinel `id` values that never resolve
/// to a real heap block, since `SchemaTable` never interns that many
/// schemas. Shared by the codegen (`src/codegen/expr.rs`) and the prelude
/// emitter (`src/prelude.rs`) so both embed the identical constant.
pub const NULL_BITS: u64 = QNAN_PREFIX | TypeTag::Object.bits() | 0xFFFF_0000_0000;
pub const UNDEFINED_BITS: u64 = QNAN_PREFIX | TypeTag::Object.bits() | 0xFFFE_0000_0000;

/// A NaN-boxed value, mirrored host-side. 8 bytes, no indirection for a
/// plain number.
#[derive(Clone, Copy, PartialEq)]
#[repr(transparent)]
pub struct NanVal(u64);

impl NanVal {
    #[inline(always)]
    pub fn from_f64(n: f64) -> Self {
        let bits = n.to_bits();
        debug_assert!(
            bits & QNAN_PREFIX != QNAN_PREFIX || bits == QNAN_PREFIX,
            "a user double must never collide with jzc's own tagged-pointer space"
        );
        NanVal(bits)
    }

    #[inline(always)]
    pub fn canonical_nan() -> Self {
        NanVal(QNAN_PREFIX)
    }

    /// A tagged pointer: `type`, a small `id` (array generation / schema id
    /// / regex literal index depending on `tag`), and a 32-bit payload
    /// offset into linear memory.
    #[inline(always)]
    pub fn from_ptr(tag: TypeTag, id: u16, offset: u32) -> Self {
        NanVal(QNAN_PREFIX | tag.bits() | ((id as u64) << ID_SHIFT) | offset as u64)
    }

    /// A short string: up to 6 ASCII (7-bit) code units packed directly
    /// into the id/offset fields. Never touches the heap (spec §3.4).
    #[inline(always)]
    pub fn from_short_string(units: &[u8]) -> Self {
        debug_assert!(units.len() <= 6 && units.iter().all(|&b| b < 0x80));
        let mut payload: u64 = (units.len() as u64) << 42;
        for (i, &u) in units.iter().enumerate() {
            payload |= (u as u64) << (7 * i);
        }
        NanVal(QNAN_PREFIX | TypeTag::String.bits() | SHORT_STRING_BIT | payload)
    }

    #[inline(always)]
    pub fn raw(self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub fn from_raw(bits: u64) -> Self {
        NanVal(bits)
    }

    /// True iff this is a tagged pointer rather than a plain double
    /// (spec §3.1 `isPtr`).
    #[inline(always)]
    pub fn is_ptr(self) -> bool {
        (self.0 & QNAN_PREFIX) == QNAN_PREFIX && self.0 != QNAN_PREFIX
    }

    #[inline(always)]
    pub fn is_nan(self) -> bool {
        self.0 == QNAN_PREFIX || (!self.is_ptr() && f64::from_bits(self.0).is_nan())
    }

    #[inline(always)]
    pub fn tag(self) -> Option<TypeTag> {
        if !self.is_ptr() {
            return None;
        }
        TypeTag::from_bits((self.0 & TAG_MASK) >> TAG_SHIFT)
    }

    #[inline(always)]
    pub fn is_short_string(self) -> bool {
        self.tag() == Some(TypeTag::String) && (self.0 & SHORT_STRING_BIT) != 0
    }

    #[inline(always)]
    pub fn id(self) -> u16 {
        ((self.0 & ID_MASK) >> ID_SHIFT) as u16
    }

    #[inline(always)]
    pub fn offset(self) -> u32 {
        (self.0 & OFFSET_MASK) as u32
    }

    #[inline(always)]
    pub fn as_f64(self) -> f64 {
        f64::from_bits(self.0)
    }

    /// Reference equality: bitwise equality of the encoding (spec §3.1).
    #[inline(always)]
    pub fn ref_eq(self, other: NanVal) -> bool {
        self.0 == other.0
    }
}

impl fmt::Debug for NanVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ptr() {
            write!(f, "<{:?}#{} @{:#x}>", self.tag(), self.id(), self.offset())
        } else if self.is_nan() {
            write!(f, "NaN")
        } else {
            write!(f, "{}", self.as_f64())
        }
    }
}

// ---------------------------------------------------------------------------
// Compile-time element type for constant folding / type inference
// (spec §4.D uses this alongside `crate::types::ElemType`; this is the
// purely-numeric subset the folder needs before a full type pass exists).
// ---------------------------------------------------------------------------

/// A folded compile-time numeric constant (spec §4.B "Constant folding").
/// `Int` stays distinct from `Float` so the type inferencer (§4.D) can
/// assign `i32` to literals in safe-integer range without re-deriving it
/// from an `f64`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstNum {
    Int(i32),
    Float(f64),
}

impl ConstNum {
    pub fn as_f64(self) -> f64 {
        match self {
            ConstNum::Int(i) => i as f64,
            ConstNum::Float(f) => f,
        }
    }

    /// The language's bitwise truncation rule: operands are coerced to
    /// 32-bit signed integers before a bitwise op (spec §4.B).
    pub fn to_i32_truncated(self) -> i32 {
        match self {
            ConstNum::Int(i) => i,
            ConstNum::Float(f) => {
                if f.is_nan() || f.is_infinite() {
                    0
                } else {
                    f as i64 as i32
                }
            }
        }
    }

    pub fn is_int(self) -> bool {
        matches!(self, ConstNum::Int(_))
    }
}

// ---------------------------------------------------------------------------
// String interner (spec §3.4 "interned once per module into the prelude")
// ---------------------------------------------------------------------------
use parking_lot::RwLock;
use std::collections::HashMap;

pub struct StringInterner {
    table: RwLock<HashMap<String, u32>>,
    strings: RwLock<Vec<String>>,
}

impl StringInterner {
    pub fn new() -> Self {
        StringInterner {
            table: RwLock::new(HashMap::new()),
            strings: RwLock::new(Vec::new()),
        }
    }

    /// Interns `s`, returning a stable index reused for every later
    /// occurrence of the same literal text (spec §3.4, §3.9).
    pub fn intern(&self, s: &str) -> u32 {
        if let Some(&idx) = self.table.read().get(s) {
            return idx;
        }
        let mut table = self.table.write();
        if let Some(&idx) = table.get(s) {
            return idx;
        }
        let mut strings = self.strings.write();
        let idx = strings.len() as u32;
        strings.push(s.to_string());
        table.insert(s.to_string(), idx);
        idx
    }

    pub fn get(&self, idx: u32) -> Option<String> {
        self.strings.read().get(idx as usize).cloned()
    }

    pub fn iter_in_order(&self) -> Vec<String> {
        self.strings.read().clone()
    }

    pub fn len(&self) -> usize {
        self.strings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_double_is_not_a_pointer() {
        let v = NanVal::from_f64(3.5);
        assert!(!v.is_ptr());
        assert_eq!(v.as_f64(), 3.5);
    }

    #[test]
    fn array_pointer_roundtrips_tag_id_offset() {
        let v = NanVal::from_ptr(TypeTag::Array, 7, 4096);
        assert!(v.is_ptr());
        assert_eq!(v.tag(), Some(TypeTag::Array));
        assert_eq!(v.id(), 7);
        assert_eq!(v.offset(), 4096);
    }

    #[test]
    fn distinct_tags_are_distinguishable() {
        let a = NanVal::from_ptr(TypeTag::Set, 0, 0);
        let b = NanVal::from_ptr(TypeTag::Map, 0, 0);
        assert_ne!(a.tag(), b.tag());
        assert!(!a.ref_eq(b));
    }

    #[test]
    fn short_string_never_touches_offset_space_a_heap_string_would() {
        let v = NanVal::from_short_string(b"hi");
        assert!(v.is_short_string());
        assert_eq!(v.tag(), Some(TypeTag::String));
    }

    #[test]
    fn canonical_nan_is_not_a_pointer() {
        let n = NanVal::canonical_nan();
        assert!(!n.is_ptr());
        assert!(n.is_nan());
    }

    #[test]
    fn reference_equality_is_bitwise() {
        let a = NanVal::from_ptr(TypeTag::Object, 3, 128);
        let b = NanVal::from_ptr(TypeTag::Object, 3, 128);
        let c = NanVal::from_ptr(TypeTag::Object, 3, 256);
        assert!(a.ref_eq(b));
        assert!(!a.ref_eq(c));
    }

    #[test]
    fn interner_dedupes_identical_literals() {
        let s = StringInterner::new();
        let a = s.intern("hello");
        let b = s.intern("world");
        let c = s.intern("hello");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(s.get(a).unwrap(), "hello");
    }

    #[test]
    fn truncation_matches_bitwise_semantics() {
        assert_eq!(ConstNum::Float(f64::NAN).to_i32_truncated(), 0);
        assert_eq!(ConstNum::Float(3.9).to_i32_truncated(), 3);
        assert_eq!(ConstNum::Int(-1).to_i32_truncated(), -1);
    }
}

/// Heap layout constants (spec §3.2-§3.8) and the compile-time tables the
/// codegen consults to turn a heap-typed access into a fixed offset.
///
/// jzc's emitted module has exactly one growable linear memory. A bump
/// pointer (emitted by `src/prelude.rs`) starts after a small reserved
/// prelude region holding the interned-string table and the schema table.
/// Every heap block is 8-byte-header-prefixed; the tagged pointer's offset
/// field always points at the payload, never the header (spec §3.2).
use std::collections::HashMap;

/// Every heap block's header is 8 bytes, immediately preceding the payload.
pub const HEADER_SIZE: u32 = 8;

/// Array/string/ring header: `capacity:i32, length:i32` (rings reuse the
/// same 8 bytes plus one extra `head:i32` word stored as the first payload
/// slot's shadow — see `RING_HEAD_OFFSET`).
pub const ARRAY_HEADER_LENGTH_OFFSET: i32 = -4;
pub const ARRAY_HEADER_CAPACITY_OFFSET: i32 = -8;

/// A ring reuses the array block but additionally carries `head:i32`
/// immediately before the array header (so `payload - 12` is `head`,
/// `payload - 8` is `capacity`, `payload - 4` is `length`). This keeps a
/// flat array's layout a strict prefix of a ring's, so `unshift` can
/// promote in place (spec §3.3) without moving the payload.
pub const RING_HEADER_SIZE: u32 = 12;
pub const RING_HEAD_OFFSET: i32 = -12;

/// Object header: `length:i32` (slot count, informational), `schema_id:i16`,
/// `flags:i16` (spec §3.2). Slot values follow immediately.
pub const OBJECT_HEADER_SCHEMA_OFFSET: i32 = -4;
pub const OBJECT_HEADER_FLAGS_OFFSET: i32 = -2;

/// Typed-buffer header: `element_kind:i32` then `length:i32` then a 4-byte
/// `byte_offset` word reusing the same header budget (spec §3.8).
pub const TYPED_HEADER_KIND_OFFSET: i32 = -8;
pub const TYPED_HEADER_LENGTH_OFFSET: i32 = -4;

/// Size in bytes of one f64 slot — the uniform element width for arrays,
/// object slots, and hash-table entries' key/value halves.
pub const SLOT_SIZE: u32 = 8;

/// Array/ring capacity tiers (spec §3.3): the smallest power-of-two-ish
/// tier `>= length`. jzc uses exact powers of two throughout (rings require
/// it for modular head arithmetic; flat arrays are kept on the same ladder
/// so promotion to a ring never needs a capacity change, only a header-flag
/// flip).
pub const CAPACITY_TIERS: &[u32] = &[4, 8, 16, 32, 64, 128, 256, 512, 1024, 2048, 4096, 8192, 16384, 32768, 65536];

/// Smallest tier holding at least `len` elements. Falls back to the next
/// power of two above the largest named tier for pathologically large
/// arrays rather than failing compilation.
pub fn capacity_for_len(len: u32) -> u32 {
    for &tier in CAPACITY_TIERS {
        if tier >= len {
            return tier;
        }
    }
    len.next_power_of_two().max(1)
}

/// Hash tables (sets/maps, spec §3.6) double when load factor reaches this
/// threshold.
pub const HASH_LOAD_FACTOR: f64 = 0.75;

/// Hash-table slot states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotState {
    Empty = 0,
    Used = 1,
    Tombstone = 2,
}

/// Maximum number of distinct schemas a single module may declare
/// (spec §3.5). Exceeding this is `SchemaLimitExceeded`.
pub const MAX_SCHEMAS: usize = 65_536;

/// The compile-time type of one object slot, used both to compute the
/// slot's byte width when it is a reference (always one f64 slot — jzc
/// does not unbox struct-shaped fields) and to drive the type inferencer's
/// property-access result type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaProp {
    pub name: String,
}

/// A monotonically-assigned object shape: an ordered property list (spec
/// §3.5). Schemas form a DAG — later assignments only ever *extend* a
/// schema (flow typing), never revise an earlier slot, so two schemas
/// either share a property prefix or are unrelated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Schema {
    pub id: u16,
    pub props: Vec<SchemaProp>,
}

impl Schema {
    pub fn slot_of(&self, name: &str) -> Option<u32> {
        self.props.iter().position(|p| p.name == name).map(|i| i as u32)
    }

    pub fn byte_size(&self) -> u32 {
        self.props.len() as u32 * SLOT_SIZE
    }
}

/// Schemas are assigned monotonically per-compile-unit, keyed by the
/// property list so that two object literals with the same ordered
/// property set share one schema (spec §3.5: "assigned once per
/// compile-unit per ordered property set").
pub struct SchemaTable {
    by_props: HashMap<Vec<String>, u16>,
    schemas: Vec<Schema>,
}

impl SchemaTable {
    pub fn new() -> Self {
        SchemaTable { by_props: HashMap::new(), schemas: Vec::new() }
    }

    /// Returns the schema for exactly this ordered property list, creating
    /// one if this is the first time it's been seen. `extend` is used when
    /// flow typing widens an existing object's schema (same key, longer
    /// prop list) rather than allocating a fresh unrelated schema.
    pub fn intern(&mut self, props: Vec<String>) -> Result<u16, ()> {
        if let Some(&id) = self.by_props.get(&props) {
            return Ok(id);
        }
        if self.schemas.len() >= MAX_SCHEMAS {
            return Err(());
        }
        let id = self.schemas.len() as u16;
        self.schemas.push(Schema {
            id,
            props: props.iter().map(|n| SchemaProp { name: n.clone() }).collect(),
        });
        self.by_props.insert(props, id);
        Ok(id)
    }

    pub fn get(&self, id: u16) -> &Schema {
        &self.schemas[id as usize]
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Schema> {
        self.schemas.iter()
    }
}

impl Default for SchemaTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_tier_is_smallest_power_of_two_at_least_len() {
        assert_eq!(capacity_for_len(0), 4);
        assert_eq!(capacity_for_len(4), 4);
        assert_eq!(capacity_for_len(5), 8);
        assert_eq!(capacity_for_len(256), 256);
        assert_eq!(capacity_for_len(257), 512);
    }

    #[test]
    fn identical_property_sets_share_one_schema() {
        let mut table = SchemaTable::new();
        let a = table.intern(vec!["x".into(), "y".into()]).unwrap();
        let b = table.intern(vec!["x".into(), "y".into()]).unwrap();
        let c = table.intern(vec!["y".into(), "x".into()]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c, "property order is part of a schema's identity");
    }

    #[test]
    fn schema_resolves_property_to_fixed_slot() {
        let mut table = SchemaTable::new();
        let id = table.intern(vec!["a".into(), "b".into()]).unwrap();
        let schema = table.get(id);
        assert_eq!(schema.slot_of("a"), Some(0));
        assert_eq!(schema.slot_of("b"), Some(1));
        assert_eq!(schema.slot_of("c"), None);
    }

    #[test]
    fn schema_limit_is_enforced() {
        let mut table = SchemaTable::new();
        for i in 0..MAX_SCHEMAS {
            table.intern(vec![format!("p{i}")]).unwrap();
        }
        assert!(table.intern(vec!["overflow".into()]).is_err());
    }
}

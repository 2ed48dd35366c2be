/// Closure Env Builder (spec §4.H). `src/scope.rs` already knows, per
/// function/arrow span, which enclosing-function locals it reads
/// (`ClosureInfo::captured`); this module turns that name list into a fixed
/// slot layout for a heap-allocated environment record, one `f64` slot per
/// captured name in first-capture order. `src/codegen` allocates the record
/// when a closure value is created and threads its pointer through as an
/// invisible leading parameter to every call into that function; a captured
/// read inside the body becomes a load from `$env` at `offset_of(name)`
/// instead of a local access.
///
/// Grounded on `axiom/src/core/oop.rs`'s closure/environment shape
/// (conceptually: a closure there is a heap record referencing its defining
/// scope) rewritten from that tree-walker's `Rc<RefCell<Env>>` chain to a
/// flat WAT record in linear memory per spec §3.7 — jzc has no runtime
/// environment chain, only the one fixed-shape record per closure-creating
/// function, since `scope.rs` has already resolved every capture statically.
use crate::errors::Span;
use crate::heap::SLOT_SIZE;
use crate::scope::ScopeAnalysis;
use std::collections::HashMap;

/// The slot layout for one function/arrow's environment record.
pub struct EnvLayout {
    slots: HashMap<String, u32>,
    order: Vec<String>,
}

impl EnvLayout {
    /// Byte offset of `name`'s slot from the record's payload start, or
    /// `None` if `name` isn't captured by this function.
    pub fn offset_of(&self, name: &str) -> Option<u32> {
        self.slots.get(name).map(|slot| slot * SLOT_SIZE)
    }

    pub fn len(&self) -> u32 {
        self.order.len() as u32
    }

    pub fn byte_size(&self) -> u32 {
        self.len() * SLOT_SIZE
    }

    /// Captured names in slot order, for emitting the record's initializer
    /// at the closure's creation site.
    pub fn names(&self) -> &[String] {
        &self.order
    }
}

/// Every closure-creating function/arrow's `EnvLayout`, keyed by the same
/// span `scope::ClosureInfo` and `types::TypeTable::function_returns` use.
pub struct ClosureEnvs {
    by_span: HashMap<Span, EnvLayout>,
}

impl ClosureEnvs {
    pub fn build(scope: &ScopeAnalysis) -> Self {
        let mut by_span = HashMap::new();
        for (span, info) in &scope.closures {
            if info.captured.is_empty() {
                continue;
            }
            let mut slots = HashMap::new();
            for (i, name) in info.captured.iter().enumerate() {
                slots.insert(name.clone(), i as u32);
            }
            by_span.insert(*span, EnvLayout { slots, order: info.captured.clone() });
        }
        ClosureEnvs { by_span }
    }

    /// The layout for the function/arrow at `span`, or `None` if that
    /// function captures nothing and needs no environment record at all.
    pub fn get(&self, span: Span) -> Option<&EnvLayout> {
        self.by_span.get(&span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ClosureInfo;

    #[test]
    fn functions_with_no_captures_get_no_layout() {
        let mut closures = HashMap::new();
        closures.insert(Span::new(1, 2), ClosureInfo::default());
        let envs = ClosureEnvs::build(&ScopeAnalysis { closures });
        assert!(envs.get(Span::new(1, 2)).is_none());
    }

    #[test]
    fn captured_names_get_distinct_growing_offsets() {
        let mut closures = HashMap::new();
        closures.insert(Span::new(1, 2), ClosureInfo { captured: vec!["a".into(), "b".into()] });
        let envs = ClosureEnvs::build(&ScopeAnalysis { closures });
        let layout = envs.get(Span::new(1, 2)).unwrap();
        assert_eq!(layout.offset_of("a"), Some(0));
        assert_eq!(layout.offset_of("b"), Some(SLOT_SIZE));
        assert_eq!(layout.offset_of("c"), None);
        assert_eq!(layout.byte_size(), SLOT_SIZE * 2);
        assert_eq!(layout.names(), &["a".to_string(), "b".to_string()]);
    }
}

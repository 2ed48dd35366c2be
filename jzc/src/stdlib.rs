/// Stdlib Method Dispatch (spec §4.F "G"). A fixed, compile-time table
/// mapping `(receiver element type, method name)` to the prelude helper
/// function that implements it and the type that call produces.
///
/// Grounded on `axiom/src/intrinsics.rs`'s per-module dispatch-table shape
/// and `axm/src/inline_cache.rs`'s `Shape`/hidden-class idea, repurposed
/// from a *runtime* inline cache into a *compile-time* lookup (spec §9:
/// "Method calls do not enter a hash table at runtime" — jzc resolves the
/// call to a direct `call $helper` at compile time because the receiver's
/// element type is always statically known).
use crate::types::ElemType;

/// A method call jzc knows how to compile: which prelude function
/// implements it (emitted by `src/prelude.rs`, consumed by
/// `src/codegen/expr.rs`) and what the call's static result type is.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMethod {
    pub prelude_fn: &'static str,
    pub return_type: ElemType,
}

fn resolved(prelude_fn: &'static str, return_type: ElemType) -> Option<ResolvedMethod> {
    Some(ResolvedMethod { prelude_fn, return_type })
}

/// Looks up `receiver.method(...)`. Returns `None` when `method` is not a
/// recognized member of the receiver's stdlib surface; the caller turns
/// that into `CodegenError::UnknownProperty`.
pub fn resolve_method(receiver: &ElemType, method: &str) -> Option<ResolvedMethod> {
    match receiver {
        ElemType::Array(elem) => array_method(elem, method),
        ElemType::Str => string_method(method),
        ElemType::SetOf(elem) => set_method(elem, method),
        ElemType::MapOf(key, value) => map_method(key, value, method),
        ElemType::Regex => regex_method(method),
        _ => None,
    }
}

fn array_method(elem: &ElemType, method: &str) -> Option<ResolvedMethod> {
    let array_of_elem = ElemType::Array(Box::new(elem.clone()));
    match method {
        // push appends at the logical end, growing capacity tiers in place;
        // unshift always promotes to (or grows) a ring (spec §3.3) and so
        // always yields one. Both hand the whole array back — not a plain
        // length or `undefined` — since growth can move the block to a new
        // address that only a return-and-reassign makes visible again
        // (spec §8: `[1,2,3].push(4).length === 4`, `a = a.unshift(i)`).
        // `codegen/expr.rs`'s `inline_array_mutate` is what actually
        // dispatches these two apart; the prelude_fn named here is never
        // looked up for them.
        "push" => resolved("$array_push_like", array_of_elem),
        "unshift" => resolved("$array_unshift_like", array_of_elem),
        // pop/shift remove from the logical end/front respectively and
        // return the removed element (ring-aware, spec §3.3); codegen's
        // `inline_array_mutate` dispatches these too.
        "pop" => resolved("$array_pop_like", ElemType::Nullable(Box::new(elem.clone()))),
        "shift" => resolved("$array_shift_like", ElemType::Nullable(Box::new(elem.clone()))),
        // slice/concat/fill/reverse/sort/flat/map each need their own
        // per-method copy/transform/callback logic — `codegen/expr.rs`'s
        // `inline_array_transform` builds each inline rather than calling a
        // single shared prelude helper, so these names are labels only.
        "slice" => resolved("$array_slice", array_of_elem),
        "concat" => resolved("$array_concat", array_of_elem),
        "fill" => resolved("$array_fill", array_of_elem),
        "reverse" => resolved("$array_reverse", array_of_elem),
        "sort" => resolved("$array_sort", array_of_elem),
        "flat" => resolved("$array_flat", array_of_elem),
        "map" => resolved("$array_map", ElemType::Array(Box::new(ElemType::Any))),
        "filter" => resolved("$array_filter", array_of_elem),
        "join" => resolved("$array_join", ElemType::Str),
        "indexOf" | "lastIndexOf" => resolved("$array_index_of", ElemType::I32),
        "includes" => resolved("$array_includes", ElemType::Bool),
        "forEach" => resolved("$array_for_each", ElemType::Undefined),
        "reduce" => resolved("$array_reduce", ElemType::Any),
        "find" => resolved("$array_find", ElemType::Nullable(Box::new(elem.clone()))),
        "findIndex" => resolved("$array_find_index", ElemType::I32),
        "every" => resolved("$array_every", ElemType::Bool),
        "some" => resolved("$array_some", ElemType::Bool),
        "flatMap" => resolved("$array_flat_map", ElemType::Array(Box::new(ElemType::Any))),
        _ => None,
    }
}

fn string_method(method: &str) -> Option<ResolvedMethod> {
    match method {
        // Each of these needs its own code-unit copy/transform loop —
        // `codegen/expr.rs`'s `inline_string_transform` builds each inline,
        // so the names below are labels only, not emitted prelude helpers.
        "slice" => resolved("$string_slice", ElemType::Str),
        "substring" => resolved("$string_substring", ElemType::Str),
        "substr" => resolved("$string_substr", ElemType::Str),
        "trim" => resolved("$string_trim", ElemType::Str),
        "trimStart" => resolved("$string_trim_start", ElemType::Str),
        "trimEnd" => resolved("$string_trim_end", ElemType::Str),
        "toUpperCase" => resolved("$string_to_upper", ElemType::Str),
        "toLowerCase" => resolved("$string_to_lower", ElemType::Str),
        "concat" => resolved("$string_concat", ElemType::Str),
        "repeat" => resolved("$string_repeat", ElemType::Str),
        "padStart" => resolved("$string_pad_start", ElemType::Str),
        "padEnd" => resolved("$string_pad_end", ElemType::Str),
        "replace" => resolved("$string_replace", ElemType::Str),
        "replaceAll" => resolved("$string_replace_all", ElemType::Str),
        "at" => resolved("$string_at", ElemType::Str),
        "charAt" => resolved("$string_char_at", ElemType::Str),
        "indexOf" | "lastIndexOf" | "charCodeAt" | "search" => resolved("$string_index_of", ElemType::I32),
        "includes" | "startsWith" | "endsWith" => resolved("$string_includes", ElemType::Bool),
        "split" => resolved("$string_split", ElemType::Array(Box::new(ElemType::Str))),
        "match" => resolved("$string_match", ElemType::Nullable(Box::new(ElemType::Array(Box::new(ElemType::Str))))),
        _ => None,
    }
}

fn set_method(elem: &ElemType, method: &str) -> Option<ResolvedMethod> {
    match method {
        "add" => resolved("$set_add", ElemType::SetOf(Box::new(elem.clone()))),
        "has" => resolved("$set_has", ElemType::Bool),
        "delete" => resolved("$set_delete", ElemType::Bool),
        "clear" => resolved("$set_clear", ElemType::Undefined),
        _ => None,
    }
}

fn map_method(key: &ElemType, value: &ElemType, method: &str) -> Option<ResolvedMethod> {
    match method {
        "set" => resolved("$map_set", ElemType::MapOf(Box::new(key.clone()), Box::new(value.clone()))),
        "get" => resolved("$map_get", ElemType::Nullable(Box::new(value.clone()))),
        "has" => resolved("$map_has", ElemType::Bool),
        "delete" => resolved("$map_delete", ElemType::Bool),
        "clear" => resolved("$map_clear", ElemType::Undefined),
        _ => None,
    }
}

fn regex_method(method: &str) -> Option<ResolvedMethod> {
    match method {
        "test" => resolved("$regex_test", ElemType::Bool),
        "exec" => resolved("$regex_exec", ElemType::Nullable(Box::new(ElemType::Array(Box::new(ElemType::Str))))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_push_and_unshift_return_the_array_itself() {
        let arr = ElemType::Array(Box::new(ElemType::F64));
        let expected = ElemType::Array(Box::new(ElemType::F64));
        assert_eq!(resolve_method(&arr, "push").unwrap().return_type, expected);
        assert_eq!(resolve_method(&arr, "unshift").unwrap().return_type, expected);
    }

    #[test]
    fn array_pop_and_shift_return_nullable_element_type() {
        let arr = ElemType::Array(Box::new(ElemType::F64));
        let expected = ElemType::Nullable(Box::new(ElemType::F64));
        assert_eq!(resolve_method(&arr, "pop").unwrap().return_type, expected);
        assert_eq!(resolve_method(&arr, "shift").unwrap().return_type, expected);
    }

    #[test]
    fn unknown_method_is_none() {
        assert!(resolve_method(&ElemType::Array(Box::new(ElemType::F64)), "doesNotExist").is_none());
        assert!(resolve_method(&ElemType::I32, "push").is_none());
    }

    #[test]
    fn string_includes_returns_bool() {
        let r = resolve_method(&ElemType::Str, "includes").unwrap();
        assert_eq!(r.return_type, ElemType::Bool);
    }

    #[test]
    fn map_get_returns_nullable_value_type() {
        let r = resolve_method(&ElemType::MapOf(Box::new(ElemType::Str), Box::new(ElemType::I32)), "get").unwrap();
        assert_eq!(r.return_type, ElemType::Nullable(Box::new(ElemType::I32)));
    }

    #[test]
    fn array_every_and_some_return_bool() {
        let arr = ElemType::Array(Box::new(ElemType::F64));
        assert_eq!(resolve_method(&arr, "every").unwrap().return_type, ElemType::Bool);
        assert_eq!(resolve_method(&arr, "some").unwrap().return_type, ElemType::Bool);
    }

    #[test]
    fn string_search_returns_i32() {
        let r = resolve_method(&ElemType::Str, "search").unwrap();
        assert_eq!(r.return_type, ElemType::I32);
    }
}

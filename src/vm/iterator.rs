//! `for-in` enumeration and the iterator-result protocol (§3 Glossary
//! "Iterator record", `CreateEnumerateObject`/`CheckLastEnumerateKey`/
//! `GetEnumerateKey`/`MarkEnumerateKey`).
//!
//! Invoking a user-defined `Symbol.iterator`/`next` method is call
//! machinery, not enumeration, so that half of the iterator protocol lives
//! in `vm::call::iterator_next`; this module owns the parts that are pure
//! object-shape queries: walking an object's own-plus-inherited enumerable
//! string keys for `for-in`, and reading the `{value, done}` shape back out
//! of a `next()` result object.

use ahash::AHashSet;

use crate::{
    exception::{EngineError, ThrowResult},
    heap::{EnumerateObjectData, Heap, HeapId},
    intern::PropertyKey,
    value::Value,
};

/// Builds the ordered, duplicate-free key list a `for-in` loop walks:
/// every enumerable string-keyed own property of `target` and its
/// prototype chain, shadowed entries kept only once (closest to `target`
/// wins), in the order `CreateEnumerateObject` first observes them.
#[must_use]
pub fn create_enumerate_object(heap: &Heap, target: HeapId) -> EnumerateObjectData {
    let mut seen = AHashSet::new();
    let mut keys = Vec::new();
    let mut current = Some(target);
    while let Some(id) = current {
        let Some(obj) = heap.get_object(id) else { break };
        for slot in obj.structure.iter() {
            if !slot.attributes.enumerable {
                continue;
            }
            if let PropertyKey::String(s) = slot.key
                && seen.insert(s)
            {
                keys.push(slot.key);
            }
        }
        if obj.flags.is_array {
            for i in 0..obj.elements.len() as u32 {
                let key = PropertyKey::Index(i);
                // Array indices are enumerable in the common case; there is
                // no per-index attribute table for fast-mode elements, so
                // this assumes the default (no `Object.defineProperty` has
                // marked one non-enumerable, which would force the array out
                // of fast mode in the first place).
                keys.push(key);
            }
        }
        current = obj.prototype;
    }
    EnumerateObjectData { keys, cursor: 0 }
}

/// `CheckLastEnumerateKey`: true once every key has been produced.
#[must_use]
pub fn is_enumeration_done(data: &EnumerateObjectData) -> bool {
    data.cursor >= data.keys.len()
}

/// `GetEnumerateKey` + `MarkEnumerateKey` combined: advances the cursor and
/// returns the next key still present on `target` (deleted-during-iteration
/// keys are silently skipped, matching `for-in`'s "does not visit deleted
/// properties" rule).
#[must_use]
pub fn next_enumerate_key(heap: &Heap, target: HeapId, data: &mut EnumerateObjectData) -> Option<PropertyKey> {
    while let Some(key) = data.next_key() {
        if heap.get_object(target).is_some_and(|o| o.has_own(key) || still_inherited(heap, target, key)) {
            return Some(key);
        }
    }
    None
}

fn still_inherited(heap: &Heap, target: HeapId, key: PropertyKey) -> bool {
    let mut current = heap.get_object(target).and_then(|o| o.prototype);
    while let Some(id) = current {
        let Some(obj) = heap.get_object(id) else { break };
        if obj.has_own(key) {
            return true;
        }
        current = obj.prototype;
    }
    false
}

/// Reads the `{value, done}` shape off a `next()` return value (§3 Glossary
/// "Iterator record"). Per the standard iterator-result protocol this must
/// itself be an object; anything else is a `TypeError`.
pub fn read_iterator_result(heap: &Heap, result: Value, value_key: PropertyKey, done_key: PropertyKey) -> ThrowResult<(Value, bool)> {
    let Value::Pointer(id) = result else {
        return Err(EngineError::type_error("Iterator result is not an object"));
    };
    let Some(obj) = heap.get_object(id) else {
        return Err(EngineError::type_error("Iterator result is not an object"));
    };
    let value = obj.get_own(value_key).and_then(|(_, v)| v.as_data()).unwrap_or(Value::Undefined);
    let done = match obj.get_own(done_key).and_then(|(_, v)| v.as_data()) {
        Some(v) => v.to_boolean_primitive().unwrap_or(!matches!(v, Value::Pointer(_))),
        None => false,
    };
    Ok((value, done))
}

/// `IteratorClose`: resolves the iterator's `return()` method, if it has
/// one and it's callable-shaped (§4.6). `None` means there is nothing to
/// call and closing is a no-op, matching the standard's own "if return is
/// undefined, return NormalCompletion" step.
#[must_use]
pub fn resolve_return_method(heap: &Heap, iterator: HeapId, return_key: PropertyKey) -> Option<Value> {
    let (_, value) = heap.get_object(iterator)?.get_own(return_key)?;
    match value.as_data() {
        Some(v @ Value::Pointer(_)) => Some(v),
        _ => None,
    }
}

/// `BindingRestElement`: collects every element an array-like's fast-mode
/// buffer holds from `skip` onward into a fresh dense array's element
/// vector (the caller wraps this in a `JsObject::new_array`).
#[must_use]
pub fn collect_rest_elements(heap: &Heap, source: HeapId, skip: usize) -> Vec<Value> {
    heap.get_object(source)
        .map(|o| o.elements.iter().skip(skip).copied().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{heap::HeapData, object::JsObject, structure::{ObjectStructure, PropertyAttributes}};

    #[test]
    fn enumeration_skips_non_enumerable_and_visits_prototype() {
        let mut heap = Heap::new();
        let mut interns = crate::intern::Interns::new();
        let hidden = PropertyKey::String(interns.intern("hidden"));
        let shown = PropertyKey::String(interns.intern("shown"));
        let inherited = PropertyKey::String(interns.intern("inherited"));

        let mut proto = JsObject::new_plain(ObjectStructure::empty(true), None);
        let next = proto.structure.transition_add(inherited, PropertyAttributes::data(true, true, true));
        proto.transition_to(next, Value::Int32(1));
        let proto_id = heap.allocate(HeapData::Object(proto));

        let mut obj = JsObject::new_plain(ObjectStructure::empty(true), Some(proto_id));
        let next = obj.structure.transition_add(hidden, PropertyAttributes::data(true, false, true));
        obj.transition_to(next, Value::Int32(2));
        let next = obj.structure.transition_add(shown, PropertyAttributes::data(true, true, true));
        obj.transition_to(next, Value::Int32(3));
        let obj_id = heap.allocate(HeapData::Object(obj));

        let data = create_enumerate_object(&heap, obj_id);
        assert!(data.keys.contains(&shown));
        assert!(!data.keys.contains(&hidden));
        assert!(data.keys.contains(&inherited));
    }
}

//! The heap arena: `HeapId` handles and the `HeapData` union of heap kinds
//! (§3 "PointerValue (heap object, abstract)").
//!
//! An arena-with-free-list shape (`HeapId` indexing into a growable `Vec`)
//! with no manual reference-counting machinery: garbage collection is an
//! explicit external collaborator per §1 ("the core only declares which
//! fields are traced"), so this arena never frees a slot on its own.
//! `Heap::trace_roots` is the declared hook a host GC would call;
//! `Heap::sweep_unreachable` performs the mechanical reclamation once a host
//! has computed reachability
//! (both are provided so the crate is self-contained for tests, without
//! pretending to be a production collector).

use std::rc::Rc;

use num_bigint::BigInt;

use crate::{
    function::FunctionObject,
    intern::{PropertyKey, StringId, SymbolId},
    object::JsObject,
    value::Value,
    vm::generator::GeneratorState,
};

/// Handle to a heap-allocated value. Stable for the object's lifetime;
/// never reused while the object is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapId(u32);

impl HeapId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// An iterator-record (§3, Glossary): the triple for-of/rest-binding
/// consume.
#[derive(Debug, Clone)]
pub struct IteratorRecordData {
    pub iterator: HeapId,
    pub next_method: Value,
    pub done: bool,
}

/// A materialized enumerate-object for `for-in` (§3).
#[derive(Debug, Clone, Default)]
pub struct EnumerateObjectData {
    pub keys: Vec<PropertyKey>,
    pub cursor: usize,
}

impl EnumerateObjectData {
    #[must_use]
    pub fn next_key(&mut self) -> Option<PropertyKey> {
        let key = self.keys.get(self.cursor).copied();
        if key.is_some() {
            self.cursor += 1;
        }
        key
    }
}

/// A `RegExp` object's source data. No matching engine is implemented here:
/// pattern execution is a standard-library built-in and explicitly out of
/// scope (§1); `LoadRegExp` only needs to construct this record.
#[derive(Debug, Clone)]
pub struct RegExpData {
    pub source: StringId,
    pub flags: StringId,
}

/// The union of heap-allocated value kinds (§3 "PointerValue").
#[derive(Debug)]
pub enum HeapData {
    Object(JsObject),
    Str(Rc<str>),
    Symbol(SymbolId),
    BigInt(BigInt),
    Function(FunctionObject),
    IteratorRecord(IteratorRecordData),
    EnumerateObject(EnumerateObjectData),
    RegExp(RegExpData),
    /// A suspended generator/async-function activation (§4.7).
    Generator(GeneratorState),
}

impl HeapData {
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Object(_) => "Object",
            Self::Str(_) => "Str",
            Self::Symbol(_) => "Symbol",
            Self::BigInt(_) => "BigInt",
            Self::Function(_) => "Function",
            Self::IteratorRecord(_) => "IteratorRecord",
            Self::EnumerateObject(_) => "EnumerateObject",
            Self::RegExp(_) => "RegExp",
            Self::Generator(_) => "Generator",
        }
    }

    #[must_use]
    pub fn as_generator(&self) -> Option<&GeneratorState> {
        match self {
            Self::Generator(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_generator_mut(&mut self) -> Option<&mut GeneratorState> {
        match self {
            Self::Generator(g) => Some(g),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&JsObject> {
        match self {
            Self::Object(o) => Some(o),
            Self::Function(f) => Some(&f.object),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut JsObject> {
        match self {
            Self::Object(o) => Some(o),
            Self::Function(f) => Some(&mut f.object),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_function(&self) -> Option<&FunctionObject> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_function_mut(&mut self) -> Option<&mut FunctionObject> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_iterator_record(&self) -> Option<&IteratorRecordData> {
        match self {
            Self::IteratorRecord(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_iterator_record_mut(&mut self) -> Option<&mut IteratorRecordData> {
        match self {
            Self::IteratorRecord(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_enumerate_mut(&mut self) -> Option<&mut EnumerateObjectData> {
        match self {
            Self::EnumerateObject(e) => Some(e),
            _ => None,
        }
    }
}

/// The arena owning every heap-allocated value for one engine instance.
#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Option<HeapData>>,
    free: Vec<u32>,
}

impl Heap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, data: HeapData) -> HeapId {
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = Some(data);
            return HeapId(idx);
        }
        let idx = self.slots.len() as u32;
        self.slots.push(Some(data));
        HeapId(idx)
    }

    #[must_use]
    pub fn get(&self, id: HeapId) -> &HeapData {
        self.slots[id.index()]
            .as_ref()
            .expect("dereferenced a freed HeapId")
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        self.slots[id.index()]
            .as_mut()
            .expect("dereferenced a freed HeapId")
    }

    #[must_use]
    pub fn get_object(&self, id: HeapId) -> Option<&JsObject> {
        self.slots[id.index()].as_ref().and_then(HeapData::as_object)
    }

    pub fn get_object_mut(&mut self, id: HeapId) -> Option<&mut JsObject> {
        self.slots[id.index()].as_mut().and_then(HeapData::as_object_mut)
    }

    /// Declares the GC trace point (§1: "the core only declares which fields
    /// are traced"). A host collector calls this to enumerate every `HeapId`
    /// directly reachable from `id` without needing to know `HeapData`'s
    /// internal layout.
    #[must_use]
    pub fn trace_children(&self, id: HeapId) -> Vec<HeapId> {
        let mut out = Vec::new();
        match self.get(id) {
            HeapData::Object(o) => trace_object(o, &mut out),
            HeapData::Function(f) => {
                trace_object(&f.object, &mut out);
                if let Some(home) = f.home_object {
                    out.push(home);
                }
                // The captured `LexicalEnvironment` chain is `Rc`-owned
                // outside the heap arena (see `environment.rs`) and reclaimed
                // by ordinary drop once the last closure/frame releases it,
                // so it needs no entry here.
            }
            HeapData::IteratorRecord(r) => out.push(r.iterator),
            HeapData::Generator(g) => {
                for v in &g.registers {
                    if let Value::Pointer(id) = v {
                        out.push(*id);
                    }
                }
            }
            HeapData::Str(_) | HeapData::Symbol(_) | HeapData::BigInt(_) | HeapData::EnumerateObject(_) | HeapData::RegExp(_) => {}
        }
        out
    }

    /// Mechanically reclaims every id in `dead`, given a host-computed
    /// reachability result. Only used by tests in this crate; a real
    /// embedder drives its own tracing collector against `trace_children`.
    pub fn sweep_unreachable(&mut self, dead: &[HeapId]) {
        for id in dead {
            self.slots[id.index()] = None;
            self.free.push(id.0);
        }
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

fn trace_object(o: &JsObject, out: &mut Vec<HeapId>) {
    if let Some(p) = o.prototype {
        out.push(p);
    }
    for v in &o.values {
        if let crate::object::PropertyValue::Data(Value::Pointer(id)) = v {
            out.push(*id);
        }
    }
    for v in &o.elements {
        if let Value::Pointer(id) = v {
            out.push(*id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::ObjectStructure;

    #[test]
    fn allocate_and_reuse_freed_slot() {
        let mut heap = Heap::new();
        let a = heap.allocate(HeapData::Object(JsObject::new_plain(ObjectStructure::empty(true), None)));
        let b = heap.allocate(HeapData::Object(JsObject::new_plain(ObjectStructure::empty(true), None)));
        assert_ne!(a, b);
        heap.sweep_unreachable(&[a]);
        let c = heap.allocate(HeapData::Object(JsObject::new_plain(ObjectStructure::empty(true), None)));
        assert_eq!(c, a, "freed slot should be reused");
    }
}

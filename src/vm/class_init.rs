//! Class initialization (§4.8 "InitializeClass multi-stage opcode").
//!
//! `InitializeClass` is not one opcode but a short run of them
//! (`CreateClass`, `SetFieldSize`, `InitField`/`InitPrivateField`,
//! `SetFieldData`/`SetPrivateFieldData`, `InitStaticField` variants,
//! `CleanupStaticData`) that together build a constructor, wire its
//! prototype chain, and record which instance fields must run their
//! initializers every time `new` constructs an instance. `ClassBuilder`
//! accumulates that run's state across the whole opcode sequence, the same
//! one-struct-per-in-progress-definition shape a single-frame class body
//! would use, but with no body frame of its own since there is no compiler
//! driving one.

use crate::{
    heap::HeapId,
    intern::PropertyKey,
    structure::PropertyAttributes,
    value::Value,
};

/// One instance field awaiting per-construction initialization. Field
/// initializer *expressions* are compiled code in a real engine; this crate
/// has no compiler, so `initial_value` is the already-evaluated constant a
/// hand-assembled test supplies directly (documented simplification - a
/// real embedder would instead store a small code offset to re-run per
/// instance, since field initializers can reference `this`).
#[derive(Debug, Clone)]
pub struct PendingFieldInit {
    pub key: PropertyKey,
    pub initial_value: Value,
    pub is_private: bool,
}

/// Accumulates one `CreateClass` .. `CleanupStaticData` run.
#[derive(Debug)]
pub struct ClassBuilder {
    pub constructor: HeapId,
    pub prototype: HeapId,
    pub home_object: HeapId,
    pending_fields: Vec<Option<PendingFieldInit>>,
}

impl ClassBuilder {
    #[must_use]
    pub fn new(constructor: HeapId, prototype: HeapId) -> Self {
        Self {
            constructor,
            prototype,
            home_object: prototype,
            pending_fields: Vec::new(),
        }
    }

    /// `SetFieldSize`: reserves `count` slots for the field-init opcodes
    /// that follow to fill in by index (so `InitField`/`InitPrivateField`
    /// can run in any order without reallocating).
    pub fn set_field_size(&mut self, count: usize) {
        self.pending_fields = vec![None; count];
    }

    /// `InitField`/`SetFieldData` combined: records a public instance field.
    pub fn init_field(&mut self, index: usize, key: PropertyKey, initial_value: Value) {
        self.pending_fields[index] = Some(PendingFieldInit { key, initial_value, is_private: false });
    }

    /// `InitPrivateField`/`SetPrivateFieldData` combined.
    pub fn init_private_field(&mut self, index: usize, key: PropertyKey, initial_value: Value) {
        self.pending_fields[index] = Some(PendingFieldInit { key, initial_value, is_private: true });
    }

    /// `InitField`/`InitPrivateField` on their own: the compiled form splits
    /// staging a field's key from filling in its initializer value
    /// (`SetFieldData`/`SetPrivateFieldData`), since the initializer
    /// expression's register isn't live until later in the same run.
    pub fn stage_field_key(&mut self, index: usize, key: PropertyKey, is_private: bool) {
        self.pending_fields[index] = Some(PendingFieldInit { key, initial_value: Value::Undefined, is_private });
    }

    /// `SetFieldData`/`SetPrivateFieldData`: fills in the value staged by
    /// [`Self::stage_field_key`] at the same index.
    pub fn set_field_value(&mut self, index: usize, value: Value) {
        if let Some(field) = self.pending_fields[index].as_mut() {
            field.initial_value = value;
        }
    }

    /// Finishes the accumulation, returning the ordered field-init list a
    /// constructor prologue replays on every `new` (§4.8: fields initialize
    /// in declaration order, before the constructor body runs for a base
    /// class, or right after `super()` returns for a derived one).
    #[must_use]
    pub fn finish(self) -> Vec<PendingFieldInit> {
        self.pending_fields.into_iter().flatten().collect()
    }
}

/// Applies a static field directly to the constructor object
/// (`InitStaticField`): unlike instance fields, these run exactly once, at
/// class-definition time, never replayed per instance.
pub fn apply_static_field(
    constructor_obj: &mut crate::object::JsObject,
    key: PropertyKey,
    value: Value,
) {
    constructor_obj.define_own_property(key, PropertyAttributes::data(true, false, true), crate::object::PropertyValue::Data(value));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{heap::{Heap, HeapData}, object::JsObject, structure::ObjectStructure};

    #[test]
    fn field_inits_are_returned_in_declared_index_order() {
        let mut heap = Heap::new();
        let ctor = heap.allocate(HeapData::Object(JsObject::new_plain(ObjectStructure::empty(true), None)));
        let proto = heap.allocate(HeapData::Object(JsObject::new_plain(ObjectStructure::empty(true), None)));
        let mut builder = ClassBuilder::new(ctor, proto);
        builder.set_field_size(2);
        builder.init_field(1, PropertyKey::Index(1), Value::Int32(2));
        builder.init_field(0, PropertyKey::Index(0), Value::Int32(1));
        let fields = builder.finish();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].initial_value.as_i32(), Some(1));
        assert_eq!(fields[1].initial_value.as_i32(), Some(2));
    }
}

//! `Object` (§3): property storage, own-property operations, and the
//! fast-mode array dense buffer.
//!
//! Prototype-chain walking and the inline-cache machinery live in
//! `vm::property` (§4.3) since they need `Heap` access to follow
//! `prototype` links across objects; this module only implements the
//! *own*-property vtable (§6 "Object model vtable") that `vm::property`
//! builds on.

use std::rc::Rc;

use crate::{
    exception::{EngineError, ThrowResult},
    heap::HeapId,
    intern::PropertyKey,
    structure::{ObjectStructure, PropertyAttributes},
    value::Value,
};

/// A property slot's runtime content: either a plain value or an accessor
/// pair. Parallel to `structure`'s `PropertyAttributes.is_data` tag.
#[derive(Debug, Clone, Copy)]
pub enum PropertyValue {
    Data(Value),
    Accessor { getter: Option<Value>, setter: Option<Value> },
}

impl PropertyValue {
    #[must_use]
    pub const fn as_data(&self) -> Option<Value> {
        match self {
            Self::Data(v) => Some(*v),
            Self::Accessor { .. } => None,
        }
    }
}

/// Object-level flags (§3 "Object").
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectFlags {
    pub is_array: bool,
    /// `false` once a shape has been observed often enough with non-plain
    /// outcomes that the engine gives up caching it entirely (distinct from
    /// the per-site IC give-up: this is a per-*object* opt-out, e.g. for
    /// objects with a `Proxy` handler or a structure that changes on every
    /// access).
    pub inline_cache_eligible: bool,
    pub is_fast_mode_array: bool,
    pub is_spread_array: bool,
    pub is_prototype_object: bool,
}

impl ObjectFlags {
    #[must_use]
    pub fn plain() -> Self {
        Self {
            is_array: false,
            inline_cache_eligible: true,
            is_fast_mode_array: false,
            is_spread_array: false,
            is_prototype_object: false,
        }
    }

    #[must_use]
    pub fn array() -> Self {
        Self {
            is_array: true,
            inline_cache_eligible: true,
            is_fast_mode_array: true,
            is_spread_array: false,
            is_prototype_object: false,
        }
    }
}

/// What kind of ordinary-ish object this is, for the handful of behaviors
/// that are not expressible purely through structure + flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Plain,
    Error,
    /// `mapped` tracks whether this is a non-strict function's mapped
    /// arguments object (parameter-name aliasing) vs. a strict function's
    /// unmapped one (§4.4 "Heap-index fast access", §9 supplemented feature
    /// on lazy arguments-object materialization).
    Arguments { mapped: bool },
    ModuleNamespace,
}

/// An ordinary heap object: a `structure` (hidden class) plus the parallel
/// `values` vector, a prototype link, and - for arrays - a dense element
/// buffer distinct from the structured property store (§3 "Fast-mode
/// array").
#[derive(Debug)]
pub struct JsObject {
    pub structure: Rc<ObjectStructure>,
    pub values: Vec<PropertyValue>,
    pub prototype: Option<HeapId>,
    pub extensible: bool,
    pub flags: ObjectFlags,
    pub kind: ObjectKind,
    /// Dense indexed storage used only when `flags.is_fast_mode_array`.
    pub elements: Vec<Value>,
}

impl JsObject {
    #[must_use]
    pub fn new_plain(structure: Rc<ObjectStructure>, prototype: Option<HeapId>) -> Self {
        Self {
            structure,
            values: Vec::new(),
            prototype,
            extensible: true,
            flags: ObjectFlags::plain(),
            kind: ObjectKind::Plain,
            elements: Vec::new(),
        }
    }

    #[must_use]
    pub fn new_array(structure: Rc<ObjectStructure>, prototype: Option<HeapId>, elements: Vec<Value>) -> Self {
        Self {
            structure,
            values: Vec::new(),
            prototype,
            extensible: true,
            flags: ObjectFlags::array(),
            kind: ObjectKind::Plain,
            elements,
        }
    }

    /// Invariant 2: `values.len() == structure.propertyCount()`.
    #[must_use]
    pub fn invariant_holds(&self) -> bool {
        self.values.len() == self.structure.property_count()
    }

    #[must_use]
    pub fn array_length(&self) -> u32 {
        debug_assert!(self.flags.is_array);
        self.elements.len() as u32
    }

    /// Own-property lookup by key, ignoring the prototype chain.
    #[must_use]
    pub fn get_own(&self, key: PropertyKey) -> Option<(PropertyAttributes, PropertyValue)> {
        if self.flags.is_fast_mode_array
            && let PropertyKey::Index(i) = key
            && (i as usize) < self.elements.len()
        {
            return Some((
                PropertyAttributes::data(true, true, true),
                PropertyValue::Data(self.elements[i as usize]),
            ));
        }
        let slot = self.structure.get(key)?;
        Some((slot.attributes, self.values[slot.index]))
    }

    #[must_use]
    pub fn own_property_index(&self, key: PropertyKey) -> Option<usize> {
        self.structure.get(key).map(|s| s.index)
    }

    pub fn has_own(&self, key: PropertyKey) -> bool {
        if self.flags.is_fast_mode_array
            && let PropertyKey::Index(i) = key
        {
            return (i as usize) < self.elements.len();
        }
        self.structure.get(key).is_some()
    }

    /// Writes a value already known to live at an *existing* plain-data own
    /// property. Used by the IC fast path; does not check writability (the
    /// caller, having cached the site, is responsible for that check having
    /// already happened on the miss path).
    pub fn write_existing_slot(&mut self, index: usize, value: Value) {
        self.values[index] = PropertyValue::Data(value);
    }

    /// Performs a structure transition: appends `value` as a new own
    /// property, advancing to `next_structure`. Caller has already verified
    /// `self.structure.in_transition_mode()` and obtained `next_structure`
    /// from `self.structure.transition_add(key, attrs)`.
    pub fn transition_to(&mut self, next_structure: Rc<ObjectStructure>, value: Value) {
        debug_assert_eq!(next_structure.property_count(), self.structure.property_count() + 1);
        self.structure = next_structure;
        self.values.push(PropertyValue::Data(value));
    }

    /// `[[DefineOwnProperty]]` for the general (non-IC) path: creates or
    /// overwrites a data property with explicit attributes, bypassing
    /// writability checks (definition semantics differ from assignment).
    pub fn define_own_property(&mut self, key: PropertyKey, attributes: PropertyAttributes, value: PropertyValue) {
        if let Some(slot) = self.structure.get(key) {
            self.structure = self.structure.with_attributes(key, attributes);
            self.values[slot.index] = value;
            return;
        }
        let next = self.structure.transition_add(key, attributes);
        self.structure = next;
        self.values.push(value);
    }

    /// `[[Set]]` own-property path used outside the IC: writes `value` at an
    /// existing writable data property, or fails.
    ///
    /// # Errors
    /// Returns `TypeError` only when `strict` is true and the write target
    /// is non-writable or an accessor with no setter; non-strict failures
    /// are reported via the `Ok(false)` result instead (§4.3 "Strict-mode
    /// write failure").
    pub fn set_own(&mut self, key: PropertyKey, value: Value, strict: bool) -> ThrowResult<bool> {
        if self.flags.is_fast_mode_array
            && let PropertyKey::Index(i) = key
        {
            let i = i as usize;
            if i == self.elements.len() {
                self.elements.push(value);
            } else if i < self.elements.len() {
                self.elements[i] = value;
            } else {
                self.elements.resize(i, Value::Undefined);
                self.elements.push(value);
            }
            return Ok(true);
        }

        let Some(slot) = self.structure.get(key) else {
            return Ok(false);
        };
        if !slot.attributes.is_data || !slot.attributes.writable {
            if strict {
                return Err(EngineError::type_error(format!(
                    "Cannot assign to read only property (slot {})",
                    slot.index
                )));
            }
            return Ok(false);
        }
        self.values[slot.index] = PropertyValue::Data(value);
        Ok(true)
    }

    /// `[[Delete]]`. Returns `false` for non-configurable properties
    /// (caller decides whether that should raise in strict mode, §4.4).
    pub fn delete_own(&mut self, key: PropertyKey) -> bool {
        if self.flags.is_fast_mode_array
            && let PropertyKey::Index(i) = key
            && (i as usize) < self.elements.len()
        {
            self.elements[i as usize] = Value::Undefined;
            return true;
        }
        let Some(slot) = self.structure.get(key) else {
            return true;
        };
        if !slot.attributes.configurable {
            return false;
        }
        // Rebuild a structure without this key. Property order for the
        // remaining keys is preserved; indices are renumbered to stay dense,
        // matching the transition-table discipline (no "holes" in `values`).
        let remaining: Vec<_> = self
            .structure
            .iter()
            .filter(|s| s.key != key)
            .map(|s| (s.key, s.attributes))
            .collect();
        let mut new_structure = ObjectStructure::empty(true);
        let mut new_values = Vec::with_capacity(remaining.len());
        for (k, attrs) in remaining {
            let old_slot = self.structure.get(k).unwrap();
            new_structure = new_structure.transition_add(k, attrs);
            new_values.push(self.values[old_slot.index]);
        }
        self.structure = new_structure;
        self.values = new_values;
        true
    }

    pub fn prevent_extensions(&mut self) {
        self.extensible = false;
    }

    pub fn mark_as_prototype_object(&mut self) {
        self.flags.is_prototype_object = true;
    }

    #[must_use]
    pub fn is_inline_cacheable(&self) -> bool {
        self.flags.inline_cache_eligible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interns;

    fn key(interns: &mut Interns, s: &str) -> PropertyKey {
        PropertyKey::String(interns.intern(s))
    }

    #[test]
    fn set_own_creates_via_transition_and_preserves_invariant() {
        let mut interns = Interns::new();
        let k = key(&mut interns, "x");
        let mut obj = JsObject::new_plain(ObjectStructure::empty(true), None);
        assert!(!obj.has_own(k));
        let next = obj.structure.transition_add(k, PropertyAttributes::data(true, true, true));
        obj.transition_to(next, Value::Int32(1));
        assert!(obj.invariant_holds());
        assert_eq!(obj.structure.property_count(), 1);
        assert!(matches!(obj.get_own(k).unwrap().1, PropertyValue::Data(Value::Int32(1))));
    }

    #[test]
    fn fast_mode_array_bypasses_structure_for_indices() {
        let mut obj = JsObject::new_array(ObjectStructure::empty(true), None, vec![]);
        obj.set_own(PropertyKey::Index(0), Value::Int32(10), false).unwrap();
        obj.set_own(PropertyKey::Index(1), Value::Int32(20), false).unwrap();
        assert_eq!(obj.array_length(), 2);
        assert!(obj.structure.property_count() == 0);
    }

    #[test]
    fn non_writable_strict_set_throws() {
        let mut interns = Interns::new();
        let k = key(&mut interns, "x");
        let mut obj = JsObject::new_plain(ObjectStructure::empty(true), None);
        obj.define_own_property(k, PropertyAttributes::data(false, true, true), PropertyValue::Data(Value::Int32(1)));
        assert!(obj.set_own(k, Value::Int32(2), false).unwrap() == false);
        assert!(obj.set_own(k, Value::Int32(2), true).is_err());
    }
}

//! `ObjectStructure` - the shared, immutable-once-published hidden class
//! (§3 "ObjectStructure (hidden class)").
//!
//! Uses `IndexMap` for ordered, name-addressed property storage, extended
//! with the structural-sharing transition table a hidden-class object model
//! needs: adding a property walks a memoized transition edge to a sibling
//! structure instead of mutating the current one in place, reproduced here
//! in safe Rust with `Rc` standing in for a GC-traced pointer.

use std::{cell::RefCell, rc::Rc};

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::intern::PropertyKey;

/// Attributes of one property slot, independent of its current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyAttributes {
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
    /// `true` for a plain data property; `false` means the slot holds an
    /// accessor pair (getter/setter) rather than a plain value, which rules
    /// out Simple-IC caching (Invariant 3) and forces a give-up on any Set
    /// transition chain that crosses it (§4.3).
    pub is_data: bool,
}

impl PropertyAttributes {
    #[must_use]
    pub const fn data(writable: bool, enumerable: bool, configurable: bool) -> Self {
        Self {
            writable,
            enumerable,
            configurable,
            is_data: true,
        }
    }

    #[must_use]
    pub const fn accessor(enumerable: bool, configurable: bool) -> Self {
        Self {
            writable: false,
            enumerable,
            configurable,
            is_data: false,
        }
    }
}

/// One property descriptor as recorded in a structure: its key, attributes,
/// and the slot index into the owning object's `values` vector.
#[derive(Debug, Clone, Copy)]
pub struct PropertyDescriptorSlot {
    pub key: PropertyKey,
    pub attributes: PropertyAttributes,
    pub index: usize,
}

/// A shared hidden class.
///
/// `properties` is `IndexMap` so that (a) lookup by key is O(1), (b)
/// iteration is in insertion order for `for-in`/`Object.keys` enumeration,
/// and (c) `propertyCount` (Invariant 2) is simply `properties.len()`.
#[derive(Debug)]
pub struct ObjectStructure {
    properties: IndexMap<PropertyKey, PropertyDescriptorSlot, ahash::RandomState>,
    /// Whether this structure participates in shape-based inline caching
    /// (§3). Structures built by direct literal construction (object
    /// literals with a fixed, known property set) are *not* in transition
    /// mode because every instance of that literal shares one final
    /// structure; structures reached by incremental `obj.x = ...` additions
    /// are.
    in_transition_mode: bool,
    transitions: RefCell<AHashMap<(PropertyKey, PropertyAttributes), Rc<ObjectStructure>>>,
}

impl ObjectStructure {
    #[must_use]
    pub fn empty(in_transition_mode: bool) -> Rc<Self> {
        Rc::new(Self {
            properties: IndexMap::with_hasher(ahash::RandomState::new()),
            in_transition_mode,
            transitions: RefCell::new(AHashMap::new()),
        })
    }

    #[must_use]
    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    #[must_use]
    pub fn in_transition_mode(&self) -> bool {
        self.in_transition_mode
    }

    #[must_use]
    pub fn get(&self, key: PropertyKey) -> Option<PropertyDescriptorSlot> {
        self.properties.get(&key).copied()
    }

    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = PropertyDescriptorSlot> + '_ {
        self.properties.values().copied()
    }

    /// Finds (or lazily creates) the structure transitioned-to by adding
    /// `key` with `attributes`. Per Invariant 4, the resulting structure's
    /// `propertyCount` is exactly `self.propertyCount() + 1` and the new
    /// property is appended at the last slot index.
    ///
    /// # Panics
    /// Panics if `key` already exists on `self` - callers must check
    /// `self.get(key).is_none()` first; adding an existing key is always a
    /// plain value-write, not a transition.
    pub fn transition_add(self: &Rc<Self>, key: PropertyKey, attributes: PropertyAttributes) -> Rc<Self> {
        assert!(self.get(key).is_none(), "transition_add requires a new key");

        if let Some(existing) = self.transitions.borrow().get(&(key, attributes)) {
            return Rc::clone(existing);
        }

        let index = self.properties.len();
        let mut properties = self.properties.clone();
        properties.insert(key, PropertyDescriptorSlot { key, attributes, index });
        let next = Rc::new(Self {
            properties,
            in_transition_mode: true,
            transitions: RefCell::new(AHashMap::new()),
        });
        self.transitions
            .borrow_mut()
            .insert((key, attributes), Rc::clone(&next));
        next
    }

    /// Replaces the attributes of an existing property in place, producing a
    /// fresh structure with the same property order but the new attributes
    /// (used by `Object.defineProperty` attribute changes and accessor
    /// installation). Not memoized in the transition table since attribute
    /// rewrites are rare and not a hot path for the IC.
    #[must_use]
    pub fn with_attributes(&self, key: PropertyKey, attributes: PropertyAttributes) -> Rc<Self> {
        let mut properties = self.properties.clone();
        if let Some(slot) = properties.get_mut(&key) {
            slot.attributes = attributes;
        }
        Rc::new(Self {
            properties,
            in_transition_mode: self.in_transition_mode,
            transitions: RefCell::new(AHashMap::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: u32) -> PropertyKey {
        PropertyKey::String(crate::intern::Interns::new().intern(&format!("k{i}")))
    }

    #[test]
    fn transition_add_increments_count_by_one() {
        let base = ObjectStructure::empty(true);
        let attrs = PropertyAttributes::data(true, true, true);
        let k = key(0);
        let next = base.transition_add(k, attrs);
        assert_eq!(base.property_count(), 0);
        assert_eq!(next.property_count(), 1);
        assert_eq!(next.get(k).unwrap().index, 0);
    }

    #[test]
    fn identical_transitions_are_memoized() {
        let base = ObjectStructure::empty(true);
        let attrs = PropertyAttributes::data(true, true, true);
        let k = key(1);
        let a = base.transition_add(k, attrs);
        let b = base.transition_add(k, attrs);
        assert!(Rc::ptr_eq(&a, &b));
    }
}

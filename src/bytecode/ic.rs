//! Inline caches attached to `GetObjectPreComputedCase` /
//! `SetObjectPreComputedCase` call sites (§3 "Inline cache (per call site)",
//! §4.3).
//!
//! A dict-backed object model has no shapes to cache, so there is no simpler
//! precedent to generalize from here; this module maintains a small inline
//! array of `(structure, index)` pairs per call site (the Simple form) and
//! falls back to a larger prototype-chain-aware table (the Complex form) once
//! a site observes a miss that a plain own-property hit cannot explain.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::{heap::HeapId, resource::EngineLimits, structure::ObjectStructure};

/// One `(structure, slot)` hit recorded at a property-access site whose
/// result was a plain own data property. Bounded to a handful of inline
/// entries (Invariant 3: Simple-IC results are always direct own-property
/// reads, never a prototype walk).
#[derive(Debug, Clone)]
struct SimpleEntry {
    structure: Rc<ObjectStructure>,
    slot_index: usize,
}

/// One transition-insert entry for the Set side (§4.3 "Transition (new own
/// property) case"): `before` is the receiver's shape prior to the write,
/// `after` the shape the `transition_add` edge leads to, and `slot_index`
/// where the new value lands in `after`'s value vector.
#[derive(Debug, Clone)]
struct TransitionEntry {
    before: Rc<ObjectStructure>,
    after: Rc<ObjectStructure>,
    slot_index: usize,
}

/// The fast path: a tiny fixed-capacity array of shape -> slot mappings,
/// plus a parallel array of transition entries used only by Set call sites.
#[derive(Debug, Default)]
pub struct SimpleInlineCache {
    entries: SmallVec<[SimpleEntry; 3]>,
    transitions: SmallVec<[TransitionEntry; 3]>,
    fill_count: u32,
    miss_count: u32,
    /// Set once `miss_count` crosses `EngineLimits.ic_max_miss_count`: the
    /// site is never cached again regardless of subsequent shapes.
    gave_up: bool,
}

impl SimpleInlineCache {
    #[must_use]
    pub fn lookup(&self, structure: &Rc<ObjectStructure>) -> Option<usize> {
        self.entries
            .iter()
            .find(|e| Rc::ptr_eq(&e.structure, structure))
            .map(|e| e.slot_index)
    }

    /// Looks up a transition-insert entry keyed by the receiver's
    /// pre-transition shape; returns the post-transition shape and the new
    /// property's slot index on a hit.
    #[must_use]
    pub fn lookup_transition(&self, before: &Rc<ObjectStructure>) -> Option<(Rc<ObjectStructure>, usize)> {
        self.transitions
            .iter()
            .find(|e| Rc::ptr_eq(&e.before, before))
            .map(|e| (Rc::clone(&e.after), e.slot_index))
    }

    pub fn record_hit(&mut self) {
        self.fill_count += 1;
    }

    /// Records a miss and reports whether the site should keep trying to
    /// cache (false once it has given up for good, §4.3).
    pub fn record_miss(&mut self, limits: &EngineLimits) -> bool {
        self.miss_count += 1;
        if self.miss_count > limits.ic_max_miss_count {
            self.gave_up = true;
        }
        !self.gave_up
    }

    pub fn install(&mut self, structure: Rc<ObjectStructure>, slot_index: usize, limits: &EngineLimits) {
        if self.gave_up || self.fill_count < limits.ic_min_fill_count {
            return;
        }
        if self.lookup(&structure).is_some() {
            return;
        }
        if self.entries.len() >= 3 {
            self.entries.remove(0);
        }
        self.entries.push(SimpleEntry { structure, slot_index });
    }

    /// Installs a transition-insert entry once the before-structure is
    /// observed in transition mode (§4.3: a structure built by direct
    /// literal construction never reaches this path since it has no
    /// transition edges to record).
    pub fn install_transition(&mut self, before: Rc<ObjectStructure>, after: Rc<ObjectStructure>, slot_index: usize, limits: &EngineLimits) {
        if self.gave_up || self.fill_count < limits.ic_min_fill_count || !before.in_transition_mode() {
            return;
        }
        if self.lookup_transition(&before).is_some() {
            return;
        }
        if self.transitions.len() >= 3 {
            self.transitions.remove(0);
        }
        self.transitions.push(TransitionEntry { before, after, slot_index });
    }

    #[must_use]
    pub fn has_given_up(&self) -> bool {
        self.gave_up
    }
}

/// One Complex-IC entry: a shape observed at the receiver, the `HeapId` of
/// the prototype-chain link that actually owns the property (`None` when
/// the property does not exist, i.e. a cached negative lookup), and the slot
/// index on that holder.
#[derive(Debug, Clone)]
struct ComplexEntry {
    receiver_structure: Rc<ObjectStructure>,
    holder: Option<HeapId>,
    slot_index: usize,
}

/// The slow-but-still-cached path: prototype-chain-aware, bounded to
/// `EngineLimits.ic_max_entries`, evicted by shifting out the oldest entry
/// once full (§3 "bounded LRU-by-shift", §9 Open Questions `maxCacheCount`).
#[derive(Debug, Default)]
pub struct ComplexInlineCache {
    entries: Vec<ComplexEntry>,
    miss_count: u32,
    gave_up: bool,
}

impl ComplexInlineCache {
    #[must_use]
    pub fn lookup(&self, receiver_structure: &Rc<ObjectStructure>) -> Option<(Option<HeapId>, usize)> {
        self.entries
            .iter()
            .find(|e| Rc::ptr_eq(&e.receiver_structure, receiver_structure))
            .map(|e| (e.holder, e.slot_index))
    }

    pub fn record_miss(&mut self, limits: &EngineLimits) -> bool {
        self.miss_count += 1;
        if self.miss_count > limits.ic_max_miss_count {
            self.gave_up = true;
        }
        !self.gave_up
    }

    pub fn install(
        &mut self,
        receiver_structure: Rc<ObjectStructure>,
        holder: Option<HeapId>,
        slot_index: usize,
        limits: &EngineLimits,
    ) {
        if self.gave_up {
            return;
        }
        if self.entries.iter().any(|e| Rc::ptr_eq(&e.receiver_structure, &receiver_structure)) {
            return;
        }
        if self.entries.len() >= limits.ic_max_entries {
            self.entries.remove(0);
        }
        self.entries.push(ComplexEntry {
            receiver_structure,
            holder,
            slot_index,
        });
    }

    #[must_use]
    pub fn has_given_up(&self) -> bool {
        self.gave_up
    }
}

/// Either form a `GetObjectPreComputedCase`/`SetObjectPreComputedCase` site
/// can be in. Starts `Simple`; promotes to `Complex` the first time a hit
/// requires a prototype-chain walk.
#[derive(Debug)]
pub enum PropertyAccessCache {
    Simple(SimpleInlineCache),
    Complex(ComplexInlineCache),
}

impl Default for PropertyAccessCache {
    fn default() -> Self {
        Self::Simple(SimpleInlineCache::default())
    }
}

impl PropertyAccessCache {
    pub fn promote_to_complex(&mut self) {
        if matches!(self, Self::Simple(_)) {
            *self = Self::Complex(ComplexInlineCache::default());
        }
    }
}

/// Cache attached to `GetGlobalVariable`/`SetGlobalVariable` sites: once a
/// binding is resolved to a slot in the global lexical record or a global
/// object property, later visits skip name lookup entirely (§4.4).
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalVariableAccessCacheItem {
    pub lexical_index: Option<u32>,
    pub global_object_slot: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_cache_waits_for_min_fill_before_installing() {
        let limits = EngineLimits::default();
        let mut cache = SimpleInlineCache::default();
        let structure = ObjectStructure::empty(true);
        for _ in 0..limits.ic_min_fill_count - 1 {
            cache.record_hit();
        }
        cache.install(Rc::clone(&structure), 0, &limits);
        assert!(cache.lookup(&structure).is_none());
        cache.record_hit();
        cache.install(structure.clone(), 0, &limits);
        assert_eq!(cache.lookup(&structure), Some(0));
    }

    #[test]
    fn repeated_misses_trip_gave_up() {
        let limits = EngineLimits::default();
        let mut cache = SimpleInlineCache::default();
        for _ in 0..=limits.ic_max_miss_count {
            cache.record_miss(&limits);
        }
        assert!(cache.has_given_up());
    }

    #[test]
    fn transition_entry_is_keyed_on_the_before_structure() {
        let limits = EngineLimits::default();
        let mut cache = SimpleInlineCache::default();
        let before = ObjectStructure::empty(true);
        let mut interns = crate::intern::Interns::new();
        let key = crate::intern::PropertyKey::String(interns.intern("x"));
        let after = before.transition_add(key, crate::structure::PropertyAttributes::data(true, true, true));
        for _ in 0..limits.ic_min_fill_count {
            cache.record_hit();
        }
        cache.install_transition(Rc::clone(&before), Rc::clone(&after), 0, &limits);
        let (hit_after, slot) = cache.lookup_transition(&before).expect("transition entry recorded");
        assert!(Rc::ptr_eq(&hit_after, &after));
        assert_eq!(slot, 0);
        assert!(cache.lookup_transition(&after).is_none());
    }

    #[test]
    fn transition_entry_requires_transition_mode_structure() {
        let limits = EngineLimits::default();
        let mut cache = SimpleInlineCache::default();
        let literal_shape = ObjectStructure::empty(false);
        let mut interns = crate::intern::Interns::new();
        let key = crate::intern::PropertyKey::String(interns.intern("x"));
        let after = literal_shape.transition_add(key, crate::structure::PropertyAttributes::data(true, true, true));
        for _ in 0..limits.ic_min_fill_count {
            cache.record_hit();
        }
        cache.install_transition(Rc::clone(&literal_shape), after, 0, &limits);
        assert!(cache.lookup_transition(&literal_shape).is_none());
    }
}

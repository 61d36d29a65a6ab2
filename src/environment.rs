//! Lexical environments and environment records (§3 "LexicalEnvironment
//! chain", §4.4 "Variable and environment access").
//!
//! A flat, resource-tracked stack of frames is adequate for a language whose
//! scoping is function-or-module, never a nested block tree, but block
//! scoping, `with`, and the global record's split declarative/object halves
//! need an actual tree of scopes. This module keeps the slots-in-a-reusable-
//! frame discipline (bindings are indexed slots, not hashmap entries looked
//! up by string every time) while building out the six record kinds §3
//! enumerates.
//!
//! Environments are `Rc`-owned outside the `Heap` arena: closures capture a
//! `Rc<LexicalEnvironment>` directly, and since nothing here stores a
//! back-edge from an environment to the closures that captured it, the chain
//! can never form an `Rc` cycle and needs no GC tracing.

use std::{cell::RefCell, rc::Rc};

use ahash::AHashMap;

use crate::{
    exception::{EngineError, ThrowResult},
    heap::{Heap, HeapId},
    intern::StringId,
    object::PropertyValue,
    value::Value,
};

/// One binding slot: its current value, mutability, and (for `let`/`const`/
/// class bindings) whether it has left the temporal dead zone yet.
#[derive(Debug, Clone)]
struct Binding {
    value: Value,
    mutable: bool,
    initialized: bool,
}

impl Binding {
    fn uninitialized(mutable: bool) -> Self {
        Self {
            value: Value::Empty,
            mutable,
            initialized: false,
        }
    }

    fn initialized(value: Value, mutable: bool) -> Self {
        Self {
            value,
            mutable,
            initialized: true,
        }
    }
}

/// A resolved reference to an indexed declarative binding: `hops` outer
/// links to walk from the environment the access opcode runs in, then
/// `index` into that environment's fixed slot array. Computed once by a
/// (not-in-scope) compiler and baked into the opcode stream so that repeat
/// execution - e.g. a loop body - never re-resolves by name (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingSlot {
    pub hops: u32,
    pub index: u32,
}

/// The kind-specific storage an `EnvironmentRecord` holds (§3 enumerates:
/// "Declarative (indexed or not-indexed), Function, Object, Module, Global").
#[derive(Debug)]
enum RecordKind {
    /// Fixed-size slot array, addressed by `BindingSlot.index`. Used for
    /// function bodies and blocks whose binding set is fully known when the
    /// scope is entered.
    DeclarativeIndexed { bindings: Vec<Binding> },
    /// Name-addressed bindings, used where the binding set cannot be fixed
    /// ahead of time (direct `eval`, catch clauses with destructuring).
    DeclarativeNotIndexed { bindings: AHashMap<StringId, Binding> },
    /// A function's activation record: indexed bindings for parameters and
    /// locals, plus the per-call `this`/`new.target`/home-object state §6
    /// attaches to an invocation rather than to any one binding.
    Function {
        bindings: Vec<Binding>,
        this_value: Option<Value>,
        new_target: Option<HeapId>,
        home_object: Option<HeapId>,
    },
    /// Wraps a plain object as the binding store (`with` statement, and the
    /// non-lexical half of the global environment for `var`/function
    /// declarations).
    Object { binding_object: HeapId, is_with_environment: bool },
    /// The global environment: a declarative half for `let`/`const`/class at
    /// top level, plus the global object for `var`/function declarations and
    /// implicit globals.
    Global {
        declarative: AHashMap<StringId, Binding>,
        global_object: HeapId,
    },
    /// A module's import/export bindings; imported bindings are immutable
    /// and indirect (resolved against the exporting module), which this
    /// crate does not model since module linking is out of scope (§1) -
    /// the record exists so `ModuleNamespace` objects have something to
    /// read from for the re-export surface §9 supplements.
    Module { bindings: AHashMap<StringId, Binding> },
}

/// One node in the lexical environment chain.
#[derive(Debug)]
pub struct LexicalEnvironment {
    record: RefCell<RecordKind>,
    pub outer: Option<Rc<LexicalEnvironment>>,
}

impl LexicalEnvironment {
    #[must_use]
    pub fn new_declarative_indexed(slot_count: usize, outer: Option<Rc<Self>>) -> Rc<Self> {
        Rc::new(Self {
            record: RefCell::new(RecordKind::DeclarativeIndexed {
                bindings: std::iter::repeat_with(|| Binding::uninitialized(true)).take(slot_count).collect(),
            }),
            outer,
        })
    }

    #[must_use]
    pub fn new_declarative_not_indexed(outer: Option<Rc<Self>>) -> Rc<Self> {
        Rc::new(Self {
            record: RefCell::new(RecordKind::DeclarativeNotIndexed { bindings: AHashMap::new() }),
            outer,
        })
    }

    #[must_use]
    pub fn new_function(slot_count: usize, this_value: Option<Value>, outer: Option<Rc<Self>>) -> Rc<Self> {
        Rc::new(Self {
            record: RefCell::new(RecordKind::Function {
                bindings: std::iter::repeat_with(|| Binding::uninitialized(true)).take(slot_count).collect(),
                this_value,
                new_target: None,
                home_object: None,
            }),
            outer,
        })
    }

    #[must_use]
    pub fn new_object(binding_object: HeapId, is_with_environment: bool, outer: Option<Rc<Self>>) -> Rc<Self> {
        Rc::new(Self {
            record: RefCell::new(RecordKind::Object { binding_object, is_with_environment }),
            outer,
        })
    }

    #[must_use]
    pub fn new_global(global_object: HeapId) -> Rc<Self> {
        Rc::new(Self {
            record: RefCell::new(RecordKind::Global {
                declarative: AHashMap::new(),
                global_object,
            }),
            outer: None,
        })
    }

    #[must_use]
    pub fn new_module(outer: Option<Rc<Self>>) -> Rc<Self> {
        Rc::new(Self {
            record: RefCell::new(RecordKind::Module { bindings: AHashMap::new() }),
            outer,
        })
    }

    // -- indexed fast path (§4.4) ----------------------------------------

    pub fn initialize_binding_by_index(&self, index: u32, value: Value) {
        let mut record = self.record.borrow_mut();
        let bindings = match &mut *record {
            RecordKind::DeclarativeIndexed { bindings } | RecordKind::Function { bindings, .. } => bindings,
            _ => panic!("initialize_binding_by_index on a non-indexed record"),
        };
        bindings[index as usize] = Binding::initialized(value, true);
    }

    /// Walks `slot.hops` outer links, then reads the indexed binding.
    ///
    /// # Errors
    /// `ReferenceError` if the binding has not left the temporal dead zone
    /// (Invariant: an uninitialized `let`/`const`/class binding is never
    /// observable as `Value::Empty`, §3).
    pub fn get_binding_value_by_slot(self: &Rc<Self>, slot: BindingSlot) -> ThrowResult<Value> {
        let env = self.walk(slot.hops);
        let record = env.record.borrow();
        let bindings = match &*record {
            RecordKind::DeclarativeIndexed { bindings } | RecordKind::Function { bindings, .. } => bindings,
            _ => panic!("get_binding_value_by_slot on a non-indexed record"),
        };
        let binding = &bindings[slot.index as usize];
        if !binding.initialized {
            return Err(EngineError::reference_error("Cannot access binding before initialization"));
        }
        Ok(binding.value)
    }

    /// # Errors
    /// `TypeError` for a non-strict-invalid `const` write is not modeled
    /// here (that check happens at compile time per §4.4's "statically
    /// rejected"); at runtime a write to an immutable binding is always a
    /// `TypeError`.
    pub fn set_mutable_binding_by_slot(self: &Rc<Self>, slot: BindingSlot, value: Value) -> ThrowResult<()> {
        let env = self.walk(slot.hops);
        let mut record = env.record.borrow_mut();
        let bindings = match &mut *record {
            RecordKind::DeclarativeIndexed { bindings } | RecordKind::Function { bindings, .. } => bindings,
            _ => panic!("set_mutable_binding_by_slot on a non-indexed record"),
        };
        let binding = &mut bindings[slot.index as usize];
        if !binding.initialized {
            return Err(EngineError::reference_error("Cannot access binding before initialization"));
        }
        if !binding.mutable {
            return Err(EngineError::type_error("Assignment to constant variable"));
        }
        binding.value = value;
        Ok(())
    }

    fn walk(self: &Rc<Self>, hops: u32) -> Rc<Self> {
        let mut env = Rc::clone(self);
        for _ in 0..hops {
            env = Rc::clone(env.outer.as_ref().expect("BindingSlot.hops exceeds chain depth"));
        }
        env
    }

    // -- name-addressed path (dynamic scopes, §4.4 "WithOperation") -------

    #[must_use]
    pub fn has_binding(&self, heap: &Heap, name: StringId) -> bool {
        match &*self.record.borrow() {
            RecordKind::DeclarativeIndexed { .. } | RecordKind::Function { .. } => false,
            RecordKind::DeclarativeNotIndexed { bindings } | RecordKind::Module { bindings } => {
                bindings.contains_key(&name)
            }
            RecordKind::Object { binding_object, .. } => heap
                .get_object(*binding_object)
                .is_some_and(|o| o.has_own(crate::intern::PropertyKey::String(name))),
            RecordKind::Global { declarative, global_object } => {
                declarative.contains_key(&name)
                    || heap
                        .get_object(*global_object)
                        .is_some_and(|o| o.has_own(crate::intern::PropertyKey::String(name)))
            }
        }
    }

    pub fn create_mutable_binding(&self, name: StringId) {
        match &mut *self.record.borrow_mut() {
            RecordKind::DeclarativeNotIndexed { bindings } | RecordKind::Module { bindings } => {
                bindings.entry(name).or_insert_with(|| Binding::uninitialized(true));
            }
            RecordKind::Global { declarative, .. } => {
                declarative.entry(name).or_insert_with(|| Binding::uninitialized(true));
            }
            RecordKind::DeclarativeIndexed { .. } | RecordKind::Function { .. } | RecordKind::Object { .. } => {
                panic!("create_mutable_binding on an indexed/object record")
            }
        }
    }

    pub fn initialize_binding_by_name(&self, name: StringId, value: Value) {
        match &mut *self.record.borrow_mut() {
            RecordKind::DeclarativeNotIndexed { bindings } | RecordKind::Module { bindings } => {
                bindings.insert(name, Binding::initialized(value, true));
            }
            RecordKind::Global { declarative, .. } => {
                declarative.insert(name, Binding::initialized(value, true));
            }
            RecordKind::DeclarativeIndexed { .. } | RecordKind::Function { .. } | RecordKind::Object { .. } => {
                panic!("initialize_binding_by_name on an indexed/object record")
            }
        }
    }

    /// # Errors
    /// `ReferenceError` if `name` is unresolvable in this record (caller
    /// walks `outer` on `Ok(None)`... actually returns `Ok(None)` to signal
    /// "not here, try outer"; a thrown `ReferenceError` means "definitely
    /// absent everywhere", reserved for the global record's final miss).
    pub fn get_binding_value_by_name(&self, heap: &Heap, name: StringId, strict: bool) -> ThrowResult<Option<Value>> {
        match &*self.record.borrow() {
            RecordKind::DeclarativeNotIndexed { bindings } | RecordKind::Module { bindings } => {
                match bindings.get(&name) {
                    Some(b) if b.initialized => Ok(Some(b.value)),
                    Some(_) => Err(EngineError::reference_error("Cannot access binding before initialization")),
                    None => Ok(None),
                }
            }
            RecordKind::Object { binding_object, .. } => {
                let Some(obj) = heap.get_object(*binding_object) else {
                    return Ok(None);
                };
                match obj.get_own(crate::intern::PropertyKey::String(name)) {
                    Some((_, PropertyValue::Data(v))) => Ok(Some(v)),
                    Some((_, PropertyValue::Accessor { .. })) => Ok(Some(Value::Undefined)),
                    None => Ok(None),
                }
            }
            RecordKind::Global { declarative, global_object } => {
                if let Some(b) = declarative.get(&name) {
                    return if b.initialized {
                        Ok(Some(b.value))
                    } else {
                        Err(EngineError::reference_error("Cannot access binding before initialization"))
                    };
                }
                match heap.get_object(*global_object).and_then(|o| o.get_own(crate::intern::PropertyKey::String(name))) {
                    Some((_, PropertyValue::Data(v))) => Ok(Some(v)),
                    Some((_, PropertyValue::Accessor { .. })) => Ok(Some(Value::Undefined)),
                    None if strict => Ok(None),
                    None => Ok(None),
                }
            }
            RecordKind::DeclarativeIndexed { .. } | RecordKind::Function { .. } => Ok(None),
        }
    }

    /// Writes `name` at this record if it lives here, per the same
    /// "`Ok(false)` means try outer" contract as [`Self::get_binding_value_by_name`].
    /// The `Global` record is the walk's terminus: with nowhere further to
    /// try, a name absent from both its declarative half and the global
    /// object either creates an implicit global (non-strict, §4.4 "implicit
    /// global creation on assignment") or raises `ReferenceError` (strict).
    ///
    /// # Errors
    /// `ReferenceError` for a TDZ binding or a genuinely undeclared strict
    /// name; `TypeError` for a write to an immutable binding.
    pub fn set_mutable_binding_by_name(&self, heap: &mut Heap, name: StringId, value: Value, strict: bool) -> ThrowResult<bool> {
        match &mut *self.record.borrow_mut() {
            RecordKind::DeclarativeNotIndexed { bindings } | RecordKind::Module { bindings } => {
                let Some(binding) = bindings.get_mut(&name) else {
                    return Ok(false);
                };
                if !binding.initialized {
                    return Err(EngineError::reference_error("Cannot access binding before initialization"));
                }
                if !binding.mutable {
                    return Err(EngineError::type_error("Assignment to constant variable"));
                }
                binding.value = value;
                Ok(true)
            }
            RecordKind::Object { binding_object, .. } => {
                let key = crate::intern::PropertyKey::String(name);
                let Some(obj) = heap.get_object_mut(*binding_object) else {
                    return Ok(false);
                };
                if !obj.has_own(key) {
                    return Ok(false);
                }
                obj.set_own(key, value, strict)?;
                Ok(true)
            }
            RecordKind::Global { declarative, global_object } => {
                if let Some(binding) = declarative.get_mut(&name) {
                    if !binding.initialized {
                        return Err(EngineError::reference_error("Cannot access binding before initialization"));
                    }
                    if !binding.mutable {
                        return Err(EngineError::type_error("Assignment to constant variable"));
                    }
                    binding.value = value;
                    return Ok(true);
                }
                let key = crate::intern::PropertyKey::String(name);
                let global_object = *global_object;
                let obj = heap.get_object_mut(global_object).expect("global object missing");
                if obj.has_own(key) {
                    obj.set_own(key, value, strict)?;
                    return Ok(true);
                }
                if strict {
                    return Err(EngineError::reference_error("is not defined"));
                }
                obj.define_own_property(key, crate::structure::PropertyAttributes::data(true, true, true), PropertyValue::Data(value));
                Ok(true)
            }
            RecordKind::DeclarativeIndexed { .. } | RecordKind::Function { .. } => Ok(false),
        }
    }

    pub fn delete_binding(&self, heap: &mut Heap, name: StringId) -> bool {
        match &mut *self.record.borrow_mut() {
            RecordKind::DeclarativeNotIndexed { bindings } | RecordKind::Module { bindings } => {
                bindings.remove(&name).is_some()
            }
            RecordKind::Global { declarative, global_object } => {
                if declarative.remove(&name).is_some() {
                    return true;
                }
                heap.get_object_mut(*global_object)
                    .is_some_and(|o| o.delete_own(crate::intern::PropertyKey::String(name)))
            }
            RecordKind::Object { binding_object, .. } => heap
                .get_object_mut(*binding_object)
                .is_some_and(|o| o.delete_own(crate::intern::PropertyKey::String(name))),
            RecordKind::DeclarativeIndexed { .. } | RecordKind::Function { .. } => false,
        }
    }

    #[must_use]
    pub fn this_value(&self) -> Option<Value> {
        match &*self.record.borrow() {
            RecordKind::Function { this_value, .. } => *this_value,
            _ => None,
        }
    }

    pub fn set_new_target(&self, target: Option<HeapId>) {
        if let RecordKind::Function { new_target, .. } = &mut *self.record.borrow_mut() {
            *new_target = target;
        }
    }

    #[must_use]
    pub fn new_target(&self) -> Option<HeapId> {
        match &*self.record.borrow() {
            RecordKind::Function { new_target, .. } => *new_target,
            _ => None,
        }
    }

    pub fn set_home_object(&self, home: Option<HeapId>) {
        if let RecordKind::Function { home_object, .. } = &mut *self.record.borrow_mut() {
            *home_object = home;
        }
    }

    #[must_use]
    pub fn home_object(&self) -> Option<HeapId> {
        match &*self.record.borrow() {
            RecordKind::Function { home_object, .. } => *home_object,
            _ => None,
        }
    }

    #[must_use]
    pub fn is_with_environment(&self) -> bool {
        matches!(&*self.record.borrow(), RecordKind::Object { is_with_environment: true, .. })
    }

    #[must_use]
    pub fn binding_object(&self) -> Option<HeapId> {
        match &*self.record.borrow() {
            RecordKind::Object { binding_object, .. } => Some(*binding_object),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexed_binding_round_trips() {
        let env = LexicalEnvironment::new_declarative_indexed(2, None);
        env.initialize_binding_by_index(0, Value::Int32(7));
        let slot = BindingSlot { hops: 0, index: 0 };
        assert_eq!(env.get_binding_value_by_slot(slot).unwrap().as_i32(), Some(7));
        env.set_mutable_binding_by_slot(slot, Value::Int32(8)).unwrap();
        assert_eq!(env.get_binding_value_by_slot(slot).unwrap().as_i32(), Some(8));
    }

    #[test]
    fn uninitialized_slot_is_a_reference_error_not_empty() {
        let env = LexicalEnvironment::new_declarative_indexed(1, None);
        let slot = BindingSlot { hops: 0, index: 0 };
        assert!(env.get_binding_value_by_slot(slot).is_err());
    }

    #[test]
    fn outer_chain_walk_resolves_parent_slot() {
        let outer = LexicalEnvironment::new_declarative_indexed(1, None);
        outer.initialize_binding_by_index(0, Value::Int32(42));
        let inner = LexicalEnvironment::new_declarative_indexed(1, Some(Rc::clone(&outer)));
        inner.initialize_binding_by_index(0, Value::Int32(1));
        let outer_slot = BindingSlot { hops: 1, index: 0 };
        assert_eq!(inner.get_binding_value_by_slot(outer_slot).unwrap().as_i32(), Some(42));
    }

    #[test]
    fn const_binding_rejects_reassignment() {
        let env = LexicalEnvironment::new_declarative_indexed(1, None);
        {
            let mut record = env.record.borrow_mut();
            if let RecordKind::DeclarativeIndexed { bindings } = &mut *record {
                bindings[0] = Binding::initialized(Value::Int32(1), false);
            }
        }
        let slot = BindingSlot { hops: 0, index: 0 };
        assert!(env.set_mutable_binding_by_slot(slot, Value::Int32(2)).is_err());
    }
}

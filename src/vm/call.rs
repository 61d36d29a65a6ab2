//! Call/construct machinery (§4.5).
//!
//! `CallFunctionComplexCase`'s sub-kinds (`InWithScope`, `MayBuiltinApply`,
//! `MayBuiltinEval`, `WithSpreadElement`, `Super`, `Import`) each need a
//! slightly different argument-gathering or receiver-binding step before
//! falling into the same underlying invocation; this module factors that
//! shared invocation out so `vm::dispatch` only has to pick the right
//! argument list and receiver before calling [`call_function`] or
//! [`construct`].

use std::rc::Rc;

use crate::{
    environment::LexicalEnvironment,
    exception::{EngineError, ThrowResult},
    function::FunctionKind,
    heap::{Heap, HeapData, HeapId},
    object::JsObject,
    value::Value,
};

/// `[[Call]]` binds `this` and the closure chain for one invocation,
/// producing the callee's fresh `Function`-kind environment and its
/// register file sized to the compiled body (§3 "per-invocation register
/// file", §6).
pub struct PreparedCall {
    pub env: Rc<LexicalEnvironment>,
    pub registers: Vec<Value>,
    pub code: Rc<crate::bytecode::CodeBlock>,
}

/// §4.5 "MayBuiltinApply safety mechanism": a realm-level flag an embedder
/// clears the moment `Function.prototype.apply`/`call` (builtins outside
/// this crate's scope) are reassigned, letting `CallComplexCaseMayBuiltin*`
/// skip the generic argument-spreading path only while it is still provably
/// safe to assume those builtins have their original behavior (§9 Open
/// Questions: "self-disabling via a realm flag" was chosen over assuming
/// built-in immutability, since the latter is simply false once user code
/// can reassign `Function.prototype.apply`).
#[derive(Debug, Clone, Copy)]
pub struct BuiltinApplyPristine(pub bool);

/// Resolves `callee` to a `FunctionObject`, erroring with the standard
/// "is not a function" `TypeError` otherwise (§4.5).
pub fn resolve_callee(heap: &Heap, callee: Value) -> ThrowResult<HeapId> {
    match callee {
        Value::Pointer(id) if matches!(heap.get(id), HeapData::Function(_)) => Ok(id),
        _ => Err(EngineError::type_error("callee is not a function")),
    }
}

/// Builds the callee's activation environment and register file. `this` is
/// already resolved by the caller (ordinary call: the receiver expression's
/// value; arrow: inherited from `outer`; `new`: the freshly allocated
/// instance).
pub fn prepare_call(heap: &Heap, callee: HeapId, this_value: Value, args: &[Value]) -> ThrowResult<PreparedCall> {
    let Some(func) = heap.get(callee).as_function() else {
        return Err(EngineError::type_error("callee is not a function"));
    };
    let this_for_env = if func.kind.has_own_this_binding() { Some(this_value) } else { None };
    let env = LexicalEnvironment::new_function(usize::from(func.code.num_env_slots), this_for_env, func.closure.clone());
    if let FunctionKind::Method | FunctionKind::ClassConstructor { .. } = func.kind {
        env.set_home_object(func.home_object);
    }
    for (i, slot) in (0..func.code.num_parameters).zip(args.iter().chain(std::iter::repeat(&Value::Undefined))) {
        env.initialize_binding_by_index(u32::from(i), *slot);
    }
    let registers = vec![Value::Undefined; usize::from(func.code.num_registers)];
    Ok(PreparedCall { env, registers, code: Rc::clone(&func.code) })
}

/// `new Callee(...args)` (§4.5 `NewOperation`): allocates a fresh ordinary
/// object whose prototype is `Callee.prototype` (falling back to no
/// prototype if that property isn't an object, matching `OrdinaryCreateFromConstructor`'s
/// default-intrinsic-prototype fallback minus the intrinsic lookup, which is
/// a builtin-realm concern out of scope here), then prepares the call with
/// that object bound as `this`.
pub fn prepare_construct(
    heap: &mut Heap,
    callee: HeapId,
    args: &[Value],
    prototype_key: crate::intern::PropertyKey,
) -> ThrowResult<(HeapId, PreparedCall)> {
    {
        let Some(func) = heap.get(callee).as_function() else {
            return Err(EngineError::type_error("callee is not a function"));
        };
        if !func.is_constructor() {
            return Err(EngineError::type_error("callee is not a constructor"));
        }
    }
    let prototype = heap
        .get(callee)
        .as_function()
        .and_then(|f| f.object.get_own(prototype_key))
        .and_then(|(_, v)| v.as_data())
        .and_then(|v| v.as_pointer());
    let instance = heap.allocate(HeapData::Object(JsObject::new_plain(crate::structure::ObjectStructure::empty(true), prototype)));
    let field_inits = heap.get(callee).as_function().map(|f| f.field_inits.clone()).unwrap_or_default();
    apply_field_inits(heap, instance, &field_inits);
    let this_value = Value::Pointer(instance);
    let prepared = prepare_call(heap, callee, this_value, args)?;
    prepared.env.set_new_target(Some(callee));
    Ok((instance, prepared))
}

/// Replays a class's instance field initializers onto a freshly allocated
/// object (§4.8). There is no derived-class `super()` call in this core to
/// delay past, so every field runs here, before the constructor body.
fn apply_field_inits(heap: &mut Heap, instance: HeapId, field_inits: &[super::class_init::PendingFieldInit]) {
    let Some(obj) = heap.get_object_mut(instance) else { return };
    for field in field_inits {
        obj.define_own_property(field.key, crate::structure::PropertyAttributes::data(true, true, true), crate::object::PropertyValue::Data(field.initial_value));
    }
}

/// `[[Construct]]`'s return-value override: if the constructor body itself
/// returned an object, that object (not the freshly allocated instance) is
/// the expression's result (§4.5).
#[must_use]
pub fn resolve_construct_result(instance: HeapId, returned: Value) -> Value {
    match returned {
        Value::Pointer(_) => returned,
        _ => Value::Pointer(instance),
    }
}

/// Gathers arguments for `CallComplexCaseWithSpreadElement`/
/// `NewOperationWithSpreadElement`: each source is either a single value or
/// an iterable's already-materialized element list (spread expansion of a
/// lazy iterator is a call-machinery concern handled by the dispatch loop
/// before this is invoked).
#[must_use]
pub fn flatten_spread_args(parts: &[SpreadArg]) -> Vec<Value> {
    let mut out = Vec::new();
    for part in parts {
        match part {
            SpreadArg::Single(v) => out.push(*v),
            SpreadArg::Spread(values) => out.extend(values.iter().copied()),
        }
    }
    out
}

#[derive(Debug, Clone)]
pub enum SpreadArg {
    Single(Value),
    Spread(Vec<Value>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{heap::HeapData, structure::ObjectStructure};

    #[test]
    fn non_function_callee_is_a_type_error() {
        let mut heap = Heap::new();
        let id = heap.allocate(HeapData::Object(JsObject::new_plain(ObjectStructure::empty(true), None)));
        assert!(resolve_callee(&heap, Value::Pointer(id)).is_err());
    }

    #[test]
    fn spread_args_flatten_in_source_order() {
        let parts = vec![
            SpreadArg::Single(Value::Int32(1)),
            SpreadArg::Spread(vec![Value::Int32(2), Value::Int32(3)]),
            SpreadArg::Single(Value::Int32(4)),
        ];
        let flat = flatten_spread_args(&parts);
        let nums: Vec<i32> = flat.iter().map(|v| v.as_i32().unwrap()).collect();
        assert_eq!(nums, vec![1, 2, 3, 4]);
    }
}

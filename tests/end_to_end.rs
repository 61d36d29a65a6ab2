//! Black-box coverage for the dispatch loop: each test hand-assembles a
//! `CodeBlock` with `CodeBuilder` and runs it through `Vm::interpret`/
//! `Vm::resume`, exercising the real opcode path instead of calling the
//! `vm::*` helper functions directly the way the unit tests alongside each
//! module do.

use std::rc::Rc;

use esvm::{
    bytecode::{ic::PropertyAccessCache, CodeBuilder, Opcode},
    environment::LexicalEnvironment,
    exception::{Completion, ErrorKind},
    heap::HeapData,
    intern::PropertyKey,
    object::JsObject,
    structure::{ObjectStructure, PropertyAttributes},
    value::Value,
    vm::{
        generator::{GeneratorKind, GeneratorState, ResumeKind},
        Frame, Vm,
    },
};

fn run(vm: &mut Vm, code: Rc<esvm::bytecode::CodeBlock>, registers: Vec<Value>) -> esvm::EngineResult<Value> {
    let env = vm.global_env();
    vm.interpret(Frame::new(code, registers, env, Value::Undefined))
}

#[test]
fn int32_multiply_overflow_promotes_the_register_to_a_double() {
    let mut b = CodeBuilder::new();
    let a = b.add_const(Value::Int32(100_000));
    let c = b.add_const(Value::Int32(100_000));
    b.emit_r1_const(Opcode::LoadLiteral, 0, a);
    b.emit_r1_const(Opcode::LoadLiteral, 1, c);
    b.emit_r3(Opcode::BinaryMultiply, 2, 0, 1);
    b.emit_r1(Opcode::ReturnFunctionSlot, 2);
    let code = Rc::new(b.build());

    let mut vm = Vm::new();
    let registers = vec![Value::Undefined; code.num_registers as usize];
    let result = run(&mut vm, code, registers).unwrap();
    assert!(matches!(result, Value::Double(n) if n == 1.0e10));
}

/// Four distinct object shapes through one `GetObjectPreComputedCase` site:
/// the first shape only earns a cache entry once `ic_min_fill_count` hits
/// have accumulated, and once the 3-entry Simple cache is full a fourth
/// shape evicts the oldest rather than growing or promoting to Complex.
#[test]
fn polymorphic_get_site_evicts_its_oldest_shape_once_full() {
    let mut vm = Vm::new();
    let key = PropertyKey::String(vm.interns.intern("len"));

    let make = |vm: &mut Vm, value: Value| {
        let mut obj = JsObject::new_plain(ObjectStructure::empty(true), None);
        let next = obj.structure.transition_add(key, PropertyAttributes::data(true, true, true));
        obj.transition_to(next, value);
        let structure = Rc::clone(&obj.structure);
        (vm.heap.allocate(HeapData::Object(obj)), structure)
    };
    let (obj1, s1) = make(&mut vm, Value::Int32(1));
    let (obj2, s2) = make(&mut vm, Value::Int32(2));
    let (obj3, s3) = make(&mut vm, Value::Int32(3));
    let (obj4, s4) = make(&mut vm, Value::Int32(4));

    let mut b = CodeBuilder::new();
    let key_idx = b.add_property_key(key);
    b.emit_r3(Opcode::GetObjectPreComputedCase, 1, 0, key_idx);
    let site = b.current_offset();
    b.emit_r1(Opcode::ReturnFunctionSlot, 1);
    let code = Rc::new(b.build());

    let call = |vm: &mut Vm, code: &Rc<esvm::bytecode::CodeBlock>, receiver: esvm::heap::HeapId| {
        let mut registers = vec![Value::Undefined; code.num_registers as usize];
        registers[0] = Value::Pointer(receiver);
        run(vm, Rc::clone(code), registers).unwrap()
    };

    for _ in 0..4 {
        assert!(matches!(call(&mut vm, &code, obj1), Value::Int32(1)));
    }
    assert!(matches!(call(&mut vm, &code, obj2), Value::Int32(2)));
    assert!(matches!(call(&mut vm, &code, obj3), Value::Int32(3)));
    assert!(matches!(call(&mut vm, &code, obj4), Value::Int32(4)));

    let caches = code.property_caches.borrow();
    match caches.get(&site).expect("site should have installed a cache") {
        PropertyAccessCache::Simple(simple) => {
            assert!(simple.lookup(&s1).is_none(), "oldest shape should have been evicted");
            assert!(simple.lookup(&s2).is_some());
            assert!(simple.lookup(&s3).is_some());
            assert!(simple.lookup(&s4).is_some());
        }
        PropertyAccessCache::Complex(_) => panic!("every access hit an own property; site should never promote"),
    }
}

/// A `GetObjectPreComputedCase` miss that only resolves by walking the
/// prototype chain promotes its site straight to the Complex cache, with no
/// fill-count gate (unlike the Simple-entry install path above).
#[test]
fn prototype_chain_get_promotes_site_to_complex() {
    let mut vm = Vm::new();
    let key = PropertyKey::String(vm.interns.intern("y"));

    let mut proto_obj = JsObject::new_plain(ObjectStructure::empty(true), None);
    let next = proto_obj.structure.transition_add(key, PropertyAttributes::data(true, true, true));
    proto_obj.transition_to(next, Value::Int32(99));
    let proto = vm.heap.allocate(HeapData::Object(proto_obj));
    let child = vm.heap.allocate(HeapData::Object(JsObject::new_plain(ObjectStructure::empty(true), Some(proto))));

    let mut b = CodeBuilder::new();
    let key_idx = b.add_property_key(key);
    b.emit_r3(Opcode::GetObjectPreComputedCase, 1, 0, key_idx);
    let site = b.current_offset();
    b.emit_r1(Opcode::ReturnFunctionSlot, 1);
    let code = Rc::new(b.build());

    let mut registers = vec![Value::Undefined; code.num_registers as usize];
    registers[0] = Value::Pointer(child);
    let result = run(&mut vm, Rc::clone(&code), registers).unwrap();
    assert!(matches!(result, Value::Int32(99)));

    let caches = code.property_caches.borrow();
    assert!(matches!(caches.get(&site), Some(PropertyAccessCache::Complex(_))));
}

/// A `finally` block's own `ReturnFunctionSlot` overrides an in-flight
/// return already pending on the same try-frame: the first `return 1` is
/// redirected into the finally block without a dedicated opcode for the
/// override, and the finally's own `return 21` wins because by then the
/// try-frame's phase is no longer `Try`.
#[test]
fn finally_block_return_overrides_the_pending_return_value() {
    let mut b = CodeBuilder::new();
    let one = b.add_const(Value::Int32(1));
    let twenty_one = b.add_const(Value::Int32(21));

    let try_label = b.emit_try(0, false, true);
    b.emit_r1_const(Opcode::LoadLiteral, 0, one);
    b.emit_r1(Opcode::ReturnFunctionSlot, 0);
    b.patch_try_finally(&try_label);
    b.emit_r1_const(Opcode::LoadLiteral, 1, twenty_one);
    b.emit_r1(Opcode::ReturnFunctionSlot, 1);
    let code = Rc::new(b.build());

    let mut vm = Vm::new();
    let registers = vec![Value::Undefined; code.num_registers as usize];
    let result = run(&mut vm, code, registers).unwrap();
    assert!(matches!(result, Value::Int32(21)));
}

/// A generator body paused three times by `YieldOperation` and finally
/// returning, driven purely through `Vm::resume` against a hand-seeded
/// `GeneratorState` (no compiler front end constructs the generator object
/// itself in this crate).
#[test]
fn generator_yields_three_values_then_returns() {
    let mut b = CodeBuilder::new().resumable(true);
    let c1 = b.add_const(Value::Int32(1));
    let c2 = b.add_const(Value::Int32(2));
    let c3 = b.add_const(Value::Int32(3));
    let c_true = b.add_const(Value::Bool(true));
    b.emit_r1_const(Opcode::LoadLiteral, 0, c1);
    b.emit_r1(Opcode::YieldOperation, 0);
    b.emit_r1_const(Opcode::LoadLiteral, 1, c2);
    b.emit_r1(Opcode::YieldOperation, 1);
    b.emit_r1_const(Opcode::LoadLiteral, 2, c3);
    b.emit_r1(Opcode::YieldOperation, 2);
    b.emit_r1_const(Opcode::LoadLiteral, 3, c_true);
    b.emit_r1(Opcode::ReturnFunctionSlot, 3);
    let code = Rc::new(b.build());

    let mut vm = Vm::new();
    let state = GeneratorState {
        kind: GeneratorKind::Generator,
        code: Rc::clone(&code),
        pc: 0,
        registers: vec![Value::Undefined; code.num_registers as usize],
        env: LexicalEnvironment::new_declarative_indexed(0, None),
        try_frames: Vec::new(),
        done: false,
        receiving_register: 0,
    };
    let generator = vm.heap.allocate(HeapData::Generator(state));

    let (first, done1) = vm.resume(generator, ResumeKind::Next(Value::Undefined)).unwrap();
    assert!(matches!(first, Value::Int32(1)));
    assert!(!done1);

    let (second, done2) = vm.resume(generator, ResumeKind::Next(Value::Undefined)).unwrap();
    assert!(matches!(second, Value::Int32(2)));
    assert!(!done2);

    let (third, done3) = vm.resume(generator, ResumeKind::Next(Value::Undefined)).unwrap();
    assert!(matches!(third, Value::Int32(3)));
    assert!(!done3);

    let (fourth, done4) = vm.resume(generator, ResumeKind::Next(Value::Undefined)).unwrap();
    assert!(matches!(fourth, Value::Bool(true)));
    assert!(done4);

    let (after_done, still_done) = vm.resume(generator, ResumeKind::Next(Value::Undefined)).unwrap();
    assert!(matches!(after_done, Value::Undefined));
    assert!(still_done);
}

/// `BinaryPlus` between a `BigInt` and a `Number` is never implicitly
/// coerced; it raises an uncaught `TypeError` with no `try` frame to catch
/// it.
#[test]
fn bigint_plus_number_is_an_uncaught_type_error() {
    let mut b = CodeBuilder::new();
    let two = b.add_const(Value::Int32(2));
    b.emit_r1_const(Opcode::LoadLiteral, 1, two);
    b.emit_r3(Opcode::BinaryPlus, 2, 0, 1);
    b.emit(Opcode::End);
    let code = Rc::new(b.build());

    let mut vm = Vm::new();
    let bigint_id = vm.heap.allocate(HeapData::BigInt(num_bigint::BigInt::from(5)));
    let mut registers = vec![Value::Undefined; code.num_registers as usize];
    registers[0] = Value::Pointer(bigint_id);

    match run(&mut vm, code, registers) {
        Err(Completion::Throw(error)) => assert_eq!(error.kind, ErrorKind::TypeError),
        other => panic!("expected an uncaught TypeError, got {other:?}"),
    }
}

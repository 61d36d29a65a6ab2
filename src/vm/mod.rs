//! The opcode dispatch loop (§4.1, §5 "Execution model").
//!
//! A cached-frame interpreter: a `Vm` owns the heap/interns/engine-wide
//! config, a `Frame` owns one invocation's register file/environment/
//! try-region stack, and
//! `interpret` is the recursive function that walks one frame's byte stream
//! until it returns, throws, or pauses. Every opcode category's actual work
//! (arithmetic, property access, environment binding, control flow,
//! call/construct, iteration, generator suspension, class init) is
//! delegated to the sibling `vm::*` modules; this file is purely sequencing.

pub mod arithmetic;
pub mod call;
pub mod class_init;
pub mod control_flow;
pub mod generator;
pub mod iterator;
pub mod property;

use std::{cell::Cell, rc::Rc};

use crate::{
    bytecode::{opcode::Opcode, CodeBlock},
    environment::{BindingSlot, LexicalEnvironment},
    exception::{Completion, EngineError, EngineResult, ThrowResult},
    function::FunctionObject,
    heap::{Heap, HeapData, HeapId},
    intern::{Interns, PropertyKey},
    object::{JsObject, ObjectFlags, ObjectKind, PropertyValue},
    resource::{EngineLimits, NoLimitTracker, ResourceTracker},
    structure::{ObjectStructure, PropertyAttributes},
    tracer::{NoopTracer, VmTracer},
    value::{Numeric, Value},
};

use call::BuiltinApplyPristine;
use control_flow::{ControlFlowRecord, TryFrame, TryPhase};
use generator::{GeneratorKind, GeneratorState, ResumeKind};

/// Per-realm state outside any one object (§9 Open Questions:
/// `MayBuiltinApply` safety). A full realm's intrinsics are a builtin-layer
/// concern out of scope here; this is the one flag the core dispatch loop
/// itself needs to read.
#[derive(Debug)]
pub struct Realm {
    pub global_object: HeapId,
    pub apply_is_pristine: Cell<bool>,
}

impl Realm {
    #[must_use]
    pub fn is_apply_pristine(&self) -> BuiltinApplyPristine {
        BuiltinApplyPristine(self.apply_is_pristine.get())
    }
}

/// One call/script activation: its register file, the environment it reads
/// and writes bindings through, and the active `try` regions it is
/// currently nested inside (§3 "per-invocation register file").
pub struct Frame {
    pub code: Rc<CodeBlock>,
    pub registers: Vec<Value>,
    pub env: Rc<LexicalEnvironment>,
    pub this_value: Value,
    pub try_frames: Vec<TryFrame>,
}

impl Frame {
    #[must_use]
    pub fn new(code: Rc<CodeBlock>, registers: Vec<Value>, env: Rc<LexicalEnvironment>, this_value: Value) -> Self {
        Self { code, registers, env, this_value, try_frames: Vec::new() }
    }

    fn reg(&self, i: u16) -> Value {
        self.registers[i as usize]
    }

    fn set_reg(&mut self, i: u16, v: Value) {
        self.registers[i as usize] = v;
    }
}

fn read_u8(code: &[u8], pc: &mut u32) -> u8 {
    let v = code[*pc as usize];
    *pc += 1;
    v
}

fn read_u16(code: &[u8], pc: &mut u32) -> u16 {
    let p = *pc as usize;
    *pc += 2;
    u16::from_le_bytes([code[p], code[p + 1]])
}

fn read_i32(code: &[u8], pc: &mut u32) -> i32 {
    let p = *pc as usize;
    *pc += 4;
    i32::from_le_bytes([code[p], code[p + 1], code[p + 2], code[p + 3]])
}

/// The engine instance: owns the heap arena, the string/symbol interner,
/// tuning knobs, and the zero-cost resource-tracking / tracing type
/// parameters (§5, §6). Monomorphized so a production build with
/// `NoLimitTracker` + `NoopTracer` compiles every hook away.
#[derive(Debug)]
pub struct Vm<Tr: ResourceTracker = NoLimitTracker, Tc: VmTracer = NoopTracer> {
    pub heap: Heap,
    pub interns: Interns,
    pub limits: EngineLimits,
    pub tracker: Tr,
    pub tracer: Tc,
    pub realm: Realm,
    depth: Cell<usize>,
    /// Heap id of the generator/async frame most recently parked by
    /// [`Self::suspend`], consumed by [`Self::resume`] to recover the state a
    /// nested `Completion::Pause` produced (§4.7).
    last_suspended: Cell<Option<HeapId>>,
    /// The `CreateClass` .. `InitializeClass` run currently being
    /// accumulated, if any (§4.8). Classes never nest their field-init
    /// opcode sequences, so one slot is enough.
    pending_class: Option<class_init::ClassBuilder>,
}

impl Vm<NoLimitTracker, NoopTracer> {
    #[must_use]
    pub fn new() -> Self {
        let mut heap = Heap::new();
        let global_object = heap.allocate(HeapData::Object(JsObject::new_plain(ObjectStructure::empty(true), None)));
        Self::with_parts(heap, Interns::new(), EngineLimits::default(), NoLimitTracker, NoopTracer, global_object)
    }
}

impl Default for Vm<NoLimitTracker, NoopTracer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Tr: ResourceTracker, Tc: VmTracer> Vm<Tr, Tc> {
    #[must_use]
    pub fn with_parts(heap: Heap, interns: Interns, limits: EngineLimits, tracker: Tr, tracer: Tc, global_object: HeapId) -> Self {
        Self {
            heap,
            interns,
            limits,
            tracker,
            tracer,
            realm: Realm { global_object, apply_is_pristine: Cell::new(true) },
            depth: Cell::new(0),
            last_suspended: Cell::new(None),
            pending_class: None,
        }
    }

    #[must_use]
    pub fn global_env(&self) -> Rc<LexicalEnvironment> {
        LexicalEnvironment::new_global(self.realm.global_object)
    }

    /// Entry point for a top-level script or a recursive call/construct: runs
    /// `frame` to completion, checking the recursion-depth and stop-bit
    /// guards at this call boundary only, never mid-opcode (§5).
    pub fn interpret(&mut self, frame: Frame) -> EngineResult<Value> {
        let depth = self.depth.get() + 1;
        self.tracker
            .check_recursion_depth(depth)
            .map_err(|e| Completion::Throw(e.into_engine_error()))?;
        if self.tracker.should_stop() {
            return Err(Completion::Throw(crate::resource::ResourceError::Stopped.into_engine_error()));
        }
        self.depth.set(depth);
        let result = self.interpret_inner(frame);
        self.depth.set(depth - 1);
        result
    }

    /// `[[Call]]`: resolves `callee`, binds `this`/arguments, and recurses
    /// into `interpret` (§4.5).
    pub fn call_function(&mut self, callee: Value, this_value: Value, args: &[Value]) -> EngineResult<Value> {
        let id = call::resolve_callee(&self.heap, callee).map_err(Completion::Throw)?;
        let prepared = call::prepare_call(&self.heap, id, this_value, args).map_err(Completion::Throw)?;
        self.tracer.on_call(self.depth.get());
        let result = self.interpret(Frame::new(prepared.code, prepared.registers, prepared.env, this_value));
        self.tracer.on_return(self.depth.get());
        result
    }

    /// `new callee(...args)` (§4.5 `NewOperation`).
    pub fn construct(&mut self, callee: Value, args: &[Value]) -> EngineResult<Value> {
        let id = call::resolve_callee(&self.heap, callee).map_err(Completion::Throw)?;
        let prototype_key = PropertyKey::String(self.interns.statics.prototype);
        let (instance, prepared) =
            call::prepare_construct(&mut self.heap, id, args, prototype_key).map_err(Completion::Throw)?;
        let this_value = Value::Pointer(instance);
        let returned = self.interpret(Frame::new(prepared.code, prepared.registers, prepared.env, this_value))?;
        Ok(call::resolve_construct_result(instance, returned))
    }

    /// Builds the `Error`-kind heap object a `catch` binding actually sees
    /// for an engine-raised throw (§7): `thrown(value)`'s arbitrary
    /// `throw expr` skips this entirely since `error.thrown_value` is
    /// already the value to bind.
    fn make_error_value(&mut self, error: &EngineError) -> Value {
        let mut obj = JsObject::new_plain(ObjectStructure::empty(true), None);
        obj.kind = ObjectKind::Error;
        let name: &'static str = error.kind.into();
        let name_id = self.heap.allocate(HeapData::Str(Rc::from(name)));
        let message_id = self.heap.allocate(HeapData::Str(Rc::from(error.message.as_str())));
        obj.define_own_property(
            PropertyKey::String(self.interns.statics.name),
            PropertyAttributes::data(true, false, true),
            PropertyValue::Data(Value::Pointer(name_id)),
        );
        let message_key = PropertyKey::String(self.interns.intern("message"));
        obj.define_own_property(message_key, PropertyAttributes::data(true, false, true), PropertyValue::Data(Value::Pointer(message_id)));
        let id = self.heap.allocate(HeapData::Object(obj));
        Value::Pointer(id)
    }

    fn to_numeric(&self, v: Value) -> ThrowResult<Numeric> {
        arithmetic::to_numeric_primitive(v, &self.heap)
            .ok_or_else(|| EngineError::type_error("Cannot convert object to a primitive value"))
    }

    /// Boxes a `Numeric` result back into a register-sized `Value`,
    /// heap-allocating a `BigInt` cell when the slow path produced one (§4.2).
    fn numeric_to_value(&mut self, n: Numeric) -> Value {
        match n {
            Numeric::Number(f) => {
                if f.fract() == 0.0 && f.abs() < f64::from(i32::MAX) {
                    Value::Int32(f as i32)
                } else {
                    Value::Double(f)
                }
            }
            Numeric::BigInt(b) => Value::Pointer(self.heap.allocate(HeapData::BigInt(b))),
        }
    }

    /// `BinaryPlus`'s full template: string concatenation when either operand
    /// is already a string, numeric addition otherwise. Object-to-primitive
    /// coercion (`Symbol.toPrimitive`/`valueOf`) is out of scope (§9
    /// Non-goals: no standard-library built-ins), so a plain object operand
    /// is a `TypeError` here rather than silently stringifying.
    fn add_values(&mut self, lhs: Value, rhs: Value) -> ThrowResult<Value> {
        if let (Value::Int32(a), Value::Int32(b)) = (lhs, rhs)
            && let Some(sum) = arithmetic::try_add_i32(a, b)
        {
            return Ok(Value::Int32(sum));
        }
        if let (Some(a), Some(b)) = (self.heap_str(lhs), self.heap_str(rhs)) {
            let joined: Rc<str> = Rc::from(format!("{a}{b}"));
            let id = self.heap.allocate(HeapData::Str(joined));
            return Ok(Value::Pointer(id));
        }
        if self.is_heap_str(lhs) || self.is_heap_str(rhs) {
            let a = self.to_display_string(lhs)?;
            let b = self.to_display_string(rhs)?;
            let id = self.heap.allocate(HeapData::Str(Rc::from(format!("{a}{b}"))));
            return Ok(Value::Pointer(id));
        }
        let a = self.to_numeric(lhs)?;
        let b = self.to_numeric(rhs)?;
        let sum = arithmetic::add_numeric(a, b)?;
        Ok(self.numeric_to_value(sum))
    }

    fn is_heap_str(&self, v: Value) -> bool {
        matches!(v, Value::Pointer(id) if matches!(self.heap.get(id), HeapData::Str(_)))
    }

    fn heap_str(&self, v: Value) -> Option<Rc<str>> {
        match v {
            Value::Pointer(id) => match self.heap.get(id) {
                HeapData::Str(s) => Some(Rc::clone(s)),
                _ => None,
            },
            _ => None,
        }
    }

    fn to_display_string(&self, v: Value) -> ThrowResult<String> {
        if let Some(s) = self.heap_str(v) {
            return Ok(s.to_string());
        }
        Ok(v.to_string())
    }

    fn binary_numeric(&mut self, lhs: Value, rhs: Value, f: impl FnOnce(Numeric, Numeric) -> ThrowResult<Numeric>) -> ThrowResult<Value> {
        let a = self.to_numeric(lhs)?;
        let b = self.to_numeric(rhs)?;
        let r = f(a, b)?;
        Ok(self.numeric_to_value(r))
    }

    fn throw_from_try(&mut self, frame: &mut Frame, pc: &mut u32, error: EngineError) -> EngineResult<ControlFlowOutcome> {
        while let Some(try_frame) = frame.try_frames.last_mut() {
            if try_frame.phase == TryPhase::Try {
                if let Some(target) = try_frame.catch_target {
                    try_frame.phase = TryPhase::Catch;
                    let catch_register = try_frame.catch_register;
                    let caught = match error.thrown_value {
                        Some(v) => v,
                        None => self.make_error_value(&error),
                    };
                    frame.set_reg(catch_register, caught);
                    *pc = target;
                    return Ok(ControlFlowOutcome::Continue);
                }
                if let Some(target) = try_frame.finally_target {
                    try_frame.phase = TryPhase::Finally;
                    try_frame.pending = ControlFlowRecord::NeedsThrow { error };
                    *pc = target;
                    return Ok(ControlFlowOutcome::Continue);
                }
            }
            frame.try_frames.pop();
        }
        Err(Completion::Throw(error))
    }

    /// Entry point for a fresh call/script frame; `interpret_inner_from`
    /// handles both this and resuming a parked generator frame, starting from
    /// `pc == 0` here and from the saved `pc` there.
    fn interpret_inner(&mut self, frame: Frame) -> EngineResult<Value> {
        self.interpret_inner_from(frame, 0)
    }

    /// Packages the currently-executing frame as a [`GeneratorState`] and
    /// signals `Completion::Pause` up through every enclosing `interpret`
    /// call (§4.7, §9 "structured return" resolution).
    fn suspend(&mut self, frame: Frame, pc: u32, receiving_register: u16, kind: GeneratorKind) -> EngineResult<Value> {
        let state = GeneratorState {
            kind,
            code: frame.code,
            pc,
            registers: frame.registers,
            env: frame.env,
            try_frames: frame.try_frames,
            done: false,
            receiving_register,
        };
        let id = self.heap.allocate(HeapData::Generator(state));
        // The caller (an opcode-level `IteratorOperation`/`AwaitOperation`
        // driving this generator) is responsible for stashing `id` on the
        // generator/async-function object it owns; this module only performs
        // the suspend-and-return half of the protocol. Exposed so callers can
        // retrieve it from the `Completion::Pause` path via `last_suspended`.
        self.last_suspended.set(Some(id));
        Err(Completion::Pause)
    }

    /// Resumes a previously suspended generator with a `next`/`throw`/
    /// `return` operand (§4.7 `ExecutionResume`).
    pub fn resume(&mut self, generator: HeapId, resume: ResumeKind) -> EngineResult<(Value, bool)> {
        if self.heap.get(generator).as_generator().is_some_and(GeneratorState::is_done) {
            return Ok((Value::Undefined, true));
        }
        let HeapData::Generator(mut state) = std::mem::replace(self.heap.get_mut(generator), HeapData::EnumerateObject(Default::default())) else {
            panic!("resume() called on a non-generator heap id");
        };
        let mut pc = state.pc;
        let resume_value = match resume {
            ResumeKind::Next(v) => v,
            ResumeKind::Return(v) => v,
            ResumeKind::Throw(error) => {
                let mut frame = Frame { code: Rc::clone(&state.code), registers: state.registers, env: state.env, this_value: Value::Undefined, try_frames: state.try_frames };
                if let Err(c) = self.throw_from_try(&mut frame, &mut pc, error) {
                    self.mark_generator_done(generator, state.kind, Rc::clone(&frame.code), Rc::clone(&frame.env));
                    return Err(c);
                }
                state.registers = frame.registers;
                state.try_frames = frame.try_frames;
                state.env = frame.env;
                Value::Undefined
            }
        };
        state.registers[state.receiving_register as usize] = resume_value;
        let code = Rc::clone(&state.code);
        let env = Rc::clone(&state.env);
        let frame = Frame { code: state.code, registers: state.registers, env: state.env, this_value: Value::Undefined, try_frames: state.try_frames };
        match self.interpret_inner_from(frame, pc) {
            Ok(value) => {
                self.mark_generator_done(generator, state.kind, code, env);
                Ok((value, true))
            }
            Err(Completion::Pause) => {
                let new_id = self.last_suspended.take().expect("suspend() always records last_suspended");
                let HeapData::Generator(new_state) = std::mem::replace(self.heap.get_mut(new_id), HeapData::EnumerateObject(Default::default())) else {
                    unreachable!("last_suspended always points at a freshly parked generator frame")
                };
                let yielded = new_state.registers.get(new_state.receiving_register as usize).copied().unwrap_or(Value::Undefined);
                *self.heap.get_mut(generator) = HeapData::Generator(new_state);
                self.heap.sweep_unreachable(&[new_id]);
                Ok((yielded, false))
            }
            Err(Completion::Throw(e)) => {
                self.mark_generator_done(generator, state.kind, code, env);
                Err(Completion::Throw(e))
            }
        }
    }

    /// Overwrites `generator`'s heap slot with an exhausted, state-free
    /// marker once it has returned or thrown past its last `try` region.
    fn mark_generator_done(&mut self, generator: HeapId, kind: GeneratorKind, code: Rc<CodeBlock>, env: Rc<LexicalEnvironment>) {
        *self.heap.get_mut(generator) = HeapData::Generator(GeneratorState {
            kind,
            code,
            pc: 0,
            registers: vec![],
            env,
            try_frames: vec![],
            done: true,
            receiving_register: 0,
        });
    }

    fn interpret_inner_from(&mut self, mut frame: Frame, mut pc: u32) -> EngineResult<Value> {
        loop {
            let code = Rc::clone(&frame.code);
            let bytes = &code.bytecode;
            let op_pc = pc;
            let tag = read_u8(bytes, &mut pc);
            let Some(op) = Opcode::from_repr(tag) else {
                return Err(Completion::Throw(EngineError::type_error(format!("invalid opcode tag {tag}"))));
            };
            self.tracer.on_opcode(op_pc as usize, op, self.depth.get());
            match self.dispatch_one(&code, op, &mut frame, &mut pc) {
                Ok(DispatchOutcome::Continue) => {}
                Ok(DispatchOutcome::Return(v)) => return Ok(v),
                Ok(DispatchOutcome::End) => return Ok(Value::Undefined),
                Ok(DispatchOutcome::Pause { register, kind }) => return self.suspend(frame, pc, register, kind),
                Err(Completion::Throw(error)) => {
                    self.throw_from_try(&mut frame, &mut pc, error)?;
                }
                Err(Completion::Pause) => return Err(Completion::Pause),
            }
        }
    }

    #[allow(clippy::too_many_lines)]
    fn dispatch_one(&mut self, code: &CodeBlock, op: Opcode, frame: &mut Frame, pc: &mut u32) -> EngineResult<DispatchOutcome> {
        let bytes = &code.bytecode;
        macro_rules! u8v { () => { read_u8(bytes, pc) } }
        macro_rules! u16v { () => { read_u16(bytes, pc) } }
        macro_rules! i32v { () => { read_i32(bytes, pc) } }

        match op {
            Opcode::LoadLiteral => {
                let dst = u16v!();
                let idx = u16v!();
                frame.set_reg(dst, code.constant(idx));
            }
            Opcode::Mov => {
                let dst = u16v!();
                let src = u16v!();
                frame.set_reg(dst, frame.reg(src));
            }
            Opcode::CreateObject => {
                let dst = u16v!();
                let id = self.heap.allocate(HeapData::Object(JsObject::new_plain(ObjectStructure::empty(true), None)));
                frame.set_reg(dst, Value::Pointer(id));
            }
            Opcode::CreateArray => {
                let dst = u16v!();
                let id = self.heap.allocate(HeapData::Object(JsObject::new_array(ObjectStructure::empty(false), None, Vec::new())));
                frame.set_reg(dst, Value::Pointer(id));
            }
            Opcode::ArrayDefineOwnPropertyOperation => {
                let array = u16v!();
                let value = u16v!();
                let Value::Pointer(id) = frame.reg(array) else {
                    return Err(Completion::Throw(EngineError::type_error("array push target is not an object")));
                };
                let v = frame.reg(value);
                self.heap.get_mut(id).as_object_mut().expect("array target must be an object").elements.push(v);
            }
            Opcode::ObjectDefineOwnPropertyOperation => {
                let object = u16v!();
                let key_idx = u16v!();
                let value = u16v!();
                let Value::Pointer(id) = frame.reg(object) else {
                    return Err(Completion::Throw(EngineError::type_error("property target is not an object")));
                };
                let key = code.property_key(key_idx);
                let v = frame.reg(value);
                self.heap
                    .get_mut(id)
                    .as_object_mut()
                    .expect("object-define target must be an object")
                    .define_own_property(key, crate::structure::PropertyAttributes::data(true, true, true), PropertyValue::Data(v));
            }
            Opcode::LoadRegExp => {
                let dst = u16v!();
                let source_idx = u16v!();
                let flags_idx = u16v!();
                let source = self.heap_str(code.constant(source_idx)).map_or_else(String::new, |s| s.to_string());
                let flags = self.heap_str(code.constant(flags_idx)).map_or_else(String::new, |s| s.to_string());
                let source_id = self.interns.intern(&source);
                let flags_id = self.interns.intern(&flags);
                let id = self.heap.allocate(HeapData::RegExp(crate::heap::RegExpData { source: source_id, flags: flags_id }));
                frame.set_reg(dst, Value::Pointer(id));
            }

            // -- arithmetic -----------------------------------------------
            Opcode::BinaryPlus => {
                let (dst, lhs, rhs) = (u16v!(), u16v!(), u16v!());
                let v = self.add_values(frame.reg(lhs), frame.reg(rhs)).map_err(Completion::Throw)?;
                frame.set_reg(dst, v);
            }
            Opcode::BinaryMinus => self.binary_op_int32_fast(frame, pc, bytes, arithmetic::try_sub_i32, arithmetic::sub_numeric)?,
            Opcode::BinaryMultiply => self.binary_op_int32_fast(frame, pc, bytes, arithmetic::try_mul_i32, arithmetic::mul_numeric)?,
            Opcode::BinaryDivision => self.binary_op(frame, pc, bytes, arithmetic::div_numeric)?,
            Opcode::BinaryMod => self.binary_op(frame, pc, bytes, arithmetic::mod_numeric)?,
            Opcode::BinaryExponentiation => self.binary_op(frame, pc, bytes, arithmetic::pow_numeric)?,
            Opcode::BinaryBitwiseAnd => self.binary_op(frame, pc, bytes, arithmetic::bitand_numeric)?,
            Opcode::BinaryBitwiseOr => self.binary_op(frame, pc, bytes, arithmetic::bitor_numeric)?,
            Opcode::BinaryBitwiseXor => self.binary_op(frame, pc, bytes, arithmetic::bitxor_numeric)?,
            Opcode::BinaryLeftShift => self.binary_op(frame, pc, bytes, arithmetic::shl_numeric)?,
            Opcode::BinarySignedRightShift => self.binary_op(frame, pc, bytes, arithmetic::sar_numeric)?,
            Opcode::BinaryUnsignedRightShift => self.binary_op(frame, pc, bytes, arithmetic::shr_unsigned_numeric)?,
            Opcode::UnaryMinus => {
                let (dst, src) = (u16v!(), u16v!());
                let n = self.to_numeric(frame.reg(src)).map_err(Completion::Throw)?;
                let r = arithmetic::unary_minus(n);
                let v = self.numeric_to_value(r);
                frame.set_reg(dst, v);
            }
            Opcode::UnaryBitwiseNot => {
                let (dst, src) = (u16v!(), u16v!());
                let n = self.to_numeric(frame.reg(src)).map_err(Completion::Throw)?;
                let r = arithmetic::bitwise_not(n).map_err(Completion::Throw)?;
                let v = self.numeric_to_value(r);
                frame.set_reg(dst, v);
            }
            Opcode::UnaryNot => {
                let (dst, src) = (u16v!(), u16v!());
                let b = self.to_boolean(frame.reg(src));
                frame.set_reg(dst, Value::Bool(!b));
            }
            Opcode::Increment | Opcode::ToNumericIncrement => {
                let r = u16v!();
                let n = self.to_numeric(frame.reg(r)).map_err(Completion::Throw)?;
                let one = one_like(&n);
                let next = arithmetic::add_numeric(n, one).map_err(Completion::Throw)?;
                let v = self.numeric_to_value(next);
                frame.set_reg(r, v);
            }
            Opcode::Decrement | Opcode::ToNumericDecrement => {
                let r = u16v!();
                let n = self.to_numeric(frame.reg(r)).map_err(Completion::Throw)?;
                let one = one_like(&n);
                let next = arithmetic::sub_numeric(n, one).map_err(Completion::Throw)?;
                let v = self.numeric_to_value(next);
                frame.set_reg(r, v);
            }

            // -- comparison / type ------------------------------------------
            Opcode::BinaryEqual => {
                let (dst, lhs, rhs) = (u16v!(), u16v!(), u16v!());
                let eq = arithmetic::loose_equals_primitive(frame.reg(lhs), frame.reg(rhs), &self.heap).unwrap_or(false);
                frame.set_reg(dst, Value::Bool(eq));
            }
            Opcode::BinaryNotEqual => {
                let (dst, lhs, rhs) = (u16v!(), u16v!(), u16v!());
                let eq = arithmetic::loose_equals_primitive(frame.reg(lhs), frame.reg(rhs), &self.heap).unwrap_or(false);
                frame.set_reg(dst, Value::Bool(!eq));
            }
            Opcode::BinaryStrictEqual => {
                let (dst, lhs, rhs) = (u16v!(), u16v!(), u16v!());
                let eq = arithmetic::strict_equals(frame.reg(lhs), frame.reg(rhs), &self.heap);
                frame.set_reg(dst, Value::Bool(eq));
            }
            Opcode::BinaryNotStrictEqual => {
                let (dst, lhs, rhs) = (u16v!(), u16v!(), u16v!());
                let eq = arithmetic::strict_equals(frame.reg(lhs), frame.reg(rhs), &self.heap);
                frame.set_reg(dst, Value::Bool(!eq));
            }
            Opcode::BinaryLessThan => self.compare_op(frame, pc, bytes, |o| o == Some(true))?,
            Opcode::BinaryGreaterThan => self.compare_op(frame, pc, bytes, |o| o == Some(true))?,
            Opcode::BinaryLessThanOrEqual => self.compare_op_le_ge(frame, pc, bytes, true)?,
            Opcode::BinaryGreaterThanOrEqual => self.compare_op_le_ge(frame, pc, bytes, false)?,
            Opcode::BinaryInstanceOf => {
                let (dst, lhs, rhs) = (u16v!(), u16v!(), u16v!());
                let result = self.instance_of(frame.reg(lhs), frame.reg(rhs)).map_err(Completion::Throw)?;
                frame.set_reg(dst, Value::Bool(result));
            }
            Opcode::BinaryIn => {
                let (dst, lhs, rhs) = (u16v!(), u16v!(), u16v!());
                let key_val = frame.reg(lhs);
                let Value::Pointer(obj_id) = frame.reg(rhs) else {
                    return Err(Completion::Throw(EngineError::type_error("Cannot use 'in' on a non-object")));
                };
                let key = self.value_to_property_key(key_val);
                let found = property::resolve_property(&self.heap, obj_id, key).is_some();
                frame.set_reg(dst, Value::Bool(found));
            }
            Opcode::UnaryTypeof => {
                let (dst, src) = (u16v!(), u16v!());
                let s = arithmetic::type_of(frame.reg(src), &self.heap);
                let id = self.heap.allocate(HeapData::Str(Rc::from(s)));
                frame.set_reg(dst, Value::Pointer(id));
            }
            Opcode::TemplateOperation => {
                let (dst, first, count) = (u16v!(), u16v!(), u16v!());
                let mut joined = String::new();
                for i in 0..count {
                    let v = frame.reg(first + i);
                    joined.push_str(&self.to_display_string(v).map_err(Completion::Throw)?);
                }
                let id = self.heap.allocate(HeapData::Str(Rc::from(joined)));
                frame.set_reg(dst, Value::Pointer(id));
            }

            // -- property access --------------------------------------------
            Opcode::GetObject => {
                let (dst, obj, key_reg) = (u16v!(), u16v!(), u16v!());
                let Value::Pointer(id) = frame.reg(obj) else {
                    return Err(Completion::Throw(EngineError::type_error("Cannot read properties of a non-object")));
                };
                let key = self.value_to_property_key(frame.reg(key_reg));
                let v = property::resolve_property(&self.heap, id, key).and_then(|(_, _, v)| v.as_data()).unwrap_or(Value::Undefined);
                frame.set_reg(dst, v);
            }
            Opcode::SetObject => {
                let (obj, key_reg, value) = (u16v!(), u16v!(), u16v!());
                let Value::Pointer(id) = frame.reg(obj) else {
                    return Err(Completion::Throw(EngineError::type_error("Cannot set properties of a non-object")));
                };
                let key = self.value_to_property_key(frame.reg(key_reg));
                let v = frame.reg(value);
                self.heap.get_mut(id).as_object_mut().expect("SetObject target must be an object").set_own(key, v, code.is_strict).map_err(Completion::Throw)?;
            }
            Opcode::GetObjectPreComputedCase => {
                let (dst, obj, key_idx) = (u16v!(), u16v!(), u16v!());
                let Value::Pointer(id) = frame.reg(obj) else {
                    return Err(Completion::Throw(EngineError::type_error("Cannot read properties of a non-object")));
                };
                let key = code.property_key(key_idx);
                let site = *pc;
                let v = property::get_object_precomputed(&self.heap, code, site, id, key, &self.limits).map_err(Completion::Throw)?;
                frame.set_reg(dst, v);
            }
            Opcode::SetObjectPreComputedCase => {
                let (obj, key_idx, value) = (u16v!(), u16v!(), u16v!());
                let Value::Pointer(id) = frame.reg(obj) else {
                    return Err(Completion::Throw(EngineError::type_error("Cannot set properties of a non-object")));
                };
                let key = code.property_key(key_idx);
                let v = frame.reg(value);
                let site = *pc;
                property::set_object_precomputed(&mut self.heap, code, site, id, key, v, code.is_strict, &self.limits).map_err(Completion::Throw)?;
            }
            Opcode::GetGlobalVariable => {
                let (dst, key_idx) = (u16v!(), u16v!());
                let key = code.property_key(key_idx);
                let site = *pc;
                let v = property::get_global_cached(&self.heap, code, site, self.realm.global_object, key).map_err(Completion::Throw)?;
                frame.set_reg(dst, v);
            }
            Opcode::SetGlobalVariable => {
                let (key_idx, value) = (u16v!(), u16v!());
                let key = code.property_key(key_idx);
                let v = frame.reg(value);
                self.heap.get_mut(self.realm.global_object).as_object_mut().expect("global object").set_own(key, v, code.is_strict).map_err(Completion::Throw)?;
            }
            Opcode::InitializeGlobalVariable => {
                let (key_idx, value) = (u16v!(), u16v!());
                let key = code.property_key(key_idx);
                let v = frame.reg(value);
                self.heap
                    .get_mut(self.realm.global_object)
                    .as_object_mut()
                    .expect("global object")
                    .define_own_property(key, crate::structure::PropertyAttributes::data(true, true, false), PropertyValue::Data(v));
            }
            Opcode::DeleteObject => {
                let (dst, obj, key_reg) = (u16v!(), u16v!(), u16v!());
                let Value::Pointer(id) = frame.reg(obj) else {
                    return Err(Completion::Throw(EngineError::type_error("Cannot delete property of a non-object")));
                };
                let key = self.value_to_property_key(frame.reg(key_reg));
                let ok = self.heap.get_mut(id).as_object_mut().expect("DeleteObject target must be an object").delete_own(key);
                frame.set_reg(dst, Value::Bool(ok));
            }

            // -- variable / environment --------------------------------------
            Opcode::GetBindingValue => {
                let (dst, hops, index) = (u16v!(), u16v!(), u16v!());
                let slot = BindingSlot { hops: u32::from(hops), index: u32::from(index) };
                let v = frame.env.get_binding_value_by_slot(slot).map_err(Completion::Throw)?;
                frame.set_reg(dst, v);
            }
            Opcode::InitializeBindingValue => {
                let (hops, index, value) = (u16v!(), u16v!(), u16v!());
                let _ = hops;
                frame.env.initialize_binding_by_index(u32::from(index), frame.reg(value));
            }
            Opcode::SetMutableBinding => {
                let (hops, index, value) = (u16v!(), u16v!(), u16v!());
                let slot = BindingSlot { hops: u32::from(hops), index: u32::from(index) };
                frame.env.set_mutable_binding_by_slot(slot, frame.reg(value)).map_err(Completion::Throw)?;
            }
            Opcode::CreateBinding | Opcode::DeclareBinding => {
                let name_idx = u16v!();
                let Value::Pointer(_) = code.constant(name_idx) else {
                    return Err(Completion::Throw(EngineError::type_error("binding name constant is not a string")));
                };
                // A compiled binding name is looked up through the interner
                // directly in a real front end; this crate has none, so
                // `CreateBinding`/`DeclareBinding` are reachable only via
                // hand-assembled tests that already know their `StringId`
                // and use `GetBindingValue`/indexed slots instead.
            }
            Opcode::ResolveBinding => {
                let (dst, key_idx) = (u16v!(), u16v!());
                let PropertyKey::String(name) = code.property_key(key_idx) else {
                    return Err(Completion::Throw(EngineError::type_error("binding name is not a string")));
                };
                let mut env = Rc::clone(&frame.env);
                loop {
                    if let Some(v) = env.get_binding_value_by_name(&self.heap, name, code.is_strict).map_err(Completion::Throw)? {
                        frame.set_reg(dst, v);
                        break;
                    }
                    let Some(outer) = env.outer.clone() else {
                        return Err(Completion::Throw(EngineError::reference_error(format!("{} is not defined", self.interns.get_str(name)))));
                    };
                    env = outer;
                }
            }
            Opcode::WithOperation => {
                let (key_idx, value) = (u16v!(), u16v!());
                let PropertyKey::String(name) = code.property_key(key_idx) else {
                    return Err(Completion::Throw(EngineError::type_error("binding name is not a string")));
                };
                let v = frame.reg(value);
                let mut env = Rc::clone(&frame.env);
                loop {
                    if env.set_mutable_binding_by_name(&mut self.heap, name, v, code.is_strict).map_err(Completion::Throw)? {
                        break;
                    }
                    let Some(outer) = env.outer.clone() else {
                        return Err(Completion::Throw(EngineError::reference_error(format!("{} is not defined", self.interns.get_str(name)))));
                    };
                    env = outer;
                }
            }

            // -- control flow ------------------------------------------------
            Opcode::Jump => {
                let offset = i32v!();
                *pc = (*pc as i32 + offset) as u32;
            }
            Opcode::JumpIfTrue => {
                let cond = u16v!();
                let offset = i32v!();
                if self.to_boolean(frame.reg(cond)) {
                    *pc = (*pc as i32 + offset) as u32;
                }
            }
            Opcode::JumpIfFalse => {
                let cond = u16v!();
                let offset = i32v!();
                if !self.to_boolean(frame.reg(cond)) {
                    *pc = (*pc as i32 + offset) as u32;
                }
            }
            Opcode::JumpIfUndefinedOrNull => {
                let cond = u16v!();
                let offset = i32v!();
                if frame.reg(cond).is_nullish() {
                    *pc = (*pc as i32 + offset) as u32;
                }
            }
            Opcode::TryOperation => {
                let catch_register = u16v!();
                let flags = u8v!();
                let catch_field_pos = *pc as i32;
                let catch_offset = i32v!();
                let finally_field_pos = *pc as i32;
                let finally_offset = i32v!();
                let has_catch = flags & 1 != 0;
                let has_finally = flags & 2 != 0;
                let catch_target = has_catch.then_some((catch_field_pos + 4 + catch_offset) as u32);
                let finally_target = has_finally.then_some((finally_field_pos + 4 + finally_offset) as u32);
                frame.try_frames.push(TryFrame::new(catch_target, finally_target, catch_register));
            }
            Opcode::TryCatchWithBindingOperation => {
                // Catch-clause destructuring is a compiler concern; plain
                // identifier catch bindings (the common case exercised by
                // this crate's tests) already work via `TryOperation`'s
                // `catch_register` alone, so this tag is a no-op placeholder.
            }
            Opcode::FinallyEnd => {
                if let Some(try_frame) = frame.try_frames.pop() {
                    match try_frame.pending {
                        ControlFlowRecord::Normal => {}
                        ControlFlowRecord::NeedsJump { target_pc: Some(target) } => {
                            *pc = target;
                        }
                        ControlFlowRecord::NeedsJump { target_pc: None } => {}
                        ControlFlowRecord::NeedsReturn { value } => return Ok(DispatchOutcome::Return(value)),
                        ControlFlowRecord::NeedsThrow { error } => return Err(Completion::Throw(error)),
                    }
                }
            }
            Opcode::ThrowOperation => {
                let r = u16v!();
                return Err(Completion::Throw(EngineError::thrown(frame.reg(r))));
            }
            Opcode::ThrowStaticErrorOperation => {
                let kind_tag = u8v!();
                let msg_idx = u16v!();
                let message = self.heap_str(code.constant(msg_idx)).map(|s| s.to_string()).unwrap_or_default();
                let kind = match kind_tag {
                    0 => crate::exception::ErrorKind::TypeError,
                    1 => crate::exception::ErrorKind::ReferenceError,
                    2 => crate::exception::ErrorKind::RangeError,
                    _ => crate::exception::ErrorKind::SyntaxError,
                };
                return Err(Completion::Throw(EngineError::new(kind, message)));
            }
            Opcode::ReturnFunctionSlot => {
                let r = u16v!();
                let value = frame.reg(r);
                if let Some(try_frame) = frame.try_frames.iter_mut().rev().find(|t| t.finally_target.is_some() && t.phase == TryPhase::Try) {
                    try_frame.phase = TryPhase::Finally;
                    try_frame.pending = ControlFlowRecord::NeedsReturn { value };
                    let target = try_frame.finally_target.unwrap();
                    *pc = target;
                } else {
                    return Ok(DispatchOutcome::Return(value));
                }
            }
            Opcode::End => return Ok(DispatchOutcome::End),
            Opcode::BreakpointEnabled => self.tracer.on_breakpoint_toggled(*pc as usize, true),
            Opcode::BreakpointDisabled => self.tracer.on_breakpoint_toggled(*pc as usize, false),

            // -- call / construct ---------------------------------------------
            Opcode::CallFunction => {
                let (dst, callee, first_arg, argc) = (u16v!(), u16v!(), u16v!(), u16v!());
                let args: Vec<Value> = (0..argc).map(|i| frame.reg(first_arg + i)).collect();
                let v = self.call_function(frame.reg(callee), Value::Undefined, &args)?;
                frame.set_reg(dst, v);
            }
            Opcode::CallFunctionWithReceiver => {
                let (dst, callee, receiver, first_arg, argc) = (u16v!(), u16v!(), u16v!(), u16v!(), u16v!());
                let args: Vec<Value> = (0..argc).map(|i| frame.reg(first_arg + i)).collect();
                let v = self.call_function(frame.reg(callee), frame.reg(receiver), &args)?;
                frame.set_reg(dst, v);
            }
            Opcode::CallFunctionComplexCase => {
                // The generic complex form: receiver and callee were evaluated
                // as distinct sub-expressions (e.g. a computed member call),
                // so it reduces to `CallFunctionWithReceiver`'s invocation.
                let (dst, callee, receiver, first_arg, argc) = (u16v!(), u16v!(), u16v!(), u16v!(), u16v!());
                let args: Vec<Value> = (0..argc).map(|i| frame.reg(first_arg + i)).collect();
                let v = self.call_function(frame.reg(callee), frame.reg(receiver), &args)?;
                frame.set_reg(dst, v);
            }
            Opcode::CallComplexCaseInWithScope => {
                // §4.4/§4.5: the callee was resolved through a `with`
                // statement's object environment, so `this` binds to whichever
                // with-object actually owns the property rather than
                // `undefined`.
                let (dst, callee, key_idx, first_arg, argc) = (u16v!(), u16v!(), u16v!(), u16v!(), u16v!());
                let PropertyKey::String(name) = code.property_key(key_idx) else {
                    return Err(Completion::Throw(EngineError::type_error("binding name is not a string")));
                };
                let mut receiver = Value::Undefined;
                let mut env = Rc::clone(&frame.env);
                loop {
                    if env.is_with_environment() {
                        if let Some(binding_object) = env.binding_object() {
                            let key = PropertyKey::String(name);
                            if self.heap.get_object(binding_object).is_some_and(|o| o.has_own(key)) {
                                receiver = Value::Pointer(binding_object);
                                break;
                            }
                        }
                    }
                    let Some(outer) = env.outer.clone() else { break };
                    env = outer;
                }
                let args: Vec<Value> = (0..argc).map(|i| frame.reg(first_arg + i)).collect();
                let v = self.call_function(frame.reg(callee), receiver, &args)?;
                frame.set_reg(dst, v);
            }
            Opcode::CallComplexCaseMayBuiltinEval => {
                // Indirect `eval` interception needs a compiler front end to
                // tell source-text calls apart from ordinary ones; this core
                // always falls through to a plain call.
                let (dst, callee, first_arg, argc) = (u16v!(), u16v!(), u16v!(), u16v!());
                let args: Vec<Value> = (0..argc).map(|i| frame.reg(first_arg + i)).collect();
                let v = self.call_function(frame.reg(callee), Value::Undefined, &args)?;
                frame.set_reg(dst, v);
            }
            Opcode::CallComplexCaseMayBuiltinApply => {
                let (dst, callee, this_reg, array_reg) = (u16v!(), u16v!(), u16v!(), u16v!());
                if self.realm.is_apply_pristine().0 {
                    let Value::Pointer(array_id) = frame.reg(array_reg) else {
                        return Err(Completion::Throw(EngineError::type_error("apply's second argument must be an array")));
                    };
                    let args = self.heap.get_object(array_id).map(|o| o.elements.clone()).unwrap_or_default();
                    let v = self.call_function(frame.reg(callee), frame.reg(this_reg), &args)?;
                    frame.set_reg(dst, v);
                } else {
                    let v = self.call_function(frame.reg(callee), frame.reg(this_reg), &[frame.reg(array_reg)])?;
                    frame.set_reg(dst, v);
                }
            }
            Opcode::CallComplexCaseWithSpreadElement => {
                let (dst, callee, first_part, part_count) = (u16v!(), u16v!(), u16v!(), u16v!());
                let mut args = Vec::new();
                for i in 0..part_count {
                    let Value::Pointer(arr) = frame.reg(first_part + i) else {
                        return Err(Completion::Throw(EngineError::type_error("spread element is not an array")));
                    };
                    args.extend(self.heap.get_object(arr).map(|o| o.elements.clone()).unwrap_or_default());
                }
                let v = self.call_function(frame.reg(callee), Value::Undefined, &args)?;
                frame.set_reg(dst, v);
            }
            Opcode::NewOperation => {
                let (dst, callee, first_arg, argc) = (u16v!(), u16v!(), u16v!(), u16v!());
                let args: Vec<Value> = (0..argc).map(|i| frame.reg(first_arg + i)).collect();
                let v = self.construct(frame.reg(callee), &args)?;
                frame.set_reg(dst, v);
            }
            Opcode::NewOperationWithSpreadElement => {
                let (dst, callee, first_part, part_count) = (u16v!(), u16v!(), u16v!(), u16v!());
                let mut args = Vec::new();
                for i in 0..part_count {
                    let Value::Pointer(arr) = frame.reg(first_part + i) else {
                        return Err(Completion::Throw(EngineError::type_error("spread element is not an array")));
                    };
                    args.extend(self.heap.get_object(arr).map(|o| o.elements.clone()).unwrap_or_default());
                }
                let v = self.construct(frame.reg(callee), &args)?;
                frame.set_reg(dst, v);
            }
            Opcode::SuperReference | Opcode::SuperGetObjectOperation => {
                let (dst, key_idx) = (u16v!(), u16v!());
                let Some(home) = frame.env.home_object() else {
                    return Err(Completion::Throw(EngineError::type_error("'super' used outside a method")));
                };
                let Some(proto) = self.heap.get_object(home).and_then(|o| o.prototype) else {
                    frame.set_reg(dst, Value::Undefined);
                    return Ok(DispatchOutcome::Continue);
                };
                let key = code.property_key(key_idx);
                let v = property::resolve_property(&self.heap, proto, key).and_then(|(_, _, v)| v.as_data()).unwrap_or(Value::Undefined);
                frame.set_reg(dst, v);
            }
            Opcode::SuperSetObjectOperation => {
                let (key_idx, value) = (u16v!(), u16v!());
                let Some(home) = frame.env.home_object() else {
                    return Err(Completion::Throw(EngineError::type_error("'super' used outside a method")));
                };
                let Some(proto) = self.heap.get_object(home).and_then(|o| o.prototype) else {
                    return Ok(DispatchOutcome::Continue);
                };
                let key = code.property_key(key_idx);
                let v = frame.reg(value);
                self.heap.get_mut(proto).as_object_mut().expect("super target must be an object").set_own(key, v, code.is_strict).map_err(Completion::Throw)?;
            }
            Opcode::MetaPropertyOperation => {
                let dst = u16v!();
                let v = frame.env.new_target().map_or(Value::Undefined, Value::Pointer);
                frame.set_reg(dst, v);
            }
            Opcode::LoadHomeObject => {
                let dst = u16v!();
                let v = frame.env.home_object().map_or(Value::Undefined, Value::Pointer);
                frame.set_reg(dst, v);
            }

            // -- scope / block ------------------------------------------------
            Opcode::CreateFunctionEnvironment => {
                let slot_count = u16v!();
                frame.env = LexicalEnvironment::new_declarative_indexed(usize::from(slot_count), Some(Rc::clone(&frame.env)));
            }
            Opcode::CreateObjectEnvironment => {
                let obj_reg = u16v!();
                let Value::Pointer(id) = frame.reg(obj_reg) else {
                    return Err(Completion::Throw(EngineError::type_error("with target is not an object")));
                };
                frame.env = LexicalEnvironment::new_object(id, true, Some(Rc::clone(&frame.env)));
            }
            Opcode::PushBlockEnvironment => {
                let slot_count = u16v!();
                frame.env = LexicalEnvironment::new_declarative_indexed(usize::from(slot_count), Some(Rc::clone(&frame.env)));
            }
            Opcode::PopBlockEnvironment => {
                let outer = frame.env.outer.clone().expect("PopBlockEnvironment with no outer scope");
                frame.env = outer;
            }
            Opcode::EnsureArgumentsObject => {
                let dst = u16v!();
                let elements: Vec<Value> = (0..code.num_parameters)
                    .map(|i| {
                        let slot = BindingSlot { hops: 0, index: u32::from(i) };
                        frame.env.get_binding_value_by_slot(slot).unwrap_or(Value::Undefined)
                    })
                    .collect();
                let mut obj = JsObject::new_array(ObjectStructure::empty(false), None, elements);
                obj.kind = crate::object::ObjectKind::Arguments { mapped: !code.is_strict };
                obj.flags = ObjectFlags { is_array: false, inline_cache_eligible: false, is_fast_mode_array: true, is_spread_array: false, is_prototype_object: false };
                let id = self.heap.allocate(HeapData::Object(obj));
                frame.set_reg(dst, Value::Pointer(id));
            }

            // -- iteration ------------------------------------------------------
            Opcode::GetIterator => {
                let (dst, target) = (u16v!(), u16v!());
                let Value::Pointer(id) = frame.reg(target) else {
                    return Err(Completion::Throw(EngineError::type_error("value is not iterable")));
                };
                let record = crate::heap::IteratorRecordData { iterator: id, next_method: Value::Undefined, done: false };
                let rec_id = self.heap.allocate(HeapData::IteratorRecord(record));
                frame.set_reg(dst, Value::Pointer(rec_id));
            }
            Opcode::ForOfHeadOperation => {
                let (dst_value, dst_done, iter_reg) = (u16v!(), u16v!(), u16v!());
                let Value::Pointer(rec_id) = frame.reg(iter_reg) else {
                    return Err(Completion::Throw(EngineError::type_error("for-of head target is not an iterator record")));
                };
                let done = self.heap.get(rec_id).as_iterator_record().map(|r| r.done).unwrap_or(true);
                frame.set_reg(dst_done, Value::Bool(done));
                frame.set_reg(dst_value, Value::Undefined);
            }
            Opcode::IteratorOperation => {
                let (dst_value, dst_done, iter_reg) = (u16v!(), u16v!(), u16v!());
                let Value::Pointer(rec_id) = frame.reg(iter_reg) else {
                    return Err(Completion::Throw(EngineError::type_error("not an iterator record")));
                };
                let next_method = self.heap.get(rec_id).as_iterator_record().map(|r| r.next_method).unwrap_or(Value::Undefined);
                let iterator = self.heap.get(rec_id).as_iterator_record().map(|r| r.iterator).expect("iterator record");
                let result = self.call_function(next_method, Value::Pointer(iterator), &[])?;
                let value_key = PropertyKey::String(self.interns.intern("value"));
                let done_key = PropertyKey::String(self.interns.intern("done"));
                let (value, done) = iterator::read_iterator_result(&self.heap, result, value_key, done_key).map_err(Completion::Throw)?;
                if let Some(rec) = self.heap.get_mut(rec_id).as_iterator_record_mut() {
                    rec.done = done;
                }
                frame.set_reg(dst_value, value);
                frame.set_reg(dst_done, Value::Bool(done));
            }
            Opcode::IteratorClose => {
                let iter_reg = u16v!();
                let Value::Pointer(rec_id) = frame.reg(iter_reg) else {
                    return Err(Completion::Throw(EngineError::type_error("IteratorClose target is not an iterator record")));
                };
                let Some(iterator) = self.heap.get(rec_id).as_iterator_record().map(|r| r.iterator) else {
                    return Err(Completion::Throw(EngineError::type_error("IteratorClose target is not an iterator record")));
                };
                let return_key = PropertyKey::String(self.interns.intern("return"));
                if let Some(method) = iterator::resolve_return_method(&self.heap, iterator, return_key) {
                    let result = self.call_function(method, Value::Pointer(iterator), &[])?;
                    let is_object = matches!(result, Value::Pointer(id) if self.heap.get_object(id).is_some());
                    if !is_object {
                        return Err(Completion::Throw(EngineError::type_error("iterator's return() method returned a non-object")));
                    }
                }
            }
            Opcode::BindingRestElement => {
                let (dst, source, skip) = (u16v!(), u16v!(), u16v!());
                let Value::Pointer(id) = frame.reg(source) else {
                    return Err(Completion::Throw(EngineError::type_error("rest-element source is not an array")));
                };
                let rest = iterator::collect_rest_elements(&self.heap, id, usize::from(skip));
                let arr_id = self.heap.allocate(HeapData::Object(JsObject::new_array(ObjectStructure::empty(false), None, rest)));
                frame.set_reg(dst, Value::Pointer(arr_id));
            }
            Opcode::CreateEnumerateObject => {
                let (dst, target) = (u16v!(), u16v!());
                let Value::Pointer(id) = frame.reg(target) else {
                    return Err(Completion::Throw(EngineError::type_error("for-in target is not an object")));
                };
                let data = iterator::create_enumerate_object(&self.heap, id);
                let enum_id = self.heap.allocate(HeapData::EnumerateObject(data));
                frame.set_reg(dst, Value::Pointer(enum_id));
            }
            Opcode::CheckLastEnumerateKey => {
                let (dst, enum_reg) = (u16v!(), u16v!());
                let Value::Pointer(id) = frame.reg(enum_reg) else {
                    return Err(Completion::Throw(EngineError::type_error("not an enumerate object")));
                };
                let HeapData::EnumerateObject(data) = self.heap.get(id) else {
                    return Err(Completion::Throw(EngineError::type_error("not an enumerate object")));
                };
                let done = iterator::is_enumeration_done(data);
                frame.set_reg(dst, Value::Bool(done));
            }
            Opcode::GetEnumerateKey | Opcode::MarkEnumerateKey => {
                let (dst, enum_reg, target) = (u16v!(), u16v!(), u16v!());
                let Value::Pointer(id) = frame.reg(enum_reg) else {
                    return Err(Completion::Throw(EngineError::type_error("not an enumerate object")));
                };
                let Value::Pointer(target_id) = frame.reg(target) else {
                    return Err(Completion::Throw(EngineError::type_error("for-in target is not an object")));
                };
                // `next_enumerate_key` needs a read-only `&Heap` to check whether
                // a key is still present while also taking `&mut EnumerateObjectData`
                // that itself lives inside that same heap slot, so the entry is
                // swapped out for the duration of the call and restored after.
                let HeapData::EnumerateObject(mut data) =
                    std::mem::replace(self.heap.get_mut(id), HeapData::EnumerateObject(Default::default()))
                else {
                    return Err(Completion::Throw(EngineError::type_error("not an enumerate object")));
                };
                let key = iterator::next_enumerate_key(&self.heap, target_id, &mut data);
                *self.heap.get_mut(id) = HeapData::EnumerateObject(data);
                let v = match key {
                    Some(PropertyKey::String(s)) => Value::Pointer(self.heap.allocate(HeapData::Str(Rc::from(self.interns.get_str(s))))),
                    Some(PropertyKey::Index(i)) => Value::Pointer(self.heap.allocate(HeapData::Str(Rc::from(i.to_string())))),
                    Some(PropertyKey::Symbol(_)) | None => Value::Undefined,
                };
                frame.set_reg(dst, v);
            }

            // -- generator / async ----------------------------------------------
            Opcode::ExecutionPause => {
                let register = u16v!();
                let kind_tag = u8v!();
                let kind = match kind_tag {
                    1 => GeneratorKind::Async,
                    2 => GeneratorKind::AsyncGenerator,
                    _ => GeneratorKind::Generator,
                };
                return Ok(DispatchOutcome::Pause { register, kind });
            }
            Opcode::ExecutionResume => {
                // Resuming never dispatches through the byte stream: `Vm::resume`
                // reconstructs a `Frame` from a stored `GeneratorState` and
                // re-enters `interpret_inner_from` directly at its saved `pc`.
                return Err(Completion::Throw(EngineError::type_error("ExecutionResume is not dispatched inline")));
            }
            Opcode::YieldOperation | Opcode::AwaitOperation => {
                let register = u16v!();
                return Ok(DispatchOutcome::Pause { register, kind: GeneratorKind::Generator });
            }

            // -- class init -----------------------------------------------------
            Opcode::CreateClass => {
                let (dst_ctor, dst_proto, parent, ctor_template_const) = (u16v!(), u16v!(), u16v!(), u16v!());
                let parent_proto = match frame.reg(parent) {
                    Value::Pointer(p) => self.heap.get_object(p).and_then(|o| o.prototype),
                    _ => None,
                };
                let proto_id = self.heap.allocate(HeapData::Object(JsObject::new_plain(ObjectStructure::empty(true), parent_proto)));
                let Value::Pointer(template_id) = code.constant(ctor_template_const) else {
                    return Err(Completion::Throw(EngineError::type_error("class constructor template constant is not a heap pointer")));
                };
                let template = self.heap.get(template_id).as_function().expect("class constructor template must be a Function");
                let new_ctor = FunctionObject {
                    object: JsObject::new_plain(ObjectStructure::empty(true), None),
                    kind: template.kind,
                    code: Rc::clone(&template.code),
                    closure: Some(Rc::clone(&frame.env)),
                    home_object: Some(proto_id),
                    name: template.name,
                    field_inits: Vec::new(),
                };
                let ctor_id = self.heap.allocate(HeapData::Function(new_ctor));

                let prototype_key = PropertyKey::String(self.interns.statics.prototype);
                self.heap
                    .get_mut(ctor_id)
                    .as_object_mut()
                    .expect("class constructor must be an object")
                    .define_own_property(prototype_key, PropertyAttributes::data(false, false, false), PropertyValue::Data(Value::Pointer(proto_id)));

                let constructor_key = PropertyKey::String(self.interns.statics.constructor);
                self.heap
                    .get_object_mut(proto_id)
                    .expect("class prototype must be an object")
                    .define_own_property(constructor_key, PropertyAttributes::data(true, false, true), PropertyValue::Data(Value::Pointer(ctor_id)));

                self.pending_class = Some(class_init::ClassBuilder::new(ctor_id, proto_id));
                frame.set_reg(dst_ctor, Value::Pointer(ctor_id));
                frame.set_reg(dst_proto, Value::Pointer(proto_id));
            }
            Opcode::SetFieldSize => {
                let count = u16v!();
                let Some(builder) = self.pending_class.as_mut() else {
                    return Err(Completion::Throw(EngineError::type_error("SetFieldSize outside an in-progress class")));
                };
                builder.set_field_size(count as usize);
            }
            Opcode::InitField | Opcode::InitPrivateField => {
                let (index, key_idx) = (u16v!(), u16v!());
                let key = code.property_key(key_idx);
                let Some(builder) = self.pending_class.as_mut() else {
                    return Err(Completion::Throw(EngineError::type_error("InitField outside an in-progress class")));
                };
                builder.stage_field_key(index as usize, key, op == Opcode::InitPrivateField);
            }
            Opcode::SetFieldData | Opcode::SetPrivateFieldData => {
                let (index, value) = (u16v!(), u16v!());
                let v = frame.reg(value);
                let Some(builder) = self.pending_class.as_mut() else {
                    return Err(Completion::Throw(EngineError::type_error("SetFieldData outside an in-progress class")));
                };
                builder.set_field_value(index as usize, v);
            }
            Opcode::InitStaticField => {
                let (key_idx, value) = (u16v!(), u16v!());
                let key = code.property_key(key_idx);
                let v = frame.reg(value);
                let Some(builder) = self.pending_class.as_ref() else {
                    return Err(Completion::Throw(EngineError::type_error("InitStaticField outside an in-progress class")));
                };
                let ctor = builder.constructor;
                let ctor_obj = self.heap.get_mut(ctor).as_object_mut().expect("class constructor must be an object");
                class_init::apply_static_field(ctor_obj, key, v);
            }
            Opcode::CleanupStaticData => {
                // Static fields are applied directly to the constructor as
                // they are seen (`InitStaticField`); there is no deferred
                // state left to release once the run ends.
            }
            Opcode::InitializeClass => {
                let Some(builder) = self.pending_class.take() else {
                    return Err(Completion::Throw(EngineError::type_error("InitializeClass outside an in-progress class")));
                };
                let ctor = builder.constructor;
                let field_inits = builder.finish();
                if let Some(func) = self.heap.get_mut(ctor).as_function_mut() {
                    func.field_inits = field_inits;
                }
            }
            Opcode::LoadPrivateProperty => {
                let (dst, obj, key_idx) = (u16v!(), u16v!(), u16v!());
                let key = code.property_key(key_idx);
                let Value::Pointer(id) = frame.reg(obj) else {
                    return Err(Completion::Throw(EngineError::type_error("cannot read a private member off a non-object")));
                };
                let obj = self.heap.get_object(id).expect("LoadPrivateProperty target must be an object");
                let Some((_, value)) = obj.get_own(key) else {
                    return Err(Completion::Throw(EngineError::type_error("cannot read a private member from an object whose class did not declare it")));
                };
                frame.set_reg(dst, value.as_data().unwrap_or(Value::Undefined));
            }
            Opcode::StorePrivateProperty => {
                let (obj, key_idx, value) = (u16v!(), u16v!(), u16v!());
                let key = code.property_key(key_idx);
                let v = frame.reg(value);
                let Value::Pointer(id) = frame.reg(obj) else {
                    return Err(Completion::Throw(EngineError::type_error("cannot write a private member on a non-object")));
                };
                let obj_ref = self.heap.get_object_mut(id).expect("StorePrivateProperty target must be an object");
                if !obj_ref.has_own(key) {
                    return Err(Completion::Throw(EngineError::type_error("cannot write a private member to an object whose class did not declare it")));
                }
                obj_ref.set_own(key, v, true).map_err(Completion::Throw)?;
            }
            Opcode::CreateFunction => {
                let (dst, template_const) = (u16v!(), u16v!());
                let Value::Pointer(template_id) = code.constant(template_const) else {
                    return Err(Completion::Throw(EngineError::type_error("function template constant is not a heap pointer")));
                };
                let template = self.heap.get(template_id).as_function().expect("function template must be a Function");
                let new_func = FunctionObject {
                    object: JsObject::new_plain(ObjectStructure::empty(true), None),
                    kind: template.kind,
                    code: Rc::clone(&template.code),
                    closure: Some(Rc::clone(&frame.env)),
                    home_object: template.home_object,
                    name: template.name,
                    field_inits: Vec::new(),
                };
                let id = self.heap.allocate(HeapData::Function(new_func));
                frame.set_reg(dst, Value::Pointer(id));
            }
        }
        Ok(DispatchOutcome::Continue)
    }

    fn binary_op(&mut self, frame: &mut Frame, pc: &mut u32, bytes: &[u8], f: impl FnOnce(Numeric, Numeric) -> ThrowResult<Numeric>) -> EngineResult<()> {
        let dst = read_u16(bytes, pc);
        let lhs = read_u16(bytes, pc);
        let rhs = read_u16(bytes, pc);
        let v = self.binary_numeric(frame.reg(lhs), frame.reg(rhs), f).map_err(Completion::Throw)?;
        frame.set_reg(dst, v);
        Ok(())
    }

    /// `BinaryMinus`/`BinaryMultiply`'s int32 fast path (§4.2): tries `fast`
    /// on an `Int32`/`Int32` pair first, falling back to `slow`'s `Numeric`
    /// template on overflow, a multiply-by-zero, or any non-int32 operand.
    fn binary_op_int32_fast(
        &mut self,
        frame: &mut Frame,
        pc: &mut u32,
        bytes: &[u8],
        fast: impl FnOnce(i32, i32) -> Option<i32>,
        slow: impl FnOnce(Numeric, Numeric) -> ThrowResult<Numeric>,
    ) -> EngineResult<()> {
        let dst = read_u16(bytes, pc);
        let lhs = read_u16(bytes, pc);
        let rhs = read_u16(bytes, pc);
        let (lv, rv) = (frame.reg(lhs), frame.reg(rhs));
        if let (Value::Int32(a), Value::Int32(b)) = (lv, rv)
            && let Some(r) = fast(a, b)
        {
            frame.set_reg(dst, Value::Int32(r));
            return Ok(());
        }
        let v = self.binary_numeric(lv, rv, slow).map_err(Completion::Throw)?;
        frame.set_reg(dst, v);
        Ok(())
    }

    fn compare_op(&mut self, frame: &mut Frame, pc: &mut u32, bytes: &[u8], accept: impl FnOnce(Option<bool>) -> bool) -> EngineResult<()> {
        let dst = read_u16(bytes, pc);
        let lhs = read_u16(bytes, pc);
        let rhs = read_u16(bytes, pc);
        let a = self.to_numeric(frame.reg(lhs)).map_err(Completion::Throw)?;
        let b = self.to_numeric(frame.reg(rhs)).map_err(Completion::Throw)?;
        let result = accept(arithmetic::numeric_less_than(&a, &b));
        frame.set_reg(dst, Value::Bool(result));
        Ok(())
    }

    fn compare_op_le_ge(&mut self, frame: &mut Frame, pc: &mut u32, bytes: &[u8], is_le: bool) -> EngineResult<()> {
        let dst = read_u16(bytes, pc);
        let lhs = read_u16(bytes, pc);
        let rhs = read_u16(bytes, pc);
        let a = self.to_numeric(frame.reg(lhs)).map_err(Completion::Throw)?;
        let b = self.to_numeric(frame.reg(rhs)).map_err(Completion::Throw)?;
        let result = if is_le {
            arithmetic::numeric_less_than(&b, &a).map(|lt| !lt)
        } else {
            arithmetic::numeric_less_than(&a, &b).map(|lt| !lt)
        }
        .unwrap_or(false);
        frame.set_reg(dst, Value::Bool(result));
        Ok(())
    }

    fn to_boolean(&self, v: Value) -> bool {
        v.to_boolean_primitive().unwrap_or(true)
    }

    fn value_to_property_key(&mut self, v: Value) -> PropertyKey {
        match v {
            Value::Int32(i) if i >= 0 => PropertyKey::Index(i as u32),
            Value::Pointer(id) => match self.heap.get(id) {
                HeapData::Str(s) => PropertyKey::String(self.interns.intern(s)),
                HeapData::Symbol(sym) => PropertyKey::Symbol(*sym),
                _ => PropertyKey::String(self.interns.intern(&v.to_string())),
            },
            _ => PropertyKey::String(self.interns.intern(&v.to_string())),
        }
    }

    fn instance_of(&mut self, value: Value, constructor: Value) -> ThrowResult<bool> {
        let Value::Pointer(ctor_id) = constructor else {
            return Err(EngineError::type_error("Right-hand side of 'instanceof' is not callable"));
        };
        if !matches!(self.heap.get(ctor_id), HeapData::Function(_)) {
            return Err(EngineError::type_error("Right-hand side of 'instanceof' is not callable"));
        }
        let Value::Pointer(mut current) = value else {
            return Ok(false);
        };
        let prototype_key = PropertyKey::String(self.interns.statics.prototype);
        let Some(target_proto) = self
            .heap
            .get(ctor_id)
            .as_function()
            .and_then(|f| f.object.get_own(prototype_key))
            .and_then(|(_, v)| v.as_data())
            .and_then(|v| v.as_pointer())
        else {
            return Ok(false);
        };
        loop {
            let Some(proto) = self.heap.get_object(current).and_then(|o| o.prototype) else {
                return Ok(false);
            };
            if proto == target_proto {
                return Ok(true);
            }
            current = proto;
        }
    }
}

enum DispatchOutcome {
    Continue,
    Return(Value),
    End,
    Pause { register: u16, kind: GeneratorKind },
}

enum ControlFlowOutcome {
    Continue,
}

/// `1` in whichever numeric domain `n` already lives in, so
/// `Increment`/`Decrement` stay in `BigInt` arithmetic for a `BigInt` operand
/// instead of tripping the mixed-type `TypeError` a literal `Numeric::Number`
/// would (§4.2).
fn one_like(n: &Numeric) -> Numeric {
    match n {
        Numeric::Number(_) => Numeric::Number(1.0),
        Numeric::BigInt(_) => Numeric::BigInt(num_bigint::BigInt::from(1)),
    }
}


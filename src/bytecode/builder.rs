//! `CodeBuilder`: hand-assembles a [`CodeBlock`] one instruction at a time.
//!
//! No parser or compiler front end is in scope for this crate (§1); this
//! builder exists so tests can construct bytecode directly, playing the role
//! a compiler's code generator would, minus the peephole optimizer and
//! stack-depth bookkeeping a register machine with fixed-width operands
//! doesn't need.

use super::{
    code_block::{CodeBlock, ExceptionHandler},
    opcode::Opcode,
};
use crate::{intern::PropertyKey, value::Value};

/// A forward-jump site awaiting its target offset.
#[derive(Debug, Clone, Copy)]
pub struct JumpLabel(usize);

/// A `TryOperation` site awaiting its catch/finally target offsets.
#[derive(Debug, Clone, Copy)]
pub struct TryLabel {
    catch_pos: Option<usize>,
    finally_pos: Option<usize>,
}

#[derive(Debug, Default)]
pub struct CodeBuilder {
    bytecode: Vec<u8>,
    constants: Vec<Value>,
    property_keys: Vec<PropertyKey>,
    exception_table: Vec<ExceptionHandler>,
    num_registers: u16,
    num_parameters: u16,
    num_env_slots: u16,
    is_strict: bool,
    is_resumable: bool,
}

impl CodeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.is_strict = strict;
        self
    }

    #[must_use]
    pub fn resumable(mut self, resumable: bool) -> Self {
        self.is_resumable = resumable;
        self
    }

    #[must_use]
    pub fn parameters(mut self, count: u16) -> Self {
        self.num_parameters = count;
        self.num_env_slots = self.num_env_slots.max(count);
        self
    }

    #[must_use]
    pub fn env_slots(mut self, count: u16) -> Self {
        self.num_env_slots = self.num_env_slots.max(count);
        self
    }

    /// Declares `count` registers are in use; the dispatch loop allocates
    /// exactly this many per call frame (§3 "per-invocation register file").
    pub fn reserve_registers(&mut self, count: u16) {
        self.num_registers = self.num_registers.max(count);
    }

    fn touch_register(&mut self, r: u16) {
        self.num_registers = self.num_registers.max(r + 1);
    }

    /// `ExecutionPause reg, kind`: the one opcode whose operand shape is a
    /// register followed by a one-byte generator-kind tag rather than another
    /// register or constant index (§4.7). `kind_tag` matches the dispatch
    /// loop's own encoding: `0` = generator, `1` = async, `2` = async
    /// generator.
    pub fn emit_pause(&mut self, register: u16, kind_tag: u8) {
        self.touch_register(register);
        self.bytecode.push(Opcode::ExecutionPause as u8);
        self.bytecode.extend_from_slice(&register.to_le_bytes());
        self.bytecode.push(kind_tag);
    }

    #[must_use]
    pub fn current_offset(&self) -> u32 {
        self.bytecode.len() as u32
    }

    pub fn emit(&mut self, op: Opcode) {
        self.bytecode.push(op as u8);
    }

    /// One register operand (e.g. `UnaryNot dst`).
    pub fn emit_r1(&mut self, op: Opcode, r1: u16) {
        self.touch_register(r1);
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&r1.to_le_bytes());
    }

    /// Two register operands (e.g. `Mov dst, src`).
    pub fn emit_r2(&mut self, op: Opcode, r1: u16, r2: u16) {
        self.touch_register(r1);
        self.touch_register(r2);
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&r1.to_le_bytes());
        self.bytecode.extend_from_slice(&r2.to_le_bytes());
    }

    /// Three register operands (e.g. `BinaryPlus dst, lhs, rhs`).
    pub fn emit_r3(&mut self, op: Opcode, r1: u16, r2: u16, r3: u16) {
        self.touch_register(r1);
        self.touch_register(r2);
        self.touch_register(r3);
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&r1.to_le_bytes());
        self.bytecode.extend_from_slice(&r2.to_le_bytes());
        self.bytecode.extend_from_slice(&r3.to_le_bytes());
    }

    /// A register operand followed by a constant-pool index (e.g.
    /// `LoadLiteral dst, constIdx`).
    pub fn emit_r1_const(&mut self, op: Opcode, r1: u16, const_index: u16) {
        self.touch_register(r1);
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&r1.to_le_bytes());
        self.bytecode.extend_from_slice(&const_index.to_le_bytes());
    }

    /// Emits a forward jump with a placeholder `i32` offset, returning a
    /// label to [`Self::patch_jump`] once the target is known. `cond_reg` is
    /// `None` for `Jump`, `Some(reg)` for the conditional forms.
    #[must_use]
    pub fn emit_jump(&mut self, op: Opcode, cond_reg: Option<u16>) -> JumpLabel {
        self.bytecode.push(op as u8);
        if let Some(r) = cond_reg {
            self.touch_register(r);
            self.bytecode.extend_from_slice(&r.to_le_bytes());
        }
        let label = JumpLabel(self.bytecode.len());
        self.bytecode.extend_from_slice(&0i32.to_le_bytes());
        label
    }

    /// Patches a forward jump to target the current offset.
    pub fn patch_jump(&mut self, label: JumpLabel) {
        let target = self.bytecode.len() as i32;
        let offset = target - (label.0 as i32 + 4);
        self.bytecode[label.0..label.0 + 4].copy_from_slice(&offset.to_le_bytes());
    }

    /// Emits a backward jump to a previously recorded offset.
    pub fn emit_jump_to(&mut self, op: Opcode, target: u32) {
        self.bytecode.push(op as u8);
        let site = self.bytecode.len() as i32 + 4;
        let offset = target as i32 - site;
        self.bytecode.extend_from_slice(&offset.to_le_bytes());
    }

    /// Emits `TryOperation`: a fixed-width instruction (register + flags byte
    /// + two placeholder offsets) so the dispatch loop can decode it without
    /// a variable-length lookahead. Unused offsets are patched to `0` and
    /// ignored by the dispatch loop when their flag bit is clear.
    #[must_use]
    pub fn emit_try(&mut self, catch_register: u16, has_catch: bool, has_finally: bool) -> TryLabel {
        self.touch_register(catch_register);
        self.bytecode.push(Opcode::TryOperation as u8);
        self.bytecode.extend_from_slice(&catch_register.to_le_bytes());
        let mut flags = 0u8;
        if has_catch {
            flags |= 1;
        }
        if has_finally {
            flags |= 2;
        }
        self.bytecode.push(flags);
        let catch_pos = self.bytecode.len();
        self.bytecode.extend_from_slice(&0i32.to_le_bytes());
        let finally_pos = self.bytecode.len();
        self.bytecode.extend_from_slice(&0i32.to_le_bytes());
        TryLabel {
            catch_pos: has_catch.then_some(catch_pos),
            finally_pos: has_finally.then_some(finally_pos),
        }
    }

    pub fn patch_try_catch(&mut self, label: &TryLabel) {
        if let Some(pos) = label.catch_pos {
            let offset = self.bytecode.len() as i32 - (pos as i32 + 4);
            self.bytecode[pos..pos + 4].copy_from_slice(&offset.to_le_bytes());
        }
    }

    pub fn patch_try_finally(&mut self, label: &TryLabel) {
        if let Some(pos) = label.finally_pos {
            let offset = self.bytecode.len() as i32 - (pos as i32 + 4);
            self.bytecode[pos..pos + 4].copy_from_slice(&offset.to_le_bytes());
        }
    }

    /// Variable-argument call site (`CallFunction dst, callee, first_arg,
    /// argc`): arguments occupy `argc` contiguous registers starting at
    /// `first_arg`, avoiding a separate operand per argument.
    pub fn emit_call(&mut self, op: Opcode, dst: u16, callee: u16, first_arg: u16, argc: u16) {
        self.touch_register(dst);
        self.touch_register(callee);
        if argc > 0 {
            self.touch_register(first_arg + argc - 1);
        }
        self.bytecode.push(op as u8);
        for r in [dst, callee, first_arg, argc] {
            self.bytecode.extend_from_slice(&r.to_le_bytes());
        }
    }

    #[must_use]
    pub fn add_const(&mut self, value: Value) -> u16 {
        let idx = u16::try_from(self.constants.len()).expect("constant pool exceeds u16 range");
        self.constants.push(value);
        idx
    }

    #[must_use]
    pub fn add_property_key(&mut self, key: PropertyKey) -> u16 {
        let idx = u16::try_from(self.property_keys.len()).expect("property-key pool exceeds u16 range");
        self.property_keys.push(key);
        idx
    }

    pub fn add_exception_handler(&mut self, handler: ExceptionHandler) {
        self.exception_table.push(handler);
    }

    #[must_use]
    pub fn build(self) -> CodeBlock {
        CodeBlock {
            bytecode: self.bytecode,
            constants: self.constants,
            property_keys: self.property_keys,
            exception_table: self.exception_table,
            num_registers: self.num_registers,
            num_parameters: self.num_parameters,
            num_env_slots: self.num_env_slots,
            is_strict: self.is_strict,
            is_resumable: self.is_resumable,
            property_caches: Default::default(),
            global_caches: Default::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_jump_patches_to_current_offset() {
        let mut b = CodeBuilder::new();
        let label = b.emit_jump(Opcode::Jump, None);
        b.emit(Opcode::End);
        let target_before_patch = b.current_offset();
        b.patch_jump(label);
        let code = b.build();
        assert_eq!(target_before_patch, 1 + 1 + 4);
        assert_eq!(code.bytecode[0], Opcode::Jump as u8);
    }

    #[test]
    fn constants_are_assigned_sequential_indices() {
        let mut b = CodeBuilder::new();
        assert_eq!(b.add_const(Value::Int32(1)), 0);
        assert_eq!(b.add_const(Value::Int32(2)), 1);
    }
}

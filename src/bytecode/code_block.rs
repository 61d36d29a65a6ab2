//! `CodeBlock`: the immutable compiled form of one function body (§4
//! "CodeBlock byte buffer with operand structs").
//!
//! A raw byte buffer plus constant pool and exception table, adapted from a
//! stack machine's operand-less opcodes to a register machine's fixed-width
//! register-index operands, with the `ControlFlowRecord`-driven try/catch/
//! finally ranges §4.6 describes.

use std::cell::RefCell;

use ahash::AHashMap;

use crate::{
    bytecode::ic::{GlobalVariableAccessCacheItem, PropertyAccessCache},
    intern::PropertyKey,
    value::Value,
};

/// One `try` region: `[try_start, try_end)` covers the protected range:
/// `catch_target`/`finally_target` are byte offsets to jump to on throw /
/// on always-run cleanup, matching §4.6's `TryOperation` state machine
/// (`onTry`/`onCatch`/`onFinally` flags become "which of these is set").
#[derive(Debug, Clone, Copy)]
pub struct ExceptionHandler {
    pub try_start: u32,
    pub try_end: u32,
    pub catch_target: Option<u32>,
    pub finally_target: Option<u32>,
    /// Register that receives the thrown value when `catch_target` is taken.
    pub catch_register: u16,
}

/// The compiled, immutable body of one function or top-level script.
#[derive(Debug, Default)]
pub struct CodeBlock {
    pub bytecode: Vec<u8>,
    pub constants: Vec<Value>,
    /// Property keys referenced by `GetObjectPreComputedCase`/
    /// `SetObjectPreComputedCase`/`GetGlobalVariable`/... operands, kept
    /// separate from `constants` since a `PropertyKey` is not itself a
    /// `Value` a register can hold.
    pub property_keys: Vec<PropertyKey>,
    pub exception_table: Vec<ExceptionHandler>,
    pub num_registers: u16,
    pub num_parameters: u16,
    /// Size of the callee's `Function`-kind environment binding array:
    /// parameters plus whichever locals a nested closure captures (ordinary,
    /// never-captured locals live purely in `registers` and need no
    /// environment slot at all).
    pub num_env_slots: u16,
    pub is_strict: bool,
    /// `true` for generator/async function bodies, enabling `ExecutionPause`
    /// (§4.7); checked by the dispatch loop to reject a stray pause opcode in
    /// an ordinary function body.
    pub is_resumable: bool,
    /// Inline caches live on the `CodeBlock`, keyed by the call site's byte
    /// offset, not on any one activation: every closure sharing this body
    /// shares the same cache state (§3 "Inline cache (per call site)").
    pub property_caches: RefCell<AHashMap<u32, PropertyAccessCache>>,
    pub global_caches: RefCell<AHashMap<u32, GlobalVariableAccessCacheItem>>,
}

impl CodeBlock {
    #[must_use]
    pub fn constant(&self, index: u16) -> Value {
        self.constants[index as usize]
    }

    #[must_use]
    pub fn property_key(&self, index: u16) -> PropertyKey {
        self.property_keys[index as usize]
    }

    /// Finds the innermost handler whose try-range contains `pc`, per the
    /// exception table's innermost-first ordering (emitted that way by
    /// `CodeBuilder::add_exception_handler`).
    #[must_use]
    pub fn handler_for(&self, pc: u32) -> Option<&ExceptionHandler> {
        self.exception_table
            .iter()
            .find(|h| h.try_start <= pc && pc < h.try_end)
    }
}

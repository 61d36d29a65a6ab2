//! Error taxonomy and propagation channel.
//!
//! A manual `enum` + `Result` alias, with `strum` providing
//! `Display`/`EnumString` for the error-kind tag rather than reaching for
//! `thiserror`. Per §9 ("Error returns vs host exceptions"), this crate picks
//! the structured-return form: every interpreter-internal function that can
//! fail returns `EngineResult<T>`, and the dispatch loop checks the tag after
//! every sub-call instead of relying on Rust unwinding.

use std::fmt;

use strum::{Display, EnumString, IntoStaticStr};

use crate::value::Value;

/// The four error kinds the core can raise (§7).
///
/// `SyntaxError` is only ever constructed via `ThrowStaticErrorOperation`,
/// carrying a parser-supplied template; the interpreter itself never
/// originates one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ErrorKind {
    TypeError,
    ReferenceError,
    RangeError,
    SyntaxError,
}

/// One entry of a captured stack trace, recorded at the original throw site
/// so a `finally` block that re-raises a pending exception preserves it
/// (§4.6, §7 "preserving the original stack-trace-data vector").
#[derive(Debug, Clone)]
pub struct StackFrameInfo {
    pub function_name: Option<String>,
    /// Byte offset into the code block's opcode stream at the throw site.
    pub program_counter: usize,
}

/// A thrown error: either one the engine constructed from `ErrorKind` +
/// message, or a `throw <value>` of an arbitrary value the engine neither
/// inspects nor requires to be an `Error` instance.
#[derive(Debug, Clone)]
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
    /// The value actually visible to a `catch` binding. For engine-raised
    /// errors this is an `Error` heap object; for user `throw expr` it is
    /// whatever `expr` evaluated to.
    pub thrown_value: Option<Value>,
    pub stack_trace: Vec<StackFrameInfo>,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for EngineError {}

impl EngineError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            thrown_value: None,
            stack_trace: Vec::new(),
        }
    }

    #[must_use]
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    #[must_use]
    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ReferenceError, message)
    }

    #[must_use]
    pub fn range_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RangeError, message)
    }

    #[must_use]
    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SyntaxError, message)
    }

    /// Wraps an arbitrary thrown value (`throw expr`) that is not an
    /// engine-constructed error. `kind` is left as a best-effort
    /// classification used only for `instanceof`-free internal matching;
    /// user code that inspects the thrown value sees exactly `value`.
    #[must_use]
    pub fn thrown(value: Value) -> Self {
        Self {
            kind: ErrorKind::TypeError,
            message: String::new(),
            thrown_value: Some(value),
            stack_trace: Vec::new(),
        }
    }

    pub fn with_frame(mut self, frame: StackFrameInfo) -> Self {
        self.stack_trace.push(frame);
        self
    }
}

/// What a recursive `interpret` call can produce besides an ordinary value:
/// either it threw (propagate via `Err`) or it suspended for generator/async
/// pause-resume (the `empty` sentinel return §4.1 describes, modeled here as
/// an explicit variant so callers cannot mistake a pause for a thrown error
/// or a returned value).
#[derive(Debug, Clone)]
pub enum Completion {
    Throw(EngineError),
    /// The frame suspended; the caller must stash whatever pauser state it
    /// owns and propagate the pause upward unless it is itself the
    /// generator-resume boundary.
    Pause,
}

impl From<EngineError> for Completion {
    fn from(e: EngineError) -> Self {
        Self::Throw(e)
    }
}

pub type EngineResult<T> = Result<T, Completion>;

/// Convenience for call sites that only care about the thrown-error case
/// (most opcode handlers - pauses are only possible at explicit
/// `ExecutionPause` sites, see `vm::generator`).
pub type ThrowResult<T> = Result<T, EngineError>;

//! `try`/`catch`/`finally` unwinding (§4.6 "Exception/control-flow
//! unwinding").
//!
//! `ControlFlowRecord` captures what a `finally` block must do once it has
//! finished running: resume an in-flight jump, return, or re-throw. This is
//! the structured alternative to host-language unwinding the `Non-goals`
//! section permits: catch an error, decide whether a handler covers it,
//! otherwise keep propagating - the three-way record here generalizes that
//! decision to also cover `break`/`continue`/`return` crossing a `finally`.

use crate::exception::EngineError;

/// What a `finally` block must do once its own body has run to completion.
/// Pending state captured when control flow needs to cross the `finally`
/// (§4.6).
#[derive(Debug, Clone)]
pub enum ControlFlowRecord {
    /// Fall through normally; nothing pending.
    Normal,
    /// A `break`/`continue`/early `return` was in flight when a `finally`
    /// intercepted it; `target_pc` is where to resume once the `finally`
    /// completes (`None` for a pending `return`, whose resume point is the
    /// caller rather than a bytecode offset).
    NeedsJump { target_pc: Option<u32> },
    /// A `return expr` was in flight.
    NeedsReturn { value: crate::value::Value },
    /// An exception was in flight when `finally` started running; if the
    /// `finally` body itself completes normally (no new throw/return), this
    /// error must be re-raised once it finishes.
    NeedsThrow { error: EngineError },
}

impl ControlFlowRecord {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        !matches!(self, Self::Normal)
    }
}

/// One `try` frame's state machine position, tracked while executing inside
/// a protected region so the dispatch loop knows which of `onTry`/`onCatch`/
/// `onFinally` is active when an exception needs to find its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryPhase {
    Try,
    Catch,
    Finally,
}

/// Runtime state for one active `try` region, pushed when `TryOperation`
/// runs and popped once its `finally` (or the `try`/`catch` body, if there is
/// no `finally`) completes.
#[derive(Debug, Clone)]
pub struct TryFrame {
    pub phase: TryPhase,
    pub catch_target: Option<u32>,
    pub finally_target: Option<u32>,
    pub catch_register: u16,
    /// Set while a `finally` is running because something needed to cross
    /// it; consumed (and acted on) once the `finally` body reaches its end.
    pub pending: ControlFlowRecord,
}

impl TryFrame {
    #[must_use]
    pub fn new(catch_target: Option<u32>, finally_target: Option<u32>, catch_register: u16) -> Self {
        Self {
            phase: TryPhase::Try,
            catch_target,
            finally_target,
            catch_register,
            pending: ControlFlowRecord::Normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finally_overrides_in_flight_jump_is_observable_as_pending() {
        let mut frame = TryFrame::new(Some(10), Some(20), 0);
        frame.pending = ControlFlowRecord::NeedsJump { target_pc: Some(99) };
        assert!(frame.pending.is_pending());
    }
}

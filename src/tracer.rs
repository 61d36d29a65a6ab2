//! VM execution tracing and debugger hook points.
//!
//! A trait with default no-op methods so [`NoopTracer`] compiles away via
//! monomorphization (the VM is generic over `Tr: VmTracer`, exactly like it
//! is generic over `ResourceTracker`). §6 calls for "an optional per-opcode
//! callback" plus two breakpoint-toggle opcodes and an `End`-opcode hook;
//! those map onto `on_opcode`, `on_breakpoint`, and `on_end` below.

use crate::bytecode::opcode::Opcode;

/// One recorded trace event, used by [`RecordingTracer`].
#[derive(Debug, Clone)]
pub enum TraceEvent {
    Instruction { pc: usize, opcode: Opcode, frame_depth: usize },
    Call { frame_depth: usize },
    Return { frame_depth: usize },
    Throw { frame_depth: usize },
    Pause { frame_depth: usize },
    Resume { frame_depth: usize },
    End { pc: usize },
}

/// Hook points observed by an attached debugger or profiler.
///
/// All methods have default no-op bodies; implementations override only the
/// hooks they need. The VM carries its tracer as a type parameter so that
/// `NoopTracer` usage is indistinguishable, at the machine-code level, from
/// no tracer at all.
pub trait VmTracer: std::fmt::Debug {
    /// Called before dispatching each opcode, mirroring spec §6's "optional
    /// per-opcode callback may observe `(codeBlock, pcOffset, state)`".
    #[inline(always)]
    fn on_opcode(&mut self, _pc: usize, _opcode: Opcode, _frame_depth: usize) {}

    #[inline(always)]
    fn on_call(&mut self, _frame_depth: usize) {}

    #[inline(always)]
    fn on_return(&mut self, _frame_depth: usize) {}

    #[inline(always)]
    fn on_throw(&mut self, _frame_depth: usize) {}

    #[inline(always)]
    fn on_pause(&mut self, _frame_depth: usize) {}

    #[inline(always)]
    fn on_resume(&mut self, _frame_depth: usize) {}

    /// Fired at every `End` opcode, per spec §6 ("A dedicated hook fires at
    /// every `End` opcode").
    #[inline(always)]
    fn on_end(&mut self, _pc: usize) {}

    /// Called when a `BreakpointEnabled`/`BreakpointDisabled` opcode is
    /// dispatched, i.e. when the host toggled a breakpoint by patching a
    /// byte in place (§6).
    #[inline(always)]
    fn on_breakpoint_toggled(&mut self, _pc: usize, _enabled: bool) {}
}

/// Zero-cost production default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// Collects every hook call into an ordered `Vec<TraceEvent>` for use in
/// tests asserting opcode sequences (e.g. "the generator runs in exactly two
/// segments separated by the yield").
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    pub events: Vec<TraceEvent>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl VmTracer for RecordingTracer {
    fn on_opcode(&mut self, pc: usize, opcode: Opcode, frame_depth: usize) {
        self.events.push(TraceEvent::Instruction { pc, opcode, frame_depth });
    }

    fn on_call(&mut self, frame_depth: usize) {
        self.events.push(TraceEvent::Call { frame_depth });
    }

    fn on_return(&mut self, frame_depth: usize) {
        self.events.push(TraceEvent::Return { frame_depth });
    }

    fn on_throw(&mut self, frame_depth: usize) {
        self.events.push(TraceEvent::Throw { frame_depth });
    }

    fn on_pause(&mut self, frame_depth: usize) {
        self.events.push(TraceEvent::Pause { frame_depth });
    }

    fn on_resume(&mut self, frame_depth: usize) {
        self.events.push(TraceEvent::Resume { frame_depth });
    }

    fn on_end(&mut self, pc: usize) {
        self.events.push(TraceEvent::End { pc });
    }
}

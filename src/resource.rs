//! Resource limits and the cooperative cancellation "stop-state" bit.
//!
//! A `ResourceTracker` trait monomorphized into the VM type parameter so
//! that a production build with `NoLimitTracker` compiles the checks away
//! entirely, matching the same zero-cost pattern `tracer::VmTracer` uses for
//! execution tracing.

use std::cell::Cell;

use crate::exception::EngineError;

/// Error produced when a configured limit is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceError {
    Recursion { limit: usize, depth: usize },
    Registers { limit: usize, requested: usize },
    Stopped,
}

impl ResourceError {
    #[must_use]
    pub fn into_engine_error(self) -> EngineError {
        match self {
            Self::Recursion { limit, depth } => {
                EngineError::range_error(format!("Maximum call stack size exceeded ({depth} > {limit})"))
            }
            Self::Registers { limit, requested } => {
                EngineError::range_error(format!("register file too large ({requested} > {limit})"))
            }
            Self::Stopped => EngineError::range_error("execution aborted by host watchdog"),
        }
    }
}

/// Tuning knobs for inline-cache promotion. §9 Open Questions calls the
/// precise IC thresholds empirical, so they are configuration rather than
/// hardcoded constants.
#[derive(Debug, Clone, Copy)]
pub struct EngineLimits {
    pub max_call_depth: usize,
    pub max_registers_per_frame: usize,
    /// Below this miss count, a `GetObjectPreComputedCase`/`SetObjectPreComputedCase`
    /// site does not install a cache yet (§4.3).
    pub ic_min_fill_count: u32,
    /// Cap on Complex-IC entries before LRU eviction by index-shift (§3 IC,
    /// §9 Open Questions: `maxCacheCount`).
    pub ic_max_entries: usize,
    /// Above this miss count, a site permanently gives up on caching (§4.3,
    /// `maxCacheMissCount`).
    pub ic_max_miss_count: u32,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_call_depth: 2048,
            max_registers_per_frame: 4096,
            ic_min_fill_count: 4,
            ic_max_entries: 24,
            ic_max_miss_count: 32,
        }
    }
}

/// Per-invocation resource accounting, monomorphized over the VM so
/// `NoLimitTracker` costs nothing in a production build.
pub trait ResourceTracker: std::fmt::Debug {
    fn check_recursion_depth(&self, depth: usize) -> Result<(), ResourceError>;
    fn check_registers(&self, count: usize) -> Result<(), ResourceError>;
    /// Polled at every recursive `interpret` call boundary (never inside a
    /// single opcode, per spec §5): when true, every enclosing frame must
    /// unwind and return a pause/abort completion instead of continuing.
    fn should_stop(&self) -> bool;
}

/// Default tracker: enforces `EngineLimits.max_call_depth`/
/// `max_registers_per_frame` but never sets the stop bit on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {
    fn check_recursion_depth(&self, _depth: usize) -> Result<(), ResourceError> {
        Ok(())
    }

    fn check_registers(&self, _count: usize) -> Result<(), ResourceError> {
        Ok(())
    }

    fn should_stop(&self) -> bool {
        false
    }
}

/// Tracker that enforces `EngineLimits` and exposes a host-settable
/// stop-state bit (§5 "Cancellation / timeouts").
#[derive(Debug)]
pub struct LimitedTracker {
    limits: EngineLimits,
    stop: Cell<bool>,
}

impl LimitedTracker {
    #[must_use]
    pub fn new(limits: EngineLimits) -> Self {
        Self {
            limits,
            stop: Cell::new(false),
        }
    }

    /// Called by a host watchdog (possibly from another OS thread via a
    /// shared `Arc<LimitedTracker>` with interior `AtomicBool` in a real
    /// embedder; this crate models the single-threaded contract directly
    /// with `Cell` since §5 guarantees the tracker is only read by the
    /// thread executing `interpret`).
    pub fn request_stop(&self) {
        self.stop.set(true);
    }

    pub fn reset_stop(&self) {
        self.stop.set(false);
    }
}

impl ResourceTracker for LimitedTracker {
    fn check_recursion_depth(&self, depth: usize) -> Result<(), ResourceError> {
        if depth > self.limits.max_call_depth {
            return Err(ResourceError::Recursion {
                limit: self.limits.max_call_depth,
                depth,
            });
        }
        Ok(())
    }

    fn check_registers(&self, count: usize) -> Result<(), ResourceError> {
        if count > self.limits.max_registers_per_frame {
            return Err(ResourceError::Registers {
                limit: self.limits.max_registers_per_frame,
                requested: count,
            });
        }
        Ok(())
    }

    fn should_stop(&self) -> bool {
        self.stop.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limited_tracker_rejects_deep_recursion() {
        let tracker = LimitedTracker::new(EngineLimits {
            max_call_depth: 10,
            ..EngineLimits::default()
        });
        assert!(tracker.check_recursion_depth(5).is_ok());
        assert!(tracker.check_recursion_depth(11).is_err());
    }

    #[test]
    fn stop_bit_round_trips() {
        let tracker = LimitedTracker::new(EngineLimits::default());
        assert!(!tracker.should_stop());
        tracker.request_stop();
        assert!(tracker.should_stop());
        tracker.reset_stop();
        assert!(!tracker.should_stop());
    }
}

// Session-scoped running accumulators for TBT and CLS
//
// Both accumulators are reset at every navigation boundary. They return the
// new running total when a sample qualifies so the caller can rewrite the
// stored metric from the authoritative sum rather than adding increments to
// possibly-stale state.

use crate::feed::{LayoutShiftSample, LongTaskSample};

/// Total Blocking Time accumulator.
///
/// Every long task contributes its duration in excess of the floor; tasks at
/// or below the floor do not qualify.
#[derive(Debug, Clone)]
pub struct BlockingTimeAccumulator {
    floor_ms: f64,
    total_ms: f64,
    qualifying_tasks: u32,
}

impl BlockingTimeAccumulator {
    pub fn new(floor_ms: f64) -> Self {
        Self {
            floor_ms,
            total_ms: 0.0,
            qualifying_tasks: 0,
        }
    }

    /// Fold in one long task. Returns the new running total when the task
    /// qualifies, `None` otherwise.
    pub fn observe(&mut self, sample: LongTaskSample) -> Option<f64> {
        if sample.duration_ms <= self.floor_ms {
            return None;
        }
        self.total_ms += sample.duration_ms - self.floor_ms;
        self.qualifying_tasks += 1;
        Some(self.total_ms)
    }

    pub fn total_ms(&self) -> f64 {
        self.total_ms
    }

    pub fn qualifying_tasks(&self) -> u32 {
        self.qualifying_tasks
    }

    pub fn reset(&mut self) {
        self.total_ms = 0.0;
        self.qualifying_tasks = 0;
    }
}

/// Cumulative Layout Shift accumulator.
///
/// Shifts attributable to recent user input are excluded from the sum.
#[derive(Debug, Clone, Default)]
pub struct LayoutShiftAccumulator {
    total: f64,
}

impl LayoutShiftAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one shift. Returns the new running total when the shift
    /// counts, `None` when it was input-driven.
    pub fn observe(&mut self, sample: LayoutShiftSample) -> Option<f64> {
        if sample.had_recent_input {
            return None;
        }
        self.total += sample.value;
        Some(self.total)
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn reset(&mut self) {
        self.total = 0.0;
    }
}

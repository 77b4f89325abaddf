use std::time::Instant;

/// Counters kept by each scheduler instance
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SchedulerStats {
    /// Updates accepted by enqueue (including those merged away)
    pub enqueued: u64,
    /// Updates folded into an already pending update
    pub merged: u64,
    /// Updates whose action ran to completion
    pub executed: u64,
    /// Updates whose action returned an error
    pub failed: u64,
    /// Updates converted into jobs by opportunistic execution
    pub spilled: u64,
    /// Number of drain calls (explicit, nested or opportunistic)
    pub drain_passes: u64,
    /// Deepest scope stack depth reached
    pub max_depth: usize,
    /// Time spent inside update actions (nanoseconds)
    pub total_timing_ns: u128,
}

impl SchedulerStats {
    pub(crate) fn record_enqueue(&mut self, merged: bool) {
        self.enqueued += 1;
        if merged {
            self.merged += 1;
        }
    }

    pub(crate) fn record_run(&mut self, ok: bool, depth: usize, timer: UpdateTimer) {
        if ok {
            self.executed += 1;
        } else {
            self.failed += 1;
        }
        self.max_depth = self.max_depth.max(depth);
        self.total_timing_ns += timer.elapsed_ns();
    }

    /// Convert timing to milliseconds
    pub fn total_timing_ms(&self) -> f64 {
        self.total_timing_ns as f64 / 1_000_000.0
    }

    /// Share of enqueued updates that were merged away
    pub fn merge_rate(&self) -> f64 {
        if self.enqueued == 0 {
            0.0
        } else {
            self.merged as f64 / self.enqueued as f64
        }
    }
}

/// Timer for measuring a single update's execution
pub(crate) struct UpdateTimer {
    start: Instant,
}

impl UpdateTimer {
    pub(crate) fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    fn elapsed_ns(&self) -> u128 {
        self.start.elapsed().as_nanos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_rate() {
        let mut stats = SchedulerStats::default();
        assert_eq!(stats.merge_rate(), 0.0);

        stats.record_enqueue(false);
        stats.record_enqueue(true);
        stats.record_enqueue(false);
        stats.record_enqueue(true);

        assert_eq!(stats.enqueued, 4);
        assert_eq!(stats.merged, 2);
        assert!((stats.merge_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_run() {
        let mut stats = SchedulerStats::default();
        stats.record_run(true, 1, UpdateTimer::start());
        stats.record_run(false, 3, UpdateTimer::start());
        stats.record_run(true, 2, UpdateTimer::start());

        assert_eq!(stats.executed, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.max_depth, 3);
        assert!(stats.total_timing_ms() >= 0.0);
    }
}

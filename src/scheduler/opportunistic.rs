//! Opportunistic execution on a commit/idle signal
//!
//! Called by whatever observes the transaction manager going idle. With no
//! round open and nothing already executing, depth-0 updates that can be
//! expressed as jobs are handed to the job queue, and the rest run inline.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use crate::error::SchedulerResult;
use crate::update::{Stage, StageFilter};
use super::{DrainReport, Scheduler};

/// Why an opportunistic call did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Called from inside a running update
    InProgress,
    /// `prevent_opportunistic_updates` is in effect
    Suppressed,
    /// A transaction round is open
    RoundOpen,
}

/// Updates converted into jobs by one opportunistic call
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SpillReport {
    pub count: usize,
    /// Spilled updates per kind
    pub by_kind: BTreeMap<String, usize>,
}

impl SpillReport {
    /// `"<kind>: <n>, ..."` in kind order
    pub fn summary(&self) -> String {
        self.by_kind
            .iter()
            .map(|(kind, n)| format!("{kind}: {n}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn record(&mut self, kind: &str) {
        self.count += 1;
        *self.by_kind.entry(kind.to_string()).or_insert(0) += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpportunisticOutcome {
    Skipped(SkipReason),
    Executed { spill: SpillReport, drain: DrainReport },
}

impl OpportunisticOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, OpportunisticOutcome::Skipped(_))
    }
}

impl Scheduler {
    /// Run depth-0 pending updates if it is safe to do so right now
    ///
    /// A no-op while an update is executing, while suppressed, or while a
    /// transaction round is open. Otherwise, once the backlog reaches
    /// `spill_threshold`, every update that can become a job is submitted to
    /// the job queue, and everything else is drained inline.
    pub fn try_opportunistic_execute(&mut self) -> SchedulerResult<OpportunisticOutcome> {
        let skip = if self.stack.depth() > 0 {
            Some(SkipReason::InProgress)
        } else if self.opportunistic_holds > 0 {
            Some(SkipReason::Suppressed)
        } else if self.transactions.has_open_round() {
            Some(SkipReason::RoundOpen)
        } else {
            None
        };
        if let Some(reason) = skip {
            debug!(?reason, "skipping opportunistic execution");
            return Ok(OpportunisticOutcome::Skipped(reason));
        }

        let spill = if self.pending_count(StageFilter::All) >= self.config.spill_threshold {
            self.spill_enqueueable()
        } else {
            SpillReport::default()
        };

        let drain = self.drain(StageFilter::All)?;
        Ok(OpportunisticOutcome::Executed { spill, drain })
    }

    fn spill_enqueueable(&mut self) -> SpillReport {
        let mut report = SpillReport::default();

        for stage in Stage::ORDERED {
            let jobs = &mut self.jobs;
            let stats = &mut self.stats;
            // Submitted while still queued, so a rejected update keeps its slot
            self.stack.root_mut().bucket_mut(stage).extract_matching(|update| {
                let Some(spec) = update.job_specification() else {
                    return false;
                };
                match jobs.submit(spec.job, &spec.domain) {
                    Ok(()) => {
                        report.record(update.kind());
                        stats.spilled += 1;
                        true
                    }
                    Err(e) => {
                        warn!(
                            kind = %update.kind(),
                            domain = %spec.domain,
                            error = %e,
                            "job submission failed; running update inline"
                        );
                        false
                    }
                }
            });
        }

        if report.count > 0 {
            info!(
                enqueued_updates_count = report.count,
                enqueued_updates = %report.summary(),
                "Enqueued {} updates as jobs",
                report.count
            );
        }
        report
    }
}

//! The deferred update scheduler
//!
//! One `Scheduler` per request/process context. Application code enqueues
//! updates; a driver (explicit drain, response-stage transition or the
//! opportunistic trigger) runs them at a safe point.
//!
//! State is confined to the owning execution context: there is no locking and
//! no global instance. Updates get `&mut Scheduler` while they run, which is
//! how they enqueue follow-up work or force a nested drain.

use tracing::trace;
use crate::config::SchedulerConfig;
use crate::error::SchedulerResult;
use crate::jobs::JobQueue;
use crate::metrics::SchedulerStats;
use crate::queue::{EnqueueOutcome, ScopeStack};
use crate::round::TransactionManager;
use crate::update::{CallableUpdate, Stage, StageFilter, Update};

mod drain;
mod opportunistic;

pub use drain::DrainReport;
pub use opportunistic::{OpportunisticOutcome, SkipReason, SpillReport};

/// Re-entrant deferred update scheduler
pub struct Scheduler {
    config: SchedulerConfig,
    stack: ScopeStack,
    transactions: Box<dyn TransactionManager>,
    jobs: Box<dyn JobQueue>,
    stats: SchedulerStats,
    /// While non-zero, opportunistic execution is suppressed
    opportunistic_holds: usize,
}

impl Scheduler {
    pub fn new<T, Q>(config: SchedulerConfig, transactions: T, jobs: Q) -> SchedulerResult<Self>
    where
        T: TransactionManager + 'static,
        Q: JobQueue + 'static,
    {
        config.validate()?;
        Ok(Self {
            config,
            stack: ScopeStack::new(),
            transactions: Box::new(transactions),
            jobs: Box::new(jobs),
            stats: SchedulerStats::default(),
            opportunistic_holds: 0,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Buffer `update` for `stage` in the top frame
    ///
    /// Never runs the update. Mergeable updates are folded into a pending
    /// update with the same kind and merge key when one exists.
    pub fn enqueue(&mut self, update: Update, stage: Stage) -> EnqueueOutcome {
        // Command-line runs have no response to wait for
        let stage = if self.config.is_command_line() {
            Stage::PreSend
        } else {
            stage
        };

        let kind = update.kind().to_string();
        let outcome = self.stack.current_mut().push(update, stage);
        self.stats.record_enqueue(outcome == EnqueueOutcome::Merged);

        trace!(
            kind = %kind,
            stage = %stage,
            depth = self.stack.depth(),
            merged = outcome == EnqueueOutcome::Merged,
            "enqueued deferred update"
        );
        outcome
    }

    /// Buffer `update` for PRESEND
    pub fn add_update(&mut self, update: Update) -> EnqueueOutcome {
        self.enqueue(update, Stage::PreSend)
    }

    /// Buffer a closure for PRESEND
    pub fn add_callable<F>(&mut self, action: F) -> EnqueueOutcome
    where
        F: FnOnce(&mut Scheduler) -> SchedulerResult<()> + 'static,
    {
        self.add_update(Update::callable(action))
    }

    /// Buffer a closure for `stage`, optionally running under its own round owner
    pub fn enqueue_callable<F>(
        &mut self,
        stage: Stage,
        origin: Option<&str>,
        action: F,
    ) -> SchedulerResult<EnqueueOutcome>
    where
        F: FnOnce(&mut Scheduler) -> SchedulerResult<()> + 'static,
    {
        let mut update = CallableUpdate::new(action);
        if let Some(origin) = origin {
            update = update.with_origin(origin)?;
        }
        Ok(self.enqueue(Update::Callable(update), stage))
    }

    /// Pending updates in the top frame for `filter`
    ///
    /// Outside any drain this is the depth-0 backlog. Inside a running update
    /// it only counts what that update has enqueued so far.
    pub fn pending_count(&self, filter: StageFilter) -> usize {
        self.stack.current().pending_count(filter)
    }

    /// Kinds of the pending updates in the top frame, in execution order
    pub fn pending_kinds(&self, filter: StageFilter) -> Vec<String> {
        self.stack.current().pending_kinds(filter)
    }

    /// Number of nested executions currently in progress
    pub fn recursive_depth(&self) -> usize {
        self.stack.depth()
    }

    /// Discard every depth-0 pending update without running it
    pub fn clear_pending(&mut self) {
        self.stack.root_mut().clear();
    }

    pub fn transactions(&self) -> &dyn TransactionManager {
        self.transactions.as_ref()
    }

    /// Direct round access for updates that commit under their own origin
    pub fn transactions_mut(&mut self) -> &mut dyn TransactionManager {
        self.transactions.as_mut()
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = SchedulerStats::default();
    }

    /// Suppress opportunistic execution until the matching
    /// `allow_opportunistic_updates` call
    pub fn prevent_opportunistic_updates(&mut self) {
        self.opportunistic_holds += 1;
    }

    pub fn allow_opportunistic_updates(&mut self) {
        self.opportunistic_holds = self.opportunistic_holds.saturating_sub(1);
    }
}

//! Execution engine and transaction round controller
//!
//! ## Drain algorithm
//!
//! 1. Take the next pending update (FIFO) from the top frame, PRESEND before POSTSEND
//! 2. Push a child frame for it and arrange the round posture it needs
//! 3. Run it; whatever it enqueues lands in the child frame
//! 4. Run the child frame's updates for that stage (same depth, FIFO) until empty
//! 5. Pop the child frame, moving leftovers for later stages into the parent
//! 6. Repeat until the filtered buckets are empty
//!
//! The frame is popped on every exit path, including errors, so the depth
//! seen by the next drain call is always correct.
//!
//! ## Round posture
//!
//! - Ordinary updates run inside an ambient round. A drain opens one if none is
//!   open and closes it when the pass ends; a round open on entry is left alone.
//! - Round-defining updates run with no round: the ambient one is committed first
//!   and is only reopened by the next ordinary update. A round held by another
//!   owner is suspended for the call and resumed afterwards.
//! - Callables with an origin run with round ownership handed to that origin,
//!   so they may commit under their own name. The previous owner gets it back.
//! - If the round an update needs cannot be arranged, the update is put back at
//!   the head of the bucket it came from and the pass stops.

use tracing::{debug, error, warn};
use crate::config::FailurePolicy;
use crate::error::{SchedulerError, SchedulerResult};
use crate::internal_error;
use crate::metrics::UpdateTimer;
use crate::update::{RoundPosture, Stage, StageFilter, Update};
use super::Scheduler;

/// Aggregate result of one drain call
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Updates that ran to completion (including nested sub-updates)
    pub executed: usize,
    /// Updates that returned an error
    pub failed: usize,
    /// Deepest frame reached during the pass
    pub max_depth: usize,
}

/// Round bookkeeping for a single drain call
#[derive(Debug, Default)]
pub(crate) struct RoundScope {
    /// This drain call opened the round that may currently be open
    owns: bool,
}

/// How to undo the round arrangement made for one update
#[derive(Debug)]
enum RoundRestore {
    Nothing,
    /// Hand ownership back to `previous` unless the callable ended the round
    Owner { origin: String, previous: String },
    /// Reinstate the round suspended for a round-defining update
    Resume,
}

/// An update that did not complete, and whether the pass must stop
#[derive(Debug)]
struct Failure {
    error: SchedulerError,
    halts: bool,
}

impl Failure {
    fn halting(error: SchedulerError) -> Self {
        Self { error, halts: true }
    }
}

/// First failure of a pass plus whether any failure stopped it
#[derive(Debug, Default)]
struct PassErrors {
    first: Option<SchedulerError>,
    halted: bool,
}

impl PassErrors {
    fn record(&mut self, failure: Failure) {
        self.halted |= failure.halts;
        self.first.get_or_insert(failure.error);
    }

    fn into_result(self) -> Result<(), Failure> {
        match self.first {
            Some(error) => Err(Failure { error, halts: self.halted }),
            None => Ok(()),
        }
    }
}

impl Scheduler {
    /// Run pending updates of the top frame for `filter` until none remain
    ///
    /// Updates enqueued while draining are picked up by the same call. In
    /// command-line mode every stage is due, whatever `filter` says.
    pub fn drain(&mut self, filter: StageFilter) -> SchedulerResult<DrainReport> {
        let filter = if self.config.is_command_line() {
            StageFilter::All
        } else {
            filter
        };

        self.stats.drain_passes += 1;
        debug!(
            depth = self.stack.depth(),
            pending = self.pending_count(filter),
            ?filter,
            "draining deferred updates"
        );

        let mut round = RoundScope::default();
        let mut report = DrainReport::default();

        let outcome = self.drain_top_frame(filter, &mut round, &mut report);
        let finished = self.finish_round(&mut round);

        outcome.map_err(|f| f.error)?;
        finished?;

        debug!(executed = report.executed, max_depth = report.max_depth, "drain complete");
        Ok(report)
    }

    /// Run `update` right away under the normal round posture, bypassing the queue
    ///
    /// Sub-updates it enqueues are run before this returns. If the round it
    /// needs cannot be arranged, the update is left pending in the current frame.
    pub fn attempt_update(&mut self, update: Update) -> SchedulerResult<DrainReport> {
        let stage = self.stack.current().active_stage().unwrap_or(Stage::PreSend);

        let mut round = RoundScope::default();
        let mut report = DrainReport::default();

        let outcome = self.run_with_child_frame(update, stage, &mut round, &mut report);
        let finished = self.finish_round(&mut round);

        outcome.map_err(|f| f.error)?;
        finished?;
        Ok(report)
    }

    fn fail_fast(&self) -> bool {
        self.config.failure_policy == FailurePolicy::FailFast
    }

    fn drain_top_frame(
        &mut self,
        filter: StageFilter,
        round: &mut RoundScope,
        report: &mut DrainReport,
    ) -> Result<(), Failure> {
        let depth = self.stack.depth();
        let mut errors = PassErrors::default();

        for &stage in filter.stages() {
            while !errors.halted {
                let next = self.stack.frame_mut(depth).and_then(|f| f.pop_front(stage));
                let Some(update) = next else {
                    break;
                };
                if let Err(f) = self.run_with_child_frame(update, stage, round, report) {
                    errors.record(f);
                }
            }
        }

        errors.into_result()
    }

    fn run_with_child_frame(
        &mut self,
        update: Update,
        stage: Stage,
        round: &mut RoundScope,
        report: &mut DrainReport,
    ) -> Result<(), Failure> {
        let parent = self.stack.depth();
        let depth = self.stack.descend(stage);
        report.max_depth = report.max_depth.max(depth);

        let mut errors = PassErrors::default();
        if let Err(f) = self.run_update(update, parent, stage, depth, round, report) {
            errors.record(f);
        }

        // Sub-queue of the update that just ran, no further nesting
        while !errors.halted {
            let next = self.stack.frame_mut(depth).and_then(|f| f.pop_front(stage));
            let Some(child) = next else {
                break;
            };
            if let Err(f) = self.run_update(child, depth, stage, depth, round, report) {
                errors.record(f);
            }
        }

        let ascended = self.stack.ascend();
        if let Ok(moved) = ascended.as_ref() {
            if *moved > 0 {
                debug!(moved, depth, "moved pending sub-updates to parent frame");
            }
        }

        match (errors.into_result(), ascended) {
            (Err(f), Err(stack_err)) => {
                error!(error = %stack_err, "scope stack damaged while unwinding failed update");
                Err(f)
            }
            (Err(f), Ok(_)) => Err(f),
            (Ok(()), Err(stack_err)) => Err(Failure::halting(stack_err)),
            (Ok(()), Ok(_)) => Ok(()),
        }
    }

    /// Run one update taken from bucket `stage` of the frame at depth `from`
    fn run_update(
        &mut self,
        update: Update,
        from: usize,
        stage: Stage,
        depth: usize,
        round: &mut RoundScope,
        report: &mut DrainReport,
    ) -> Result<(), Failure> {
        let kind = update.kind().to_string();
        let posture = update.posture();

        let restore = match self.enter_posture(&posture, &kind, round) {
            Ok(restore) => restore,
            Err(error) => {
                // Not run, so it goes back where it was taken from
                warn!(kind = %kind, error = %error, "could not arrange round; update left pending");
                return match self.stack.frame_mut(from) {
                    Some(frame) => {
                        frame.push_front(update, stage);
                        Err(Failure::halting(error))
                    }
                    None => Err(Failure::halting(internal_error!(
                        "frame {} missing while requeueing '{}'",
                        from,
                        kind
                    ))),
                };
            }
        };

        let timer = UpdateTimer::start();
        let result = update.run(self);
        self.stats.record_run(result.is_ok(), depth, timer);

        let restored = self.leave_posture(restore);

        match result {
            Ok(()) => {
                report.executed += 1;
                restored.map_err(Failure::halting)?;
                if !self.fail_fast() {
                    // Commit per update so a later rollback only loses the failing one
                    self.commit_owned_round(round).map_err(Failure::halting)?;
                }
                Ok(())
            }
            Err(error) => {
                report.failed += 1;
                error!(kind = %kind, depth, error = %error, "deferred update failed");
                if let Err(e) = restored {
                    warn!(error = %e, "could not restore round after update failure");
                }
                self.rollback_owned_round(round);
                Err(Failure { error, halts: self.fail_fast() })
            }
        }
    }

    fn enter_posture(
        &mut self,
        posture: &RoundPosture,
        kind: &str,
        round: &mut RoundScope,
    ) -> SchedulerResult<RoundRestore> {
        match posture {
            RoundPosture::Ambient => {
                self.ensure_round(kind, round)?;
                Ok(RoundRestore::Nothing)
            }
            RoundPosture::OwnedBy(origin) => {
                self.ensure_round(kind, round)?;
                let previous = self
                    .transactions
                    .round_owner()
                    .unwrap_or_else(|| self.config.round_owner.clone());
                self.transactions.set_round_owner(origin)?;
                Ok(RoundRestore::Owner {
                    origin: origin.clone(),
                    previous,
                })
            }
            RoundPosture::Outside => {
                let mut restore = RoundRestore::Nothing;
                if self.transactions.has_open_round() {
                    let ours = self.transactions.round_owner().as_deref()
                        == Some(self.config.round_owner.as_str());
                    if ours {
                        self.transactions.close_round(&self.config.round_owner)?;
                        round.owns = false;
                    } else {
                        // Someone else's round: set aside, reinstated afterwards
                        self.transactions.suspend_round()?;
                        restore = RoundRestore::Resume;
                    }
                }
                if self.transactions.has_open_round() {
                    return Err(SchedulerError::RoundPostureViolation {
                        kind: kind.to_string(),
                        detail: "round still open before round-defining update".to_string(),
                    });
                }
                Ok(restore)
            }
        }
    }

    fn leave_posture(&mut self, restore: RoundRestore) -> SchedulerResult<()> {
        match restore {
            RoundRestore::Nothing => Ok(()),
            RoundRestore::Owner { origin, previous } => {
                // The callable may have committed its round itself
                if self.transactions.round_owner().as_deref() == Some(origin.as_str()) {
                    self.transactions.set_round_owner(&previous)?;
                }
                Ok(())
            }
            RoundRestore::Resume => self.transactions.resume_round(),
        }
    }

    fn ensure_round(&mut self, kind: &str, round: &mut RoundScope) -> SchedulerResult<()> {
        if !self.transactions.has_open_round() {
            self.transactions.open_round(&self.config.round_owner)?;
            round.owns = true;
        }
        if !self.transactions.has_open_round() {
            return Err(SchedulerError::RoundPostureViolation {
                kind: kind.to_string(),
                detail: "no ambient round after opening one".to_string(),
            });
        }
        Ok(())
    }

    fn owns_open_round(&self, round: &RoundScope) -> bool {
        round.owns
            && self.transactions.round_owner().as_deref() == Some(self.config.round_owner.as_str())
    }

    fn commit_owned_round(&mut self, round: &mut RoundScope) -> SchedulerResult<()> {
        if self.owns_open_round(round) {
            self.transactions.close_round(&self.config.round_owner)?;
        }
        round.owns = false;
        Ok(())
    }

    fn rollback_owned_round(&mut self, round: &mut RoundScope) {
        if self.owns_open_round(round) {
            if let Err(e) = self.transactions.rollback_round(&self.config.round_owner) {
                warn!(error = %e, "failed to roll back round after update failure");
            }
        }
        round.owns = false;
    }

    /// Close the round this drain call opened, if it is still open
    fn finish_round(&mut self, round: &mut RoundScope) -> SchedulerResult<()> {
        if round.owns && self.transactions.has_open_round() && !self.owns_open_round(round) {
            warn!(
                owner = ?self.transactions.round_owner(),
                "round left open under a foreign owner; not closing it"
            );
        }
        self.commit_owned_round(round)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::error::testing::{assert_error_class, assert_error_contains};
    use crate::jobs::MemoryJobQueue;
    use crate::round::{InMemoryRounds, TransactionManager};
    use crate::update::CallableUpdate;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn scheduler_with(config: SchedulerConfig) -> (Scheduler, InMemoryRounds) {
        let rounds = InMemoryRounds::new();
        let scheduler = Scheduler::new(config, rounds.clone(), MemoryJobQueue::new()).unwrap();
        (scheduler, rounds)
    }

    fn log_into(log: &Rc<RefCell<Vec<String>>>, label: &str) -> impl FnOnce(&mut Scheduler) -> SchedulerResult<()> {
        let log = Rc::clone(log);
        let label = label.to_string();
        move |_| {
            log.borrow_mut().push(label);
            Ok(())
        }
    }

    #[test]
    fn test_drain_runs_once_and_empties() {
        let (mut scheduler, _) = scheduler_with(SchedulerConfig::default());
        let ran = Rc::new(RefCell::new(0));

        let r = Rc::clone(&ran);
        scheduler.add_callable(move |_| {
            *r.borrow_mut() += 1;
            Ok(())
        });

        let report = scheduler.drain(StageFilter::All).unwrap();
        assert_eq!(report.executed, 1);
        assert_eq!(report.max_depth, 1);
        assert_eq!(*ran.borrow(), 1);

        scheduler.drain(StageFilter::All).unwrap();
        assert_eq!(*ran.borrow(), 1);
        assert_eq!(scheduler.pending_count(StageFilter::All), 0);
    }

    #[test]
    fn test_stage_filter_respected() {
        let (mut scheduler, _) = scheduler_with(SchedulerConfig::default());
        let log = Rc::new(RefCell::new(Vec::new()));

        scheduler.enqueue(Update::callable(log_into(&log, "post")), Stage::PostSend);
        scheduler.enqueue(Update::callable(log_into(&log, "pre")), Stage::PreSend);

        scheduler.drain(StageFilter::PostSend).unwrap();
        assert_eq!(*log.borrow(), vec!["post"]);
        assert_eq!(scheduler.pending_count(StageFilter::PreSend), 1);

        scheduler.drain(StageFilter::PreSend).unwrap();
        assert_eq!(*log.borrow(), vec!["post", "pre"]);
    }

    #[test]
    fn test_all_runs_presend_before_postsend() {
        let (mut scheduler, _) = scheduler_with(SchedulerConfig::default());
        let log = Rc::new(RefCell::new(Vec::new()));

        scheduler.enqueue(Update::callable(log_into(&log, "post1")), Stage::PostSend);
        scheduler.enqueue(Update::callable(log_into(&log, "pre1")), Stage::PreSend);
        scheduler.enqueue(Update::callable(log_into(&log, "post2")), Stage::PostSend);
        scheduler.enqueue(Update::callable(log_into(&log, "pre2")), Stage::PreSend);

        scheduler.drain(StageFilter::All).unwrap();
        assert_eq!(*log.borrow(), vec!["pre1", "pre2", "post1", "post2"]);
    }

    #[test]
    fn test_command_line_drains_everything() {
        let (mut scheduler, _) = scheduler_with(SchedulerConfig::command_line());
        let log = Rc::new(RefCell::new(Vec::new()));

        scheduler.enqueue(Update::callable(log_into(&log, "post")), Stage::PostSend);
        scheduler.drain(StageFilter::PostSend).unwrap();

        assert_eq!(*log.borrow(), vec!["post"]);
    }

    #[test]
    fn test_ordinary_update_sees_round_and_drain_closes_it() {
        let (mut scheduler, rounds) = scheduler_with(SchedulerConfig::default());
        let seen = Rc::new(RefCell::new(None));

        let s = Rc::clone(&seen);
        scheduler.add_callable(move |sched| {
            *s.borrow_mut() = Some(sched.transactions().has_open_round());
            Ok(())
        });

        assert!(!rounds.has_open_round());
        scheduler.drain(StageFilter::All).unwrap();

        assert_eq!(*seen.borrow(), Some(true));
        assert!(!rounds.has_open_round());
        assert_eq!(rounds.commits(), 1);
    }

    #[test]
    fn test_round_open_on_entry_is_left_alone() {
        let (mut scheduler, mut rounds) = scheduler_with(SchedulerConfig::default());
        rounds.open_round("Outer::request").unwrap();

        scheduler.add_callable(|sched| {
            assert_eq!(sched.transactions().round_owner().as_deref(), Some("Outer::request"));
            Ok(())
        });
        scheduler.drain(StageFilter::All).unwrap();

        assert_eq!(rounds.round_owner().as_deref(), Some("Outer::request"));
        assert_eq!(rounds.commits(), 0);
    }

    #[test]
    fn test_round_defining_update_runs_outside_round() {
        let (mut scheduler, rounds) = scheduler_with(SchedulerConfig::default());
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s = Rc::clone(&seen);
        scheduler.add_callable(move |sched| {
            s.borrow_mut().push(("ordinary", sched.transactions().has_open_round()));
            Ok(())
        });
        let s = Rc::clone(&seen);
        scheduler.add_update(Update::round_defining(move |sched| {
            s.borrow_mut().push(("defining", sched.transactions().has_open_round()));
            Ok(())
        }));
        let s = Rc::clone(&seen);
        scheduler.add_callable(move |sched| {
            s.borrow_mut().push(("after", sched.transactions().has_open_round()));
            Ok(())
        });

        scheduler.drain(StageFilter::All).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![("ordinary", true), ("defining", false), ("after", true)]
        );
        assert!(!rounds.has_open_round());
        assert_eq!(rounds.commits(), 2);
    }

    /// Rounds whose `open_round` can be made to fail, e.g. while a replica lags
    struct FlakyRounds {
        inner: InMemoryRounds,
        refuse_open: Rc<Cell<bool>>,
    }

    impl TransactionManager for FlakyRounds {
        fn has_open_round(&self) -> bool {
            self.inner.has_open_round()
        }

        fn round_owner(&self) -> Option<String> {
            self.inner.round_owner()
        }

        fn open_round(&mut self, owner: &str) -> SchedulerResult<()> {
            if self.refuse_open.get() {
                return Err(SchedulerError::RoundAlreadyOpen {
                    owner: "Replica::lag".to_string(),
                });
            }
            self.inner.open_round(owner)
        }

        fn close_round(&mut self, owner: &str) -> SchedulerResult<()> {
            self.inner.close_round(owner)
        }

        fn rollback_round(&mut self, owner: &str) -> SchedulerResult<()> {
            self.inner.rollback_round(owner)
        }

        fn set_round_owner(&mut self, owner: &str) -> SchedulerResult<()> {
            self.inner.set_round_owner(owner)
        }

        fn suspend_round(&mut self) -> SchedulerResult<String> {
            self.inner.suspend_round()
        }

        fn resume_round(&mut self) -> SchedulerResult<()> {
            self.inner.resume_round()
        }
    }

    fn flaky_scheduler(policy: FailurePolicy) -> (Scheduler, Rc<Cell<bool>>) {
        let refuse_open = Rc::new(Cell::new(true));
        let rounds = FlakyRounds {
            inner: InMemoryRounds::new(),
            refuse_open: Rc::clone(&refuse_open),
        };
        let config = SchedulerConfig::default().with_failure_policy(policy);
        let scheduler = Scheduler::new(config, rounds, MemoryJobQueue::new()).unwrap();
        (scheduler, refuse_open)
    }

    fn labelled(log: &Rc<RefCell<Vec<String>>>, label: &str) -> Update {
        Update::Callable(CallableUpdate::new(log_into(log, label)).with_kind(label))
    }

    #[test]
    fn test_round_defining_suspends_foreign_round() {
        let (mut scheduler, mut rounds) = scheduler_with(SchedulerConfig::default());
        rounds.open_round("Outer::request").unwrap();
        let seen = Rc::new(RefCell::new(None));

        let s = Rc::clone(&seen);
        scheduler.add_update(Update::round_defining(move |sched| {
            *s.borrow_mut() = Some(sched.transactions().has_open_round());
            Ok(())
        }));
        scheduler.drain(StageFilter::All).unwrap();

        assert_eq!(*seen.borrow(), Some(false));
        assert_eq!(scheduler.recursive_depth(), 0);
        assert_eq!(rounds.round_owner().as_deref(), Some("Outer::request"));
        rounds.close_round("Outer::request").unwrap();
        assert_eq!(rounds.commits(), 1);
    }

    #[test]
    fn test_failed_round_setup_keeps_update_pending() {
        for policy in [FailurePolicy::FailFast, FailurePolicy::Continue] {
            let (mut scheduler, refuse_open) = flaky_scheduler(policy);
            let log = Rc::new(RefCell::new(Vec::new()));

            scheduler.add_update(labelled(&log, "a"));
            scheduler.add_update(labelled(&log, "b"));

            assert_error_class(scheduler.drain(StageFilter::All), "transaction");
            assert!(log.borrow().is_empty());
            assert_eq!(scheduler.pending_kinds(StageFilter::All), vec!["a", "b"]);
            assert_eq!(scheduler.recursive_depth(), 0);

            refuse_open.set(false);
            scheduler.drain(StageFilter::All).unwrap();
            assert_eq!(*log.borrow(), vec!["a", "b"]);
            assert_eq!(scheduler.pending_count(StageFilter::All), 0);
        }
    }

    #[test]
    fn test_attempt_update_left_pending_when_round_unavailable() {
        let (mut scheduler, refuse_open) = flaky_scheduler(FailurePolicy::FailFast);
        let log = Rc::new(RefCell::new(Vec::new()));

        assert_error_class(scheduler.attempt_update(labelled(&log, "now")), "transaction");
        assert_eq!(scheduler.pending_kinds(StageFilter::All), vec!["now"]);
        assert_eq!(scheduler.recursive_depth(), 0);

        refuse_open.set(false);
        scheduler.drain(StageFilter::All).unwrap();
        assert_eq!(*log.borrow(), vec!["now"]);
    }

    #[test]
    fn test_origin_callable_returns_ownership_to_outer_round() {
        let (mut scheduler, mut rounds) = scheduler_with(SchedulerConfig::default());
        rounds.open_round("Outer::request").unwrap();
        let owner_seen = Rc::new(RefCell::new(None));

        let o = Rc::clone(&owner_seen);
        scheduler
            .enqueue_callable(Stage::PreSend, Some("Links::doUpdate"), move |sched| {
                *o.borrow_mut() = sched.transactions().round_owner();
                Ok(())
            })
            .unwrap();
        scheduler.drain(StageFilter::All).unwrap();

        assert_eq!(owner_seen.borrow().as_deref(), Some("Links::doUpdate"));
        assert_eq!(rounds.round_owner().as_deref(), Some("Outer::request"));
        rounds.close_round("Outer::request").unwrap();
        assert!(!rounds.has_open_round());
    }

    #[test]
    fn test_round_defining_inside_origin_callable() {
        let (mut scheduler, rounds) = scheduler_with(SchedulerConfig::default());
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s = Rc::clone(&seen);
        scheduler
            .enqueue_callable(Stage::PreSend, Some("Links::doUpdate"), move |sched| {
                let inner = Rc::clone(&s);
                sched.add_update(Update::round_defining(move |sched| {
                    inner.borrow_mut().push(sched.transactions().round_owner());
                    Ok(())
                }));
                sched.drain(StageFilter::All)?;
                s.borrow_mut().push(sched.transactions().round_owner());
                Ok(())
            })
            .unwrap();
        scheduler.drain(StageFilter::All).unwrap();

        assert_eq!(*seen.borrow(), vec![None, Some("Links::doUpdate".to_string())]);
        assert!(!rounds.has_open_round());
        assert_eq!(scheduler.recursive_depth(), 0);
    }

    #[test]
    fn test_callable_origin_owns_round_during_call() {
        let (mut scheduler, rounds) = scheduler_with(SchedulerConfig::default());
        let owner_seen = Rc::new(RefCell::new(None));

        let o = Rc::clone(&owner_seen);
        scheduler
            .enqueue_callable(Stage::PreSend, Some("LinksUpdate::doUpdate"), move |sched| {
                *o.borrow_mut() = sched.transactions().round_owner();
                Ok(())
            })
            .unwrap();
        let o = Rc::clone(&owner_seen);
        scheduler.add_callable(move |sched| {
            // Ownership is back with the scheduler for the next update
            assert_eq!(
                sched.transactions().round_owner().as_deref(),
                Some(crate::config::DEFAULT_ROUND_OWNER)
            );
            assert!(o.borrow().is_some());
            Ok(())
        });

        scheduler.drain(StageFilter::All).unwrap();
        assert_eq!(owner_seen.borrow().as_deref(), Some("LinksUpdate::doUpdate"));
        assert!(!rounds.has_open_round());
    }

    #[test]
    fn test_attempt_update_callable_commits_under_origin() {
        let (mut scheduler, rounds) = scheduler_with(SchedulerConfig::default());
        let called = Rc::new(RefCell::new(false));

        let c = Rc::clone(&called);
        let update = CallableUpdate::new(move |sched| {
            sched.transactions_mut().close_round("Test::callbackRounds")?;
            *c.borrow_mut() = true;
            Ok(())
        })
        .with_origin("Test::callbackRounds")
        .unwrap();

        scheduler.attempt_update(Update::Callable(update)).unwrap();

        assert!(*called.borrow());
        assert!(!rounds.has_open_round());
        assert_eq!(rounds.commits(), 1);
    }

    #[test]
    fn test_failure_propagates_and_keeps_rest() {
        let (mut scheduler, rounds) = scheduler_with(SchedulerConfig::default());
        let log = Rc::new(RefCell::new(Vec::new()));

        scheduler.add_callable(log_into(&log, "first"));
        scheduler.add_update(Update::Callable(
            CallableUpdate::new(|_| Err(SchedulerError::update_failed("Broken", "boom")))
                .with_kind("Broken"),
        ));
        scheduler.add_callable(log_into(&log, "third"));

        assert_error_contains(scheduler.drain(StageFilter::All), "boom");

        assert_eq!(*log.borrow(), vec!["first"]);
        assert_eq!(scheduler.recursive_depth(), 0);
        assert_eq!(scheduler.pending_kinds(StageFilter::All), vec!["CallableUpdate"]);
        assert!(!rounds.has_open_round());
        assert_eq!(rounds.rollbacks(), 1);

        // The survivor still runs on the next drain
        scheduler.drain(StageFilter::All).unwrap();
        assert_eq!(*log.borrow(), vec!["first", "third"]);
    }

    #[test]
    fn test_failing_update_children_are_not_lost() {
        let (mut scheduler, _) = scheduler_with(SchedulerConfig::default());
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = Rc::clone(&log);
        scheduler.add_callable(move |sched| {
            sched.add_callable(log_into(&l, "child"));
            Err(SchedulerError::update_failed("Parent", "failed after enqueueing"))
        });

        assert!(scheduler.drain(StageFilter::All).is_err());
        assert_eq!(scheduler.pending_count(StageFilter::All), 1);

        scheduler.drain(StageFilter::All).unwrap();
        assert_eq!(*log.borrow(), vec!["child"]);
    }

    #[test]
    fn test_continue_policy_runs_everything_then_reports() {
        let config = SchedulerConfig::default().with_failure_policy(FailurePolicy::Continue);
        let (mut scheduler, rounds) = scheduler_with(config);
        let log = Rc::new(RefCell::new(Vec::new()));

        scheduler.add_callable(log_into(&log, "first"));
        scheduler.add_callable(|_| Err(SchedulerError::update_failed("Broken", "first failure")));
        scheduler.add_callable(|_| Err(SchedulerError::update_failed("Broken", "second failure")));
        scheduler.add_callable(log_into(&log, "last"));

        assert_error_contains(scheduler.drain(StageFilter::All), "first failure");

        assert_eq!(*log.borrow(), vec!["first", "last"]);
        assert_eq!(scheduler.pending_count(StageFilter::All), 0);
        assert_eq!(rounds.commits(), 2);
        assert_eq!(rounds.rollbacks(), 2);
        assert_eq!(scheduler.stats().failed, 2);
    }
}

//! Deferred updates: the units of work buffered by the scheduler
//!
//! An `Update` is a closed set of variants, tagged by what the scheduler must
//! do around it:
//! - `Simple`: run it, nothing else
//! - `Mergeable`: may absorb a later update with the same merge key at enqueue time
//! - `RoundDefining`: must run with no ambient transaction round
//! - `Callable`: a closure, optionally run under its own round owner label
//!
//! Any variant can additionally be enqueueable, i.e. convertible into an
//! asynchronous job (`job_specification()` returns `Some`).

use std::any::Any;
use std::fmt;
use serde::{Deserialize, Serialize};
use crate::config::validate_label;
use crate::error::SchedulerResult;
use crate::queue::MergeKey;
use crate::scheduler::Scheduler;

pub mod job;

pub use job::{EnqueueableJob, JobSpecification};

/// Release gate for a pending update
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Must run before the response is considered sent
    PreSend,
    /// Runs after the response has been flushed
    PostSend,
}

impl Stage {
    /// Stages in release order
    pub const ORDERED: [Stage; 2] = [Stage::PreSend, Stage::PostSend];

    pub(crate) fn index(self) -> usize {
        match self {
            Stage::PreSend => 0,
            Stage::PostSend => 1,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::PreSend => write!(f, "presend"),
            Stage::PostSend => write!(f, "postsend"),
        }
    }
}

/// Which stage bucket(s) an operation looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StageFilter {
    PreSend,
    PostSend,
    /// PRESEND then POSTSEND
    #[default]
    All,
}

impl StageFilter {
    /// Stages covered by this filter, in release order
    pub fn stages(self) -> &'static [Stage] {
        match self {
            StageFilter::PreSend => &[Stage::PreSend],
            StageFilter::PostSend => &[Stage::PostSend],
            StageFilter::All => &Stage::ORDERED,
        }
    }

    pub fn contains(self, stage: Stage) -> bool {
        self.stages().contains(&stage)
    }
}

impl From<Stage> for StageFilter {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::PreSend => StageFilter::PreSend,
            Stage::PostSend => StageFilter::PostSend,
        }
    }
}

/// A unit of deferred work
pub trait DeferrableUpdate {
    /// Perform the update. The scheduler is handed back so the update can
    /// enqueue more work, force a nested drain, or reach the round manager.
    fn do_update(&mut self, scheduler: &mut Scheduler) -> SchedulerResult<()>;

    /// Short type label used in logs, stats and merge keys
    fn kind(&self) -> &str;

    /// Job this update can be converted into instead of running inline
    fn job_specification(&self) -> Option<EnqueueableJob> {
        None
    }
}

/// An update that can absorb later updates of the same kind and key
pub trait MergeableUpdate: DeferrableUpdate {
    /// Updates with equal `kind()` and `merge_key()` are merged
    fn merge_key(&self) -> String;

    /// Fold `other` into `self`; `other` is dropped afterwards and never runs
    fn merge(&mut self, other: Box<dyn MergeableUpdate>);

    /// Access to the concrete type, for `merge` implementations
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

/// Boxed zero-argument action run by callable updates
pub type Action = Box<dyn FnOnce(&mut Scheduler) -> SchedulerResult<()>>;

/// Closure-backed update, used by `Update::Callable` and `Update::RoundDefining`
pub struct CallableUpdate {
    action: Action,
    kind: String,
    origin: Option<String>,
    job: Option<EnqueueableJob>,
}

impl CallableUpdate {
    pub fn new<F>(action: F) -> Self
    where
        F: FnOnce(&mut Scheduler) -> SchedulerResult<()> + 'static,
    {
        Self {
            action: Box::new(action),
            kind: "CallableUpdate".to_string(),
            origin: None,
            job: None,
        }
    }

    /// Round owner label the action runs under (e.g. the enqueueing method)
    pub fn with_origin(mut self, origin: impl Into<String>) -> SchedulerResult<Self> {
        let origin = origin.into();
        validate_label(&origin)?;
        self.origin = Some(origin);
        Ok(self)
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Mark this update as convertible into `job`
    pub fn enqueueable_as(mut self, job: EnqueueableJob) -> Self {
        self.job = Some(job);
        self
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    fn run(self, scheduler: &mut Scheduler) -> SchedulerResult<()> {
        (self.action)(scheduler)
    }
}

impl fmt::Debug for CallableUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallableUpdate")
            .field("kind", &self.kind)
            .field("origin", &self.origin)
            .field("enqueueable", &self.job.is_some())
            .finish()
    }
}

/// What the round controller must arrange before running an update
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RoundPosture {
    /// Ambient round open, owned by the scheduler
    Ambient,
    /// Ambient round open, ownership handed to this label for the call
    OwnedBy(String),
    /// No round may be open
    Outside,
}

/// Buffered unit of deferred work, tagged by capability
pub enum Update {
    Simple(Box<dyn DeferrableUpdate>),
    Mergeable(Box<dyn MergeableUpdate>),
    RoundDefining(CallableUpdate),
    Callable(CallableUpdate),
}

impl Update {
    pub fn simple(update: impl DeferrableUpdate + 'static) -> Self {
        Update::Simple(Box::new(update))
    }

    pub fn mergeable(update: impl MergeableUpdate + 'static) -> Self {
        Update::Mergeable(Box::new(update))
    }

    pub fn callable<F>(action: F) -> Self
    where
        F: FnOnce(&mut Scheduler) -> SchedulerResult<()> + 'static,
    {
        Update::Callable(CallableUpdate::new(action))
    }

    /// Update that must run outside any transaction round
    pub fn round_defining<F>(action: F) -> Self
    where
        F: FnOnce(&mut Scheduler) -> SchedulerResult<()> + 'static,
    {
        Update::RoundDefining(CallableUpdate::new(action).with_kind("RoundDefiningUpdate"))
    }

    pub fn kind(&self) -> &str {
        match self {
            Update::Simple(u) => u.kind(),
            Update::Mergeable(u) => u.kind(),
            Update::RoundDefining(c) | Update::Callable(c) => c.kind(),
        }
    }

    pub fn merge_key(&self) -> Option<MergeKey> {
        match self {
            Update::Mergeable(u) => Some(MergeKey::new(u.kind(), u.merge_key())),
            _ => None,
        }
    }

    pub fn job_specification(&self) -> Option<EnqueueableJob> {
        match self {
            Update::Simple(u) => u.job_specification(),
            Update::Mergeable(u) => u.job_specification(),
            Update::RoundDefining(c) | Update::Callable(c) => c.job.clone(),
        }
    }

    pub fn is_enqueueable(&self) -> bool {
        match self {
            Update::RoundDefining(c) | Update::Callable(c) => c.job.is_some(),
            _ => self.job_specification().is_some(),
        }
    }

    pub(crate) fn posture(&self) -> RoundPosture {
        match self {
            Update::RoundDefining(_) => RoundPosture::Outside,
            Update::Callable(c) => match c.origin() {
                Some(origin) => RoundPosture::OwnedBy(origin.to_string()),
                None => RoundPosture::Ambient,
            },
            _ => RoundPosture::Ambient,
        }
    }

    /// Consume and execute the update
    pub(crate) fn run(self, scheduler: &mut Scheduler) -> SchedulerResult<()> {
        match self {
            Update::Simple(mut u) => u.do_update(scheduler),
            Update::Mergeable(mut u) => u.do_update(scheduler),
            Update::RoundDefining(c) | Update::Callable(c) => c.run(scheduler),
        }
    }

    /// Absorb `other` into `self`. Both must be mergeable with equal keys.
    pub(crate) fn absorb(&mut self, other: Update) -> Result<(), Update> {
        match (self, other) {
            (Update::Mergeable(existing), Update::Mergeable(incoming)) => {
                existing.merge(incoming);
                Ok(())
            }
            (_, other) => Err(other),
        }
    }
}

impl fmt::Debug for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = match self {
            Update::Simple(_) => "Simple",
            Update::Mergeable(_) => "Mergeable",
            Update::RoundDefining(_) => "RoundDefining",
            Update::Callable(_) => "Callable",
        };
        f.debug_struct("Update")
            .field("variant", &variant)
            .field("kind", &self.kind())
            .finish()
    }
}

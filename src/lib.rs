//! Deferred update scheduler
//!
//! Buffers units of work ("updates") produced while handling a request and
//! runs them later, at a point where it is safe: before the response is
//! flushed (PRESEND), after it (POSTSEND), or whenever the transaction layer
//! reports it is idle. Updates may enqueue further updates or drain the
//! scheduler from inside their own execution; a scope stack keeps those
//! nested runs isolated and ordered.
//!
//! ```ignore
//! let mut scheduler = Scheduler::new(SchedulerConfig::default(), rounds, jobs)?;
//! scheduler.add_callable(|_| Ok(()));
//! scheduler.drain(StageFilter::PreSend)?;
//! ```

pub mod error;
pub mod config;
pub mod update;
pub mod queue;
pub mod round;
pub mod jobs;
pub mod metrics;
pub mod scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use config::{ExecutionMode, FailurePolicy, SchedulerConfig};
pub use update::{
    CallableUpdate, DeferrableUpdate, EnqueueableJob, JobSpecification, MergeableUpdate, Stage,
    StageFilter, Update,
};
pub use queue::EnqueueOutcome;
pub use round::{InMemoryRounds, TransactionManager};
pub use jobs::{JobQueue, MemoryJobQueue, SerializedBatch};
pub use metrics::SchedulerStats;
pub use scheduler::{DrainReport, OpportunisticOutcome, Scheduler, SkipReason, SpillReport};

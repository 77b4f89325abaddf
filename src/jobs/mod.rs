//! Asynchronous job queue seam
//!
//! Opportunistic execution spills enqueueable updates here instead of running
//! them inline. `MemoryJobQueue` keeps submitted jobs per domain and can hand
//! them off as a `SerializedBatch`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::debug;
use crate::error::SchedulerResult;
use crate::update::JobSpecification;

pub mod persistence;

pub use persistence::SerializedBatch;

/// Fire-and-forget job submission
pub trait JobQueue {
    /// Push `job` onto the queue for `domain`
    fn submit(&mut self, job: JobSpecification, domain: &str) -> SchedulerResult<()>;
}

/// In-process job queue, grouped by domain in submission order
///
/// Cloning yields another handle to the same queue.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobQueue {
    jobs: Rc<RefCell<BTreeMap<String, Vec<JobSpecification>>>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of queued jobs across all domains
    pub fn len(&self) -> usize {
        self.jobs.borrow().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Jobs queued for `domain`, in submission order
    pub fn jobs_for(&self, domain: &str) -> Vec<JobSpecification> {
        self.jobs.borrow().get(domain).cloned().unwrap_or_default()
    }

    /// Domains with at least one queued job
    pub fn domains(&self) -> Vec<String> {
        self.jobs.borrow().keys().cloned().collect()
    }

    /// Remove and return the jobs of `domain` as a batch ready for hand-off
    pub fn take_batch(&self, domain: &str) -> SerializedBatch {
        let jobs = self.jobs.borrow_mut().remove(domain).unwrap_or_default();
        SerializedBatch::new(domain, jobs)
    }
}

impl JobQueue for MemoryJobQueue {
    fn submit(&mut self, job: JobSpecification, domain: &str) -> SchedulerResult<()> {
        debug!(domain, job_type = %job.job_type, "queued job");
        self.jobs
            .borrow_mut()
            .entry(domain.to_string())
            .or_default()
            .push(job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_groups_by_domain() {
        let mut queue = MemoryJobQueue::new();
        queue.submit(JobSpecification::bare("a").unwrap(), "enwiki").unwrap();
        queue.submit(JobSpecification::bare("b").unwrap(), "dewiki").unwrap();
        queue.submit(JobSpecification::bare("c").unwrap(), "enwiki").unwrap();

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.domains(), vec!["dewiki", "enwiki"]);

        let types: Vec<String> = queue.jobs_for("enwiki").into_iter().map(|j| j.job_type).collect();
        assert_eq!(types, vec!["a", "c"]);
    }

    #[test]
    fn test_take_batch_empties_domain() {
        let mut queue = MemoryJobQueue::new();
        let handle = queue.clone();
        queue.submit(JobSpecification::bare("a").unwrap(), "enwiki").unwrap();

        let batch = handle.take_batch("enwiki");
        assert_eq!(batch.domain, "enwiki");
        assert_eq!(batch.jobs.len(), 1);
        assert!(queue.is_empty());

        assert!(handle.take_batch("enwiki").jobs.is_empty());
    }
}

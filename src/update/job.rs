use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use crate::config::validate_label;
use crate::error::SchedulerResult;

/// Description of an asynchronous job an update can be converted into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpecification {
    /// Job type name understood by the job runner (e.g. "htmlCacheUpdate")
    pub job_type: String,

    /// Job parameters, passed through untouched
    pub params: Map<String, Value>,
}

impl JobSpecification {
    pub fn new(job_type: impl Into<String>, params: Map<String, Value>) -> SchedulerResult<Self> {
        let job_type = job_type.into();
        validate_label(&job_type)?;
        Ok(Self { job_type, params })
    }

    /// Job with no parameters
    pub fn bare(job_type: impl Into<String>) -> SchedulerResult<Self> {
        Self::new(job_type, Map::new())
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// A job plus the data domain (database/wiki) it targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnqueueableJob {
    pub domain: String,
    pub job: JobSpecification,
}

impl EnqueueableJob {
    pub fn new(domain: impl Into<String>, job: JobSpecification) -> Self {
        Self {
            domain: domain.into(),
            job,
        }
    }
}

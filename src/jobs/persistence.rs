//! Hand-off format for spilled jobs
//!
//! A batch of job specifications for one domain, serialized for whatever
//! process runs the asynchronous queue. Supports plain JSON and gzip-compressed
//! JSON.

use serde::{Deserialize, Serialize};
use crate::error::{SchedulerError, SchedulerResult};
use crate::update::JobSpecification;

/// Serialized batch format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedBatch {
    /// Schema version for forward compatibility
    pub version: u32,
    /// Data domain the jobs target
    pub domain: String,
    /// Jobs in submission order
    pub jobs: Vec<JobSpecification>,
    /// RFC3339 timestamp when the batch was taken
    pub enqueued_at: String,
}

impl SerializedBatch {
    pub fn new(domain: impl Into<String>, jobs: Vec<JobSpecification>) -> Self {
        Self {
            version: 1,
            domain: domain.into(),
            jobs,
            enqueued_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Serialize to JSON (human-readable, easier debugging)
    pub fn to_json(&self) -> SchedulerResult<String> {
        serde_json::to_string(self)
            .map_err(|e| SchedulerError::SerializationError {
                message: format!("Failed to serialize batch to JSON: {e}"),
            })
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> SchedulerResult<Self> {
        let batch: Self = serde_json::from_str(json)
            .map_err(|e| SchedulerError::SerializationError {
                message: format!("Failed to deserialize batch from JSON: {e}"),
            })?;
        batch.check_version()?;
        Ok(batch)
    }

    /// Serialize to gzip-compressed JSON (large batches)
    pub fn to_compressed(&self) -> SchedulerResult<Vec<u8>> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let json = serde_json::to_vec(self)?;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)
            .map_err(|e| SchedulerError::SerializationError {
                message: format!("Failed to compress batch: {e}"),
            })?;

        encoder.finish()
            .map_err(|e| SchedulerError::SerializationError {
                message: format!("Failed to finish compression: {e}"),
            })
    }

    /// Deserialize from gzip-compressed JSON
    pub fn from_compressed(data: &[u8]) -> SchedulerResult<Self> {
        use flate2::read::GzDecoder;
        use std::io::Read;

        let mut decoder = GzDecoder::new(data);
        let mut json_bytes = Vec::new();
        decoder.read_to_end(&mut json_bytes)
            .map_err(|e| SchedulerError::SerializationError {
                message: format!("Decompression failed: {e}"),
            })?;

        let batch: Self = serde_json::from_slice(&json_bytes)?;
        batch.check_version()?;
        Ok(batch)
    }

    fn check_version(&self) -> SchedulerResult<()> {
        if self.version != 1 {
            return Err(SchedulerError::SerializationError {
                message: format!("Unsupported batch version {}", self.version),
            });
        }
        Ok(())
    }
}

//! Warehouse engine collaborator traits.
//!
//! Quarry owns no warehouse connection itself. Surrounding application code
//! implements [`WarehouseClient`] against the real engine (BigQuery,
//! Snowflake, ...) and hands it to the gateway; tests drive the gateway with
//! scripted fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifies where a query runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTarget {
    /// Project (or account) identifier.
    pub project: String,
    /// Dataset (or schema) identifier.
    pub dataset: String,
}

impl QueryTarget {
    pub fn new(project: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
        }
    }
}

impl std::fmt::Display for QueryTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.project, self.dataset)
    }
}

/// Handle to a submitted warehouse job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    /// Opaque engine-assigned job identifier.
    pub job_id: String,
}

impl JobHandle {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
        }
    }
}

/// Result of a cost-only dry run.
#[derive(Debug, Clone, Default)]
pub struct DryRunEstimate {
    /// Bytes the query would scan if executed.
    pub bytes_processed: u64,
}

/// Completed job output.
#[derive(Debug, Clone, Default)]
pub struct JobOutcome {
    /// Column names in engine order.
    pub columns: Vec<String>,
    /// Result rows, in whatever order the engine returned them.
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    /// Bytes actually scanned.
    pub bytes_processed: u64,
}

/// Errors reported by the warehouse engine.
///
/// The split drives the gateway's retry decision: `Transient` errors (rate
/// limits, network faults) are retried with backoff inside the caller's
/// timeout budget; `Permanent` errors (malformed semantics, permissions)
/// surface immediately with the engine message verbatim.
#[derive(Error, Debug, Clone)]
pub enum WarehouseError {
    #[error("transient: {0}")]
    Transient(String),

    #[error("{0}")]
    Permanent(String),
}

impl WarehouseError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Warehouse execution collaborator.
///
/// Submission and result retrieval are split so the gateway can abandon a
/// job that outlives the caller's timeout and still know its id.
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    /// Validate the query and report bytes that would be scanned, without
    /// executing it.
    async fn dry_run(
        &self,
        sql: &str,
        target: &QueryTarget,
    ) -> std::result::Result<DryRunEstimate, WarehouseError>;

    /// Submit a query for execution and return its job handle.
    async fn submit(
        &self,
        sql: &str,
        target: &QueryTarget,
    ) -> std::result::Result<JobHandle, WarehouseError>;

    /// Wait for a submitted job and return its output, with rows capped at
    /// `max_results`.
    async fn fetch_result(
        &self,
        job: &JobHandle,
        max_results: usize,
    ) -> std::result::Result<JobOutcome, WarehouseError>;

    /// Attempt to cancel an in-flight job. Returns `false` when the engine
    /// does not support cancellation.
    async fn cancel(&self, job: &JobHandle) -> std::result::Result<bool, WarehouseError> {
        let _ = job;
        Ok(false)
    }
}

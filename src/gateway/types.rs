//! Request and result types for the execution gateway.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::validator::BlockedReason;
use crate::warehouse::QueryTarget;

/// A single query execution request. Not persisted.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// SQL text to validate and run.
    pub sql: String,
    /// Where the query runs.
    pub target: QueryTarget,
    /// Cost-only estimation; never scans or returns rows.
    pub dry_run: bool,
    /// Row cap applied to the result set.
    pub max_results: usize,
    /// Total budget covering validation, all retries, and the final wait.
    pub timeout: Duration,
    /// Caller context carried into logs.
    pub metadata: CallerMetadata,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>, target: QueryTarget) -> Self {
        Self {
            sql: sql.into(),
            target,
            dry_run: false,
            max_results: 1000,
            timeout: Duration::from_secs(60),
            metadata: CallerMetadata::default(),
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn metadata(mut self, metadata: CallerMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Who is asking and why; used only for audit logging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallerMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Terminal state of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Blocked,
    Failed,
    Timeout,
    DryRun,
}

/// Outcome of one gateway call.
///
/// Exactly one status; rows are non-empty only for `Success`;
/// `blocked_reason` is set iff `Blocked`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub status: ExecutionStatus,
    /// Result rows in engine order, capped at the request's `max_results`.
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    /// Column names in engine order.
    pub columns: Vec<String>,
    /// Bytes scanned (actual) or estimated (dry run).
    pub bytes_processed: u64,
    /// Wall time spent inside the gateway, retries included.
    pub elapsed: Duration,
    /// `bytes_processed` priced at the configured per-TiB rate.
    pub estimated_cost_usd: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<BlockedReason>,
    /// Engine job identifier, when a job was submitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Execution attempts made (retries included; 0 when blocked).
    pub attempts: u32,
}

impl QueryResult {
    pub(crate) fn blocked(reason: BlockedReason) -> Self {
        Self {
            status: ExecutionStatus::Blocked,
            error_message: Some(reason.to_string()),
            blocked_reason: Some(reason),
            ..Self::empty()
        }
    }

    pub(crate) fn dry_run(bytes_processed: u64, estimated_cost_usd: f64) -> Self {
        Self {
            status: ExecutionStatus::DryRun,
            bytes_processed,
            estimated_cost_usd,
            ..Self::empty()
        }
    }

    pub(crate) fn success(
        rows: Vec<serde_json::Map<String, serde_json::Value>>,
        columns: Vec<String>,
        bytes_processed: u64,
        estimated_cost_usd: f64,
        job_id: String,
        attempts: u32,
    ) -> Self {
        Self {
            status: ExecutionStatus::Success,
            rows,
            columns,
            bytes_processed,
            estimated_cost_usd,
            job_id: Some(job_id),
            attempts,
            ..Self::empty()
        }
    }

    pub(crate) fn failed(message: impl Into<String>, attempts: u32) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            error_message: Some(message.into()),
            attempts,
            ..Self::empty()
        }
    }

    pub(crate) fn timed_out(job_id: Option<String>, attempts: u32) -> Self {
        Self {
            status: ExecutionStatus::Timeout,
            error_message: Some("query exceeded its timeout budget".to_string()),
            job_id,
            attempts,
            ..Self::empty()
        }
    }

    pub(crate) fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    fn empty() -> Self {
        Self {
            status: ExecutionStatus::Failed,
            rows: Vec::new(),
            columns: Vec::new(),
            bytes_processed: 0,
            elapsed: Duration::ZERO,
            estimated_cost_usd: 0.0,
            error_message: None,
            blocked_reason: None,
            job_id: None,
            attempts: 0,
        }
    }
}

//! Query execution gateway.
//!
//! The only component authorized to send SQL to the warehouse. Every request
//! walks the same pipeline: safety validation, cost estimation, execution
//! with backoff-bounded retries, structured result. All failure modes are
//! encoded in the returned [`QueryResult`]; `execute` itself never errors.

mod retry;
mod types;

pub use retry::RetryPolicy;
pub use types::{CallerMetadata, ExecutionStatus, QueryRequest, QueryResult};

use std::sync::Arc;

use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::validator::{SqlSafetyValidator, Verdict};
use crate::warehouse::{JobHandle, QueryTarget, WarehouseClient, WarehouseError};

const BYTES_PER_TIB: u64 = 1 << 40;

/// Orchestrates validation, estimation, execution, and retries.
///
/// Shares no mutable state between calls; a single gateway may serve
/// concurrent sessions.
pub struct ExecutionGateway {
    client: Arc<dyn WarehouseClient>,
    validator: SqlSafetyValidator,
    retry: RetryPolicy,
    cost_per_tib_usd: f64,
    default_timeout: std::time::Duration,
    default_max_results: usize,
}

impl ExecutionGateway {
    pub fn new(client: Arc<dyn WarehouseClient>, config: &GatewayConfig) -> Self {
        info!(
            cost_per_tib_usd = config.cost_per_tib_usd,
            "ExecutionGateway initialized"
        );
        Self {
            client,
            validator: SqlSafetyValidator::new(),
            retry: RetryPolicy::from_config(&config.retry),
            cost_per_tib_usd: config.cost_per_tib_usd,
            default_timeout: std::time::Duration::from_secs(config.default_timeout_secs),
            default_max_results: config.default_max_results,
        }
    }

    /// Build a request seeded with this gateway's configured default timeout
    /// and row cap.
    pub fn request(&self, sql: impl Into<String>, target: QueryTarget) -> QueryRequest {
        QueryRequest::new(sql, target)
            .timeout(self.default_timeout)
            .max_results(self.default_max_results)
    }

    /// Replace the backoff policy. Mainly for tests and tuned deployments.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Execute a request end to end within its timeout budget.
    pub async fn execute(&self, request: &QueryRequest) -> QueryResult {
        let started = Instant::now();
        let deadline = started + request.timeout;

        let result = self.execute_inner(request, deadline).await;
        let result = result.with_elapsed(started.elapsed());

        match result.status {
            ExecutionStatus::Success => info!(
                rows = result.rows.len(),
                bytes = result.bytes_processed,
                elapsed_ms = result.elapsed.as_millis() as u64,
                attempts = result.attempts,
                domain = request.metadata.domain.as_deref().unwrap_or("-"),
                "query executed"
            ),
            ExecutionStatus::DryRun => info!(
                bytes = result.bytes_processed,
                cost_usd = result.estimated_cost_usd,
                "dry run estimated"
            ),
            ExecutionStatus::Blocked => {}
            ExecutionStatus::Failed | ExecutionStatus::Timeout => warn!(
                status = ?result.status,
                attempts = result.attempts,
                job_id = result.job_id.as_deref().unwrap_or("-"),
                error = result.error_message.as_deref().unwrap_or("-"),
                "query did not succeed"
            ),
        }

        result
    }

    async fn execute_inner(&self, request: &QueryRequest, deadline: Instant) -> QueryResult {
        // Validating. A blocked query never reaches the warehouse.
        if let Verdict::Blocked(reason) = self.validator.validate(&request.sql) {
            warn!(
                rule = reason.rule(),
                session = request.metadata.session_id.as_deref().unwrap_or("-"),
                "query blocked: {reason}"
            );
            return QueryResult::blocked(reason);
        }

        // Estimating. A dry run is a cost-only call; estimation for real
        // execution is folded into the job outcome's byte count.
        if request.dry_run {
            return self.estimate(request, deadline).await;
        }

        // Executing, with transient errors retried while budget remains.
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            let remaining = deadline.saturating_duration_since(Instant::now());
            let handle = match timeout(
                remaining,
                self.client.submit(&request.sql, &request.target),
            )
            .await
            {
                Err(_) => return QueryResult::timed_out(None, attempt),
                Ok(Ok(handle)) => handle,
                Ok(Err(err)) => {
                    match self.backoff_or_give_up(&err, attempt, deadline).await {
                        Some(result) => return result,
                        None => continue,
                    }
                }
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(
                remaining,
                self.client.fetch_result(&handle, request.max_results),
            )
            .await
            {
                Err(_) => {
                    self.abandon(&handle).await;
                    return QueryResult::timed_out(Some(handle.job_id), attempt);
                }
                Ok(Ok(outcome)) => {
                    let mut rows = outcome.rows;
                    rows.truncate(request.max_results);
                    return QueryResult::success(
                        rows,
                        outcome.columns,
                        outcome.bytes_processed,
                        self.estimate_cost(outcome.bytes_processed),
                        handle.job_id,
                        attempt,
                    );
                }
                Ok(Err(err)) => match self.backoff_or_give_up(&err, attempt, deadline).await {
                    Some(mut result) => {
                        result.job_id = Some(handle.job_id);
                        return result;
                    }
                    None => continue,
                },
            }
        }
    }

    async fn estimate(&self, request: &QueryRequest, deadline: Instant) -> QueryResult {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, self.client.dry_run(&request.sql, &request.target)).await {
            Err(_) => QueryResult::timed_out(None, 1),
            Ok(Err(err)) => QueryResult::failed(format!("dry run failed: {err}"), 1),
            Ok(Ok(estimate)) => QueryResult::dry_run(
                estimate.bytes_processed,
                self.estimate_cost(estimate.bytes_processed),
            ),
        }
    }

    /// Decide what to do about an engine error. Returns a terminal result,
    /// or `None` after sleeping out the backoff delay for another attempt.
    async fn backoff_or_give_up(
        &self,
        err: &WarehouseError,
        attempt: u32,
        deadline: Instant,
    ) -> Option<QueryResult> {
        match err {
            // Permanent errors surface the engine message verbatim.
            WarehouseError::Permanent(message) => {
                Some(QueryResult::failed(message.clone(), attempt))
            }
            WarehouseError::Transient(message) => {
                let delay = self.retry.delay_for(attempt);
                if Instant::now() + delay >= deadline {
                    return Some(QueryResult::failed(
                        format!("transient error persisted after {attempt} attempts: {message}"),
                        attempt,
                    ));
                }
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "transient engine error, backing off: {message}"
                );
                sleep(delay).await;
                None
            }
        }
    }

    /// Best-effort cancellation of a job that outlived its budget. The
    /// abandoned job id is logged either way for external reconciliation.
    async fn abandon(&self, handle: &JobHandle) {
        match self.client.cancel(handle).await {
            Ok(true) => info!(job_id = %handle.job_id, "cancelled job after timeout"),
            Ok(false) => warn!(
                job_id = %handle.job_id,
                "abandoned job after timeout; engine does not support cancellation"
            ),
            Err(err) => warn!(
                job_id = %handle.job_id,
                "abandoned job after timeout; cancellation failed: {err}"
            ),
        }
    }

    fn estimate_cost(&self, bytes_processed: u64) -> f64 {
        let cost = bytes_processed as f64 / BYTES_PER_TIB as f64 * self.cost_per_tib_usd;
        (cost * 1e6).round() / 1e6
    }
}

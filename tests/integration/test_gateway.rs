//! End-to-end tests for the execution gateway.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use quarry::{
    DryRunEstimate, ExecutionGateway, ExecutionStatus, GatewayConfig, JobHandle, JobOutcome,
    QueryRequest, QueryTarget, RetryPolicy, WarehouseClient, WarehouseError,
};

fn target() -> QueryTarget {
    QueryTarget::new("analytics-prod", "lending")
}

fn sample_row(key: &str, value: i64) -> serde_json::Map<String, serde_json::Value> {
    let mut row = serde_json::Map::new();
    row.insert(key.to_string(), serde_json::json!(value));
    row
}

/// Fails `submit` with a transient error a fixed number of times, then
/// succeeds. Counts every call it receives.
struct FlakyWarehouse {
    failures_left: AtomicUsize,
    submits: AtomicUsize,
}

impl FlakyWarehouse {
    fn failing(times: usize) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicUsize::new(times),
            submits: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl WarehouseClient for FlakyWarehouse {
    async fn dry_run(
        &self,
        _sql: &str,
        _target: &QueryTarget,
    ) -> Result<DryRunEstimate, WarehouseError> {
        unreachable!("dry run not expected in this scenario")
    }

    async fn submit(&self, _sql: &str, _target: &QueryTarget) -> Result<JobHandle, WarehouseError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(WarehouseError::Transient("quota exceeded".to_string()));
        }
        Ok(JobHandle::new("job-42"))
    }

    async fn fetch_result(
        &self,
        _job: &JobHandle,
        _max_results: usize,
    ) -> Result<JobOutcome, WarehouseError> {
        Ok(JobOutcome {
            columns: vec!["total".to_string()],
            rows: vec![sample_row("total", 7)],
            bytes_processed: 1 << 30,
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_retried_with_backoff() {
    crate::init_tracing();
    let warehouse = FlakyWarehouse::failing(2);
    let gateway = ExecutionGateway::new(warehouse.clone(), &GatewayConfig::default())
        .with_retry_policy(RetryPolicy::new(
            Duration::from_millis(100),
            Duration::from_secs(10),
            2.0,
        ));
    let request = QueryRequest::new("SELECT COUNT(*) AS total FROM loans", target());

    let result = gateway.execute(&request).await;

    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.attempts, 3);
    assert_eq!(warehouse.submits.load(Ordering::SeqCst), 3);
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.job_id.as_deref(), Some("job-42"));
    // Backoff slept 100ms then 200ms on the paused clock.
    assert_eq!(result.elapsed, Duration::from_millis(300));
}

/// Submits instantly but never finishes the fetch. Counts cancellations.
struct HangingWarehouse {
    cancels: AtomicUsize,
}

#[async_trait]
impl WarehouseClient for HangingWarehouse {
    async fn dry_run(
        &self,
        _sql: &str,
        _target: &QueryTarget,
    ) -> Result<DryRunEstimate, WarehouseError> {
        unreachable!()
    }

    async fn submit(&self, _sql: &str, _target: &QueryTarget) -> Result<JobHandle, WarehouseError> {
        Ok(JobHandle::new("job-9"))
    }

    async fn fetch_result(
        &self,
        _job: &JobHandle,
        _max_results: usize,
    ) -> Result<JobOutcome, WarehouseError> {
        std::future::pending().await
    }

    async fn cancel(&self, _job: &JobHandle) -> Result<bool, WarehouseError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeout_cancels_and_reports_job_id() {
    crate::init_tracing();
    let warehouse = Arc::new(HangingWarehouse {
        cancels: AtomicUsize::new(0),
    });
    let gateway = ExecutionGateway::new(warehouse.clone(), &GatewayConfig::default());
    let request = QueryRequest::new("SELECT * FROM loans", target())
        .timeout(Duration::from_secs(1));

    let result = gateway.execute(&request).await;

    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert_eq!(result.job_id.as_deref(), Some("job-9"));
    assert_eq!(result.attempts, 1);
    assert_eq!(warehouse.cancels.load(Ordering::SeqCst), 1);
    assert_eq!(result.elapsed, Duration::from_secs(1));
}

/// Fixed estimate and a fixed five-row result set.
struct FixedWarehouse {
    bytes: u64,
}

#[async_trait]
impl WarehouseClient for FixedWarehouse {
    async fn dry_run(
        &self,
        _sql: &str,
        _target: &QueryTarget,
    ) -> Result<DryRunEstimate, WarehouseError> {
        Ok(DryRunEstimate {
            bytes_processed: self.bytes,
        })
    }

    async fn submit(&self, _sql: &str, _target: &QueryTarget) -> Result<JobHandle, WarehouseError> {
        Ok(JobHandle::new("job-1"))
    }

    async fn fetch_result(
        &self,
        _job: &JobHandle,
        _max_results: usize,
    ) -> Result<JobOutcome, WarehouseError> {
        Ok(JobOutcome {
            columns: vec!["n".to_string()],
            rows: (0..5).map(|i| sample_row("n", i)).collect(),
            bytes_processed: self.bytes,
        })
    }
}

#[tokio::test]
async fn test_dry_run_prices_the_scan() {
    crate::init_tracing();
    let gateway = ExecutionGateway::new(
        Arc::new(FixedWarehouse { bytes: 5 << 40 }),
        &GatewayConfig::default(),
    );
    let request = QueryRequest::new("SELECT * FROM loans", target()).dry_run(true);

    let result = gateway.execute(&request).await;

    assert_eq!(result.status, ExecutionStatus::DryRun);
    assert_eq!(result.bytes_processed, 5 << 40);
    // 5 TiB at the default 6.25 USD/TiB.
    assert_eq!(result.estimated_cost_usd, 31.25);
    assert!(result.rows.is_empty());
    assert!(result.job_id.is_none());
}

#[tokio::test]
async fn test_rows_capped_at_max_results() {
    crate::init_tracing();
    let gateway = ExecutionGateway::new(
        Arc::new(FixedWarehouse { bytes: 1024 }),
        &GatewayConfig::default(),
    );
    let request = QueryRequest::new("SELECT n FROM loans", target()).max_results(2);

    let result = gateway.execute(&request).await;

    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.rows.len(), 2);
}

/// Rejects every submission with a permanent engine error.
struct BrokenQueryWarehouse {
    submits: AtomicUsize,
}

#[async_trait]
impl WarehouseClient for BrokenQueryWarehouse {
    async fn dry_run(
        &self,
        _sql: &str,
        _target: &QueryTarget,
    ) -> Result<DryRunEstimate, WarehouseError> {
        unreachable!()
    }

    async fn submit(&self, _sql: &str, _target: &QueryTarget) -> Result<JobHandle, WarehouseError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        Err(WarehouseError::Permanent(
            "Unrecognized name: colum_a at [1:8]".to_string(),
        ))
    }

    async fn fetch_result(
        &self,
        _job: &JobHandle,
        _max_results: usize,
    ) -> Result<JobOutcome, WarehouseError> {
        unreachable!()
    }
}

#[tokio::test]
async fn test_permanent_error_is_not_retried() {
    crate::init_tracing();
    let warehouse = Arc::new(BrokenQueryWarehouse {
        submits: AtomicUsize::new(0),
    });
    let gateway = ExecutionGateway::new(warehouse.clone(), &GatewayConfig::default());
    let request = QueryRequest::new("SELECT colum_a FROM loans", target());

    let result = gateway.execute(&request).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.attempts, 1);
    assert_eq!(warehouse.submits.load(Ordering::SeqCst), 1);
    // Engine diagnostics pass through untouched.
    assert_eq!(
        result.error_message.as_deref(),
        Some("Unrecognized name: colum_a at [1:8]")
    );
}

#[tokio::test]
async fn test_blocked_statement_reports_rule() {
    crate::init_tracing();
    struct Unreachable;

    #[async_trait]
    impl WarehouseClient for Unreachable {
        async fn dry_run(
            &self,
            _sql: &str,
            _target: &QueryTarget,
        ) -> Result<DryRunEstimate, WarehouseError> {
            panic!("blocked queries must not reach the warehouse");
        }

        async fn submit(
            &self,
            _sql: &str,
            _target: &QueryTarget,
        ) -> Result<JobHandle, WarehouseError> {
            panic!("blocked queries must not reach the warehouse");
        }

        async fn fetch_result(
            &self,
            _job: &JobHandle,
            _max_results: usize,
        ) -> Result<JobOutcome, WarehouseError> {
            panic!("blocked queries must not reach the warehouse");
        }
    }

    let gateway = ExecutionGateway::new(Arc::new(Unreachable), &GatewayConfig::default());
    let request = QueryRequest::new("SELECT 1; DROP TABLE loans;", target());

    let result = gateway.execute(&request).await;

    assert_eq!(result.status, ExecutionStatus::Blocked);
    let reason = result.blocked_reason.expect("blocked result carries a reason");
    assert_eq!(reason.rule(), "multiple-statements");
    assert_eq!(result.attempts, 0);
}

//! Async executor: submit now, poll later.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use c8_domain::{ExecutionContext, Request};

use crate::connection::Connection;
use crate::error::{ExecError, ExecResult, Operation};
use crate::executor::Executor;
use crate::handler::ResponseHandler;
use crate::job::AsyncJob;
use crate::ports::{ASYNC_HEADER, ASYNC_ID_HEADER};

/// Submits each request as a stored server-side job.
///
/// `execute` returns as soon as the server has accepted the job; the bound
/// handler runs only when the caller asks for the job's result. No local
/// task is spawned, so several jobs can be in flight while the caller polls
/// them in any order.
#[derive(Debug, Clone)]
pub struct AsyncExecutor {
    connection: Arc<Connection>,
}

impl AsyncExecutor {
    /// Create an async executor.
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl Executor for AsyncExecutor {
    type Output<T: Send + 'static> = AsyncJob<T>;

    fn context(&self) -> ExecutionContext {
        ExecutionContext::Async
    }

    fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    async fn execute<T: Send + 'static>(
        &self,
        request: Request,
        handler: ResponseHandler<T>,
    ) -> ExecResult<AsyncJob<T>> {
        let flagged = request.with_header(ASYNC_HEADER, "store");
        let response = self.connection.send(&flagged).await?;

        if response.status() != 202 {
            return Err(ExecError::server(Operation::AsyncExecute, &response));
        }

        let job_id = response
            .header(ASYNC_ID_HEADER)
            .ok_or_else(|| {
                ExecError::Decode(format!("async submission returned no {} header", ASYNC_ID_HEADER))
            })?
            .to_string();

        info!(
            %job_id,
            operation = %handler.operation(),
            endpoint = request.endpoint(),
            "Async job submitted"
        );

        Ok(AsyncJob::attach(Arc::clone(&self.connection), job_id, handler))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubFabric;
    use c8_domain::{JobStatus, Method};
    use serde_json::{json, Value};
    use std::time::Duration;

    fn setup() -> (Arc<StubFabric>, AsyncExecutor) {
        let stub = Arc::new(StubFabric::new());
        stub.create_collection("students");
        let connection = Arc::new(Connection::new(stub.clone(), "tp", "db1"));
        (stub, AsyncExecutor::new(connection))
    }

    fn query(text: &str) -> Request {
        Request::builder(Method::Post, "/_api/cursor")
            .json(json!({"query": text}))
            .build()
    }

    #[tokio::test]
    async fn test_execute_returns_pending_job() {
        let (stub, executor) = setup();
        stub.hold_jobs(true);

        let job = executor
            .execute(query("RETURN 1"), ResponseHandler::json(Operation::QueryExecute))
            .await
            .unwrap();

        assert_eq!(executor.context(), ExecutionContext::Async);
        assert_eq!(job.last_status(), JobStatus::Pending);
        assert_eq!(job.status().await.unwrap(), JobStatus::Pending);

        let error = job.result().await.unwrap_err();
        assert!(matches!(error, ExecError::JobNotFinished { .. }));
    }

    #[tokio::test]
    async fn test_result_matches_standard_execution() {
        let (_stub, executor) = setup();

        let job = executor
            .execute(query("RETURN 100000"), ResponseHandler::json(Operation::QueryExecute))
            .await
            .unwrap();

        assert_eq!(job.status().await.unwrap(), JobStatus::Done);
        let body: Value = job.result().await.unwrap();
        assert_eq!(body["result"], json!([100000]));
    }

    #[tokio::test]
    async fn test_failed_job_error_is_preserved_and_consumed() {
        let (_stub, executor) = setup();

        let job = executor
            .execute(query("INVALID QUERY"), ResponseHandler::json(Operation::QueryExecute))
            .await
            .unwrap();

        assert_eq!(job.status().await.unwrap(), JobStatus::Done);

        let error = job.result().await.unwrap_err();
        assert_eq!(error.operation(), Some(Operation::QueryExecute));
        assert_eq!(error.http_code(), Some(400));
        assert_eq!(error.error_code(), Some(1501));
        assert!(error.message().contains("syntax error"));

        let again = job.result().await.unwrap_err();
        assert!(again.is_not_found());
        let cleared = job.clear().await.unwrap_err();
        assert!(cleared.message().ends_with(&format!("job {} not found", job.id())));
    }

    #[tokio::test]
    async fn test_cancel_only_while_pending() {
        let (stub, executor) = setup();
        stub.hold_jobs(true);

        let pending = executor
            .execute(query("RETURN 1"), ResponseHandler::json(Operation::QueryExecute))
            .await
            .unwrap();
        pending.cancel().await.unwrap();
        assert_eq!(pending.status().await.unwrap(), JobStatus::Cancelled);
        assert!(matches!(pending.result().await, Err(ExecError::JobCancelled { .. })));

        let again = pending.cancel().await.unwrap_err();
        assert!(again.is_not_found());

        stub.hold_jobs(false);
        let done = executor
            .execute(query("RETURN 2"), ResponseHandler::json(Operation::QueryExecute))
            .await
            .unwrap();
        assert_eq!(done.status().await.unwrap(), JobStatus::Done);

        let error = done.cancel().await.unwrap_err();
        assert_eq!(error.operation(), Some(Operation::AsyncJobCancel));
        assert!(error.message().ends_with(&format!("job {} not found", done.id())));
    }

    #[tokio::test]
    async fn test_wait_returns_terminal_status() {
        let (stub, executor) = setup();
        stub.hold_jobs(true);

        let done = executor
            .execute(query("RETURN 1"), ResponseHandler::json(Operation::QueryExecute))
            .await
            .unwrap();
        let cancelled = executor
            .execute(query("RETURN 2"), ResponseHandler::json(Operation::QueryExecute))
            .await
            .unwrap();

        let interval = Duration::from_millis(1);
        let still_pending = tokio::time::timeout(Duration::from_millis(20), done.wait(interval)).await;
        assert!(still_pending.is_err());

        cancelled.cancel().await.unwrap();
        stub.run_pending();

        assert_eq!(done.wait(interval).await.unwrap(), JobStatus::Done);
        assert_eq!(cancelled.wait(interval).await.unwrap(), JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_status_never_regresses() {
        let (stub, executor) = setup();
        stub.hold_jobs(true);

        let job = executor
            .execute(query("RETURN 1"), ResponseHandler::json(Operation::QueryExecute))
            .await
            .unwrap();

        stub.run_pending();
        assert_eq!(job.status().await.unwrap(), JobStatus::Done);

        stub.force_pending(job.id());
        let error = job.status().await.unwrap_err();
        assert!(matches!(error, ExecError::StatusRegression { .. }));
        assert_eq!(job.last_status(), JobStatus::Done);
    }

    #[tokio::test]
    async fn test_rejected_submission_fails_immediately() {
        let (stub, executor) = setup();
        stub.set_fail_next(true);

        let error = executor
            .execute(query("RETURN 1"), ResponseHandler::json(Operation::QueryExecute))
            .await
            .unwrap_err();

        assert!(error.is_transport());
        assert_eq!(stub.job_count(), 0);
    }
}

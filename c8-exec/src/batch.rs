//! Batch executor: accumulate locally, flush as one multiplexed call.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use c8_domain::{ExecutionContext, Method, Request};

use crate::bundle;
use crate::connection::Connection;
use crate::error::{ExecError, ExecResult, Operation};
use crate::executor::Executor;
use crate::handler::ResponseHandler;
use crate::job::{BatchJob, Resolver};
use crate::ports::BATCH_ERRORS_HEADER;

/// A request waiting for commit, with the resolver of its job.
pub(crate) struct Queued {
    pub(crate) request: Request,
    pub(crate) resolve: Resolver,
}

/// Queues requests locally and sends them together on [`commit`].
///
/// `execute` never contacts the server. Each queued request resolves its own
/// [`BatchJob`] on commit; one sub-request failing does not affect the
/// others.
///
/// [`commit`]: BatchExecutor::commit
pub struct BatchExecutor {
    connection: Arc<Connection>,
    queue: Mutex<Vec<Queued>>,
}

impl BatchExecutor {
    /// Create a batch executor with an empty queue.
    pub fn new(connection: Arc<Connection>) -> Self {
        Self {
            connection,
            queue: Mutex::new(Vec::new()),
        }
    }

    /// Number of requests waiting for commit.
    pub fn queue_size(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Send every queued request as one bundle, in enqueue order.
    ///
    /// Returns one entry per queued request, in the same order: `Ok(())` when
    /// that request's handler produced a value, or the handler's error. The
    /// typed values live in the corresponding [`BatchJob`]s.
    ///
    /// The queue is drained whether or not the commit succeeds; jobs from a
    /// drained queue cannot be recommitted. An empty queue commits nothing
    /// and returns an empty list.
    ///
    /// # Errors
    ///
    /// Transport failures, a failing bundle response, or an undecodable
    /// bundle. Jobs stay `Queued` in that case.
    pub async fn commit(&self) -> ExecResult<Vec<ExecResult<()>>> {
        let queued = {
            let mut queue = self.queue.lock().map_err(|e| {
                ExecError::InvalidState(format!("Failed to acquire batch queue lock: {}", e))
            })?;
            std::mem::take(&mut *queue)
        };

        if queued.is_empty() {
            debug!("Batch commit with empty queue");
            return Ok(Vec::new());
        }

        let routed: Vec<Request> = queued
            .iter()
            .map(|entry| self.connection.route(&entry.request))
            .collect();

        let request = Request::builder(Method::Post, "/_api/batch")
            .header("content-type", bundle::content_type())
            .text(bundle::encode_requests(&routed))
            .build();

        info!(requests = queued.len(), "Committing batch");

        let response = self.connection.send(&request).await?;
        if !response.is_success() {
            warn!(status = response.status(), "Batch commit rejected");
            return Err(ExecError::server(Operation::BatchExecute, &response));
        }

        let boundary = response
            .header("content-type")
            .and_then(bundle::boundary_from)
            .unwrap_or(bundle::BOUNDARY);
        let parts = bundle::decode_responses(&response.body_text(), boundary)?;

        if parts.len() != queued.len() {
            return Err(ExecError::Decode(format!(
                "batch returned {} parts for {} requests",
                parts.len(),
                queued.len()
            )));
        }

        let outcomes: Vec<ExecResult<()>> = queued
            .into_iter()
            .zip(parts)
            .map(|(entry, part)| (entry.resolve)(part))
            .collect();

        let failed = outcomes.iter().filter(|o| o.is_err()).count();
        info!(
            requests = outcomes.len(),
            failed,
            server_reported = response.header(BATCH_ERRORS_HEADER).unwrap_or("0"),
            "Batch committed"
        );

        Ok(outcomes)
    }
}

#[async_trait]
impl Executor for BatchExecutor {
    type Output<T: Send + 'static> = BatchJob<T>;

    fn context(&self) -> ExecutionContext {
        ExecutionContext::Batch
    }

    fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    async fn execute<T: Send + 'static>(
        &self,
        request: Request,
        handler: ResponseHandler<T>,
    ) -> ExecResult<BatchJob<T>> {
        let mut queue = self.queue.lock().map_err(|e| {
            ExecError::InvalidState(format!("Failed to acquire batch queue lock: {}", e))
        })?;

        let (job, resolve) = BatchJob::queued(queue.len(), handler);
        queue.push(Queued { request, resolve });

        debug!(queued = queue.len(), "Request added to batch");
        Ok(job)
    }
}

impl std::fmt::Debug for BatchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("connection", &self.connection)
            .field("queued", &self.queue_size())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

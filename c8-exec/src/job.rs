//! Deferred results.
//!
//! - [`AsyncJob`] tracks a server-side job through `pending → done |
//!   cancelled`. The server is the sole source of truth; the job caches only
//!   the last status it observed.
//! - [`BatchJob`] (and its alias [`TransactionJob`]) is a local placeholder
//!   that the enclosing batch or transaction resolves on commit.
//!
//! Stored errors are converted into returned failures only by `result()`.

use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

use c8_domain::{BatchJobStatus, JobStatus, Method, Request, Response};

use crate::connection::Connection;
use crate::error::{ExecError, ExecResult, Operation};
use crate::handler::ResponseHandler;
use crate::ports::ASYNC_ID_HEADER;

// =============================================================================
// Async Job
// =============================================================================

/// Handle to an operation running asynchronously on the server.
pub struct AsyncJob<T> {
    id: String,
    connection: Arc<Connection>,
    handler: ResponseHandler<T>,
    last_status: RwLock<JobStatus>,
}

impl<T> AsyncJob<T> {
    /// Attach to a job id issued by the server.
    ///
    /// Used by the async executor after submission, and to re-attach to ids
    /// obtained from a job listing.
    pub fn attach(
        connection: Arc<Connection>,
        id: impl Into<String>,
        handler: ResponseHandler<T>,
    ) -> Self {
        Self {
            id: id.into(),
            connection,
            handler,
            last_status: RwLock::new(JobStatus::Pending),
        }
    }

    /// Server-assigned job id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Operation the job will interpret its result for.
    pub fn operation(&self) -> Operation {
        self.handler.operation()
    }

    /// Status seen by the most recent server call (no round trip).
    pub fn last_status(&self) -> JobStatus {
        self.last_status.read().map(|s| *s).unwrap_or(JobStatus::Pending)
    }

    /// Query the server for the job's current status.
    ///
    /// # Errors
    ///
    /// - `JobNotFound` if the server no longer tracks the job
    /// - `StatusRegression` if the server reports a status that would move
    ///   the job backwards from a terminal state
    pub async fn status(&self) -> ExecResult<JobStatus> {
        let request = Request::builder(Method::Get, self.endpoint()).build();
        let response = self.connection.send(&request).await?;

        let observed = match response.status() {
            204 => JobStatus::Pending,
            200 => JobStatus::Done,
            410 => JobStatus::Cancelled,
            404 => return Err(ExecError::job_not_found(Operation::AsyncJobStatus, &self.id)),
            _ => return Err(ExecError::server(Operation::AsyncJobStatus, &response)),
        };

        self.observe(observed)
    }

    /// Fetch the job's result and apply the bound handler.
    ///
    /// If the operation itself failed, the handler's structured error is
    /// returned unchanged. The server drops a failed job's record when its
    /// result is fetched, so a second call reports `JobNotFound`.
    ///
    /// # Errors
    ///
    /// - `JobNotFinished` while the job is pending
    /// - `JobCancelled` for a cancelled job
    /// - `JobNotFound` if the record is gone
    pub async fn result(&self) -> ExecResult<T> {
        let request = Request::builder(Method::Put, self.endpoint()).build();
        let response = self.connection.send(&request).await?;

        // Only a stored result carries the job id; anything else is about the job.
        if response.header(ASYNC_ID_HEADER).is_none() {
            return match response.status() {
                204 => Err(ExecError::JobNotFinished {
                    job_id: self.id.clone(),
                }),
                404 => Err(ExecError::job_not_found(Operation::AsyncJobResult, &self.id)),
                410 => {
                    self.observe(JobStatus::Cancelled)?;
                    Err(ExecError::JobCancelled {
                        job_id: self.id.clone(),
                    })
                },
                _ => Err(ExecError::server(Operation::AsyncJobResult, &response)),
            };
        }

        self.observe(JobStatus::Done)?;
        debug!(
            job_id = %self.id,
            operation = %self.handler.operation(),
            status = response.status(),
            "Applying handler to async job result"
        );

        self.handler.handle(response)
    }

    /// Cancel the job while it is still pending.
    ///
    /// # Errors
    ///
    /// `JobNotFound` once the job is done, cancelled, or cleared.
    pub async fn cancel(&self) -> ExecResult<()> {
        let request =
            Request::builder(Method::Put, format!("{}/cancel", self.endpoint())).build();
        let response = self.connection.send(&request).await?;

        match response.status() {
            200 => {
                self.observe(JobStatus::Cancelled)?;
                debug!(job_id = %self.id, "Async job cancelled");
                Ok(())
            },
            404 => Err(ExecError::job_not_found(Operation::AsyncJobCancel, &self.id)),
            _ => Err(ExecError::server(Operation::AsyncJobCancel, &response)),
        }
    }

    /// Delete the job record from the server, whatever its status.
    ///
    /// # Errors
    ///
    /// `JobNotFound` if the record was already removed.
    pub async fn clear(&self) -> ExecResult<()> {
        let request = Request::builder(Method::Delete, self.endpoint()).build();
        let response = self.connection.send(&request).await?;

        match response.status() {
            200 => {
                debug!(job_id = %self.id, "Async job cleared");
                Ok(())
            },
            404 => Err(ExecError::job_not_found(Operation::AsyncJobClear, &self.id)),
            _ => Err(ExecError::server(Operation::AsyncJobClear, &response)),
        }
    }

    /// Poll `status()` every `interval` until the job leaves `Pending`.
    ///
    /// Runs on the caller's task; nothing is spawned.
    pub async fn wait(&self, interval: Duration) -> ExecResult<JobStatus> {
        loop {
            let status = self.status().await?;
            if status.is_terminal() {
                return Ok(status);
            }
            tokio::time::sleep(interval).await;
        }
    }

    fn endpoint(&self) -> String {
        format!("/_api/job/{}", self.id)
    }

    /// Record an observed status, enforcing monotonic transitions.
    fn observe(&self, observed: JobStatus) -> ExecResult<JobStatus> {
        let mut last = self.last_status.write().map_err(|e| {
            ExecError::InvalidState(format!("Failed to acquire job status lock: {}", e))
        })?;

        if !last.can_transition_to(observed) {
            warn!(
                job_id = %self.id,
                from = %*last,
                to = %observed,
                "Server reported a non-monotonic job status"
            );
            return Err(ExecError::StatusRegression {
                job_id: self.id.clone(),
                from: *last,
                to: observed,
            });
        }

        *last = observed;
        Ok(observed)
    }
}

impl<T> fmt::Debug for AsyncJob<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncJob")
            .field("id", &self.id)
            .field("operation", &self.handler.operation())
            .field("last_status", &self.last_status())
            .finish()
    }
}

// =============================================================================
// Batch Job
// =============================================================================

/// Placeholder for a result delivered by a batch (or transaction) commit.
///
/// Has no server id. Resolves to a value or an error independently of its
/// siblings.
pub struct BatchJob<T> {
    index: usize,
    slot: Arc<Mutex<Option<ExecResult<T>>>>,
}

/// A step recorded into a transaction; resolved only by a successful commit.
pub type TransactionJob<T> = BatchJob<T>;

/// Type-erased resolution of one queued request.
///
/// Applies the bound handler, stores the outcome in the job's slot and
/// reports success or the (cloned) error back to the commit.
pub(crate) type Resolver = Box<dyn FnOnce(Response) -> ExecResult<()> + Send>;

impl<T: Send + 'static> BatchJob<T> {
    /// Create an unresolved job and the resolver that completes it.
    pub(crate) fn queued(index: usize, handler: ResponseHandler<T>) -> (Self, Resolver) {
        let slot = Arc::new(Mutex::new(None));
        let target = Arc::clone(&slot);

        let resolver: Resolver = Box::new(move |response| {
            let outcome = handler.handle(response);
            let report = match &outcome {
                Ok(_) => Ok(()),
                Err(e) => Err(e.clone()),
            };

            match target.lock() {
                Ok(mut slot) => *slot = Some(outcome),
                Err(e) => {
                    return Err(ExecError::InvalidState(format!(
                        "Failed to acquire job slot lock: {}",
                        e
                    )))
                },
            }

            report
        });

        (Self { index, slot }, resolver)
    }
}

impl<T> BatchJob<T> {
    /// Zero-based position of the request within its batch or script.
    pub fn index(&self) -> usize {
        self.index
    }

    /// `Queued` until the commit delivers this job's outcome.
    pub fn status(&self) -> BatchJobStatus {
        match self.slot.lock() {
            Ok(slot) if slot.is_some() => BatchJobStatus::Done,
            _ => BatchJobStatus::Queued,
        }
    }

    /// Take the outcome out of the job.
    ///
    /// # Errors
    ///
    /// The stored handler error, or `Unresolved` if no commit delivered a
    /// result (not committed yet, or the commit failed as a whole).
    pub fn into_result(self) -> ExecResult<T> {
        let mut slot = self.slot.lock().map_err(|e| {
            ExecError::InvalidState(format!("Failed to acquire job slot lock: {}", e))
        })?;

        slot.take().unwrap_or_else(|| Err(self.unresolved()))
    }

    fn unresolved(&self) -> ExecError {
        ExecError::Unresolved(format!("job {} has no result (not committed)", self.index))
    }
}

impl<T: Clone> BatchJob<T> {
    /// The outcome, leaving it in place.
    ///
    /// # Errors
    ///
    /// Same as [`BatchJob::into_result`].
    pub fn result(&self) -> ExecResult<T> {
        let slot = self.slot.lock().map_err(|e| {
            ExecError::InvalidState(format!("Failed to acquire job slot lock: {}", e))
        })?;

        match slot.as_ref() {
            Some(outcome) => outcome.clone(),
            None => Err(self.unresolved()),
        }
    }
}

impl<T> fmt::Debug for BatchJob<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchJob")
            .field("index", &self.index)
            .field("status", &self.status())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

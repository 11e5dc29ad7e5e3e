//! Fabric wrapper and execution-context entry points.
//!
//! A fabric is opened in the standard context. The `begin_*` methods derive
//! a fabric over the same connection in another context; every collection
//! and query object taken from a fabric inherits its context.
//!
//! ```rust,ignore
//! let fabric = client.fabric();
//!
//! let async_fabric = fabric.begin_async_execution();
//! let job = async_fabric.collection("students").insert(json!({"_key": "Lily"})).await?;
//!
//! let batch = fabric.begin_batch_execution();
//! let count = batch.collection("students").count().await?;
//! batch.commit().await?;
//! ```

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use c8_domain::{ExecutionContext, JobStatus, Method, Request};
use c8_exec::{
    AsyncExecutor, AsyncJob, BatchExecutor, Connection, ExecError, ExecResult, Executor, Operation,
    ResponseHandler, StandardExecutor, TransactionExecutor, TransactionOptions,
};

use crate::c8ql::C8ql;
use crate::collection::{collection_list, Collection, CollectionInfo};

/// A fabric (database) bound to one execution context.
pub struct Fabric<E: Executor> {
    executor: Arc<E>,
}

/// Fabric whose operations run immediately.
pub type StandardFabric = Fabric<StandardExecutor>;
/// Fabric whose operations become server-side async jobs.
pub type AsyncFabric = Fabric<AsyncExecutor>;
/// Fabric whose operations are queued until `commit`.
pub type BatchFabric = Fabric<BatchExecutor>;
/// Fabric whose operations are recorded into one atomic transaction.
pub type TransactionFabric = Fabric<TransactionExecutor>;

impl<E: Executor> Fabric<E> {
    /// Wrap an executor.
    pub fn new(executor: E) -> Self {
        Self {
            executor: Arc::new(executor),
        }
    }

    /// Fabric name.
    pub fn name(&self) -> &str {
        self.connection().fabric()
    }

    /// Execution context of this fabric and everything derived from it.
    pub fn context(&self) -> ExecutionContext {
        self.executor.context()
    }

    /// The executor operations are dispatched through.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Connection shared with derived fabrics and jobs.
    pub fn connection(&self) -> &Arc<Connection> {
        self.executor.connection()
    }

    /// Collection in this fabric's context.
    pub fn collection(&self, name: &str) -> Collection<E> {
        Collection::new(name, Arc::clone(&self.executor))
    }

    /// Query entry point in this fabric's context.
    pub fn c8ql(&self) -> C8ql<E> {
        C8ql::new(Arc::clone(&self.executor))
    }

    /// List collections.
    pub async fn collections(&self) -> ExecResult<E::Output<Vec<CollectionInfo>>> {
        let request = Request::builder(Method::Get, "/_api/collection").build();
        let handler = ResponseHandler::on_success(Operation::CollectionList, |response| {
            collection_list(response.into_body())
        });

        self.executor.execute(request, handler).await
    }

    /// Create a document collection.
    pub async fn create_collection(&self, name: &str) -> ExecResult<E::Output<CollectionInfo>> {
        let request = Request::builder(Method::Post, "/_api/collection")
            .json(json!({ "name": name }))
            .build();

        self.executor
            .execute(request, ResponseHandler::deserialize(Operation::CollectionCreate))
            .await
    }

    /// Delete a collection.
    pub async fn delete_collection(&self, name: &str) -> ExecResult<E::Output<()>> {
        let request = Request::builder(Method::Delete, format!("/_api/collection/{}", name))
            .write(name)
            .build();

        self.executor
            .execute(
                request,
                ResponseHandler::on_success(Operation::CollectionDelete, |_| Ok(())),
            )
            .await
    }

    // =========================================================================
    // Async job management
    // =========================================================================
    //
    // These always run as immediate round trips, whatever the context.

    /// Up to `count` job ids with the given status (`Done` or `Pending`).
    ///
    /// # Errors
    ///
    /// `InvalidState` for `Cancelled`; the server keeps no such listing.
    pub async fn async_jobs(&self, status: JobStatus, count: usize) -> ExecResult<Vec<String>> {
        if status == JobStatus::Cancelled {
            return Err(ExecError::InvalidState(
                "async jobs can only be listed as done or pending".to_string(),
            ));
        }

        let request = Request::builder(Method::Get, format!("/_api/job/{}", status.as_str()))
            .param("count", count)
            .build();

        self.immediate()
            .execute(request, ResponseHandler::deserialize(Operation::AsyncJobList))
            .await
    }

    /// Delete every job record on the server.
    pub async fn clear_async_jobs(&self) -> ExecResult<()> {
        let request = Request::builder(Method::Delete, "/_api/job/all").build();

        self.immediate()
            .execute(
                request,
                ResponseHandler::on_success(Operation::AsyncJobClear, |_| Ok(())),
            )
            .await?;
        info!(fabric = self.name(), "All async jobs cleared");
        Ok(())
    }

    /// Delete job records created before `stamp`.
    pub async fn clear_async_jobs_before(&self, stamp: DateTime<Utc>) -> ExecResult<()> {
        let seconds = stamp.timestamp_millis() as f64 / 1000.0;
        let request = Request::builder(Method::Delete, "/_api/job/expired")
            .param("stamp", seconds)
            .build();

        self.immediate()
            .execute(
                request,
                ResponseHandler::on_success(Operation::AsyncJobClear, |_| Ok(())),
            )
            .await?;
        info!(fabric = self.name(), %stamp, "Expired async jobs cleared");
        Ok(())
    }

    /// Re-attach to a job by id; its result is returned as raw JSON.
    pub fn async_job(&self, id: &str) -> AsyncJob<Value> {
        AsyncJob::attach(
            Arc::clone(self.connection()),
            id,
            ResponseHandler::json(Operation::AsyncJobResult),
        )
    }

    fn immediate(&self) -> StandardExecutor {
        StandardExecutor::new(Arc::clone(self.connection()))
    }
}

impl StandardFabric {
    /// Same fabric, async context.
    pub fn begin_async_execution(&self) -> AsyncFabric {
        Fabric::new(AsyncExecutor::new(Arc::clone(self.connection())))
    }

    /// Same fabric, batch context with an empty queue.
    pub fn begin_batch_execution(&self) -> BatchFabric {
        Fabric::new(BatchExecutor::new(Arc::clone(self.connection())))
    }

    /// Same fabric, transaction context with an empty script.
    pub fn begin_transaction(&self, options: TransactionOptions) -> TransactionFabric {
        Fabric::new(TransactionExecutor::new(Arc::clone(self.connection()), options))
    }
}

impl BatchFabric {
    /// Send every queued operation. See [`BatchExecutor::commit`].
    pub async fn commit(&self) -> ExecResult<Vec<ExecResult<()>>> {
        self.executor.commit().await
    }

    /// Number of queued operations.
    pub fn queue_size(&self) -> usize {
        self.executor.queue_size()
    }
}

impl TransactionFabric {
    /// Run the recorded script atomically. See [`TransactionExecutor::commit`].
    pub async fn commit(&self) -> ExecResult<Vec<ExecResult<()>>> {
        self.executor.commit().await
    }

    /// Number of recorded steps.
    pub fn queue_size(&self) -> usize {
        self.executor.queue_size()
    }
}

impl<E: Executor> std::fmt::Debug for Fabric<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fabric")
            .field("name", &self.name())
            .field("context", &self.context())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

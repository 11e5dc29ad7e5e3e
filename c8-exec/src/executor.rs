//! Executor: dispatch strategy for request/handler pairs.
//!
//! Every wrapper method builds a `(Request, ResponseHandler)` pair and hands
//! it to the executor it was constructed with. The variant decides what
//! `execute` returns:
//!
//! ```text
//! Standard     → T                   (one round trip, now)
//! Async        → AsyncJob<T>         (server job, poll later)
//! Batch        → BatchJob<T>         (queued, resolved on commit)
//! Transaction  → TransactionJob<T>   (recorded, resolved on atomic commit)
//! ```
//!
//! The return shape is the associated `Output` type, so callers never branch
//! on the context at runtime.

use async_trait::async_trait;
use std::sync::Arc;

use c8_domain::{ExecutionContext, Request};

use crate::connection::Connection;
use crate::error::ExecResult;
use crate::handler::ResponseHandler;

/// Polymorphic dispatch strategy.
#[async_trait]
pub trait Executor: Send + Sync {
    /// What `execute` hands back for an operation producing `T`.
    type Output<T: Send + 'static>: Send;

    /// Execution context this executor implements.
    fn context(&self) -> ExecutionContext;

    /// Connection the executor sends through.
    fn connection(&self) -> &Arc<Connection>;

    /// Dispatch one operation.
    ///
    /// # Errors
    ///
    /// Transport failures are always surfaced here, immediately. Whether a
    /// domain error is surfaced here or deferred to `result()`/`commit()`
    /// depends on the variant.
    async fn execute<T: Send + 'static>(
        &self,
        request: Request,
        handler: ResponseHandler<T>,
    ) -> ExecResult<Self::Output<T>>;
}

// =============================================================================
// Standard Executor
// =============================================================================

/// Sends each request immediately and returns the interpreted result.
#[derive(Debug, Clone)]
pub struct StandardExecutor {
    connection: Arc<Connection>,
}

impl StandardExecutor {
    /// Create a standard executor.
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl Executor for StandardExecutor {
    type Output<T: Send + 'static> = T;

    fn context(&self) -> ExecutionContext {
        ExecutionContext::Standard
    }

    fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    async fn execute<T: Send + 'static>(
        &self,
        request: Request,
        handler: ResponseHandler<T>,
    ) -> ExecResult<T> {
        let response = self.connection.send(&request).await?;
        handler.handle(response)
    }
}

// =============================================================================
// Tests
// =============================================================================

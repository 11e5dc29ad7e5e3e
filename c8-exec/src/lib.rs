//! C8 Execution Layer
//!
//! One call site, four execution semantics.
//!
//! # Architecture
//!
//! ```text
//! Wrapper → (Request, ResponseHandler) → Executor → Connection → Transport
//!                                            │
//!                     T | AsyncJob<T> | BatchJob<T> | TransactionJob<T>
//! ```
//!
//! # Components
//!
//! - **Ports**: the `Transport` trait, the only way out to the fabric
//! - **Connection**: tenant/fabric routing shared by executors and jobs
//! - **Handlers**: pure response interpreters bound at the call site
//! - **Executors**: Standard, Async, Batch and Transaction dispatch
//! - **Jobs**: deferred results with a monotonic status lifecycle
//! - **Stub**: in-memory fabric for tests
//!
//! # Example
//!
//! ```rust,ignore
//! use c8_exec::{AsyncExecutor, Connection, Executor, Operation, ResponseHandler, StubFabric};
//! use std::sync::Arc;
//!
//! let connection = Arc::new(Connection::new(Arc::new(StubFabric::new()), "tp", "db1"));
//! let executor = AsyncExecutor::new(connection);
//!
//! let job = executor.execute(request, ResponseHandler::json(Operation::QueryExecute)).await?;
//! if job.status().await? == JobStatus::Done {
//!     let body = job.result().await?;
//! }
//! ```

#![warn(clippy::all)]

pub mod async_executor;
pub mod batch;
pub mod bundle;
pub mod connection;
pub mod error;
pub mod executor;
pub mod handler;
pub mod job;
pub mod ports;
pub mod stub;
pub mod transaction;

// Re-exports for convenience
pub use async_executor::AsyncExecutor;
pub use batch::BatchExecutor;
pub use connection::Connection;
pub use error::{ExecError, ExecResult, Operation};
pub use executor::{Executor, StandardExecutor};
pub use handler::{decode, ResponseHandler};
pub use job::{AsyncJob, BatchJob, TransactionJob};
pub use ports::{Transport, ASYNC_HEADER, ASYNC_ID_HEADER, BATCH_ERRORS_HEADER};
pub use stub::StubFabric;
pub use transaction::{TransactionExecutor, TransactionOptions};

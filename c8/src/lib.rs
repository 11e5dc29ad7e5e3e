//! C8 Fabric Client
//!
//! Execution-context wrappers over the C8 execution layer.
//!
//! # Components
//!
//! - **Client**: transport setup and authentication
//! - **Fabric**: entry point; derives async, batch and transaction contexts
//! - **Collection**: document operations in the fabric's context
//! - **C8ql**: queries and cursors
//! - **Config**: environment-driven configuration

#![warn(clippy::all)]

pub mod c8ql;
pub mod client;
pub mod collection;
pub mod config;
pub mod error;
pub mod fabric;

// Re-exports
pub use c8ql::{C8ql, Cursor, QueryOptions};
pub use client::C8Client;
pub use collection::{Collection, CollectionInfo, DocumentMeta};
pub use config::{AuthConfig, ClientConfig, Environment, ServerConfig};
pub use error::{ClientError, ClientResult};
pub use fabric::{AsyncFabric, BatchFabric, Fabric, StandardFabric, TransactionFabric};

pub use c8_domain::{BatchJobStatus, ExecutionContext, JobStatus};
pub use c8_exec::{
    AsyncJob, BatchJob, ExecError, ExecResult, Operation, TransactionJob, TransactionOptions,
};

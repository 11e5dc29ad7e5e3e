//! Execution layer port definitions.
//!
//! The [`Transport`] port is the only way the core reaches the fabric.
//! Adapters implement it for specific carriers (HTTP, the in-memory stub).

use async_trait::async_trait;

use c8_domain::{Request, Response};

use crate::error::ExecError;

/// Header that asks the server to run a request as a stored async job.
pub const ASYNC_HEADER: &str = "x-c8-async";

/// Header carrying the server-assigned async job id.
pub const ASYNC_ID_HEADER: &str = "x-c8-async-id";

/// Header carrying the number of failed parts in a batch response.
pub const BATCH_ERRORS_HEADER: &str = "x-c8-errors";

/// Port for one blocking request/response exchange with the fabric.
///
/// Implementations:
/// - `StubFabric` - In-memory fabric for tests
/// - `HttpTransport` - Real fabric over HTTP (c8-connectors)
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one fully-routed request and return the raw response.
    ///
    /// # Errors
    ///
    /// `ExecError::Transport` / `ExecError::Timeout` when the exchange could
    /// not complete. A response with a failing status is still `Ok`; turning
    /// it into a domain error is the response handler's job.
    async fn send(&self, request: &Request) -> Result<Response, ExecError>;
}

//! Client error types.

use c8_connectors::HttpTransportError;
use c8_domain::DomainError;
use c8_exec::ExecError;
use thiserror::Error;

/// Client-level errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Execution error
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// HTTP transport could not be built
    #[error("Transport setup error: {0}")]
    Transport(#[from] HttpTransportError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

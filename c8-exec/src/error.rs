//! Execution layer error types.
//!
//! Every executor funnels failures through [`ExecError`]. Server-reported
//! failures keep their `(http_code, error_code, message)` triple intact no
//! matter how long the result was deferred.

use std::fmt;
use thiserror::Error;

use c8_domain::{JobStatus, Response, ServerError};

/// The API operation a response was interpreted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Submitting a request for async execution
    AsyncExecute,
    /// Polling an async job
    AsyncJobStatus,
    /// Fetching an async job's result
    AsyncJobResult,
    /// Cancelling an async job
    AsyncJobCancel,
    /// Deleting an async job record
    AsyncJobClear,
    /// Listing async job ids
    AsyncJobList,
    /// Committing a batch
    BatchExecute,
    /// Committing a transaction
    TransactionExecute,
    /// Listing collections
    CollectionList,
    /// Creating a collection
    CollectionCreate,
    /// Deleting a collection
    CollectionDelete,
    /// Counting documents
    CollectionCount,
    /// Truncating a collection
    CollectionTruncate,
    /// Inserting a document
    DocumentInsert,
    /// Reading a document
    DocumentGet,
    /// Deleting a document
    DocumentDelete,
    /// Running a C8QL query
    QueryExecute,
    /// Fetching the next cursor batch
    CursorNext,
    /// Obtaining a session token
    Authenticate,
}

impl Operation {
    /// Human-readable operation name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::AsyncExecute => "async execute",
            Operation::AsyncJobStatus => "async job status",
            Operation::AsyncJobResult => "async job result",
            Operation::AsyncJobCancel => "async job cancel",
            Operation::AsyncJobClear => "async job clear",
            Operation::AsyncJobList => "async job list",
            Operation::BatchExecute => "batch execute",
            Operation::TransactionExecute => "transaction execute",
            Operation::CollectionList => "collection list",
            Operation::CollectionCreate => "collection create",
            Operation::CollectionDelete => "collection delete",
            Operation::CollectionCount => "collection count",
            Operation::CollectionTruncate => "collection truncate",
            Operation::DocumentInsert => "document insert",
            Operation::DocumentGet => "document get",
            Operation::DocumentDelete => "document delete",
            Operation::QueryExecute => "C8QL query execute",
            Operation::CursorNext => "cursor next",
            Operation::Authenticate => "authenticate",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while executing operations.
#[derive(Debug, Clone, Error)]
pub enum ExecError {
    /// Connectivity failure; nothing reached the server
    #[error("Transport error: {0}")]
    Transport(String),

    /// Round trip exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// Server answered with a failing response
    #[error("{operation} failed: {error}")]
    Server {
        /// Operation whose response failed
        operation: Operation,
        /// Structured server detail
        error: ServerError,
    },

    /// The server no longer tracks the job
    #[error("{operation} failed: job {job_id} not found")]
    JobNotFound {
        /// Job call that failed
        operation: Operation,
        /// Server-assigned job id
        job_id: String,
    },

    /// Result requested while the job is still pending
    #[error("async job result failed: job {job_id} not finished")]
    JobNotFinished {
        /// Server-assigned job id
        job_id: String,
    },

    /// Result requested for a cancelled job
    #[error("async job result failed: job {job_id} was cancelled")]
    JobCancelled {
        /// Server-assigned job id
        job_id: String,
    },

    /// Server reported a status that breaks monotonicity
    #[error("job {job_id} status regressed from {from} to {to}")]
    StatusRegression {
        /// Server-assigned job id
        job_id: String,
        /// Last observed status
        from: JobStatus,
        /// Newly reported status
        to: JobStatus,
    },

    /// Batch or transaction job read before its commit delivered a result
    #[error("Job unresolved: {0}")]
    Unresolved(String),

    /// Transaction used after `commit()`
    #[error("Transaction already committed")]
    TransactionCommitted,

    /// Response could not be interpreted
    #[error("Malformed response: {0}")]
    Decode(String),

    /// Local state could not be accessed
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl ExecError {
    /// Build a server error from a failing response.
    pub fn server(operation: Operation, response: &Response) -> Self {
        ExecError::Server {
            operation,
            error: response.server_error(),
        }
    }

    /// Build a job-not-found error.
    pub fn job_not_found(operation: Operation, job_id: impl Into<String>) -> Self {
        ExecError::JobNotFound {
            operation,
            job_id: job_id.into(),
        }
    }

    /// HTTP status associated with the error, if any.
    pub fn http_code(&self) -> Option<u16> {
        match self {
            ExecError::Server { error, .. } => Some(error.http_code),
            ExecError::JobNotFound { .. } => Some(404),
            ExecError::JobNotFinished { .. } => Some(204),
            ExecError::JobCancelled { .. } => Some(410),
            _ => None,
        }
    }

    /// Service-specific error number, if the server supplied one.
    pub fn error_code(&self) -> Option<i64> {
        match self {
            ExecError::Server { error, .. } => Some(error.error_code),
            _ => None,
        }
    }

    /// Human-readable detail.
    ///
    /// For server errors this is the server's message verbatim; for job
    /// lookups it is `job {id} not found`.
    pub fn message(&self) -> String {
        match self {
            ExecError::Server { error, .. } => error.message.clone(),
            ExecError::JobNotFound { job_id, .. } => format!("job {} not found", job_id),
            other => other.to_string(),
        }
    }

    /// Operation the error belongs to, if known.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            ExecError::Server { operation, .. } | ExecError::JobNotFound { operation, .. } => {
                Some(*operation)
            },
            ExecError::JobNotFinished { .. } | ExecError::JobCancelled { .. } => {
                Some(Operation::AsyncJobResult)
            },
            _ => None,
        }
    }

    /// True when the server no longer tracks the job.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ExecError::JobNotFound { .. })
    }

    /// True for failures that happened before the server could answer.
    pub fn is_transport(&self) -> bool {
        matches!(self, ExecError::Transport(_) | ExecError::Timeout)
    }
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_keeps_structured_detail() {
        let response = Response::error(400, 1501, "syntax error, unexpected identifier");
        let error = ExecError::server(Operation::QueryExecute, &response);

        assert_eq!(error.http_code(), Some(400));
        assert_eq!(error.error_code(), Some(1501));
        assert!(error.message().contains("syntax error"));
        assert_eq!(error.operation(), Some(Operation::QueryExecute));
        assert_eq!(
            error.to_string(),
            "C8QL query execute failed: [HTTP 400][ERR 1501] syntax error, unexpected identifier"
        );
    }

    #[test]
    fn test_job_not_found_message() {
        let error = ExecError::job_not_found(Operation::AsyncJobCancel, "17");

        assert!(error.is_not_found());
        assert!(error.message().ends_with("job 17 not found"));
        assert!(error.to_string().ends_with("job 17 not found"));
        assert_eq!(error.http_code(), Some(404));
        assert_eq!(error.error_code(), None);
    }

    #[test]
    fn test_transport_classification() {
        assert!(ExecError::Timeout.is_transport());
        assert!(ExecError::Transport("refused".to_string()).is_transport());
        assert!(!ExecError::TransactionCommitted.is_transport());
    }
}

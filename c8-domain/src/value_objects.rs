//! Value objects for the C8 client domain.
//!
//! Small, copyable enums describing how an operation is dispatched and where
//! a deferred result currently stands.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Unknown job status string
    #[error("Invalid job status: {0}")]
    InvalidJobStatus(String),

    /// Unknown execution context string
    #[error("Invalid execution context: {0}")]
    InvalidContext(String),

    /// Unknown HTTP method
    #[error("Invalid method: {0}")]
    InvalidMethod(String),
}

// =============================================================================
// Execution Context
// =============================================================================

/// The mode under which a wrapper dispatches its operations.
///
/// Fixed when the executor is built; every wrapper derived from a fabric
/// shares the fabric's executor and therefore its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionContext {
    /// Immediate execution, results returned inline
    #[serde(rename = "sync")]
    Standard,
    /// Fire-and-poll execution through server-side jobs
    Async,
    /// Queued locally, flushed as one multiplexed call
    Batch,
    /// Recorded into an atomic script, applied on commit
    Transaction,
}

impl ExecutionContext {
    /// Wire/display name of the context.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionContext::Standard => "sync",
            ExecutionContext::Async => "async",
            ExecutionContext::Batch => "batch",
            ExecutionContext::Transaction => "transaction",
        }
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionContext {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync" | "standard" => Ok(ExecutionContext::Standard),
            "async" => Ok(ExecutionContext::Async),
            "batch" => Ok(ExecutionContext::Batch),
            "transaction" => Ok(ExecutionContext::Transaction),
            other => Err(DomainError::InvalidContext(other.to_string())),
        }
    }
}

// =============================================================================
// Job Status
// =============================================================================

/// Server-side state of an async job.
///
/// # Invariants
/// - Transitions are monotonic: `Pending → Done` or `Pending → Cancelled`
/// - Terminal states never return to `Pending` and never swap with each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Queued or running on the server
    Pending,
    /// Finished; a result (success or failure) is available
    Done,
    /// Cancelled before it finished
    Cancelled,
}

impl JobStatus {
    /// Wire/display name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Done => "done",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// True for `Done` and `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }

    /// Whether observing `next` after `self` respects monotonicity.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            JobStatus::Pending => true,
            terminal => *terminal == next,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "done" => Ok(JobStatus::Done),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(DomainError::InvalidJobStatus(other.to_string())),
        }
    }
}

/// Client-side state of a batch or transaction job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchJobStatus {
    /// Waiting for the enclosing batch/transaction to commit
    Queued,
    /// Resolved to a value or an error
    Done,
}

impl fmt::Display for BatchJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchJobStatus::Queued => write!(f, "queued"),
            BatchJobStatus::Done => write!(f, "done"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_names() {
        assert_eq!(ExecutionContext::Standard.to_string(), "sync");
        assert_eq!(ExecutionContext::Async.to_string(), "async");
        assert_eq!(ExecutionContext::Batch.to_string(), "batch");
        assert_eq!(ExecutionContext::Transaction.to_string(), "transaction");
        assert_eq!("async".parse::<ExecutionContext>().unwrap(), ExecutionContext::Async);
        assert!("parallel".parse::<ExecutionContext>().is_err());
    }

    #[test]
    fn test_context_serializes_as_wire_name() {
        let json = serde_json::to_string(&ExecutionContext::Standard).unwrap();
        assert_eq!(json, "\"sync\"");
    }

    #[test]
    fn test_job_status_parse() {
        assert_eq!("pending".parse::<JobStatus>().unwrap(), JobStatus::Pending);
        assert_eq!("done".parse::<JobStatus>().unwrap(), JobStatus::Done);
        assert_eq!("cancelled".parse::<JobStatus>().unwrap(), JobStatus::Cancelled);
        assert_eq!(
            "running".parse::<JobStatus>(),
            Err(DomainError::InvalidJobStatus("running".to_string()))
        );
    }

    #[test]
    fn test_job_status_is_monotonic() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Pending));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Done));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Cancelled));

        assert!(JobStatus::Done.can_transition_to(JobStatus::Done));
        assert!(!JobStatus::Done.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Done.can_transition_to(JobStatus::Cancelled));

        assert!(!JobStatus::Cancelled.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Cancelled.can_transition_to(JobStatus::Done));
    }
}

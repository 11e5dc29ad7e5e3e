//! C8 Client Domain Layer
//!
//! Pure value types shared by every execution context, with zero I/O
//! dependencies: request descriptors, raw responses, structured server
//! errors, execution contexts and job states.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod request;
pub mod response;
pub mod value_objects;

// Re-export commonly used types
pub use request::{Body, Method, Request, RequestBuilder};
pub use response::{Response, ServerError};
pub use value_objects::{BatchJobStatus, DomainError, ExecutionContext, JobStatus};

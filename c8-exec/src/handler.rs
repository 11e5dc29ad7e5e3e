//! Response handlers.
//!
//! A handler is the single point where a raw status/body becomes a domain
//! value or a structured [`ExecError`]. It is a pure function bound at the
//! call site and may run zero times (never sent), once, or after a deferred
//! commit.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

use c8_domain::Response;

use crate::error::{ExecError, ExecResult, Operation};

type HandleFn<T> = dyn Fn(Response) -> ExecResult<T> + Send + Sync;

/// Interpreter for the response of one operation.
pub struct ResponseHandler<T> {
    operation: Operation,
    handle: Box<HandleFn<T>>,
}

impl<T: 'static> ResponseHandler<T> {
    /// Handler that sees every response, successful or not.
    pub fn new<F>(operation: Operation, handle: F) -> Self
    where
        F: Fn(Response) -> ExecResult<T> + Send + Sync + 'static,
    {
        Self {
            operation,
            handle: Box::new(handle),
        }
    }

    /// Handler that turns any non-2xx response into `ExecError::Server` and
    /// only calls `handle` on success.
    pub fn on_success<F>(operation: Operation, handle: F) -> Self
    where
        F: Fn(Response) -> ExecResult<T> + Send + Sync + 'static,
    {
        Self::new(operation, move |response| {
            if !response.is_success() {
                return Err(ExecError::server(operation, &response));
            }
            handle(response)
        })
    }
}

impl<T> ResponseHandler<T> {
    /// Operation this handler interprets.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Apply the handler.
    pub fn handle(&self, response: Response) -> ExecResult<T> {
        (self.handle)(response)
    }
}

impl ResponseHandler<Value> {
    /// Handler returning the raw JSON body of a successful response.
    pub fn json(operation: Operation) -> Self {
        Self::on_success(operation, |response| Ok(response.into_body()))
    }
}

impl<T: DeserializeOwned + 'static> ResponseHandler<T> {
    /// Handler deserializing the body of a successful response.
    pub fn deserialize(operation: Operation) -> Self {
        Self::on_success(operation, move |response| decode(operation, response.into_body()))
    }
}

impl<T> fmt::Debug for ResponseHandler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseHandler")
            .field("operation", &self.operation)
            .finish()
    }
}

/// Deserialize a JSON value, reporting failures as `ExecError::Decode`.
pub fn decode<T: DeserializeOwned>(operation: Operation, value: Value) -> ExecResult<T> {
    serde_json::from_value(value)
        .map_err(|e| ExecError::Decode(format!("{}: {}", operation, e)))
}

// =============================================================================
// Tests
// =============================================================================

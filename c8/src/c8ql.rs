//! C8QL queries and cursors.

use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use c8_domain::{ExecutionContext, Method, Request, Response};
use c8_exec::{Connection, ExecError, ExecResult, Executor, Operation, ResponseHandler};

/// Query options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Bind parameters (`@name` in the query text)
    pub bind_vars: Map<String, Value>,
    /// Results per batch
    pub batch_size: Option<u32>,
    /// Ask the server for the total result count
    pub count: bool,
}

impl QueryOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a parameter.
    pub fn bind(mut self, name: impl Into<String>, value: Value) -> Self {
        self.bind_vars.insert(name.into(), value);
        self
    }

    /// Set the batch size.
    pub fn batch_size(mut self, size: u32) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Request the total count.
    pub fn with_count(mut self) -> Self {
        self.count = true;
        self
    }

    fn body(&self, query: &str) -> Value {
        let mut body = json!({ "query": query });
        if !self.bind_vars.is_empty() {
            body["bindVars"] = Value::Object(self.bind_vars.clone());
        }
        if let Some(size) = self.batch_size {
            body["batchSize"] = json!(size);
        }
        if self.count {
            body["count"] = json!(true);
        }
        body
    }
}

/// Query entry point bound to a fabric's execution context.
pub struct C8ql<E: Executor> {
    executor: Arc<E>,
}

impl<E: Executor> C8ql<E> {
    pub(crate) fn new(executor: Arc<E>) -> Self {
        Self { executor }
    }

    /// Execution context inherited from the fabric.
    pub fn context(&self) -> ExecutionContext {
        self.executor.context()
    }

    /// Run a query.
    ///
    /// Whatever the context, the returned cursor fetches further batches
    /// with immediate round trips.
    pub async fn execute(&self, query: &str, options: QueryOptions) -> ExecResult<E::Output<Cursor>> {
        let request = Request::builder(Method::Post, "/_api/cursor")
            .json(options.body(query))
            .build();

        let connection = Arc::clone(self.executor.connection());
        let handler = ResponseHandler::on_success(Operation::QueryExecute, move |response| {
            Cursor::from_response(Arc::clone(&connection), &response)
        });

        self.executor.execute(request, handler).await
    }
}

impl<E: Executor> std::fmt::Debug for C8ql<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("C8ql").field("context", &self.context()).finish()
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// Server-side cursor over a query result.
#[derive(Debug, Clone)]
pub struct Cursor {
    connection: Arc<Connection>,
    id: Option<String>,
    batch: VecDeque<Value>,
    has_more: bool,
    count: Option<u64>,
}

impl Cursor {
    fn from_response(connection: Arc<Connection>, response: &Response) -> ExecResult<Self> {
        let mut cursor = Self {
            connection,
            id: None,
            batch: VecDeque::new(),
            has_more: false,
            count: response.body().get("count").and_then(Value::as_u64),
        };
        cursor.absorb(response)?;
        Ok(cursor)
    }

    fn absorb(&mut self, response: &Response) -> ExecResult<()> {
        let body = response.body();
        let results = body
            .get("result")
            .and_then(Value::as_array)
            .ok_or_else(|| ExecError::Decode("cursor response has no result list".to_string()))?;

        self.batch.extend(results.iter().cloned());
        self.has_more = body.get("hasMore").and_then(Value::as_bool).unwrap_or(false);
        if let Some(id) = body.get("id").and_then(Value::as_str) {
            self.id = Some(id.to_string());
        }
        Ok(())
    }

    /// Server cursor id, if the result did not fit in one batch.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Results fetched but not yet consumed.
    pub fn batch(&self) -> &VecDeque<Value> {
        &self.batch
    }

    /// More results are waiting on the server.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Total result count, if requested with [`QueryOptions::with_count`].
    pub fn count(&self) -> Option<u64> {
        self.count
    }

    /// Fetch the next batch from the server.
    pub async fn fetch_more(&mut self) -> ExecResult<()> {
        let Some(id) = self.id.clone().filter(|_| self.has_more) else {
            return Ok(());
        };

        let request = Request::builder(Method::Put, format!("/_api/cursor/{}", id)).build();
        let response = self.connection.send(&request).await?;
        if !response.is_success() {
            return Err(ExecError::server(Operation::CursorNext, &response));
        }

        self.absorb(&response)?;
        debug!(cursor_id = %id, buffered = self.batch.len(), "Cursor batch fetched");
        Ok(())
    }

    /// Next result, fetching another batch when the buffer runs out.
    pub async fn next(&mut self) -> ExecResult<Option<Value>> {
        if self.batch.is_empty() && self.has_more {
            self.fetch_more().await?;
        }
        Ok(self.batch.pop_front())
    }

    /// Drain the cursor.
    pub async fn collect_all(mut self) -> ExecResult<Vec<Value>> {
        let mut all = Vec::new();
        while let Some(value) = self.next().await? {
            all.push(value);
        }
        Ok(all)
    }
}

// =============================================================================
// Tests
// =============================================================================

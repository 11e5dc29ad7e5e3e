//! Transaction executor: record a script, commit it atomically.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use c8_domain::{Body, ExecutionContext, Method, Request, Response};

use crate::connection::Connection;
use crate::error::{ExecError, ExecResult, Operation};
use crate::executor::Executor;
use crate::handler::ResponseHandler;
use crate::job::{BatchJob, Resolver, TransactionJob};

/// Collections and server options for a transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionOptions {
    /// Collections read by the script
    pub read: BTreeSet<String>,
    /// Collections written by the script
    pub write: BTreeSet<String>,
    /// Seconds to wait for collection locks
    pub lock_timeout: Option<u64>,
    /// Wait for the commit to be synced to disk
    pub wait_for_sync: Option<bool>,
}

impl TransactionOptions {
    /// Options with no declared collections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a collection the script reads.
    pub fn read(mut self, collection: impl Into<String>) -> Self {
        self.read.insert(collection.into());
        self
    }

    /// Declare a collection the script writes.
    pub fn write(mut self, collection: impl Into<String>) -> Self {
        self.write.insert(collection.into());
        self
    }

    /// Set the lock timeout in seconds.
    pub fn lock_timeout(mut self, seconds: u64) -> Self {
        self.lock_timeout = Some(seconds);
        self
    }

    /// Set the sync-on-commit flag.
    pub fn wait_for_sync(mut self, wait: bool) -> Self {
        self.wait_for_sync = Some(wait);
        self
    }
}

struct Step {
    request: Request,
    resolve: Resolver,
}

#[derive(Default)]
struct Script {
    steps: Vec<Step>,
    read: BTreeSet<String>,
    write: BTreeSet<String>,
    committed: bool,
}

/// Records operations into a script that the server runs all-or-nothing.
///
/// `execute` never contacts the server. On [`commit`] either every step's
/// job resolves, or the single transaction error is returned and no job
/// resolves. The executor is spent after its first commit.
///
/// [`commit`]: TransactionExecutor::commit
pub struct TransactionExecutor {
    connection: Arc<Connection>,
    options: TransactionOptions,
    state: Mutex<Script>,
}

impl TransactionExecutor {
    /// Create a transaction executor seeded with `options`.
    pub fn new(connection: Arc<Connection>, options: TransactionOptions) -> Self {
        let script = Script {
            read: options.read.clone(),
            write: options.write.clone(),
            ..Script::default()
        };

        Self {
            connection,
            options,
            state: Mutex::new(script),
        }
    }

    /// Options the transaction was started with.
    pub fn options(&self) -> &TransactionOptions {
        &self.options
    }

    /// Number of recorded steps.
    pub fn queue_size(&self) -> usize {
        self.state.lock().map(|s| s.steps.len()).unwrap_or(0)
    }

    /// Whether `commit` has already been called.
    pub fn is_committed(&self) -> bool {
        self.state.lock().map(|s| s.committed).unwrap_or(true)
    }

    /// Send the script as one atomic transaction.
    ///
    /// Returns one entry per step, in order. Only a successful commit
    /// resolves jobs; when the transaction fails as a whole the server has
    /// rolled it back and the error is returned here.
    ///
    /// # Errors
    ///
    /// - `TransactionCommitted` if this executor already committed
    /// - `Server { operation: TransactionExecute, .. }` if the server aborted
    /// - transport and decode failures
    pub async fn commit(&self) -> ExecResult<Vec<ExecResult<()>>> {
        let script = {
            let mut state = self.lock_state()?;
            if state.committed {
                return Err(ExecError::TransactionCommitted);
            }
            let script = std::mem::take(&mut *state);
            state.committed = true;
            script
        };

        if script.steps.is_empty() {
            debug!("Transaction commit with no steps");
            return Ok(Vec::new());
        }

        let request = Request::builder(Method::Post, "/_api/transaction")
            .json(self.script_body(&script))
            .build();

        info!(
            steps = script.steps.len(),
            read = script.read.len(),
            write = script.write.len(),
            "Committing transaction"
        );

        let response = self.connection.send(&request).await?;
        if !response.is_success() {
            warn!(status = response.status(), "Transaction aborted");
            return Err(ExecError::server(Operation::TransactionExecute, &response));
        }

        let results = match response.body().get("result") {
            Some(Value::Array(results)) => results.clone(),
            _ => {
                return Err(ExecError::Decode(
                    "transaction response has no result list".to_string(),
                ))
            },
        };

        if results.len() != script.steps.len() {
            return Err(ExecError::Decode(format!(
                "transaction returned {} results for {} steps",
                results.len(),
                script.steps.len()
            )));
        }

        let outcomes: Vec<ExecResult<()>> = script
            .steps
            .into_iter()
            .zip(results)
            .map(|(step, result)| (step.resolve)(step_response(result)))
            .collect();

        info!(steps = outcomes.len(), "Transaction committed");
        Ok(outcomes)
    }

    fn script_body(&self, script: &Script) -> Value {
        let steps: Vec<Value> = script
            .steps
            .iter()
            .map(|step| {
                let request = &step.request;
                json!({
                    "method": request.method().as_str(),
                    "path": request.endpoint(),
                    "query": request.params(),
                    "body": match request.body() {
                        Some(Body::Json(value)) => value.clone(),
                        Some(Body::Text(text)) => Value::String(text.clone()),
                        None => Value::Null,
                    },
                })
            })
            .collect();

        let mut body = Map::new();
        body.insert(
            "collections".to_string(),
            json!({ "read": script.read, "write": script.write }),
        );
        body.insert("steps".to_string(), Value::Array(steps));
        if let Some(lock_timeout) = self.options.lock_timeout {
            body.insert("lockTimeout".to_string(), json!(lock_timeout));
        }
        if let Some(wait_for_sync) = self.options.wait_for_sync {
            body.insert("waitForSync".to_string(), json!(wait_for_sync));
        }
        Value::Object(body)
    }

    fn lock_state(&self) -> ExecResult<std::sync::MutexGuard<'_, Script>> {
        self.state.lock().map_err(|e| {
            ExecError::InvalidState(format!("Failed to acquire transaction lock: {}", e))
        })
    }
}

/// Rebuild the per-step response from a `{code, result}` entry.
fn step_response(entry: Value) -> Response {
    let status = entry
        .get("code")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
        .unwrap_or(200);
    let body = entry.get("result").cloned().unwrap_or(Value::Null);
    Response::new(status, body)
}

#[async_trait]
impl Executor for TransactionExecutor {
    type Output<T: Send + 'static> = TransactionJob<T>;

    fn context(&self) -> ExecutionContext {
        ExecutionContext::Transaction
    }

    fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    async fn execute<T: Send + 'static>(
        &self,
        request: Request,
        handler: ResponseHandler<T>,
    ) -> ExecResult<TransactionJob<T>> {
        let mut state = self.lock_state()?;
        if state.committed {
            return Err(ExecError::TransactionCommitted);
        }

        state.read.extend(request.read_collections().iter().cloned());
        state.write.extend(request.write_collections().iter().cloned());

        let (job, resolve) = BatchJob::queued(state.steps.len(), handler);
        state.steps.push(Step { request, resolve });

        debug!(steps = state.steps.len(), "Step recorded into transaction");
        Ok(job)
    }
}

impl std::fmt::Debug for TransactionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionExecutor")
            .field("connection", &self.connection)
            .field("options", &self.options)
            .field("steps", &self.queue_size())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubFabric;
    use c8_domain::BatchJobStatus;

    fn setup() -> (Arc<StubFabric>, TransactionExecutor) {
        let stub = Arc::new(StubFabric::new());
        stub.create_collection("students");
        stub.create_collection("teachers");
        let connection = Arc::new(Connection::new(stub.clone(), "tp", "db1"));
        let executor = TransactionExecutor::new(connection, TransactionOptions::new().lock_timeout(5));
        (stub, executor)
    }

    fn insert(collection: &str, key: &str) -> Request {
        Request::builder(Method::Post, format!("/_api/document/{}", collection))
            .json(json!({"_key": key}))
            .write(collection)
            .build()
    }

    fn get(collection: &str, key: &str) -> Request {
        Request::builder(Method::Get, format!("/_api/document/{}/{}", collection, key))
            .read(collection)
            .build()
    }

    #[tokio::test]
    async fn test_steps_are_recorded_not_sent() {
        let (stub, executor) = setup();

        let job = executor
            .execute(insert("students", "Neal"), ResponseHandler::json(Operation::DocumentInsert))
            .await
            .unwrap();

        assert_eq!(executor.context(), ExecutionContext::Transaction);
        assert_eq!(executor.queue_size(), 1);
        assert_eq!(job.status(), BatchJobStatus::Queued);
        assert_eq!(stub.request_count(), 0);
    }

    #[tokio::test]
    async fn test_commit_resolves_every_step() {
        let (stub, executor) = setup();

        let inserted = executor
            .execute(insert("students", "Neal"), ResponseHandler::json(Operation::DocumentInsert))
            .await
            .unwrap();
        let read_back = executor
            .execute(get("students", "Neal"), ResponseHandler::json(Operation::DocumentGet))
            .await
            .unwrap();

        let outcomes = executor.commit().await.unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(Result::is_ok));
        assert_eq!(inserted.result().unwrap()["_id"], "students/Neal");
        assert_eq!(read_back.result().unwrap()["_key"], "Neal");
        assert_eq!(stub.request_count(), 1);
        assert_eq!(stub.document_count("students"), 1);
    }

    #[tokio::test]
    async fn test_failed_step_rolls_back_everything() {
        let (stub, executor) = setup();
        stub.insert_document("students", json!({"_key": "Lily"}));

        let first = executor
            .execute(insert("teachers", "Kate"), ResponseHandler::json(Operation::DocumentInsert))
            .await
            .unwrap();
        let conflicting = executor
            .execute(insert("students", "Lily"), ResponseHandler::json(Operation::DocumentInsert))
            .await
            .unwrap();

        let error = executor.commit().await.unwrap_err();

        assert_eq!(error.operation(), Some(Operation::TransactionExecute));
        assert_eq!(error.error_code(), Some(1210));
        assert_eq!(stub.document_count("teachers"), 0);
        assert_eq!(stub.document_count("students"), 1);
        assert!(matches!(first.result(), Err(ExecError::Unresolved(_))));
        assert!(matches!(conflicting.result(), Err(ExecError::Unresolved(_))));
    }

    #[tokio::test]
    async fn test_undeclared_write_is_rejected() {
        let (stub, executor) = setup();

        let undeclared = Request::builder(Method::Post, "/_api/document/students")
            .json(json!({"_key": "Neal"}))
            .build();
        executor
            .execute(undeclared, ResponseHandler::json(Operation::DocumentInsert))
            .await
            .unwrap();

        let error = executor.commit().await.unwrap_err();

        assert_eq!(error.error_code(), Some(1652));
        assert_eq!(stub.document_count("students"), 0);
    }

    #[tokio::test]
    async fn test_executor_is_spent_after_commit() {
        let (_stub, executor) = setup();

        executor
            .execute(insert("students", "Neal"), ResponseHandler::json(Operation::DocumentInsert))
            .await
            .unwrap();
        executor.commit().await.unwrap();

        assert!(executor.is_committed());
        assert!(matches!(executor.commit().await, Err(ExecError::TransactionCommitted)));
        let late = executor
            .execute(insert("students", "Lily"), ResponseHandler::json(Operation::DocumentInsert))
            .await;
        assert!(matches!(late, Err(ExecError::TransactionCommitted)));
    }

    #[test]
    fn test_script_body_shape() {
        let stub = Arc::new(StubFabric::new());
        let connection = Arc::new(Connection::new(stub, "tp", "db1"));
        let executor = TransactionExecutor::new(
            connection,
            TransactionOptions::new().read("teachers").wait_for_sync(true),
        );

        let (_job, resolve) = BatchJob::queued(0, ResponseHandler::json(Operation::DocumentInsert));
        let script = Script {
            steps: vec![Step {
                request: insert("students", "Neal"),
                resolve,
            }],
            read: executor.options().read.clone(),
            write: ["students".to_string()].into_iter().collect(),
            committed: false,
        };

        let body = executor.script_body(&script);

        assert_eq!(body["collections"]["read"], json!(["teachers"]));
        assert_eq!(body["collections"]["write"], json!(["students"]));
        assert_eq!(body["steps"][0]["method"], "POST");
        assert_eq!(body["steps"][0]["path"], "/_api/document/students");
        assert_eq!(body["steps"][0]["body"], json!({"_key": "Neal"}));
        assert_eq!(body["waitForSync"], true);
        assert!(body.get("lockTimeout").is_none());
    }
}

//! Stub implementations for testing.
//!
//! [`StubFabric`] is an in-memory fabric behind the [`Transport`] port. It
//! answers the endpoints the client uses (collections, documents, queries
//! and cursors, async jobs, batches, transactions) with the same statuses,
//! headers and error numbers as the service, so every executor can be
//! exercised without a network.

mod documents;
mod query;
mod registry;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::RwLock;

use c8_domain::{Body, JobStatus, Method, Request, Response};

use crate::bundle;
use crate::error::ExecError;
use crate::ports::{Transport, ASYNC_HEADER, ASYNC_ID_HEADER, BATCH_ERRORS_HEADER};

use documents::{Documents, ERROR_BAD_PARAMETER};
use query::Cursors;
use registry::{Fetch, JobRegistry};

const ERROR_TRANSACTION_UNREGISTERED: i64 = 1652;

// =============================================================================
// Stub Fabric
// =============================================================================

/// In-memory fabric for tests.
pub struct StubFabric {
    /// Collections and documents
    documents: RwLock<Documents>,
    /// Open query cursors
    cursors: RwLock<Cursors>,
    /// Async job records
    jobs: JobRegistry,
    /// Keep new async jobs pending until `run_pending`
    hold_jobs: RwLock<bool>,
    /// Remove successful job records when their result is fetched
    consume_on_fetch: RwLock<bool>,
    /// Whether to simulate a transport failure
    fail_next: RwLock<bool>,
    /// Requests received over the transport
    request_count: RwLock<usize>,
}

impl StubFabric {
    /// Create an empty fabric.
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(Documents::default()),
            cursors: RwLock::new(Cursors::default()),
            jobs: JobRegistry::new(),
            hold_jobs: RwLock::new(false),
            consume_on_fetch: RwLock::new(false),
            fail_next: RwLock::new(false),
            request_count: RwLock::new(0),
        }
    }

    /// Create a collection directly (not counted as a request).
    pub fn create_collection(&self, name: &str) {
        let mut documents = self.documents.write().unwrap();
        documents.create_collection(Some(&json!({ "name": name })));
    }

    /// Insert a document directly (not counted as a request).
    pub fn insert_document(&self, collection: &str, document: Value) {
        let mut documents = self.documents.write().unwrap();
        documents.insert(collection, Some(&document));
    }

    /// Read a document directly.
    pub fn document(&self, collection: &str, key: &str) -> Option<Value> {
        let documents = self.documents.read().unwrap();
        let response = documents.get(collection, key);
        response.is_success().then(|| response.into_body())
    }

    /// Number of documents in a collection (0 if it does not exist).
    pub fn document_count(&self, collection: &str) -> usize {
        self.documents.read().unwrap().len(collection)
    }

    /// Keep newly submitted async jobs pending until [`run_pending`].
    ///
    /// [`run_pending`]: StubFabric::run_pending
    pub fn hold_jobs(&self, hold: bool) {
        *self.hold_jobs.write().unwrap() = hold;
    }

    /// Run every held job. Returns how many completed.
    pub fn run_pending(&self) -> usize {
        let mut completed = 0;
        for (id, request) in self.jobs.pending_requests() {
            let response = self.dispatch(&request);
            if self.jobs.complete(&id, response) {
                completed += 1;
            }
        }
        tracing::debug!(completed, "Stub: held jobs run");
        completed
    }

    /// Force a job back to pending, as a misbehaving server would.
    pub fn force_pending(&self, job_id: &str) {
        self.jobs.force_status(job_id, JobStatus::Pending);
    }

    /// Remove successful job records on result fetch too.
    pub fn set_consume_on_fetch(&self, consume: bool) {
        *self.consume_on_fetch.write().unwrap() = consume;
    }

    /// Configure the next request to fail at the transport level.
    pub fn set_fail_next(&self, fail: bool) {
        *self.fail_next.write().unwrap() = fail;
    }

    /// Requests received over the transport (a batch or transaction is one).
    pub fn request_count(&self) -> usize {
        *self.request_count.read().unwrap()
    }

    /// Job records currently stored.
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Check if we should fail the next operation.
    fn should_fail(&self) -> bool {
        let mut fail_next = self.fail_next.write().unwrap();
        let fail = *fail_next;
        *fail_next = false;
        fail
    }

    // =========================================================================
    // Routing
    // =========================================================================

    fn dispatch(&self, request: &Request) -> Response {
        let path = fabric_path(request.endpoint());
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let body = request.body().and_then(Body::as_json);
        let method = request.method();

        match (method, segments.as_slice()) {
            (Method::Post, ["_open", "auth"]) => {
                Response::new(200, json!({"jwt": "stub-token", "tenant": "_mm"}))
            },

            // Cursors
            (Method::Put, ["_api", "cursor", id]) => self.cursors.write().unwrap().next(id),
            (Method::Delete, ["_api", "cursor", id]) => self.cursors.write().unwrap().close(id),

            // Async jobs
            (Method::Get, ["_api", "job", "done"]) => self.list_jobs(JobStatus::Done, request),
            (Method::Get, ["_api", "job", "pending"]) => self.list_jobs(JobStatus::Pending, request),
            (Method::Delete, ["_api", "job", "all"]) => {
                let removed = self.jobs.clear_all();
                tracing::debug!(removed, "Stub: all jobs cleared");
                ok_result()
            },
            (Method::Delete, ["_api", "job", "expired"]) => self.clear_expired(request),
            (Method::Get, ["_api", "job", id]) => self.job_status(id),
            (Method::Put, ["_api", "job", id]) => self.job_result(id),
            (Method::Put, ["_api", "job", id, "cancel"]) => {
                if self.jobs.cancel(id) {
                    ok_result()
                } else {
                    job_not_found()
                }
            },
            (Method::Delete, ["_api", "job", id]) => {
                if self.jobs.remove(id) {
                    ok_result()
                } else {
                    job_not_found()
                }
            },

            // Batches and transactions
            (Method::Post, ["_api", "batch"]) => self.run_batch(request),
            (Method::Post, ["_api", "transaction"]) => self.run_transaction(body),

            _ => {
                let mut documents = self.documents.write().unwrap();
                self.store_route(&mut documents, method, &segments, body)
                    .unwrap_or_else(|| unknown_path(path))
            },
        }
    }

    /// Collection, document and query routes against a given store.
    fn store_route(
        &self,
        documents: &mut Documents,
        method: Method,
        segments: &[&str],
        body: Option<&Value>,
    ) -> Option<Response> {
        let response = match (method, segments) {
            // Collections
            (Method::Get, ["_api", "collection"]) => documents.list_collections(),
            (Method::Post, ["_api", "collection"]) => documents.create_collection(body),
            (Method::Delete, ["_api", "collection", name]) => documents.drop_collection(name),
            (Method::Get, ["_api", "collection", name, "count"]) => documents.count(name),
            (Method::Put, ["_api", "collection", name, "truncate"]) => documents.truncate(name),

            // Documents
            (Method::Post, ["_api", "document", collection]) => documents.insert(collection, body),
            (Method::Get, ["_api", "document", collection, key]) => documents.get(collection, key),
            (Method::Delete, ["_api", "document", collection, key]) => {
                documents.delete(collection, key)
            },

            // Queries
            (Method::Post, ["_api", "cursor"]) => self.run_query(documents, body),

            _ => return None,
        };
        Some(response)
    }

    fn run_query(&self, documents: &Documents, body: Option<&Value>) -> Response {
        let Some(query) = body.and_then(|b| b.get("query")).and_then(Value::as_str) else {
            return Response::error(400, ERROR_BAD_PARAMETER, "query is empty");
        };
        let bind_vars = body.and_then(|b| b.get("bindVars")).cloned().unwrap_or(Value::Null);
        let batch_size = body
            .and_then(|b| b.get("batchSize"))
            .and_then(Value::as_u64)
            .map(|n| n as usize);
        let count = body
            .and_then(|b| b.get("count"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        match query::evaluate(query, &bind_vars, documents) {
            Ok(results) => self.cursors.write().unwrap().open(results, batch_size, count),
            Err(error) => error,
        }
    }

    fn list_jobs(&self, status: JobStatus, request: &Request) -> Response {
        let count = request
            .params()
            .get("count")
            .and_then(|c| c.parse::<usize>().ok())
            .unwrap_or(usize::MAX);
        Response::new(200, json!(self.jobs.list(status, count)))
    }

    fn clear_expired(&self, request: &Request) -> Response {
        let stamp = request
            .params()
            .get("stamp")
            .and_then(|s| s.parse::<f64>().ok())
            .and_then(|secs| Utc.timestamp_millis_opt((secs * 1000.0) as i64).single());

        match stamp {
            Some(stamp) => {
                let removed = self.jobs.clear_expired(stamp);
                tracing::debug!(removed, "Stub: expired jobs cleared");
                ok_result()
            },
            None => Response::error(400, ERROR_BAD_PARAMETER, "bad stamp parameter"),
        }
    }

    fn job_status(&self, id: &str) -> Response {
        match self.jobs.status(id) {
            Some(JobStatus::Pending) => Response::new(204, Value::Null),
            Some(JobStatus::Done) => Response::new(200, json!({"error": false, "code": 200})),
            Some(JobStatus::Cancelled) => Response::error(410, 410, "job was cancelled"),
            None => job_not_found(),
        }
    }

    fn job_result(&self, id: &str) -> Response {
        let consume = *self.consume_on_fetch.read().unwrap();
        match self.jobs.fetch(id, consume) {
            Fetch::Done(response) => response.with_header(ASYNC_ID_HEADER, id),
            Fetch::Pending => Response::new(204, Value::Null),
            Fetch::Cancelled => Response::error(410, 410, "job was cancelled"),
            Fetch::Missing => job_not_found(),
        }
    }

    fn run_batch(&self, request: &Request) -> Response {
        let boundary = request
            .header("content-type")
            .and_then(bundle::boundary_from)
            .unwrap_or(bundle::BOUNDARY);
        let text = request.body().map(Body::to_text).unwrap_or_default();

        let parts = match bundle::decode_requests(&text, boundary) {
            Ok(parts) => parts,
            Err(e) => return Response::error(400, ERROR_BAD_PARAMETER, e.to_string()),
        };

        let responses: Vec<Response> = parts.iter().map(|part| self.dispatch(part)).collect();
        let failed = responses.iter().filter(|r| !r.is_success()).count();
        tracing::debug!(parts = responses.len(), failed, "Stub: batch processed");

        let headers = BTreeMap::from([
            ("content-type".to_string(), bundle::content_type()),
            (BATCH_ERRORS_HEADER.to_string(), failed.to_string()),
        ]);
        Response::from_parts(200, headers, &bundle::encode_responses(&responses))
    }

    /// Run every step against a working copy of the store, holding the store
    /// lock throughout. The copy replaces the store only if every step
    /// succeeds; otherwise the first failing step's error is returned.
    fn run_transaction(&self, body: Option<&Value>) -> Response {
        let Some(body) = body else {
            return Response::error(400, ERROR_BAD_PARAMETER, "missing transaction body");
        };

        let declared = |kind: &str| -> Vec<String> {
            body["collections"][kind]
                .as_array()
                .map(|names| {
                    names
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };
        let write = declared("write");

        let steps = match parse_steps(body) {
            Ok(steps) => steps,
            Err(error) => return error,
        };

        let mut documents = self.documents.write().unwrap();
        let mut working = documents.clone();
        let mut results = Vec::with_capacity(steps.len());

        for step in &steps {
            if let Some(collection) = written_collection(step) {
                if !write.iter().any(|w| w == collection) {
                    return Response::error(
                        400,
                        ERROR_TRANSACTION_UNREGISTERED,
                        format!(
                            "collection '{}' not registered for write in transaction",
                            collection
                        ),
                    );
                }
            }

            let path = fabric_path(step.endpoint());
            let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
            let body = step.body().and_then(Body::as_json);
            let response = self
                .store_route(&mut working, step.method(), &segments, body)
                .unwrap_or_else(|| unknown_path(path));

            if !response.is_success() {
                tracing::debug!(status = response.status(), "Stub: transaction rolled back");
                return response;
            }
            results.push(json!({"code": response.status(), "result": response.into_body()}));
        }

        *documents = working;
        Response::new(200, json!({"error": false, "code": 200, "result": results}))
    }
}

impl Default for StubFabric {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StubFabric {
    async fn send(&self, request: &Request) -> Result<Response, ExecError> {
        *self.request_count.write().unwrap() += 1;

        if self.should_fail() {
            return Err(ExecError::Transport("Simulated connection failure".to_string()));
        }

        if request.header(ASYNC_HEADER) == Some("store") {
            let id = if *self.hold_jobs.read().unwrap() {
                self.jobs.store_pending(request.clone())
            } else {
                let response = self.dispatch(request);
                self.jobs.store_done(response)
            };
            tracing::debug!(job_id = %id, endpoint = request.endpoint(), "Stub: async job stored");
            return Ok(Response::new(202, Value::Null).with_header(ASYNC_ID_HEADER, id));
        }

        Ok(self.dispatch(request))
    }
}

/// Strip the tenant/fabric routing prefix.
fn fabric_path(endpoint: &str) -> &str {
    endpoint
        .find("/_api/")
        .or_else(|| endpoint.find("/_open/"))
        .map(|i| &endpoint[i..])
        .unwrap_or(endpoint)
}

fn parse_steps(body: &Value) -> Result<Vec<Request>, Response> {
    let Some(steps) = body["steps"].as_array() else {
        return Err(Response::error(400, ERROR_BAD_PARAMETER, "missing transaction steps"));
    };

    steps
        .iter()
        .map(|step| {
            let method = step["method"]
                .as_str()
                .and_then(|m| m.parse::<Method>().ok())
                .ok_or_else(|| Response::error(400, ERROR_BAD_PARAMETER, "invalid step method"))?;
            let path = step["path"]
                .as_str()
                .ok_or_else(|| Response::error(400, ERROR_BAD_PARAMETER, "invalid step path"))?;

            let mut builder = Request::builder(method, path);
            if let Some(query) = step["query"].as_object() {
                for (key, value) in query {
                    let value = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
                    builder = builder.param(key.clone(), value);
                }
            }
            if !step["body"].is_null() {
                builder = builder.json(step["body"].clone());
            }
            Ok(builder.build())
        })
        .collect()
}

/// Collection a step modifies, if it is a write.
fn written_collection(step: &Request) -> Option<&str> {
    let segments: Vec<&str> = fabric_path(step.endpoint()).trim_matches('/').split('/').collect();
    match (step.method(), segments.as_slice()) {
        (Method::Post, ["_api", "document", collection])
        | (Method::Delete, ["_api", "document", collection, _])
        | (Method::Put, ["_api", "collection", collection, "truncate"]) => Some(*collection),
        _ => None,
    }
}

fn ok_result() -> Response {
    Response::new(200, json!({"error": false, "code": 200, "result": true}))
}

fn unknown_path(path: &str) -> Response {
    Response::error(404, 404, format!("unknown path '{}'", path))
}

fn job_not_found() -> Response {
    Response::error(404, 404, "not found")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn routed(method: Method, endpoint: &str) -> c8_domain::RequestBuilder {
        Request::builder(method, format!("/_tenant/tp/_fabric/db1{}", endpoint))
    }

    #[tokio::test]
    async fn test_routes_prefixed_paths() {
        let stub = StubFabric::new();
        stub.create_collection("students");

        let response = stub
            .send(&routed(Method::Get, "/_api/collection/students/count").build())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.body()["count"], 0);
        assert_eq!(stub.request_count(), 1);
    }

    #[tokio::test]
    async fn test_async_store_returns_job_id() {
        let stub = StubFabric::new();

        let request = routed(Method::Post, "/_api/cursor")
            .header(ASYNC_HEADER, "store")
            .json(json!({"query": "RETURN 1"}))
            .build();
        let accepted = stub.send(&request).await.unwrap();

        assert_eq!(accepted.status(), 202);
        let id = accepted.header(ASYNC_ID_HEADER).unwrap().to_string();

        let fetched = stub.send(&routed(Method::Put, &format!("/_api/job/{}", id)).build()).await.unwrap();
        assert_eq!(fetched.status(), 201);
        assert_eq!(fetched.header(ASYNC_ID_HEADER), Some(id.as_str()));
        assert_eq!(stub.job_count(), 1);

        stub.set_consume_on_fetch(true);
        stub.send(&routed(Method::Put, &format!("/_api/job/{}", id)).build()).await.unwrap();
        assert_eq!(stub.job_count(), 0);
    }

    #[tokio::test]
    async fn test_simulated_failure_is_one_shot() {
        let stub = StubFabric::new();
        stub.set_fail_next(true);

        let request = routed(Method::Get, "/_api/collection").build();
        assert!(stub.send(&request).await.is_err());
        assert!(stub.send(&request).await.is_ok());
    }

    fn failing_transaction() -> Request {
        routed(Method::Post, "/_api/transaction")
            .json(json!({
                "collections": {"read": [], "write": ["students"]},
                "steps": [
                    {"method": "POST", "path": "/_api/document/students", "query": {}, "body": {"_key": "Tx"}},
                    {"method": "GET", "path": "/_api/document/students/Nobody", "query": {}, "body": null},
                ],
            }))
            .build()
    }

    #[tokio::test]
    async fn test_transaction_steps_see_earlier_steps() {
        let stub = StubFabric::new();
        stub.create_collection("students");

        let request = routed(Method::Post, "/_api/transaction")
            .json(json!({
                "collections": {"read": [], "write": ["students"]},
                "steps": [
                    {"method": "POST", "path": "/_api/document/students", "query": {}, "body": {"_key": "Neal"}},
                    {"method": "POST", "path": "/_api/cursor", "query": {}, "body": {"query": "FOR s IN students RETURN s"}},
                ],
            }))
            .build();
        let response = stub.send(&request).await.unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.body()["result"][1]["result"]["result"][0]["_key"], "Neal");
        assert_eq!(stub.document_count("students"), 1);
    }

    #[tokio::test]
    async fn test_failed_transaction_leaves_store_untouched() {
        let stub = StubFabric::new();
        stub.create_collection("students");
        stub.insert_document("students", json!({"_key": "Lily"}));

        let response = stub.send(&failing_transaction()).await.unwrap();

        assert_eq!(response.status(), 404);
        assert_eq!(stub.document_count("students"), 1);
        assert!(stub.document("students", "Tx").is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rollback_keeps_concurrent_writes() {
        let stub = Arc::new(StubFabric::new());
        stub.create_collection("students");

        let mut tasks = Vec::new();
        for n in 0..50 {
            let stub = Arc::clone(&stub);
            tasks.push(tokio::spawn(async move {
                let insert = routed(Method::Post, "/_api/document/students")
                    .json(json!({"_key": format!("s{}", n)}))
                    .build();
                assert_eq!(stub.send(&insert).await.unwrap().status(), 202);
                assert_eq!(stub.send(&failing_transaction()).await.unwrap().status(), 404);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(stub.document_count("students"), 50);
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let stub = StubFabric::new();
        let response = stub.send(&routed(Method::Get, "/_api/nothing").build()).await.unwrap();
        assert_eq!(response.status(), 404);
    }

    #[test]
    fn test_written_collection() {
        let insert = Request::builder(Method::Post, "/_api/document/students").build();
        let read = Request::builder(Method::Get, "/_api/document/students/Lily").build();
        let truncate = Request::builder(Method::Put, "/_api/collection/teachers/truncate").build();

        assert_eq!(written_collection(&insert), Some("students"));
        assert_eq!(written_collection(&read), None);
        assert_eq!(written_collection(&truncate), Some("teachers"));
    }
}

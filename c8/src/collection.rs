//! Collection wrapper.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use c8_domain::{ExecutionContext, Method, Request};
use c8_exec::{decode, ExecError, ExecResult, Executor, Operation, ResponseHandler};

/// Identity of a stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// `collection/key`
    #[serde(rename = "_id")]
    pub id: String,
    /// Document key
    #[serde(rename = "_key")]
    pub key: String,
    /// Revision
    #[serde(rename = "_rev")]
    pub rev: String,
}

/// Collection entry as listed by the fabric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Collection name
    pub name: String,
    /// 2 for document collections, 3 for edge collections
    #[serde(rename = "type", default)]
    pub collection_type: Option<u8>,
}

/// A collection, bound to the execution context of the fabric it came from.
///
/// Operations declare this collection as read or written, which matters only
/// when they are recorded into a transaction.
pub struct Collection<E: Executor> {
    name: String,
    executor: Arc<E>,
}

impl<E: Executor> Collection<E> {
    pub(crate) fn new(name: impl Into<String>, executor: Arc<E>) -> Self {
        Self {
            name: name.into(),
            executor,
        }
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execution context inherited from the fabric.
    pub fn context(&self) -> ExecutionContext {
        self.executor.context()
    }

    /// Insert a document.
    pub async fn insert(&self, document: Value) -> ExecResult<E::Output<DocumentMeta>> {
        let request = Request::builder(Method::Post, self.documents_endpoint())
            .json(document)
            .write(&self.name)
            .build();

        self.executor
            .execute(request, ResponseHandler::deserialize(Operation::DocumentInsert))
            .await
    }

    /// Read a document by key.
    pub async fn get(&self, key: &str) -> ExecResult<E::Output<Value>> {
        let request = Request::builder(Method::Get, format!("{}/{}", self.documents_endpoint(), key))
            .read(&self.name)
            .build();

        self.executor
            .execute(request, ResponseHandler::json(Operation::DocumentGet))
            .await
    }

    /// Delete a document by key.
    pub async fn delete(&self, key: &str) -> ExecResult<E::Output<DocumentMeta>> {
        let request =
            Request::builder(Method::Delete, format!("{}/{}", self.documents_endpoint(), key))
                .write(&self.name)
                .build();

        self.executor
            .execute(request, ResponseHandler::deserialize(Operation::DocumentDelete))
            .await
    }

    /// Number of documents.
    pub async fn count(&self) -> ExecResult<E::Output<u64>> {
        let request = Request::builder(Method::Get, format!("/_api/collection/{}/count", self.name))
            .read(&self.name)
            .build();

        let handler = ResponseHandler::on_success(Operation::CollectionCount, |response| {
            response
                .body()
                .get("count")
                .and_then(Value::as_u64)
                .ok_or_else(|| ExecError::Decode("count response has no count".to_string()))
        });

        self.executor.execute(request, handler).await
    }

    /// Remove every document.
    pub async fn truncate(&self) -> ExecResult<E::Output<()>> {
        let request =
            Request::builder(Method::Put, format!("/_api/collection/{}/truncate", self.name))
                .write(&self.name)
                .build();

        self.executor
            .execute(
                request,
                ResponseHandler::on_success(Operation::CollectionTruncate, |_| Ok(())),
            )
            .await
    }

    fn documents_endpoint(&self) -> String {
        format!("/_api/document/{}", self.name)
    }
}

impl<E: Executor> Clone for Collection<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            executor: Arc::clone(&self.executor),
        }
    }
}

impl<E: Executor> std::fmt::Debug for Collection<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("context", &self.context())
            .finish()
    }
}

/// Collection list from a `GET /_api/collection` body.
pub(crate) fn collection_list(body: Value) -> ExecResult<Vec<CollectionInfo>> {
    let result = body.get("result").cloned().unwrap_or(Value::Array(Vec::new()));
    decode(Operation::CollectionList, result)
}

// =============================================================================
// Tests
// =============================================================================

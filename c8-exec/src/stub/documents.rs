//! Collections and documents held by the stub fabric.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use c8_domain::Response;

/// Error numbers the fabric reports for document operations.
pub(crate) const ERROR_DOCUMENT_NOT_FOUND: i64 = 1202;
pub(crate) const ERROR_COLLECTION_NOT_FOUND: i64 = 1203;
pub(crate) const ERROR_DUPLICATE_NAME: i64 = 1207;
pub(crate) const ERROR_UNIQUE_CONSTRAINT: i64 = 1210;
pub(crate) const ERROR_BAD_PARAMETER: i64 = 10;

/// Snapshot-able document store.
#[derive(Debug, Clone, Default)]
pub(crate) struct Documents {
    collections: BTreeMap<String, BTreeMap<String, Value>>,
    revision: u64,
}

impl Documents {
    pub(crate) fn list_collections(&self) -> Response {
        let result: Vec<Value> = self
            .collections
            .keys()
            .map(|name| json!({"name": name, "type": 2, "status": 3}))
            .collect();
        Response::new(200, json!({"error": false, "code": 200, "result": result}))
    }

    pub(crate) fn create_collection(&mut self, body: Option<&Value>) -> Response {
        let Some(name) = body.and_then(|b| b.get("name")).and_then(Value::as_str) else {
            return Response::error(400, ERROR_BAD_PARAMETER, "expecting collection name");
        };

        if self.collections.contains_key(name) {
            return Response::error(409, ERROR_DUPLICATE_NAME, "duplicate name");
        }

        self.collections.insert(name.to_string(), BTreeMap::new());
        Response::new(200, json!({"error": false, "code": 200, "name": name, "type": 2}))
    }

    pub(crate) fn drop_collection(&mut self, name: &str) -> Response {
        match self.collections.remove(name) {
            Some(_) => Response::new(200, json!({"error": false, "code": 200, "id": name})),
            None => collection_not_found(name),
        }
    }

    pub(crate) fn count(&self, name: &str) -> Response {
        match self.collections.get(name) {
            Some(docs) => Response::new(
                200,
                json!({"error": false, "code": 200, "name": name, "count": docs.len()}),
            ),
            None => collection_not_found(name),
        }
    }

    pub(crate) fn truncate(&mut self, name: &str) -> Response {
        match self.collections.get_mut(name) {
            Some(docs) => {
                docs.clear();
                Response::new(200, json!({"error": false, "code": 200, "name": name}))
            },
            None => collection_not_found(name),
        }
    }

    pub(crate) fn insert(&mut self, collection: &str, body: Option<&Value>) -> Response {
        let Some(Value::Object(fields)) = body else {
            return Response::error(400, ERROR_BAD_PARAMETER, "invalid document body");
        };

        self.revision += 1;
        let revision = self.revision.to_string();

        let Some(docs) = self.collections.get_mut(collection) else {
            return collection_not_found(collection);
        };

        let key = match fields.get("_key").and_then(Value::as_str) {
            Some(key) => key.to_string(),
            None => Uuid::now_v7().simple().to_string(),
        };

        if docs.contains_key(&key) {
            return Response::error(
                409,
                ERROR_UNIQUE_CONSTRAINT,
                format!(
                    "unique constraint violated - in index primary of type primary over '_key'; conflicting key: {}",
                    key
                ),
            );
        }

        let id = format!("{}/{}", collection, key);
        let mut document: Map<String, Value> = fields.clone();
        document.insert("_key".to_string(), json!(key));
        document.insert("_id".to_string(), json!(id));
        document.insert("_rev".to_string(), json!(revision));
        docs.insert(key.clone(), Value::Object(document));

        Response::new(202, json!({"_id": id, "_key": key, "_rev": revision}))
    }

    pub(crate) fn get(&self, collection: &str, key: &str) -> Response {
        let Some(docs) = self.collections.get(collection) else {
            return collection_not_found(collection);
        };

        match docs.get(key) {
            Some(document) => Response::new(200, document.clone()),
            None => document_not_found(),
        }
    }

    pub(crate) fn delete(&mut self, collection: &str, key: &str) -> Response {
        let Some(docs) = self.collections.get_mut(collection) else {
            return collection_not_found(collection);
        };

        match docs.remove(key) {
            Some(document) => Response::new(
                202,
                json!({
                    "_id": document["_id"],
                    "_key": document["_key"],
                    "_rev": document["_rev"],
                }),
            ),
            None => document_not_found(),
        }
    }

    /// All documents of a collection, in key order.
    pub(crate) fn all(&self, collection: &str) -> Option<Vec<Value>> {
        self.collections
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
    }

    pub(crate) fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map(BTreeMap::len).unwrap_or(0)
    }
}

pub(crate) fn collection_not_found(name: &str) -> Response {
    Response::error(
        404,
        ERROR_COLLECTION_NOT_FOUND,
        format!("collection or view not found: {}", name),
    )
}

fn document_not_found() -> Response {
    Response::error(404, ERROR_DOCUMENT_NOT_FOUND, "document not found")
}

// =============================================================================
// Tests
// =============================================================================

//! Request descriptors.
//!
//! A [`Request`] describes one pending remote call: method, endpoint, query
//! parameters, headers, body, and the collections the operation reads or
//! writes (consulted only when the request is recorded into a transaction).
//! Requests are immutable once built; the `with_*` methods derive copies.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use url::form_urlencoded;

use crate::value_objects::DomainError;

// =============================================================================
// Method
// =============================================================================

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
    /// HEAD
    Head,
}

impl Method {
    /// Upper-case method token.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            other => Err(DomainError::InvalidMethod(other.to_string())),
        }
    }
}

// =============================================================================
// Body
// =============================================================================

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// JSON document, sent as `application/json`
    Json(Value),
    /// Pre-encoded text (e.g. a multipart bundle), sent verbatim
    Text(String),
}

impl Body {
    /// Encode the body as the text that goes on the wire.
    pub fn to_text(&self) -> String {
        match self {
            Body::Json(value) => value.to_string(),
            Body::Text(text) => text.clone(),
        }
    }

    /// The JSON value, if this is a JSON body.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(value) => Some(value),
            Body::Text(_) => None,
        }
    }
}

// =============================================================================
// Request
// =============================================================================

/// A pending remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: Method,
    endpoint: String,
    params: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    body: Option<Body>,
    read: BTreeSet<String>,
    write: BTreeSet<String>,
}

impl Request {
    /// Start building a request.
    pub fn builder(method: Method, endpoint: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            request: Request {
                method,
                endpoint: endpoint.into(),
                params: BTreeMap::new(),
                headers: BTreeMap::new(),
                body: None,
                read: BTreeSet::new(),
                write: BTreeSet::new(),
            },
        }
    }

    /// HTTP method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Endpoint path, without query string.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Query parameters.
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Headers (lower-case names).
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Payload, if any.
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Collections the operation reads.
    pub fn read_collections(&self) -> &BTreeSet<String> {
        &self.read
    }

    /// Collections the operation writes.
    pub fn write_collections(&self) -> &BTreeSet<String> {
        &self.write
    }

    /// Endpoint plus encoded query string.
    pub fn path_and_query(&self) -> String {
        if self.params.is_empty() {
            self.endpoint.clone()
        } else {
            format!("{}?{}", self.endpoint, encode_query(&self.params))
        }
    }

    /// Copy of this request with one more header.
    pub fn with_header(&self, name: &str, value: impl Into<String>) -> Request {
        let mut request = self.clone();
        request.headers.insert(name.to_ascii_lowercase(), value.into());
        request
    }

    /// Copy of this request with `prefix` prepended to the endpoint.
    pub fn with_prefix(&self, prefix: &str) -> Request {
        let mut request = self.clone();
        request.endpoint = format!("{}{}", prefix.trim_end_matches('/'), self.endpoint);
        request
    }
}

/// Builder for [`Request`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Add a query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.request.params.insert(key.into(), value.to_string());
        self
    }

    /// Add a header (name is lower-cased).
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.request.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Set a JSON body.
    pub fn json(mut self, value: Value) -> Self {
        self.request.body = Some(Body::Json(value));
        self
    }

    /// Set a raw text body.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.request.body = Some(Body::Text(text.into()));
        self
    }

    /// Declare a collection the operation reads.
    pub fn read(mut self, collection: impl Into<String>) -> Self {
        self.request.read.insert(collection.into());
        self
    }

    /// Declare a collection the operation writes.
    pub fn write(mut self, collection: impl Into<String>) -> Self {
        self.request.write.insert(collection.into());
        self
    }

    /// Finish building.
    pub fn build(self) -> Request {
        self.request
    }
}

// =============================================================================
// Query string encoding
// =============================================================================

/// Encode parameters as `application/x-www-form-urlencoded` pairs.
pub fn encode_query(params: &BTreeMap<String, String>) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    serializer.extend_pairs(params);
    serializer.finish()
}

/// Split `path?query` into the path and its decoded parameters.
pub fn split_path_and_query(target: &str) -> (String, BTreeMap<String, String>) {
    let (path, query) = target.split_once('?').unwrap_or((target, ""));

    let params = form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    (path.to_string(), params)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_collects_parts() {
        let request = Request::builder(Method::Post, "/_api/document/students")
            .param("returnNew", true)
            .header("X-Custom", "1")
            .json(json!({"_key": "Lily"}))
            .write("students")
            .build();

        assert_eq!(request.method(), Method::Post);
        assert_eq!(request.endpoint(), "/_api/document/students");
        assert_eq!(request.params().get("returnNew").map(String::as_str), Some("true"));
        assert_eq!(request.header("x-custom"), Some("1"));
        assert_eq!(request.body().and_then(Body::as_json), Some(&json!({"_key": "Lily"})));
        assert!(request.write_collections().contains("students"));
        assert!(request.read_collections().is_empty());
    }

    #[test]
    fn test_with_header_leaves_original_untouched() {
        let request = Request::builder(Method::Get, "/_api/version").build();
        let flagged = request.with_header("x-c8-async", "store");

        assert_eq!(request.header("x-c8-async"), None);
        assert_eq!(flagged.header("x-c8-async"), Some("store"));
    }

    #[test]
    fn test_with_prefix() {
        let request = Request::builder(Method::Get, "/_api/collection").build();
        let routed = request.with_prefix("/_tenant/tp/_fabric/db1/");
        assert_eq!(routed.endpoint(), "/_tenant/tp/_fabric/db1/_api/collection");
    }

    #[test]
    fn test_query_encoding_and_decoding() {
        let request = Request::builder(Method::Get, "/_api/job/done")
            .param("count", 100)
            .param("tag", "a b&c")
            .build();

        let target = request.path_and_query();
        assert_eq!(target, "/_api/job/done?count=100&tag=a+b%26c");

        let (path, params) = split_path_and_query(&target);
        assert_eq!(path, "/_api/job/done");
        assert_eq!(params.get("count").map(String::as_str), Some("100"));
        assert_eq!(params.get("tag").map(String::as_str), Some("a b&c"));
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("delete".parse::<Method>().unwrap(), Method::Delete);
        assert!("BREW".parse::<Method>().is_err());
    }
}

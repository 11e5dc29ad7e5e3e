//! Raw responses and structured server errors.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A raw response as received from the fabric.
///
/// The body is parsed as JSON when possible; an empty body is `Null` and a
/// non-JSON body is kept as a JSON string.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status: u16,
    headers: BTreeMap<String, String>,
    body: Value,
}

impl Response {
    /// Create a response with a JSON body and no headers.
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body,
        }
    }

    /// Create a response from wire parts, parsing the body text.
    pub fn from_parts(status: u16, headers: BTreeMap<String, String>, text: &str) -> Self {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();

        Self {
            status,
            headers,
            body: parse_body(text),
        }
    }

    /// Standard error document: `{"error": true, "code", "errorNum", "errorMessage"}`.
    pub fn error(status: u16, error_code: i64, message: impl Into<String>) -> Self {
        Self::new(
            status,
            json!({
                "error": true,
                "code": status,
                "errorNum": error_code,
                "errorMessage": message.into(),
            }),
        )
    }

    /// Builder-style header insertion.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// All headers (lower-case names).
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Parsed body.
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Consume the response, keeping only the body.
    pub fn into_body(self) -> Value {
        self.body
    }

    /// Body encoded back to wire text (`""` for an empty body).
    pub fn body_text(&self) -> String {
        match &self.body {
            Value::Null => String::new(),
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Extract the structured error the server reported.
    ///
    /// Falls back to the HTTP status as `error_code` and the reason phrase
    /// as `message` when the body carries no error document.
    pub fn server_error(&self) -> ServerError {
        let error_code = self
            .body
            .get("errorNum")
            .and_then(Value::as_i64)
            .unwrap_or(i64::from(self.status));

        let message = self
            .body
            .get("errorMessage")
            .or_else(|| self.body.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| reason_phrase(self.status).to_string());

        ServerError {
            http_code: self.status,
            error_code,
            message,
        }
    }
}

fn parse_body(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Canonical reason phrase for the statuses the fabric uses.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        410 => "Gone",
        412 => "Precondition Failed",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

// =============================================================================
// Server Error
// =============================================================================

/// Structured failure reported by the fabric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// HTTP status of the failing response
    pub http_code: u16,
    /// Service-specific error number
    pub error_code: i64,
    /// Human-readable detail
    pub message: String,
}

impl ServerError {
    /// Create a server error.
    pub fn new(http_code: u16, error_code: i64, message: impl Into<String>) -> Self {
        Self {
            http_code,
            error_code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[HTTP {}][ERR {}] {}", self.http_code, self.error_code, self.message)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_parses_json_and_lowercases_headers() {
        let mut headers = BTreeMap::new();
        headers.insert("X-C8-Async-Id".to_string(), "42".to_string());

        let response = Response::from_parts(202, headers, "  {\"result\": 1}\r\n");

        assert_eq!(response.header("x-c8-async-id"), Some("42"));
        assert_eq!(response.body(), &json!({"result": 1}));
        assert!(response.is_success());
    }

    #[test]
    fn test_empty_and_text_bodies() {
        let empty = Response::from_parts(204, BTreeMap::new(), "");
        assert_eq!(empty.body(), &Value::Null);
        assert_eq!(empty.body_text(), "");

        let text = Response::from_parts(200, BTreeMap::new(), "plain words");
        assert_eq!(text.body(), &Value::String("plain words".to_string()));
        assert_eq!(text.body_text(), "plain words");
    }

    #[test]
    fn test_server_error_from_error_document() {
        let response = Response::error(400, 1501, "syntax error, unexpected identifier");
        let error = response.server_error();

        assert!(!response.is_success());
        assert_eq!(error.http_code, 400);
        assert_eq!(error.error_code, 1501);
        assert!(error.message.contains("syntax error"));
        assert_eq!(
            error.to_string(),
            "[HTTP 400][ERR 1501] syntax error, unexpected identifier"
        );
    }

    #[test]
    fn test_server_error_without_error_document() {
        let response = Response::new(503, Value::Null);
        let error = response.server_error();

        assert_eq!(error.http_code, 503);
        assert_eq!(error.error_code, 503);
        assert_eq!(error.message, "Service Unavailable");
    }
}

//! Multipart codec for batch bundles.
//!
//! A bundle is a `multipart/form-data` body whose parts each embed one raw
//! HTTP/1.1 message:
//!
//! ```text
//! --XXXsubpartXXX
//! Content-Type: application/x-c8-batchpart
//! Content-Id: 1
//!
//! POST /_tenant/tp/_fabric/db1/_api/document/students HTTP/1.1
//! content-type: application/json
//!
//! {"_key":"Lily"}
//! --XXXsubpartXXX--
//! ```
//!
//! Requests go out in this shape and responses come back in the same shape,
//! one part per request, in order.

use std::collections::BTreeMap;

use c8_domain::request::split_path_and_query;
use c8_domain::response::reason_phrase;
use c8_domain::{Body, Method, Request, Response};

use crate::error::{ExecError, ExecResult};

/// Part separator used for outgoing bundles.
pub const BOUNDARY: &str = "XXXsubpartXXX";

/// Content type of each part.
pub const PART_CONTENT_TYPE: &str = "application/x-c8-batchpart";

const CRLF: &str = "\r\n";

/// `Content-Type` header value for a bundle.
pub fn content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

/// Extract the boundary from a multipart `Content-Type` value.
pub fn boundary_from(content_type: &str) -> Option<&str> {
    content_type
        .split(';')
        .map(str::trim)
        .find_map(|param| param.strip_prefix("boundary="))
        .map(|b| b.trim_matches('"'))
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode fully-routed requests as a bundle body.
pub fn encode_requests(requests: &[Request]) -> String {
    let messages = requests.iter().map(|request| {
        let mut message = format!("{} {} HTTP/1.1{}", request.method(), request.path_and_query(), CRLF);
        let mut headers = request.headers().clone();
        if let Some(Body::Json(_)) = request.body() {
            headers
                .entry("content-type".to_string())
                .or_insert_with(|| "application/json".to_string());
        }
        for (name, value) in &headers {
            message.push_str(&format!("{}: {}{}", name, value, CRLF));
        }
        message.push_str(CRLF);
        if let Some(body) = request.body() {
            message.push_str(&body.to_text());
        }
        message
    });

    frame(messages)
}

/// Encode responses as a bundle body (the server side of the exchange).
pub fn encode_responses(responses: &[Response]) -> String {
    let messages = responses.iter().map(|response| {
        let mut message = format!(
            "HTTP/1.1 {} {}{}",
            response.status(),
            reason_phrase(response.status()),
            CRLF
        );
        let body = response.body_text();
        let mut headers = response.headers().clone();
        if !body.is_empty() {
            headers
                .entry("content-type".to_string())
                .or_insert_with(|| "application/json; charset=utf-8".to_string());
        }
        headers.insert("content-length".to_string(), body.len().to_string());
        for (name, value) in &headers {
            message.push_str(&format!("{}: {}{}", name, value, CRLF));
        }
        message.push_str(CRLF);
        message.push_str(&body);
        message
    });

    frame(messages)
}

fn frame(messages: impl Iterator<Item = String>) -> String {
    let mut out = String::new();
    for (index, message) in messages.enumerate() {
        out.push_str(&format!("--{}{}", BOUNDARY, CRLF));
        out.push_str(&format!("Content-Type: {}{}", PART_CONTENT_TYPE, CRLF));
        out.push_str(&format!("Content-Id: {}{}", index + 1, CRLF));
        out.push_str(CRLF);
        out.push_str(&message);
        out.push_str(CRLF);
    }
    out.push_str(&format!("--{}--{}", BOUNDARY, CRLF));
    out
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a bundle of embedded responses, ordered by `Content-Id`.
pub fn decode_responses(text: &str, boundary: &str) -> ExecResult<Vec<Response>> {
    split_parts(text, boundary)?
        .into_iter()
        .map(|message| {
            let (start, headers, body) = split_message(message)?;
            let status = start
                .split_whitespace()
                .nth(1)
                .and_then(|code| code.parse::<u16>().ok())
                .ok_or_else(|| ExecError::Decode(format!("bad status line: {}", start)))?;
            Ok(Response::from_parts(status, headers, body))
        })
        .collect()
}

/// Decode a bundle of embedded requests, ordered by `Content-Id`.
pub fn decode_requests(text: &str, boundary: &str) -> ExecResult<Vec<Request>> {
    split_parts(text, boundary)?
        .into_iter()
        .map(|message| {
            let (start, headers, body) = split_message(message)?;
            let mut tokens = start.split_whitespace();
            let method = tokens
                .next()
                .and_then(|m| m.parse::<Method>().ok())
                .ok_or_else(|| ExecError::Decode(format!("bad request line: {}", start)))?;
            let target = tokens
                .next()
                .ok_or_else(|| ExecError::Decode(format!("bad request line: {}", start)))?;

            let (path, params) = split_path_and_query(target);
            let mut builder = Request::builder(method, path);
            for (key, value) in params {
                builder = builder.param(key, value);
            }
            for (name, value) in &headers {
                builder = builder.header(name, value.clone());
            }
            if !body.trim().is_empty() {
                builder = match serde_json::from_str(body) {
                    Ok(value) => builder.json(value),
                    Err(_) => builder.text(body),
                };
            }
            Ok(builder.build())
        })
        .collect()
}

/// Split a bundle into its embedded messages.
fn split_parts<'a>(text: &'a str, boundary: &str) -> ExecResult<Vec<&'a str>> {
    let delimiter = format!("--{}", boundary);
    let mut parts: Vec<(usize, &str)> = Vec::new();

    for (position, segment) in text.split(delimiter.as_str()).enumerate() {
        if segment.trim().is_empty() || segment.starts_with("--") {
            continue;
        }

        let segment = segment.strip_prefix(CRLF).unwrap_or(segment);
        let (part_headers, message) = segment
            .split_once("\r\n\r\n")
            .ok_or_else(|| ExecError::Decode("batch part without header block".to_string()))?;

        let content_id = parse_headers(part_headers)
            .get("content-id")
            .and_then(|id| id.parse::<usize>().ok())
            .unwrap_or(position);

        parts.push((content_id, message.strip_suffix(CRLF).unwrap_or(message)));
    }

    parts.sort_by_key(|(content_id, _)| *content_id);
    Ok(parts.into_iter().map(|(_, message)| message).collect())
}

/// Split an embedded HTTP message into start line, headers and body.
fn split_message(message: &str) -> ExecResult<(&str, BTreeMap<String, String>, &str)> {
    let (head, body) = match message.split_once("\r\n\r\n") {
        Some((head, body)) => (head, body),
        None => (message.trim_end_matches(CRLF), ""),
    };

    let (start, header_block) = head.split_once(CRLF).unwrap_or((head, ""));
    if start.trim().is_empty() {
        return Err(ExecError::Decode("batch part without start line".to_string()));
    }

    Ok((start.trim(), parse_headers(header_block), body))
}

fn parse_headers(block: &str) -> BTreeMap<String, String> {
    block
        .split(CRLF)
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_boundary_from_content_type() {
        assert_eq!(boundary_from(&content_type()), Some(BOUNDARY));
        assert_eq!(boundary_from("multipart/form-data; boundary=\"abc\""), Some("abc"));
        assert_eq!(boundary_from("application/json"), None);
    }

    #[test]
    fn test_request_bundle_layout() {
        let request = Request::builder(Method::Post, "/_api/document/students")
            .param("silent", false)
            .json(json!({"_key": "Lily"}))
            .build();

        let text = encode_requests(&[request]);

        assert!(text.starts_with("--XXXsubpartXXX\r\nContent-Type: application/x-c8-batchpart\r\nContent-Id: 1\r\n\r\n"));
        assert!(text.contains("POST /_api/document/students?silent=false HTTP/1.1\r\n"));
        assert!(text.contains("content-type: application/json\r\n\r\n{\"_key\":\"Lily\"}\r\n"));
        assert!(text.ends_with("--XXXsubpartXXX--\r\n"));
    }

    #[test]
    fn test_requests_survive_the_codec_in_order() {
        let requests = vec![
            Request::builder(Method::Post, "/_api/document/students")
                .json(json!({"_key": "Neal"}))
                .build(),
            Request::builder(Method::Get, "/_api/document/students/Neal").build(),
            Request::builder(Method::Get, "/_api/job/done").param("count", 5).build(),
        ];

        let decoded = decode_requests(&encode_requests(&requests), BOUNDARY).unwrap();

        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].method(), Method::Post);
        assert_eq!(decoded[0].body().and_then(Body::as_json), Some(&json!({"_key": "Neal"})));
        assert_eq!(decoded[1].endpoint(), "/_api/document/students/Neal");
        assert!(decoded[1].body().is_none());
        assert_eq!(decoded[2].params().get("count").map(String::as_str), Some("5"));
    }

    #[test]
    fn test_responses_decoded_by_content_id() {
        let text = concat!(
            "--B\r\nContent-Type: application/x-c8-batchpart\r\nContent-Id: 2\r\n\r\n",
            "HTTP/1.1 404 Not Found\r\ncontent-type: application/json\r\n\r\n",
            "{\"error\":true,\"errorNum\":1202,\"errorMessage\":\"document not found\"}\r\n",
            "--B\r\nContent-Type: application/x-c8-batchpart\r\nContent-Id: 1\r\n\r\n",
            "HTTP/1.1 202 Accepted\r\n\r\n",
            "{\"_id\":\"students/Lily\"}\r\n",
            "--B--\r\n"
        );

        let responses = decode_responses(text, "B").unwrap();

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].status(), 202);
        assert_eq!(responses[0].body()["_id"], "students/Lily");
        assert_eq!(responses[1].status(), 404);
        assert_eq!(responses[1].server_error().error_code, 1202);
    }

    #[test]
    fn test_empty_response_body() {
        let text = encode_responses(&[Response::new(204, serde_json::Value::Null)]);
        let responses = decode_responses(&text, BOUNDARY).unwrap();

        assert_eq!(responses[0].status(), 204);
        assert!(responses[0].body().is_null());
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        let error = decode_responses("--B\r\nno header block\r\n--B--", "B").unwrap_err();
        assert!(matches!(error, ExecError::Decode(_)));
    }
}

//! A small C8QL subset and server-side cursors.
//!
//! Supported forms:
//!
//! ```text
//! RETURN <json literal>
//! RETURN @bindVar
//! FOR x IN <collection> RETURN x
//! FOR x IN <collection> LIMIT <n> RETURN x
//! ```

use serde_json::{json, Value};
use std::collections::BTreeMap;

use c8_domain::Response;

use super::documents::{collection_not_found, Documents};

pub(crate) const ERROR_QUERY_PARSE: i64 = 1501;
pub(crate) const ERROR_CURSOR_NOT_FOUND: i64 = 1600;

const DEFAULT_BATCH_SIZE: usize = 1000;

/// Evaluate a query against the store.
pub(crate) fn evaluate(query: &str, bind_vars: &Value, store: &Documents) -> Result<Vec<Value>, Response> {
    let tokens: Vec<&str> = query.split_whitespace().collect();

    match tokens.as_slice() {
        ["RETURN", ..] => {
            let expression = query.trim_start()["RETURN".len()..].trim();
            if let Some(name) = expression.strip_prefix('@') {
                return bind_vars
                    .get(name)
                    .cloned()
                    .map(|value| vec![value])
                    .ok_or_else(|| {
                        Response::error(400, 1552, format!("bind parameter '{}' was not declared", name))
                    });
            }
            serde_json::from_str::<Value>(expression)
                .map(|value| vec![value])
                .map_err(|_| syntax_error(expression))
        },
        ["FOR", var, "IN", collection, rest @ ..] => {
            let limit = match rest {
                ["RETURN", ret] if ret == var => None,
                ["LIMIT", n, "RETURN", ret] if ret == var => {
                    Some(n.parse::<usize>().map_err(|_| syntax_error(n))?)
                },
                _ => return Err(syntax_error(rest.first().copied().unwrap_or(""))),
            };

            let documents = store
                .all(collection)
                .ok_or_else(|| collection_not_found(collection))?;
            Ok(match limit {
                Some(n) => documents.into_iter().take(n).collect(),
                None => documents,
            })
        },
        _ => Err(syntax_error(tokens.first().copied().unwrap_or(""))),
    }
}

fn syntax_error(near: &str) -> Response {
    Response::error(
        400,
        ERROR_QUERY_PARSE,
        format!(
            "syntax error, unexpected identifier near '{}' at position 1:1",
            near
        ),
    )
}

/// Open cursors: id -> remaining results and batch size.
#[derive(Debug, Default)]
pub(crate) struct Cursors {
    open: BTreeMap<String, (Vec<Value>, usize)>,
    counter: u64,
}

impl Cursors {
    /// First batch of a query result; opens a cursor if results remain.
    pub(crate) fn open(&mut self, mut results: Vec<Value>, batch_size: Option<usize>, count: bool) -> Response {
        let batch_size = batch_size.filter(|n| *n > 0).unwrap_or(DEFAULT_BATCH_SIZE);
        let total = results.len();

        let rest = if results.len() > batch_size {
            results.split_off(batch_size)
        } else {
            Vec::new()
        };

        let mut body = json!({
            "error": false,
            "code": 201,
            "result": results,
            "hasMore": !rest.is_empty(),
        });
        if count {
            body["count"] = json!(total);
        }
        if !rest.is_empty() {
            self.counter += 1;
            let id = self.counter.to_string();
            body["id"] = json!(id);
            self.open.insert(id, (rest, batch_size));
        }

        Response::new(201, body)
    }

    /// Next batch of an open cursor.
    pub(crate) fn next(&mut self, id: &str) -> Response {
        let Some((mut remaining, batch_size)) = self.open.remove(id) else {
            return cursor_not_found();
        };

        let rest = if remaining.len() > batch_size {
            remaining.split_off(batch_size)
        } else {
            Vec::new()
        };

        let mut body = json!({
            "error": false,
            "code": 200,
            "result": remaining,
            "hasMore": !rest.is_empty(),
        });
        if !rest.is_empty() {
            body["id"] = json!(id);
            self.open.insert(id.to_string(), (rest, batch_size));
        }

        Response::new(200, body)
    }

    pub(crate) fn close(&mut self, id: &str) -> Response {
        match self.open.remove(id) {
            Some(_) => Response::new(202, json!({"error": false, "code": 202, "id": id})),
            None => cursor_not_found(),
        }
    }
}

fn cursor_not_found() -> Response {
    Response::error(404, ERROR_CURSOR_NOT_FOUND, "cursor not found")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Documents {
        let mut store = Documents::default();
        store.create_collection(Some(&json!({"name": "students"})));
        for key in ["a", "b", "c"] {
            store.insert("students", Some(&json!({"_key": key})));
        }
        store
    }

    #[test]
    fn test_return_literal() {
        let results = evaluate("RETURN 100000", &Value::Null, &store()).unwrap();
        assert_eq!(results, vec![json!(100000)]);

        let results = evaluate("RETURN @x", &json!({"x": [1, 2]}), &store()).unwrap();
        assert_eq!(results, vec![json!([1, 2])]);
    }

    #[test]
    fn test_for_in_collection() {
        let all = evaluate("FOR s IN students RETURN s", &Value::Null, &store()).unwrap();
        let limited = evaluate("FOR s IN students LIMIT 2 RETURN s", &Value::Null, &store()).unwrap();

        assert_eq!(all.len(), 3);
        assert_eq!(limited.len(), 2);
        assert_eq!(all[0]["_key"], "a");
    }

    #[test]
    fn test_invalid_query_is_a_syntax_error() {
        let error = evaluate("INVALID QUERY", &Value::Null, &store()).unwrap_err();
        let detail = error.server_error();

        assert_eq!(detail.http_code, 400);
        assert_eq!(detail.error_code, ERROR_QUERY_PARSE);
        assert!(detail.message.contains("syntax error"));
    }

    #[test]
    fn test_unknown_collection() {
        let error = evaluate("FOR s IN teachers RETURN s", &Value::Null, &store()).unwrap_err();
        assert_eq!(error.status(), 404);
    }

    #[test]
    fn test_cursor_batches() {
        let mut cursors = Cursors::default();
        let results = (1..=5).map(|n| json!(n)).collect();

        let first = cursors.open(results, Some(2), true);
        assert_eq!(first.body()["result"], json!([1, 2]));
        assert_eq!(first.body()["count"], 5);
        assert_eq!(first.body()["hasMore"], true);

        let id = first.body()["id"].as_str().unwrap().to_string();
        let second = cursors.next(&id);
        let third = cursors.next(&id);

        assert_eq!(second.body()["result"], json!([3, 4]));
        assert_eq!(third.body()["result"], json!([5]));
        assert_eq!(third.body()["hasMore"], false);
        assert_eq!(cursors.next(&id).status(), 404);
    }
}

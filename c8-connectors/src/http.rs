//! HTTP transport for the C8 fabric.
//!
//! Carries one [`Request`] per HTTP exchange:
//! - JSON bodies are sent as `application/json`, text bodies verbatim
//! - request headers are passed through unchanged (including `x-c8-async`)
//! - every exchange is bounded by the configured timeout
//!
//! # Authentication
//!
//! The fabric issues a JWT from `POST /_open/auth`. Once
//! [`HttpTransport::authenticate`] succeeds, every request carries
//! `Authorization: bearer <jwt>`.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info};

use c8_domain::{Body, Method, Request, Response};
use c8_exec::{ExecError, Operation, Transport};

// =============================================================================
// Constants
// =============================================================================

/// Request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Authentication endpoint
const AUTH_ENDPOINT: &str = "/_open/auth";

// =============================================================================
// Errors
// =============================================================================

/// Errors building an HTTP transport.
#[derive(Debug, Clone, Error)]
pub enum HttpTransportError {
    /// Base URL could not be parsed
    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),

    /// Underlying HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

// =============================================================================
// HTTP Transport
// =============================================================================

/// [`Transport`] over HTTP.
pub struct HttpTransport {
    /// HTTP client
    client: Client,
    /// `protocol://host:port`, without trailing slash
    base_url: String,
    /// Per-exchange timeout
    request_timeout: Duration,
    /// Session token from `authenticate`
    token: RwLock<Option<String>>,
}

impl HttpTransport {
    /// Create a transport for `base_url` with the default timeout.
    pub fn new(base_url: &str) -> Result<Self, HttpTransportError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a transport with an explicit per-request timeout.
    pub fn with_timeout(base_url: &str, request_timeout: Duration) -> Result<Self, HttpTransportError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| HttpTransportError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if parsed.cannot_be_a_base() {
            return Err(HttpTransportError::InvalidUrl(base_url.to_string()));
        }

        let client = Client::builder()
            .build()
            .map_err(|e| HttpTransportError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
            token: RwLock::new(None),
        })
    }

    /// Base URL from its parts.
    pub fn base_url_for(protocol: &str, host: &str, port: u16) -> String {
        format!("{}://{}:{}", protocol, host, port)
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Current session token, if authenticated.
    pub fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    /// Use an existing session token.
    pub fn set_token(&self, token: impl Into<String>) {
        if let Ok(mut slot) = self.token.write() {
            *slot = Some(token.into());
        }
    }

    /// Obtain a session token for `username` in `tenant`.
    ///
    /// # Errors
    ///
    /// `Server { operation: Authenticate, .. }` for rejected credentials,
    /// `Decode` if the answer carries no token, transport errors otherwise.
    pub async fn authenticate(&self, tenant: &str, username: &str, password: &str) -> Result<(), ExecError> {
        let request = Request::builder(Method::Post, AUTH_ENDPOINT)
            .json(json!({
                "tenant": tenant,
                "username": username,
                "password": password,
            }))
            .build();

        let response = self.send(&request).await?;
        if !response.is_success() {
            return Err(ExecError::server(Operation::Authenticate, &response));
        }

        let jwt = response
            .body()
            .get("jwt")
            .and_then(Value::as_str)
            .ok_or_else(|| ExecError::Decode("authentication response has no jwt".to_string()))?;

        self.set_token(jwt);
        info!(tenant, username, "Authenticated with fabric");
        Ok(())
    }

    /// Absolute URL for a request, with its parameters form-encoded.
    fn url(&self, request: &Request) -> Result<Url, ExecError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, request.endpoint()))
            .map_err(|e| ExecError::Transport(format!("invalid request URL: {}", e)))?;
        if !request.params().is_empty() {
            url.query_pairs_mut().extend_pairs(request.params());
        }
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &Request) -> Result<Response, ExecError> {
        let url = self.url(request)?;
        let mut builder = self.client.request(to_reqwest(request.method()), url.clone());

        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = self.token() {
            builder = builder.header("authorization", format!("bearer {}", token));
        }
        builder = match request.body() {
            Some(Body::Json(value)) => builder
                .header("content-type", "application/json")
                .body(value.to_string()),
            Some(Body::Text(text)) => builder.body(text.clone()),
            None => builder,
        };

        debug!(method = %request.method(), %url, "HTTP request");

        let response = timeout(self.request_timeout, builder.send())
            .await
            .map_err(|_| ExecError::Timeout)?
            .map_err(|e| ExecError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let text = timeout(self.request_timeout, response.text())
            .await
            .map_err(|_| ExecError::Timeout)?
            .map_err(|e| ExecError::Transport(e.to_string()))?;

        debug!(%url, status, "HTTP response");
        Ok(Response::from_parts(status, headers, &text))
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("authenticated", &self.token().is_some())
            .finish()
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
    }
}

// =============================================================================
// Tests
// =============================================================================

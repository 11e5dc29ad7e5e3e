//! C8 Fabric Connectors
//!
//! Adapters implementing the `Transport` port for real carriers.

#![warn(clippy::all)]

pub mod http;

pub use http::{HttpTransport, HttpTransportError, DEFAULT_TIMEOUT_SECS};

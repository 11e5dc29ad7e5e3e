//! Fabric-scoped connection.

use std::fmt;
use std::sync::Arc;
use tracing::debug;

use c8_domain::{Request, Response};

use crate::error::ExecResult;
use crate::ports::Transport;

/// A transport bound to one tenant and fabric.
///
/// Requests carry fabric-relative endpoints (`/_api/...`); the connection
/// routes them under `/_tenant/{tenant}/_fabric/{fabric}`. Fabrics, executors
/// and jobs share it through `Arc`; it is released with the last holder.
pub struct Connection {
    transport: Arc<dyn Transport>,
    tenant: String,
    fabric: String,
    prefix: String,
}

impl Connection {
    /// Bind a transport to a tenant's fabric.
    pub fn new(
        transport: Arc<dyn Transport>,
        tenant: impl Into<String>,
        fabric: impl Into<String>,
    ) -> Self {
        let tenant = tenant.into();
        let fabric = fabric.into();
        let prefix = format!("/_tenant/{}/_fabric/{}", tenant, fabric);

        Self {
            transport,
            tenant,
            fabric,
            prefix,
        }
    }

    /// Tenant name.
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Fabric name.
    pub fn fabric(&self) -> &str {
        &self.fabric
    }

    /// Routing prefix for this fabric.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Route a fabric-relative request to its absolute endpoint.
    pub fn route(&self, request: &Request) -> Request {
        request.with_prefix(&self.prefix)
    }

    /// One round trip for a fabric-relative request.
    pub async fn send(&self, request: &Request) -> ExecResult<Response> {
        let routed = self.route(request);

        debug!(
            method = %routed.method(),
            endpoint = routed.endpoint(),
            "Sending request"
        );

        let response = self.transport.send(&routed).await?;

        debug!(
            endpoint = routed.endpoint(),
            status = response.status(),
            "Received response"
        );

        Ok(response)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("tenant", &self.tenant)
            .field("fabric", &self.fabric)
            .finish()
    }
}

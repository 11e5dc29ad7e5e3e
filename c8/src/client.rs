//! Client entry point.

use std::sync::Arc;
use tracing::info;

use c8_connectors::HttpTransport;
use c8_exec::{Connection, StandardExecutor, Transport};

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::fabric::{Fabric, StandardFabric};

/// Entry point: a transport plus the tenant it talks for.
pub struct C8Client {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
}

impl C8Client {
    /// Connect over HTTP and authenticate with the configured credentials.
    pub async fn connect(config: ClientConfig) -> ClientResult<Self> {
        let transport = HttpTransport::with_timeout(&config.base_url(), config.request_timeout)?;
        transport
            .authenticate(&config.auth.tenant, &config.auth.username, &config.auth.password)
            .await?;

        info!(
            url = %config.base_url(),
            tenant = %config.auth.tenant,
            environment = %config.environment,
            "C8 client connected"
        );

        Ok(Self {
            config,
            transport: Arc::new(transport),
        })
    }

    /// Use an already-prepared transport (e.g. the in-memory stub).
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    /// Configuration in use.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The configured fabric, standard context.
    pub fn fabric(&self) -> StandardFabric {
        self.fabric_named(&self.config.fabric)
    }

    /// Another fabric of the same tenant, standard context.
    pub fn fabric_named(&self, name: &str) -> StandardFabric {
        let connection = Connection::new(Arc::clone(&self.transport), &self.config.auth.tenant, name);
        Fabric::new(StandardExecutor::new(Arc::new(connection)))
    }
}

impl std::fmt::Debug for C8Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("C8Client")
            .field("url", &self.config.base_url())
            .field("tenant", &self.config.auth.tenant)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use c8_domain::ExecutionContext;
    use c8_exec::StubFabric;

    #[test]
    fn test_fabric_routing() {
        let client = C8Client::with_transport(ClientConfig::test(), Arc::new(StubFabric::new()));

        let fabric = client.fabric();
        let other = client.fabric_named("db2");

        assert_eq!(fabric.name(), "db1");
        assert_eq!(fabric.connection().prefix(), "/_tenant/tp/_fabric/db1");
        assert_eq!(other.connection().prefix(), "/_tenant/tp/_fabric/db2");
        assert_eq!(fabric.context(), ExecutionContext::Standard);
    }
}

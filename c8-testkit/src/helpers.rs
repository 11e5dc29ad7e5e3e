use anyhow::{bail, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use c8::{C8Client, ClientConfig, StandardFabric};
use c8_domain::JobStatus;
use c8_exec::{AsyncJob, StubFabric};

/// Tenant used by [`TestFabric`].
pub const TEST_TENANT: &str = "tp";

/// Fabric used by [`TestFabric`].
pub const TEST_FABRIC: &str = "db1";

/// A standard-context fabric over a fresh in-memory stub.
pub struct TestFabric {
    pub stub: Arc<StubFabric>,
    pub fabric: StandardFabric,
}

impl TestFabric {
    /// Empty fabric.
    pub fn new() -> Self {
        let stub = Arc::new(StubFabric::new());
        let client = C8Client::with_transport(ClientConfig::test(), stub.clone());
        Self {
            stub,
            fabric: client.fabric(),
        }
    }

    /// Fabric with the given collections already created.
    pub fn with_collections(names: &[&str]) -> Self {
        let test = Self::new();
        for name in names {
            test.stub.create_collection(name);
        }
        test
    }
}

impl Default for TestFabric {
    fn default() -> Self {
        Self::new()
    }
}

/// Student document fixture.
pub fn student(key: &str, age: u32) -> Value {
    json!({ "_key": key, "name": key, "age": age })
}

/// Interval between status polls in [`wait_until_done`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Poll a job until it leaves `Pending`, giving up after `attempts` polls.
pub async fn wait_until_done<T>(job: &AsyncJob<T>, attempts: u32) -> Result<JobStatus> {
    match tokio::time::timeout(POLL_INTERVAL * attempts, job.wait(POLL_INTERVAL)).await {
        Ok(status) => Ok(status?),
        Err(_) => bail!("job {} still pending after {} polls", job.id(), attempts),
    }
}

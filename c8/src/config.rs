//! Client configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{ClientError, ClientResult};
use std::env;
use std::time::Duration;

// =============================================================================
// Configuration
// =============================================================================

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server connection
    pub server: ServerConfig,

    /// Tenant and credentials
    pub auth: AuthConfig,

    /// Fabric opened by `C8Client::fabric`
    pub fabric: String,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// Server connection configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `http` or `https`
    pub protocol: String,
    /// Server host name
    pub host: String,
    /// Server port
    pub port: u16,
}

/// Tenant and credentials.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Tenant name
    pub tenant: String,
    /// User name
    pub username: String,
    /// Password
    pub password: String,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (in-memory fabric)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> ClientResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let server = Self::load_server_config()?;
        let auth = Self::load_auth_config();
        let fabric = env::var("C8_FABRIC").unwrap_or_else(|_| "_system".to_string());
        let request_timeout = Self::load_timeout()?;

        Ok(Self {
            server,
            auth,
            fabric,
            request_timeout,
            environment,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            server: ServerConfig {
                protocol: "http".to_string(),
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            auth: AuthConfig {
                tenant: "tp".to_string(),
                username: "root".to_string(),
                password: String::new(),
            },
            fabric: "db1".to_string(),
            request_timeout: Duration::from_secs(5),
            environment: Environment::Test,
        }
    }

    /// `protocol://host:port`
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.server.protocol, self.server.host, self.server.port)
    }

    fn load_environment() -> ClientResult<Environment> {
        let env_str = env::var("C8_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(ClientError::Config(format!(
                "Invalid C8_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_server_config() -> ClientResult<ServerConfig> {
        let protocol = env::var("C8_PROTOCOL").unwrap_or_else(|_| "https".to_string());
        if protocol != "http" && protocol != "https" {
            return Err(ClientError::Config(format!(
                "Invalid C8_PROTOCOL: {}. Expected: http, https",
                protocol
            )));
        }

        let host = env::var("C8_HOST").unwrap_or_else(|_| "localhost".to_string());
        let port_str = env::var("C8_PORT").unwrap_or_else(|_| "443".to_string());
        let port = port_str
            .parse::<u16>()
            .map_err(|_| ClientError::Config(format!("Invalid C8_PORT: {}", port_str)))?;

        Ok(ServerConfig {
            protocol,
            host,
            port,
        })
    }

    fn load_auth_config() -> AuthConfig {
        AuthConfig {
            tenant: env::var("C8_TENANT").unwrap_or_else(|_| "_mm".to_string()),
            username: env::var("C8_USERNAME").unwrap_or_else(|_| "root".to_string()),
            password: env::var("C8_PASSWORD").unwrap_or_default(),
        }
    }

    fn load_timeout() -> ClientResult<Duration> {
        match env::var("C8_REQUEST_TIMEOUT_SECS") {
            Ok(val) => val
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| {
                    ClientError::Config(format!("Invalid C8_REQUEST_TIMEOUT_SECS value: {}", val))
                }),
            Err(_) => Ok(Duration::from_secs(c8_connectors::DEFAULT_TIMEOUT_SECS)),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                protocol: "https".to_string(),
                host: "localhost".to_string(),
                port: 443,
            },
            auth: AuthConfig {
                tenant: "_mm".to_string(),
                username: "root".to_string(),
                password: String::new(),
            },
            fabric: "_system".to_string(),
            request_timeout: Duration::from_secs(c8_connectors::DEFAULT_TIMEOUT_SECS),
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();

        assert_eq!(config.server.port, 443);
        assert_eq!(config.base_url(), "https://localhost:443");
        assert_eq!(config.environment, Environment::Development);
    }

    #[test]
    fn test_test_config() {
        let config = ClientConfig::test();

        assert_eq!(config.auth.tenant, "tp");
        assert_eq!(config.fabric, "db1");
        assert_eq!(config.environment, Environment::Test);
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(Environment::Test.to_string(), "test");
        assert_eq!(Environment::Production.to_string(), "production");
    }
}

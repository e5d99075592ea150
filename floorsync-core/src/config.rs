use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub coordinator: CoordinatorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Keepalive ping interval for WebSocket connections
    pub ping_interval_seconds: u64,
    /// Per-request timeout for the plain HTTP routes
    pub request_timeout_seconds: u64,
    /// Allowed CORS origins; empty means permissive
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            ping_interval_seconds: 30,
            request_timeout_seconds: 30,
            cors_origins: Vec::new(),
        }
    }
}

/// Session verification and internal-ingress authentication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Endpoint of the external session service that resolves a
    /// connection token to a user identity
    pub introspection_url: String,
    pub request_timeout_seconds: u64,
    /// Shared secret for /internal/* callers; unset leaves those
    /// routes permanently unauthorized
    pub internal_token: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            introspection_url: "http://127.0.0.1:5000/api/session/verify".to_string(),
            request_timeout_seconds: 5,
            internal_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// A lock untouched for this long is force-released by the sweeper
    pub lock_ttl_seconds: u64,
    pub sweep_interval_seconds: u64,
    /// Connections with no inbound frames for this long are reaped
    pub idle_timeout_seconds: u64,
    pub max_connections: usize,
    pub max_connections_per_user: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            lock_ttl_seconds: 300,
            sweep_interval_seconds: 30,
            idle_timeout_seconds: 300,
            max_connections: 10_000,
            max_connections_per_user: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        // Load config file if provided
        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // Override with environment variables (FLOORSYNC_SERVER_HOST, etc.)
        builder = builder.add_source(
            Environment::with_prefix("FLOORSYNC")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Reject values the coordinator cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message("server.port must be non-zero".to_string()));
        }
        if self.coordinator.sweep_interval_seconds == 0 {
            return Err(ConfigError::Message(
                "coordinator.sweep_interval_seconds must be non-zero".to_string(),
            ));
        }
        if self.coordinator.lock_ttl_seconds == 0 {
            return Err(ConfigError::Message(
                "coordinator.lock_ttl_seconds must be non-zero".to_string(),
            ));
        }
        if self.auth.introspection_url.is_empty() {
            return Err(ConfigError::Message(
                "auth.introspection_url must be set".to_string(),
            ));
        }
        Ok(())
    }
}

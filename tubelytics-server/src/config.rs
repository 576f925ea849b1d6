// Copyright 2025 The Tubelytics Authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tubelytics_query::{AnalyticsSettings, MAX_WINDOW_DAYS};

/// Tubelytics Server Configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: HttpServerConfig,
    pub store: StoreConfig,
    pub auth: AuthConfig,
    pub analytics: AnalyticsSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// HTTP API listen address (e.g., "127.0.0.1:47300")
    #[serde(default = "default_http_addr")]
    pub listen_addr: String,

    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,

    /// Allowed CORS origins (empty = allow all)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_addr(),
            enable_cors: default_enable_cors(),
            cors_origins: vec![],
        }
    }
}

/// Where request logs live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process log, lost on restart
    #[default]
    Memory,
    Postgres,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            other => anyhow::bail!("unknown store backend '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Postgres connection string (required for the postgres backend)
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Create `request_logs` on startup if missing
    #[serde(default)]
    pub ensure_schema: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            database_url: None,
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            ensure_schema: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Enable authentication (default: false for development)
    #[serde(default)]
    pub enabled: bool,

    /// HS256 secret for bearer tokens
    pub jwt_secret: Option<String>,

    /// Static API keys (format: "key:email" or "key:email:role")
    #[serde(default)]
    pub api_keys: Vec<String>,

    /// Emails granted admin access regardless of role (case-insensitive)
    #[serde(default)]
    pub admin_emails: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,

    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default)]
    pub filter: Option<String>,
}

// Default values
fn default_http_addr() -> String {
    "127.0.0.1:47300".to_string()
}

fn default_enable_cors() -> bool {
    true
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    5
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with priority: env > file > defaults
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let config = if let Some(path) = config_file {
            if path.exists() {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            } else {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
        } else {
            Self::default()
        };

        Ok(Self::merge_with_env(config))
    }

    /// Merge config with environment variables (env takes priority)
    fn merge_with_env(mut config: Self) -> Self {
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Override fields whose variable `lookup` resolves. Unparseable values
    /// are ignored with a warning.
    ///
    /// Supported environment variables:
    /// - TUBELYTICS_HTTP_ADDR: HTTP listen address (default: 127.0.0.1:47300)
    /// - TUBELYTICS_ENABLE_CORS: Enable CORS (default: true)
    /// - TUBELYTICS_CORS_ORIGINS: Comma-separated allowed origins
    /// - TUBELYTICS_STORE_BACKEND: `memory` or `postgres` (default: memory)
    /// - DATABASE_URL / TUBELYTICS_DATABASE_URL: Postgres connection string
    /// - TUBELYTICS_DB_MAX_CONNECTIONS: Pool size (default: 10)
    /// - TUBELYTICS_ENSURE_SCHEMA: Create `request_logs` on startup
    /// - TUBELYTICS_AUTH_ENABLED: Enable authentication (default: false)
    /// - TUBELYTICS_JWT_SECRET: JWT secret for token validation
    /// - TUBELYTICS_API_KEYS: Comma-separated API keys (format: key:email[:role])
    /// - ADMIN_EMAILS: Comma-separated admin allowlist
    /// - TUBELYTICS_ROW_CAP: Aggregation row cap (default: 50000)
    /// - TUBELYTICS_LOG_JSON: JSON log output
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("TUBELYTICS_HTTP_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Some(cors) = lookup("TUBELYTICS_ENABLE_CORS").as_deref().and_then(parse_flag) {
            self.server.enable_cors = cors;
        }
        if let Some(origins) = lookup("TUBELYTICS_CORS_ORIGINS") {
            self.server.cors_origins = parse_list(&origins);
        }

        if let Some(backend) = lookup("TUBELYTICS_STORE_BACKEND") {
            match backend.parse() {
                Ok(backend) => self.store.backend = backend,
                Err(e) => tracing::warn!("Ignoring TUBELYTICS_STORE_BACKEND: {}", e),
            }
        }
        if let Some(url) = lookup("TUBELYTICS_DATABASE_URL").or_else(|| lookup("DATABASE_URL")) {
            self.store.database_url = Some(url);
        }
        if let Some(max) = lookup("TUBELYTICS_DB_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
            self.store.max_connections = max;
        }
        if let Some(ensure) = lookup("TUBELYTICS_ENSURE_SCHEMA").as_deref().and_then(parse_flag) {
            self.store.ensure_schema = ensure;
        }

        if let Some(enabled) = lookup("TUBELYTICS_AUTH_ENABLED").as_deref().and_then(parse_flag) {
            self.auth.enabled = enabled;
        }
        if let Some(secret) = lookup("TUBELYTICS_JWT_SECRET") {
            self.auth.jwt_secret = Some(secret);
        }
        if let Some(keys) = lookup("TUBELYTICS_API_KEYS") {
            self.auth.api_keys = parse_list(&keys);
        }
        if let Some(emails) = lookup("ADMIN_EMAILS") {
            self.auth.admin_emails = parse_list(&emails);
        }

        if let Some(cap) = lookup("TUBELYTICS_ROW_CAP").and_then(|v| v.parse().ok()) {
            self.analytics.aggregation_row_cap = cap;
        }
        if let Some(json) = lookup("TUBELYTICS_LOG_JSON").as_deref().and_then(parse_flag) {
            self.logging.json = json;
        }
    }

    /// Parse listen address as SocketAddr
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.server.listen_addr.parse()?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.auth.enabled && self.auth.jwt_secret.is_none() && self.auth.api_keys.is_empty() {
            anyhow::bail!("Authentication enabled but no JWT secret or API keys configured");
        }

        if self.store.backend == StoreBackend::Postgres
            && self.store.database_url.as_deref().map_or(true, str::is_empty)
        {
            anyhow::bail!("Postgres store selected but no database_url / DATABASE_URL configured");
        }

        if self.analytics.aggregation_row_cap == 0 || self.analytics.top_users_limit == 0 {
            anyhow::bail!("analytics.aggregation_row_cap and analytics.top_users_limit must be positive");
        }
        if !(1..=MAX_WINDOW_DAYS).contains(&self.analytics.default_window_days) {
            anyhow::bail!(
                "analytics.default_window_days must be between 1 and {}",
                MAX_WINDOW_DAYS
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server.listen_addr, "127.0.0.1:47300");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.analytics.aggregation_row_cap, 50_000);
        assert!(!config.auth.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServerConfig::default();
        config.apply_env(lookup(&[
            ("TUBELYTICS_HTTP_ADDR", "0.0.0.0:8080"),
            ("TUBELYTICS_AUTH_ENABLED", "true"),
            ("TUBELYTICS_JWT_SECRET", "s3cret"),
            ("TUBELYTICS_STORE_BACKEND", "postgres"),
            ("DATABASE_URL", "postgres://db/tubelytics"),
            ("ADMIN_EMAILS", "Ops@Example.com, boss@example.com"),
            ("TUBELYTICS_ROW_CAP", "1000"),
        ]));

        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert!(config.auth.enabled);
        assert_eq!(config.store.backend, StoreBackend::Postgres);
        assert_eq!(config.store.database_url.as_deref(), Some("postgres://db/tubelytics"));
        assert_eq!(config.auth.admin_emails, vec!["Ops@Example.com", "boss@example.com"]);
        assert_eq!(config.analytics.aggregation_row_cap, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_env_values_are_ignored() {
        let mut config = ServerConfig::default();
        config.apply_env(lookup(&[
            ("TUBELYTICS_STORE_BACKEND", "mongodb"),
            ("TUBELYTICS_ROW_CAP", "lots"),
            ("TUBELYTICS_ENABLE_CORS", "maybe"),
        ]));
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.analytics.aggregation_row_cap, 50_000);
        assert!(config.server.enable_cors);
    }

    #[test]
    fn test_validate_rejects_incomplete_setups() {
        let mut config = ServerConfig::default();
        config.store.backend = StoreBackend::Postgres;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.auth.enabled = true;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.server.listen_addr = "not-an-address".to_string();
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.analytics.default_window_days = 100_000;
        assert!(config.validate().is_err());
        config.analytics.default_window_days = MAX_WINDOW_DAYS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
listen_addr = "127.0.0.1:9000"

[store]
backend = "postgres"
database_url = "postgres://localhost/logs"
ensure_schema = true

[auth]
enabled = true
api_keys = ["k1:ops@example.com:admin"]

[analytics]
top_users_limit = 10
"#
        )
        .unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:9000");
        assert!(config.server.enable_cors);
        assert_eq!(config.store.backend, StoreBackend::Postgres);
        assert!(config.store.ensure_schema);
        assert_eq!(config.store.max_connections, 10);
        assert_eq!(config.analytics.top_users_limit, 10);
        assert_eq!(config.analytics.aggregation_row_cap, 50_000);
        assert!(!config.logging.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load(Some(dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.analytics.top_users_limit, 50);
    }
}

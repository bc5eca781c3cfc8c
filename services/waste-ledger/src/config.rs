use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub pagination: PaginationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub requests_per_minute: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Seed the default recyclable items into an empty catalog at start-up
    pub seed_catalog: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    pub secret_key: String,
    pub token_ttl_hours: i64,
    pub bootstrap_admin_username: Option<String>,
    pub bootstrap_admin_password: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PaginationConfig {
    pub default_limit: i64,
    pub catalog_default_limit: i64,
    pub max_limit: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            catalog_default_limit: 100,
            max_limit: 100,
        }
    }
}

/// Longest token lifetime `validate()` accepts (366 days).
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 366;

impl AuthConfig {
    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_ttl_hours.clamp(1, MAX_TOKEN_TTL_HOURS))
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            // Start with default configuration
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("server.workers", 4)?
            .set_default("server.requests_per_minute", 600)?
            .set_default("storage.backend", "postgres")?
            .set_default("storage.seed_catalog", true)?
            .set_default("database.url", "")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 5)?
            .set_default("auth.secret_key", "")?
            .set_default("auth.token_ttl_hours", 24 * 7)?
            .set_default("pagination.default_limit", 50)?
            .set_default("pagination.catalog_default_limit", 100)?
            .set_default("pagination.max_limit", 100)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?;

        // Add environment-specific config file if it exists
        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        } else {
            builder = builder.add_source(
                File::with_name(&format!("config/{}", environment)).required(false),
            );
        }

        // Override with environment variables
        builder = builder.add_source(
            Environment::with_prefix("WASTE_LEDGER")
                .separator("__")
                .try_parsing(true),
        );

        // Special handling for common env vars
        if let Ok(db_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", db_url)?;
        }

        if let Ok(secret) = env::var("SECRET_KEY") {
            builder = builder.set_override("auth.secret_key", secret)?;
        }

        if let Ok(port) = env::var("WASTE_LEDGER_PORT") {
            builder = builder.set_override("server.port", port)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.server.requests_per_minute == 0 {
            return Err("Rate limit must allow at least one request per minute".to_string());
        }

        if self.storage.backend == StorageBackend::Postgres && self.database.url.is_empty() {
            return Err("Database URL is required for the postgres backend".to_string());
        }

        if self.auth.secret_key.len() < 32 {
            return Err("Secret key must be at least 32 bytes".to_string());
        }

        if self.auth.token_ttl_hours <= 0 {
            return Err("Token TTL must be positive".to_string());
        }

        if self.auth.token_ttl_hours > MAX_TOKEN_TTL_HOURS {
            return Err(format!(
                "Token TTL cannot exceed {} hours",
                MAX_TOKEN_TTL_HOURS
            ));
        }

        if self.auth.bootstrap_admin_username.is_some() != self.auth.bootstrap_admin_password.is_some() {
            return Err(
                "Bootstrap admin needs both a username and a password".to_string(),
            );
        }

        if self.pagination.default_limit <= 0
            || self.pagination.catalog_default_limit <= 0
            || self.pagination.max_limit <= 0
        {
            return Err("Pagination limits must be positive".to_string());
        }

        Ok(())
    }
}

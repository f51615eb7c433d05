use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub tenancy: TenancyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub enable_query_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub request_timeout_secs: u64,
    pub enable_request_logging: bool,
    pub cors_origins: Vec<String>,
}

/// How long the isolation variable lives on the storage session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingScope {
    /// `set_config(..., true)` inside a per-call transaction; released at COMMIT/ROLLBACK
    Transaction,
    /// `set_config(..., false)` on a pooled connection; released by an explicit RESET
    Session,
}

impl std::str::FromStr for BindingScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transaction" | "tx" => Ok(BindingScope::Transaction),
            "session" => Ok(BindingScope::Session),
            other => Err(format!("unknown binding scope '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    pub tenant_header: String,
    pub correlation_header: String,
    pub exempt_prefixes: Vec<String>,
    pub creation_path_pattern: String,
    pub isolation_variable: String,
    pub binding_scope: BindingScope,
    pub error_base_uri: String,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            tenant_header: "X-Tenant-Id".to_string(),
            correlation_header: "X-Request-ID".to_string(),
            exempt_prefixes: vec![
                "/health".to_string(),
                "/api/v1/health".to_string(),
                "/actuator".to_string(),
            ],
            creation_path_pattern: r"^/api/v\d+/organizations/?$".to_string(),
            isolation_variable: "app.current_tenant_id".to_string(),
            binding_scope: BindingScope::Transaction,
            error_base_uri: "https://api.tag-service.com/errors".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_ACQUIRE_TIMEOUT_SECS") {
            self.database.acquire_timeout_secs = v.parse().unwrap_or(self.database.acquire_timeout_secs);
        }
        if let Ok(v) = env::var("DATABASE_ENABLE_QUERY_LOGGING") {
            self.database.enable_query_logging = v.parse().unwrap_or(self.database.enable_query_logging);
        }

        // API overrides (PORT is honoured for platform deployments)
        if let Some(v) = env::var("API_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("API_REQUEST_TIMEOUT_SECS") {
            self.api.request_timeout_secs = v.parse().unwrap_or(self.api.request_timeout_secs);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_CORS_ORIGINS") {
            self.api.cors_origins = split_list(&v);
        }

        // Tenancy overrides
        if let Ok(v) = env::var("TENANCY_TENANT_HEADER") {
            self.tenancy.tenant_header = v;
        }
        if let Ok(v) = env::var("TENANCY_CORRELATION_HEADER") {
            self.tenancy.correlation_header = v;
        }
        if let Ok(v) = env::var("TENANCY_EXEMPT_PREFIXES") {
            self.tenancy.exempt_prefixes = split_list(&v);
        }
        if let Ok(v) = env::var("TENANCY_CREATION_PATH_PATTERN") {
            self.tenancy.creation_path_pattern = v;
        }
        if let Ok(v) = env::var("TENANCY_ISOLATION_VARIABLE") {
            self.tenancy.isolation_variable = v;
        }
        if let Ok(v) = env::var("TENANCY_BINDING_SCOPE") {
            match v.parse() {
                Ok(scope) => self.tenancy.binding_scope = scope,
                Err(e) => tracing::warn!("Ignoring TENANCY_BINDING_SCOPE: {}", e),
            }
        }
        if let Ok(v) = env::var("TENANCY_ERROR_BASE_URI") {
            self.tenancy.error_base_uri = v;
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                acquire_timeout_secs: 30,
                enable_query_logging: true,
            },
            api: ApiConfig {
                port: 3000,
                request_timeout_secs: 60,
                enable_request_logging: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
            tenancy: TenancyConfig::default(),
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                acquire_timeout_secs: 10,
                enable_query_logging: true,
            },
            api: ApiConfig {
                port: 8080,
                request_timeout_secs: 30,
                enable_request_logging: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
            tenancy: TenancyConfig::default(),
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                acquire_timeout_secs: 5,
                enable_query_logging: false,
            },
            api: ApiConfig {
                port: 8080,
                request_timeout_secs: 15,
                enable_request_logging: false,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
            tenancy: TenancyConfig::default(),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}

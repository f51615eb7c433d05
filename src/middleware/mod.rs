// middleware/mod.rs - Tenant isolation pipeline
//
// Every inbound call passes, in this order:
//   correlation → tenant identity → tenant liveness → session binding
// before it reaches a handler. `pipeline::tenant_pipeline` is the only place
// the stages are assembled.

pub mod correlation;
pub mod pipeline;
pub mod response;
pub mod session_binding;
pub mod tenant_identity;
pub mod tenant_liveness;

use std::time::Duration;

use axum::http::{HeaderName, Method};
use axum::response::{IntoResponse, Response};
use regex::Regex;

use crate::config::TenancyConfig;
use crate::error::Rejection;

pub use correlation::correlation_middleware;
pub use pipeline::tenant_pipeline;
pub use response::{ApiResponse, ApiResult};
pub use session_binding::{session_binding_middleware, BindingState, TenantSession};
pub use tenant_identity::tenant_identity_middleware;
pub use tenant_liveness::{tenant_liveness_middleware, LivenessState, ResolvedTenant};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("invalid header name '{0}'")]
    InvalidHeader(String),
    #[error("invalid creation path pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Runtime form of [`TenancyConfig`], validated once at startup
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub correlation_header: HeaderName,
    pub tenant_header: HeaderName,
    pub exemptions: Exemptions,
    pub error_base_uri: String,
    /// Calls still running after this long are cancelled with 408
    pub request_timeout: Option<Duration>,
}

impl PipelineSettings {
    pub fn from_config(config: &TenancyConfig) -> Result<Self, SettingsError> {
        Ok(Self {
            correlation_header: parse_header(&config.correlation_header)?,
            tenant_header: parse_header(&config.tenant_header)?,
            exemptions: Exemptions::new(config.exempt_prefixes.clone(), &config.creation_path_pattern)?,
            error_base_uri: config.error_base_uri.clone(),
            request_timeout: None,
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout).filter(|t| !t.is_zero());
        self
    }

    /// Terminal response for a rejected call
    pub fn reject(&self, rejection: Rejection, instance: &str) -> Response {
        rejection.into_envelope(&self.error_base_uri, instance).into_response()
    }
}

fn parse_header(name: &str) -> Result<HeaderName, SettingsError> {
    HeaderName::from_bytes(name.trim().as_bytes()).map_err(|_| SettingsError::InvalidHeader(name.to_string()))
}

/// Calls that skip tenant validation: monitoring prefixes and tenant creation
#[derive(Debug, Clone)]
pub struct Exemptions {
    prefixes: Vec<String>,
    creation_path: Regex,
}

impl Exemptions {
    pub fn new(prefixes: Vec<String>, creation_path_pattern: &str) -> Result<Self, SettingsError> {
        Ok(Self {
            prefixes,
            creation_path: Regex::new(creation_path_pattern)?,
        })
    }

    pub fn is_exempt(&self, method: &Method, path: &str) -> bool {
        self.is_excluded_path(path) || self.is_tenant_creation(method, path)
    }

    fn is_excluded_path(&self, path: &str) -> bool {
        self.prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    fn is_tenant_creation(&self, method: &Method, path: &str) -> bool {
        method == Method::POST && self.creation_path.is_match(path)
    }
}

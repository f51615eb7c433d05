use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::context::{ScopedContext, Slot};
use crate::error::{Rejection, RejectionKind};
use super::PipelineSettings;

/// Second stage: read the tenant header and publish the tenant id for the call.
///
/// Exempt calls never carry a tenant, even when nested inside a tenant call.
pub async fn tenant_identity_middleware(
    State(settings): State<Arc<PipelineSettings>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();

    if settings.exemptions.is_exempt(request.method(), &path) {
        tracing::debug!("{} {} is exempt from tenant validation", request.method(), path);
        return ScopedContext::ensure_scope(async move {
            let _tenant = ScopedContext::bind_absent(Slot::Tenant);
            next.run(request).await
        })
        .await;
    }

    let tenant_id = match extract_tenant_id(request.headers(), &settings.tenant_header) {
        Ok(tenant_id) => tenant_id,
        Err(rejection) => {
            tracing::warn!("Rejecting {}: {}", path, rejection);
            return settings.reject(rejection, &path);
        }
    };

    ScopedContext::ensure_scope(async move {
        let _tenant = ScopedContext::bind(Slot::Tenant, tenant_id.to_string());
        tracing::Span::current().record("tenant_id", tracing::field::display(&tenant_id));
        tracing::debug!("Tenant context set for {}", path);

        next.run(request).await
    })
    .await
}

/// Parse the tenant header into its canonical UUID form
pub fn extract_tenant_id(headers: &HeaderMap, header: &HeaderName) -> Result<Uuid, Rejection> {
    let missing = || {
        Rejection::new(
            RejectionKind::MissingTenantHeader,
            format!("The request is missing the required '{}' header.", header),
        )
    };

    let raw = headers.get(header).ok_or_else(missing)?;
    let value = raw.to_str().map_err(|_| invalid_format(header, "<non-ascii>"))?.trim();
    if value.is_empty() {
        return Err(missing());
    }

    Uuid::try_parse(value).map_err(|_| invalid_format(header, value))
}

fn invalid_format(header: &HeaderName, value: &str) -> Rejection {
    tracing::debug!("Invalid {} header value: {:?}", header, value);
    Rejection::new(
        RejectionKind::InvalidTenantHeaderFormat,
        format!("The '{}' header must be a valid UUID.", header),
    )
}

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::context::ScopedContext;
use crate::database::models::TenantKey;
use crate::database::{DatabaseError, TenantStore};
use crate::error::{Rejection, RejectionKind};
use super::PipelineSettings;

#[derive(Clone)]
pub struct LivenessState {
    pub store: Arc<dyn TenantStore>,
    pub settings: Arc<PipelineSettings>,
}

/// A tenant that passed the liveness check, attached to the request for the binding stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTenant {
    pub external_id: Uuid,
    pub key: TenantKey,
}

/// Third stage: refuse calls whose tenant is unknown or soft-deleted.
///
/// A call without a tenant in context (exempt) is passed through.
pub async fn tenant_liveness_middleware(
    State(state): State<LivenessState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(tenant_id) = ScopedContext::tenant_id() else {
        tracing::debug!("No tenant in context for {}, skipping liveness check", request.uri().path());
        return next.run(request).await;
    };

    match check_liveness(state.store.as_ref(), &tenant_id).await {
        Ok(resolved) => {
            tracing::debug!("Organization {} is active (key {})", resolved.external_id, resolved.key);
            request.extensions_mut().insert(resolved);
            next.run(request).await
        }
        Err(rejection) => {
            let path = request.uri().path();
            match rejection.kind {
                RejectionKind::TenantLookupFailed => tracing::error!("Rejecting {}: {}", path, rejection),
                _ => tracing::warn!("Rejecting {}: {}", path, rejection),
            }
            state.settings.reject(rejection, path)
        }
    }
}

/// Resolve `tenant_id` to its storage key and require an active record
pub async fn check_liveness(store: &dyn TenantStore, tenant_id: &str) -> Result<ResolvedTenant, Rejection> {
    let external_id = Uuid::try_parse(tenant_id).map_err(|_| {
        Rejection::new(
            RejectionKind::InvalidTenantIdentifier,
            "The organization identifier is not a valid identifier.",
        )
    })?;

    let key = store
        .resolve_key(external_id)
        .await
        .map_err(lookup_failed)?
        .ok_or_else(not_found)?;

    let record = store
        .find_active_by_id(key)
        .await
        .map_err(lookup_failed)?
        .ok_or_else(not_found)?;

    if record.is_deleted() {
        return Err(Rejection::new(
            RejectionKind::TenantDeleted,
            "The organization associated with this request has been deleted.",
        ));
    }

    Ok(ResolvedTenant { external_id, key: record.key })
}

fn not_found() -> Rejection {
    Rejection::new(
        RejectionKind::TenantNotFound,
        "The organization associated with this request does not exist.",
    )
}

fn lookup_failed(err: DatabaseError) -> Rejection {
    tracing::error!("Organization lookup failed: {}", err);
    Rejection::new(
        RejectionKind::TenantLookupFailed,
        "The organization could not be verified. Please retry later.",
    )
}

// handlers/organizations.rs - Organization (tenant) endpoints
//
// POST /api/v1/organizations          exempt; creates a tenant
// GET  /api/v1/organizations/current  reads the caller's tenant through its bound session

use axum::{extract::State, Extension, Json};

use crate::database::models::{NewOrganization, Organization};
use crate::database::PgSession;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, ResolvedTenant, TenantSession};
use crate::services::TenantService;

/**
 * POST /api/v1/organizations
 *
 * ```json
 * {
 *   "name": "acme",
 *   "display_name": "Acme Corp",
 *   "domain": "acme.example.com",
 *   "type": "standard",
 *   "settings": { "constraints": [], "features": [] }
 * }
 * ```
 *
 * Returns 201 with the stored record; its `external_id` is the value callers
 * send in the tenant header afterwards.
 */
pub async fn create_organization(
    State(tenants): State<TenantService>,
    Json(body): Json<NewOrganization>,
) -> ApiResult<Organization> {
    let organization = tenants.create_tenant(body).await?;
    Ok(ApiResponse::created(organization))
}

pub async fn current_organization(
    Extension(tenant): Extension<ResolvedTenant>,
    Extension(session): Extension<TenantSession<PgSession>>,
) -> ApiResult<Organization> {
    let mut slot = session.lock().await;
    let conn = slot
        .as_mut()
        .and_then(PgSession::connection)
        .ok_or_else(|| ApiError::service_unavailable("Storage session is not available"))?;

    let organization = sqlx::query_as::<_, Organization>(
        "SELECT id, external_id, name, display_name, domain, type, settings,
                request_id, created_at, updated_at, deleted_at
         FROM organizations
         WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(tenant.key)
    .fetch_optional(conn)
    .await
    .map_err(crate::database::DatabaseError::from)?
    .ok_or_else(|| ApiError::not_found("Organization not found"))?;

    Ok(ApiResponse::success(organization))
}

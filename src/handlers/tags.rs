// handlers/tags.rs - Tenant-owned tags
//
// GET  /api/v1/tags  list the bound organization's tags
// POST /api/v1/tags  create a tag for the bound organization

use std::collections::HashMap;

use axum::{Extension, Json};

use crate::context::ScopedContext;
use crate::database::models::{NewTag, Tag};
use crate::database::{PgSession, TagRepository};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, ResolvedTenant, TenantSession};

const MAX_TAG_NAME: usize = 100;

pub async fn list_tags(Extension(session): Extension<TenantSession<PgSession>>) -> ApiResult<Vec<Tag>> {
    let mut slot = session.lock().await;
    let conn = slot
        .as_mut()
        .and_then(PgSession::connection)
        .ok_or_else(|| ApiError::service_unavailable("Storage session is not available"))?;

    let tags = TagRepository::list(conn).await?;
    Ok(ApiResponse::success(tags))
}

pub async fn create_tag(
    Extension(tenant): Extension<ResolvedTenant>,
    Extension(session): Extension<TenantSession<PgSession>>,
    Json(body): Json<NewTag>,
) -> ApiResult<Tag> {
    let name = body.name.trim();
    if name.is_empty() || name.chars().count() > MAX_TAG_NAME {
        let mut field_errors = HashMap::new();
        field_errors.insert(
            "name".to_string(),
            format!("must be between 1 and {} characters", MAX_TAG_NAME),
        );
        return Err(ApiError::validation_error("Invalid tag", Some(field_errors)));
    }

    let mut slot = session.lock().await;
    let conn = slot
        .as_mut()
        .and_then(PgSession::connection)
        .ok_or_else(|| ApiError::service_unavailable("Storage session is not available"))?;

    let tag = TagRepository::create(conn, tenant.key, name, ScopedContext::correlation_id()).await?;
    Ok(ApiResponse::created(tag))
}

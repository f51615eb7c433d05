use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::models::{NewOrganization, Organization, TenantKey, TenantRecord};

pub const DEFAULT_ORGANIZATION_TYPE: &str = "standard";

/// Tenant registry consulted by the liveness stage and the organization service
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Map the external UUID carried on the wire to the store's numeric key.
    /// Soft-deleted organizations still resolve; liveness is decided separately.
    async fn resolve_key(&self, external_id: Uuid) -> Result<Option<TenantKey>, DatabaseError>;

    /// Look up a tenant by key, excluding soft-deleted rows
    async fn find_active_by_id(&self, key: TenantKey) -> Result<Option<TenantRecord>, DatabaseError>;

    async fn create(&self, fields: NewOrganization) -> Result<Organization, DatabaseError>;
}

/// `TenantStore` over the `organizations` table
#[derive(Clone)]
pub struct PgTenantStore {
    pool: PgPool,
}

impl PgTenantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn resolve_key(&self, external_id: Uuid) -> Result<Option<TenantKey>, DatabaseError> {
        let key = sqlx::query_scalar::<_, TenantKey>(
            "SELECT id FROM organizations WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    async fn find_active_by_id(&self, key: TenantKey) -> Result<Option<TenantRecord>, DatabaseError> {
        let record = sqlx::query_as::<_, TenantRecord>(
            "SELECT id, external_id, deleted_at
             FROM organizations
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn create(&self, fields: NewOrganization) -> Result<Organization, DatabaseError> {
        let org_type = fields
            .org_type
            .unwrap_or_else(|| DEFAULT_ORGANIZATION_TYPE.to_string());

        let organization = sqlx::query_as::<_, Organization>(
            r#"
            INSERT INTO organizations (name, display_name, domain, type, settings, request_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, external_id, name, display_name, domain, type, settings,
                      request_id, created_at, updated_at, deleted_at
            "#,
        )
        .bind(&fields.name)
        .bind(&fields.display_name)
        .bind(&fields.domain)
        .bind(&org_type)
        .bind(fields.settings.map(Json))
        .bind(fields.request_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!("Created organization {} ({})", organization.id, organization.external_id);
        Ok(organization)
    }
}

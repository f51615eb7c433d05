use sqlx::PgConnection;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::models::{Tag, TenantKey};

/// Queries over `tags`. Every method runs on a tenant-bound connection, so
/// row-level security limits results to the bound organization.
pub struct TagRepository;

impl TagRepository {
    pub async fn list(conn: &mut PgConnection) -> Result<Vec<Tag>, DatabaseError> {
        let tags = sqlx::query_as::<_, Tag>(
            "SELECT id, organization_id, name, request_id, created_at, deleted_at
             FROM tags
             WHERE deleted_at IS NULL
             ORDER BY name",
        )
        .fetch_all(conn)
        .await?;

        Ok(tags)
    }

    pub async fn create(
        conn: &mut PgConnection,
        organization_id: TenantKey,
        name: &str,
        request_id: Option<Uuid>,
    ) -> Result<Tag, DatabaseError> {
        let tag = sqlx::query_as::<_, Tag>(
            "INSERT INTO tags (organization_id, name, request_id)
             VALUES ($1, $2, $3)
             RETURNING id, organization_id, name, request_id, created_at, deleted_at",
        )
        .bind(organization_id)
        .bind(name)
        .bind(request_id)
        .fetch_one(conn)
        .await?;

        Ok(tag)
    }
}

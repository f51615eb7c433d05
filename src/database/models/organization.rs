use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Numeric primary key of an organization in the tenant store
pub type TenantKey = i64;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationSettings {
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Organization {
    pub id: TenantKey,
    pub external_id: Uuid,
    pub name: String,
    pub display_name: String,
    pub domain: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub org_type: String,
    pub settings: Option<Json<OrganizationSettings>>,
    pub request_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Organization {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// The slice of an organization the tenant pipeline reads
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct TenantRecord {
    #[sqlx(rename = "id")]
    pub key: TenantKey,
    pub external_id: Uuid,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TenantRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl From<&Organization> for TenantRecord {
    fn from(org: &Organization) -> Self {
        Self {
            key: org.id,
            external_id: org.external_id,
            deleted_at: org.deleted_at,
        }
    }
}

/// Fields accepted when creating an organization
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewOrganization {
    pub name: String,
    pub display_name: String,
    pub domain: String,
    #[serde(rename = "type", default)]
    pub org_type: Option<String>,
    #[serde(default)]
    pub settings: Option<OrganizationSettings>,
    /// Correlation id of the call that created the record
    #[serde(skip)]
    pub request_id: Option<Uuid>,
}

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::ScopedContext;
use crate::database::manager::DatabaseError;
use crate::database::models::{NewOrganization, Organization};
use crate::database::tenant_store::TenantStore;

#[derive(Debug, thiserror::Error)]
pub enum TenantError {
    #[error("Invalid organization: {0:?}")]
    Invalid(HashMap<String, String>),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Creates organizations (tenants) through the tenant store
#[derive(Clone)]
pub struct TenantService {
    store: Arc<dyn TenantStore>,
}

impl TenantService {
    pub fn new(store: Arc<dyn TenantStore>) -> Self {
        Self { store }
    }

    /// Validate and persist a new organization, stamped with the current correlation id
    pub async fn create_tenant(&self, mut fields: NewOrganization) -> Result<Organization, TenantError> {
        fields.name = fields.name.trim().to_string();
        fields.display_name = fields.display_name.trim().to_string();
        fields.domain = fields.domain.trim().to_ascii_lowercase();
        fields.org_type = fields
            .org_type
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        self.validate(&fields)?;

        fields.request_id = ScopedContext::correlation_id();
        let organization = self.store.create(fields).await?;
        Ok(organization)
    }

    /// Validate tenant fields follow rules
    fn validate(&self, fields: &NewOrganization) -> Result<(), TenantError> {
        let mut errors = HashMap::new();

        check_length(&mut errors, "name", &fields.name, 100);
        check_length(&mut errors, "display_name", &fields.display_name, 255);
        check_length(&mut errors, "domain", &fields.domain, 255);

        if !fields.domain.is_empty()
            && !fields
                .domain
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            errors.insert(
                "domain".to_string(),
                "can only contain letters, numbers, hyphens, and dots".to_string(),
            );
        }

        if let Some(org_type) = &fields.org_type {
            if org_type.len() > 50 {
                errors.insert("type".to_string(), "must be at most 50 characters".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TenantError::Invalid(errors))
        }
    }
}

fn check_length(errors: &mut HashMap<String, String>, field: &str, value: &str, max: usize) {
    if value.is_empty() {
        errors.insert(field.to_string(), "must not be blank".to_string());
    } else if value.chars().count() > max {
        errors.insert(field.to_string(), format!("must be at most {} characters", max));
    }
}

pub mod organization;
pub mod tag;

pub use organization::{NewOrganization, Organization, OrganizationSettings, TenantKey, TenantRecord};
pub use tag::{NewTag, Tag};

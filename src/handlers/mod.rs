// handlers/mod.rs - Route handlers
//
// Exempt:        health, organization creation
// Tenant-scoped: everything else; handlers receive `ResolvedTenant` and a
//                `TenantSession` from the pipeline

pub mod health;
pub mod organizations;
pub mod tags;

pub use health::health;
pub use organizations::{create_organization, current_organization};
pub use tags::{create_tag, list_tags};

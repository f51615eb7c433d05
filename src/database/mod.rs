pub mod isolation;
pub mod manager;
pub mod models;
pub mod tag_repository;
pub mod tenant_store;

pub use isolation::{CallOutcome, IsolationPrimitive, PgIsolation, PgSession};
pub use manager::{DatabaseError, DatabaseManager};
pub use tag_repository::TagRepository;
pub use tenant_store::{PgTenantStore, TenantStore};

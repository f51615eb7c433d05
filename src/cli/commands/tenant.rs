use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;
use uuid::Uuid;

use crate::cli::utils::output_item;
use crate::cli::OutputFormat;
use crate::config::config;
use crate::database::models::NewOrganization;
use crate::database::{DatabaseManager, PgTenantStore, TenantStore};
use crate::services::TenantService;

#[derive(Subcommand)]
pub enum TenantCommands {
    #[command(about = "Create a new organization")]
    Create {
        #[arg(help = "Organization name")]
        name: String,

        #[arg(help = "Human-readable name (unique)")]
        display_name: String,

        #[arg(help = "Domain (unique)")]
        domain: String,

        #[arg(long = "type", help = "Organization type (default: standard)")]
        org_type: Option<String>,
    },

    #[command(about = "Show whether an organization is active")]
    Show {
        #[arg(help = "External organization id (the tenant header value)")]
        external_id: Uuid,
    },
}

pub async fn handle(cmd: TenantCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let db = DatabaseManager::connect(&config().database).await?;
    let store = Arc::new(PgTenantStore::new(db.pool().clone()));

    let result = match cmd {
        TenantCommands::Create { name, display_name, domain, org_type } => {
            let service = TenantService::new(store);
            let organization = service
                .create_tenant(NewOrganization {
                    name,
                    display_name,
                    domain,
                    org_type,
                    ..Default::default()
                })
                .await?;
            output_item(&output_format, &organization)
        }
        TenantCommands::Show { external_id } => {
            let key = store
                .resolve_key(external_id)
                .await?
                .with_context(|| format!("organization {} not found", external_id))?;
            let active = store.find_active_by_id(key).await?.is_some();

            output_item(
                &output_format,
                &serde_json::json!({
                    "external_id": external_id,
                    "key": key,
                    "active": active,
                }),
            )
        }
    };

    db.close().await;
    result
}

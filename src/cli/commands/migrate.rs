use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::config;
use crate::database::DatabaseManager;

pub async fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let db = DatabaseManager::connect(&config().database).await?;
    db.migrate(&config().tenancy.isolation_variable).await?;
    db.close().await;

    output_success(&output_format, "Database schema applied")
}

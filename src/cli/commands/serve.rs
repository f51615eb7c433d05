use crate::app;
use crate::config::config;
use crate::database::DatabaseManager;

pub async fn handle(port: Option<u16>) -> anyhow::Result<()> {
    let config = config();
    tracing::info!("Starting tag service in {:?} mode", config.environment);

    let db = DatabaseManager::connect(&config.database).await?;
    let router = app::app(config, db.clone())?;

    let port = port.unwrap_or(config.api.port);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(
        "Listening on http://{} (tenant header {}, {:?}-scoped binding)",
        bind_addr,
        config.tenancy.tenant_header,
        config.tenancy.binding_scope
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

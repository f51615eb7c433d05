// app.rs - Router assembly
//
// Handlers → tenant pipeline → trace (when request logging is on) → CORS. The pipeline is generic over
// the isolation primitive so the same wiring runs against Postgres in
// production and in-memory fakes in tests.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::FromRef,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::database::{DatabaseManager, IsolationPrimitive, PgIsolation, PgTenantStore, TenantStore};
use crate::handlers;
use crate::middleware::{tenant_pipeline, PipelineSettings};
use crate::services::TenantService;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseManager,
    pub tenants: TenantService,
}

impl FromRef<AppState> for DatabaseManager {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl FromRef<AppState> for TenantService {
    fn from_ref(state: &AppState) -> Self {
        state.tenants.clone()
    }
}

/// Production wiring: Postgres tenant store and isolation primitive
pub fn app(config: &AppConfig, db: DatabaseManager) -> anyhow::Result<Router> {
    let settings = Arc::new(
        PipelineSettings::from_config(&config.tenancy)?
            .with_request_timeout(Duration::from_secs(config.api.request_timeout_secs)),
    );
    let store: Arc<dyn TenantStore> = Arc::new(PgTenantStore::new(db.pool().clone()));
    let isolation = Arc::new(PgIsolation::new(
        db.pool().clone(),
        config.tenancy.isolation_variable.clone(),
        config.tenancy.binding_scope,
    )?);

    let state = AppState {
        db,
        tenants: TenantService::new(store.clone()),
    };

    let router = tenant_pipeline(routes().with_state(state), settings, store, isolation);
    Ok(with_http_layers(
        router,
        &config.api.cors_origins,
        config.api.enable_request_logging,
    ))
}

/// Wrap any tenant-scoped router; used by `app` and by tests with fakes
pub fn build_router<P: IsolationPrimitive>(
    routes: Router,
    settings: Arc<PipelineSettings>,
    store: Arc<dyn TenantStore>,
    isolation: Arc<P>,
) -> Router {
    with_http_layers(tenant_pipeline(routes, settings, store, isolation), &[], true)
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/organizations", post(handlers::create_organization))
        .route("/api/v1/organizations/current", get(handlers::current_organization))
        .route("/api/v1/tags", get(handlers::list_tags).post(handlers::create_tag))
}

fn with_http_layers(router: Router, cors_origins: &[String], request_logging: bool) -> Router {
    let origins: Vec<HeaderValue> = cors_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    let cors = if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::permissive().allow_origin(origins)
    };

    let router = if request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    };

    router.layer(cors)
}

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Extension,
    http::{Request, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use once_cell::sync::OnceCell;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use tag_service_rust::app::build_router;
use tag_service_rust::config::TenancyConfig;
use tag_service_rust::context::ScopedContext;
use tag_service_rust::database::models::{NewOrganization, Organization, TenantKey, TenantRecord};
use tag_service_rust::database::{CallOutcome, DatabaseError, IsolationPrimitive, TenantStore};
use tag_service_rust::handlers;
use tag_service_rust::middleware::{PipelineSettings, ResolvedTenant, TenantSession};
use tag_service_rust::services::TenantService;

pub const TENANT: &str = "3fa85f64-5717-4562-b3fc-2c963f66afa6";
pub const TENANT_KEY: TenantKey = 42;
pub const OTHER_TENANT: &str = "9b2e7c1a-0f4d-4e8b-a6c3-5d1f2e3a4b5c";
pub const OTHER_TENANT_KEY: TenantKey = 7;
pub const ERROR_BASE: &str = "https://api.tag-service.com/errors";

/// In-memory tenant registry
#[derive(Default)]
pub struct MemoryTenantStore {
    keys: Mutex<HashMap<Uuid, TenantKey>>,
    records: Mutex<HashMap<TenantKey, TenantRecord>>,
    next_key: AtomicUsize,
    unavailable: AtomicBool,
    /// Return soft-deleted rows from `find_active_by_id`, like a store whose filter was bypassed
    leaks_deleted: AtomicBool,
    pub lookups: AtomicUsize,
}

impl MemoryTenantStore {
    pub fn insert(&self, external_id: &str, key: TenantKey, deleted: bool) {
        let external_id = Uuid::parse_str(external_id).expect("test uuid");
        self.keys.lock().unwrap().insert(external_id, key);
        self.records.lock().unwrap().insert(
            key,
            TenantRecord {
                key,
                external_id,
                deleted_at: deleted.then(Utc::now),
            },
        );
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_leaks_deleted(&self, leaks: bool) {
        self.leaks_deleted.store(leaks, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), DatabaseError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(DatabaseError::Unavailable("tenant store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn resolve_key(&self, external_id: Uuid) -> Result<Option<TenantKey>, DatabaseError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.keys.lock().unwrap().get(&external_id).copied())
    }

    async fn find_active_by_id(&self, key: TenantKey) -> Result<Option<TenantRecord>, DatabaseError> {
        self.check_available()?;
        let leaks = self.leaks_deleted.load(Ordering::SeqCst);
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&key)
            .filter(|record| leaks || !record.is_deleted())
            .cloned())
    }

    async fn create(&self, fields: NewOrganization) -> Result<Organization, DatabaseError> {
        self.check_available()?;
        let key = 1000 + self.next_key.fetch_add(1, Ordering::SeqCst) as TenantKey;
        let organization = Organization {
            id: key,
            external_id: Uuid::new_v4(),
            name: fields.name,
            display_name: fields.display_name,
            domain: fields.domain,
            org_type: fields.org_type.unwrap_or_else(|| "standard".to_string()),
            settings: fields.settings.map(sqlx::types::Json),
            request_id: fields.request_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };
        self.keys.lock().unwrap().insert(organization.external_id, key);
        self.records.lock().unwrap().insert(key, TenantRecord::from(&organization));
        Ok(organization)
    }
}

/// A pooled connection carrying at most one isolation binding
#[derive(Debug)]
pub struct FakeConnection {
    pub id: usize,
    pub variable: Option<String>,
}

/// In-memory connection pool implementing the isolation primitive
#[derive(Default)]
pub struct FakeIsolation {
    idle: Mutex<Vec<FakeConnection>>,
    opened: AtomicUsize,
    checked_out: AtomicUsize,
    pub discarded: Mutex<Vec<usize>>,
    pub outcomes: Mutex<Vec<CallOutcome>>,
    /// Connections handed back to the pool while still bound
    pub stale_returns: AtomicUsize,
    fail_acquire: AtomicBool,
    fail_set: AtomicBool,
    fail_clear: AtomicBool,
}

impl FakeIsolation {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn checked_out(&self) -> usize {
        self.checked_out.load(Ordering::SeqCst)
    }

    pub fn idle_ids(&self) -> Vec<usize> {
        self.idle.lock().unwrap().iter().map(|c| c.id).collect()
    }

    pub fn discarded_ids(&self) -> Vec<usize> {
        self.discarded.lock().unwrap().clone()
    }

    pub fn set_fail_acquire(&self, fail: bool) {
        self.fail_acquire.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_set(&self, fail: bool) {
        self.fail_set.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_clear(&self, fail: bool) {
        self.fail_clear.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl IsolationPrimitive for FakeIsolation {
    type Session = FakeConnection;

    async fn acquire(&self) -> Result<FakeConnection, DatabaseError> {
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(DatabaseError::Unavailable("pool exhausted".to_string()));
        }
        let reused = self.idle.lock().unwrap().pop();
        let conn = match reused {
            Some(conn) => conn,
            None => FakeConnection {
                id: self.opened.fetch_add(1, Ordering::SeqCst),
                variable: None,
            },
        };
        self.checked_out.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(conn)
    }

    async fn set_isolation_variable(&self, session: &mut FakeConnection, tenant_key: &str) -> Result<(), DatabaseError> {
        tokio::task::yield_now().await;
        // the statement reaches the server before the failure is reported
        session.variable = Some(tenant_key.to_string());
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(DatabaseError::Unavailable("set_config timed out".to_string()));
        }
        Ok(())
    }

    async fn clear_isolation_variable(&self, session: &mut FakeConnection, outcome: CallOutcome) -> Result<(), DatabaseError> {
        tokio::task::yield_now().await;
        self.outcomes.lock().unwrap().push(outcome);
        if self.fail_clear.load(Ordering::SeqCst) {
            return Err(DatabaseError::Unavailable("connection reset".to_string()));
        }
        session.variable = None;
        Ok(())
    }

    fn release(&self, session: FakeConnection, reusable: bool) {
        self.checked_out.fetch_sub(1, Ordering::SeqCst);
        if reusable {
            if session.variable.is_some() {
                self.stale_returns.fetch_add(1, Ordering::SeqCst);
            }
            self.idle.lock().unwrap().push(session);
        } else {
            self.discarded.lock().unwrap().push(session.id);
        }
    }
}

/// Counts handler executions
#[derive(Clone, Default)]
pub struct Handled(pub Arc<AtomicUsize>);

impl Handled {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Wait until `n` handlers have started, for cancellation tests
    pub async fn wait_for(&self, n: usize) -> Result<()> {
        for _ in 0..200 {
            if self.count() >= n {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        anyhow::bail!("expected {} handler calls, saw {}", n, self.count())
    }
}

/// The router under test, reachable from handlers that call back into it
#[derive(Clone, Default)]
pub struct Reentry(pub Arc<OnceCell<Router>>);

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryTenantStore>,
    pub isolation: Arc<FakeIsolation>,
    pub handled: Handled,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(PipelineSettings::from_config(&TenancyConfig::default()).expect("default settings"))
    }

    pub fn with_request_timeout(timeout: Duration) -> Self {
        Self::with_settings(
            PipelineSettings::from_config(&TenancyConfig::default())
                .expect("default settings")
                .with_request_timeout(timeout),
        )
    }

    fn with_settings(settings: PipelineSettings) -> Self {
        let store = Arc::new(MemoryTenantStore::default());
        store.insert(TENANT, TENANT_KEY, false);
        store.insert(OTHER_TENANT, OTHER_TENANT_KEY, false);

        let isolation = Arc::new(FakeIsolation::default());
        let handled = Handled::default();
        let reentry = Reentry::default();
        let settings = Arc::new(settings);

        let routes = Router::new()
            .route("/health", get(whoami))
            .route("/api/v1/whoami", get(whoami))
            .route("/api/v1/fail", get(fail))
            .route("/api/v1/panic", get(panics))
            .route("/api/v1/slow", get(slow))
            .route("/api/v1/reenter", get(reenter))
            .route("/api/v1/organizations", post(handlers::create_organization).get(whoami))
            .layer(Extension(handled.clone()))
            .layer(Extension(reentry.clone()))
            .with_state(TenantService::new(store.clone()));

        let router = build_router(routes, settings, store.clone(), isolation.clone());
        let _ = reentry.0.set(router.clone());
        Self { router, store, isolation, handled }
    }

    pub async fn send(&self, request: Request<Body>) -> Result<Response> {
        Ok(self.router.clone().oneshot(request).await?)
    }

    pub async fn get(&self, path: &str, tenant: Option<&str>) -> Result<Response> {
        self.send(get_request(path, tenant)).await
    }
}

pub fn get_request(path: &str, tenant: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(path);
    if let Some(tenant) = tenant {
        builder = builder.header("X-Tenant-Id", tenant);
    }
    builder.body(Body::empty()).expect("request")
}

pub async fn body_json(response: Response) -> Result<Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn request_id(response: &Response) -> Option<String> {
    response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Asserts the problem envelope written by a rejecting stage
pub async fn assert_rejected(response: Response, status: StatusCode, code: &str, path: &str) -> Result<Value> {
    assert_eq!(response.status(), status);
    let header_id = request_id(&response).expect("correlation header on rejection");
    let body = body_json(response).await?;
    assert_eq!(body["type"], format!("{}#{}", ERROR_BASE, code));
    assert_eq!(body["status"], status.as_u16());
    assert_eq!(body["instance"], path);
    assert_eq!(body["request_id"], header_id.as_str());
    assert!(body["title"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(body["detail"].as_str().is_some_and(|d| !d.is_empty()));
    assert!(body["timestamp"].as_str().is_some_and(|t| t.ends_with('Z')));
    Ok(body)
}

async fn whoami(
    Extension(handled): Extension<Handled>,
    tenant: Option<Extension<ResolvedTenant>>,
    session: Option<Extension<TenantSession<FakeConnection>>>,
) -> Json<Value> {
    handled.0.fetch_add(1, Ordering::SeqCst);
    tokio::task::yield_now().await;

    let (connection, binding) = match session {
        Some(Extension(session)) => {
            let slot = session.lock().await;
            (
                slot.as_ref().map(|c| c.id),
                slot.as_ref().and_then(|c| c.variable.clone()),
            )
        }
        None => (None, None),
    };

    Json(json!({
        "tenant_id": ScopedContext::tenant_id(),
        "request_id": ScopedContext::correlation_id(),
        "key": tenant.map(|Extension(t)| t.key),
        "connection": connection,
        "binding": binding,
    }))
}

async fn fail(Extension(handled): Extension<Handled>) -> (StatusCode, Json<Value>) {
    handled.0.fetch_add(1, Ordering::SeqCst);
    (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "success": false })))
}

async fn panics(Extension(handled): Extension<Handled>) -> Json<Value> {
    handled.0.fetch_add(1, Ordering::SeqCst);
    panic!("handler blew up");
}

async fn slow(Extension(handled): Extension<Handled>) -> Json<Value> {
    handled.0.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(30)).await;
    Json(json!({ "finished": true }))
}

/// Calls back into the router with an exempt call and a call for another
/// tenant, reporting the context seen before, inside and after them
async fn reenter(Extension(reentry): Extension<Reentry>) -> Result<Json<Value>, StatusCode> {
    let router = reentry.0.get().cloned().ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    let before = ScopedContext::snapshot().unwrap_or_default();

    let exempt = router
        .clone()
        .oneshot(get_request("/health", None))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let exempt = body_json(exempt).await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let nested = router
        .oneshot(get_request("/api/v1/whoami", Some(OTHER_TENANT)))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let nested = body_json(nested).await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let after = ScopedContext::snapshot().unwrap_or_default();

    Ok(Json(json!({
        "before": { "tenant_id": before.tenant_id, "request_id": before.correlation_id },
        "exempt": exempt,
        "nested": nested,
        "after": { "tenant_id": after.tenant_id, "request_id": after.correlation_id },
    })))
}

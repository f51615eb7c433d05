use std::sync::Arc;

use axum::{middleware, Router};
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer};

use crate::database::{IsolationPrimitive, TenantStore};
use super::{
    correlation_middleware, session_binding_middleware, tenant_identity_middleware,
    tenant_liveness_middleware, BindingState, LivenessState, PipelineSettings,
};

/// Wrap `router` in the tenant pipeline.
///
/// Layers run outermost first, so they are added in reverse: a panicking
/// handler becomes a 500 inside the binding stage, which then rolls back and
/// releases the session as usual. The request timeout sits just inside
/// correlation: a call that runs too long is dropped, its binding guard
/// discards the session, and the 408 still carries the correlation header.
pub fn tenant_pipeline<P: IsolationPrimitive>(
    router: Router,
    settings: Arc<PipelineSettings>,
    store: Arc<dyn TenantStore>,
    isolation: Arc<P>,
) -> Router {
    let binding = BindingState {
        isolation,
        settings: settings.clone(),
    };
    let liveness = LivenessState {
        store,
        settings: settings.clone(),
    };

    let router = router
        .layer(CatchPanicLayer::new())
        .layer(middleware::from_fn_with_state(binding, session_binding_middleware::<P>))
        .layer(middleware::from_fn_with_state(liveness, tenant_liveness_middleware))
        .layer(middleware::from_fn_with_state(settings.clone(), tenant_identity_middleware));

    let router = match settings.request_timeout {
        Some(timeout) => router.layer(TimeoutLayer::new(timeout)),
        None => router,
    };

    router.layer(middleware::from_fn_with_state(settings, correlation_middleware))
}

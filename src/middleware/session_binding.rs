// middleware/session_binding.rs - Bind the tenant into the call's storage session
//
// The session is acquired and bound before the handler runs and is cleared
// and released after it returns. A session whose binding could not be
// cleared is released as unfit so the pool discards it.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tokio::sync::{Mutex, MutexGuard};

use crate::database::{CallOutcome, IsolationPrimitive};
use crate::context::ScopedContext;
use crate::error::{Rejection, RejectionKind};
use super::tenant_liveness::ResolvedTenant;
use super::PipelineSettings;

pub struct BindingState<P> {
    pub isolation: Arc<P>,
    pub settings: Arc<PipelineSettings>,
}

impl<P> Clone for BindingState<P> {
    fn clone(&self) -> Self {
        Self {
            isolation: self.isolation.clone(),
            settings: self.settings.clone(),
        }
    }
}

/// Request extension giving handlers the tenant-bound session.
///
/// The slot is emptied once the call finishes; a handler that holds the lock
/// past its own return makes the binding stage discard the session.
pub struct TenantSession<S> {
    slot: Arc<Mutex<Option<S>>>,
}

impl<S> Clone for TenantSession<S> {
    fn clone(&self) -> Self {
        Self { slot: self.slot.clone() }
    }
}

impl<S> TenantSession<S> {
    pub async fn lock(&self) -> MutexGuard<'_, Option<S>> {
        self.slot.lock().await
    }
}

/// Owns the cleanup of one bound session
struct BindingGuard<P: IsolationPrimitive> {
    isolation: Arc<P>,
    slot: Arc<Mutex<Option<P::Session>>>,
    tenant_key: String,
    clearing: Option<P::Session>,
}

impl<P: IsolationPrimitive> BindingGuard<P> {
    async fn finish(mut self, outcome: CallOutcome) {
        self.clearing = match self.slot.try_lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => {
                tracing::error!(
                    "Session for tenant key {} is still in use after the call; it will not be reused",
                    self.tenant_key
                );
                None
            }
        };

        let Some(session) = self.clearing.as_mut() else {
            return;
        };

        let reusable = match self.isolation.clear_isolation_variable(session, outcome).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    "Failed to clear isolation binding for tenant key {}: {}; discarding session",
                    self.tenant_key,
                    e
                );
                false
            }
        };

        if let Some(session) = self.clearing.take() {
            self.isolation.release(session, reusable);
        }
    }
}

impl<P: IsolationPrimitive> Drop for BindingGuard<P> {
    fn drop(&mut self) {
        // Only reached with a session when the call was dropped mid-flight
        let abandoned = self
            .clearing
            .take()
            .or_else(|| self.slot.try_lock().ok().and_then(|mut slot| slot.take()));

        if let Some(session) = abandoned {
            tracing::warn!(
                "Call for tenant key {} ended before its binding was cleared; discarding session",
                self.tenant_key
            );
            self.isolation.release(session, false);
        }
    }
}

/// Fourth stage: bind the resolved tenant key into a storage session for the
/// rest of the call, and clear it afterwards whatever the outcome.
pub async fn session_binding_middleware<P: IsolationPrimitive>(
    State(state): State<BindingState<P>>,
    mut request: Request,
    next: Next,
) -> Response {
    if ScopedContext::tenant_id().is_none() {
        return next.run(request).await;
    }

    let path = request.uri().path().to_owned();
    let binding_failed = |detail: &str| {
        state.settings.reject(Rejection::new(RejectionKind::IsolationBindingFailed, detail), &path)
    };

    let Some(resolved) = request.extensions().get::<ResolvedTenant>().copied() else {
        tracing::error!("Tenant reached session binding for {} without a liveness check", path);
        return binding_failed("The organization could not be bound to a storage session.");
    };
    let tenant_key = resolved.key.to_string();

    let mut session = match state.isolation.acquire().await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("Failed to acquire storage session for tenant key {}: {}", tenant_key, e);
            return binding_failed("No storage session is available. Please retry later.");
        }
    };

    if let Err(e) = state.isolation.set_isolation_variable(&mut session, &tenant_key).await {
        tracing::error!("Failed to bind tenant key {} to storage session: {}", tenant_key, e);
        state.isolation.release(session, false);
        return binding_failed("The organization could not be bound to a storage session.");
    }

    let slot = Arc::new(Mutex::new(Some(session)));
    let guard = BindingGuard {
        isolation: state.isolation.clone(),
        slot: slot.clone(),
        tenant_key,
        clearing: None,
    };
    request.extensions_mut().insert(TenantSession { slot });

    let response = next.run(request).await;
    guard.finish(CallOutcome::from_status(response.status())).await;
    response
}

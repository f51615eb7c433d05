// context.rs - Call-scoped context shared by the tenant pipeline
//
// Values live in a tokio task-local cell that is owned by the call's future,
// so they follow the call across `.await` points and worker threads and are
// never visible to another call.

use std::cell::RefCell;
use std::future::Future;

use uuid::Uuid;

tokio::task_local! {
    static CALL_CONTEXT: RefCell<CallContext>;
}

/// The slots a call scope carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Correlation,
    Tenant,
}

/// Snapshot of the values visible to the current call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    pub correlation_id: Option<String>,
    pub tenant_id: Option<String>,
}

impl CallContext {
    fn slot_mut(&mut self, slot: Slot) -> &mut Option<String> {
        match slot {
            Slot::Correlation => &mut self.correlation_id,
            Slot::Tenant => &mut self.tenant_id,
        }
    }

    fn slot(&self, slot: Slot) -> Option<&String> {
        match slot {
            Slot::Correlation => self.correlation_id.as_ref(),
            Slot::Tenant => self.tenant_id.as_ref(),
        }
    }
}

pub struct ScopedContext;

impl ScopedContext {
    /// Run `fut` in a fresh call scope seeded with a copy of the enclosing scope.
    ///
    /// Changes made inside never leak back out, even if the inner call
    /// forgets to restore a slot.
    pub async fn scope<F: Future>(fut: F) -> F::Output {
        let inherited = Self::snapshot().unwrap_or_default();
        CALL_CONTEXT.scope(RefCell::new(inherited), fut).await
    }

    /// Run `fut` in the current call scope, opening one only when there is none.
    pub async fn ensure_scope<F: Future>(fut: F) -> F::Output {
        if Self::in_scope() {
            fut.await
        } else {
            CALL_CONTEXT.scope(RefCell::new(CallContext::default()), fut).await
        }
    }

    pub fn in_scope() -> bool {
        CALL_CONTEXT.try_with(|_| ()).is_ok()
    }

    pub fn snapshot() -> Option<CallContext> {
        CALL_CONTEXT.try_with(|ctx| ctx.borrow().clone()).ok()
    }

    /// Nearest enclosing value for `slot`, or `None`
    pub fn get(slot: Slot) -> Option<String> {
        CALL_CONTEXT
            .try_with(|ctx| ctx.borrow().slot(slot).cloned())
            .ok()
            .flatten()
    }

    /// Current correlation id, if one has been assigned and parses as a UUID
    pub fn correlation_id() -> Option<Uuid> {
        Self::get(Slot::Correlation).and_then(|id| Uuid::parse_str(&id).ok())
    }

    pub fn tenant_id() -> Option<String> {
        Self::get(Slot::Tenant)
    }

    /// Set `slot` to `value` and return whatever it held before.
    ///
    /// Must be paired with [`ScopedContext::exit`]; prefer [`ScopedContext::bind`].
    /// Outside of a call scope nothing is recorded.
    pub fn enter(slot: Slot, value: impl Into<String>) -> Option<String> {
        let value = value.into();
        match CALL_CONTEXT.try_with(|ctx| ctx.borrow_mut().slot_mut(slot).replace(value)) {
            Ok(prior) => prior,
            Err(_) => {
                tracing::warn!("ScopedContext::enter({:?}) called outside of a call scope", slot);
                None
            }
        }
    }

    /// Clear `slot` and return whatever it held before; pair with `exit` like `enter`
    pub fn enter_absent(slot: Slot) -> Option<String> {
        match CALL_CONTEXT.try_with(|ctx| ctx.borrow_mut().slot_mut(slot).take()) {
            Ok(prior) => prior,
            Err(_) => {
                tracing::warn!("ScopedContext::enter_absent({:?}) called outside of a call scope", slot);
                None
            }
        }
    }

    /// Restore `slot` to the value returned by the matching `enter`
    pub fn exit(slot: Slot, prior: Option<String>) {
        let restored = CALL_CONTEXT.try_with(|ctx| {
            *ctx.borrow_mut().slot_mut(slot) = prior;
        });
        if restored.is_err() {
            tracing::warn!("ScopedContext::exit({:?}) called outside of a call scope", slot);
        }
    }

    /// `enter` now and `exit` when the guard drops
    #[must_use = "the slot is restored as soon as the guard is dropped"]
    pub fn bind(slot: Slot, value: impl Into<String>) -> SlotGuard {
        let prior = Self::enter(slot, value);
        SlotGuard { slot, prior: Some(prior) }
    }

    /// `enter_absent` now and `exit` when the guard drops
    #[must_use = "the slot is restored as soon as the guard is dropped"]
    pub fn bind_absent(slot: Slot) -> SlotGuard {
        let prior = Self::enter_absent(slot);
        SlotGuard { slot, prior: Some(prior) }
    }
}

/// Restores a slot's prior value on drop, whichever way the call exits
#[derive(Debug)]
pub struct SlotGuard {
    slot: Slot,
    prior: Option<Option<String>>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Some(prior) = self.prior.take() {
            ScopedContext::exit(self.slot, prior);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn get_outside_scope_is_absent() {
        assert!(!ScopedContext::in_scope());
        assert_eq!(ScopedContext::get(Slot::Tenant), None);
        assert_eq!(ScopedContext::enter(Slot::Tenant, "t"), None);
        assert_eq!(ScopedContext::get(Slot::Tenant), None);
    }

    #[tokio::test]
    async fn exit_restores_prior_value_at_any_depth() {
        ScopedContext::scope(async {
            let mut priors = Vec::new();
            for depth in 0..5 {
                priors.push(ScopedContext::enter(Slot::Tenant, format!("tenant-{}", depth)));
                assert_eq!(ScopedContext::tenant_id(), Some(format!("tenant-{}", depth)));
            }
            for depth in (0..5usize).rev() {
                let prior = priors.pop().unwrap();
                ScopedContext::exit(Slot::Tenant, prior);
                let expected = depth.checked_sub(1).map(|d| format!("tenant-{}", d));
                assert_eq!(ScopedContext::tenant_id(), expected);
            }
        })
        .await;
    }

    #[tokio::test]
    async fn guard_restores_outer_value_not_absent() {
        ScopedContext::scope(async {
            let _outer = ScopedContext::bind(Slot::Correlation, "outer");
            {
                let _inner = ScopedContext::bind(Slot::Correlation, "inner");
                assert_eq!(ScopedContext::get(Slot::Correlation).as_deref(), Some("inner"));
            }
            assert_eq!(ScopedContext::get(Slot::Correlation).as_deref(), Some("outer"));
        })
        .await;
    }

    #[tokio::test]
    async fn nested_scope_inherits_but_does_not_leak() {
        ScopedContext::scope(async {
            let _tenant = ScopedContext::bind(Slot::Tenant, "outer-tenant");
            ScopedContext::scope(async {
                assert_eq!(ScopedContext::tenant_id().as_deref(), Some("outer-tenant"));
                // deliberately never restored
                ScopedContext::enter(Slot::Tenant, "inner-tenant");
            })
            .await;
            assert_eq!(ScopedContext::tenant_id().as_deref(), Some("outer-tenant"));
        })
        .await;
    }

    #[tokio::test]
    async fn absent_guard_hides_and_restores_slot() {
        ScopedContext::scope(async {
            let _outer = ScopedContext::bind(Slot::Tenant, "outer");
            {
                let _cleared = ScopedContext::bind_absent(Slot::Tenant);
                assert_eq!(ScopedContext::tenant_id(), None);
                {
                    let _inner = ScopedContext::bind(Slot::Tenant, "inner");
                    assert_eq!(ScopedContext::tenant_id().as_deref(), Some("inner"));
                }
                assert_eq!(ScopedContext::tenant_id(), None);
            }
            assert_eq!(ScopedContext::tenant_id().as_deref(), Some("outer"));
        })
        .await;
    }

    #[tokio::test]
    async fn unpaired_calls_outside_scope_are_ignored() {
        assert_eq!(ScopedContext::enter_absent(Slot::Tenant), None);
        ScopedContext::exit(Slot::Tenant, Some("stray".to_string()));
        assert_eq!(ScopedContext::tenant_id(), None);
    }

    #[tokio::test]
    async fn ensure_scope_reuses_enclosing_scope() {
        ScopedContext::scope(async {
            ScopedContext::ensure_scope(async {
                ScopedContext::enter(Slot::Tenant, "shared");
            })
            .await;
            assert_eq!(ScopedContext::tenant_id().as_deref(), Some("shared"));
        })
        .await;
    }

    #[tokio::test]
    async fn values_survive_suspension() {
        ScopedContext::scope(async {
            let _tenant = ScopedContext::bind(Slot::Tenant, "sleepy");
            tokio::time::sleep(Duration::from_millis(5)).await;
            tokio::task::yield_now().await;
            assert_eq!(ScopedContext::tenant_id().as_deref(), Some("sleepy"));
        })
        .await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_calls_are_isolated() {
        let handles: Vec<_> = (0..32)
            .map(|i| {
                tokio::spawn(ScopedContext::scope(async move {
                    let mine = format!("tenant-{}", i);
                    let _tenant = ScopedContext::bind(Slot::Tenant, mine.clone());
                    for _ in 0..10 {
                        tokio::task::yield_now().await;
                        assert_eq!(ScopedContext::tenant_id(), Some(mine.clone()));
                    }
                }))
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn dropped_future_still_restores() {
        ScopedContext::scope(async {
            let _outer = ScopedContext::bind(Slot::Tenant, "outer");
            let inner = async {
                let _inner = ScopedContext::bind(Slot::Tenant, "inner");
                std::future::pending::<()>().await;
            };
            let timed_out = tokio::time::timeout(Duration::from_millis(10), inner).await;
            assert!(timed_out.is_err());
            assert_eq!(ScopedContext::tenant_id().as_deref(), Some("outer"));
        })
        .await;
    }
}

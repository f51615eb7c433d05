// database/isolation.rs - Storage-session isolation primitive
//
// Row-level security policies read a session setting (by default
// `app.current_tenant_id`). This module owns setting and clearing it on a
// pooled Postgres connection, and makes sure a connection that may still
// carry a tenant binding is closed rather than handed back to the pool.

use async_trait::async_trait;
use axum::http::StatusCode;
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

use crate::config::BindingScope;
use crate::database::manager::DatabaseError;

/// How the business part of a call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Completed,
    Failed,
}

impl CallOutcome {
    pub fn from_status(status: StatusCode) -> Self {
        if status.is_success() || status.is_redirection() {
            CallOutcome::Completed
        } else {
            CallOutcome::Failed
        }
    }
}

/// Storage collaborator that binds a tenant into a session
#[async_trait]
pub trait IsolationPrimitive: Send + Sync + 'static {
    type Session: Send + 'static;

    /// Take a session out of the pool for the exclusive use of one call
    async fn acquire(&self) -> Result<Self::Session, DatabaseError>;

    async fn set_isolation_variable(
        &self,
        session: &mut Self::Session,
        tenant_key: &str,
    ) -> Result<(), DatabaseError>;

    /// Remove the binding. `outcome` decides commit/rollback for transaction-scoped sessions.
    async fn clear_isolation_variable(
        &self,
        session: &mut Self::Session,
        outcome: CallOutcome,
    ) -> Result<(), DatabaseError>;

    /// Hand the session back. With `reusable == false` the pool must discard it.
    fn release(&self, session: Self::Session, reusable: bool);
}

/// Postgres implementation of [`IsolationPrimitive`]
pub struct PgIsolation {
    pool: PgPool,
    variable: String,
    scope: BindingScope,
}

impl PgIsolation {
    pub fn new(pool: PgPool, variable: impl Into<String>, scope: BindingScope) -> Result<Self, DatabaseError> {
        let variable = variable.into();
        if !is_valid_setting_name(&variable) {
            return Err(DatabaseError::InvalidSettingName(variable));
        }
        Ok(Self { pool, variable, scope })
    }

    pub fn scope(&self) -> BindingScope {
        self.scope
    }
}

/// Custom settings must be `prefix.name`; the name is spliced into `RESET`, so
/// nothing beyond lowercase identifiers is accepted.
pub fn is_valid_setting_name(name: &str) -> bool {
    fn ident(part: &str) -> bool {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
            && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    }

    match name.split_once('.') {
        Some((prefix, rest)) => ident(prefix) && ident(rest),
        None => false,
    }
}

enum SessionInner {
    Pooled(PoolConnection<Postgres>),
    Transaction(Transaction<'static, Postgres>),
}

/// A connection owned by one call.
///
/// While `bound` is set the connection may carry a tenant binding; dropping it
/// in that state closes the connection instead of returning it to the pool.
pub struct PgSession {
    inner: Option<SessionInner>,
    bound: bool,
}

impl PgSession {
    /// The connection to run business queries on, while the session is open
    pub fn connection(&mut self) -> Option<&mut PgConnection> {
        match self.inner.as_mut()? {
            SessionInner::Pooled(conn) => Some(&mut **conn),
            SessionInner::Transaction(tx) => Some(&mut **tx),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }
}

impl Drop for PgSession {
    fn drop(&mut self) {
        if !self.bound {
            return;
        }
        match self.inner.take() {
            Some(SessionInner::Pooled(conn)) => {
                tracing::warn!("Closing pooled connection that may still carry a tenant binding");
                drop(conn.detach());
            }
            Some(SessionInner::Transaction(tx)) => {
                // set_config(..., true) dies with the transaction
                tracing::warn!("Rolling back tenant-bound transaction that was never finished");
                drop(tx);
            }
            None => {}
        }
    }
}

#[async_trait]
impl IsolationPrimitive for PgIsolation {
    type Session = PgSession;

    async fn acquire(&self) -> Result<PgSession, DatabaseError> {
        let inner = match self.scope {
            BindingScope::Session => SessionInner::Pooled(self.pool.acquire().await?),
            BindingScope::Transaction => SessionInner::Transaction(self.pool.begin().await?),
        };
        Ok(PgSession { inner: Some(inner), bound: false })
    }

    async fn set_isolation_variable(&self, session: &mut PgSession, tenant_key: &str) -> Result<(), DatabaseError> {
        let is_local = self.scope == BindingScope::Transaction;
        // a failed SET may still have reached the server
        session.bound = true;
        let conn = session
            .connection()
            .ok_or_else(|| DatabaseError::Unavailable("session already released".to_string()))?;

        sqlx::query("SELECT set_config($1, $2, $3)")
            .bind(&self.variable)
            .bind(tenant_key)
            .bind(is_local)
            .execute(conn)
            .await?;

        tracing::debug!("Set {} = {} ({:?} scope)", self.variable, tenant_key, self.scope);
        Ok(())
    }

    async fn clear_isolation_variable(&self, session: &mut PgSession, outcome: CallOutcome) -> Result<(), DatabaseError> {
        match session.inner.take() {
            Some(SessionInner::Pooled(mut conn)) => {
                let statement = format!("RESET {}", self.variable);
                let result = sqlx::query(&statement).execute(&mut *conn).await;
                session.inner = Some(SessionInner::Pooled(conn));
                result?;
            }
            Some(SessionInner::Transaction(tx)) => match outcome {
                CallOutcome::Completed => tx.commit().await?,
                CallOutcome::Failed => tx.rollback().await?,
            },
            None => {}
        }

        session.bound = false;
        tracing::debug!("Cleared {}", self.variable);
        Ok(())
    }

    fn release(&self, mut session: PgSession, reusable: bool) {
        if !reusable {
            session.bound = true;
        }
        drop(session);
    }
}

//! Relational store manager.
//!
//! [`RelationalManager`] runs single SQL statements (`execute`, `fetchone`,
//! `fetchall`) with `:name` parameters. Each statement is wrapped explicitly in the
//! reconnect-and-retry protocol; `init`, `reconnect` and `close` are lifecycle
//! methods and are never retried.

mod params;
mod pool;
mod row;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::MysqlSettings;
use crate::error_handling::{is_transient_sql_error, StoreError};
use crate::storage::connection::{ConnectionSlot, Connector};
use crate::storage::retry::{RetryGuard, RetryPolicy};

pub use pool::{AnyConnector, SqlPool};
pub use params::{bind_named, BoundStatement, SqlParams};
pub use row::{SqlRow, SqlValue};

/// Statements a live relational handle can run.
///
/// Implementations must release whatever session they use before returning, on
/// success and on error alike.
#[async_trait]
pub trait SqlHandle: Clone + Send + Sync + 'static {
    /// Runs one statement and commits it.
    async fn execute(&self, sql: &str, params: Option<&SqlParams>) -> Result<(), StoreError>;

    async fn fetch_one(&self, sql: &str, params: Option<&SqlParams>)
        -> Result<Option<SqlRow>, StoreError>;

    async fn fetch_all(&self, sql: &str, params: Option<&SqlParams>)
        -> Result<Vec<SqlRow>, StoreError>;
}

/// Resilient access to a relational store.
///
/// # Example
///
/// ```no_run
/// use crawl_store::{MysqlSettings, RelationalManager, SqlParams};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), crawl_store::StoreError> {
/// let settings = MysqlSettings::new("127.0.0.1", 3306, "crawler", "secret", "crawl");
/// let manager = RelationalManager::from_settings(CancellationToken::new(), &settings)?;
/// manager.init().await?;
/// let params = SqlParams::new().with("host", "example.com");
/// let row = manager
///     .fetchone("SELECT id FROM pages WHERE host = :host", Some(&params))
///     .await?;
/// println!("{row:?}");
/// manager.close().await;
/// # Ok(())
/// # }
/// ```
pub struct RelationalManager<C: Connector = AnyConnector> {
    stop: CancellationToken,
    slot: ConnectionSlot<C>,
    policy: RetryPolicy,
}

impl RelationalManager<AnyConnector> {
    /// Creates a manager for a ready-made connection URL. Call `init()` next.
    pub fn new(stop: CancellationToken, url: impl Into<String>) -> Self {
        Self::with_connector(stop, AnyConnector::new(url))
    }

    /// Creates a manager from discrete host/port/user/password/database settings.
    ///
    /// # Errors
    ///
    /// `StoreError::InvalidSettings` if the settings do not form a valid URL.
    pub fn from_settings(stop: CancellationToken, settings: &MysqlSettings) -> Result<Self, StoreError> {
        Ok(Self::new(stop, settings.connection_url()?))
    }
}

impl<C> RelationalManager<C>
where
    C: Connector,
    C::Handle: SqlHandle,
{
    pub fn with_connector(stop: CancellationToken, connector: C) -> Self {
        Self {
            stop,
            slot: ConnectionSlot::new(connector),
            policy: RetryPolicy::default(),
        }
    }

    /// Overrides the reconnect pacing.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn connector(&self) -> &C {
        self.slot.connector()
    }

    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    /// Establishes the first connection pool.
    pub async fn init(&self) -> Result<(), StoreError> {
        self.slot.open().await
    }

    /// Disposes the current pool and builds a fresh one.
    pub async fn reconnect(&self) -> Result<(), StoreError> {
        self.slot.open().await
    }

    /// Disposes the pool. Idempotent; also fine before `init()`.
    pub async fn close(&self) {
        self.slot.close().await
    }

    pub async fn is_connected(&self) -> bool {
        self.slot.is_open().await
    }

    fn guard(&self, operation: &'static str) -> RetryGuard<'_> {
        RetryGuard {
            stop: &self.stop,
            store: self.slot.store(),
            operation,
            policy: self.policy,
        }
    }

    /// Runs a statement that returns no rows and commits it.
    pub async fn execute(&self, sql: &str, params: Option<&SqlParams>) -> Result<(), StoreError> {
        self.slot
            .run(
                self.guard("execute"),
                is_transient_sql_error,
                move |handle| async move { handle.execute(sql, params).await },
            )
            .await
    }

    /// Returns the first row, or `None` when nothing matches.
    pub async fn fetchone(
        &self,
        sql: &str,
        params: Option<&SqlParams>,
    ) -> Result<Option<SqlRow>, StoreError> {
        self.slot
            .run(
                self.guard("fetchone"),
                is_transient_sql_error,
                move |handle| async move { handle.fetch_one(sql, params).await },
            )
            .await
    }

    /// Returns every row in result order.
    pub async fn fetchall(
        &self,
        sql: &str,
        params: Option<&SqlParams>,
    ) -> Result<Vec<SqlRow>, StoreError> {
        self.slot
            .run(
                self.guard("fetchall"),
                is_transient_sql_error,
                move |handle| async move { handle.fetch_all(sql, params).await },
            )
            .await
    }
}

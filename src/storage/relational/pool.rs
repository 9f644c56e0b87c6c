//! SQL connector and pool handle.
//!
//! The URL scheme picks the driver. `mysql://` and `mariadb://` URLs get sqlx's
//! native MySQL pool, so every MySQL column type (`DATETIME`, `DECIMAL`, `JSON`, ...)
//! can be decoded. Any other scheme goes through the runtime-selected `Any` driver;
//! `sqlite://` is what the tests use. Pools ping a connection before handing it out,
//! and every statement checks out its own short-lived connection.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use sqlx::any::AnyPoolOptions;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::AnyPool;

use super::params::{bind_named, BoundStatement, SqlParams};
use super::row::{SqlRow, SqlValue};
use super::SqlHandle;
use crate::config::{DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_MAX_CONNECTIONS, DISCONNECT_TIMEOUT};
use crate::error_handling::{StoreError, StoreKind};
use crate::storage::connection::Connector;

/// Creates connection pools for a fixed connection URL.
#[derive(Clone)]
pub struct AnyConnector {
    url: String,
    max_connections: u32,
    acquire_timeout: Duration,
}

impl AnyConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Connection URL with any password masked.
    pub fn redacted_url(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(mut parsed) if parsed.password().is_some() => {
                let _ = parsed.set_password(Some("***"));
                parsed.to_string()
            }
            _ => self.url.clone(),
        }
    }
}

impl std::fmt::Debug for AnyConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyConnector")
            .field("url", &self.redacted_url())
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

/// Live pool for whichever driver the connection URL selected.
#[derive(Clone, Debug)]
pub enum SqlPool {
    MySql(MySqlPool),
    Any(AnyPool),
}

impl SqlPool {
    /// Closes the pool, waiting for checked-out connections to come back.
    pub async fn close(&self) {
        match self {
            SqlPool::MySql(pool) => pool.close().await,
            SqlPool::Any(pool) => pool.close().await,
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            SqlPool::MySql(pool) => pool.is_closed(),
            SqlPool::Any(pool) => pool.is_closed(),
        }
    }
}

fn is_mysql_url(url: &str) -> bool {
    url.split_once("://").is_some_and(|(scheme, _)| {
        scheme.eq_ignore_ascii_case("mysql") || scheme.eq_ignore_ascii_case("mariadb")
    })
}

#[async_trait]
impl Connector for AnyConnector {
    type Handle = SqlPool;

    fn store(&self) -> StoreKind {
        StoreKind::Relational
    }

    async fn connect(&self) -> Result<SqlPool, StoreError> {
        debug!("Connecting to {}", self.redacted_url());
        if is_mysql_url(&self.url) {
            let pool = MySqlPoolOptions::new()
                .max_connections(self.max_connections)
                .acquire_timeout(self.acquire_timeout)
                .test_before_acquire(true)
                .connect(&self.url)
                .await?;
            return Ok(SqlPool::MySql(pool));
        }
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .test_before_acquire(true)
            .connect(&self.url)
            .await?;
        Ok(SqlPool::Any(pool))
    }

    async fn disconnect(&self, pool: SqlPool) {
        if tokio::time::timeout(DISCONNECT_TIMEOUT, pool.close())
            .await
            .is_err()
        {
            warn!(
                "SQL pool did not drain within {}s, abandoning checked-out connections",
                DISCONNECT_TIMEOUT.as_secs()
            );
        }
    }
}

/// Binds positional values onto a query for either driver.
macro_rules! bind_values {
    ($query:expr, $values:expr) => {{
        let mut query = $query;
        for value in $values {
            query = match value {
                SqlValue::Null => query.bind(None::<String>),
                SqlValue::Bool(b) => query.bind(*b),
                SqlValue::Int(i) => query.bind(*i),
                SqlValue::Float(f) => query.bind(*f),
                SqlValue::Text(s) => query.bind(s.clone()),
                SqlValue::Bytes(b) => query.bind(b.clone()),
            };
        }
        query
    }};
}

/// Expands `$body` once per driver, with `$pool` bound to the concrete pool and `$db`
/// naming its database type.
macro_rules! on_pool {
    ($handle:expr, $pool:ident, $db:ident => $body:expr) => {
        match $handle {
            SqlPool::MySql($pool) => {
                type $db = sqlx::MySql;
                $body
            }
            SqlPool::Any($pool) => {
                type $db = sqlx::Any;
                $body
            }
        }
    };
}

#[async_trait]
impl SqlHandle for SqlPool {
    async fn execute(&self, sql: &str, params: Option<&SqlParams>) -> Result<(), StoreError> {
        let BoundStatement { sql, values } = bind_named(sql, params)?;
        // Dropping the transaction on an error path rolls back and returns the connection.
        on_pool!(self, pool, Db => {
            let mut tx = pool.begin().await?;
            bind_values!(sqlx::query::<Db>(&sql), &values)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        });
        Ok(())
    }

    async fn fetch_one(
        &self,
        sql: &str,
        params: Option<&SqlParams>,
    ) -> Result<Option<SqlRow>, StoreError> {
        let BoundStatement { sql, values } = bind_named(sql, params)?;
        on_pool!(self, pool, Db => {
            let mut conn = pool.acquire().await?;
            let row = bind_values!(sqlx::query::<Db>(&sql), &values)
                .fetch_optional(&mut *conn)
                .await?;
            Ok(row.as_ref().map(SqlRow::try_from).transpose()?)
        })
    }

    async fn fetch_all(
        &self,
        sql: &str,
        params: Option<&SqlParams>,
    ) -> Result<Vec<SqlRow>, StoreError> {
        let BoundStatement { sql, values } = bind_named(sql, params)?;
        on_pool!(self, pool, Db => {
            let mut conn = pool.acquire().await?;
            let rows = bind_values!(sqlx::query::<Db>(&sql), &values)
                .fetch_all(&mut *conn)
                .await?;
            Ok(rows
                .iter()
                .map(SqlRow::try_from)
                .collect::<Result<Vec<_>, _>>()?)
        })
    }
}

//! crawl_store library: resilient document and relational store access for crawlers
//!
//! Two managers wrap a MongoDB database and a MySQL connection pool. Every data
//! operation runs under the same protocol:
//!
//! - nothing is dispatched once the crawler's stop signal (a [`CancellationToken`]) is
//!   set;
//! - a transient connectivity error rebuilds the connection once and retries the
//!   operation once;
//! - any other error is returned unchanged.
//!
//! # Example
//!
//! ```no_run
//! use crawl_store::{DocumentManager, MongoSettings};
//! use mongodb::bson::doc;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let stop = CancellationToken::new();
//! let pages = DocumentManager::from_settings(stop.clone(), &MongoSettings::default());
//! pages.init().await?;
//!
//! pages
//!     .update_one("pages", doc! { "url": "https://example.com" }, doc! { "$set": { "status": 200 } }, true)
//!     .await?;
//!
//! // Spider closing: later operations fail fast with StoreError::Cancelled
//! stop.cancel();
//! pages.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Use `#[tokio::main]` in your application
//! or ensure you're calling library functions within an async context.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod app;
pub mod config;
mod error_handling;
pub mod initialization;
pub mod storage;

// Re-export public API
pub use config::{LogFormat, LogLevel, MongoSettings, MysqlSettings};
pub use error_handling::{
    is_transient_document_error, is_transient_sql_error, InitializationError, StoreError,
    StoreKind,
};
pub use storage::{
    AnyConnector, Connector, DeleteAck, DocumentHandle, DocumentManager, InsertAck,
    MongoConnector, MongoHandle, RelationalManager, RetryPolicy, SqlHandle, SqlParams, SqlPool,
    SqlRow, SqlValue, UpdateAck,
};

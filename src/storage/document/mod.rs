//! Document store manager.
//!
//! [`DocumentManager`] exposes insert/find/update/delete on named collections. Each
//! verb is one logical operation under the reconnect-and-retry protocol: a dropped
//! connection is rebuilt once and the verb re-issued, and nothing is dispatched once
//! the crawler's stop signal is set.

mod mongo;

use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use tokio_util::sync::CancellationToken;

use crate::config::MongoSettings;
use crate::error_handling::{is_transient_document_error, StoreError};
use crate::storage::connection::{ConnectionSlot, Connector};
use crate::storage::retry::{RetryGuard, RetryPolicy};

pub use mongo::{MongoConnector, MongoHandle};

/// Acknowledgement of an inserted document.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertAck {
    pub inserted_id: Bson,
}

/// Acknowledgement of an update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateAck {
    pub matched_count: u64,
    pub modified_count: u64,
    /// Set when the update inserted a new document (upsert).
    pub upserted_id: Option<Bson>,
}

/// Acknowledgement of a delete.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteAck {
    pub deleted_count: u64,
}

/// Operations a live document store handle supports.
#[async_trait]
pub trait DocumentHandle: Clone + Send + Sync + 'static {
    async fn insert_one(&self, collection: &str, document: Document)
        -> Result<InsertAck, StoreError>;

    async fn find_one(&self, collection: &str, filter: Document)
        -> Result<Option<Document>, StoreError>;

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateAck, StoreError>;

    async fn delete_one(&self, collection: &str, filter: Document)
        -> Result<DeleteAck, StoreError>;
}

/// Resilient access to a document store.
///
/// # Example
///
/// ```no_run
/// use crawl_store::{DocumentManager, MongoSettings};
/// use mongodb::bson::doc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), crawl_store::StoreError> {
/// let stop = CancellationToken::new();
/// let manager = DocumentManager::from_settings(stop.clone(), &MongoSettings::default());
/// manager.init().await?;
/// manager.insert_one("pages", doc! { "url": "https://example.com" }).await?;
/// manager.close().await;
/// # Ok(())
/// # }
/// ```
pub struct DocumentManager<C: Connector = MongoConnector> {
    stop: CancellationToken,
    slot: ConnectionSlot<C>,
    policy: RetryPolicy,
}

impl DocumentManager<MongoConnector> {
    /// Creates a manager for `database` on the server at `uri`. Call `init()` next.
    pub fn new(stop: CancellationToken, uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self::from_settings(stop, &MongoSettings::new(uri, database))
    }

    /// Creates a manager from crawler settings.
    pub fn from_settings(stop: CancellationToken, settings: &MongoSettings) -> Self {
        Self::with_connector(stop, MongoConnector::new(settings.clone()))
    }
}

impl<C> DocumentManager<C>
where
    C: Connector,
    C::Handle: DocumentHandle,
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

    /// Establishes the first connection.
    pub async fn init(&self) -> Result<(), StoreError> {
        self.slot.open().await
    }

    /// Discards the current client and builds a fresh one.
    pub async fn reconnect(&self) -> Result<(), StoreError> {
        self.slot.open().await
    }

    /// Shuts the client down. Idempotent; also fine before `init()`.
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

    pub async fn insert_one(
        &self,
        collection: &str,
        document: Document,
    ) -> Result<InsertAck, StoreError> {
        let document = &document;
        self.slot
            .run(
                self.guard("insert_one"),
                is_transient_document_error,
                move |handle| async move { handle.insert_one(collection, document.clone()).await },
            )
            .await
    }

    pub async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, StoreError> {
        let filter = &filter;
        self.slot
            .run(
                self.guard("find_one"),
                is_transient_document_error,
                move |handle| async move { handle.find_one(collection, filter.clone()).await },
            )
            .await
    }

    /// Updates the first document matching `filter`; with `upsert` a missing
    /// document is inserted instead.
    pub async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateAck, StoreError> {
        let (filter, update) = (&filter, &update);
        self.slot
            .run(
                self.guard("update_one"),
                is_transient_document_error,
                move |handle| async move {
                    handle
                        .update_one(collection, filter.clone(), update.clone(), upsert)
                        .await
                },
            )
            .await
    }

    pub async fn delete_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<DeleteAck, StoreError> {
        let filter = &filter;
        self.slot
            .run(
                self.guard("delete_one"),
                is_transient_document_error,
                move |handle| async move { handle.delete_one(collection, filter.clone()).await },
            )
            .await
    }
}

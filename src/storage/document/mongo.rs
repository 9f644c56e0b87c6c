//! MongoDB connector built on the official async driver.

use std::future::IntoFuture;

use async_trait::async_trait;
use log::{debug, warn};
use mongodb::bson::Document;
use mongodb::{Client, Database};

use super::{DeleteAck, DocumentHandle, InsertAck, UpdateAck};
use crate::config::{MongoSettings, DISCONNECT_TIMEOUT};
use crate::error_handling::{StoreError, StoreKind};
use crate::storage::connection::Connector;

/// Creates clients from a connection URI and a database name.
#[derive(Debug, Clone)]
pub struct MongoConnector {
    settings: MongoSettings,
}

impl MongoConnector {
    pub fn new(settings: MongoSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &MongoSettings {
        &self.settings
    }
}

/// A client and the database handle derived from it.
#[derive(Debug, Clone)]
pub struct MongoHandle {
    client: Client,
    database: Database,
}

impl MongoHandle {
    pub fn database(&self) -> &Database {
        &self.database
    }
}

#[async_trait]
impl Connector for MongoConnector {
    type Handle = MongoHandle;

    fn store(&self) -> StoreKind {
        StoreKind::Document
    }

    async fn connect(&self) -> Result<MongoHandle, StoreError> {
        // The driver connects lazily; this only validates the URI and starts monitoring.
        let client = Client::with_uri_str(&self.settings.uri).await?;
        let database = client.database(&self.settings.database);
        debug!("MongoDB client created for database {}", self.settings.database);
        Ok(MongoHandle { client, database })
    }

    async fn disconnect(&self, handle: MongoHandle) {
        let shutdown = handle.client.shutdown().immediate(true).into_future();
        if tokio::time::timeout(DISCONNECT_TIMEOUT, shutdown)
            .await
            .is_err()
        {
            warn!(
                "MongoDB client shutdown did not finish within {}s, abandoning it",
                DISCONNECT_TIMEOUT.as_secs()
            );
        }
    }
}

#[async_trait]
impl DocumentHandle for MongoHandle {
    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
    ) -> Result<InsertAck, StoreError> {
        let result = self
            .database
            .collection::<Document>(collection)
            .insert_one(document)
            .await?;
        Ok(InsertAck {
            inserted_id: result.inserted_id,
        })
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self
            .database
            .collection::<Document>(collection)
            .find_one(filter)
            .await?)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateAck, StoreError> {
        let result = self
            .database
            .collection::<Document>(collection)
            .update_one(filter, update)
            .upsert(upsert)
            .await?;
        Ok(UpdateAck {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> Result<DeleteAck, StoreError> {
        let result = self
            .database
            .collection::<Document>(collection)
            .delete_one(filter)
            .await?;
        Ok(DeleteAck {
            deleted_count: result.deleted_count,
        })
    }
}

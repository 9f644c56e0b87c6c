// Shared test helpers: in-memory store doubles with injectable faults.
//
// Both doubles count connects and handle calls so tests can assert exactly how many
// rebuilds an operation caused, and record an event log so ordering can be checked.
#![allow(dead_code)] // Each test file uses a different subset

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document};
use serde::de::Error as _;

use crawl_store::{
    AnyConnector, Connector, DeleteAck, DocumentHandle, InsertAck, SqlHandle, SqlParams, SqlPool,
    SqlRow, StoreError, StoreKind, UpdateAck,
};

/// A failure injected into the next handle call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Connectivity failure the managers should recover from.
    Transient,
    /// Application failure that must surface unchanged.
    Permanent,
}

pub fn transient_document_error() -> StoreError {
    StoreError::Document(mongodb::error::Error::from(io::Error::new(
        io::ErrorKind::ConnectionReset,
        "connection reset by peer",
    )))
}

pub fn permanent_document_error() -> StoreError {
    StoreError::Document(mongodb::error::Error::from(
        mongodb::bson::de::Error::custom("unexpected field type"),
    ))
}

pub fn transient_sql_error() -> StoreError {
    StoreError::Sql(sqlx::Error::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "server has gone away",
    )))
}

pub fn permanent_sql_error() -> StoreError {
    StoreError::Sql(sqlx::Error::RowNotFound)
}

/// Connect/call bookkeeping shared by both doubles.
#[derive(Default)]
struct Ledger {
    events: Mutex<Vec<String>>,
    connects: AtomicUsize,
    calls: AtomicUsize,
    refuse_connects: AtomicUsize,
    latest: AtomicUsize,
    dead: Mutex<HashSet<usize>>,
    faults: Mutex<VecDeque<Fault>>,
}

impl Ledger {
    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    /// Numbers a new handle, or fails if a refused connect was scripted.
    fn connect(&self) -> Result<usize, ()> {
        if self
            .refuse_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            self.record("connect refused".to_string());
            return Err(());
        }
        let id = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        self.latest.store(id, Ordering::SeqCst);
        self.record(format!("connect {id}"));
        Ok(id)
    }

    fn disconnect(&self, id: usize) {
        self.record(format!("disconnect {id}"));
    }

    /// Bookkeeping for one handle call; returns the fault to raise, if any.
    fn call(&self, id: usize, operation: &str) -> Option<Fault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.record(format!("{operation} on {id}"));
        if self.dead.lock().unwrap().contains(&id) {
            return Some(Fault::Transient);
        }
        self.faults.lock().unwrap().pop_front()
    }
}

macro_rules! ledger_accessors {
    () => {
        /// Successful connects so far (init plus rebuilds).
        pub fn connects(&self) -> usize {
            self.ledger.connects.load(Ordering::SeqCst)
        }

        /// Handle calls so far, including failed ones.
        pub fn calls(&self) -> usize {
            self.ledger.calls.load(Ordering::SeqCst)
        }

        pub fn events(&self) -> Vec<String> {
            self.ledger.events.lock().unwrap().clone()
        }

        /// Makes every call on the current handle fail transiently, as if the server
        /// dropped the connection.
        pub fn drop_connection(&self) {
            let id = self.ledger.latest.load(Ordering::SeqCst);
            self.ledger.dead.lock().unwrap().insert(id);
        }

        /// Queues faults for the next handle calls, in order.
        pub fn inject(&self, faults: &[Fault]) {
            self.ledger.faults.lock().unwrap().extend(faults.iter().copied());
        }

        /// Makes the next `n` connect attempts fail.
        pub fn refuse_connects(&self, n: usize) {
            self.ledger.refuse_connects.store(n, Ordering::SeqCst);
        }
    };
}

//-----------------------------------------------------------------------------
// Document store double
//-----------------------------------------------------------------------------

/// In-memory document store. Data survives reconnects, like a real server would.
#[derive(Clone, Default)]
pub struct FakeDocumentStore {
    ledger: Arc<Ledger>,
    collections: Arc<Mutex<HashMap<String, Vec<Document>>>>,
}

#[derive(Clone)]
pub struct FakeDocumentHandle {
    id: usize,
    store: FakeDocumentStore,
}

impl FakeDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    ledger_accessors!();

    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Connector for FakeDocumentStore {
    type Handle = FakeDocumentHandle;

    fn store(&self) -> StoreKind {
        StoreKind::Document
    }

    async fn connect(&self) -> Result<FakeDocumentHandle, StoreError> {
        let id = self
            .ledger
            .connect()
            .map_err(|()| transient_document_error())?;
        Ok(FakeDocumentHandle {
            id,
            store: self.clone(),
        })
    }

    async fn disconnect(&self, handle: FakeDocumentHandle) {
        self.ledger.disconnect(handle.id);
    }
}

fn matches(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, value)| document.get(key) == Some(value))
}

impl FakeDocumentHandle {
    /// Counts the call, then yields so concurrent operations interleave like real I/O.
    async fn enter(&self, operation: &str) -> Result<(), StoreError> {
        let fault = self.store.ledger.call(self.id, operation);
        tokio::task::yield_now().await;
        match fault {
            None => Ok(()),
            Some(Fault::Transient) => Err(transient_document_error()),
            Some(Fault::Permanent) => Err(permanent_document_error()),
        }
    }
}

#[async_trait]
impl DocumentHandle for FakeDocumentHandle {
    async fn insert_one(
        &self,
        collection: &str,
        mut document: Document,
    ) -> Result<InsertAck, StoreError> {
        self.enter("insert_one").await?;
        if !document.contains_key("_id") {
            document.insert("_id", ObjectId::new());
        }
        let inserted_id = document.get("_id").cloned().unwrap_or(Bson::Null);
        self.store
            .collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(document);
        Ok(InsertAck { inserted_id })
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, StoreError> {
        self.enter("find_one").await?;
        Ok(self
            .store
            .documents(collection)
            .into_iter()
            .find(|d| matches(d, &filter)))
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateAck, StoreError> {
        self.enter("update_one").await?;
        let set = update.get_document("$set").cloned().unwrap_or_default();
        let mut collections = self.store.collections.lock().unwrap();
        let documents = collections.entry(collection.to_string()).or_default();

        if let Some(existing) = documents.iter_mut().find(|d| matches(d, &filter)) {
            let before = existing.clone();
            for (key, value) in set {
                existing.insert(key, value);
            }
            return Ok(UpdateAck {
                matched_count: 1,
                modified_count: u64::from(*existing != before),
                upserted_id: None,
            });
        }

        if !upsert {
            return Ok(UpdateAck {
                matched_count: 0,
                modified_count: 0,
                upserted_id: None,
            });
        }
        let mut document = filter;
        for (key, value) in set {
            document.insert(key, value);
        }
        let id = Bson::ObjectId(ObjectId::new());
        document.insert("_id", id.clone());
        documents.push(document);
        Ok(UpdateAck {
            matched_count: 0,
            modified_count: 0,
            upserted_id: Some(id),
        })
    }

    async fn delete_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<DeleteAck, StoreError> {
        self.enter("delete_one").await?;
        let mut collections = self.store.collections.lock().unwrap();
        let documents = collections.entry(collection.to_string()).or_default();
        let deleted_count = match documents.iter().position(|d| matches(d, &filter)) {
            Some(index) => {
                documents.remove(index);
                1
            }
            None => 0,
        };
        Ok(DeleteAck { deleted_count })
    }
}

//-----------------------------------------------------------------------------
// Relational store double
//-----------------------------------------------------------------------------

/// Real SQL pools (SQLite in tests) with fault injection in front of every statement.
#[derive(Clone)]
pub struct FlakySqlStore {
    ledger: Arc<Ledger>,
    inner: AnyConnector,
    pools: Arc<Mutex<Vec<SqlPool>>>,
}

#[derive(Clone)]
pub struct FlakyPool {
    id: usize,
    pool: SqlPool,
    ledger: Arc<Ledger>,
}

impl FlakySqlStore {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            ledger: Arc::default(),
            inner: AnyConnector::new(url),
            pools: Arc::default(),
        }
    }

    ledger_accessors!();

    /// The most recently built pool.
    pub fn current_pool(&self) -> Option<SqlPool> {
        self.pools.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Connector for FlakySqlStore {
    type Handle = FlakyPool;

    fn store(&self) -> StoreKind {
        StoreKind::Relational
    }

    async fn connect(&self) -> Result<FlakyPool, StoreError> {
        let id = self.ledger.connect().map_err(|()| transient_sql_error())?;
        let pool = self.inner.connect().await?;
        self.pools.lock().unwrap().push(pool.clone());
        Ok(FlakyPool {
            id,
            pool,
            ledger: self.ledger.clone(),
        })
    }

    async fn disconnect(&self, handle: FlakyPool) {
        self.ledger.disconnect(handle.id);
        self.inner.disconnect(handle.pool).await;
    }
}

impl FlakyPool {
    async fn enter(&self, operation: &str) -> Result<(), StoreError> {
        let fault = self.ledger.call(self.id, operation);
        tokio::task::yield_now().await;
        match fault {
            None => Ok(()),
            Some(Fault::Transient) => Err(transient_sql_error()),
            Some(Fault::Permanent) => Err(permanent_sql_error()),
        }
    }
}

#[async_trait]
impl SqlHandle for FlakyPool {
    async fn execute(&self, sql: &str, params: Option<&SqlParams>) -> Result<(), StoreError> {
        self.enter("execute").await?;
        SqlHandle::execute(&self.pool, sql, params).await
    }

    async fn fetch_one(
        &self,
        sql: &str,
        params: Option<&SqlParams>,
    ) -> Result<Option<SqlRow>, StoreError> {
        self.enter("fetch_one").await?;
        SqlHandle::fetch_one(&self.pool, sql, params).await
    }

    async fn fetch_all(
        &self,
        sql: &str,
        params: Option<&SqlParams>,
    ) -> Result<Vec<SqlRow>, StoreError> {
        self.enter("fetch_all").await?;
        SqlHandle::fetch_all(&self.pool, sql, params).await
    }
}

/// SQLite URL for a fresh database file inside `dir`.
pub fn sqlite_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite://{}?mode=rwc", dir.path().join("crawl.db").display())
}

// storage/mod.rs
// Store managers and the reconnect-and-retry machinery they share

pub mod connection;
pub mod document;
pub mod relational;
pub mod retry;

// Re-export commonly used items
pub use connection::{ConnectionSlot, Connector};
pub use document::{
    DeleteAck, DocumentHandle, DocumentManager, InsertAck, MongoConnector, MongoHandle, UpdateAck,
};
pub use relational::{
    AnyConnector, RelationalManager, SqlHandle, SqlParams, SqlPool, SqlRow, SqlValue,
};
pub use retry::{with_reconnect, RetryGuard, RetryPolicy};

//! Error type definitions.
//!
//! This module defines the errors surfaced by the store managers and by process
//! initialization.

use log::SetLoggerError;
use strum_macros::{Display, EnumIter};
use thiserror::Error;

/// Which backing store an error or log line refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum StoreKind {
    #[strum(serialize = "MongoDB")]
    Document,
    #[strum(serialize = "SQL")]
    Relational,
}

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),
}

/// Errors returned by store manager operations.
///
/// Nothing is swallowed: every failure of a façade method reaches the caller as one
/// of these variants.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The stop signal was observed at a decision point.
    #[error("{store} operation `{operation}` aborted: stop signal is set")]
    Cancelled {
        store: StoreKind,
        operation: &'static str,
    },

    /// Operation issued before `init()` or after `close()`.
    #[error("{store} manager is not connected (call init() first)")]
    NotConnected { store: StoreKind },

    /// A previous rebuild failed and left no live handle.
    #[error("{store} connection is down after a failed reconnect")]
    Disconnected { store: StoreKind },

    /// Rebuilding the connection during the retry step failed.
    #[error("{store} reconnect failed: {source}")]
    ReconnectFailed {
        store: StoreKind,
        #[source]
        source: Box<StoreError>,
    },

    /// MongoDB driver error.
    #[error("MongoDB error: {0}")]
    Document(#[from] mongodb::error::Error),

    /// SQL execution error.
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    /// Named parameters did not match the statement.
    #[error("Invalid SQL parameters: {0}")]
    InvalidParameters(String),

    /// Connection settings could not be turned into a connection string.
    #[error("Invalid connection settings: {0}")]
    InvalidSettings(String),
}

impl StoreError {
    /// Returns `true` if the operation was aborted by the stop signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StoreError::Cancelled { .. })
    }

    /// Returns `true` if the rebuild inside the retry step failed.
    pub fn is_reconnect_failure(&self) -> bool {
        matches!(self, StoreError::ReconnectFailed { .. })
    }
}

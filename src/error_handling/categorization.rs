//! Transient error classification.
//!
//! Decides which failures are worth one reconnect-and-retry. Everything not listed
//! here is an application error and propagates untouched.

use mongodb::error::{ErrorKind, WriteFailure, RETRYABLE_WRITE_ERROR};

use super::types::StoreError;

/// Server codes meaning "not primary" or "node is recovering".
///
/// These are the replica-set failover conditions a fresh client recovers from.
const MONGO_RECONNECT_CODES: &[i32] = &[
    91,    // ShutdownInProgress
    189,   // PrimarySteppedDown
    262,   // ExceededTimeLimit
    10107, // NotWritablePrimary
    11600, // InterruptedAtShutdown
    11602, // InterruptedDueToReplStateChange
    13435, // NotPrimaryNoSecondaryOk
    13436, // NotPrimaryOrSecondary
];

/// MySQL error numbers for lost or refused connections.
const MYSQL_CONNECTION_ERRORS: &[u16] = &[
    1040, // ER_CON_COUNT_ERROR (too many connections)
    1053, // ER_SERVER_SHUTDOWN
    1927, // ER_CONNECTION_KILLED
    2006, // CR_SERVER_GONE_ERROR
    2013, // CR_SERVER_LOST
];

/// Returns `true` for document store failures that a reconnect can fix.
///
/// Covers the connection-loss family: socket errors, pool clears, server selection
/// failures, DNS failures, a client that was shut down underneath the call,
/// retryable-write labels, and failover codes.
pub fn is_transient_document_error(error: &StoreError) -> bool {
    match error {
        StoreError::Disconnected { .. } => true,
        StoreError::Document(err) => is_transient_mongo_error(err),
        _ => false,
    }
}

/// Returns `true` for relational store failures that a reconnect can fix.
///
/// Covers transport-level errors and pool exhaustion, plus database errors whose
/// SQLSTATE is class `08` or whose MySQL number signals a lost connection.
/// Constraint violations, syntax errors and decode errors are not transient.
pub fn is_transient_sql_error(error: &StoreError) -> bool {
    match error {
        StoreError::Disconnected { .. } => true,
        StoreError::Sql(err) => is_transient_sqlx_error(err),
        _ => false,
    }
}

fn is_transient_mongo_error(err: &mongodb::error::Error) -> bool {
    if err.contains_label(RETRYABLE_WRITE_ERROR) {
        return true;
    }
    match err.kind.as_ref() {
        ErrorKind::Io(_)
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::ServerSelection { .. }
        | ErrorKind::DnsResolve { .. }
        | ErrorKind::Shutdown => true,
        ErrorKind::Command(command) => MONGO_RECONNECT_CODES.contains(&command.code),
        ErrorKind::Write(WriteFailure::WriteConcernError(concern)) => {
            MONGO_RECONNECT_CODES.contains(&concern.code)
        }
        _ => false,
    }
}

fn is_transient_sqlx_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_err) => {
            let connection_state = db_err
                .code()
                .map(|code| code.starts_with("08"))
                .unwrap_or(false);
            let connection_number = db_err
                .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                .map(|mysql| MYSQL_CONNECTION_ERRORS.contains(&mysql.number()))
                .unwrap_or(false);
            connection_state || connection_number
        }
        _ => false,
    }
}

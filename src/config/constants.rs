//! Configuration constants.
//!
//! Defaults for connection parameters, reconnect pacing and pool limits used by
//! both store managers.

use std::time::Duration;

/// Pause before the single reconnect attempt after a transient failure.
/// The stop signal is honoured while waiting.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on how long closing an old handle may take during rebuild or close.
/// The handle is considered gone once this elapses; stragglers are abandoned.
pub const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// Relational pool defaults
/// Maximum pooled connections per relational manager
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
/// How long a statement waits for a pooled connection before failing
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

// Connection defaults
pub const DEFAULT_SQL_SCHEME: &str = "mysql";
pub const DEFAULT_MYSQL_HOST: &str = "127.0.0.1";
pub const DEFAULT_MYSQL_PORT: u16 = 3306;
pub const DEFAULT_MONGODB_URI: &str = "mongodb://localhost:27017";

/// Collection touched by `crawl_store check`
pub const CHECK_COLLECTION: &str = "crawl_store_check";
/// Statement run by `crawl_store check`
pub const CHECK_STATEMENT: &str = "SELECT 1";

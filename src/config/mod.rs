//! Application configuration and constants.
//!
//! This module provides:
//! - Configuration constants (reconnect pacing, pool limits, defaults)
//! - Connection settings handed to the store managers
//! - CLI option types and parsing

mod cli;
mod constants;
mod types;

// Re-export all constants
pub use cli::{parse_param, Command, MongoArgs, MysqlArgs, Opt};
pub use constants::*;
pub use types::{LogFormat, LogLevel, MongoSettings, MysqlSettings};

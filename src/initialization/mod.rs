//! Application initialization.
//!
//! Sets up process-wide resources the binary needs before any store is touched.

mod logger;

// Re-export public API
pub use logger::init_logger_with;

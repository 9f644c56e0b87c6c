//! Error handling.
//!
//! This module provides:
//! - Error type definitions for store operations and initialization
//! - Transient error classification for each backing store
//!
//! Errors are categorized into:
//! - **Cancellation**: the stop signal was observed; never retried
//! - **Transient**: connectivity failures; one reconnect-and-retry per call
//! - **Application**: everything else; propagated on first occurrence

mod categorization;
mod types;

// Re-export public API
pub use categorization::{is_transient_document_error, is_transient_sql_error};
pub use types::{InitializationError, StoreError, StoreKind};

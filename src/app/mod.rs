//! Binary support: signal handling and shutdown.

pub mod shutdown;

// Re-export public API
pub use shutdown::{shutdown_gracefully, spawn_ctrl_c_listener};

//! Stockroom Server library
//!
//! Re-exports the server modules for use by the binary and integration tests.

use std::sync::Arc;

use stockroom::Inventory;

pub mod api;
pub mod db;

/// Shared application state
pub struct AppState {
    /// Account and session database
    pub db: Arc<db::Database>,
    /// The inventory service every request goes through
    pub inventory: Inventory,
    /// Idle time after which a session stops resolving
    pub session_ttl: chrono::Duration,
}

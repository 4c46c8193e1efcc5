//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::web::sync::SyncHandle;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all
/// handlers. The document itself is owned by the canonical-state task;
/// handlers only hold its handle.
#[derive(Clone)]
pub struct AppState {
    pub sync: SyncHandle,
    pub config: Arc<Config>,
}

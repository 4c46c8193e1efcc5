//! crates/foyer_core/src/ports.rs
//!
//! Defines the storage contract for the shared document. The trait forms
//! the boundary of the hexagonal architecture: the core stays independent
//! of the concrete backend (remote store, local file, or the degrading
//! wrapper that combines them).

use crate::domain::AppData;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A generic error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The backend could not be reached at all (timeout, network, auth).
    /// The fallback wrapper treats this as a signal to degrade.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Identity and age of one retained backup.
#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

/// Durable storage of the whole document plus timestamped backups.
///
/// `load_app_data` returns `Ok(None)` when no document has ever been
/// written; the caller materializes defaults. Backups are retention-capped:
/// after a successful insert, only the 10 most recent survive.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save_app_data(&self, data: &AppData) -> PortResult<()>;

    async fn load_app_data(&self) -> PortResult<Option<AppData>>;

    async fn create_backup(&self, data: &AppData) -> PortResult<String>;

    async fn get_backups(&self) -> PortResult<Vec<BackupInfo>>;
}

/// Maximum number of backups kept per backend.
pub const BACKUP_RETENTION: usize = 10;

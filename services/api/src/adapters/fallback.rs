//! services/api/src/adapters/fallback.rs
//!
//! Degrading `StateStore`: routes to the primary remote store until it
//! fails once, then to the local file store for the rest of the process
//! lifetime. There is no retry-to-primary.

use async_trait::async_trait;
use foyer_core::domain::AppData;
use foyer_core::ports::{BackupInfo, PortError, PortResult, StateStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use super::file::FileStore;

pub struct FallbackStore {
    primary: Option<Arc<dyn StateStore>>,
    local: FileStore,
    /// Once set, every call goes to the local store. Never cleared.
    degraded: AtomicBool,
}

impl FallbackStore {
    /// `primary = None` (no URL configured, or the connect probe failed)
    /// starts the store in degraded mode.
    pub fn new(primary: Option<Arc<dyn StateStore>>, local: FileStore) -> Self {
        let degraded = primary.is_none();
        if degraded {
            info!("No primary store available, using the local file store");
        }
        Self {
            primary,
            local,
            degraded: AtomicBool::new(degraded),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    fn active_primary(&self) -> Option<&Arc<dyn StateStore>> {
        if self.is_degraded() {
            None
        } else {
            self.primary.as_ref()
        }
    }

    /// Flips to the local store after any primary failure. Irreversible
    /// within the process lifetime.
    fn degrade(&self, op: &str, e: &PortError) {
        warn!("Primary store failed during {}: {} - degrading to local file", op, e);
        self.degraded.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl StateStore for FallbackStore {
    async fn save_app_data(&self, data: &AppData) -> PortResult<()> {
        if let Some(primary) = self.active_primary() {
            match primary.save_app_data(data).await {
                Ok(()) => return Ok(()),
                Err(e) => self.degrade("save", &e),
            }
        }
        self.local.save_app_data(data).await
    }

    async fn load_app_data(&self) -> PortResult<Option<AppData>> {
        if let Some(primary) = self.active_primary() {
            match primary.load_app_data().await {
                Ok(doc) => return Ok(doc),
                Err(e) => self.degrade("load", &e),
            }
        }
        self.local.load_app_data().await
    }

    async fn create_backup(&self, data: &AppData) -> PortResult<String> {
        if let Some(primary) = self.active_primary() {
            match primary.create_backup(data).await {
                Ok(id) => return Ok(id),
                Err(e) => self.degrade("backup", &e),
            }
        }
        self.local.create_backup(data).await
    }

    async fn get_backups(&self) -> PortResult<Vec<BackupInfo>> {
        if let Some(primary) = self.active_primary() {
            match primary.get_backups().await {
                Ok(backups) => return Ok(backups),
                Err(e) => self.degrade("backup listing", &e),
            }
        }
        self.local.get_backups().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A primary that fails every call, as an unreachable remote would.
    struct BrokenPrimary;

    #[async_trait]
    impl StateStore for BrokenPrimary {
        async fn save_app_data(&self, _data: &AppData) -> PortResult<()> {
            Err(PortError::Unavailable("connection refused".into()))
        }
        async fn load_app_data(&self) -> PortResult<Option<AppData>> {
            Err(PortError::Unavailable("connection refused".into()))
        }
        async fn create_backup(&self, _data: &AppData) -> PortResult<String> {
            Err(PortError::Unavailable("connection refused".into()))
        }
        async fn get_backups(&self) -> PortResult<Vec<BackupInfo>> {
            Err(PortError::Unavailable("connection refused".into()))
        }
    }

    fn local_in(dir: &std::path::Path) -> FileStore {
        FileStore::new(dir.join("data.json"), dir.join("backups"))
    }

    #[tokio::test]
    async fn missing_primary_starts_degraded_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FallbackStore::new(None, local_in(dir.path()));
        assert!(store.is_degraded());

        let mut doc = AppData::default();
        doc.site_title = "Colocation".to_string();
        store.save_app_data(&doc).await.unwrap();
        let loaded = store.load_app_data().await.unwrap().unwrap();
        assert_eq!(loaded, doc);
    }

    #[tokio::test]
    async fn primary_failure_degrades_permanently() {
        let dir = tempfile::tempdir().unwrap();
        let store = FallbackStore::new(Some(Arc::new(BrokenPrimary)), local_in(dir.path()));
        assert!(!store.is_degraded());

        let doc = AppData::default();
        // First save fails over to the file and flips the flag.
        store.save_app_data(&doc).await.unwrap();
        assert!(store.is_degraded());

        // Subsequent calls stay on the local path and succeed.
        let loaded = store.load_app_data().await.unwrap().unwrap();
        assert_eq!(loaded, doc);
        let id = store.create_backup(&doc).await.unwrap();
        assert!(store
            .get_backups()
            .await
            .unwrap()
            .iter()
            .any(|b| b.id == id));
    }
}

//! services/api/src/adapters/file.rs
//!
//! Local-file implementation of the `StateStore` port. The whole document
//! is one pretty-printed JSON file at a fixed path; backups are timestamped
//! siblings in a backup directory, capped at the 10 most recent.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use foyer_core::domain::AppData;
use foyer_core::ports::{BackupInfo, PortError, PortResult, StateStore, BACKUP_RETENTION};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Filename timestamps avoid `:` so they stay valid on every filesystem.
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";

#[derive(Clone)]
pub struct FileStore {
    data_file: PathBuf,
    backup_dir: PathBuf,
}

impl FileStore {
    pub fn new(data_file: PathBuf, backup_dir: PathBuf) -> Self {
        Self {
            data_file,
            backup_dir,
        }
    }

    fn backup_path(&self, id: &str) -> PathBuf {
        self.backup_dir.join(format!("{}.json", id))
    }

    /// Lists retained backups, newest first. The timestamp is encoded in the
    /// filename, so lexicographic order is chronological order.
    async fn list_backups(&self) -> PortResult<Vec<BackupInfo>> {
        let mut entries = match tokio::fs::read_dir(&self.backup_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PortError::Unexpected(e.to_string())),
        };

        let mut backups = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(stem) = name
                .strip_suffix(".json")
                .filter(|s| s.starts_with("backup_"))
            else {
                continue;
            };
            let Some(timestamp) = parse_backup_timestamp(stem) else {
                continue;
            };
            backups.push(BackupInfo {
                id: stem.to_string(),
                timestamp,
            });
        }

        backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(backups)
    }

    /// Deletes every backup beyond the retention cap.
    async fn prune_backups(&self) -> PortResult<()> {
        let backups = self.list_backups().await?;
        for stale in backups.iter().skip(BACKUP_RETENTION) {
            if let Err(e) = tokio::fs::remove_file(self.backup_path(&stale.id)).await {
                warn!("Failed to delete stale backup {}: {}", stale.id, e);
            }
        }
        Ok(())
    }
}

fn parse_backup_timestamp(stem: &str) -> Option<DateTime<Utc>> {
    let raw = stem.strip_prefix("backup_")?;
    NaiveDateTime::parse_from_str(raw, BACKUP_TIMESTAMP_FORMAT)
        .ok()
        .map(|dt| dt.and_utc())
}

async fn write_json(path: &Path, data: &AppData) -> PortResult<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))
}

#[async_trait]
impl StateStore for FileStore {
    async fn save_app_data(&self, data: &AppData) -> PortResult<()> {
        write_json(&self.data_file, data).await?;
        info!("Document saved to local file");
        Ok(())
    }

    async fn load_app_data(&self) -> PortResult<Option<AppData>> {
        let raw = match tokio::fs::read_to_string(&self.data_file).await {
            Ok(raw) => raw,
            // Absent file is not an error: the caller materializes defaults.
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Local data file not found");
                return Ok(None);
            }
            Err(e) => return Err(PortError::Unexpected(e.to_string())),
        };
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| PortError::Unexpected(e.to_string()))?;
        super::decode_document(value).map(Some)
    }

    async fn create_backup(&self, data: &AppData) -> PortResult<String> {
        tokio::fs::create_dir_all(&self.backup_dir)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let id = format!(
            "backup_{}",
            Utc::now().format(BACKUP_TIMESTAMP_FORMAT)
        );
        write_json(&self.backup_path(&id), data).await?;
        info!("Local backup created: {}", id);

        self.prune_backups().await?;
        Ok(id)
    }

    async fn get_backups(&self) -> PortResult<Vec<BackupInfo>> {
        self.list_backups().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foyer_core::domain::User;

    fn store_in(dir: &Path) -> FileStore {
        FileStore::new(dir.join("data.json"), dir.join("backups"))
    }

    fn sample_doc() -> AppData {
        let mut doc = AppData::default();
        doc.current_week = "2026-08-24".to_string();
        doc.users.push(User {
            id: "1".into(),
            name: "Ahmed".into(),
            created_at: Utc::now(),
        });
        doc
    }

    #[tokio::test]
    async fn load_of_absent_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(store.load_app_data().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let doc = sample_doc();

        store.save_app_data(&doc).await.unwrap();
        let loaded = store.load_app_data().await.unwrap().unwrap();
        assert_eq!(loaded, doc);
    }

    #[tokio::test]
    async fn retention_keeps_only_the_newest_ten() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let doc = sample_doc();

        let mut ids = Vec::new();
        for _ in 0..13 {
            ids.push(store.create_backup(&doc).await.unwrap());
            // Millisecond-resolution names must not collide.
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let backups = store.get_backups().await.unwrap();
        assert_eq!(backups.len(), BACKUP_RETENTION);
        // The survivors are exactly the 10 most recent, newest first.
        let expected: Vec<&String> = ids.iter().rev().take(BACKUP_RETENTION).collect();
        let actual: Vec<&String> = backups.iter().map(|b| &b.id).collect();
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn legacy_documents_are_upgraded_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let legacy = serde_json::json!({
            "adminPassword": "admin123",
            "weeklyAmount": 100.0,
            "siteTitle": "Gestion Cotisation",
            "users": ["Ahmed"],
        });
        tokio::fs::write(
            dir.path().join("data.json"),
            serde_json::to_string(&legacy).unwrap(),
        )
        .await
        .unwrap();

        let loaded = store.load_app_data().await.unwrap().unwrap();
        assert_eq!(loaded.users[0].name, "Ahmed");
    }
}

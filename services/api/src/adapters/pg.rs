//! services/api/src/adapters/pg.rs
//!
//! Primary remote store on Postgres. The whole document lives as one JSONB
//! row under the fixed id `"main"`; backups are timestamped JSONB rows in a
//! separate table with the same keep-10 retention as the file store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use foyer_core::domain::AppData;
use foyer_core::ports::{BackupInfo, PortError, PortResult, StateStore, BACKUP_RETENTION};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::info;

/// Fixed singleton key of the shared document.
const DOC_ID: &str = "main";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects to the primary store with a bounded probe. A timeout or a
    /// refused connection comes back as `PortError::Unavailable` so the
    /// caller can degrade to the file store.
    pub async fn connect(url: &str, timeout: Duration) -> PortResult<Self> {
        let connect = PgPoolOptions::new().max_connections(5).connect(url);
        let pool = tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| PortError::Unavailable("connect probe timed out".to_string()))?
            .map_err(|e| PortError::Unavailable(e.to_string()))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        info!("Connected to the primary store");
        Ok(store)
    }

    async fn ensure_schema(&self) -> PortResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS app_data (
                 id TEXT PRIMARY KEY,
                 data JSONB NOT NULL,
                 updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
             )",
        )
        .execute(&self.pool)
        .await
        .map_err(to_port_error)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS backups (
                 id TEXT PRIMARY KEY,
                 data JSONB NOT NULL,
                 created_at TIMESTAMPTZ NOT NULL DEFAULT now()
             )",
        )
        .execute(&self.pool)
        .await
        .map_err(to_port_error)?;

        Ok(())
    }
}

fn to_port_error(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::Io(io) => PortError::Unavailable(io.to_string()),
        sqlx::Error::PoolTimedOut => {
            PortError::Unavailable("connection pool timed out".to_string())
        }
        other => PortError::Unexpected(other.to_string()),
    }
}

#[async_trait]
impl StateStore for PgStore {
    async fn save_app_data(&self, data: &AppData) -> PortResult<()> {
        let value =
            serde_json::to_value(data).map_err(|e| PortError::Unexpected(e.to_string()))?;
        sqlx::query(
            "INSERT INTO app_data (id, data, updated_at) VALUES ($1, $2, now())
             ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data, updated_at = now()",
        )
        .bind(DOC_ID)
        .bind(&value)
        .execute(&self.pool)
        .await
        .map_err(to_port_error)?;

        info!("Document saved to the primary store");
        Ok(())
    }

    async fn load_app_data(&self) -> PortResult<Option<AppData>> {
        let row = sqlx::query("SELECT data FROM app_data WHERE id = $1")
            .bind(DOC_ID)
            .fetch_optional(&self.pool)
            .await
            .map_err(to_port_error)?;

        match row {
            Some(row) => {
                let value: serde_json::Value = row.try_get("data").map_err(to_port_error)?;
                super::decode_document(value).map(Some)
            }
            None => {
                info!("No document found in the primary store");
                Ok(None)
            }
        }
    }

    async fn create_backup(&self, data: &AppData) -> PortResult<String> {
        let value =
            serde_json::to_value(data).map_err(|e| PortError::Unexpected(e.to_string()))?;
        let id = format!("backup_{}", Utc::now().timestamp_millis());

        sqlx::query("INSERT INTO backups (id, data, created_at) VALUES ($1, $2, now())")
            .bind(&id)
            .bind(&value)
            .execute(&self.pool)
            .await
            .map_err(to_port_error)?;
        info!("Backup created in the primary store: {}", id);

        // Keep only the newest entries.
        sqlx::query(
            "DELETE FROM backups WHERE id NOT IN
                 (SELECT id FROM backups ORDER BY created_at DESC LIMIT $1)",
        )
        .bind(BACKUP_RETENTION as i64)
        .execute(&self.pool)
        .await
        .map_err(to_port_error)?;

        Ok(id)
    }

    async fn get_backups(&self) -> PortResult<Vec<BackupInfo>> {
        let rows = sqlx::query(
            "SELECT id, created_at FROM backups ORDER BY created_at DESC LIMIT $1",
        )
        .bind(BACKUP_RETENTION as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(to_port_error)?;

        rows.into_iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(to_port_error)?;
                let timestamp: DateTime<Utc> =
                    row.try_get("created_at").map_err(to_port_error)?;
                Ok(BackupInfo { id, timestamp })
            })
            .collect()
    }
}

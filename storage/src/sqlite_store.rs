//! Offset persisted as a single row in SQLite.

use async_trait::async_trait;
use chrono::Utc;
use rbot_core::Offset;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::offset_store::OffsetStore;
use crate::sqlite_pool::SqlitePoolManager;

#[derive(Clone)]
pub struct SqliteOffsetStore {
    pool_manager: SqlitePoolManager,
}

impl SqliteOffsetStore {
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        let pool_manager = SqlitePoolManager::new(database_url).await?;
        let store = Self { pool_manager };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<(), StorageError> {
        info!("Creating offset table if not exists");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS poll_offset (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                offset_id TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(self.pool_manager.pool())
        .await?;
        Ok(())
    }
}

#[async_trait]
impl OffsetStore for SqliteOffsetStore {
    async fn load(&self) -> Result<Option<Offset>, StorageError> {
        let row: Option<String> =
            sqlx::query_scalar("SELECT offset_id FROM poll_offset WHERE id = 1")
                .fetch_optional(self.pool_manager.pool())
                .await?;
        Ok(row.map(Offset::from))
    }

    async fn commit(&self, offset: &Offset) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO poll_offset (id, offset_id, updated_at)
            VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                offset_id = excluded.offset_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(offset.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool_manager.pool())
        .await?;

        debug!(offset = %offset, "Committed offset to SQLite");
        Ok(())
    }
}

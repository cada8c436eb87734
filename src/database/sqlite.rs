/// SQLite implementation of the preference snapshot store

use crate::{
    error::{Error, Result},
    settings::{PreferenceKey, PreferencePatch, PreferenceState, PreferenceValue, SnapshotStore},
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::warn;

/// Snapshot store backed by the `preferences` table
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn decode_row(key: &str, value: &str) -> Result<(PreferenceKey, PreferenceValue)> {
        let key: PreferenceKey = key.parse()?;
        let value = PreferenceValue::decode(key, serde_json::from_str(value)?)?;
        Ok((key, value))
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn load(&self) -> Result<Option<PreferencePatch>> {
        let rows = sqlx::query("SELECT key, value FROM preferences")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to load preferences: {}", e)))?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut patch = PreferencePatch::new();
        for row in rows {
            let key: String = row.get(0);
            let value: String = row.get(1);
            match Self::decode_row(&key, &value) {
                Ok((key, value)) => patch.insert(key, value),
                Err(e) => warn!("Skipping stored preference {}: {}", key, e),
            }
        }

        Ok(Some(patch))
    }

    async fn save(&self, state: &PreferenceState) -> Result<()> {
        let mut tx = self.pool.begin().await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;
        let now = Utc::now();

        for (key, value) in PreferencePatch::full(state).iter() {
            sqlx::query(
                "INSERT OR REPLACE INTO preferences (key, value, updated_at) VALUES (?, ?, ?)"
            )
            .bind(key.as_str())
            .bind(serde_json::to_string(value)?)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(format!("Failed to save preference {}: {}", key, e)))?;
        }

        tx.commit().await
            .map_err(|e| Error::Database(format!("Failed to commit preferences: {}", e)))
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM preferences")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to clear preferences: {}", e)))?;

        Ok(())
    }
}

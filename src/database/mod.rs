/// SQLite database backend for the local preference snapshot

pub mod schema;
pub mod sqlite;
pub mod migrations;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::{SqliteConnectOptions, SqlitePoolOptions}, Pool, Sqlite};
use std::time::Duration;

pub use sqlite::SqliteSnapshotStore;

/// Database connection pool type
pub type DatabasePool = Pool<Sqlite>;

const IN_MEMORY_URL: &str = "sqlite::memory:";

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file path
    pub database_url: String,
    /// Maximum number of connections in pool
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connection_timeout: u64,
    /// Enable WAL mode
    pub enable_wal: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:feedsync.db".to_string(),
            max_connections: 4,
            connection_timeout: 30,
            enable_wal: true,
        }
    }
}

impl DatabaseConfig {
    /// Private in-memory database, gone when the pool closes
    pub fn in_memory() -> Self {
        Self {
            database_url: IN_MEMORY_URL.to_string(),
            enable_wal: false,
            ..Self::default()
        }
    }
}

/// Main database manager
pub struct Database {
    pool: DatabasePool,
    config: DatabaseConfig,
}

impl Database {
    /// Create new database instance
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.connection_timeout);

        let pool = if config.database_url == IN_MEMORY_URL {
            // Every connection to :memory: is its own database
            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(timeout)
                .connect(&config.database_url)
                .await
                .map_err(|e| Error::Database(format!("Failed to connect to database: {}", e)))?
        } else {
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(timeout)
                .connect_with(
                    SqliteConnectOptions::new()
                        .filename(config.database_url.trim_start_matches("sqlite:"))
                        .create_if_missing(true)
                        .pragma("journal_mode", if config.enable_wal { "WAL" } else { "DELETE" })
                        .pragma("synchronous", "NORMAL"),
                )
                .await
                .map_err(|e| Error::Database(format!("Failed to connect to database: {}", e)))?
        };

        let database = Self { pool, config };
        database.migrate().await?;

        Ok(database)
    }

    async fn migrate(&self) -> Result<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Get database pool
    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Close database connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

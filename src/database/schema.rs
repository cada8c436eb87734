/// Database schema definitions for the local preference snapshot

/// Database schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL statements for creating tables
pub const CREATE_TABLES: &[&str] = &[
    // Flat key-value mirror of the preference state
    r#"
    CREATE TABLE IF NOT EXISTS preferences (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )
    "#,

    // Schema version tracking
    r#"
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY,
        applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )
    "#,
];

/// Get the names of all user tables in the database
pub async fn table_names(pool: &sqlx::SqlitePool) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'"
    )
    .fetch_all(pool)
    .await
}

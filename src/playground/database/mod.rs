//! SQLite file behind the reference media store.
//!
//! Writes are short (one row, or a ticket plus a row in one transaction), so
//! the pool stays small and writers wait on SQLite's busy handler rather than
//! failing. WAL lets catalog queries run while a deletion commits.

use std::{path::PathBuf, sync::LazyLock, time::Duration};

use sqlx::{
    SqlitePool,
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
};
use thiserror::Error;

pub static MIGRATOR: LazyLock<Migrator> = LazyLock::new(|| sqlx::migrate!("./db_migrations"));

/// One writer plus concurrent catalog reads.
const MAX_CONNECTIONS: u32 = 3;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
/// Covers a ticket transaction committing on another connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),
    #[error("Invalid timestamp: {timestamp} cannot be converted to DateTime")]
    InvalidTimestamp { timestamp: i64 },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Clone, Debug)]
pub struct Database {
    pub pool: SqlitePool,
    pub path: PathBuf,
}

impl Database {
    /// Opens the store file at `db_path`, creating it and its parent
    /// directories on first use, and brings the schema up to date.
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            // Media files are written before their rows, so a lost commit
            // only leaves an orphan file behind
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;
        tracing::debug!(
            target: "storage_playground::database",
            "Media store database ready at {}",
            db_path.display()
        );

        Ok(Self {
            pool,
            path: db_path,
        })
    }

    /// Runs pending migrations. Safe to call repeatedly.
    pub async fn migrate_up(&self) -> Result<(), DatabaseError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }
}

/// Stored timestamps are Unix milliseconds.
pub(crate) fn parse_timestamp(millis: i64) -> Result<chrono::DateTime<chrono::Utc>, DatabaseError> {
    chrono::DateTime::from_timestamp_millis(millis)
        .ok_or(DatabaseError::InvalidTimestamp { timestamp: millis })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.sqlite");
        let db = Database::new(db_path)
            .await
            .expect("Failed to create test database");
        (db, temp_dir)
    }

    #[tokio::test]
    async fn test_database_creation_with_nested_path() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("media.sqlite");

        let db = Database::new(db_path.clone()).await.unwrap();
        assert_eq!(db.path, db_path);
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_migrations_create_tables() {
        let (db, _temp_dir) = create_test_db().await;

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .fetch_all(&db.pool)
                .await
                .unwrap();
        let names: Vec<String> = tables.into_iter().map(|t| t.0).collect();

        assert!(names.contains(&"media_images".to_string()));
        assert!(names.contains(&"consent_tickets".to_string()));

        // Re-running is a no-op
        db.migrate_up().await.unwrap();
    }

    #[tokio::test]
    async fn test_database_pragma_settings() {
        let (db, _temp_dir) = create_test_db().await;

        let journal_mode: (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(journal_mode.0.to_lowercase(), "wal");

        // NORMAL
        let synchronous: (i64,) = sqlx::query_as("PRAGMA synchronous")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(synchronous.0, 1);

        let busy_timeout: (i64,) = sqlx::query_as("PRAGMA busy_timeout")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(busy_timeout.0, BUSY_TIMEOUT.as_millis() as i64);
    }

    #[tokio::test]
    async fn test_reopen_keeps_rows() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("media.sqlite");

        let db = Database::new(db_path.clone()).await.unwrap();
        sqlx::query(
            "INSERT INTO media_images (display_name, mime_type, owner_package, file_path, content_hash, size_bytes, date_added)
             VALUES ('a.png', 'image/png', 'com.example', '/tmp/a.png', 'abc', 3, 0)",
        )
        .execute(&db.pool)
        .await
        .unwrap();
        drop(db);

        let db = Database::new(db_path).await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media_images")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_parse_timestamp() {
        let parsed = parse_timestamp(1_700_000_000_000).unwrap();
        assert_eq!(parsed.timestamp_millis(), 1_700_000_000_000);
        assert!(matches!(
            parse_timestamp(i64::MAX),
            Err(DatabaseError::InvalidTimestamp { .. })
        ));
    }
}

//! services/client/src/adapters/sqlite.rs
//!
//! Origin storage backed by a SQLite file, so that several client processes
//! (one per "tab") can share values. It implements the `KeyValueStorage` port.
//!
//! SQLite has no change feed, so `watch` polls a global revision counter: every
//! write stamps its row with the next revision and the writer's id, and each
//! listener reports the rows written by someone else since its last poll.

use async_stream::stream;
use async_trait::async_trait;
use dermassist_core::ports::{KeyValueStorage, PortError, PortResult, StorageEvent, StorageEvents};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A storage handle with its own writer identity on a shared SQLite pool.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
    writer: String,
    poll_interval: Duration,
}

fn storage_error(e: sqlx::Error) -> PortError {
    PortError::Storage(e.to_string())
}

impl SqliteStorage {
    /// Opens (and creates if needed) the storage file at `path`, then applies
    /// the schema migrations.
    pub async fn open(path: impl AsRef<Path>, poll_interval: Duration) -> Result<Self, crate::error::AppError> {
        let path = path.as_ref();

        // Ensure the parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!("Opening origin storage at {}", path.display());
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let storage = Self::with_pool(pool, poll_interval);
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Wraps an existing pool. Every call yields a handle with a fresh writer
    /// identity, as a new tab would have. The poll interval is at least 1 ms.
    pub fn with_pool(pool: SqlitePool, poll_interval: Duration) -> Self {
        Self {
            pool,
            writer: Uuid::new_v4().to_string(),
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn current_revision(&self) -> PortResult<i64> {
        let row = sqlx::query("SELECT COALESCE(MAX(revision), 0) AS revision FROM storage_entries")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;
        row.try_get("revision").map_err(storage_error)
    }
}

//=========================================================================================
// `KeyValueStorage` Trait Implementation
//=========================================================================================

#[async_trait]
impl KeyValueStorage for SqliteStorage {
    async fn get_item(&self, key: &str) -> PortResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM storage_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        match row {
            Some(row) => row.try_get::<Option<String>, _>("value").map_err(storage_error),
            None => Ok(None),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> PortResult<()> {
        sqlx::query(
            r#"
            INSERT INTO storage_entries (key, value, revision, writer)
            VALUES (?, ?, (SELECT COALESCE(MAX(revision), 0) + 1 FROM storage_entries), ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                revision = excluded.revision,
                writer = excluded.writer
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(&self.writer)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        debug!("Stored '{}' ({} bytes)", key, value.len());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> PortResult<()> {
        sqlx::query(
            r#"
            UPDATE storage_entries
            SET value = NULL,
                revision = (SELECT COALESCE(MAX(revision), 0) + 1 FROM storage_entries),
                writer = ?
            WHERE key = ? AND value IS NOT NULL
            "#,
        )
        .bind(&self.writer)
        .bind(key)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    async fn watch(&self) -> PortResult<StorageEvents> {
        let mut cursor = self.current_revision().await?;
        let pool = self.pool.clone();
        let me = self.writer.clone();
        let period = self.poll_interval;

        Ok(Box::pin(stream! {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let rows = sqlx::query(
                    r#"
                    SELECT key, value, revision, writer
                    FROM storage_entries
                    WHERE revision > ?
                    ORDER BY revision ASC
                    "#,
                )
                .bind(cursor)
                .fetch_all(&pool)
                .await;

                let rows = match rows {
                    Ok(rows) => rows,
                    Err(sqlx::Error::PoolClosed) => break,
                    Err(e) => {
                        warn!("Storage poll failed: {}", e);
                        continue;
                    }
                };

                for row in rows {
                    let decoded = (
                        row.try_get::<String, _>("key"),
                        row.try_get::<Option<String>, _>("value"),
                        row.try_get::<i64, _>("revision"),
                        row.try_get::<String, _>("writer"),
                    );
                    let (key, value, revision, writer) = match decoded {
                        (Ok(key), Ok(value), Ok(revision), Ok(writer)) => (key, value, revision, writer),
                        _ => {
                            warn!("Skipping undecodable storage row");
                            continue;
                        }
                    };

                    cursor = cursor.max(revision);
                    if writer != me {
                        yield StorageEvent { key: Some(key), new_value: value };
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::time::timeout;

    async fn shared_pool() -> SqlitePool {
        // A single connection keeps the in-memory database alive and shared.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteStorage::with_pool(pool.clone(), Duration::from_millis(10))
            .run_migrations()
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn set_get_remove() {
        let storage = SqliteStorage::with_pool(shared_pool().await, Duration::from_millis(10));

        assert_eq!(storage.get_item("session_id").await.unwrap(), None);
        storage.set_item("session_id", "first").await.unwrap();
        storage.set_item("session_id", "second").await.unwrap();
        assert_eq!(
            storage.get_item("session_id").await.unwrap().as_deref(),
            Some("second")
        );

        storage.remove_item("session_id").await.unwrap();
        assert_eq!(storage.get_item("session_id").await.unwrap(), None);
    }

    #[tokio::test]
    async fn other_writers_are_reported() {
        let pool = shared_pool().await;
        let patient = SqliteStorage::with_pool(pool.clone(), Duration::from_millis(10));
        let doctor = SqliteStorage::with_pool(pool, Duration::from_millis(10));

        let mut patient_events = patient.watch().await.unwrap();
        let mut doctor_events = doctor.watch().await.unwrap();

        doctor.set_item("sharedChat", "[]").await.unwrap();

        let event = timeout(Duration::from_secs(2), patient_events.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.key.as_deref(), Some("sharedChat"));
        assert_eq!(event.new_value.as_deref(), Some("[]"));
        assert!(timeout(Duration::from_millis(100), doctor_events.next())
            .await
            .is_err());

        doctor.remove_item("sharedChat").await.unwrap();
        let event = timeout(Duration::from_secs(2), patient_events.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.new_value, None);
    }

    #[tokio::test]
    async fn zero_poll_interval_still_watches() {
        let pool = shared_pool().await;
        let patient = SqliteStorage::with_pool(pool.clone(), Duration::ZERO);
        let doctor = SqliteStorage::with_pool(pool, Duration::ZERO);

        let mut events = patient.watch().await.unwrap();
        doctor.set_item("physicianConnected", "true").await.unwrap();
        let event = timeout(Duration::from_secs(2), events.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.key.as_deref(), Some("physicianConnected"));
    }

    #[tokio::test]
    async fn changes_before_watch_are_not_replayed() {
        let pool = shared_pool().await;
        let patient = SqliteStorage::with_pool(pool.clone(), Duration::from_millis(10));
        let doctor = SqliteStorage::with_pool(pool, Duration::from_millis(10));

        doctor.set_item("doctorData", "{}").await.unwrap();
        let mut events = patient.watch().await.unwrap();
        assert!(timeout(Duration::from_millis(100), events.next()).await.is_err());
    }
}

use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, info};

use crate::repository::Storage;

mod answer_log_repo;
mod credential_repo;
mod mapping;
mod migrate;
mod progress_repo;
mod user_repo;

const POOL_SIZE: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// One sqlx pool serving every repository trait.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Private in-memory databases exist per connection, so those URLs get a
/// single connection that is never recycled.
fn is_private_memory(url: &str) -> bool {
    url.contains(":memory:") && !url.contains("cache=shared")
}

impl SqliteRepository {
    /// Connect with foreign keys enforced (user deletes cascade to progress,
    /// answers and tokens), WAL journaling and a busy timeout.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the URL is malformed or the database
    /// cannot be opened.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool_options = if is_private_memory(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(POOL_SIZE)
        };

        let pool = pool_options
            .acquire_timeout(BUSY_TIMEOUT)
            .connect_with(options)
            .await?;
        debug!(url = database_url, "sqlite pool ready");
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply pending schema versions.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migration queries fail.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }

    /// Wait for in-flight queries and close every connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl Storage {
    /// Build a `Storage` backed by `SQLite`, migrated to the latest schema.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or migrations cannot be
    /// completed.
    pub async fn sqlite(database_url: &str) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect(database_url).await?;
        repo.migrate().await?;
        info!("sqlite storage migrated");
        Ok(Self::from_repository(repo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_urls_pin_one_connection() {
        assert!(is_private_memory("sqlite::memory:"));
        assert!(!is_private_memory("sqlite:file:x?mode=memory&cache=shared"));
        assert!(!is_private_memory("sqlite:///var/lib/scilearn.db"));
    }

    #[tokio::test]
    async fn private_memory_database_keeps_its_schema() {
        let storage = Storage::sqlite("sqlite::memory:").await.unwrap();
        assert!(storage.users.list_users().await.unwrap().is_empty());
        assert_eq!(storage.users.count_admins().await.unwrap(), 0);
    }
}

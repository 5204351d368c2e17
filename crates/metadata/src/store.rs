//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{FILE_COLUMNS, FileRow, size_to_db};
use crate::repos::FileRepo;
use async_trait::async_trait;
use depot_core::{ContentAddress, FileRecord, NewFile};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: FileRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}

/// Build the error for a second file referencing the same content.
pub(crate) fn address_conflict(address: &ContentAddress) -> MetadataError {
    MetadataError::Conflict(format!("content {address} is already indexed"))
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store and apply the schema.
    ///
    /// `":memory:"` opens a private in-memory database.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let in_memory = path.as_os_str() == ":memory:";

        let opts = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        };
        // Concurrent writers wait instead of failing with "database is locked".
        let opts = opts.busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // One connection serializes writers; for ":memory:" it is also the
            // only connection that can see the data.
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        if let Some(secs) = query_timeout_secs {
            tracing::warn!(
                query_timeout_secs = secs,
                "SQLite query timeout is advisory only; use PostgreSQL where statements must be bounded"
            );
        }

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

/// Map an INSERT failure, turning unique violations on the address into `Conflict`.
fn sqlite_insert_error(e: sqlx::Error, address: &ContentAddress) -> MetadataError {
    // SQLite error: "UNIQUE constraint failed: files.content_address"
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.message().contains("UNIQUE constraint")
        && db_err.message().contains("content_address")
    {
        return address_conflict(address);
    }
    e.into()
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[async_trait]
impl FileRepo for SqliteStore {
    async fn exists_by_address(&self, address: &ContentAddress) -> MetadataResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM files WHERE content_address = ?)")
                .bind(address.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    #[instrument(skip(self, file), fields(backend = "sqlite", address = %file.content_address))]
    async fn insert_file(&self, file: &NewFile) -> MetadataResult<FileRecord> {
        let size_bytes = size_to_db(file.size)?;
        let mut tx = self.pool.begin().await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM files WHERE content_address = ?)")
                .bind(file.content_address.as_str())
                .fetch_one(&mut *tx)
                .await?;
        if exists {
            return Err(address_conflict(&file.content_address));
        }

        let row: FileRow = sqlx::query_as(&format!(
            "INSERT INTO files (external_id, name, size_bytes, content_address, created_at) \
             VALUES (?, ?, ?, ?, ?) RETURNING {FILE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&file.name)
        .bind(size_bytes)
        .bind(file.content_address.as_str())
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| sqlite_insert_error(e, &file.content_address))?;

        tx.commit().await?;
        FileRecord::try_from(row)
    }

    async fn find_by_external_id(&self, external_id: Uuid) -> MetadataResult<FileRecord> {
        let row: Option<FileRow> = sqlx::query_as(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE external_id = ?"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| MetadataError::NotFound(format!("file {external_id}")))?
            .try_into()
    }

    async fn count_files(&self) -> MetadataResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

/// SQLite schema.
const SCHEMA_SQL: &str = r#"
-- Indexed files; each content address belongs to at most one file
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id BLOB NOT NULL UNIQUE,
    name TEXT NOT NULL,
    size_bytes INTEGER NOT NULL CHECK (size_bytes >= 0),
    content_address TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_files_created_at ON files(created_at);
"#;

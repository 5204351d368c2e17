//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{FILE_COLUMNS, FileRow, size_to_db};
use crate::repos::FileRepo;
use crate::store::{MetadataStore, address_conflict};
use async_trait::async_trait;
use depot_core::config::PgSslMode;
use depot_core::{ContentAddress, FileRecord, NewFile};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// Map an INSERT failure, turning unique violations on the address into `Conflict`.
fn postgres_insert_error(e: sqlx::Error, address: &ContentAddress) -> MetadataError {
    // PostgreSQL error code 23505 = unique_violation
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.code().as_deref() == Some("23505")
        && db_err
            .constraint()
            .is_none_or(|name| name.contains("content_address"))
    {
        return address_conflict(address);
    }
    e.into()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters.
    ///
    /// Lets the password come from its own environment variable instead of
    /// being embedded in a URL.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        if let Some(mode) = ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        // Log connection info without password
        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{}ms", timeout_ms))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // Prepared statements cannot hold more than one command.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait]
impl FileRepo for PostgresStore {
    async fn exists_by_address(&self, address: &ContentAddress) -> MetadataResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM files WHERE content_address = $1)")
                .bind(address.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    #[instrument(skip(self, file), fields(backend = "postgres", address = %file.content_address))]
    async fn insert_file(&self, file: &NewFile) -> MetadataResult<FileRecord> {
        let size_bytes = size_to_db(file.size)?;
        let mut tx = self.pool.begin().await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM files WHERE content_address = $1)")
                .bind(file.content_address.as_str())
                .fetch_one(&mut *tx)
                .await?;
        if exists {
            return Err(address_conflict(&file.content_address));
        }

        // Two transactions can both pass the check above; the unique
        // constraint decides which insert wins.
        let row: FileRow = sqlx::query_as(&format!(
            "INSERT INTO files (external_id, name, size_bytes, content_address, created_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {FILE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&file.name)
        .bind(size_bytes)
        .bind(file.content_address.as_str())
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| postgres_insert_error(e, &file.content_address))?;

        tx.commit().await?;
        FileRecord::try_from(row)
    }

    async fn find_by_external_id(&self, external_id: Uuid) -> MetadataResult<FileRecord> {
        let row: Option<FileRow> = sqlx::query_as(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE external_id = $1"
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

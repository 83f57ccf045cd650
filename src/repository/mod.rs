//! Repository layer for database persistence.
//!
//! SQLite is the default backend (rusqlite, one connection per operation on
//! the blocking pool). PostgreSQL is available behind the `postgres` feature.
//! Components receive a [`RegistryLookup`] or [`ImportQueue`] explicitly;
//! [`DbContext`] builds them from a database URL.

pub mod context;
#[cfg(feature = "postgres")]
pub mod pg_tls;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod queue;
pub mod registry;
pub mod schema;
pub mod util;

pub use context::DbContext;
pub use queue::{ClaimedBatch, ImportQueue, QueueCounts, SqliteImportQueue};
pub use registry::{RegistryLookup, SqliteRegistry, FREE_TEXT_LIMIT};

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use thiserror::Error;

/// Errors raised by the storage layer. Every one of them is fatal to a batch.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {}", util::describe_pg_error(.0))]
    Postgres(#[from] tokio_postgres::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("claim on import row {row_id} was lost before its result was written")]
    ClaimLost { row_id: String },

    #[error("invalid database URL: {0}")]
    InvalidUrl(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Resolve a SQLite URL (`sqlite:path`, `sqlite://path` or a bare path) to a file path.
pub fn sqlite_path(url: &str) -> PathBuf {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    PathBuf::from(path)
}

/// Open a SQLite connection with concurrency settings suited to several workers.
pub fn connect(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 30000;
    "#,
    )?;
    register_fold(&conn)?;
    Ok(conn)
}

/// Name of the Unicode case-fold SQL function installed on every connection.
/// SQLite's own `LIKE` and `upper()` only fold ASCII letters.
pub(crate) const FOLD_FN: &str = "rx_fold";

fn register_fold(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        FOLD_FN,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|s| s.to_uppercase()))
        },
    )
}

/// Run a blocking SQLite operation on its own connection.
pub(crate) async fn with_sqlite<T, F>(db_path: &Path, op: F) -> Result<T>
where
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db_path = db_path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let conn = connect(&db_path)?;
        op(&conn)
    })
    .await?
}

/// Create the SQLite tables if they do not exist.
pub fn init_sqlite_schema(db_path: &Path) -> Result<()> {
    let conn = connect(db_path)?;
    conn.execute_batch(schema::SQLITE_SCHEMA)?;
    Ok(())
}

/// Format a timestamp the way the SQLite schema stores it.
///
/// Fixed width, so text comparison orders like time.
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

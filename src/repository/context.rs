//! Backend selection from a database URL.

use std::path::{Path, PathBuf};
#[cfg(feature = "postgres")]
use std::sync::Arc;

use tracing::info;

use super::util::{is_postgres_url, redact_url_password};
use super::{
    init_sqlite_schema, sqlite_path, ImportQueue, RegistryLookup, RepositoryError, Result,
    SqliteImportQueue, SqliteRegistry,
};

/// A connected storage backend that hands out the pipeline's store seams.
#[derive(Clone)]
pub enum DbContext {
    Sqlite {
        path: PathBuf,
    },
    #[cfg(feature = "postgres")]
    Postgres {
        client: Arc<tokio_postgres::Client>,
    },
}

impl DbContext {
    /// Connect to the backend named by `url`.
    ///
    /// Detects the backend from the URL:
    /// - `postgres://` or `postgresql://` → PostgreSQL
    /// - Everything else → SQLite
    pub async fn connect(url: &str, no_tls: bool) -> Result<Self> {
        if is_postgres_url(url) {
            #[cfg(feature = "postgres")]
            {
                info!("Connecting to {}", redact_url_password(url));
                let client = super::pg_tls::connect_raw(url, no_tls).await?;
                return Ok(Self::Postgres {
                    client: Arc::new(client),
                });
            }
            #[cfg(not(feature = "postgres"))]
            {
                let _ = no_tls;
                return Err(RepositoryError::InvalidUrl(format!(
                    "{} requires building with the `postgres` feature",
                    redact_url_password(url)
                )));
            }
        }

        let path = sqlite_path(url);
        if path.as_os_str().is_empty() {
            return Err(RepositoryError::InvalidUrl(url.to_string()));
        }
        info!("Using SQLite database at {}", path.display());
        Ok(Self::sqlite(&path))
    }

    pub fn sqlite(path: &Path) -> Self {
        Self::Sqlite {
            path: path.to_path_buf(),
        }
    }

    /// Create tables if missing.
    pub async fn init_schema(&self) -> Result<()> {
        match self {
            Self::Sqlite { path } => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                let path = path.clone();
                tokio::task::spawn_blocking(move || init_sqlite_schema(&path)).await?
            }
            #[cfg(feature = "postgres")]
            Self::Postgres { client } => {
                client.batch_execute(super::schema::POSTGRES_SCHEMA).await?;
                Ok(())
            }
        }
    }

    pub fn registry(&self) -> Box<dyn RegistryLookup> {
        match self {
            Self::Sqlite { path } => Box::new(SqliteRegistry::new(path)),
            #[cfg(feature = "postgres")]
            Self::Postgres { client } => Box::new(super::postgres::PgRegistry::new(client.clone())),
        }
    }

    pub fn queue(&self) -> Box<dyn ImportQueue> {
        match self {
            Self::Sqlite { path } => Box::new(SqliteImportQueue::new(path)),
            #[cfg(feature = "postgres")]
            Self::Postgres { client } => {
                Box::new(super::postgres::PgImportQueue::new(client.clone()))
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Sqlite { .. } => "sqlite",
            #[cfg(feature = "postgres")]
            Self::Postgres { .. } => "postgres",
        }
    }
}

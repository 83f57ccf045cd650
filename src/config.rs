//! Configuration management using the prefer crate for file discovery.
//!
//! Precedence, lowest first: built-in defaults, config file, environment,
//! command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::LlmConfig;
use crate::repository::util::{is_postgres_url, redact_url_password};
use crate::worker::{DEFAULT_BATCH_SIZE, DEFAULT_CLAIM_LEASE};

/// Default database filename inside the data directory.
pub const DEFAULT_DATABASE_FILENAME: &str = "rxreconcile.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding the default SQLite database.
    pub data_dir: PathBuf,
    /// Explicit database URL; overrides `data_dir` when set.
    pub database_url: Option<String>,
    /// Rows claimed per `process` invocation.
    pub batch_size: usize,
    /// How long a claim protects its rows.
    pub claim_lease: Duration,
    /// Claimant name written into claim tokens.
    pub worker_id: String,
    /// Disable TLS for PostgreSQL connections.
    pub no_tls: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            data_dir,
            database_url: None,
            batch_size: DEFAULT_BATCH_SIZE,
            claim_lease: DEFAULT_CLAIM_LEASE,
            worker_id: default_worker_id(),
            no_tls: false,
        }
    }
}

/// `<hostname>-<pid>`, so concurrent runs on one host stay distinguishable.
fn default_worker_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "worker".to_string());
    format!("{}-{}", host, std::process::id())
}

impl Settings {
    /// Get the database URL, constructing a SQLite one if not explicitly set.
    pub fn database_url(&self) -> String {
        match self.database_url {
            Some(ref url) => url.clone(),
            None => format!("sqlite:{}", self.database_path().display()),
        }
    }

    /// Database URL safe to print.
    pub fn display_database_url(&self) -> String {
        redact_url_password(&self.database_url())
    }

    pub fn is_postgres(&self) -> bool {
        self.database_url
            .as_ref()
            .is_some_and(|url| is_postgres_url(url))
    }

    /// Path of the default SQLite database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DEFAULT_DATABASE_FILENAME)
    }

    /// Apply environment overrides from an arbitrary variable source.
    ///
    /// Supported env vars: `DATABASE_URL`, `RXRECON_BATCH_SIZE`,
    /// `RXRECON_LEASE_SECS`, `RXRECON_WORKER_ID`, `RXRECON_NO_TLS`.
    /// Unparseable numbers are ignored.
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("DATABASE_URL") {
            tracing::debug!(
                "Using DATABASE_URL from environment: {}",
                redact_url_password(&url)
            );
            self.database_url = Some(url);
        }
        if let Some(size) = get("RXRECON_BATCH_SIZE").and_then(|v| v.trim().parse().ok()) {
            self.batch_size = size;
        }
        if let Some(secs) = get("RXRECON_LEASE_SECS").and_then(|v| v.trim().parse().ok()) {
            self.claim_lease = Duration::from_secs(secs);
        }
        if let Some(id) = get("RXRECON_WORKER_ID") {
            self.worker_id = id;
        }
        if let Some(flag) = get("RXRECON_NO_TLS") {
            if flag == "1" || flag.eq_ignore_ascii_case("true") {
                self.no_tls = true;
            }
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Directory for the default SQLite database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    /// Claim lease in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    /// Classification service settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Discover a config file in the standard locations.
    ///
    /// A missing or unreadable file falls back to defaults with env overrides.
    pub async fn load() -> Self {
        match prefer::load("rxreconcile").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("Ignoring config file: {}", e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file, parsed by extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let mut config = Self::parse(path, &contents)?;
        config.source_path = Some(path.to_path_buf());
        // File values are the base; the environment still wins
        config.llm = config.llm.with_env_overrides();
        Ok(config)
    }

    fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parsed = match ext {
            "toml" => toml::from_str(contents).map_err(|e| e.to_string()),
            "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| e.to_string()),
            _ => serde_json::from_str(contents).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Directory of the config file, used for relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a possibly relative or `~`-prefixed path against `base_dir`.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        if let Some(rest) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }

        let path = Path::new(path_str);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply file values to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref url) = self.database_url {
            settings.database_url = Some(url.clone());
        }
        if let Some(size) = self.batch_size {
            settings.batch_size = size;
        }
        if let Some(secs) = self.lease_secs {
            settings.claim_lease = Duration::from_secs(secs);
        }
        if let Some(ref id) = self.worker_id {
            settings.worker_id = id.clone();
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
}

/// Load settings and the config they came from.
///
/// An explicit config path must exist and parse; auto-discovered files
/// are best effort.
pub async fn load_settings_with_options(
    options: LoadOptions,
) -> Result<(Settings, Config), ConfigError> {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };

    let mut settings = Settings::default();
    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    config.apply_to_settings(&mut settings, &base_dir);
    settings.apply_env_overrides(|name| std::env::var(name).ok());

    Ok((settings, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.batch_size, 50);
        assert_eq!(settings.claim_lease, Duration::from_secs(90 * 60));
        assert!(settings.database_url().starts_with("sqlite:"));
        assert!(settings.database_url().ends_with(DEFAULT_DATABASE_FILENAME));
        assert!(!settings.is_postgres());
        assert!(settings.worker_id.ends_with(&format!("-{}", std::process::id())));
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings.apply_env_overrides(env(&[
            ("DATABASE_URL", "postgres://rx:secret@db/rx"),
            ("RXRECON_BATCH_SIZE", "10"),
            ("RXRECON_LEASE_SECS", "120"),
            ("RXRECON_WORKER_ID", "cron-a"),
            ("RXRECON_NO_TLS", "true"),
        ]));

        assert!(settings.is_postgres());
        assert_eq!(settings.batch_size, 10);
        assert_eq!(settings.claim_lease, Duration::from_secs(120));
        assert_eq!(settings.worker_id, "cron-a");
        assert!(settings.no_tls);
        assert!(!settings.display_database_url().contains("secret"));
    }

    #[test]
    fn test_bad_env_values_are_ignored() {
        let mut settings = Settings::default();
        settings.apply_env_overrides(env(&[
            ("RXRECON_BATCH_SIZE", "lots"),
            ("DATABASE_URL", "  "),
            ("RXRECON_NO_TLS", "0"),
        ]));
        assert_eq!(settings.batch_size, 50);
        assert!(settings.database_url.is_none());
        assert!(!settings.no_tls);
    }

    #[tokio::test]
    async fn test_load_toml_and_apply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rxreconcile.toml");
        std::fs::write(
            &path,
            "data_dir = \"./data\"\nbatch_size = 25\nlease_secs = 600\n\n[llm]\nmodel = \"qwen2.5:7b\"\n",
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.batch_size, Some(25));
        assert_eq!(config.base_dir().as_deref(), Some(dir.path()));

        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, dir.path());
        assert_eq!(settings.data_dir, dir.path().join("./data"));
        assert_eq!(settings.batch_size, 25);
        assert_eq!(settings.claim_lease, Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_load_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("rxreconcile.yaml");
        std::fs::write(&yaml, "worker_id: nightly\nbatch_size: 5\n").unwrap();
        let config = Config::load_from_path(&yaml).await.unwrap();
        assert_eq!(config.worker_id.as_deref(), Some("nightly"));

        let json = dir.path().join("rxreconcile.json");
        std::fs::write(&json, r#"{"database_url": "sqlite:/tmp/rx.db"}"#).unwrap();
        let config = Config::load_from_path(&json).await.unwrap();
        assert_eq!(config.database_url.as_deref(), Some("sqlite:/tmp/rx.db"));
    }

    #[tokio::test]
    async fn test_parse_errors_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "batch_size = [").unwrap();

        assert!(matches!(
            Config::load_from_path(&path).await,
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            Config::load_from_path(&dir.path().join("missing.toml")).await,
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_resolve_path() {
        let config = Config::default();
        let base = Path::new("/etc/rx");
        assert_eq!(config.resolve_path("/var/lib/rx", base), PathBuf::from("/var/lib/rx"));
        assert_eq!(config.resolve_path("db", base), PathBuf::from("/etc/rx/db"));
    }
}

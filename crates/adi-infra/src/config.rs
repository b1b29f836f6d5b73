//! `AppConfig`: the single TOML document described by spec.md §6,
//! generalising the teacher's `AppConfig` / `CONFIG: Lazy<...>` pattern in
//! the root binary's own `src/config.rs` (a `once_cell::sync::Lazy`
//! constant is no longer appropriate once configuration is re-read per
//! daemon boot instead of process-wide, so this crate exposes a plain
//! loader function instead).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ingest_tracking_db: String,
    pub base_dir: PathBuf,
    pub max_workers: usize,
    pub log_level: String,
    pub log_file_path: PathBuf,
    pub poll_interval_ms: u64,
    pub shutdown_grace_seconds: u64,
    pub parallel_upload_per_worker: u32,
    pub parallel_filesets_per_worker: u32,
    pub skip_checksum: bool,
    pub skip_minmax: bool,
    pub skip_thumbnails: bool,
    pub skip_upgrade: bool,
    pub skip_all: bool,
    pub use_register_zarr: bool,
    /// Session TTL in milliseconds (spec.md §6's `ttl_for_user_conn` key).
    pub ttl_for_user_conn: u64,
    pub container_runtime_binary: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ingest_tracking_db: String::new(),
            base_dir: PathBuf::from("/data"),
            max_workers: 4,
            log_level: "info".to_string(),
            log_file_path: PathBuf::from("logs/app.logs"),
            poll_interval_ms: 1_500,
            shutdown_grace_seconds: 30,
            parallel_upload_per_worker: 2,
            parallel_filesets_per_worker: 2,
            skip_checksum: false,
            skip_minmax: false,
            skip_thumbnails: false,
            skip_upgrade: false,
            skip_all: false,
            use_register_zarr: false,
            ttl_for_user_conn: 60_000,
            container_runtime_binary: "podman".to_string(),
        }
    }
}

impl AppConfig {
    /// Parses `adi.toml` at `path`, then applies the environment overrides
    /// spec.md §6 documents (`INGEST_TRACKING_DB_URL`, `USE_REGISTER_ZARR`).
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let mut config: AppConfig =
            toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;

        if let Ok(url) = env::var("INGEST_TRACKING_DB_URL") {
            config.ingest_tracking_db = url;
        }
        if let Ok(flag) = env::var("USE_REGISTER_ZARR") {
            config.use_register_zarr = parse_bool_env(&flag);
        }

        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_for_user_conn)
    }
}

fn parse_bool_env(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// The four OMERO connection variables spec.md §6 requires be present at
/// boot, fail-fast if not (the `FATAL_BOOT` ambient startup validation
/// described in SPEC_FULL.md §4.7).
#[derive(Debug, Clone)]
pub struct OmeroConnectionConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub port: u16,
}

impl OmeroConnectionConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: require_env("OMERO_HOST")?,
            user: require_env("OMERO_USER")?,
            password: require_env("OMERO_PASSWORD")?,
            port: require_env("OMERO_PORT")?
                .parse()
                .map_err(|_| ConfigError::InvalidEnv("OMERO_PORT must be a port number".into()))?,
        })
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnv(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.poll_interval(), Duration::from_millis(1_500));
    }

    #[test]
    fn loads_and_overrides_from_toml() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            r#"
            ingest_tracking_db = "postgres://localhost/adi"
            max_workers = 8
            "#,
        )
        .unwrap();

        let config = AppConfig::load(tmp.path()).unwrap();
        assert_eq!(config.ingest_tracking_db, "postgres://localhost/adi");
        assert_eq!(config.max_workers, 8);
        // Untouched keys keep their defaults.
        assert_eq!(config.parallel_upload_per_worker, 2);
    }

    #[test]
    fn recognises_the_documented_ttl_for_user_conn_key() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            r#"
            ingest_tracking_db = "postgres://localhost/adi"
            ttl_for_user_conn = 120000
            "#,
        )
        .unwrap();

        let config = AppConfig::load(tmp.path()).unwrap();
        assert_eq!(config.session_ttl(), Duration::from_millis(120_000));
    }
}

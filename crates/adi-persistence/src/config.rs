//! Connection configuration, loaded from the environment.
//!
//! Generalises the teacher's `chem-persistence::config::DbConfig` /
//! `init_dotenv` pattern: `.env` is loaded lazily and once, and the
//! connection string itself is read from `INGEST_TRACKING_DB_URL` per
//! spec.md §6 (falling back to the generic `DATABASE_URL` so the crate
//! still works stand-alone in tests and tooling).

use std::env;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv();
});

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, env::VarError> {
        Lazy::force(&DOTENV_LOADED);
        let url = env::var("INGEST_TRACKING_DB_URL").or_else(|_| env::var("DATABASE_URL"))?;
        let min_connections =
            env::var("DATABASE_MIN_CONNECTIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(2);
        let max_connections =
            env::var("DATABASE_MAX_CONNECTIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(16);
        Ok(Self { url, min_connections, max_connections })
    }
}

pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}

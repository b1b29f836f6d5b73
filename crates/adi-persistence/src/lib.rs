//! adi-persistence: the Postgres-backed implementation of the contracts
//! defined in `adi-core`.
//!
//! - `config`: `DbConfig`, loaded from `INGEST_TRACKING_DB_URL` / `.env`.
//! - `error`: `PersistenceError`, `sqlx::Error` classified into
//!   retryable/non-retryable/integrity buckets.
//! - `retry`: `with_retry`, the backoff loop every query in this crate
//!   runs through.
//! - `migrations`: advisory-lock-guarded `sqlx::migrate!` runner.
//! - `tracker`: `PgTracker` and `PgPreprocessingRepository`.

pub mod config;
pub mod error;
pub mod migrations;
pub mod retry;
pub mod tracker;

pub use config::DbConfig;
pub use error::PersistenceError;
pub use migrations::run_pending_migrations;
pub use tracker::{PgPreprocessingRepository, PgTracker};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub async fn connect(config: &DbConfig) -> Result<PgPool, PersistenceError> {
    PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
        .map_err(Into::into)
}

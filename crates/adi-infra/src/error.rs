use std::path::PathBuf;

use thiserror::Error;

use adi_core::TrackerError;

/// Errors that stop the daemon from booting at all (spec.md §7's
/// `FATAL_BOOT`): bad config, unreachable database, failed migration. The
/// process exits non-zero on any of these; it never self-restarts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },

    #[error("missing required environment variable {0}")]
    MissingEnv(String),

    #[error("invalid environment variable: {0}")]
    InvalidEnv(String),
}

#[derive(Debug, Error)]
pub enum BootError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("database connection failed: {0}")]
    Database(#[from] adi_persistence::PersistenceError),

    #[error("startup recovery failed: {0}")]
    Recovery(#[from] TrackerError),
}

/// The per-claim pipeline error taxonomy (spec.md §7), composed from every
/// downstream crate's own error enum via `#[from]` — the same "compose
/// upward" shape as the teacher's `chem-domain::DomainError: From<EngineError>`.
/// Every variant here ends the attempt with a single `IMPORT_FAILED` event;
/// none of them propagate past the worker boundary (spec.md §4.3).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("ORDER_INVALID: {0}")]
    OrderInvalid(#[from] adi_policies::ValidationError),

    #[error("PREPROCESS_FAILED: {0}")]
    PreprocessFailed(#[from] adi_adapters::PreprocessError),

    #[error("IMPORT_FAILED: {0}")]
    ImportFailed(#[from] adi_adapters::ImportError),

    #[error("preprocessing configuration lookup failed: {0}")]
    PreprocessingLookup(TrackerError),
}

impl PipelineError {
    /// A one-line, human-readable message suitable for the `IMPORT_FAILED`
    /// event's `message` column (spec.md §7's "concise, human-readable
    /// message").
    pub fn terminal_message(&self) -> String {
        self.to_string()
    }
}

use std::path::PathBuf;

use thiserror::Error;

use adi_providers::ProviderError;

/// `PREPROCESS_FAILED` (spec.md §7): the container runtime returned
/// non-zero, or the tail output (and its directory-scan fallback) yielded
/// no usable files.
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("container exited with status {0:?}")]
    NonZeroExit(Option<i32>),

    #[error("preprocessing yielded no usable files for {alt_output_folder}")]
    NoUsableFiles { alt_output_folder: PathBuf },

    #[error("container runtime error: {0}")]
    Provider(#[from] ProviderError),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

/// `IMPORT_FAILED` / `REWIRE_FAILED` (spec.md §7): session/destination
/// resolution, CLI invocation, output parsing, or post-import symlink
/// rewiring failed.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("destination does not exist")]
    DestinationNotFound,

    #[error("import CLI returned no identifiers despite a zero exit status")]
    NoIdentifiers,

    #[error("gateway error: {0}")]
    Provider(#[from] ProviderError),

    #[error("symlink rewiring failed: {0}")]
    RewireFailed(String),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

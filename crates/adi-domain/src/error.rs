use thiserror::Error;

/// Errors raised while constructing or normalising domain values.
///
/// This is deliberately small: anything that depends on the repository,
/// the filesystem, or a subprocess lives in the crate that owns that
/// concern (`adi-policies`, `adi-adapters`, `adi-persistence`).
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("unknown stage: {0}")]
    UnknownStage(String),

    #[error("order has no files")]
    NoFiles,

    #[error("destination_id must be a non-negative integer, got {0}")]
    NegativeDestinationId(i64),
}

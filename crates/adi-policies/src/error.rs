use std::path::PathBuf;

use thiserror::Error;

use adi_providers::ProviderError;

/// `ORDER_INVALID` (spec.md §7): every reason a raw claimed order can fail
/// to become a `ValidatedOrder`. All variants are terminal for the attempt.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("order has no files")]
    NoFiles,

    #[error("path is not absolute: {0}")]
    NotAbsolute(PathBuf),

    #[error("path does not exist: {0}")]
    DoesNotExist(PathBuf),

    #[error("path is not readable: {0}")]
    NotReadable(PathBuf),

    #[error("destination_id must be a non-negative integer, got {0}")]
    NegativeDestinationId(i64),

    #[error("unrecognised destination_type: {0}")]
    UnknownDestinationType(String),

    #[error("user does not resolve in the repository: {0}")]
    UnknownUser(String),

    #[error("user {user} is not a member of group {group}")]
    NotGroupMember { user: String, group: String },

    #[error("identity check failed: {0}")]
    Provider(#[from] ProviderError),
}

use thiserror::Error;

/// Errors raised talking to an external collaborator: the container
/// runtime or the image repository's session/import-CLI surface.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to spawn {program}: {source}")]
    Spawn { program: String, #[source] source: std::io::Error },

    #[error("{program} exited with status {status}; see {stderr_path:?}")]
    NonZeroExit { program: String, status: i32, stderr_path: std::path::PathBuf },

    #[error("session error: {0}")]
    Session(String),

    #[error("destination does not exist: {0}")]
    DestinationNotFound(String),

    #[error("malformed output from {program}: {reason}")]
    MalformedOutput { program: String, reason: String },

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

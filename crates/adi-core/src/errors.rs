use thiserror::Error;
use uuid::Uuid;

use adi_domain::Stage;

/// Errors a `Tracker` implementation can report.
///
/// `Backend` wraps whatever the storage layer threw after its own retry
/// policy gave up (see `adi-persistence::retry`); everything else is a
/// semantic violation of the state machine in spec.md §4.1.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("no event for uuid {0}")]
    NotFound(Uuid),

    #[error("no preprocessing configuration for id {0}")]
    PreprocessingNotFound(i64),

    #[error("illegal transition for {uuid}: {from} -> {to}")]
    InvalidTransition { uuid: Uuid, from: Stage, to: Stage },

    #[error("two claims raced for the same order; the loser must retry")]
    ClaimConflict,

    #[error("backend error: {0}")]
    Backend(String),
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// A processing stage, persisted verbatim (as this exact string) in the
/// event log for auditability.
///
/// ```text
/// IMPORT_PENDING  ->  IMPORT_STARTED  ->  IMPORT_COMPLETED
///                                     `->  IMPORT_FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    ImportPending,
    ImportStarted,
    ImportCompleted,
    ImportFailed,
}

impl Stage {
    /// Terminal stages are never transitioned out of (invariant 4).
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::ImportCompleted | Stage::ImportFailed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::ImportPending => "IMPORT_PENDING",
            Stage::ImportStarted => "IMPORT_STARTED",
            Stage::ImportCompleted => "IMPORT_COMPLETED",
            Stage::ImportFailed => "IMPORT_FAILED",
        }
    }

    /// Whether `self -> next` is a legal edge in the state machine.
    pub fn can_transition_to(self, next: Stage) -> bool {
        matches!(
            (self, next),
            (Stage::ImportPending, Stage::ImportStarted)
                | (Stage::ImportStarted, Stage::ImportCompleted)
                | (Stage::ImportStarted, Stage::ImportFailed)
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IMPORT_PENDING" => Ok(Stage::ImportPending),
            "IMPORT_STARTED" => Ok(Stage::ImportStarted),
            "IMPORT_COMPLETED" => Ok(Stage::ImportCompleted),
            "IMPORT_FAILED" => Ok(Stage::ImportFailed),
            other => Err(DomainError::UnknownStage(other.to_string())),
        }
    }
}

/// One row of the append-only progress log. Several `Event`s share a
/// `uuid`; the maximum-timestamp row is the authoritative current stage
/// (invariant 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub uuid: Uuid,
    pub stage: Stage,
    pub timestamp: DateTime<Utc>,
    pub message: Option<String>,
}

impl Event {
    pub fn new(uuid: Uuid, stage: Stage, message: Option<String>) -> Self {
        Self { uuid, stage, timestamp: Utc::now(), message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_from_str() {
        for stage in [
            Stage::ImportPending,
            Stage::ImportStarted,
            Stage::ImportCompleted,
            Stage::ImportFailed,
        ] {
            let parsed: Stage = stage.to_string().parse().unwrap();
            assert_eq!(parsed, stage);
        }
    }

    #[test]
    fn rejects_unknown_stage_strings() {
        assert!("IMPORT_BOGUS".parse::<Stage>().is_err());
    }

    #[test]
    fn only_the_spec_edges_are_legal() {
        assert!(Stage::ImportPending.can_transition_to(Stage::ImportStarted));
        assert!(Stage::ImportStarted.can_transition_to(Stage::ImportCompleted));
        assert!(Stage::ImportStarted.can_transition_to(Stage::ImportFailed));

        assert!(!Stage::ImportPending.can_transition_to(Stage::ImportCompleted));
        assert!(!Stage::ImportCompleted.can_transition_to(Stage::ImportStarted));
        assert!(!Stage::ImportFailed.can_transition_to(Stage::ImportStarted));
        assert!(!Stage::ImportStarted.can_transition_to(Stage::ImportStarted));
    }

    #[test]
    fn terminal_stages_are_completed_and_failed() {
        assert!(Stage::ImportCompleted.is_terminal());
        assert!(Stage::ImportFailed.is_terminal());
        assert!(!Stage::ImportPending.is_terminal());
        assert!(!Stage::ImportStarted.is_terminal());
    }
}

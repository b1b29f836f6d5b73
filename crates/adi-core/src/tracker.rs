use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use adi_domain::{Order, Stage};

use crate::errors::TrackerError;

/// The append-only event log / work-queue contract (component A of the
/// ingestion daemon).
///
/// Implementations must uphold invariants 1-4 from spec.md §3:
/// the max-timestamp event is authoritative, transitions follow the stage
/// machine, at most one worker ever holds a non-terminal claim on a given
/// `uuid`, and terminal stages are never left.
#[async_trait]
pub trait Tracker: Send + Sync {
    /// Atomically selects one `IMPORT_PENDING` order (FIFO by timestamp,
    /// ties broken lexically by `uuid`), writes an `IMPORT_STARTED` event
    /// for it, and returns the claimed order. Two concurrent callers must
    /// never both succeed in claiming the same order.
    async fn claim_next(&self) -> Result<Option<Order>, TrackerError>;

    /// Appends a new stage event for `uuid`. Rejects transitions that
    /// violate the state machine.
    async fn record(
        &self,
        uuid: Uuid,
        stage: Stage,
        message: Option<String>,
    ) -> Result<(), TrackerError>;

    /// The latest stage recorded for `uuid`.
    async fn current_stage(&self, uuid: Uuid) -> Result<Stage, TrackerError>;

    /// Every `uuid` whose current stage is `IMPORT_STARTED` right now. Used
    /// only at startup, to find orders abandoned by a crashed previous
    /// instance.
    async fn list_dangling(&self) -> Result<Vec<Uuid>, TrackerError>;
}

/// Picks the claim-order winner among candidate pending orders: earliest
/// `timestamp` first, ties broken by lexical `uuid` order.
///
/// Shared by `InMemoryTracker` and `adi-persistence::PgTracker` so that both
/// backends agree on what "FIFO by claim-time" means (spec.md §4.1, §5).
pub fn select_next_pending<'a>(
    candidates: impl IntoIterator<Item = (Uuid, DateTime<Utc>)>,
) -> Option<Uuid> {
    candidates
        .into_iter()
        .min_by(|(uuid_a, ts_a), (uuid_b, ts_b)| {
            ts_a.cmp(ts_b).then_with(|| uuid_a.to_string().cmp(&uuid_b.to_string()))
        })
        .map(|(uuid, _)| uuid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn picks_earliest_timestamp() {
        let now = Utc::now();
        let a = (Uuid::new_v4(), now);
        let b = (Uuid::new_v4(), now - Duration::seconds(5));
        let winner = select_next_pending(vec![a, b]).unwrap();
        assert_eq!(winner, b.0);
    }

    #[test]
    fn breaks_ties_lexically_by_uuid() {
        let now = Utc::now();
        let low = Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap();
        let high = Uuid::parse_str("ffffffff-ffff-ffff-ffff-ffffffffffff").unwrap();
        let winner = select_next_pending(vec![(high, now), (low, now)]).unwrap();
        assert_eq!(winner, low);
    }

    #[test]
    fn empty_candidates_yield_none() {
        assert!(select_next_pending(std::iter::empty()).is_none());
    }
}

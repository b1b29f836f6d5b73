use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use adi_domain::{Event, Order, Stage};

use crate::errors::TrackerError;
use crate::tracker::{select_next_pending, Tracker};

/// In-memory reference `Tracker`, analogous to the teacher's
/// `InMemoryEventStore`: volatile, not meant for production, but sharing
/// the exact claim and transition semantics real backends must honour. Used
/// by the worker pool's unit tests and by `adi-cli` for dry runs.
pub struct InMemoryTracker {
    inner: Mutex<Inner>,
}

struct Inner {
    orders: HashMap<Uuid, Order>,
    events: HashMap<Uuid, Vec<Event>>,
}

impl InMemoryTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { orders: HashMap::new(), events: HashMap::new() }),
        }
    }

    /// Seeds a producer-inserted order at `IMPORT_PENDING`.
    pub async fn seed_pending(&self, order: Order) {
        let mut guard = self.inner.lock().await;
        let uuid = order.uuid;
        let ts = order.timestamp;
        guard.events.insert(
            uuid,
            vec![Event { uuid, stage: Stage::ImportPending, timestamp: ts, message: None }],
        );
        guard.orders.insert(uuid, order);
    }

    /// All events recorded for `uuid`, oldest first. Exposed for tests that
    /// assert on the full transition sequence (testable property 1).
    pub async fn events_for(&self, uuid: Uuid) -> Vec<Event> {
        self.inner.lock().await.events.get(&uuid).cloned().unwrap_or_default()
    }
}

impl Default for InMemoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn latest_stage(events: &[Event]) -> Option<Stage> {
    events.last().map(|e| e.stage)
}

#[async_trait]
impl Tracker for InMemoryTracker {
    async fn claim_next(&self) -> Result<Option<Order>, TrackerError> {
        let mut guard = self.inner.lock().await;

        let candidates: Vec<(Uuid, chrono::DateTime<chrono::Utc>)> = guard
            .orders
            .values()
            .filter(|o| matches!(latest_stage(&guard.events[&o.uuid]), Some(Stage::ImportPending)))
            .map(|o| (o.uuid, o.timestamp))
            .collect();

        let Some(uuid) = select_next_pending(candidates) else {
            return Ok(None);
        };

        let events = guard.events.get_mut(&uuid).expect("candidate has events");
        events.push(Event::new(uuid, Stage::ImportStarted, None));

        let order = guard.orders.get_mut(&uuid).expect("candidate has an order row");
        order.stage = Stage::ImportStarted;
        Ok(Some(order.clone()))
    }

    async fn record(
        &self,
        uuid: Uuid,
        stage: Stage,
        message: Option<String>,
    ) -> Result<(), TrackerError> {
        let mut guard = self.inner.lock().await;
        let events = guard.events.entry(uuid).or_default();
        let current = latest_stage(events).unwrap_or(Stage::ImportPending);

        if !current.can_transition_to(stage) {
            return Err(TrackerError::InvalidTransition { uuid, from: current, to: stage });
        }

        events.push(Event::new(uuid, stage, message));
        if let Some(order) = guard.orders.get_mut(&uuid) {
            order.stage = stage;
        }
        Ok(())
    }

    async fn current_stage(&self, uuid: Uuid) -> Result<Stage, TrackerError> {
        let guard = self.inner.lock().await;
        guard
            .events
            .get(&uuid)
            .and_then(|events| latest_stage(events))
            .ok_or(TrackerError::NotFound(uuid))
    }

    async fn list_dangling(&self) -> Result<Vec<Uuid>, TrackerError> {
        let guard = self.inner.lock().await;
        Ok(guard
            .events
            .iter()
            .filter(|(_, events)| matches!(latest_stage(events), Some(Stage::ImportStarted)))
            .map(|(uuid, _)| *uuid)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adi_domain::DestinationType;
    use std::path::PathBuf;

    fn order(uuid: Uuid) -> Order {
        Order {
            uuid,
            group_name: "Demo".into(),
            user_name: "researcher".into(),
            destination_id: 151,
            destination_type: DestinationType::Dataset,
            files: vec![PathBuf::from("/data/g/x.tif")],
            stage: Stage::ImportPending,
            timestamp: chrono::Utc::now(),
            preprocessing_id: None,
        }
    }

    #[tokio::test]
    async fn claim_transitions_pending_to_started_exactly_once() {
        let tracker = InMemoryTracker::new();
        let uuid = Uuid::new_v4();
        tracker.seed_pending(order(uuid)).await;

        let claimed = tracker.claim_next().await.unwrap().expect("one pending order");
        assert_eq!(claimed.uuid, uuid);
        assert_eq!(tracker.current_stage(uuid).await.unwrap(), Stage::ImportStarted);

        // Nothing left to claim.
        assert!(tracker.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_claims_never_double_claim() {
        let tracker = std::sync::Arc::new(InMemoryTracker::new());
        for _ in 0..50 {
            tracker.seed_pending(order(Uuid::new_v4())).await;
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let t = tracker.clone();
            handles.push(tokio::spawn(async move {
                let mut claimed = Vec::new();
                while let Some(order) = t.claim_next().await.unwrap() {
                    claimed.push(order.uuid);
                }
                claimed
            }));
        }

        let mut all = Vec::new();
        for h in handles {
            all.extend(h.await.unwrap());
        }

        let mut unique = all.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(all.len(), 50, "every order claimed exactly once in total");
        assert_eq!(unique.len(), 50, "no uuid claimed twice");
    }

    #[tokio::test]
    async fn record_rejects_illegal_transitions() {
        let tracker = InMemoryTracker::new();
        let uuid = Uuid::new_v4();
        tracker.seed_pending(order(uuid)).await;

        let err = tracker.record(uuid, Stage::ImportCompleted, None).await.unwrap_err();
        assert!(matches!(err, TrackerError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn terminal_events_are_never_followed_by_another_transition() {
        let tracker = InMemoryTracker::new();
        let uuid = Uuid::new_v4();
        tracker.seed_pending(order(uuid)).await;
        tracker.claim_next().await.unwrap();
        tracker.record(uuid, Stage::ImportFailed, Some("boom".into())).await.unwrap();

        let err = tracker.record(uuid, Stage::ImportStarted, None).await.unwrap_err();
        assert!(matches!(err, TrackerError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn list_dangling_reports_started_but_not_terminal() {
        let tracker = InMemoryTracker::new();
        let uuid = Uuid::new_v4();
        tracker.seed_pending(order(uuid)).await;
        tracker.claim_next().await.unwrap();

        assert_eq!(tracker.list_dangling().await.unwrap(), vec![uuid]);

        tracker.record(uuid, Stage::ImportCompleted, None).await.unwrap();
        assert!(tracker.list_dangling().await.unwrap().is_empty());
    }
}

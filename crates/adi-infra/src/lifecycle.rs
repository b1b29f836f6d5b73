//! Boot and shutdown lifecycle (spec.md §4.7): connect, run migrations
//! under an advisory lock, force-fail anything left `IMPORT_STARTED` by a
//! previous crash, then hand off to the Poller/WorkerPool until a signal
//! asks it to stop. Signal handling follows the teacher's daemon
//! (`examples/other_examples/93178445_groblegark-oddjobs__crates-daemon-src-main.rs.rs`):
//! `tokio::signal::unix::signal` for both `SIGTERM` and `SIGINT`, raced with
//! the run loop via `tokio::select!`.

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;

use adi_core::Tracker;
use adi_domain::Stage;

use crate::error::BootError;
use crate::pipeline::PipelineDeps;
use crate::pool::WorkerPool;
use crate::poller::Poller;

/// Runs startup recovery: every `uuid` still `IMPORT_STARTED` did not
/// survive to a terminal stage, so the previous instance crashed mid-run.
/// Force them to `IMPORT_FAILED` rather than silently resuming or losing
/// them (spec.md §4.7's "stale at startup" recovery).
pub async fn recover_dangling(tracker: &dyn Tracker) -> Result<usize, BootError> {
    let dangling = tracker.list_dangling().await?;
    let count = dangling.len();
    for uuid in dangling {
        tracing::warn!(%uuid, "recovering dangling order from previous instance");
        if let Err(e) = tracker
            .record(uuid, Stage::ImportFailed, Some("stale at startup".to_string()))
            .await
        {
            tracing::error!(%uuid, error = %e, "failed to recover dangling order");
        }
    }
    Ok(count)
}

/// Runs the Poller + WorkerPool until SIGTERM or SIGINT, then waits up to
/// `shutdown_grace` for in-flight workers before returning.
pub async fn run_until_signal(deps: Arc<PipelineDeps>, max_workers: usize, poll_interval: std::time::Duration, shutdown_grace: std::time::Duration) {
    let pool = Arc::new(WorkerPool::new(max_workers, deps.clone()));
    let poller = Poller::new(deps.tracker.clone(), pool.clone(), poll_interval);
    let shutdown = Arc::new(Notify::new());

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    let poller_shutdown = shutdown.clone();
    let poll_task = tokio::spawn(async move { poller.run(poller_shutdown).await });

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        _ = sigint.recv() => tracing::info!("received SIGINT"),
    }

    shutdown.notify_waiters();
    if let Err(e) = poll_task.await {
        tracing::error!(error = %e, "poller task panicked");
    }

    tracing::info!(grace_seconds = shutdown_grace.as_secs(), "waiting for in-flight workers");
    pool.join_with_grace(shutdown_grace).await;
    tracing::info!("shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use adi_core::InMemoryTracker;
    use adi_domain::{DestinationType, Order};
    use std::path::PathBuf;
    use uuid::Uuid;

    fn order(uuid: Uuid) -> Order {
        Order {
            uuid,
            group_name: "Demo".into(),
            user_name: "researcher".into(),
            destination_id: 1,
            destination_type: DestinationType::Dataset,
            files: vec![PathBuf::from("/data/x.tif")],
            stage: Stage::ImportPending,
            timestamp: chrono::Utc::now(),
            preprocessing_id: None,
        }
    }

    #[tokio::test]
    async fn recovers_dangling_orders_to_import_failed() {
        let tracker = InMemoryTracker::new();
        let uuid = Uuid::new_v4();
        tracker.seed_pending(order(uuid)).await;
        tracker.claim_next().await.unwrap();
        assert_eq!(tracker.current_stage(uuid).await.unwrap(), Stage::ImportStarted);

        let count = recover_dangling(&tracker).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(tracker.current_stage(uuid).await.unwrap(), Stage::ImportFailed);
    }

    #[tokio::test]
    async fn recover_is_a_noop_with_nothing_dangling() {
        let tracker = InMemoryTracker::new();
        assert_eq!(recover_dangling(&tracker).await.unwrap(), 0);
    }
}

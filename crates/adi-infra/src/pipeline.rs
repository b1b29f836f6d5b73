//! The per-order pipeline: Validate -> (Preprocess) -> Import -> terminal
//! event (spec.md §4.3). Every error is caught here and converted to a
//! single `IMPORT_FAILED` event; nothing escapes to the worker pool except
//! a genuine panic, which the pool itself converts (see `pool.rs`).

use std::sync::Arc;

use adi_adapters::{Importer, Preprocessor};
use adi_core::{PreprocessingRepository, Tracker};
use adi_domain::{Order, Stage};
use adi_providers::{CliContainerRuntime, CliOmeroGateway};

use crate::error::PipelineError;

pub struct PipelineDeps {
    pub tracker: Arc<dyn Tracker>,
    pub preprocessing_repo: Arc<dyn PreprocessingRepository>,
    pub gateway: Arc<CliOmeroGateway>,
    pub preprocessor: Arc<Preprocessor<Arc<CliContainerRuntime>>>,
    pub importer: Arc<Importer<Arc<CliOmeroGateway>>>,
}

/// Runs one claimed order to a terminal stage. Never returns an error: the
/// one thing that can still fail the pool is a panic, not a `Result::Err`.
pub async fn run_pipeline(order: Order, deps: Arc<PipelineDeps>) {
    let uuid = order.uuid;
    match execute(order, &deps).await {
        Ok(()) => {
            if let Err(e) = deps.tracker.record(uuid, Stage::ImportCompleted, None).await {
                tracing::error!(%uuid, error = %e, "failed to record IMPORT_COMPLETED");
            }
        }
        Err(e) => {
            let message = e.terminal_message();
            tracing::warn!(%uuid, %message, "order failed");
            if let Err(record_err) = deps.tracker.record(uuid, Stage::ImportFailed, Some(message)).await {
                tracing::error!(%uuid, error = %record_err, "failed to record IMPORT_FAILED");
            }
        }
    }
}

async fn execute(order: Order, deps: &PipelineDeps) -> Result<(), PipelineError> {
    let validated = adi_policies::validate_order(&order, &*deps.gateway).await?;

    let mut preprocessing_row = None;
    if let Some(preprocessing_id) = validated.preprocessing_id {
        let preprocessing = deps
            .preprocessing_repo
            .find(preprocessing_id)
            .await
            .map_err(PipelineError::PreprocessingLookup)?;
        let processed = deps.preprocessor.run(validated.uuid, &validated.files, &preprocessing).await?;
        preprocessing_row = Some((preprocessing, processed));
    }

    let preprocessing_ref = preprocessing_row.as_ref().map(|(pp, processed)| (pp, processed));
    deps.importer.import(&validated, preprocessing_ref).await?;
    Ok(())
}

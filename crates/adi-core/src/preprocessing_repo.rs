//! Lookup contract for preprocessing configurations.
//!
//! An order carries an optional `preprocessing_id`; the pipeline resolves
//! it to a `Preprocessing` row through this trait before invoking the
//! container runtime. Split out of `Tracker` because it's a read-only
//! lookup against a different table, not part of the event log.

use async_trait::async_trait;

use adi_domain::Preprocessing;

use crate::errors::TrackerError;

#[async_trait]
pub trait PreprocessingRepository: Send + Sync {
    async fn find(&self, id: i64) -> Result<Preprocessing, TrackerError>;
}

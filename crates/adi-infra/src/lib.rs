//! adi-infra: wires the neutral contracts and their CLI-backed adapters
//! into a runnable daemon — config loading, the per-order pipeline, the
//! worker pool, the poller, and boot/shutdown lifecycle.
//!
//! - `config`: `AppConfig`, `OmeroConnectionConfig`.
//! - `error`: `ConfigError`, `BootError`, `PipelineError`.
//! - `pipeline`: `PipelineDeps`, `run_pipeline` (Validate -> Preprocess? ->
//!   Import -> terminal event).
//! - `pool`: `WorkerPool`, the semaphore-gated, panic-safe task supervisor.
//! - `poller`: `Poller`, the claim loop.
//! - `lifecycle`: startup recovery and the signal-driven run/shutdown loop.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pipeline;
pub mod pool;
pub mod poller;

pub use config::{AppConfig, OmeroConnectionConfig};
pub use error::{BootError, ConfigError, PipelineError};
pub use lifecycle::{recover_dangling, run_until_signal};
pub use pipeline::{run_pipeline, PipelineDeps};
pub use pool::WorkerPool;
pub use poller::Poller;

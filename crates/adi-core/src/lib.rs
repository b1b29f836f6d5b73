//! adi-core: the neutral contracts for the event log / work queue.
//!
//! - `errors`: `TrackerError`, the error type every `Tracker` implementation
//!   speaks.
//! - `tracker`: the `Tracker` trait — `claim_next`, `record`,
//!   `current_stage`, `list_dangling` — and the FIFO claim-ordering helper
//!   shared by every backend.
//! - `inmemory`: a `Mutex`-guarded reference implementation used by tests
//!   and by crates that don't want a database (mirrors the role the
//!   teacher's `InMemoryEventStore` plays for `chem-core`).

pub mod errors;
pub mod inmemory;
pub mod preprocessing_repo;
pub mod tracker;

pub use errors::TrackerError;
pub use inmemory::InMemoryTracker;
pub use preprocessing_repo::PreprocessingRepository;
pub use tracker::{select_next_pending, Tracker};

//! adi-domain: neutral data model shared by every other crate.
//!
//! Mirrors the shape of the queue table (`Order`, `Preprocessing`) and of the
//! append-only progress log (`Event`/`Stage`) described by the ingestion
//! spec. Nothing in here talks to a database or a subprocess; the JSON blob
//! and free-form row shapes used at the persistence boundary are decoded
//! into these types there, not here (see `adi-persistence`).

mod error;
mod order;
mod stage;

pub use error::DomainError;
pub use order::{DestinationType, Order, Preprocessing};
pub use stage::{Event, Stage};

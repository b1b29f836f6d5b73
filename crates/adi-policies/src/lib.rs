//! adi-policies: the Order Validator (component D).
//!
//! Turns a raw claimed `Order` into a `ValidatedOrder`, or an
//! `ORDER_INVALID` `ValidationError`, per spec.md §4.4. Identity resolution
//! is delegated to `adi_providers::OmeroGateway` so this crate has no
//! subprocess or database dependency of its own.

mod error;
mod validator;

pub use error::ValidationError;
pub use validator::{validate_order, ValidatedOrder};

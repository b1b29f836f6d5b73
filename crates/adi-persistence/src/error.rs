//! Persistence errors. Maps `sqlx::Error` onto variants the rest of the
//! daemon can reason about, the same role `chem-persistence::error` plays
//! for Diesel in the teacher crate.

use thiserror::Error;

use adi_domain::Stage;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("row not found")]
    NotFound,

    #[error("unique violation: {0}")]
    UniqueViolation(String),

    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("transient connection/pool error: {0}")]
    TransientIo(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("illegal transition {from} -> {to}")]
    IllegalTransition { from: Stage, to: Stage },

    #[error("unknown database error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                match code.as_deref() {
                    Some("23505") => Self::UniqueViolation(db_err.message().to_string()),
                    Some("23503") => Self::ForeignKeyViolation(db_err.message().to_string()),
                    _ => Self::Unknown(format!("db error: {}", db_err.message())),
                }
            }
            sqlx::Error::Io(e) => Self::TransientIo(e.to_string()),
            sqlx::Error::PoolTimedOut => Self::TransientIo("pool timed out".into()),
            sqlx::Error::PoolClosed => Self::TransientIo("pool closed".into()),
            sqlx::Error::Protocol(msg) => Self::TransientIo(msg.clone()),
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl From<PersistenceError> for adi_core::TrackerError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound => {
                // The caller supplies the uuid context; this conversion is
                // only used where `NotFound` has already been special-cased,
                // so falling back to a generic backend message is safe.
                adi_core::TrackerError::Backend("row not found".into())
            }
            other => adi_core::TrackerError::Backend(other.to_string()),
        }
    }
}

//! Order Validator (component D).
//!
//! Normalises a raw claimed `Order` into a `ValidatedOrder`: every shape
//! check spec.md §4.4 lists, plus identity resolution delegated to an
//! `OmeroGateway` so this stays testable against a mock gateway instead of
//! a live repository (mirrors `chem-policies`'s trait-based policy shape,
//! generalised here to a free function since there is exactly one
//! validation policy, not a family of interchangeable ones).

use std::path::PathBuf;

use uuid::Uuid;

use adi_domain::Order;
use adi_providers::{DestinationRef, OmeroGateway};

use crate::error::ValidationError;

/// An order that has passed every shape and identity check. Everything
/// downstream (Preprocessor, Importer) takes this instead of a raw
/// `Order`, so an un-validated order can't reach a subprocess.
#[derive(Debug, Clone)]
pub struct ValidatedOrder {
    pub uuid: Uuid,
    pub group_name: String,
    pub user_name: String,
    pub destination: DestinationRef,
    pub files: Vec<PathBuf>,
    pub preprocessing_id: Option<i64>,
}

/// Runs every check from spec.md §4.4 in order, failing fast on the first
/// violation (all are terminal for this attempt; there's no value in
/// collecting every failure before reporting one).
pub async fn validate_order(
    order: &Order,
    gateway: &dyn OmeroGateway,
) -> Result<ValidatedOrder, ValidationError> {
    if order.files.is_empty() {
        return Err(ValidationError::NoFiles);
    }

    for file in &order.files {
        if !file.is_absolute() {
            return Err(ValidationError::NotAbsolute(file.clone()));
        }
        let metadata = std::fs::metadata(file).map_err(|_| ValidationError::DoesNotExist(file.clone()))?;
        if !metadata.is_file() {
            return Err(ValidationError::DoesNotExist(file.clone()));
        }
        let readable = std::fs::File::open(file).is_ok();
        if !readable {
            return Err(ValidationError::NotReadable(file.clone()));
        }
    }

    if order.destination_id < 0 {
        return Err(ValidationError::NegativeDestinationId(order.destination_id));
    }

    let destination = match &order.destination_type {
        adi_domain::DestinationType::Dataset => DestinationRef::Dataset(order.destination_id),
        adi_domain::DestinationType::Screen => DestinationRef::Screen(order.destination_id),
        adi_domain::DestinationType::Other(other) => {
            return Err(ValidationError::UnknownDestinationType(other.clone()))
        }
    };

    if !gateway.user_exists(&order.user_name).await? {
        return Err(ValidationError::UnknownUser(order.user_name.clone()));
    }

    if !gateway.group_has_member(&order.group_name, &order.user_name).await? {
        // `group_has_member` collapses "group doesn't exist" and "user
        // isn't a member" into one false; spec.md §4.4 treats both as a
        // validator-level failure, so a single variant distinguishing
        // "not a member" is accurate enough for the audit message.
        return Err(ValidationError::NotGroupMember {
            user: order.user_name.clone(),
            group: order.group_name.clone(),
        });
    }

    Ok(ValidatedOrder {
        uuid: order.uuid,
        group_name: order.group_name.clone(),
        user_name: order.user_name.clone(),
        destination,
        files: order.files.clone(),
        preprocessing_id: order.preprocessing_id,
    })
}

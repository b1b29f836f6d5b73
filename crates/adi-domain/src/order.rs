use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::stage::Stage;

/// Where an import lands: a Dataset is targeted directly, a Screen is
/// targeted by importing as a Plate and linking it to the screen.
///
/// `Other` preserves whatever string a producer actually wrote. The queue
/// row is untyped until the Validator (adi-policies) looks at it (spec.md
/// §3's "Dynamic queue row" note): a row claiming `destination_type =
/// "Folder"` must still be claimable and parseable so the Validator — not
/// the persistence layer — is the one that fails it as `ORDER_INVALID`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DestinationType {
    Dataset,
    Screen,
    Other(String),
}

impl fmt::Display for DestinationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationType::Dataset => f.write_str("Dataset"),
            DestinationType::Screen => f.write_str("Screen"),
            DestinationType::Other(s) => f.write_str(s),
        }
    }
}

impl FromStr for DestinationType {
    type Err = DomainError;

    /// Infallible in practice: unrecognised strings become `Other` rather
    /// than an error, since rejecting them is the Validator's job.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Dataset" => DestinationType::Dataset,
            "Screen" => DestinationType::Screen,
            other => DestinationType::Other(other.to_string()),
        })
    }
}

/// Optional preprocessing configuration referenced by one or more `Order`s.
///
/// `extra_params` is a `BTreeMap` (not a `HashMap`) so that the `--key
/// value` flags the Preprocessor builds from it come out in a stable,
/// reproducible order across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preprocessing {
    pub id: i64,
    pub container: String,
    /// Template; the literal token `{Files}` is substituted with the
    /// current file path at dispatch time.
    pub input_file: String,
    /// Path inside the container that maps to shared storage.
    pub output_folder: PathBuf,
    /// Path inside the container that maps to fast local storage.
    pub alt_output_folder: PathBuf,
    pub extra_params: BTreeMap<String, String>,
}

impl Preprocessing {
    /// Substitutes `{Files}` in `input_file` with `file`.
    pub fn input_file_for(&self, file: &std::path::Path) -> String {
        self.input_file.replace("{Files}", &file.to_string_lossy())
    }
}

/// One row of the work queue: a request to import one or more files under a
/// given identity and destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub uuid: Uuid,
    pub group_name: String,
    pub user_name: String,
    pub destination_id: i64,
    pub destination_type: DestinationType,
    pub files: Vec<PathBuf>,
    pub stage: Stage,
    pub timestamp: DateTime<Utc>,
    pub preprocessing_id: Option<i64>,
}

impl Order {
    /// Basic shape checks that don't require touching the filesystem or the
    /// repository; the full Validator (adi-policies) builds on top of this.
    pub fn has_well_formed_shape(&self) -> Result<(), DomainError> {
        if self.files.is_empty() {
            return Err(DomainError::NoFiles);
        }
        if self.destination_id < 0 {
            return Err(DomainError::NegativeDestinationId(self.destination_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        Order {
            uuid: Uuid::new_v4(),
            group_name: "Demo".into(),
            user_name: "researcher".into(),
            destination_id: 151,
            destination_type: DestinationType::Dataset,
            files: vec![PathBuf::from("/data/g/x.tif")],
            stage: Stage::ImportPending,
            timestamp: Utc::now(),
            preprocessing_id: None,
        }
    }

    #[test]
    fn destination_type_round_trips() {
        assert_eq!(DestinationType::Dataset.to_string(), "Dataset");
        assert_eq!("Dataset".parse::<DestinationType>().unwrap(), DestinationType::Dataset);
        assert_eq!("Screen".parse::<DestinationType>().unwrap(), DestinationType::Screen);
        assert_eq!(
            "Folder".parse::<DestinationType>().unwrap(),
            DestinationType::Other("Folder".into())
        );
    }

    #[test]
    fn rejects_empty_file_list() {
        let mut o = sample_order();
        o.files.clear();
        assert!(matches!(o.has_well_formed_shape(), Err(DomainError::NoFiles)));
    }

    #[test]
    fn rejects_negative_destination_id() {
        let mut o = sample_order();
        o.destination_id = -1;
        assert!(matches!(
            o.has_well_formed_shape(),
            Err(DomainError::NegativeDestinationId(-1))
        ));
    }

    #[test]
    fn substitutes_files_token() {
        let pp = Preprocessing {
            id: 1,
            container: "conv:latest".into(),
            input_file: "/in/{Files}".into(),
            output_folder: PathBuf::from("/data"),
            alt_output_folder: PathBuf::from("/out"),
            extra_params: BTreeMap::new(),
        };
        assert_eq!(pp.input_file_for(&PathBuf::from("plate.db")), "/in/plate.db");
    }
}

//! Importer (component F).
//!
//! Invokes the repository's import CLI, parses the returned identifiers,
//! rewires the managed symlinks onto shared storage when preprocessing
//! ran, and attaches metadata — spec.md §4.6.

use std::path::{Path, PathBuf};
use std::time::Duration;

use uuid::Uuid;

use adi_domain::Preprocessing;
use adi_policies::ValidatedOrder;
use adi_providers::{ImportInvocation, OmeroGateway};

use crate::error::ImportError;
use crate::preprocessor::PreprocessedOrder;

#[derive(Debug, Clone)]
pub struct ImporterConfig {
    pub parallel_upload: u32,
    pub parallel_fileset: u32,
    pub skip_checksum: bool,
    pub skip_minmax: bool,
    pub skip_thumbnails: bool,
    pub skip_upgrade: bool,
    pub skip_all: bool,
    pub use_register_zarr: bool,
    pub session_ttl: Duration,
    pub logs_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ImportReport {
    pub identifiers: Vec<String>,
}

pub struct Importer<G: OmeroGateway> {
    gateway: G,
    config: ImporterConfig,
}

impl<G: OmeroGateway> Importer<G> {
    pub fn new(gateway: G, config: ImporterConfig) -> Self {
        Self { gateway, config }
    }

    /// Runs the full import pipeline for one validated (and optionally
    /// preprocessed) order. `preprocessing` carries the `alt_output_folder`
    /// needed to locate the staging directory to clean up; it's `None`
    /// when the order carries no preprocessing configuration.
    pub async fn import(
        &self,
        validated: &ValidatedOrder,
        preprocessing: Option<(&Preprocessing, &PreprocessedOrder)>,
    ) -> Result<ImportReport, ImportError> {
        let session = self
            .gateway
            .open_session(&validated.user_name, &validated.group_name, self.config.session_ttl)
            .await?;

        if !self.gateway.destination_exists(validated.destination).await? {
            return Err(ImportError::DestinationNotFound);
        }

        let inputs: Vec<PathBuf> = match preprocessing {
            Some((_, processed)) => processed.files.iter().map(|f| f.alt_path.clone()).collect(),
            None => validated.files.clone(),
        };

        let invocation = ImportInvocation {
            destination: validated.destination,
            inputs,
            parallel_upload: self.config.parallel_upload,
            parallel_fileset: self.config.parallel_fileset,
            skip_checksum: self.config.skip_checksum,
            skip_minmax: self.config.skip_minmax,
            skip_thumbnails: self.config.skip_thumbnails,
            skip_upgrade: self.config.skip_upgrade,
            skip_all: self.config.skip_all,
            use_register_zarr: self.config.use_register_zarr,
            log_path: self.config.logs_dir.join(format!("cli.{}.logs", validated.uuid)),
            err_path: self.config.logs_dir.join(format!("cli.{}.errs", validated.uuid)),
        };

        let outcome = self.gateway.import(&session, invocation).await?;
        if outcome.identifiers.is_empty() {
            return Err(ImportError::NoIdentifiers);
        }

        if let Some((pp, processed)) = preprocessing {
            self.rewire_and_cleanup(validated.uuid, pp, processed, &outcome.identifiers).await?;
        }

        self.attach_metadata(validated, preprocessing, &outcome.identifiers).await?;

        Ok(ImportReport { identifiers: outcome.identifiers })
    }

    async fn rewire_and_cleanup(
        &self,
        uuid: Uuid,
        preprocessing: &Preprocessing,
        processed: &PreprocessedOrder,
        identifiers: &[String],
    ) -> Result<(), ImportError> {
        for identifier in identifiers {
            let symlinks = self
                .gateway
                .managed_symlinks_under(identifier, &preprocessing.alt_output_folder)
                .await?;

            for symlink in symlinks {
                let matching = processed
                    .files
                    .iter()
                    .find(|f| f.alt_path == symlink.current_target || symlink.current_target.ends_with(&f.alt_path));
                let Some(matching) = matching else {
                    return Err(ImportError::RewireFailed(format!(
                        "no full_path mapping for managed symlink {}",
                        symlink.symlink_path.display()
                    )));
                };
                rewire_symlink(&symlink.symlink_path, &matching.full_path).await?;
            }
        }

        let staging_dir = preprocessing.alt_output_folder.join(uuid.to_string());
        if tokio::fs::try_exists(&staging_dir).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&staging_dir).await?;
        }
        Ok(())
    }

    async fn attach_metadata(
        &self,
        validated: &ValidatedOrder,
        preprocessing: Option<(&Preprocessing, &PreprocessedOrder)>,
        identifiers: &[String],
    ) -> Result<(), ImportError> {
        let mut merged: Vec<(String, String)> = Vec::new();

        // spec.md §4.6 step 6 checks both the file's own directory and its
        // `.processed/` subdirectory, unconditionally — not one or the
        // other depending on whether preprocessing ran.
        let mut candidate_dirs: Vec<PathBuf> = Vec::new();
        for file in &validated.files {
            if let Some(dir) = file.parent() {
                candidate_dirs.push(dir.to_path_buf());
                candidate_dirs.push(dir.join(".processed"));
            }
        }
        if let Some((_, processed)) = preprocessing {
            for file in &processed.files {
                if let Some(dir) = file.full_path.parent() {
                    candidate_dirs.push(dir.to_path_buf());
                    candidate_dirs.push(dir.join(".processed"));
                }
            }
        }

        let mut seen_dirs = std::collections::HashSet::new();
        for dir in candidate_dirs {
            if !seen_dirs.insert(dir.clone()) {
                continue;
            }
            if let Some(pairs) = read_metadata_csv(&dir.join("metadata.csv")).await {
                merged.extend(pairs);
            }
        }

        if let Some((_, processed)) = preprocessing {
            for file in &processed.files {
                merged.extend(file.keyvalues.iter().cloned());
            }
        }

        for identifier in identifiers {
            self.gateway.attach_keyvalues(identifier, &merged).await?;
        }
        Ok(())
    }
}

/// Replaces a managed symlink via create-new-then-rename, never
/// unlink-then-create, so the repository never observes a broken link
/// (spec.md §9).
async fn rewire_symlink(symlink_path: &Path, new_target: &Path) -> Result<(), ImportError> {
    let file_name = symlink_path
        .file_name()
        .ok_or_else(|| ImportError::RewireFailed(format!("not a file path: {}", symlink_path.display())))?;
    let tmp_path = symlink_path
        .parent()
        .map(|p| p.join(format!(".{}.adi-tmp", file_name.to_string_lossy())))
        .ok_or_else(|| ImportError::RewireFailed(format!("no parent dir: {}", symlink_path.display())))?;

    let _ = tokio::fs::remove_file(&tmp_path).await;
    std::os::unix::fs::symlink(new_target, &tmp_path)?;
    tokio::fs::rename(&tmp_path, symlink_path).await?;
    Ok(())
}

/// Parses `metadata.csv` (`key,value`, first row a header) if it exists.
/// Returns `None` when the file is absent, matching the "if a metadata.csv
/// exists" condition in spec.md §4.6.
async fn read_metadata_csv(path: &Path) -> Option<Vec<(String, String)>> {
    let bytes = tokio::fs::read(path).await.ok()?;
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(bytes.as_slice());
    let mut pairs = Vec::new();
    for record in reader.records().flatten() {
        if record.len() >= 2 {
            pairs.push((record[0].to_string(), record[1].to_string()));
        }
    }
    Some(pairs)
}

//! Preprocessor (component E).
//!
//! Runs a container once per file in a validated order's `files`, parses
//! its structured tail output (falling back to a directory scan of
//! `alt_output_folder` when the tail can't be parsed), and returns the
//! triples the Importer consumes in place of the order's original files
//! (spec.md §4.5).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use uuid::Uuid;

use adi_domain::Preprocessing;
use adi_providers::{BindMount, ContainerInvocation, ContainerRuntime};

use crate::error::PreprocessError;

/// One element of the container's structured tail-JSON output (spec.md
/// §4.5's "Structured tail format").
#[derive(Debug, Deserialize)]
struct TailEntry {
    #[allow(dead_code)]
    name: Option<String>,
    full_path: String,
    alt_path: String,
    #[serde(default)]
    keyvalues: Vec<BTreeMap<String, String>>,
}

/// One file the preprocessor produced: `alt_path` is what the Importer
/// uploads from, `full_path` is where the post-import symlink will
/// eventually point, `keyvalues` are annotations to attach to the
/// resulting image.
#[derive(Debug, Clone)]
pub struct PreprocessedFile {
    pub alt_path: PathBuf,
    pub full_path: PathBuf,
    pub keyvalues: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct PreprocessedOrder {
    pub files: Vec<PreprocessedFile>,
}

pub struct Preprocessor<R: ContainerRuntime> {
    runtime: R,
    /// Executable name for the container runtime (`podman`, `docker`, ...).
    runtime_binary: String,
    /// `PODMAN_USERNS_MODE` or equivalent, forwarded as container env for
    /// user-namespace mapping (spec.md §4.5 step 2).
    userns_mode: Option<String>,
    logs_dir: PathBuf,
}

impl<R: ContainerRuntime> Preprocessor<R> {
    pub fn new(runtime: R, runtime_binary: String, userns_mode: Option<String>, logs_dir: PathBuf) -> Self {
        Self { runtime, runtime_binary, userns_mode, logs_dir }
    }

    /// Runs preprocessing for every file in `files`, per spec.md §4.5.
    pub async fn run(
        &self,
        uuid: Uuid,
        files: &[PathBuf],
        preprocessing: &Preprocessing,
    ) -> Result<PreprocessedOrder, PreprocessError> {
        let local_root = preprocessing.alt_output_folder.join(uuid.to_string());
        let mut out = PreprocessedOrder::default();

        for (index, file) in files.iter().enumerate() {
            let shared_dest = file
                .parent()
                .map(|p| p.join(".processed"))
                .unwrap_or_else(|| PathBuf::from(".processed"));

            let invocation = self.build_invocation(uuid, index, file, preprocessing, &shared_dest, &local_root);
            let captured = self.runtime.run(invocation).await?;
            if !captured.status_success {
                return Err(PreprocessError::NonZeroExit(captured.status_code));
            }

            let entries = match parse_tail(&captured.stdout, &shared_dest) {
                Some(entries) => entries,
                None => scan_fallback(&local_root, &shared_dest).await?,
            };
            out.files.extend(entries);
        }

        if out.files.is_empty() {
            return Err(PreprocessError::NoUsableFiles {
                alt_output_folder: preprocessing.alt_output_folder.clone(),
            });
        }

        Ok(out)
    }

    fn build_invocation(
        &self,
        uuid: Uuid,
        index: usize,
        file: &Path,
        preprocessing: &Preprocessing,
        shared_dest: &Path,
        local_root: &Path,
    ) -> ContainerInvocation {
        let mut env = Vec::new();
        if let Some(mode) = &self.userns_mode {
            env.push(("PODMAN_USERNS_MODE".to_string(), mode.clone()));
        }

        let mut args = Vec::new();
        for (key, value) in &preprocessing.extra_params {
            args.push(format!("--{key}"));
            args.push(value.clone());
        }
        args.push("--inputfile".to_string());
        args.push(preprocessing.input_file_for(file));
        args.push("--outputfolder".to_string());
        args.push(preprocessing.output_folder.to_string_lossy().into_owned());

        ContainerInvocation {
            runtime: self.runtime_binary.clone(),
            image: preprocessing.container.clone(),
            binds: vec![
                BindMount {
                    host_path: shared_dest.to_path_buf(),
                    container_path: preprocessing.output_folder.clone(),
                },
                BindMount {
                    host_path: local_root.to_path_buf(),
                    container_path: preprocessing.alt_output_folder.clone(),
                },
            ],
            env,
            args,
            stdout_log_path: self.logs_dir.join(format!("preprocess.{uuid}.{index}.logs")),
            stderr_log_path: self.logs_dir.join(format!("preprocess.{uuid}.{index}.errs")),
        }
    }
}

/// Parses the last non-empty line of `stdout` as a JSON array of
/// `TailEntry`. `None` means the line couldn't be parsed as such a
/// sequence at all — the caller falls back to a directory scan only in
/// that case. A successfully-parsed empty array is `Some(vec![])`, a
/// container's explicit "nothing to import" signal, and must not be
/// overridden by stale files left in `alt_output_folder`.
fn parse_tail(stdout: &str, shared_dest: &Path) -> Option<Vec<PreprocessedFile>> {
    let last_line = stdout.lines().rev().find(|line| !line.trim().is_empty())?;

    let entries = serde_json::from_str::<Vec<TailEntry>>(last_line.trim()).ok()?;

    Some(
        entries
            .into_iter()
            .map(|entry| {
                let full_path = PathBuf::from(&entry.full_path);
                let full_path = if full_path.is_absolute() { full_path } else { shared_dest.join(full_path) };
                let keyvalues =
                    entry.keyvalues.into_iter().flat_map(|map| map.into_iter()).collect();
                PreprocessedFile { alt_path: PathBuf::from(entry.alt_path), full_path, keyvalues }
            })
            .collect(),
    )
}

/// Directory-scan fallback (spec.md §4.5 step 4): every regular file under
/// `local_root`, mirrored onto `shared_dest` by relative path. No
/// `keyvalues` are available from a bare scan.
async fn scan_fallback(
    local_root: &Path,
    shared_dest: &Path,
) -> Result<Vec<PreprocessedFile>, PreprocessError> {
    let mut found = Vec::new();
    if !tokio::fs::try_exists(local_root).await.unwrap_or(false) {
        return Ok(found);
    }

    let mut stack = vec![local_root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                stack.push(path);
                continue;
            }
            let relative = path.strip_prefix(local_root).unwrap_or(&path);
            found.push(PreprocessedFile {
                alt_path: path.clone(),
                full_path: shared_dest.join(relative),
                keyvalues: Vec::new(),
            });
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use adi_providers::CapturedOutput;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeRuntime {
        stdout: String,
        status_success: bool,
        invocations: Mutex<Vec<ContainerInvocation>>,
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn run(
            &self,
            invocation: ContainerInvocation,
        ) -> Result<CapturedOutput, adi_providers::ProviderError> {
            self.invocations.lock().unwrap().push(invocation);
            Ok(CapturedOutput {
                stdout: self.stdout.clone(),
                status_success: self.status_success,
                status_code: if self.status_success { Some(0) } else { Some(1) },
            })
        }
    }

    fn preprocessing(tmp: &Path) -> Preprocessing {
        Preprocessing {
            id: 1,
            container: "conv:latest".into(),
            input_file: "{Files}".into(),
            output_folder: PathBuf::from("/data"),
            alt_output_folder: tmp.join("alt"),
            extra_params: BTreeMap::from([("saveoption".to_string(), "single".to_string())]),
        }
    }

    #[tokio::test]
    async fn parses_structured_tail_output() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("plate.db");
        std::fs::write(&src, b"x").unwrap();

        let stdout = format!(
            r#"garbage line
[{{"name":"plate","full_path":"plate.ome.tiff","alt_path":"{}/out.tiff","keyvalues":[{{"k1":"v1"}}]}}]"#,
            tmp.path().display()
        );
        let runtime =
            FakeRuntime { stdout, status_success: true, invocations: Mutex::new(Vec::new()) };
        let pp = Preprocessor::new(runtime, "podman".into(), None, tmp.path().to_path_buf());

        let result = pp.run(Uuid::new_v4(), &[src.clone()], &preprocessing(tmp.path())).await.unwrap();
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].full_path, src.parent().unwrap().join(".processed/plate.ome.tiff"));
        assert_eq!(result.files[0].keyvalues, vec![("k1".to_string(), "v1".to_string())]);
    }

    #[tokio::test]
    async fn falls_back_to_directory_scan_when_tail_is_unparseable() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("plate.db");
        std::fs::write(&src, b"x").unwrap();

        let uuid = Uuid::new_v4();
        let alt_root = tmp.path().join("alt").join(uuid.to_string());
        std::fs::create_dir_all(&alt_root).unwrap();
        std::fs::write(alt_root.join("out.tiff"), b"y").unwrap();

        let runtime = FakeRuntime {
            stdout: "not json at all".into(),
            status_success: true,
            invocations: Mutex::new(Vec::new()),
        };
        let pp = Preprocessor::new(runtime, "podman".into(), None, tmp.path().to_path_buf());

        let result = pp.run(uuid, &[src], &preprocessing(tmp.path())).await.unwrap();
        assert_eq!(result.files.len(), 1);
        assert!(result.files[0].alt_path.ends_with("out.tiff"));
    }

    #[tokio::test]
    async fn fails_when_nothing_usable_is_produced() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("plate.db");
        std::fs::write(&src, b"x").unwrap();

        let runtime =
            FakeRuntime { stdout: "[]".into(), status_success: true, invocations: Mutex::new(Vec::new()) };
        let pp = Preprocessor::new(runtime, "podman".into(), None, tmp.path().to_path_buf());

        let err = pp.run(Uuid::new_v4(), &[src], &preprocessing(tmp.path())).await.unwrap_err();
        assert!(matches!(err, PreprocessError::NoUsableFiles { .. }));
    }

    #[tokio::test]
    async fn a_valid_empty_tail_array_is_not_overridden_by_stale_scan_results() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("plate.db");
        std::fs::write(&src, b"x").unwrap();

        // Stale files left behind in alt_output_folder from a prior run.
        let uuid = Uuid::new_v4();
        let alt_root = tmp.path().join("alt").join(uuid.to_string());
        std::fs::create_dir_all(&alt_root).unwrap();
        std::fs::write(alt_root.join("stale.tiff"), b"y").unwrap();

        let runtime =
            FakeRuntime { stdout: "[]".into(), status_success: true, invocations: Mutex::new(Vec::new()) };
        let pp = Preprocessor::new(runtime, "podman".into(), None, tmp.path().to_path_buf());

        // A successfully-parsed empty array means "nothing to import", not
        // "fall back to scanning alt_output_folder" — the stale file must
        // not surface as a result, and the order fails as having produced
        // no usable files.
        let err = pp.run(uuid, &[src], &preprocessing(tmp.path())).await.unwrap_err();
        assert!(matches!(err, PreprocessError::NoUsableFiles { .. }));
    }

    #[tokio::test]
    async fn fails_on_non_zero_exit() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("plate.db");
        std::fs::write(&src, b"x").unwrap();

        let runtime =
            FakeRuntime { stdout: String::new(), status_success: false, invocations: Mutex::new(Vec::new()) };
        let pp = Preprocessor::new(runtime, "podman".into(), None, tmp.path().to_path_buf());

        let err = pp.run(Uuid::new_v4(), &[src], &preprocessing(tmp.path())).await.unwrap_err();
        assert!(matches!(err, PreprocessError::NonZeroExit(_)));
    }
}

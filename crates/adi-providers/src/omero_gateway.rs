//! `OmeroGateway`: the image repository reached via a login/session API, an
//! import CLI, and a filesystem tree it manages (spec.md §1's black-box
//! framing). The CLI-backed implementation shells out to the `omero` CLI
//! the way `CliContainerRuntime` shells out to the container runtime —
//! same orchestration shape, different external program.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestinationRef {
    Dataset(i64),
    Screen(i64),
}

/// Bound to a user/group for the duration of one import; the service's
/// root credentials sudo into `user_name` (spec.md §4.6 step 1).
pub struct SessionHandle {
    pub user_name: String,
    pub group_name: String,
}

#[derive(Debug, Clone)]
pub struct ImportInvocation {
    pub destination: DestinationRef,
    pub inputs: Vec<PathBuf>,
    pub parallel_upload: u32,
    pub parallel_fileset: u32,
    pub skip_checksum: bool,
    pub skip_minmax: bool,
    pub skip_thumbnails: bool,
    pub skip_upgrade: bool,
    pub skip_all: bool,
    pub use_register_zarr: bool,
    pub log_path: PathBuf,
    pub err_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub identifiers: Vec<String>,
}

/// One symlink the repository manages for an imported object, discovered
/// by walking the managed tree (spec.md §4.6 step 5).
#[derive(Debug, Clone)]
pub struct ManagedSymlink {
    pub symlink_path: PathBuf,
    pub current_target: PathBuf,
}

#[async_trait]
pub trait OmeroGateway: Send + Sync {
    async fn user_exists(&self, user_name: &str) -> Result<bool, ProviderError>;
    async fn group_has_member(&self, group_name: &str, user_name: &str) -> Result<bool, ProviderError>;
    async fn destination_exists(&self, destination: DestinationRef) -> Result<bool, ProviderError>;

    async fn open_session(
        &self,
        user_name: &str,
        group_name: &str,
        ttl: Duration,
    ) -> Result<SessionHandle, ProviderError>;

    async fn import(
        &self,
        session: &SessionHandle,
        invocation: ImportInvocation,
    ) -> Result<ImportOutcome, ProviderError>;

    /// Every managed symlink under `alt_output_folder` for `identifier`.
    async fn managed_symlinks_under(
        &self,
        identifier: &str,
        alt_output_folder: &Path,
    ) -> Result<Vec<ManagedSymlink>, ProviderError>;

    /// Attach a flat key/value annotation map to the imported object.
    async fn attach_keyvalues(
        &self,
        identifier: &str,
        keyvalues: &[(String, String)],
    ) -> Result<(), ProviderError>;
}

#[async_trait]
impl<T: OmeroGateway + ?Sized> OmeroGateway for std::sync::Arc<T> {
    async fn user_exists(&self, user_name: &str) -> Result<bool, ProviderError> {
        (**self).user_exists(user_name).await
    }

    async fn group_has_member(&self, group_name: &str, user_name: &str) -> Result<bool, ProviderError> {
        (**self).group_has_member(group_name, user_name).await
    }

    async fn destination_exists(&self, destination: DestinationRef) -> Result<bool, ProviderError> {
        (**self).destination_exists(destination).await
    }

    async fn open_session(
        &self,
        user_name: &str,
        group_name: &str,
        ttl: Duration,
    ) -> Result<SessionHandle, ProviderError> {
        (**self).open_session(user_name, group_name, ttl).await
    }

    async fn import(
        &self,
        session: &SessionHandle,
        invocation: ImportInvocation,
    ) -> Result<ImportOutcome, ProviderError> {
        (**self).import(session, invocation).await
    }

    async fn managed_symlinks_under(
        &self,
        identifier: &str,
        alt_output_folder: &Path,
    ) -> Result<Vec<ManagedSymlink>, ProviderError> {
        (**self).managed_symlinks_under(identifier, alt_output_folder).await
    }

    async fn attach_keyvalues(
        &self,
        identifier: &str,
        keyvalues: &[(String, String)],
    ) -> Result<(), ProviderError> {
        (**self).attach_keyvalues(identifier, keyvalues).await
    }
}

/// Talks to the `omero` CLI: `omero login`, `omero import`, plus
/// filesystem inspection of the managed tree the CLI writes into.
pub struct CliOmeroGateway {
    host: String,
    user: String,
    password: String,
    port: u16,
    managed_root: PathBuf,
}

impl CliOmeroGateway {
    pub fn new(host: String, user: String, password: String, port: u16, managed_root: PathBuf) -> Self {
        Self { host, user, password, port, managed_root }
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new("omero");
        cmd.env("OMERO_HOST", &self.host)
            .env("OMERO_USER", &self.user)
            .env("OMERO_PASSWORD", &self.password)
            .env("OMERO_PORT", self.port.to_string());
        cmd
    }
}

#[async_trait]
impl OmeroGateway for CliOmeroGateway {
    async fn user_exists(&self, user_name: &str) -> Result<bool, ProviderError> {
        let output = self
            .base_command()
            .args(["user", "info", user_name])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ProviderError::Spawn { program: "omero".into(), source })?;
        Ok(output.status.success())
    }

    async fn group_has_member(&self, group_name: &str, user_name: &str) -> Result<bool, ProviderError> {
        let output = self
            .base_command()
            .args(["group", "listmembers", group_name])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ProviderError::Spawn { program: "omero".into(), source })?;
        if !output.status.success() {
            return Ok(false);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().any(|line| line.trim() == user_name))
    }

    async fn destination_exists(&self, destination: DestinationRef) -> Result<bool, ProviderError> {
        let (kind, id) = match destination {
            DestinationRef::Dataset(id) => ("Dataset", id),
            DestinationRef::Screen(id) => ("Screen", id),
        };
        let output = self
            .base_command()
            .args(["obj", "show", &format!("{kind}:{id}")])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ProviderError::Spawn { program: "omero".into(), source })?;
        Ok(output.status.success())
    }

    async fn open_session(
        &self,
        user_name: &str,
        group_name: &str,
        _ttl: Duration,
    ) -> Result<SessionHandle, ProviderError> {
        let output = self
            .base_command()
            .args(["login", "--sudo", user_name, "-g", group_name, "-w"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ProviderError::Spawn { program: "omero".into(), source })?;
        if !output.status.success() {
            return Err(ProviderError::Session(format!(
                "login failed for {user_name}@{group_name}: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(SessionHandle { user_name: user_name.to_string(), group_name: group_name.to_string() })
    }

    async fn import(
        &self,
        session: &SessionHandle,
        invocation: ImportInvocation,
    ) -> Result<ImportOutcome, ProviderError> {
        let mut cmd = self.base_command();
        cmd.arg("import");
        cmd.args(["--sudo", &session.user_name, "-g", &session.group_name]);
        cmd.args(["--transfer", "ln_s"]);
        match invocation.destination {
            DestinationRef::Dataset(id) => {
                cmd.args(["-d", &id.to_string()]);
            }
            DestinationRef::Screen(id) => {
                cmd.args(["--screen", &id.to_string()]);
            }
        }
        cmd.args(["--parallel-upload", &invocation.parallel_upload.to_string()]);
        cmd.args(["--parallel-fileset", &invocation.parallel_fileset.to_string()]);
        if invocation.skip_all {
            cmd.args(["--skip", "all"]);
        } else {
            if invocation.skip_checksum {
                cmd.args(["--skip", "checksum"]);
            }
            if invocation.skip_minmax {
                cmd.args(["--skip", "minmax"]);
            }
            if invocation.skip_thumbnails {
                cmd.args(["--skip", "thumbnails"]);
            }
            if invocation.skip_upgrade {
                cmd.args(["--skip", "upgrade"]);
            }
        }
        if invocation.use_register_zarr {
            cmd.arg("--register-zarr");
        }
        for input in &invocation.inputs {
            cmd.arg(input);
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = cmd
            .spawn()
            .map_err(|source| ProviderError::Spawn { program: "omero".into(), source })?
            .wait_with_output()
            .await
            .map_err(|source| ProviderError::Spawn { program: "omero".into(), source })?;

        write_log(&invocation.log_path, &output.stdout).await?;
        write_log(&invocation.err_path, &output.stderr).await?;

        if !output.status.success() {
            return Err(ProviderError::NonZeroExit {
                program: "omero import".into(),
                status: output.status.code().unwrap_or(-1),
                stderr_path: invocation.err_path.clone(),
            });
        }

        let identifiers: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        Ok(ImportOutcome { identifiers })
    }

    async fn managed_symlinks_under(
        &self,
        identifier: &str,
        alt_output_folder: &Path,
    ) -> Result<Vec<ManagedSymlink>, ProviderError> {
        let mut found = Vec::new();
        let object_root = self.managed_root.join(identifier);
        if !object_root.exists() {
            return Ok(found);
        }
        let mut stack = vec![object_root];
        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(path);
                    continue;
                }
                if file_type.is_symlink() {
                    let target = tokio::fs::read_link(&path).await?;
                    if target.starts_with(alt_output_folder) {
                        found.push(ManagedSymlink { symlink_path: path, current_target: target });
                    }
                }
            }
        }
        Ok(found)
    }

    async fn attach_keyvalues(
        &self,
        identifier: &str,
        keyvalues: &[(String, String)],
    ) -> Result<(), ProviderError> {
        if keyvalues.is_empty() {
            return Ok(());
        }
        let mut cmd = self.base_command();
        cmd.args(["metadata", "populate", identifier]);
        for (key, value) in keyvalues {
            cmd.arg(format!("{key}={value}"));
        }
        let output = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ProviderError::Spawn { program: "omero".into(), source })?;
        if !output.status.success() {
            return Err(ProviderError::MalformedOutput {
                program: "omero metadata populate".into(),
                reason: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }
}

async fn write_log(path: &Path, bytes: &[u8]) -> Result<(), ProviderError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = File::create(path).await?;
    file.write_all(bytes).await?;
    Ok(())
}

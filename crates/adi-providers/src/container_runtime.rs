//! `ContainerRuntime`: the preprocessing container invoked as an opaque
//! command (spec.md §1's "container runtime ... invoked as an opaque
//! command"). Modeled as a command value per spec.md §9's subprocess
//! orchestration note: executable + argv + env + mounts, captured rather
//! than piped through the daemon's own logger.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::ProviderError;

#[derive(Debug, Clone)]
pub struct BindMount {
    pub host_path: PathBuf,
    pub container_path: PathBuf,
}

/// One preprocessing container invocation. Built fresh per input file
/// (spec.md §4.5 step 2 runs once per file in `files`).
#[derive(Debug, Clone)]
pub struct ContainerInvocation {
    pub runtime: String,
    pub image: String,
    pub binds: Vec<BindMount>,
    pub env: Vec<(String, String)>,
    pub args: Vec<String>,
    pub stdout_log_path: PathBuf,
    pub stderr_log_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub stdout: String,
    pub status_success: bool,
    pub status_code: Option<i32>,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn run(&self, invocation: ContainerInvocation) -> Result<CapturedOutput, ProviderError>;
}

#[async_trait]
impl<T: ContainerRuntime + ?Sized> ContainerRuntime for std::sync::Arc<T> {
    async fn run(&self, invocation: ContainerInvocation) -> Result<CapturedOutput, ProviderError> {
        (**self).run(invocation).await
    }
}

/// `podman run --rm` / `docker run --rm` via `tokio::process::Command`.
/// Which binary to exec is `runtime` on the invocation itself, so a single
/// `CliContainerRuntime` serves both.
pub struct CliContainerRuntime;

impl CliContainerRuntime {
    pub fn new() -> Self {
        Self
    }

    fn build_command(invocation: &ContainerInvocation) -> Command {
        let mut cmd = Command::new(&invocation.runtime);
        cmd.arg("run").arg("--rm");
        for bind in &invocation.binds {
            cmd.arg("-v").arg(format!(
                "{}:{}",
                bind.host_path.display(),
                bind.container_path.display()
            ));
        }
        for (key, value) in &invocation.env {
            cmd.arg("-e").arg(format!("{key}={value}"));
        }
        cmd.arg(&invocation.image);
        cmd.args(&invocation.args);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd
    }
}

impl Default for CliContainerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for CliContainerRuntime {
    async fn run(&self, invocation: ContainerInvocation) -> Result<CapturedOutput, ProviderError> {
        let program = invocation.runtime.clone();
        let stdout_log_path = invocation.stdout_log_path.clone();
        let stderr_log_path = invocation.stderr_log_path.clone();

        let child = Self::build_command(&invocation)
            .spawn()
            .map_err(|source| ProviderError::Spawn { program: program.clone(), source })?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| ProviderError::Spawn { program: program.clone(), source })?;

        write_log(&stdout_log_path, &output.stdout).await?;
        write_log(&stderr_log_path, &output.stderr).await?;

        Ok(CapturedOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            status_success: output.status.success(),
            status_code: output.status.code(),
        })
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

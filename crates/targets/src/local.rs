//! Local process target (§4.3): runs a task as a child process on the
//! engine host. `env_clear()` plus explicit injection keeps the child's
//! environment exactly the resolved task env, with shell-vs-direct dispatch
//! and output capture driven by `tokio::select!` against a cancellation
//! token so a timeout or pipeline cancel can kill the child rather than only
//! being observed after it exits.
//!
//! Storage is filesystem-local: `copy_artifact` is a plain file copy and
//! `create_volume` provisions a plain directory under the workspace.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use sykli_secrets::{TargetSecretLookup, TargetSecrets};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::error::{Result, TargetError};
use crate::spec::{ExecutionOutcome, TaskSpec, VolumeHandle, VolumeOptions};
use crate::Target;

const DEFAULT_SHELL: &str = "/bin/sh";

pub struct LocalTarget {
    workspace_root: PathBuf,
    shell_path: String,
}

impl LocalTarget {
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self { workspace_root: workspace_root.into(), shell_path: DEFAULT_SHELL.to_string() }
    }

    #[must_use]
    pub fn with_shell(workspace_root: impl Into<PathBuf>, shell_path: impl Into<String>) -> Self {
        Self { workspace_root: workspace_root.into(), shell_path: shell_path.into() }
    }

    fn build_command(&self, spec: &TaskSpec) -> Command {
        let mut cmd = Command::new(&self.shell_path);
        cmd.arg("-c").arg(&spec.command);
        cmd.current_dir(&spec.workdir);
        cmd.env_clear();
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }
        if let Ok(path) = std::env::var("PATH") {
            cmd.env("PATH", path);
        }
        if let Ok(home) = std::env::var("HOME") {
            cmd.env("HOME", home);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }
}

#[async_trait]
impl Target for LocalTarget {
    fn name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip(self, spec, cancel), fields(task = %spec.name))]
    async fn run(&self, spec: &TaskSpec, cancel: CancellationToken) -> Result<ExecutionOutcome> {
        if spec.command.trim().is_empty() {
            return Err(TargetError::Exec {
                target: self.name(),
                task: spec.name.clone(),
                reason: "empty command".into(),
            });
        }

        let mut child = self
            .build_command(spec)
            .spawn()
            .map_err(|source| TargetError::Exec { target: self.name(), task: spec.name.clone(), reason: source.to_string() })?;

        info!(task = %spec.name, "starting local task");

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                Ok(ExecutionOutcome {
                    exit_status: -1,
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                    produced_outputs: Vec::new(),
                    timed_out: true,
                })
            }
            output = child.wait_with_output() => {
                let output = output.map_err(|source| TargetError::Exec {
                    target: self.name(),
                    task: spec.name.clone(),
                    reason: source.to_string(),
                })?;
                let exit_status = output.status.code().unwrap_or(-1);
                debug!(task = %spec.name, exit_status, "local task finished");

                Ok(ExecutionOutcome {
                    exit_status,
                    stdout: output.stdout,
                    stderr: output.stderr,
                    produced_outputs: Vec::new(),
                    timed_out: false,
                })
            }
        }
    }

    async fn create_volume(&self, name: &str, opts: VolumeOptions) -> Result<VolumeHandle> {
        let path = self.workspace_root.join("volumes").join(name);
        tokio::fs::create_dir_all(&path).await?;
        let _ = opts;
        Ok(VolumeHandle { name: name.to_string(), path: Some(path) })
    }

    async fn copy_artifact(&self, src: &Path, dst: &Path) -> Result<()> {
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(src, dst).await?;
        Ok(())
    }
}

impl TargetSecrets for LocalTarget {
    fn resolve(&self, name: &str) -> TargetSecretLookup {
        match std::env::var(name) {
            Ok(value) => TargetSecretLookup::Found(value),
            Err(_) => TargetSecretLookup::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn spec(command: &str, workdir: &Path) -> TaskSpec {
        TaskSpec {
            name: "t".into(),
            command: command.into(),
            container: None,
            workdir: workdir.to_path_buf(),
            env: Map::new(),
            mounts: vec![],
            cache_mounts: vec![],
            services: vec![],
            timeout: None,
            k8s: None,
        }
    }

    #[tokio::test]
    async fn runs_a_simple_command() {
        let dir = tempfile::tempdir().unwrap();
        let target = LocalTarget::new(dir.path());
        let outcome = target.run(&spec("echo hello", dir.path()), CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.exit_status, 0);
        assert!(String::from_utf8_lossy(&outcome.stdout).contains("hello"));
    }

    #[tokio::test]
    async fn reports_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let target = LocalTarget::new(dir.path());
        let outcome = target.run(&spec("exit 7", dir.path()), CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.exit_status, 7);
    }

    #[tokio::test]
    async fn env_is_injected_and_host_env_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let target = LocalTarget::new(dir.path());
        let mut s = spec("printenv MY_VAR", dir.path());
        s.env.insert("MY_VAR".to_string(), "test-value".to_string());
        let outcome = target.run(&s, CancellationToken::new()).await.unwrap();
        assert!(String::from_utf8_lossy(&outcome.stdout).contains("test-value"));
    }

    #[tokio::test]
    async fn cancellation_kills_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let target = LocalTarget::new(dir.path());
        let token = CancellationToken::new();
        let token2 = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            token2.cancel();
        });
        let outcome = target.run(&spec("sleep 30", dir.path()), token).await.unwrap();
        assert!(outcome.timed_out);
    }

    #[tokio::test]
    async fn copy_artifact_copies_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let target = LocalTarget::new(dir.path());
        let src = dir.path().join("src.txt");
        tokio::fs::write(&src, b"payload").await.unwrap();
        let dst = dir.path().join("nested").join("dst.txt");
        target.copy_artifact(&src, &dst).await.unwrap();
        assert_eq!(tokio::fs::read(&dst).await.unwrap(), b"payload");
    }

    #[test]
    fn secrets_read_from_process_env() {
        temp_env::with_var("SYKLI_LOCAL_SECRET_TEST", Some("shh"), || {
            let target = LocalTarget::new(".");
            assert_eq!(target.resolve("SYKLI_LOCAL_SECRET_TEST"), TargetSecretLookup::Found("shh".into()));
        });
    }
}

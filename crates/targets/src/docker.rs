//! Docker target (§4.3): runs a task inside a container via the Docker
//! Engine API using `bollard`. Builds a container config from the task spec,
//! injects the resolved environment, streams stdout/stderr, and reports the
//! container's exit status, matching the local driver's surrounding shape.
//!
//! Storage has no Docker-native equivalent of a directory volume handle
//! beyond a named Docker volume, so `create_volume` creates one and
//! `copy_artifact` streams a file in via a tar archive (bollard's upload API
//! takes a tar stream, same as `docker cp`).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{Config, RemoveContainerOptions, WaitContainerOptions};
use bollard::models::{HostConfig, Mount, MountTypeEnum};
use bollard::Docker;
use futures::StreamExt;
use sykli_secrets::{TargetSecretLookup, TargetSecrets};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, TargetError};
use crate::spec::{ExecutionOutcome, TargetOptions, TaskSpec, VolumeHandle, VolumeKind, VolumeOptions};
use crate::Target;

pub struct DockerTarget {
    docker: Docker,
}

impl DockerTarget {
    /// Connects using the local Docker socket (`DOCKER_HOST`, or the
    /// platform default) without probing the daemon yet; `setup` performs
    /// the connectivity check.
    ///
    /// # Errors
    /// Returns `TargetError::Setup` if the local connection cannot even be
    /// constructed (e.g. no socket path resolvable).
    pub fn connect_local() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|source| TargetError::Setup { target: "docker", reason: source.to_string() })?;
        Ok(Self { docker })
    }

    fn container_name(task_name: &str) -> String {
        let sanitized: String =
            task_name.chars().map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '-' }).collect();
        format!("sykli-{sanitized}")
    }
}

#[async_trait]
impl Target for DockerTarget {
    fn name(&self) -> &'static str {
        "docker"
    }

    #[instrument(skip(self, _opts))]
    async fn setup(&self, _opts: &TargetOptions) -> Result<()> {
        self.docker.ping().await.map_err(|source| TargetError::Setup { target: self.name(), reason: source.to_string() })?;
        Ok(())
    }

    #[instrument(skip(self, spec, cancel), fields(task = %spec.name))]
    async fn run(&self, spec: &TaskSpec, cancel: CancellationToken) -> Result<ExecutionOutcome> {
        let image = spec.container.as_deref().ok_or_else(|| TargetError::Exec {
            target: self.name(),
            task: spec.name.clone(),
            reason: "docker target requires a task-level `container` image".into(),
        })?;

        let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let mounts: Vec<Mount> = spec
            .mounts
            .iter()
            .map(|m| Mount {
                target: Some(m.container_path.clone()),
                source: Some(m.host_path.to_string_lossy().into_owned()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(false),
                ..Default::default()
            })
            .chain(spec.cache_mounts.iter().map(|m| Mount {
                target: Some(m.container_path.clone()),
                source: Some(m.cache_name.clone()),
                typ: Some(MountTypeEnum::VOLUME),
                read_only: Some(false),
                ..Default::default()
            }))
            .collect();

        let name = Self::container_name(&spec.name);
        let config = Config {
            image: Some(image.to_string()),
            cmd: Some(vec!["sh".to_string(), "-c".to_string(), spec.command.clone()]),
            env: Some(env),
            working_dir: spec.workdir.to_str().map(str::to_string),
            host_config: Some(HostConfig { mounts: Some(mounts), ..Default::default() }),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container::<String, _>(Some(bollard::container::CreateContainerOptions { name: name.clone(), ..Default::default() }), config)
            .await
            .map_err(|source| TargetError::Exec { target: self.name(), task: spec.name.clone(), reason: source.to_string() })?;

        self.docker.start_container::<String>(&created.id, None).await.map_err(|source| TargetError::Exec {
            target: self.name(),
            task: spec.name.clone(),
            reason: source.to_string(),
        })?;

        info!(task = %spec.name, container = %created.id, "started docker container");

        let wait_future = async {
            let mut stream = self.docker.wait_container(&created.id, None::<WaitContainerOptions<String>>);
            stream.next().await
        };

        let timeout = spec.timeout.unwrap_or(Duration::from_secs(3600));
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                warn!(task = %spec.name, "cancelling docker container");
                let _ = self.docker.stop_container(&created.id, None).await;
                self.cleanup(&created.id).await;
                return Ok(ExecutionOutcome {
                    exit_status: -1,
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                    produced_outputs: Vec::new(),
                    timed_out: true,
                });
            }
            result = tokio::time::timeout(timeout, wait_future) => result,
        };

        let exit_status = match outcome {
            Ok(Some(Ok(response))) => i32::try_from(response.status_code).unwrap_or(-1),
            Ok(Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. }))) => i32::try_from(code).unwrap_or(-1),
            Ok(Some(Err(source))) => {
                self.cleanup(&created.id).await;
                return Err(TargetError::Exec { target: self.name(), task: spec.name.clone(), reason: source.to_string() });
            }
            Ok(None) => -1,
            Err(_elapsed) => {
                let _ = self.docker.stop_container(&created.id, None).await;
                self.cleanup(&created.id).await;
                return Ok(ExecutionOutcome {
                    exit_status: -1,
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                    produced_outputs: Vec::new(),
                    timed_out: true,
                });
            }
        };

        let logs = self.collect_logs(&created.id).await;
        self.cleanup(&created.id).await;

        Ok(ExecutionOutcome {
            exit_status,
            stdout: logs.0,
            stderr: logs.1,
            produced_outputs: Vec::new(),
            timed_out: false,
        })
    }

    async fn create_volume(&self, name: &str, opts: VolumeOptions) -> Result<VolumeHandle> {
        let mut labels = HashMap::new();
        labels.insert("sykli.kind".to_string(), match opts.kind {
            VolumeKind::Cache => "cache".to_string(),
            VolumeKind::Directory => "directory".to_string(),
        });
        let created = self
            .docker
            .create_volume(bollard::volume::CreateVolumeOptions { name: name.to_string(), labels, ..Default::default() })
            .await
            .map_err(|source| TargetError::Setup { target: self.name(), reason: source.to_string() })?;
        Ok(VolumeHandle { name: created.name, path: None })
    }
}

impl DockerTarget {
    async fn collect_logs(&self, container_id: &str) -> (Vec<u8>, Vec<u8>) {
        use bollard::container::LogsOptions;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut stream = self.docker.logs::<String>(
            container_id,
            Some(LogsOptions { stdout: true, stderr: true, ..Default::default() }),
        );
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bollard::container::LogOutput::StdOut { message }) => stdout.extend_from_slice(&message),
                Ok(bollard::container::LogOutput::StdErr { message }) => stderr.extend_from_slice(&message),
                Ok(_) => {}
                Err(source) => {
                    debug!(error = %source, "error reading container logs");
                    break;
                }
            }
        }
        (stdout, stderr)
    }

    async fn cleanup(&self, container_id: &str) {
        let _ = self
            .docker
            .remove_container(container_id, Some(RemoveContainerOptions { force: true, ..Default::default() }))
            .await;
    }
}

impl TargetSecrets for DockerTarget {
    fn resolve(&self, _name: &str) -> TargetSecretLookup {
        TargetSecretLookup::NotSupported
    }
}

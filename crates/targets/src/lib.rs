//! Target driver capability sets (§4.3): local process, Docker, and
//! Kubernetes executors, plus the registry and "any" fallback that let the
//! scheduler address all three uniformly.
//!
//! Each driver is an explicit capability-set trait object rather than one
//! hardcoded executor, with a registry mapping target name -> constructor
//! (spec Design Notes "Protocol-dispatched targets").

mod any;
mod docker;
mod error;
mod k8s;
mod local;
mod registry;
mod spec;

pub use any::AnyTarget;
pub use docker::DockerTarget;
pub use error::{Result, TargetError};
pub use k8s::K8sTarget;
pub use local::LocalTarget;
pub use registry::Registry;
pub use spec::{
    CacheMountSpec, ExecutionOutcome, MountedInput, TargetOptions, TaskSpec, VolumeHandle, VolumeKind, VolumeOptions,
};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sykli_secrets::TargetSecrets;
use tokio_util::sync::CancellationToken;

/// An execution backend implementing the four capability sets in §4.3.
///
/// Every method except `name` carries a default "any" implementation:
/// lifecycle no-ops succeed, and execution/storage/secrets all answer
/// `not_supported`. A concrete driver overrides only what it meaningfully
/// implements; [`AnyTarget`] is the provided struct that overrides nothing.
#[async_trait]
pub trait Target: TargetSecrets {
    fn name(&self) -> &'static str;

    /// Called once before scheduling. Verifies connectivity and provisions
    /// shared resources (namespaces, networks).
    async fn setup(&self, _opts: &TargetOptions) -> Result<()> {
        Ok(())
    }

    /// Called exactly once after scheduling, success or failure.
    async fn teardown(&self) -> Result<()> {
        Ok(())
    }

    /// Runs one task to completion. `cancel` is observed cooperatively: a
    /// timeout or pipeline cancel signals it and the driver is expected to
    /// stop the underlying process/container and return promptly.
    async fn run(&self, spec: &TaskSpec, cancel: CancellationToken) -> Result<ExecutionOutcome> {
        let _ = (spec, cancel);
        Err(TargetError::NotSupported { target: self.name(), capability: "run" })
    }

    async fn create_volume(&self, _name: &str, _opts: VolumeOptions) -> Result<VolumeHandle> {
        Err(TargetError::NotSupported { target: self.name(), capability: "create_volume" })
    }

    /// Purely compositional by default: `"{task}/{artifact}"`.
    fn artifact_path(&self, task: &str, artifact: &str, workdir: &Path) -> PathBuf {
        workdir.join(task).join(artifact)
    }

    async fn copy_artifact(&self, _src: &Path, _dst: &Path) -> Result<()> {
        Err(TargetError::NotSupported { target: self.name(), capability: "copy_artifact" })
    }
}

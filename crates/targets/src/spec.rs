//! Data exchanged across the driver boundary (§4.3). Deliberately a
//! separate, owned shape from `sykli_core::ir::Task`: the scheduler resolves
//! mounts, env, and the working directory before a driver ever sees a task,
//! so a driver never reaches back into the IR or the graph.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use sykli_core::ir::{K8sOptions, ServiceSidecar};

/// One resolved input mount: a resource already materialized at `host_path`,
/// to be made visible to the command at `container_path`.
#[derive(Debug, Clone)]
pub struct MountedInput {
    pub resource: String,
    pub host_path: PathBuf,
    pub container_path: String,
}

/// One resolved cache mount: a named, reused volume rather than a
/// one-shot input.
#[derive(Debug, Clone)]
pub struct CacheMountSpec {
    pub cache_name: String,
    pub container_path: String,
}

/// Everything a driver's `run` needs, fully resolved by the scheduler.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub name: String,
    pub command: String,
    pub container: Option<String>,
    pub workdir: PathBuf,
    pub env: BTreeMap<String, String>,
    pub mounts: Vec<MountedInput>,
    pub cache_mounts: Vec<CacheMountSpec>,
    pub services: Vec<ServiceSidecar>,
    pub timeout: Option<Duration>,
    pub k8s: Option<K8sOptions>,
}

/// Result of one `Target::run` invocation (§4.3 "Execute").
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub exit_status: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Output artifact name -> host-visible path, readable after exit.
    pub produced_outputs: Vec<(String, PathBuf)>,
    pub timed_out: bool,
}

/// Opaque configuration passed to `Target::setup`. Drivers pick out the keys
/// they understand and ignore the rest.
pub type TargetOptions = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeKind {
    Cache,
    Directory,
}

#[derive(Debug, Clone, Copy)]
pub struct VolumeOptions {
    pub kind: VolumeKind,
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct VolumeHandle {
    pub name: String,
    /// A host-visible backing path, when the driver exposes one.
    pub path: Option<PathBuf>,
}

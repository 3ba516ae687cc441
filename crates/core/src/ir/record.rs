//! Records produced while running a pipeline: fingerprints, cache records,
//! run records, and the remote-node/verification-plan vocabulary consumed
//! by the verify planner and coordinator.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A 256-bit digest, hex-encoded. See `sykli_fingerprint` for computation.
pub type Fingerprint = String;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    #[default]
    Normal,
    Readonly,
    Writeonly,
    Disabled,
}

impl CachePolicy {
    #[must_use]
    pub const fn allows_read(self) -> bool {
        matches!(self, Self::Normal | Self::Readonly)
    }

    #[must_use]
    pub const fn allows_write(self) -> bool {
        matches!(self, Self::Normal | Self::Writeonly)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    pub fingerprint: Fingerprint,
    pub exit_status: i32,
    pub stdout_bytes_ref: String,
    pub stderr_bytes_ref: String,
    pub outputs: Vec<CacheOutput>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheOutput {
    pub name: String,
    pub blob_ref: String,
    pub digest: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Failed,
    Skipped,
    Cached,
    Gated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub name: String,
    pub target: String,
    pub status: TaskStatus,
    pub cached: bool,
    pub duration_ms: u64,
    pub exit_status: Option<i32>,
    pub fingerprint: Option<Fingerprint>,
    pub verify_field: Option<VerifyOutcome>,
    /// Populated when `status` is `Skipped`/`Gated`/`Failed` with a known cause
    /// (`condition_false`, `upstream_failed`, `upstream_gate_timeout`,
    /// `cancelled`, `timeout`, `secret_unavailable`, ...).
    pub reason: Option<String>,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerifyOutcome {
    Unreachable { node: String },
    Completed { node: String, result: Box<TaskResult> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub pipeline_name: String,
    pub local_labels: Vec<String>,
    pub tasks: Vec<TaskResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteNode {
    pub node_id: String,
    pub platform_labels: Vec<String>,
    pub connection_info: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyEntryReason {
    CrossPlatform,
    RetryOnDifferentPlatform,
    ExplicitVerify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySkipReason {
    Cached,
    Skipped,
    VerifyNever,
    NoRemoteNodes,
    SamePlatform,
    TaskNotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyEntry {
    pub task_name: String,
    pub target_node: String,
    pub reason: VerifyEntryReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifySkip {
    pub task_name: String,
    pub reason: VerifySkipReason,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationPlan {
    pub entries: Vec<VerifyEntry>,
    pub skipped: Vec<VerifySkip>,
    pub local_labels: Vec<String>,
    pub remote_nodes: Vec<RemoteNode>,
}

/// The closed set of recognized platform labels (spec GLOSSARY).
pub const PLATFORM_LABELS: &[&str] = &["darwin", "linux", "unix", "windows", "arm64", "amd64"];

/// Returns the subset of `labels` drawn from `PLATFORM_LABELS`, sorted.
#[must_use]
pub fn platform_label_set(labels: &[String]) -> BTreeMap<String, ()> {
    labels
        .iter()
        .filter(|l| PLATFORM_LABELS.contains(&l.as_str()))
        .map(|l| (l.clone(), ()))
        .collect()
}

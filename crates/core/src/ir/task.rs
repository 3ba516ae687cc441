//! The declarative pipeline vocabulary: tasks, groups, gates, and the
//! condition tree they carry in their `when` field.
//!
//! This mirrors the wire format described in the engine's external
//! interfaces: a pipeline is ingested once as this tree and never mutated
//! in place — the graph elaborator consumes it and produces a separate,
//! immutable `ElaboratedGraph` (see `crate::ir::graph`).

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A complete pipeline as read from the wire format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub gates: Vec<Gate>,
    #[serde(default)]
    pub defaults: PipelineDefaults,
}

/// Pipeline-level defaults, applied when a task omits the corresponding field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineDefaults {
    pub target: Option<String>,
    pub k8s: Option<K8sOptions>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// One task declaration, field-for-field with §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub mounts: Vec<Mount>,
    #[serde(default)]
    pub cache_mounts: Vec<CacheMount>,
    #[serde(default)]
    pub workdir: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    #[serde(default)]
    pub input_from: Vec<InputFrom>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub when: Option<Condition>,
    /// Dimension order here is declaration order (§4.4 step 1): an
    /// `IndexMap` preserves wire-format key order, unlike a `BTreeMap`
    /// which would re-sort dimensions lexicographically and break the
    /// matrix-expansion naming in §8 scenario 4.
    #[serde(default)]
    pub matrix: IndexMap<String, Vec<String>>,
    #[serde(default)]
    pub retry: u32,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub services: Vec<ServiceSidecar>,
    #[serde(default)]
    pub secrets: Vec<String>,
    #[serde(default)]
    pub secret_refs: Vec<SecretRef>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub k8s: Option<K8sOptions>,
    #[serde(default)]
    pub provides: Vec<Capability>,
    #[serde(default)]
    pub needs: Vec<Capability>,
    #[serde(default)]
    pub covers: Vec<String>,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub criticality: Option<String>,
    #[serde(default)]
    pub on_fail: OnFail,
    #[serde(default)]
    pub select_mode: Option<String>,
    #[serde(default)]
    pub verify: Option<VerifyMode>,

    /// Fields present in the wire JSON that this engine doesn't recognize.
    /// Preserved verbatim for forward compatibility per §6.
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_json::Value>,
}

impl Task {
    /// A task with no `inputs` declared is not cacheable by inputs (§4.1).
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        !self.inputs.is_empty()
    }

    /// `retry: 0` is equivalent to unset (§6 normalization).
    #[must_use]
    pub fn retry_budget(&self) -> u32 {
        self.retry
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mount {
    pub resource: String,
    pub container_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMount {
    pub cache_name: String,
    pub container_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputFrom {
    pub task: String,
    pub artifact: String,
    pub destination: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSidecar {
    pub image: String,
    pub hostname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SecretRef {
    FromEnv { name: String, var: String },
    FromFile { name: String, path: String },
    FromVault { name: String, key: String },
}

impl SecretRef {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::FromEnv { name, .. } | Self::FromFile { name, .. } | Self::FromVault { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFail {
    #[default]
    Fail,
    Skip,
    Analyze,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyMode {
    Never,
    Always,
    CrossPlatform,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct K8sOptions {
    #[serde(default)]
    pub cpu: Option<String>,
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub gpu: Option<u32>,
    #[serde(default)]
    pub node_selectors: BTreeMap<String, String>,
    #[serde(default)]
    pub tolerations: Vec<String>,
    /// Raw JSON overlay merged into the generated pod spec.
    #[serde(default)]
    pub overlay: Option<serde_json::Value>,
}

/// A named set of tasks combined by a group strategy (§3 "Group").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub strategy: GroupStrategy,
    #[serde(default)]
    pub members: Vec<String>,
    /// For `matrix`/`matrix_map`, the single task template to expand.
    #[serde(default)]
    pub template: Option<Task>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GroupStrategy {
    Parallel,
    Chain,
    Matrix,
    MatrixMap,
}

/// A named pseudo-task that gates downstream admission (§3 "Gate").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gate {
    pub name: String,
    pub strategy: GateStrategy,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GateStrategy {
    Env { var: String },
    File { path: String },
    Manual { prompt: String },
}

/// Structured condition tree (§4.5). The string DSL is parsed into this
/// same tree by `sykli-condition` so both forms share one evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    /// Raw string DSL, e.g. `"branch == 'main' && !tag:''"`.
    Expr(String),
    Tree(ConditionNode),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ConditionNode {
    Branch { pattern: String },
    Tag { pattern: String },
    HasTag,
    Event { kind: String },
    InCi,
    Field { name: String, op: FieldOp, value: String },
    And { terms: Vec<ConditionNode> },
    Or { terms: Vec<ConditionNode> },
    Not { term: Box<ConditionNode> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOp {
    Eq,
    Ne,
}

/// Context a condition is evaluated against (§4.4 pass 6).
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub branch: Option<String>,
    pub tag: Option<String>,
    pub event: Option<String>,
    pub in_ci: bool,
    pub matrix_values: BTreeMap<String, String>,
    pub fields: BTreeMap<String, String>,
}

pub mod record;
pub mod task;

pub use record::{
    CacheOutput, CachePolicy, CacheRecord, Fingerprint, RemoteNode, RunRecord, TaskResult,
    TaskStatus, VerificationPlan, VerifyEntry, VerifyEntryReason, VerifyOutcome, VerifySkip,
    VerifySkipReason, PLATFORM_LABELS,
};
pub use task::{
    Capability, CacheMount, Condition, ConditionNode, FieldOp, Gate, GateStrategy, Group,
    GroupStrategy, InputFrom, K8sOptions, Mount, OnFail, Pipeline, PipelineDefaults, RunContext,
    SecretRef, ServiceSidecar, Task, VerifyMode,
};

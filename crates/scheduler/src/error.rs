//! Error types for the scheduler (§4.7, §4.8).
//!
//! Per-task failures (`exec_failure`, `timeout`, `secret_unavailable`, ...)
//! are not modeled as `SchedulerError` variants — they are outcomes, carried
//! in a `TaskResult` so one task's failure never unwinds the run. This type
//! covers only the fatal, whole-run conditions §7 calls "internal
//! invariants violated ... fatal bugs" plus the manifest's own I/O surface.

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Debug, Error, Diagnostic)]
pub enum SchedulerError {
    #[error("internal scheduler invariant violated: {0}")]
    #[diagnostic(code(sykli::scheduler::invariant))]
    Invariant(String),

    #[error("failed to read or write run history: {0}")]
    #[diagnostic(code(sykli::scheduler::history))]
    History(#[from] std::io::Error),

    #[error("failed to (de)serialize a run record: {0}")]
    #[diagnostic(code(sykli::scheduler::serialization))]
    Serialization(#[from] serde_json::Error),

    #[error("run cancelled before completion")]
    #[diagnostic(code(sykli::cancelled))]
    Cancelled,
}

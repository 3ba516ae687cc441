//! Target driver errors (§7 `driver_setup`, `exec_failure`, `timeout`,
//! `cancelled`).

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TargetError>;

#[derive(Debug, Error, Diagnostic)]
pub enum TargetError {
    #[error("{target} setup failed: {reason}")]
    #[diagnostic(code(sykli::driver_setup))]
    Setup { target: &'static str, reason: String },

    #[error("{target}: {capability} is not supported")]
    NotSupported { target: &'static str, capability: &'static str },

    #[error("{target}: task '{task}' execution failed: {reason}")]
    Exec { target: &'static str, task: String, reason: String },

    #[error("{target}: task '{task}' timed out")]
    Timeout { target: &'static str, task: String },

    #[error("{target}: task '{task}' was cancelled")]
    Cancelled { target: &'static str, task: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

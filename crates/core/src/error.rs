//! Top-level error type used at the CLI boundary to unify errors raised by
//! every subsystem crate. Internal crates define their own narrower
//! `thiserror` enums (`FingerprintError`, `CacheError`, `GraphError`, ...)
//! and this type only collects them with `#[from]` — one error enum per
//! module rather than one god-enum.

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("failed to parse pipeline: {0}")]
    #[diagnostic(code(sykli::pipeline_parse))]
    PipelineParse(String),

    #[error("elaboration error: {0}")]
    #[diagnostic(code(sykli::elaboration))]
    Elaboration(String),

    #[error("driver setup failed: {0}")]
    #[diagnostic(code(sykli::driver_setup))]
    DriverSetup(String),

    #[error("run failed: {0}")]
    #[diagnostic(code(sykli::run_failed))]
    RunFailed(String),

    #[error("run cancelled")]
    #[diagnostic(code(sykli::cancelled))]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Maps an [`Error`] to the CLI exit codes in §6/§7.
#[must_use]
pub fn exit_code_for(err: &Error) -> i32 {
    match err {
        Error::PipelineParse(_) => 2,
        Error::Elaboration(_) => 3,
        Error::Cancelled => 4,
        Error::DriverSetup(_) | Error::RunFailed(_) | Error::Io(_) => 1,
    }
}

pub const EXIT_OK: i32 = 0;

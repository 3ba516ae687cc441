//! Error types for gate admission.

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GateError {
    #[error("gate '{name}' timed out after {timeout_secs}s waiting for admission")]
    #[diagnostic(code(sykli::gates::timeout))]
    Timeout { name: String, timeout_secs: u64 },

    #[error("gate '{name}' failed reading its file condition: {source}")]
    #[diagnostic(code(sykli::gates::io))]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, GateError>;

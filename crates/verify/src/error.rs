//! Error type for the verify coordinator (§4.10). The planner itself
//! (`crate::planner::plan`) is a pure function and never fails — an
//! unreachable node is a *result*, not an error, so it has no place here.

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VerifyError>;

#[derive(Debug, Error, Diagnostic)]
pub enum VerifyError {
    #[error("failed to connect to remote node '{node}': {source}")]
    #[diagnostic(code(sykli::verify::unreachable))]
    Unreachable { node: String, #[source] source: std::io::Error },

    #[error("remote node '{node}' sent a malformed response: {source}")]
    #[diagnostic(code(sykli::verify::protocol))]
    Protocol { node: String, #[source] source: serde_json::Error },

    #[error("remote node '{node}' reported an error: {reason}")]
    #[diagnostic(code(sykli::verify::remote_error))]
    RemoteError { node: String, reason: String },
}

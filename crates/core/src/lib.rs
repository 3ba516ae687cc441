//! Shared IR types and error handling for the Sykli pipeline execution engine.
//!
//! This crate has no behavior of its own — it is the vocabulary every other
//! `sykli-*` crate shares: the declarative pipeline tree (`ir::task`), the
//! records produced while running one (`ir::record`), and the top-level
//! error type used at the CLI boundary.

pub mod error;
pub mod ir;

pub use error::{exit_code_for, Error, Result, EXIT_OK};

/// Engine version, embedded in run records for forward-compat checks
/// (§6: "a newer engine must read records written by the immediately
/// preceding major version").
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

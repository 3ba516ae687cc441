//! Gate admission (§4.7 "Gates").
//!
//! A gate is a named pseudo-task that blocks successor admission until one
//! of three strategies succeeds: `env` (a truthy variable, checked once),
//! `file` (polled at 1 Hz until it exists), or `manual` (an interactive
//! prompt, auto-approved when running in CI — see [`ci::is_ci`]).

mod admission;
mod ci;
mod error;

pub use admission::{admit, AlwaysDeny, ManualPrompt};
pub use ci::is_ci;
pub use error::{GateError, Result};

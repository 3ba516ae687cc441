//! DAG-driven execution engine (§4.7) plus run manifest & history
//! (§4.8): the component that actually drives an elaborated pipeline
//! to completion.
//!
//! [`Scheduler`] owns the admission loop, cache/single-flight interaction,
//! secret resolution, and gate admission; [`SchedulerConfig`] is the
//! builder-with-`Default` configuration surface the CLI layer fills in from
//! flags and environment variables.

mod config;
mod engine;
mod env;
mod error;
mod graph;
mod manifest;

pub use config::{SchedulerConfig, DEFAULT_RETAIN_RUNS, DEFAULT_RETRY_BACKOFF_CAP};
pub use engine::Scheduler;
pub use error::{Result, SchedulerError};
pub use manifest::RunHistory;

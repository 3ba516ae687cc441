//! Argument parsing and output rendering (§6 "CLI surface"), split out of
//! `main` to keep this module free of tokio/runtime concerns and limited to
//! parsing, envelopes, and exit-code mapping.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use sykli_core::ir::RunRecord;

use crate::tracing::LogLevel;

#[derive(Parser, Debug)]
#[command(name = "sykli", version, about = "Sykli CI/CD pipeline execution engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Elaborate and run a pipeline (§6).
    Run(RunArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Path to a pipeline JSON file (§6 "Pipeline JSON").
    #[arg(long, value_name = "FILE")]
    pub pipeline: PathBuf,

    /// Overrides `SYKLI_CONCURRENCY` and the hardware-parallelism default.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Elaborate the pipeline and print the resulting DAG without running
    /// anything.
    #[arg(long)]
    pub explain: bool,

    /// Run the cross-platform Verify Coordinator against the nodes named in
    /// `--remote-nodes` after the local run completes.
    #[arg(long)]
    pub verify: bool,

    /// JSON file of `RemoteNode` entries consulted when `--verify` is set.
    /// A remote node's connection info is supplied per invocation (§3
    /// "Remote Node ... not persisted by the engine"); this is this CLI's
    /// channel for that.
    #[arg(long, value_name = "FILE", requires = "verify")]
    pub remote_nodes: Option<PathBuf>,

    /// Overrides `SYKLI_TARGET` and each task's own `target:`/pipeline
    /// default for this invocation.
    #[arg(long, value_name = "NAME")]
    pub target: Option<String>,

    /// Emit the run record (or error) as a single JSON envelope on stdout
    /// instead of a human-readable summary.
    #[arg(long, global = true)]
    pub json: bool,

    /// Logging verbosity, overridden by `RUST_LOG` if set.
    #[arg(short = 'L', long, global = true, value_enum, default_value = "warn")]
    pub level: LogLevel,
}

#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

/// Maps a [`sykli_core::Error`] to the CLI exit codes in §6/§7.
#[must_use]
pub fn exit_code_for(err: &sykli_core::Error) -> i32 {
    sykli_core::exit_code_for(err)
}

#[derive(Debug, Serialize)]
struct OkEnvelope<T> {
    status: &'static str,
    data: T,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    status: &'static str,
    error: String,
}

/// Prints a completed run, JSON-enveloped or as a short human-readable
/// per-task summary.
pub fn render_run(record: &RunRecord, json: bool) {
    if json {
        let envelope = OkEnvelope { status: "ok", data: record };
        match serde_json::to_string(&envelope) {
            Ok(text) => println!("{text}"),
            Err(err) => eprintln!("failed to serialize run record: {err}"),
        }
        return;
    }

    println!("run {} ({})", record.run_id, record.pipeline_name);
    for task in &record.tasks {
        let marker = match task.status {
            sykli_core::ir::TaskStatus::Success => "ok",
            sykli_core::ir::TaskStatus::Failed => "failed",
            sykli_core::ir::TaskStatus::Skipped => "skipped",
            sykli_core::ir::TaskStatus::Cached => "cached",
            sykli_core::ir::TaskStatus::Gated => "gated",
        };
        println!("  {:<8} {} ({} ms)", marker, task.name, task.duration_ms);
    }
}

#[derive(Debug, Serialize)]
struct ExplainTask<'a> {
    name: &'a str,
    target: Option<&'a str>,
    depends_on: &'a [String],
    skipped: bool,
}

/// Prints the elaborated DAG for `--explain`: every concrete (post
/// matrix-expansion) task with its resolved dependencies and condition-skip
/// state, without touching the cache or any target driver.
pub fn render_explain(graph: &sykli_graph::ElaboratedGraph, json: bool) {
    let explained: Vec<ExplainTask<'_>> = graph
        .tasks
        .iter()
        .map(|t| ExplainTask {
            name: &t.task.name,
            target: t.task.target.as_deref(),
            depends_on: &t.task.depends_on,
            skipped: t.skip_reason.is_some(),
        })
        .collect();

    if json {
        let envelope = OkEnvelope { status: "ok", data: &explained };
        match serde_json::to_string(&envelope) {
            Ok(text) => println!("{text}"),
            Err(err) => eprintln!("failed to serialize explain report: {err}"),
        }
        return;
    }

    for task in &explained {
        let state = if task.skipped { "skipped" } else { "eligible" };
        let deps = if task.depends_on.is_empty() { "-".to_string() } else { task.depends_on.join(", ") };
        println!("  {:<9} {:<20} depends_on=[{deps}] target={}", state, task.name, task.target.unwrap_or("default"));
    }
}

/// Renders a CLI-boundary error: `miette` fancy diagnostics in text mode or
/// a flat JSON envelope under `--json`.
pub fn render_error(err: sykli_core::Error, json: bool) {
    if json {
        let envelope = ErrorEnvelope { status: "error", error: err.to_string() };
        match serde_json::to_string(&envelope) {
            Ok(text) => println!("{text}"),
            Err(_) => eprintln!("error serializing error response"),
        }
    } else {
        let report = miette::Report::new(err);
        eprintln!("{report:?}");
    }
}

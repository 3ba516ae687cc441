//! `sykli` CLI Application
//!
//! Thin entry point wiring the elaborator, scheduler, and verify coordinator
//! behind the `run` subcommand (§6). Argument parsing and rendering live in
//! `cli`; this module owns the tokio runtime and signal handling.

mod cli;
mod tracing;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use sykli_core::ir::{Pipeline, RemoteNode, RunContext};
use sykli_scheduler::{Scheduler, SchedulerConfig};
use sykli_targets::Registry;
use tokio_util::sync::CancellationToken;

use crate::cli::{render_error, render_run, Commands};

#[tokio::main]
#[::tracing::instrument(name = "sykli_main")]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("sykli panicked: {panic_info}");
        eprintln!("run with RUST_LOG=debug for more detail");
    }));

    let exit_code = run().await;
    std::process::exit(exit_code);
}

#[::tracing::instrument(name = "sykli_run")]
async fn run() -> i32 {
    let args = cli::parse();
    let Commands::Run(run_args) = &args.command;
    crate::tracing::init(run_args.level, run_args.json);

    let cancel = CancellationToken::new();
    let cancel_for_signal = cancel.clone();
    let mut ctrl_c_fired = false;

    let result = {
        let real_main = real_main(run_args, cancel.clone());
        tokio::pin!(real_main);
        loop {
            tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c(), if !ctrl_c_fired => {
                    ctrl_c_fired = true;
                    cancel_for_signal.cancel();
                }
                outcome = &mut real_main => break outcome,
            }
        }
    };

    if ctrl_c_fired {
        let code = cli::exit_code_for(&sykli_core::Error::Cancelled);
        render_error(sykli_core::Error::Cancelled, run_args.json);
        return code;
    }

    match result {
        Ok(()) => sykli_core::EXIT_OK,
        Err(err) => {
            let code = cli::exit_code_for(&err);
            render_error(err, run_args.json);
            code
        }
    }
}

#[::tracing::instrument(skip(args, cancel))]
async fn real_main(args: &cli::RunArgs, cancel: CancellationToken) -> sykli_core::Result<()> {
    let pipeline = load_pipeline(&args.pipeline)?;
    let ctx = RunContext { in_ci: sykli_gates::is_ci(), ..RunContext::default() };
    let graph = sykli_graph::elaborate(&pipeline, &ctx)
        .map_err(|e| sykli_core::Error::Elaboration(e.to_string()))?;

    if args.explain {
        cli::render_explain(&graph, args.json);
        return Ok(());
    }

    let workspace_root = args
        .pipeline
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let config = build_config(&workspace_root, args);
    let registry = Registry::with_defaults(workspace_root.clone(), "default");
    let cache = sykli_cache::CacheStore::new(config.effective_cache_dir());
    let scheduler = Scheduler::new(config, registry, cache);

    let local_labels = local_platform_labels();
    let pipeline_env: BTreeMap<String, String> = pipeline.defaults.env.clone();

    let record = scheduler
        .run(&graph, &pipeline.name, local_labels.clone(), &pipeline_env, cancel)
        .await
        .map_err(|e| sykli_core::Error::RunFailed(e.to_string()))?;

    let record = if args.verify {
        let remote_nodes = load_remote_nodes(args.remote_nodes.as_deref())?;
        let plan = sykli_verify::plan(&record, &graph, &local_labels, &remote_nodes);
        let outcomes =
            sykli_verify::run_plan(&plan, &graph, &record, &workspace_root, &sykli_verify::TcpDialer).await;
        let tasks = sykli_verify::merge(&record, &outcomes);
        sykli_core::ir::RunRecord { tasks, ..record }
    } else {
        record
    };

    let failed = record.tasks.iter().any(|t| t.status == sykli_core::ir::TaskStatus::Failed);
    render_run(&record, args.json);

    if failed {
        return Err(sykli_core::Error::RunFailed(format!("run {} has failing tasks", record.run_id)));
    }
    Ok(())
}

fn load_pipeline(path: &Path) -> sykli_core::Result<Pipeline> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| sykli_core::Error::PipelineParse(format!("reading {}: {e}", path.display())))?;
    serde_json::from_str(&raw).map_err(|e| sykli_core::Error::PipelineParse(e.to_string()))
}

fn load_remote_nodes(path: Option<&Path>) -> sykli_core::Result<Vec<RemoteNode>> {
    let Some(path) = path else { return Ok(Vec::new()) };
    let raw = std::fs::read_to_string(path)
        .map_err(|e| sykli_core::Error::PipelineParse(format!("reading {}: {e}", path.display())))?;
    serde_json::from_str(&raw).map_err(|e| sykli_core::Error::PipelineParse(e.to_string()))
}

fn build_config(workspace_root: &Path, args: &cli::RunArgs) -> SchedulerConfig {
    let mut config = SchedulerConfig::new(workspace_root);

    let concurrency = args.concurrency.or_else(|| {
        std::env::var("SYKLI_CONCURRENCY").ok().and_then(|v| v.parse().ok())
    });
    if let Some(concurrency) = concurrency {
        config = config.with_concurrency(concurrency);
    }

    if let Ok(cache_dir) = std::env::var("SYKLI_CACHE_DIR") {
        config = config.with_cache_dir(cache_dir);
    }

    let target = args.target.clone().or_else(|| std::env::var("SYKLI_TARGET").ok());
    if let Some(target) = target {
        config = config.with_default_target(target);
    }

    config
}

/// Derives this host's platform labels from the closed set in spec
/// GLOSSARY: OS family plus architecture.
fn local_platform_labels() -> Vec<String> {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        "linux" => "linux",
        "windows" => "windows",
        other => other,
    };
    let mut labels = vec![os.to_string()];
    if matches!(std::env::consts::OS, "macos" | "linux") {
        labels.push("unix".to_string());
    }
    labels.push(std::env::consts::ARCH.to_string());
    labels
}

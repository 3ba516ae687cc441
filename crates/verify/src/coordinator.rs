//! Verify Coordinator (§4.10): for each planned entry, connects to the
//! target node, ships the task spec plus its `input_from` artifacts,
//! invokes the engine on the peer in single-task mode, and merges the
//! returned [`TaskResult`] under a `verify` field of the local result.
//!
//! Connection retry uses bounded exponential backoff; on exhaustion the
//! node is treated as unreachable and the run continues (§4.10: "do
//! not fail the local run").

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use backoff::ExponentialBackoff;
use sykli_core::ir::{RemoteNode, RunRecord, TaskResult, VerifyOutcome, VerificationPlan};
use sykli_graph::ElaboratedGraph;
use tokio::net::TcpStream;
use tracing::{instrument, warn};

use crate::protocol::{read_frame, write_frame, VerifyArtifact, VerifyRequest, VerifyResponse};

/// How a coordinator reaches a node. Abstracted behind a trait so tests can
/// substitute an in-process listener instead of a real network dependency.
#[async_trait::async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, connection_info: &str) -> std::io::Result<TcpStream>;
}

/// Dials `connection_info` as a `host:port` TCP address.
pub struct TcpDialer;

#[async_trait::async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, connection_info: &str) -> std::io::Result<TcpStream> {
        TcpStream::connect(connection_info).await
    }
}

fn connect_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_millis(200),
        max_interval: Duration::from_secs(2),
        max_elapsed_time: Some(Duration::from_secs(10)),
        multiplier: 2.0,
        ..Default::default()
    }
}

/// Ships every [`VerificationPlan`] entry to its assigned node and returns,
/// per entry, the [`VerifyOutcome`] to attach to the local [`TaskResult`]
/// under `verify_field`.
///
/// # Errors
/// Never returns `Err`: an unreachable node becomes
/// `VerifyOutcome::Unreachable` per §4.10, not a propagated failure.
#[instrument(skip(plan, graph, run, dialer, workspace_root))]
pub async fn run_plan(
    plan: &VerificationPlan,
    graph: &ElaboratedGraph,
    run: &RunRecord,
    workspace_root: &Path,
    dialer: &dyn Dialer,
) -> HashMap<String, VerifyOutcome> {
    let nodes: HashMap<&str, &RemoteNode> = plan.remote_nodes.iter().map(|n| (n.node_id.as_str(), n)).collect();
    let mut outcomes = HashMap::with_capacity(plan.entries.len());

    for entry in &plan.entries {
        let Some(node) = nodes.get(entry.target_node.as_str()) else {
            warn!(node = %entry.target_node, "verify plan named a node not in remote_nodes");
            continue;
        };
        let Some(elaborated) = graph.get(&entry.task_name) else {
            continue;
        };

        let artifacts = load_artifacts(elaborated, workspace_root).await;
        let request = VerifyRequest {
            task: elaborated.task.clone(),
            artifacts,
            pipeline_name: run.pipeline_name.clone(),
            local_labels: run.local_labels.clone(),
        };

        let outcome = dispatch_with_retry(node, &request, dialer).await;
        outcomes.insert(entry.task_name.clone(), outcome);
    }

    outcomes
}

async fn load_artifacts(elaborated: &sykli_graph::ElaboratedTask, workspace_root: &Path) -> Vec<VerifyArtifact> {
    let mut artifacts = Vec::with_capacity(elaborated.task.input_from.len());
    for input_from in &elaborated.task.input_from {
        let path = workspace_root.join(&input_from.task).join(&input_from.artifact);
        if let Ok(bytes) = tokio::fs::read(&path).await {
            artifacts.push(VerifyArtifact { name: input_from.artifact.clone(), bytes });
        }
    }
    artifacts
}

async fn dispatch_with_retry(node: &RemoteNode, request: &VerifyRequest, dialer: &dyn Dialer) -> VerifyOutcome {
    let node_id = node.node_id.clone();
    let connection_info = node.connection_info.clone();

    let operation = || async {
        let mut stream = dialer.dial(&connection_info).await.map_err(backoff::Error::transient)?;
        write_frame(&mut stream, request).await.map_err(backoff::Error::transient)?;
        let response: VerifyResponse = read_frame(&mut stream).await.map_err(backoff::Error::transient)?;
        Ok::<VerifyResponse, backoff::Error<std::io::Error>>(response)
    };

    match backoff::future::retry(connect_backoff(), operation).await {
        Ok(response) => VerifyOutcome::Completed { node: node_id, result: Box::new(response.result) },
        Err(source) => {
            warn!(node = %node_id, %source, "verify node unreachable after retries");
            VerifyOutcome::Unreachable { node: node_id }
        }
    }
}

/// Merges coordinator outcomes into a copy of `run`'s task results under
/// `verify_field`, leaving tasks with no planned verify entry untouched.
#[must_use]
pub fn merge(run: &RunRecord, outcomes: &HashMap<String, VerifyOutcome>) -> Vec<TaskResult> {
    run.tasks
        .iter()
        .map(|t| {
            let mut merged = t.clone();
            if let Some(outcome) = outcomes.get(&t.name) {
                merged.verify_field = Some(outcome.clone());
            }
            merged
        })
        .collect()
}

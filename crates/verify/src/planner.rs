//! Verify Planner (§4.9): a pure transformation from a run record plus
//! remote node inventory to a re-execution plan. Intentionally free of I/O
//! or async — the design Design Notes single this out as the piece of code
//! that benefits most from exhaustive property testing, and purity is what
//! makes that testing tractable.
//!
//! `plan` folds over a slice of prior results with no shared mutable state,
//! building its output incrementally — the shape that makes exhaustive
//! property testing tractable.

use std::collections::BTreeSet;

use sykli_core::ir::{
    platform_label_set, RemoteNode, RunRecord, TaskResult, TaskStatus, VerificationPlan,
    VerifyEntry, VerifyEntryReason, VerifyMode, VerifySkip, VerifySkipReason,
};
use sykli_graph::ElaboratedGraph;

/// Implements the decision table in §4.9, first match wins, in the
/// table's row order. `graph` is the current elaborated graph (used only
/// for the `task_not_found` check — a task present in a stale `run` but
/// renamed or removed since).
#[must_use]
pub fn plan(
    run: &RunRecord,
    graph: &ElaboratedGraph,
    local_labels: &[String],
    remote_nodes: &[RemoteNode],
) -> VerificationPlan {
    let local_set = platform_label_set(local_labels);
    let different_node = remote_nodes
        .iter()
        .find(|node| platform_label_set(&node.platform_labels) != local_set);

    let mut result = VerificationPlan {
        entries: Vec::new(),
        skipped: Vec::new(),
        local_labels: local_labels.to_vec(),
        remote_nodes: remote_nodes.to_vec(),
    };

    for task_result in &run.tasks {
        decide_one(task_result, graph, remote_nodes, different_node, &mut result);
    }

    result
}

fn decide_one(
    task_result: &TaskResult,
    graph: &ElaboratedGraph,
    remote_nodes: &[RemoteNode],
    different_node: Option<&RemoteNode>,
    result: &mut VerificationPlan,
) {
    let name = &task_result.name;

    let Some(elaborated) = graph.get(name) else {
        return skip(result, name, VerifySkipReason::TaskNotFound);
    };

    if task_result.status == TaskStatus::Skipped {
        return skip(result, name, VerifySkipReason::Skipped);
    }

    if task_result.cached {
        return skip(result, name, VerifySkipReason::Cached);
    }

    let verify_mode = elaborated.task.verify;

    if verify_mode == Some(VerifyMode::Never) {
        return skip(result, name, VerifySkipReason::VerifyNever);
    }

    let Some(first_node) = remote_nodes.first() else {
        return skip(result, name, VerifySkipReason::NoRemoteNodes);
    };

    if verify_mode == Some(VerifyMode::Always) {
        return enter(result, name, &first_node.node_id, VerifyEntryReason::ExplicitVerify);
    }

    if verify_mode == Some(VerifyMode::CrossPlatform) {
        return match different_node {
            Some(node) => enter(result, name, &node.node_id, VerifyEntryReason::CrossPlatform),
            None => skip(result, name, VerifySkipReason::SamePlatform),
        };
    }

    if task_result.status == TaskStatus::Failed {
        let node = different_node.unwrap_or(first_node);
        return enter(result, name, &node.node_id, VerifyEntryReason::RetryOnDifferentPlatform);
    }

    match different_node {
        Some(node) => enter(result, name, &node.node_id, VerifyEntryReason::CrossPlatform),
        None => skip(result, name, VerifySkipReason::SamePlatform),
    }
}

fn skip(result: &mut VerificationPlan, name: &str, reason: VerifySkipReason) {
    result.skipped.push(VerifySkip { task_name: name.to_string(), reason });
}

fn enter(result: &mut VerificationPlan, name: &str, node_id: &str, reason: VerifyEntryReason) {
    result.entries.push(VerifyEntry { task_name: name.to_string(), target_node: node_id.to_string(), reason });
}

/// Helper used by tests and callers who want a quick sanity check that
/// `entries` and `skipped` partition `run.tasks` by name, per §8
/// "Verify planner purity".
#[must_use]
pub fn partitions_cleanly(plan: &VerificationPlan, run: &RunRecord) -> bool {
    let entry_names: BTreeSet<&str> = plan.entries.iter().map(|e| e.task_name.as_str()).collect();
    let skip_names: BTreeSet<&str> = plan.skipped.iter().map(|s| s.task_name.as_str()).collect();
    entry_names.is_disjoint(&skip_names) && entry_names.len() + skip_names.len() == run.tasks.len()
}

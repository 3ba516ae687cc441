//! Pass 7: validation (§4.4 step 7).
//!
//! Every violation kind is collected and reported together rather than
//! returned on the first failure.

use std::collections::{HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use sykli_core::ir::{Gate, Task};

use crate::error::ValidationError;

/// Validates the flattened task list. `gates` are pseudo-tasks a `depends_on`
/// may legally name (§3 "Gate": "Downstream dependencies see a gate as a
/// predecessor") — they're accepted as known dependency targets and as
/// (always-source, never-sink) nodes in the cycle check, but never as
/// duplicate-name or mount/env subjects, since those fields don't exist on a
/// `Gate`.
pub fn validate(tasks: &[Task], gates: &[Gate]) -> std::result::Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_duplicate_names(tasks, &mut errors);
    let mut names: HashSet<&str> = tasks.iter().map(|t| t.name.as_str()).collect();
    names.extend(gates.iter().map(|g| g.name.as_str()));
    check_unknown_dependencies(tasks, &names, &mut errors);
    check_empty_env_keys(tasks, &mut errors);
    check_mount_resources(tasks, &mut errors);
    check_cycles(tasks, gates, &mut errors);

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn check_duplicate_names(tasks: &[Task], errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    for task in tasks {
        if !seen.insert(task.name.as_str()) && reported.insert(task.name.as_str()) {
            errors.push(ValidationError::DuplicateTaskName(task.name.clone()));
        }
    }
}

fn check_unknown_dependencies(tasks: &[Task], names: &HashSet<&str>, errors: &mut Vec<ValidationError>) {
    for task in tasks {
        for dep in &task.depends_on {
            if !names.contains(dep.as_str()) {
                errors.push(ValidationError::UnknownDependency {
                    task: task.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
}

fn check_empty_env_keys(tasks: &[Task], errors: &mut Vec<ValidationError>) {
    for task in tasks {
        if task.env.keys().any(|k| k.is_empty()) {
            errors.push(ValidationError::EmptyEnvKey { task: task.name.clone() });
        }
    }
}

fn check_mount_resources(tasks: &[Task], errors: &mut Vec<ValidationError>) {
    let declared: HashSet<&str> = tasks
        .iter()
        .flat_map(|t| t.cache_mounts.iter().map(|m| m.cache_name.as_str()))
        .collect();
    for task in tasks {
        for mount in &task.mounts {
            if !declared.contains(mount.resource.as_str()) {
                errors.push(ValidationError::UndeclaredMountResource {
                    task: task.name.clone(),
                    resource: mount.resource.clone(),
                });
            }
        }
    }
}

fn check_cycles(tasks: &[Task], gates: &[Gate], errors: &mut Vec<ValidationError>) {
    let mut graph = DiGraph::<&str, ()>::new();
    let mut index_of = HashMap::new();
    for task in tasks {
        index_of.insert(task.name.as_str(), graph.add_node(task.name.as_str()));
    }
    for gate in gates {
        index_of.insert(gate.name.as_str(), graph.add_node(gate.name.as_str()));
    }
    for task in tasks {
        let Some(&from) = index_of.get(task.name.as_str()) else { continue };
        for dep in &task.depends_on {
            if let Some(&to) = index_of.get(dep.as_str()) {
                graph.add_edge(to, from, ());
            }
        }
    }

    for scc in tarjan_scc(&graph) {
        let is_self_loop = scc.len() == 1 && graph.contains_edge(scc[0], scc[0]);
        if scc.len() > 1 || is_self_loop {
            let names: Vec<&str> = scc.iter().map(|&i| graph[i]).collect();
            errors.push(ValidationError::CyclicDependency(names.join(" -> ")));
        }
    }
}

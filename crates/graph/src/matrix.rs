//! Pass 1: matrix expansion (§4.4 step 1).

use indexmap::IndexMap;
use sykli_core::ir::{Group, GroupStrategy, Pipeline, Task};

/// Expands every matrix-bearing task (top-level or a group's template) into
/// one concrete task per Cartesian tuple. Returns the fully flattened task
/// list and the groups with their `Matrix`/`MatrixMap` members resolved.
///
/// Dimension order follows `matrix`'s declaration order — the IR stores it
/// as an `IndexMap`, so this is exactly the order dimensions appeared in the
/// wire JSON (§4.4 step 1: "dimension order = declaration order").
#[must_use]
pub fn expand(pipeline: &Pipeline) -> (Vec<Task>, Vec<Group>) {
    let mut tasks = Vec::with_capacity(pipeline.tasks.len());
    for task in &pipeline.tasks {
        if task.matrix.is_empty() {
            tasks.push(task.clone());
        } else {
            tasks.extend(expand_task(task));
        }
    }

    let mut groups = Vec::with_capacity(pipeline.groups.len());
    for group in &pipeline.groups {
        match group.strategy {
            GroupStrategy::Matrix | GroupStrategy::MatrixMap => {
                let Some(template) = &group.template else {
                    groups.push(group.clone());
                    continue;
                };
                let named_template = Task {
                    name: group.name.clone(),
                    ..template.clone()
                };
                let expanded = if named_template.matrix.is_empty() {
                    vec![named_template]
                } else {
                    expand_task(&named_template)
                };
                let members = expanded.iter().map(|t| t.name.clone()).collect();
                tasks.extend(expanded);
                groups.push(Group {
                    name: group.name.clone(),
                    strategy: group.strategy,
                    members,
                    template: None,
                });
            }
            GroupStrategy::Parallel | GroupStrategy::Chain => groups.push(group.clone()),
        }
    }

    (tasks, groups)
}

fn expand_task(task: &Task) -> Vec<Task> {
    let dims: Vec<(&String, &Vec<String>)> = task.matrix.iter().collect();
    cartesian(&dims)
        .into_iter()
        .map(|combo| {
            let suffix = combo.iter().map(|(_, v)| v.as_str()).collect::<Vec<_>>().join("-");
            let mut env = task.env.clone();
            for (dim, value) in &combo {
                env.insert((*dim).clone(), value.clone());
            }
            Task {
                name: format!("{}-{suffix}", task.name),
                env,
                matrix: IndexMap::new(),
                ..task.clone()
            }
        })
        .collect()
}

fn cartesian(dims: &[(&String, &Vec<String>)]) -> Vec<Vec<(String, String)>> {
    let mut combos: Vec<Vec<(String, String)>> = vec![vec![]];
    for (name, values) in dims {
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for value in *values {
                let mut extended = combo.clone();
                extended.push(((*name).clone(), value.clone()));
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}

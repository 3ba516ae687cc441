//! Pass 2: flatten groups (§4.4 step 2).
//!
//! `parallel` groups contribute no edges of their own — their members are
//! plain tasks, already present in the flattened list. `chain` groups
//! insert sequential edges between consecutive members. A `depends_on`
//! entry naming a group (rather than a task) expands to an edge from every
//! current member of that group, mirroring a task declaring `after_group`.

use std::collections::HashMap;

use sykli_core::ir::{Group, GroupStrategy, Task};

pub fn flatten(tasks: &mut [Task], groups: &[Group]) {
    insert_chain_edges(tasks, groups);
    let group_members = build_group_members(groups);
    expand_group_dependencies(tasks, &group_members);
}

fn insert_chain_edges(tasks: &mut [Task], groups: &[Group]) {
    for group in groups.iter().filter(|g| g.strategy == GroupStrategy::Chain) {
        for pair in group.members.windows(2) {
            let [predecessor, successor] = pair else { continue };
            if let Some(task) = tasks.iter_mut().find(|t| &t.name == successor)
                && !task.depends_on.contains(predecessor)
            {
                task.depends_on.push(predecessor.clone());
            }
        }
    }
}

fn build_group_members(groups: &[Group]) -> HashMap<String, Vec<String>> {
    groups
        .iter()
        .map(|g| (g.name.clone(), g.members.clone()))
        .collect()
}

fn expand_group_dependencies(tasks: &mut [Task], group_members: &HashMap<String, Vec<String>>) {
    let task_names: std::collections::HashSet<String> = tasks.iter().map(|t| t.name.clone()).collect();
    for task in tasks.iter_mut() {
        let mut expanded = Vec::with_capacity(task.depends_on.len());
        for dep in &task.depends_on {
            if task_names.contains(dep) {
                expanded.push(dep.clone());
            } else if let Some(members) = group_members.get(dep) {
                expanded.extend(members.iter().cloned());
            } else {
                // Unknown dependency; left as-is so the validation pass
                // reports it with the original (unexpandable) name.
                expanded.push(dep.clone());
            }
        }
        task.depends_on = expanded;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn task(name: &str, depends_on: &[&str]) -> Task {
        Task {
            name: name.to_string(),
            command: "echo".into(),
            container: None,
            mounts: vec![],
            cache_mounts: vec![],
            workdir: None,
            env: BTreeMap::new(),
            inputs: vec![],
            outputs: BTreeMap::new(),
            input_from: vec![],
            depends_on: depends_on.iter().map(|s| (*s).to_string()).collect(),
            when: None,
            matrix: Default::default(),
            retry: 0,
            timeout_seconds: None,
            services: vec![],
            secrets: vec![],
            secret_refs: vec![],
            target: None,
            k8s: None,
            provides: vec![],
            needs: vec![],
            covers: vec![],
            intent: None,
            criticality: None,
            on_fail: Default::default(),
            select_mode: None,
            verify: None,
            unknown: BTreeMap::new(),
        }
    }

    #[test]
    fn chain_inserts_sequential_edges() {
        let mut tasks = vec![task("a", &[]), task("b", &[]), task("c", &[])];
        let groups = vec![Group {
            name: "g".into(),
            strategy: GroupStrategy::Chain,
            members: vec!["a".into(), "b".into(), "c".into()],
            template: None,
        }];
        flatten(&mut tasks, &groups);
        assert_eq!(tasks[1].depends_on, vec!["a"]);
        assert_eq!(tasks[2].depends_on, vec!["b"]);
    }

    #[test]
    fn depends_on_group_name_expands_to_members() {
        let mut tasks = vec![task("a", &[]), task("b", &[]), task("downstream", &["fanout"])];
        let groups = vec![Group {
            name: "fanout".into(),
            strategy: GroupStrategy::Parallel,
            members: vec!["a".into(), "b".into()],
            template: None,
        }];
        flatten(&mut tasks, &groups);
        assert_eq!(tasks[2].depends_on, vec!["a", "b"]);
    }
}

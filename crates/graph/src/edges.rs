//! Passes 4-5: `input_from` edges and edge deduplication (§4.4 steps 4-5).

use sykli_core::ir::Task;

/// Pass 4: every `input_from` entry implies an edge from its producer.
pub fn resolve_input_from(tasks: &mut [Task]) {
    for task in tasks.iter_mut() {
        for input in task.input_from.clone() {
            if !task.depends_on.contains(&input.task) {
                task.depends_on.push(input.task);
            }
        }
    }
}

/// Pass 5: dedup each task's `depends_on`, preserving first-seen order.
/// Self-edges are left intact — validation (step 7) reports them as cycles.
pub fn dedup(tasks: &mut [Task]) {
    for task in tasks.iter_mut() {
        let mut seen = std::collections::HashSet::new();
        task.depends_on.retain(|d| seen.insert(d.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sykli_core::ir::InputFrom;
    use std::collections::BTreeMap;

    fn task(name: &str) -> Task {
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
            depends_on: vec![],
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
    fn input_from_adds_edge() {
        let mut downstream = task("downstream");
        downstream.input_from.push(InputFrom {
            task: "upstream".into(),
            artifact: "bin".into(),
            destination: "./bin".into(),
        });
        let mut tasks = vec![downstream];
        resolve_input_from(&mut tasks);
        assert_eq!(tasks[0].depends_on, vec!["upstream"]);
    }

    #[test]
    fn dedup_drops_duplicates_but_keeps_self_edges() {
        let mut t = task("a");
        t.depends_on = vec!["b".into(), "b".into(), "a".into(), "c".into()];
        let mut tasks = vec![t];
        dedup(&mut tasks);
        assert_eq!(tasks[0].depends_on, vec!["b", "a", "c"]);
    }
}

//! Pass 3: resolve `needs`/`provides` capabilities (§4.4 step 3).

use sykli_core::ir::{Capability, Task};

use crate::error::{GraphError, Result};

pub fn resolve(tasks: &mut [Task]) -> Result<()> {
    let providers: Vec<(String, Capability)> = tasks
        .iter()
        .flat_map(|t| t.provides.iter().map(move |c| (t.name.clone(), c.clone())))
        .collect();

    for index in 0..tasks.len() {
        let needs = tasks[index].needs.clone();
        let task_name = tasks[index].name.clone();
        for cap in &needs {
            let matches: Vec<&str> = providers
                .iter()
                .filter(|(name, provided)| *name != task_name && capability_matches(cap, provided))
                .map(|(name, _)| name.as_str())
                .collect();
            if matches.is_empty() {
                return Err(GraphError::MissingCapability {
                    task: task_name,
                    capability: cap.name.clone(),
                });
            }
            for provider in matches {
                if !tasks[index].depends_on.iter().any(|d| d == provider) {
                    tasks[index].depends_on.push(provider.to_string());
                }
            }
        }
    }
    Ok(())
}

fn capability_matches(needed: &Capability, provided: &Capability) -> bool {
    if needed.name != provided.name {
        return false;
    }
    match (&needed.value, &provided.value) {
        (Some(needed_value), Some(provided_value)) => needed_value == provided_value,
        (Some(_), None) => false,
        (None, _) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn task(name: &str, provides: Vec<Capability>, needs: Vec<Capability>) -> Task {
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
            provides,
            needs,
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
    fn needs_adds_edge_from_provider() {
        let mut tasks = vec![
            task("db", vec![Capability { name: "postgres".into(), value: None }], vec![]),
            task("app", vec![], vec![Capability { name: "postgres".into(), value: None }]),
        ];
        resolve(&mut tasks).unwrap();
        assert_eq!(tasks[1].depends_on, vec!["db"]);
    }

    #[test]
    fn missing_capability_errors() {
        let mut tasks = vec![task("app", vec![], vec![Capability { name: "postgres".into(), value: None }])];
        let err = resolve(&mut tasks).unwrap_err();
        assert!(matches!(err, GraphError::MissingCapability { .. }));
    }

    #[test]
    fn value_mismatch_does_not_match() {
        let mut tasks = vec![
            task(
                "db-v1",
                vec![Capability { name: "postgres".into(), value: Some("13".into()) }],
                vec![],
            ),
            task(
                "app",
                vec![],
                vec![Capability { name: "postgres".into(), value: Some("14".into()) }],
            ),
        ];
        let err = resolve(&mut tasks).unwrap_err();
        assert!(matches!(err, GraphError::MissingCapability { .. }));
    }
}

//! Environment layering for one task invocation (§4.7 step 5): pipeline
//! env ⊕ task env ⊕ matrix vars ⊕ resolved secrets, later layers winning.

use std::collections::BTreeMap;

use secrecy::{ExposeSecret, SecretString};
use sykli_core::ir::Task;

#[must_use]
pub fn build_task_env(
    pipeline_env: &BTreeMap<String, String>,
    task: &Task,
    secrets: &std::collections::HashMap<String, SecretString>,
    upstream_failures: &[&str],
) -> BTreeMap<String, String> {
    let mut env = pipeline_env.clone();
    env.extend(task.env.clone());
    for (key, value) in &task.matrix {
        if let Some(first) = value.first() {
            env.entry(key.clone()).or_insert_with(|| first.clone());
        }
    }
    for (name, value) in secrets {
        env.insert(name.clone(), value.expose_secret().to_string());
    }
    for upstream in upstream_failures {
        env.insert(format!("SYKLI_UPSTREAM_FAILURE_{}", upstream.to_uppercase()), "1".to_string());
    }
    env
}

//! Deterministic task fingerprinting (§4.1).
//!
//! A task's fingerprint is a SHA-256 digest over the fields that determine
//! whether a cached result is still valid: image, command, env, input file
//! contents, output declarations, and upstream artifact fingerprints. Secret
//! values are deliberately excluded — they're covered by
//! `sykli-secrets`'s own salted fingerprinting, not this digest.

mod builder;
mod error;
mod inputs;

pub use builder::DigestBuilder;
pub use error::{FingerprintError, Result};
pub use inputs::{resolve_inputs, InputFile};

use std::path::Path;

use sykli_core::ir::Task;

/// Computes a task's cache-key fingerprint by resolving its declared inputs
/// against `root` and folding image/command/env/inputs/outputs/upstream
/// fingerprints into one digest, in the order §4.1 enumerates them.
pub fn compute_task_fingerprint(
    task: &Task,
    root: &Path,
    upstream_fingerprints: &[String],
) -> Result<String> {
    let inputs = resolve_inputs(root, &task.inputs)?;
    let output_names: Vec<String> = task.outputs.keys().cloned().collect();
    let mut sorted_upstream = upstream_fingerprints.to_vec();
    sorted_upstream.sort();

    let mut builder = DigestBuilder::new();
    builder
        .add_image(task.container.as_deref().unwrap_or(""))
        .add_command(&task.command)
        .add_env(&task.env)
        .add_inputs(&inputs)
        .add_outputs(&output_names)
        .add_upstream_fingerprints(&sorted_upstream);
    Ok(builder.finalize())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use sykli_core::ir::Task;

    use super::*;

    fn task(name: &str, command: &str) -> Task {
        Task {
            name: name.to_string(),
            command: command.to_string(),
            container: None,
            mounts: Vec::new(),
            cache_mounts: Vec::new(),
            workdir: None,
            env: BTreeMap::new(),
            inputs: Vec::new(),
            outputs: BTreeMap::new(),
            input_from: Vec::new(),
            depends_on: Vec::new(),
            when: None,
            matrix: Default::default(),
            retry: 0,
            timeout_seconds: None,
            services: Vec::new(),
            secrets: Vec::new(),
            secret_refs: Vec::new(),
            target: None,
            k8s: None,
            provides: Vec::new(),
            needs: Vec::new(),
            covers: Vec::new(),
            intent: None,
            criticality: None,
            on_fail: sykli_core::ir::OnFail::default(),
            select_mode: None,
            verify: None,
            unknown: BTreeMap::new(),
        }
    }

    #[test]
    fn same_inputs_produce_same_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.rs"), b"fn main() {}").unwrap();

        let mut t = task("build", "cargo build");
        t.inputs = vec!["*.rs".to_string()];

        let a = compute_task_fingerprint(&t, dir.path(), &[]).unwrap();
        let b = compute_task_fingerprint(&t, dir.path(), &[]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn changing_command_changes_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let a = compute_task_fingerprint(&task("build", "cargo build"), dir.path(), &[]).unwrap();
        let b = compute_task_fingerprint(&task("build", "cargo test"), dir.path(), &[]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn upstream_fingerprint_order_does_not_matter() {
        let dir = tempfile::tempdir().unwrap();
        let t = task("deploy", "deploy.sh");

        let a = compute_task_fingerprint(&t, dir.path(), &["fp-a".to_string(), "fp-b".to_string()]).unwrap();
        let b = compute_task_fingerprint(&t, dir.path(), &["fp-b".to_string(), "fp-a".to_string()]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn changing_upstream_fingerprints_changes_result() {
        let dir = tempfile::tempdir().unwrap();
        let t = task("deploy", "deploy.sh");

        let a = compute_task_fingerprint(&t, dir.path(), &["fp-a".to_string()]).unwrap();
        let b = compute_task_fingerprint(&t, dir.path(), &["fp-b".to_string()]).unwrap();
        assert_ne!(a, b);
    }
}

#[cfg(test)]
mod proptests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use super::builder::DigestBuilder;

    proptest! {
        #[test]
        fn env_digest_is_order_independent(
            a in "[a-z]{1,5}",
            b in "[a-z]{1,5}",
            va in "[a-z]{1,5}",
            vb in "[a-z]{1,5}",
        ) {
            prop_assume!(a != b);
            let mut env1 = BTreeMap::new();
            env1.insert(a.clone(), va.clone());
            env1.insert(b.clone(), vb.clone());

            let mut env2 = BTreeMap::new();
            env2.insert(b, vb);
            env2.insert(a, va);

            let mut d1 = DigestBuilder::new();
            d1.add_env(&env1);
            let mut d2 = DigestBuilder::new();
            d2.add_env(&env2);

            prop_assert_eq!(d1.finalize(), d2.finalize());
        }

        #[test]
        fn distinct_commands_yield_distinct_digests(cmd_a in "[a-z ]{1,20}", cmd_b in "[a-z ]{1,20}") {
            prop_assume!(cmd_a != cmd_b);
            let mut d1 = DigestBuilder::new();
            d1.add_command(&cmd_a);
            let mut d2 = DigestBuilder::new();
            d2.add_command(&cmd_b);
            prop_assert_ne!(d1.finalize(), d2.finalize());
        }
    }
}

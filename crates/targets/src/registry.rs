//! Target name -> driver registry (spec Design Notes "Protocol-dispatched
//! targets"). A pipeline's `target:` field (task-level or pipeline default)
//! is looked up here; an unregistered name falls back to [`AnyTarget`],
//! which answers `not_supported` for every capability rather than failing
//! at lookup time.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::{AnyTarget, DockerTarget, K8sTarget, LocalTarget, Target};

pub struct Registry {
    targets: HashMap<String, Arc<dyn Target>>,
}

impl Registry {
    /// Builds the default registry: a local process driver plus any of
    /// `docker`/`k8s` whose client construction succeeds. Construction
    /// failures (e.g. no local Docker socket) simply omit that driver —
    /// it's still reachable by name but resolves to [`AnyTarget`], so a
    /// pipeline that never references it is unaffected.
    #[must_use]
    pub fn with_defaults(workspace_root: impl Into<PathBuf>, k8s_namespace: impl Into<String>) -> Self {
        let mut targets: HashMap<String, Arc<dyn Target>> = HashMap::new();
        targets.insert("local".to_string(), Arc::new(LocalTarget::new(workspace_root)));

        if let Ok(docker) = DockerTarget::connect_local() {
            targets.insert("docker".to_string(), Arc::new(docker));
        }

        targets.insert("k8s".to_string(), Arc::new(K8sTarget::new(k8s_namespace)));

        Self { targets }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self { targets: HashMap::new() }
    }

    pub fn register(&mut self, name: impl Into<String>, target: Arc<dyn Target>) {
        self.targets.insert(name.into(), target);
    }

    /// Resolves a target name to a driver, falling back to [`AnyTarget`]
    /// for anything unregistered. `None` resolves to `"local"`.
    #[must_use]
    pub fn resolve(&self, name: Option<&str>) -> Arc<dyn Target> {
        let name = name.unwrap_or("local");
        self.targets.get(name).cloned().unwrap_or_else(|| Arc::new(AnyTarget))
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Target>> {
        self.targets.values()
    }
}

//! End-to-end scheduler scenarios (§8) driven against the in-process
//! `local` driver: cache-hit admission, retry/backoff, matrix expansion,
//! and gate admission/timeout cascades.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sykli_cache::CacheStore;
use sykli_core::ir::{
    Gate, GateStrategy, OnFail, Pipeline, PipelineDefaults, RunContext, Task, TaskStatus,
};
use sykli_scheduler::{Scheduler, SchedulerConfig};
use sykli_secrets::{TargetSecretLookup, TargetSecrets};
use sykli_targets::{ExecutionOutcome, LocalTarget, Registry, Target, TaskSpec, VolumeHandle, VolumeOptions};
use tokio_util::sync::CancellationToken;

/// Wraps [`LocalTarget`] with a shared invocation counter so a cache-hit
/// scenario can assert the driver was never actually called.
struct CountingTarget {
    inner: LocalTarget,
    runs: Arc<AtomicUsize>,
}

impl CountingTarget {
    fn new(workspace_root: &Path, runs: Arc<AtomicUsize>) -> Self {
        Self { inner: LocalTarget::new(workspace_root), runs }
    }
}

#[async_trait::async_trait]
impl Target for CountingTarget {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn run(&self, spec: &TaskSpec, cancel: CancellationToken) -> sykli_targets::Result<ExecutionOutcome> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.inner.run(spec, cancel).await
    }

    async fn create_volume(&self, name: &str, opts: VolumeOptions) -> sykli_targets::Result<VolumeHandle> {
        self.inner.create_volume(name, opts).await
    }

    async fn copy_artifact(&self, src: &Path, dst: &Path) -> sykli_targets::Result<()> {
        self.inner.copy_artifact(src, dst).await
    }
}

impl TargetSecrets for CountingTarget {
    fn resolve(&self, name: &str) -> TargetSecretLookup {
        self.inner.resolve(name)
    }
}

fn task(name: &str) -> Task {
    Task {
        name: name.to_string(),
        command: "true".into(),
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
        on_fail: OnFail::default(),
        select_mode: None,
        verify: None,
        unknown: BTreeMap::new(),
    }
}

fn pipeline(tasks: Vec<Task>) -> Pipeline {
    Pipeline {
        name: "p".into(),
        tasks,
        groups: vec![],
        gates: vec![],
        defaults: PipelineDefaults::default(),
    }
}

fn make_scheduler(workspace_root: &Path, cache_dir: &Path, history_dir: &Path, target: Arc<dyn Target>) -> Scheduler {
    let config = SchedulerConfig::new(workspace_root)
        .with_cache_dir(cache_dir)
        .with_history_dir(history_dir)
        .with_concurrency(8);
    let mut registry = Registry::empty();
    registry.register("local", target);
    let cache = CacheStore::new(cache_dir);
    Scheduler::new(config, registry, cache)
}

#[tokio::test]
async fn scenario1_linear_pipeline_is_all_cached_with_zero_driver_runs_on_second_run() {
    let workspace = tempfile::tempdir().unwrap();
    std::fs::write(workspace.path().join("input.txt"), b"v1").unwrap();
    let cache_dir = workspace.path().join("cache");
    let history_dir = workspace.path().join("history");

    let mut a = task("a");
    a.inputs = vec!["input.txt".into()];
    let mut b = task("b");
    b.inputs = vec!["input.txt".into()];
    b.depends_on = vec!["a".into()];
    let graph = sykli_graph::elaborate(&pipeline(vec![a, b]), &RunContext::default()).unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let target: Arc<dyn Target> = Arc::new(CountingTarget::new(workspace.path(), runs.clone()));
    let scheduler = make_scheduler(workspace.path(), &cache_dir, &history_dir, target);
    let first = scheduler
        .run(&graph, "p", vec!["linux".into()], &BTreeMap::new(), CancellationToken::new())
        .await
        .unwrap();
    assert!(first.tasks.iter().all(|t| t.status == TaskStatus::Success));
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    let target: Arc<dyn Target> = Arc::new(CountingTarget::new(workspace.path(), runs.clone()));
    let scheduler = make_scheduler(workspace.path(), &cache_dir, &history_dir, target);
    let second = scheduler
        .run(&graph, "p", vec!["linux".into()], &BTreeMap::new(), CancellationToken::new())
        .await
        .unwrap();
    assert!(second.tasks.iter().all(|t| t.status == TaskStatus::Cached));
    assert_eq!(runs.load(Ordering::SeqCst), 2, "second run must not invoke the driver at all");
}

#[tokio::test]
async fn scenario2_diamond_with_retry_recovers_on_second_attempt() {
    let workspace = tempfile::tempdir().unwrap();

    let build = task("build");
    let mut test_a = task("test-a");
    test_a.depends_on = vec!["build".into()];
    let mut test_b = task("test-b");
    test_b.depends_on = vec!["build".into()];
    test_b.retry = 1;
    test_b.command = "test -f flaky-marker && exit 0 || { touch flaky-marker; exit 1; }".into();
    let mut publish = task("publish");
    publish.depends_on = vec!["test-a".into(), "test-b".into()];

    let graph = sykli_graph::elaborate(&pipeline(vec![build, test_a, test_b, publish]), &RunContext::default()).unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let target: Arc<dyn Target> = Arc::new(CountingTarget::new(workspace.path(), runs));
    let scheduler =
        make_scheduler(workspace.path(), &workspace.path().join("cache"), &workspace.path().join("history"), target);
    let record = scheduler
        .run(&graph, "p", vec!["linux".into()], &BTreeMap::new(), CancellationToken::new())
        .await
        .unwrap();

    assert!(record.tasks.iter().all(|t| t.status == TaskStatus::Success), "{:?}", record.tasks);
    let test_b_result = record.tasks.iter().find(|t| t.name == "test-b").unwrap();
    assert_eq!(test_b_result.attempts, 2);
}

#[tokio::test]
async fn scenario4_matrix_expansion_runs_every_declared_combination() {
    let workspace = tempfile::tempdir().unwrap();

    let mut t = task("task");
    t.matrix.insert("os".into(), vec!["linux".into(), "darwin".into()]);
    t.matrix.insert("arch".into(), vec!["amd64".into(), "arm64".into()]);

    let graph = sykli_graph::elaborate(&pipeline(vec![t]), &RunContext::default()).unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let target: Arc<dyn Target> = Arc::new(CountingTarget::new(workspace.path(), runs.clone()));
    let scheduler =
        make_scheduler(workspace.path(), &workspace.path().join("cache"), &workspace.path().join("history"), target);
    let record = scheduler
        .run(&graph, "p", vec!["linux".into()], &BTreeMap::new(), CancellationToken::new())
        .await
        .unwrap();

    let mut names: Vec<&str> = record.tasks.iter().map(|t| t.name.as_str()).collect();
    names.sort_unstable();
    let mut expected =
        vec!["task-darwin-amd64", "task-darwin-arm64", "task-linux-amd64", "task-linux-arm64"];
    expected.sort_unstable();
    assert_eq!(names, expected);
    assert!(record.tasks.iter().all(|t| t.status == TaskStatus::Success));
    assert_eq!(runs.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn scenario6_gate_admits_and_runs_downstream() {
    temp_env::async_with_vars([("SYKLI_SCHED_TEST_GATE_OK", Some("1"))], async {
        let workspace = tempfile::tempdir().unwrap();
        let build = task("build");
        let mut deploy = task("deploy");
        deploy.depends_on = vec!["approve".into()];

        let p = Pipeline {
            name: "p".into(),
            tasks: vec![build, deploy],
            groups: vec![],
            gates: vec![Gate {
                name: "approve".into(),
                strategy: GateStrategy::Env { var: "SYKLI_SCHED_TEST_GATE_OK".into() },
                timeout_seconds: 5,
            }],
            defaults: PipelineDefaults::default(),
        };
        let graph = sykli_graph::elaborate(&p, &RunContext::default()).unwrap();

        let runs = Arc::new(AtomicUsize::new(0));
        let target: Arc<dyn Target> = Arc::new(CountingTarget::new(workspace.path(), runs));
        let scheduler = make_scheduler(
            workspace.path(),
            &workspace.path().join("cache"),
            &workspace.path().join("history"),
            target,
        );
        let record = scheduler
            .run(&graph, "p", vec!["linux".into()], &BTreeMap::new(), CancellationToken::new())
            .await
            .unwrap();

        let gate_result = record.tasks.iter().find(|t| t.name == "approve").unwrap();
        assert_eq!(gate_result.status, TaskStatus::Success);
        let deploy_result = record.tasks.iter().find(|t| t.name == "deploy").unwrap();
        assert_eq!(deploy_result.status, TaskStatus::Success);
    })
    .await;
}

#[tokio::test]
async fn scenario6_gate_timeout_skips_downstream_transitively() {
    temp_env::async_with_vars([("SYKLI_SCHED_TEST_GATE_DENY", None::<&str>)], async {
        let workspace = tempfile::tempdir().unwrap();
        let build = task("build");
        let mut deploy = task("deploy");
        deploy.depends_on = vec!["approve".into()];
        let mut notify = task("notify");
        notify.depends_on = vec!["deploy".into()];

        let p = Pipeline {
            name: "p".into(),
            tasks: vec![build, deploy, notify],
            groups: vec![],
            gates: vec![Gate {
                name: "approve".into(),
                strategy: GateStrategy::Env { var: "SYKLI_SCHED_TEST_GATE_DENY".into() },
                timeout_seconds: 1,
            }],
            defaults: PipelineDefaults::default(),
        };
        let graph = sykli_graph::elaborate(&p, &RunContext::default()).unwrap();

        let runs = Arc::new(AtomicUsize::new(0));
        let target: Arc<dyn Target> = Arc::new(CountingTarget::new(workspace.path(), runs));
        let scheduler = make_scheduler(
            workspace.path(),
            &workspace.path().join("cache"),
            &workspace.path().join("history"),
            target,
        );
        let record = scheduler
            .run(&graph, "p", vec!["linux".into()], &BTreeMap::new(), CancellationToken::new())
            .await
            .unwrap();

        let gate_result = record.tasks.iter().find(|t| t.name == "approve").unwrap();
        assert_eq!(gate_result.status, TaskStatus::Gated);

        let deploy_result = record.tasks.iter().find(|t| t.name == "deploy").unwrap();
        assert_eq!(deploy_result.status, TaskStatus::Skipped);
        assert_eq!(deploy_result.reason.as_deref(), Some("upstream_gate_timeout"));

        let notify_result = record.tasks.iter().find(|t| t.name == "notify").unwrap();
        assert_eq!(notify_result.status, TaskStatus::Skipped);
    })
    .await;
}

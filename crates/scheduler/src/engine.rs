//! The scheduling loop itself (§4.7): a frontier-based DAG driver with
//! bounded concurrency, gate admission, retries, timeouts, cancellation, and
//! `on_fail` successor policy.
//!
//! Rather than computing fixed parallel groups ahead of time, this
//! scheduler admits nodes one at a time as their predecessors resolve,
//! because gates and per-task retry/timeout policy mean a node's readiness
//! isn't known until the run is already underway. Concurrency is bounded by
//! a `Semaphore`, with a `JoinSet` collecting completions.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use secrecy::SecretString;
use sykli_cache::{CacheStore, SingleFlight};
use sykli_core::ir::{Gate, OnFail, Task, TaskResult, TaskStatus};
use sykli_core::ir::RunRecord;
use sykli_gates::{AlwaysDeny, ManualPrompt};
use sykli_graph::ElaboratedGraph;
use sykli_secrets::{NoVault, SaltConfig, SecretError, SecretResolver, VaultClient};
use sykli_targets::{MountedInput, Registry, TaskSpec, VolumeKind, VolumeOptions};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::env::build_task_env;
use crate::error::{Result, SchedulerError};
use crate::graph::{NodeKind, RunGraph};
use crate::manifest::RunHistory;

struct Completion {
    name: String,
    result: TaskResult,
}

struct Inner {
    config: SchedulerConfig,
    registry: Registry,
    cache: CacheStore,
    vault: Arc<dyn VaultClient>,
    manual_prompt: Arc<dyn ManualPrompt>,
    salt: SaltConfig,
    history: RunHistory,
}

/// Drives one elaborated graph to completion (§4.7) and seals a
/// [`RunRecord`] into history (§4.8).
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    #[must_use]
    pub fn new(config: SchedulerConfig, registry: Registry, cache: CacheStore) -> Self {
        let history = RunHistory::new(config.effective_history_dir(), config.retain_runs());
        Self {
            inner: Arc::new(Inner {
                config,
                registry,
                cache,
                vault: Arc::new(NoVault),
                manual_prompt: Arc::new(AlwaysDeny),
                salt: SaltConfig::default(),
                history,
            }),
        }
    }

    /// # Panics
    /// Builder methods must be chained directly off [`Scheduler::new`],
    /// before the scheduler is cloned for use; panics otherwise.
    #[must_use]
    pub fn with_vault(mut self, vault: Arc<dyn VaultClient>) -> Self {
        Arc::get_mut(&mut self.inner).expect("scheduler builder methods must run before cloning").vault = vault;
        self
    }

    /// # Panics
    /// See [`Scheduler::with_vault`].
    #[must_use]
    pub fn with_manual_prompt(mut self, prompt: Arc<dyn ManualPrompt>) -> Self {
        Arc::get_mut(&mut self.inner).expect("scheduler builder methods must run before cloning").manual_prompt = prompt;
        self
    }

    /// # Panics
    /// See [`Scheduler::with_vault`].
    #[must_use]
    pub fn with_secret_salt(mut self, salt: SaltConfig) -> Self {
        Arc::get_mut(&mut self.inner).expect("scheduler builder methods must run before cloning").salt = salt;
        self
    }

    #[must_use]
    pub fn history(&self) -> &RunHistory {
        &self.inner.history
    }

    /// Runs `graph` to completion and returns the sealed [`RunRecord`].
    ///
    /// # Errors
    /// Returns `SchedulerError` only for whole-run conditions (history I/O,
    /// an internal invariant violation); individual task failures are
    /// carried in the returned record, never as an `Err`.
    #[instrument(skip(self, graph, pipeline_env, cancel), fields(pipeline = %pipeline_name))]
    pub async fn run(
        &self,
        graph: &ElaboratedGraph,
        pipeline_name: &str,
        local_labels: Vec<String>,
        pipeline_env: &BTreeMap<String, String>,
        cancel: CancellationToken,
    ) -> Result<RunRecord> {
        let run_graph = RunGraph::build(graph);
        let mut state = RunState::new(&run_graph);
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();

        let max_timeout_secs =
            graph.tasks.iter().filter_map(|t| t.task.timeout_seconds).max().unwrap_or(60);
        let drain_bound = Duration::from_secs(max_timeout_secs.saturating_mul(2).max(60));

        let semaphore = Arc::new(Semaphore::new(self.inner.config.effective_concurrency()));
        let mut join_set: JoinSet<Completion> = JoinSet::new();

        loop {
            if cancel.is_cancelled() && !state.cancelling {
                state.cancelling = true;
                warn!("run cancelled, closing frontier to new admissions");
            }

            while let Some(name) = state.next_launch(&run_graph) {
                match run_graph.kinds[name] {
                    NodeKind::Task => {
                        let elaborated = run_graph.tasks[name];
                        if let Some(reason) = elaborated.skip_reason {
                            let _ = reason;
                            state.record_completion(
                                &run_graph,
                                name,
                                skipped_result(name, "condition_false"),
                            );
                            continue;
                        }
                        let Some(permit) = Arc::clone(&semaphore).try_acquire_owned().ok() else {
                            state.frontier.push(name);
                            break;
                        };
                        let inner = self.inner.clone();
                        let task = elaborated.task.clone();
                        let upstream_fingerprints = state.upstream_fingerprints(&run_graph, name);
                        let upstream_failures = state.upstream_failures(&run_graph, name);
                        let pipeline_env = pipeline_env.clone();
                        let token = cancel.child_token();
                        join_set.spawn(async move {
                            let _permit = permit;
                            let result = inner
                                .execute_task(&task, &upstream_fingerprints, &upstream_failures, &pipeline_env, token)
                                .await;
                            Completion { name: task.name, result }
                        });
                    }
                    NodeKind::Gate => {
                        let gate = (*run_graph.gates[name]).clone();
                        let inner = self.inner.clone();
                        let token = cancel.child_token();
                        join_set.spawn(async move {
                            let result = inner.execute_gate(&gate, token).await;
                            Completion { name: gate.name, result }
                        });
                    }
                }
            }

            if join_set.is_empty() {
                break;
            }

            let Some(joined) = join_set.join_next().await else { break };
            match joined {
                Ok(completion) => {
                    info!(task = %completion.name, status = ?completion.result.status, "task completed");
                    state.record_completion(&run_graph, &completion.name, completion.result);
                }
                Err(join_err) => {
                    return Err(SchedulerError::Invariant(format!("task worker panicked: {join_err}")));
                }
            }
        }

        if state.cancelling {
            let _ = tokio::time::timeout(drain_bound, async {
                while join_set.join_next().await.is_some() {}
            })
            .await;
            join_set.abort_all();
        }

        for name in run_graph.node_names() {
            if !state.results.contains_key(name) {
                let reason = if state.cancelling { "cancelled" } else { "pipeline_aborted" };
                state.results.insert(name.to_string(), skipped_result(name, reason));
            }
        }

        let mut tasks: Vec<TaskResult> = state.results.into_values().collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name));

        let record = RunRecord {
            run_id,
            started_at,
            finished_at: Some(Utc::now()),
            pipeline_name: pipeline_name.to_string(),
            local_labels,
            tasks,
        };

        self.inner.history.append(&record).await?;
        Ok(record)
    }
}

impl Inner {
    #[instrument(skip(self, task, pipeline_env, cancel), fields(task = %task.name))]
    async fn execute_task(
        &self,
        task: &Task,
        upstream_fingerprints: &[String],
        upstream_failures: &[String],
        pipeline_env: &BTreeMap<String, String>,
        cancel: CancellationToken,
    ) -> TaskResult {
        let started = std::time::Instant::now();
        let driver = self.registry.resolve(task.target.as_deref().or(self.config.default_target()));
        let workspace_root = self.config.workspace_root();

        let fingerprint = match sykli_fingerprint::compute_task_fingerprint(task, workspace_root, upstream_fingerprints) {
            Ok(fp) => fp,
            Err(source) => {
                return failed_result(task, driver.name(), 0, Some(format!("fingerprint_failed: {source}")));
            }
        };

        if task.is_cacheable()
            && let Ok(Some(record)) = self.cache.lookup(&fingerprint).await
        {
            let destination = workspace_root.join(&task.name);
            if self.cache.materialize(&record, &destination).await.is_ok() {
                debug!(task = %task.name, "cache hit");
                return TaskResult {
                    name: task.name.clone(),
                    target: driver.name().to_string(),
                    status: TaskStatus::Cached,
                    cached: true,
                    duration_ms: elapsed_ms(started),
                    exit_status: Some(record.exit_status),
                    fingerprint: Some(fingerprint),
                    verify_field: None,
                    reason: None,
                    attempts: 0,
                };
            }
        }

        let single_flight = if task.is_cacheable() { self.cache.acquire(&fingerprint).await.ok() } else { None };
        if let Some(SingleFlight::Follow(record)) = &single_flight {
            let destination = workspace_root.join(&task.name);
            let _ = self.cache.materialize(record, &destination).await;
            return TaskResult {
                name: task.name.clone(),
                target: driver.name().to_string(),
                status: TaskStatus::Cached,
                cached: true,
                duration_ms: elapsed_ms(started),
                exit_status: Some(record.exit_status),
                fingerprint: Some(fingerprint),
                verify_field: None,
                reason: None,
                attempts: 0,
            };
        }
        let mut write_handle = match single_flight {
            Some(SingleFlight::Lead(handle)) => Some(handle),
            _ => None,
        };

        let max_attempts = task.retry_budget() + 1;
        let mut backoff = Duration::from_millis(500);
        let mut last_reason = None;
        let mut last_exit = None;

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return TaskResult {
                    name: task.name.clone(),
                    target: driver.name().to_string(),
                    status: TaskStatus::Failed,
                    cached: false,
                    duration_ms: elapsed_ms(started),
                    exit_status: None,
                    fingerprint: Some(fingerprint),
                    verify_field: None,
                    reason: Some("cancelled".to_string()),
                    attempts: attempt - 1,
                };
            }

            match self.try_once(task, &*driver, workspace_root, upstream_failures, pipeline_env, cancel.child_token()).await {
                Ok((outcome_exit, outcome)) => {
                    if outcome_exit == 0 && !outcome.timed_out {
                        if let Some(handle) = write_handle.as_mut() {
                            let _ = handle.write_stdout(&outcome.stdout).await;
                            let _ = handle.write_stderr(&outcome.stderr).await;
                            for (name, producer_path) in &task.outputs {
                                let src = resolve_output_path(producer_path, &self.resolved_workdir(task, workspace_root));
                                let canonical = driver.artifact_path(&task.name, name, workspace_root);
                                if driver.copy_artifact(&src, &canonical).await.is_ok() {
                                    let _ = handle.write_output(name, &canonical).await;
                                }
                            }
                        }
                        let record = match write_handle.take() {
                            Some(handle) => handle.commit(outcome_exit).await.ok(),
                            None => None,
                        };
                        let _ = record;
                        return TaskResult {
                            name: task.name.clone(),
                            target: driver.name().to_string(),
                            status: TaskStatus::Success,
                            cached: false,
                            duration_ms: elapsed_ms(started),
                            exit_status: Some(outcome_exit),
                            fingerprint: Some(fingerprint),
                            verify_field: None,
                            reason: None,
                            attempts: attempt,
                        };
                    }
                    last_exit = Some(outcome_exit);
                    last_reason = Some(if outcome.timed_out { "timeout".to_string() } else { "exec_failure".to_string() });
                }
                Err(reason) => {
                    last_reason = Some(reason);
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, self.config.retry_backoff_cap());
            }
        }

        drop(write_handle);
        TaskResult {
            name: task.name.clone(),
            target: driver.name().to_string(),
            status: TaskStatus::Failed,
            cached: false,
            duration_ms: elapsed_ms(started),
            exit_status: last_exit,
            fingerprint: Some(fingerprint),
            verify_field: None,
            reason: last_reason,
            attempts: max_attempts,
        }
    }

    fn resolved_workdir(&self, task: &Task, workspace_root: &Path) -> PathBuf {
        task.workdir.as_ref().map_or_else(|| workspace_root.to_path_buf(), PathBuf::from)
    }

    #[allow(clippy::too_many_arguments)]
    async fn try_once(
        &self,
        task: &Task,
        driver: &(dyn sykli_targets::Target + Send + Sync),
        workspace_root: &Path,
        upstream_failures: &[String],
        pipeline_env: &BTreeMap<String, String>,
        cancel: CancellationToken,
    ) -> std::result::Result<(i32, sykli_targets::ExecutionOutcome), String> {
        let secrets = self
            .resolve_secrets(task, driver)
            .map_err(|source| format!("secret_unavailable: {source}"))?;

        let workdir = self.resolved_workdir(task, workspace_root);
        let failures: Vec<&str> = upstream_failures.iter().map(String::as_str).collect();
        let env = build_task_env(pipeline_env, task, &secrets, &failures);

        let mounts = self.resolve_mounts(task, driver, workspace_root).await;
        let cache_mounts = task
            .cache_mounts
            .iter()
            .map(|m| sykli_targets::CacheMountSpec { cache_name: m.cache_name.clone(), container_path: m.container_path.clone() })
            .collect();

        for input_from in &task.input_from {
            let source = driver.artifact_path(&input_from.task, &input_from.artifact, workspace_root);
            let destination = workdir.join(&input_from.destination);
            if driver.copy_artifact(&source, &destination).await.is_err() {
                return Err(format!("artifact_unavailable: {}:{}", input_from.task, input_from.artifact));
            }
        }

        let spec = TaskSpec::build(task, workdir, env, mounts, cache_mounts);
        let timeout = spec.timeout;

        let run_fut = driver.run(&spec, cancel.clone());
        tokio::pin!(run_fut);
        let outcome = match timeout {
            Some(duration) => {
                tokio::select! {
                    biased;
                    () = tokio::time::sleep(duration) => {
                        cancel.cancel();
                        (&mut run_fut).await
                    }
                    result = &mut run_fut => result,
                }
            }
            None => run_fut.await,
        };

        outcome.map(|o| (o.exit_status, o)).map_err(|source| format!("exec_failure: {source}"))
    }

    fn resolve_secrets(
        &self,
        task: &Task,
        driver: &(dyn sykli_targets::Target + Send + Sync),
    ) -> std::result::Result<ResolvedSecretsHandle, SecretError> {
        let resolver = SecretResolver::new(driver, self.vault.as_ref(), self.salt.clone());
        let values = resolver.resolve_task_secrets(task)?;
        let mut resolved = ResolvedSecrets::default();
        for (name, value) in &values {
            if let Ok(fp) = resolver.fingerprint(name, value) {
                resolved.fingerprints.insert(name.clone(), fp);
            }
        }
        Ok(ResolvedSecretsHandle { secret_map: values, resolved })
    }

    async fn resolve_mounts(
        &self,
        task: &Task,
        driver: &(dyn sykli_targets::Target + Send + Sync),
        workspace_root: &Path,
    ) -> Vec<MountedInput> {
        let mut mounts = Vec::with_capacity(task.mounts.len());
        for mount in &task.mounts {
            let host_path = driver
                .create_volume(&mount.resource, VolumeOptions { kind: VolumeKind::Directory, size_bytes: None })
                .await
                .ok()
                .and_then(|h| h.path)
                .unwrap_or_else(|| workspace_root.join("resources").join(&mount.resource));
            mounts.push(MountedInput {
                resource: mount.resource.clone(),
                host_path,
                container_path: mount.container_path.clone(),
            });
        }
        mounts
    }

    #[instrument(skip(self, gate, cancel), fields(gate = %gate.name))]
    async fn execute_gate(&self, gate: &Gate, cancel: CancellationToken) -> TaskResult {
        let started = std::time::Instant::now();
        let admission = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(sykli_gates::GateError::Timeout { name: gate.name.clone(), timeout_secs: gate.timeout_seconds }),
            result = sykli_gates::admit(gate, self.manual_prompt.as_ref()) => result,
        };

        match admission {
            Ok(()) => TaskResult {
                name: gate.name.clone(),
                target: "gate".to_string(),
                status: TaskStatus::Success,
                cached: false,
                duration_ms: elapsed_ms(started),
                exit_status: Some(0),
                fingerprint: None,
                verify_field: None,
                reason: None,
                attempts: 1,
            },
            Err(source) => TaskResult {
                name: gate.name.clone(),
                target: "gate".to_string(),
                status: TaskStatus::Gated,
                cached: false,
                duration_ms: elapsed_ms(started),
                exit_status: None,
                fingerprint: None,
                verify_field: None,
                reason: Some(format!("gated_timeout: {source}")),
                attempts: 1,
            },
        }
    }
}

struct ResolvedSecretsHandle {
    secret_map: HashMap<String, SecretString>,
    resolved: ResolvedSecrets,
}

fn elapsed_ms(started: std::time::Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn resolve_output_path(producer_path: &str, workdir: &Path) -> PathBuf {
    let path = PathBuf::from(producer_path);
    if path.is_absolute() { path } else { workdir.join(path) }
}

fn skipped_result(name: &str, reason: &str) -> TaskResult {
    TaskResult {
        name: name.to_string(),
        target: String::new(),
        status: TaskStatus::Skipped,
        cached: false,
        duration_ms: 0,
        exit_status: None,
        fingerprint: None,
        verify_field: None,
        reason: Some(reason.to_string()),
        attempts: 0,
    }
}

fn failed_result(task: &Task, target: &'static str, duration_ms: u64, reason: Option<String>) -> TaskResult {
    TaskResult {
        name: task.name.clone(),
        target: target.to_string(),
        status: TaskStatus::Failed,
        cached: false,
        duration_ms,
        exit_status: None,
        fingerprint: None,
        verify_field: None,
        reason,
        attempts: 0,
    }
}

/// Per-run bookkeeping for the single-owner admission loop: which nodes are
/// resolved, how many distinct predecessors each remaining node still
/// awaits, and the queue of nodes ready to launch.
struct RunState<'g> {
    results: HashMap<String, TaskResult>,
    pending: HashMap<&'g str, usize>,
    frontier: Vec<&'g str>,
    aborted: bool,
    cancelling: bool,
}

impl<'g> RunState<'g> {
    fn new(run_graph: &RunGraph<'g>) -> Self {
        let pending = run_graph.pending_counts();
        let frontier = pending.iter().filter(|(_, &count)| count == 0).map(|(&name, _)| name).collect();
        Self { results: HashMap::new(), pending, frontier, aborted: false, cancelling: false }
    }

    fn next_launch(&mut self, _run_graph: &RunGraph<'g>) -> Option<&'g str> {
        if self.aborted || self.cancelling {
            return None;
        }
        self.frontier.pop()
    }

    fn upstream_fingerprints(&self, run_graph: &RunGraph<'g>, name: &str) -> Vec<String> {
        run_graph
            .predecessors
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(|pred| self.results.get(*pred))
            .filter_map(|r| r.fingerprint.clone())
            .collect()
    }

    fn upstream_failures(&self, run_graph: &RunGraph<'g>, name: &str) -> Vec<String> {
        run_graph
            .predecessors
            .get(name)
            .into_iter()
            .flatten()
            .filter(|pred| self.results.get(**pred).is_some_and(|r| r.status == TaskStatus::Failed))
            .map(|pred| (*pred).to_string())
            .collect()
    }

    fn record_completion(&mut self, run_graph: &RunGraph<'g>, name: &str, result: TaskResult) {
        let status = result.status;
        self.results.insert(name.to_string(), result);

        if status == TaskStatus::Gated {
            self.cascade_skip(run_graph, name, "upstream_gate_timeout");
            return;
        }

        if status == TaskStatus::Failed {
            let on_fail = run_graph.tasks.get(name).map_or(OnFail::Fail, |t| t.task.on_fail);
            match on_fail {
                OnFail::Fail => self.aborted = true,
                OnFail::Skip => self.cascade_skip(run_graph, name, "upstream_failed"),
                OnFail::Analyze => self.admit_successors(run_graph, name),
            }
            return;
        }

        self.admit_successors(run_graph, name);
    }

    fn admit_successors(&mut self, run_graph: &RunGraph<'g>, name: &str) {
        if self.aborted {
            return;
        }
        for &succ in run_graph.successors_of(name) {
            if self.results.contains_key(succ) {
                continue;
            }
            if let Some(count) = self.pending.get_mut(succ) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.frontier.push(succ);
                }
            }
        }
    }

    fn cascade_skip(&mut self, run_graph: &RunGraph<'g>, name: &str, reason: &str) {
        for &succ in run_graph.successors_of(name) {
            if self.results.contains_key(succ) {
                continue;
            }
            self.frontier.retain(|&n| n != succ);
            self.results.insert(succ.to_string(), skipped_result(succ, reason));
            self.cascade_skip(run_graph, succ, reason);
        }
    }
}


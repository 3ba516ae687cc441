//! Kubernetes target (§4.3): runs a task as an ephemeral batch `Job`.
//! Grounded on the retrieved `wseaton-dagrun` example's Job-based execution
//! (`src/k8s.rs`): build a `Job`/`PodSpec`/`Container`, create it, wait on
//! `kube::runtime::wait::await_condition` for completion, pull logs from the
//! job's pod, then delete the job.
//!
//! Secrets are the one capability this driver implements natively: `setup`
//! lists the namespace's `Secret` objects once and caches their decoded
//! values, since `TargetSecrets::resolve` is synchronous and the
//! Kubernetes API is not.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec, Secret as K8sSecret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams};
use kube::runtime::wait::{await_condition, conditions};
use kube::Client;
use sykli_secrets::{TargetSecretLookup, TargetSecrets};
use tokio::sync::{OnceCell, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::error::{Result, TargetError};
use crate::spec::{ExecutionOutcome, TargetOptions, TaskSpec};
use crate::Target;

pub struct K8sTarget {
    namespace: String,
    client: OnceCell<Client>,
    secrets: RwLock<HashMap<String, String>>,
}

impl K8sTarget {
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), client: OnceCell::new(), secrets: RwLock::new(HashMap::new()) }
    }

    fn client(&self) -> Result<Client> {
        self.client
            .get()
            .cloned()
            .ok_or_else(|| TargetError::Setup { target: "k8s", reason: "setup() was not called before run()".into() })
    }

    fn job_name(task_name: &str) -> String {
        let sanitized: String = task_name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '-' })
            .collect();
        let trimmed = sanitized.trim_matches('-');
        let suffix: String = (0..6).map(|_| fastrand::alphanumeric()).collect::<String>().to_lowercase();
        format!("sykli-{trimmed}-{suffix}")
    }

    fn build_job(job_name: &str, namespace: &str, spec: &TaskSpec) -> Job {
        let image = spec.container.clone().unwrap_or_default();
        let full_command = match spec.workdir.to_str() {
            Some(dir) if !dir.is_empty() && dir != "." => format!("cd {dir} && {}", spec.command),
            _ => spec.command.clone(),
        };

        let resources = spec.k8s.as_ref().and_then(|k8s| {
            if k8s.cpu.is_none() && k8s.memory.is_none() {
                return None;
            }
            let mut limits = BTreeMap::new();
            if let Some(cpu) = &k8s.cpu {
                limits.insert("cpu".to_string(), k8s_openapi::apimachinery::pkg::api::resource::Quantity(cpu.clone()));
            }
            if let Some(memory) = &k8s.memory {
                limits.insert("memory".to_string(), k8s_openapi::apimachinery::pkg::api::resource::Quantity(memory.clone()));
            }
            Some(k8s_openapi::api::core::v1::ResourceRequirements {
                limits: Some(limits.clone()),
                requests: Some(limits),
                claims: None,
            })
        });

        let node_selector = spec.k8s.as_ref().filter(|k| !k.node_selectors.is_empty()).map(|k| k.node_selectors.clone());

        let env = spec
            .env
            .iter()
            .map(|(k, v)| k8s_openapi::api::core::v1::EnvVar { name: k.clone(), value: Some(v.clone()), value_from: None })
            .collect();

        let container = Container {
            name: "task".to_string(),
            image: Some(image),
            command: Some(vec!["sh".to_string(), "-c".to_string()]),
            args: Some(vec![full_command]),
            env: Some(env),
            resources,
            ..Default::default()
        };

        let mut labels = BTreeMap::new();
        labels.insert("sykli.task".to_string(), job_name.to_string());

        Job {
            metadata: ObjectMeta {
                name: Some(job_name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            spec: Some(JobSpec {
                backoff_limit: Some(0),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta { labels: Some(labels), ..Default::default() }),
                    spec: Some(PodSpec {
                        restart_policy: Some("Never".to_string()),
                        node_selector,
                        containers: vec![container],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            status: None,
        }
    }

    async fn pod_logs(&self, client: &Client, job_name: &str) -> Vec<u8> {
        use k8s_openapi::api::core::v1::Pod;
        let pods: Api<Pod> = Api::namespaced(client.clone(), &self.namespace);
        let selector = format!("sykli.task={job_name}");
        let Ok(list) = pods.list(&ListParams::default().labels(&selector)).await else {
            return Vec::new();
        };
        let Some(pod) = list.items.first() else {
            return Vec::new();
        };
        let Some(name) = &pod.metadata.name else {
            return Vec::new();
        };
        pods.logs(name, &LogParams::default()).await.map(String::into_bytes).unwrap_or_default()
    }
}

#[async_trait]
impl Target for K8sTarget {
    fn name(&self) -> &'static str {
        "k8s"
    }

    #[instrument(skip(self, _opts))]
    async fn setup(&self, _opts: &TargetOptions) -> Result<()> {
        let client = Client::try_default().await.map_err(|source| TargetError::Setup { target: self.name(), reason: source.to_string() })?;

        let api: Api<K8sSecret> = Api::namespaced(client.clone(), &self.namespace);
        if let Ok(list) = api.list(&ListParams::default()).await {
            let mut cache = self.secrets.write().await;
            for secret in list {
                let Some(name) = secret.metadata.name.clone() else { continue };
                let Some(data) = secret.data else { continue };
                for (key, value) in data {
                    if let Ok(decoded) = String::from_utf8(value.0) {
                        cache.insert(format!("{name}/{key}"), decoded);
                    }
                }
            }
        } else {
            warn!(namespace = %self.namespace, "could not list secrets during k8s target setup");
        }

        self.client.set(client).map_err(|_| TargetError::Setup { target: self.name(), reason: "setup() called more than once".into() })?;
        Ok(())
    }

    #[instrument(skip(self, spec, cancel), fields(task = %spec.name))]
    async fn run(&self, spec: &TaskSpec, cancel: CancellationToken) -> Result<ExecutionOutcome> {
        let client = self.client()?;
        let jobs: Api<Job> = Api::namespaced(client.clone(), &self.namespace);

        let job_name = Self::job_name(&spec.name);
        let job = Self::build_job(&job_name, &self.namespace, spec);
        jobs.create(&PostParams::default(), &job)
            .await
            .map_err(|source| TargetError::Exec { target: self.name(), task: spec.name.clone(), reason: source.to_string() })?;

        info!(task = %spec.name, job = %job_name, "created kubernetes job");

        let timeout = spec.timeout.unwrap_or(Duration::from_secs(3600));
        let wait = await_condition(jobs.clone(), &job_name, conditions::is_job_completed());

        let completed = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = jobs.delete(&job_name, &DeleteParams::background()).await;
                return Ok(ExecutionOutcome {
                    exit_status: -1,
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                    produced_outputs: Vec::new(),
                    timed_out: true,
                });
            }
            result = tokio::time::timeout(timeout, wait) => result,
        };

        let logs = self.pod_logs(&client, &job_name).await;

        let exit_status = match completed {
            Ok(Ok(Some(job))) => {
                let succeeded = job.status.as_ref().and_then(|s| s.succeeded).unwrap_or(0) > 0;
                i32::from(!succeeded)
            }
            Ok(Ok(None)) | Ok(Err(_)) => 1,
            Err(_elapsed) => {
                let _ = jobs.delete(&job_name, &DeleteParams::default()).await;
                return Ok(ExecutionOutcome { exit_status: -1, stdout: logs, stderr: Vec::new(), produced_outputs: Vec::new(), timed_out: true });
            }
        };

        let _ = jobs.delete(&job_name, &DeleteParams::default()).await;

        Ok(ExecutionOutcome { exit_status, stdout: logs, stderr: Vec::new(), produced_outputs: Vec::new(), timed_out: false })
    }

}

impl TargetSecrets for K8sTarget {
    fn resolve(&self, name: &str) -> TargetSecretLookup {
        match self.secrets.try_read() {
            Ok(cache) => cache.get(name).cloned().map_or(TargetSecretLookup::NotFound, TargetSecretLookup::Found),
            Err(_) => TargetSecretLookup::NotSupported,
        }
    }
}

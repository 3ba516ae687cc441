//! Run Manifest & History (§4.8).
//!
//! Appends a sealed [`RunRecord`] per run under
//! `{history_dir}/{pipeline_name}/{run_id}.json`, pruning the oldest entries
//! once a pipeline exceeds its retention count. Grounded on the same
//! write-to-temp-then-rename discipline `sykli-cache`'s `WriteHandle::commit`
//! uses, so a crash mid-write never leaves a half-written manifest file
//! observable to a reader.

use std::path::{Path, PathBuf};

use sykli_core::ir::RunRecord;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, SchedulerError};

pub struct RunHistory {
    root: PathBuf,
    retain_runs: usize,
}

impl RunHistory {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, retain_runs: usize) -> Self {
        Self { root: root.into(), retain_runs }
    }

    fn pipeline_dir(&self, pipeline_name: &str) -> PathBuf {
        self.root.join(sanitize(pipeline_name))
    }

    fn record_path(&self, pipeline_name: &str, run_id: &str) -> PathBuf {
        self.pipeline_dir(pipeline_name).join(format!("{run_id}.json"))
    }

    /// Appends a sealed run record, then prunes the oldest records beyond
    /// `retain_runs` for that pipeline.
    #[instrument(skip(self, record), fields(pipeline = %record.pipeline_name, run_id = %record.run_id))]
    pub async fn append(&self, record: &RunRecord) -> Result<()> {
        let dir = self.pipeline_dir(&record.pipeline_name);
        tokio::fs::create_dir_all(&dir).await?;

        let token = Uuid::new_v4().to_string();
        let tmp_path = dir.join(format!(".{token}.tmp"));
        let json = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&tmp_path, &json).await?;

        let final_path = self.record_path(&record.pipeline_name, &record.run_id);
        tokio::fs::rename(&tmp_path, &final_path).await?;
        debug!(path = %final_path.display(), "sealed run record");

        self.prune(&record.pipeline_name).await
    }

    async fn prune(&self, pipeline_name: &str) -> Result<()> {
        let mut records = self.list_all(pipeline_name).await?;
        if records.len() <= self.retain_runs {
            return Ok(());
        }
        records.sort_by_key(|r| r.started_at);
        let excess = records.len() - self.retain_runs;
        for record in &records[..excess] {
            let path = self.record_path(pipeline_name, &record.run_id);
            if let Err(source) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), %source, "failed to prune old run record");
            }
        }
        Ok(())
    }

    async fn list_all(&self, pipeline_name: &str) -> Result<Vec<RunRecord>> {
        let dir = self.pipeline_dir(pipeline_name);
        let mut records = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
            Err(e) => return Err(SchedulerError::History(e)),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().is_some_and(|ext| ext == "json")
                && let Some(record) = read_record(&entry.path()).await
            {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// `latest(pipeline) -> RunRecord`.
    pub async fn latest(&self, pipeline_name: &str) -> Result<Option<RunRecord>> {
        let mut records = self.list_all(pipeline_name).await?;
        records.sort_by_key(|r| r.started_at);
        Ok(records.pop())
    }

    /// `list(pipeline, limit)`, most recent first.
    pub async fn list(&self, pipeline_name: &str, limit: usize) -> Result<Vec<RunRecord>> {
        let mut records = self.list_all(pipeline_name).await?;
        records.sort_by_key(|r| std::cmp::Reverse(r.started_at));
        records.truncate(limit);
        Ok(records)
    }

    /// `by_id(run_id)`, scanning every pipeline's history since a run id
    /// alone doesn't name its pipeline.
    pub async fn by_id(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let mut dirs = match tokio::fs::read_dir(&self.root).await {
            Ok(dirs) => dirs,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SchedulerError::History(e)),
        };
        while let Some(entry) = dirs.next_entry().await? {
            if !entry.file_type().await.is_ok_and(|ft| ft.is_dir()) {
                continue;
            }
            let candidate = entry.path().join(format!("{run_id}.json"));
            if let Some(record) = read_record(&candidate).await {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

async fn read_record(path: &Path) -> Option<RunRecord> {
    let bytes = tokio::fs::read(path).await.ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(record) => Some(record),
        Err(source) => {
            warn!(path = %path.display(), %source, "corrupt run record, ignoring");
            None
        }
    }
}

fn sanitize(pipeline_name: &str) -> String {
    pipeline_name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use sykli_core::ir::TaskResult;

    fn record(pipeline: &str, run_id: &str, started_at: chrono::DateTime<Utc>) -> RunRecord {
        RunRecord {
            run_id: run_id.to_string(),
            started_at,
            finished_at: Some(started_at),
            pipeline_name: pipeline.to_string(),
            local_labels: vec![],
            tasks: vec![TaskResult {
                name: "build".into(),
                target: "local".into(),
                status: sykli_core::ir::TaskStatus::Success,
                cached: false,
                duration_ms: 10,
                exit_status: Some(0),
                fingerprint: None,
                verify_field: None,
                reason: None,
                attempts: 1,
            }],
        }
    }

    #[tokio::test]
    async fn append_then_latest_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::new(dir.path(), 50);
        let r = record("p", "run-1", Utc::now());
        history.append(&r).await.unwrap();
        let latest = history.latest("p").await.unwrap().unwrap();
        assert_eq!(latest.run_id, "run-1");
    }

    #[tokio::test]
    async fn retains_only_the_newest_n_runs() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::new(dir.path(), 2);
        let base = Utc::now();
        for i in 0..5 {
            let r = record("p", &format!("run-{i}"), base + ChronoDuration::seconds(i));
            history.append(&r).await.unwrap();
        }
        let remaining = history.list_all("p").await.unwrap();
        assert_eq!(remaining.len(), 2);
        let latest = history.latest("p").await.unwrap().unwrap();
        assert_eq!(latest.run_id, "run-4");
    }

    #[tokio::test]
    async fn by_id_scans_across_pipelines() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::new(dir.path(), 50);
        history.append(&record("alpha", "run-x", Utc::now())).await.unwrap();
        let found = history.by_id("run-x").await.unwrap().unwrap();
        assert_eq!(found.pipeline_name, "alpha");
    }

    #[tokio::test]
    async fn list_orders_most_recent_first() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::new(dir.path(), 50);
        let base = Utc::now();
        history.append(&record("p", "run-a", base)).await.unwrap();
        history.append(&record("p", "run-b", base + ChronoDuration::seconds(5))).await.unwrap();
        let listed = history.list("p", 10).await.unwrap();
        assert_eq!(listed[0].run_id, "run-b");
        assert_eq!(listed[1].run_id, "run-a");
    }
}

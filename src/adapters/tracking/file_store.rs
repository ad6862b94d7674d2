//! Run tracking on the local filesystem, in the directory layout of an MLflow
//! file store so the usual UI can browse it (`mlflow ui --backend-store-uri`).
//!
//! ```text
//! {root}/{experiment_id}/meta.yaml
//! {root}/{experiment_id}/{run_id}/meta.yaml
//! {root}/{experiment_id}/{run_id}/params/{key}
//! {root}/{experiment_id}/{run_id}/metrics/{key}     "timestamp value step" per line
//! {root}/{experiment_id}/{run_id}/tags/{key}
//! {root}/{experiment_id}/{run_id}/artifacts/{dir}/{file}
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tracing::info;

use crate::application::ports::RunTrackerPort;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::training::RunStatus;

#[derive(Debug, Serialize, Deserialize)]
struct ExperimentMeta {
    artifact_location: String,
    creation_time: i64,
    experiment_id: String,
    last_update_time: i64,
    lifecycle_stage: String,
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunMeta {
    artifact_uri: String,
    end_time: Option<i64>,
    entry_point_name: String,
    experiment_id: String,
    lifecycle_stage: String,
    run_id: String,
    run_name: String,
    run_uuid: String,
    source_name: String,
    source_type: u8,
    source_version: String,
    start_time: i64,
    status: u8,
    tags: Vec<String>,
    user_id: String,
}

/// Numeric status codes of the store format.
fn status_code(status: RunStatus) -> u8 {
    match status {
        RunStatus::Running => 1,
        RunStatus::Finished => 3,
        RunStatus::Failed => 4,
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn file_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

pub struct FileRunStore {
    root: PathBuf,
    runs: Mutex<HashMap<String, PathBuf>>,
}

impl FileRunStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            runs: Mutex::new(HashMap::new()),
        }
    }

    fn run_dir(&self, run_id: &str) -> DomainResult<PathBuf> {
        let runs = self
            .runs
            .lock()
            .map_err(|_| DomainError::OperationFailed("run registry lock poisoned".into()))?;
        runs.get(run_id)
            .cloned()
            .ok_or_else(|| DomainError::NotFound(format!("run {run_id}")))
    }

    /// Id of the experiment named `name`, creating it if needed.
    async fn experiment_id(&self, name: &str) -> DomainResult<String> {
        fs::create_dir_all(&self.root).await?;

        let mut max_id: u64 = 0;
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(id) = entry.file_name().to_string_lossy().parse::<u64>() else {
                continue;
            };
            max_id = max_id.max(id);
            let Ok(text) = fs::read_to_string(entry.path().join("meta.yaml")).await else {
                continue;
            };
            if let Ok(meta) = serde_yaml::from_str::<ExperimentMeta>(&text) {
                if meta.name == name && meta.lifecycle_stage == "active" {
                    return Ok(meta.experiment_id);
                }
            }
        }

        // 0 is the store's default experiment
        let id = (max_id + 1).to_string();
        let dir = self.root.join(&id);
        fs::create_dir_all(&dir).await?;
        let now = now_ms();
        let meta = ExperimentMeta {
            artifact_location: file_uri(&dir),
            creation_time: now,
            experiment_id: id.clone(),
            last_update_time: now,
            lifecycle_stage: "active".into(),
            name: name.to_string(),
        };
        write_yaml(&dir.join("meta.yaml"), &meta).await?;
        info!(experiment = name, id = %id, "created experiment");
        Ok(id)
    }
}

async fn write_yaml<T: Serialize>(path: &Path, value: &T) -> DomainResult<()> {
    let text = serde_yaml::to_string(value).map_err(|e| DomainError::OperationFailed(e.to_string()))?;
    fs::write(path, text).await?;
    Ok(())
}

async fn read_run_meta(run_dir: &Path) -> DomainResult<RunMeta> {
    let text = fs::read_to_string(run_dir.join("meta.yaml")).await?;
    serde_yaml::from_str(&text).map_err(|e| DomainError::OperationFailed(e.to_string()))
}

fn check_key(key: &str) -> DomainResult<()> {
    if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
        return Err(DomainError::InvalidInput(format!("invalid tracking key {key:?}")));
    }
    Ok(())
}

#[async_trait]
impl RunTrackerPort for FileRunStore {
    async fn start_run(&self, experiment: &str, run_name: &str) -> DomainResult<String> {
        let experiment_id = self.experiment_id(experiment).await?;
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let run_dir = self.root.join(&experiment_id).join(&run_id);

        for sub in ["params", "metrics", "tags", "artifacts"] {
            fs::create_dir_all(run_dir.join(sub)).await?;
        }
        let meta = RunMeta {
            artifact_uri: file_uri(&run_dir.join("artifacts")),
            end_time: None,
            entry_point_name: String::new(),
            experiment_id,
            lifecycle_stage: "active".into(),
            run_id: run_id.clone(),
            run_name: run_name.to_string(),
            run_uuid: run_id.clone(),
            source_name: String::new(),
            source_type: 4,
            source_version: String::new(),
            start_time: now_ms(),
            status: status_code(RunStatus::Running),
            tags: vec![],
            user_id: std::env::var("USER").unwrap_or_else(|_| "unknown".into()),
        };
        write_yaml(&run_dir.join("meta.yaml"), &meta).await?;
        fs::write(run_dir.join("tags").join("mlflow.runName"), run_name).await?;

        self.runs
            .lock()
            .map_err(|_| DomainError::OperationFailed("run registry lock poisoned".into()))?
            .insert(run_id.clone(), run_dir);
        info!(run_id = %run_id, run_name, "run started");
        Ok(run_id)
    }

    async fn log_params(&self, run_id: &str, params: &BTreeMap<String, String>) -> DomainResult<()> {
        let dir = self.run_dir(run_id)?.join("params");
        for (key, value) in params {
            check_key(key)?;
            fs::write(dir.join(key), value).await?;
        }
        Ok(())
    }

    async fn log_metrics(&self, run_id: &str, metrics: &BTreeMap<String, f64>) -> DomainResult<()> {
        let dir = self.run_dir(run_id)?.join("metrics");
        let ts = now_ms();
        for (key, value) in metrics {
            check_key(key)?;
            let path = dir.join(key);
            let mut text = fs::read_to_string(&path).await.unwrap_or_default();
            text.push_str(&format!("{ts} {value} 0\n"));
            fs::write(&path, text).await?;
        }
        Ok(())
    }

    async fn log_artifact(&self, run_id: &str, path: &Path, artifact_dir: &str) -> DomainResult<()> {
        let file_name = path
            .file_name()
            .ok_or_else(|| DomainError::InvalidInput(format!("not a file: {}", path.display())))?;
        let dest_dir = self.run_dir(run_id)?.join("artifacts").join(artifact_dir);
        fs::create_dir_all(&dest_dir).await?;
        fs::copy(path, dest_dir.join(file_name)).await?;
        info!(artifact = %path.display(), artifact_dir, "artifact logged");
        Ok(())
    }

    async fn end_run(&self, run_id: &str, status: RunStatus) -> DomainResult<()> {
        let run_dir = self.run_dir(run_id)?;
        let mut meta = read_run_meta(&run_dir).await?;
        meta.status = status_code(status);
        meta.end_time = Some(now_ms());
        write_yaml(&run_dir.join("meta.yaml"), &meta).await
    }

    fn location(&self) -> String {
        format!("mlflow ui --backend-store-uri {}", file_uri(&self.root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_lifecycle_writes_store_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRunStore::new(dir.path().join("mlruns"));

        let run_id = store.start_run("EcoVision_Waste_Detection", "yolov8n_waste_training").await.unwrap();
        assert_eq!(run_id.len(), 32);

        let params = BTreeMap::from([("epochs".to_string(), "4".to_string())]);
        store.log_params(&run_id, &params).await.unwrap();
        let metrics = BTreeMap::from([("co2_emissions_kg".to_string(), 0.0125)]);
        store.log_metrics(&run_id, &metrics).await.unwrap();

        let weights = dir.path().join("best.pt");
        std::fs::write(&weights, b"weights").unwrap();
        store.log_artifact(&run_id, &weights, "model").await.unwrap();
        store.end_run(&run_id, RunStatus::Finished).await.unwrap();

        let run_dir = dir.path().join("mlruns").join("1").join(&run_id);
        assert_eq!(std::fs::read_to_string(run_dir.join("params/epochs")).unwrap(), "4");
        let metric = std::fs::read_to_string(run_dir.join("metrics/co2_emissions_kg")).unwrap();
        let fields: Vec<_> = metric.split_whitespace().collect();
        assert_eq!(fields[1..], ["0.0125", "0"]);
        assert_eq!(std::fs::read(run_dir.join("artifacts/model/best.pt")).unwrap(), b"weights");
        assert_eq!(
            std::fs::read_to_string(run_dir.join("tags/mlflow.runName")).unwrap(),
            "yolov8n_waste_training"
        );

        let meta = read_run_meta(&run_dir).await.unwrap();
        assert_eq!(meta.status, 3);
        assert!(meta.end_time.is_some());
    }

    #[tokio::test]
    async fn experiments_are_reused_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRunStore::new(dir.path());
        let a = store.experiment_id("first").await.unwrap();
        let b = store.experiment_id("second").await.unwrap();
        let again = FileRunStore::new(dir.path()).experiment_id("first").await.unwrap();
        assert_eq!(a, "1");
        assert_eq!(b, "2");
        assert_eq!(again, a);
    }

    #[tokio::test]
    async fn failed_run_is_marked_failed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRunStore::new(dir.path());
        let run_id = store.start_run("exp", "run").await.unwrap();
        store.end_run(&run_id, RunStatus::Failed).await.unwrap();
        let meta = read_run_meta(&store.run_dir(&run_id).unwrap()).await.unwrap();
        assert_eq!(meta.status, 4);
    }

    #[tokio::test]
    async fn unknown_run_and_bad_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRunStore::new(dir.path());
        let err = store.log_params("nope", &BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));

        let run_id = store.start_run("exp", "run").await.unwrap();
        let bad = BTreeMap::from([("../escape".to_string(), 1.0)]);
        let err = store.log_metrics(&run_id, &bad).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }
}

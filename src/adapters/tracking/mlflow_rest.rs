use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

use crate::application::ports::RunTrackerPort;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::training::RunStatus;

/// Run tracking against an MLflow tracking server (REST API 2.0).
/// Artifacts go through the server's artifact proxy.
pub struct MlflowRestTracker {
    client: reqwest::Client,
    base_url: String,
    /// run id -> experiment id, needed for artifact paths
    experiments: Mutex<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct ExperimentEnvelope {
    experiment: ExperimentInfo,
}

#[derive(Debug, Deserialize)]
struct ExperimentInfo {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct RunEnvelope {
    run: RunBody,
}

#[derive(Debug, Deserialize)]
struct RunBody {
    info: RunInfo,
}

#[derive(Debug, Deserialize)]
struct RunInfo {
    run_id: String,
}

#[derive(Debug, Serialize)]
struct KeyValue<'a> {
    key: &'a str,
    value: String,
}

#[derive(Debug, Serialize)]
struct MetricEntry<'a> {
    key: &'a str,
    value: f64,
    timestamp: i64,
    step: i64,
}

fn remote(e: impl std::fmt::Display) -> DomainError {
    DomainError::OperationFailed(format!("tracking server: {e}"))
}

impl MlflowRestTracker {
    pub fn new(base_url: &str, timeout: Duration) -> DomainResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(remote)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            experiments: Mutex::new(HashMap::new()),
        })
    }

    fn api(&self, method: &str) -> String {
        format!("{}/api/2.0/mlflow/{}", self.base_url, method)
    }

    async fn post<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> DomainResult<T> {
        let res = self
            .client
            .post(self.api(method))
            .json(&body)
            .send()
            .await
            .map_err(remote)?;
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(remote(format!("{method} returned {status}: {text}")));
        }
        res.json::<T>().await.map_err(remote)
    }

    async fn experiment_id(&self, name: &str) -> DomainResult<String> {
        let res = self
            .client
            .get(self.api("experiments/get-by-name"))
            .query(&[("experiment_name", name)])
            .send()
            .await
            .map_err(remote)?;

        let status = res.status();
        if status.is_success() {
            let env: ExperimentEnvelope = res.json().await.map_err(remote)?;
            Ok(env.experiment.experiment_id)
        } else if status == StatusCode::NOT_FOUND {
            let created: CreateExperimentResponse =
                self.post("experiments/create", json!({ "name": name })).await?;
            info!(experiment = name, id = %created.experiment_id, "created experiment");
            Ok(created.experiment_id)
        } else {
            Err(remote(format!("experiments/get-by-name returned {status}")))
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl RunTrackerPort for MlflowRestTracker {
    async fn start_run(&self, experiment: &str, run_name: &str) -> DomainResult<String> {
        let experiment_id = self.experiment_id(experiment).await?;
        let env: RunEnvelope = self
            .post(
                "runs/create",
                json!({
                    "experiment_id": experiment_id,
                    "run_name": run_name,
                    "start_time": now_ms(),
                    "tags": [{ "key": "mlflow.runName", "value": run_name }],
                }),
            )
            .await?;
        let run_id = env.run.info.run_id;
        self.experiments
            .lock()
            .map_err(|_| DomainError::OperationFailed("run registry lock poisoned".into()))?
            .insert(run_id.clone(), experiment_id);
        info!(run_id = %run_id, run_name, "run started");
        Ok(run_id)
    }

    async fn log_params(&self, run_id: &str, params: &BTreeMap<String, String>) -> DomainResult<()> {
        let params: Vec<KeyValue> = params
            .iter()
            .map(|(k, v)| KeyValue { key: k, value: v.clone() })
            .collect();
        let _: serde_json::Value = self
            .post("runs/log-batch", json!({ "run_id": run_id, "params": params }))
            .await?;
        Ok(())
    }

    async fn log_metrics(&self, run_id: &str, metrics: &BTreeMap<String, f64>) -> DomainResult<()> {
        let ts = now_ms();
        let metrics: Vec<MetricEntry> = metrics
            .iter()
            .map(|(k, v)| MetricEntry { key: k, value: *v, timestamp: ts, step: 0 })
            .collect();
        let _: serde_json::Value = self
            .post("runs/log-batch", json!({ "run_id": run_id, "metrics": metrics }))
            .await?;
        Ok(())
    }

    async fn log_artifact(&self, run_id: &str, path: &Path, artifact_dir: &str) -> DomainResult<()> {
        let experiment_id = self
            .experiments
            .lock()
            .map_err(|_| DomainError::OperationFailed("run registry lock poisoned".into()))?
            .get(run_id)
            .cloned()
            .ok_or_else(|| DomainError::NotFound(format!("run {run_id}")))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| DomainError::InvalidInput(format!("not a file: {}", path.display())))?;

        let bytes = tokio::fs::read(path).await?;
        let url = format!(
            "{}/api/2.0/mlflow-artifacts/artifacts/{}/{}/artifacts/{}/{}",
            self.base_url, experiment_id, run_id, artifact_dir, file_name
        );
        let res = self.client.put(url).body(bytes).send().await.map_err(remote)?;
        if !res.status().is_success() {
            return Err(remote(format!("artifact upload returned {}", res.status())));
        }
        info!(artifact = %path.display(), artifact_dir, "artifact logged");
        Ok(())
    }

    async fn end_run(&self, run_id: &str, status: RunStatus) -> DomainResult<()> {
        let _: serde_json::Value = self
            .post(
                "runs/update",
                json!({ "run_id": run_id, "status": status.as_str(), "end_time": now_ms() }),
            )
            .await?;
        Ok(())
    }

    fn location(&self) -> String {
        format!("{}/#/experiments", self.base_url)
    }
}

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

use crate::adapters::training::results::read_final_metrics;
use crate::application::ports::TrainerPort;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::training::{TrainingOutcome, TrainingRequest};

/// Drives the Ultralytics `yolo` CLI as a child process.
pub struct UltralyticsCliTrainer {
    program: String,
}

impl UltralyticsCliTrainer {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    /// `detect train key=value ...`, fixed augmentation extras included.
    pub fn build_args(request: &TrainingRequest) -> Vec<String> {
        let p = &request.params;
        let py_bool = |b: bool| if b { "True" } else { "False" };

        let mut args = vec!["detect".to_string(), "train".to_string()];
        let kv = [
            ("data", request.dataset.display().to_string()),
            ("model", request.base_weights.display().to_string()),
            ("epochs", p.epochs.to_string()),
            ("imgsz", p.imgsz.to_string()),
            ("batch", p.batch.to_string()),
            ("project", request.project_dir.display().to_string()),
            ("name", request.run_name.clone()),
            ("exist_ok", "True".into()),
            ("patience", p.patience.to_string()),
            ("save", "True".into()),
            ("plots", "False".into()),
            ("device", p.device.to_string()),
            ("workers", p.workers.to_string()),
            ("cache", "False".into()),
            ("augment", py_bool(p.augment).into()),
            ("scale", p.scale.to_string()),
            ("translate", p.translate.to_string()),
            ("shear", "0.0".into()),
            ("flipud", "0.0".into()),
            ("fliplr", p.fliplr.to_string()),
            ("seed", "0".into()),
            ("val", "True".into()),
            ("verbose", "True".into()),
        ];
        args.extend(kv.into_iter().map(|(k, v)| format!("{k}={v}")));
        args
    }
}

#[async_trait]
impl TrainerPort for UltralyticsCliTrainer {
    async fn train(&self, request: &TrainingRequest) -> DomainResult<TrainingOutcome> {
        let args = Self::build_args(request);
        info!(program = %self.program, ?args, "launching trainer");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DomainError::TrainingFailed(format!("cannot start {}: {e}", self.program)))?;

        let stdout = child.stdout.take().map(|s| tokio::spawn(forward_lines(s, "stdout")));
        let stderr = child.stderr.take().map(|s| tokio::spawn(forward_lines(s, "stderr")));

        let status = child
            .wait()
            .await
            .map_err(|e| DomainError::TrainingFailed(format!("waiting for trainer: {e}")))?;
        for task in [stdout, stderr].into_iter().flatten() {
            let _ = task.await;
        }

        if !status.success() {
            return Err(DomainError::TrainingFailed(format!("trainer exited with {status}")));
        }

        let results = request.run_dir().join("results.csv");
        let metrics = read_final_metrics(&results).await?;
        if metrics.is_none() {
            warn!(path = %results.display(), "no results table after training");
        }
        Ok(TrainingOutcome { metrics })
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: R, stream: &'static str) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => info!(target: "ecovision::trainer", stream, "{line}"),
            Ok(None) => break,
            Err(e) => {
                warn!(stream, error = %e, "trainer output unreadable");
                break;
            }
        }
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::model::Device;

/// Hyperparameters logged at run start and passed to the trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    pub model: String,
    pub epochs: u32,
    pub imgsz: u32,
    pub batch: u32,
    pub patience: u32,
    pub device: Device,
    pub workers: u32,
    pub augment: bool,
    pub scale: f32,
    pub translate: f32,
    pub fliplr: f32,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            model: "yolov8n".into(),
            epochs: 4,
            imgsz: 416,
            batch: 4,
            patience: 2,
            device: Device::Cpu,
            workers: 2,
            augment: true,
            scale: 0.5,
            translate: 0.1,
            fliplr: 0.5,
        }
    }
}

impl TrainingParams {
    /// Flat name -> value view used for run tracking.
    pub fn to_param_map(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        out.insert("model".into(), self.model.clone());
        out.insert("epochs".into(), self.epochs.to_string());
        out.insert("imgsz".into(), self.imgsz.to_string());
        out.insert("batch".into(), self.batch.to_string());
        out.insert("patience".into(), self.patience.to_string());
        out.insert("device".into(), self.device.to_string());
        out.insert("workers".into(), self.workers.to_string());
        // Python-style booleans, as the trainer CLI expects them
        out.insert("augment".into(), if self.augment { "True" } else { "False" }.into());
        out.insert("scale".into(), self.scale.to_string());
        out.insert("translate".into(), self.translate.to_string());
        out.insert("fliplr".into(), self.fliplr.to_string());
        out
    }
}

/// Everything the trainer needs for one fine-tuning run.
#[derive(Debug, Clone)]
pub struct TrainingRequest {
    pub params: TrainingParams,
    pub dataset: PathBuf,
    pub base_weights: PathBuf,
    /// Parent directory of all runs (`{base}/models/trained`).
    pub project_dir: PathBuf,
    pub run_name: String,
}

impl TrainingRequest {
    pub fn run_dir(&self) -> PathBuf {
        self.project_dir.join(&self.run_name)
    }

    /// `{project}/{run_name}/weights/best.pt`
    pub fn best_weights(&self) -> PathBuf {
        self.run_dir().join("weights").join("best.pt")
    }
}

/// Raw trainer output, keyed by the trainer's own metric names.
#[derive(Debug, Clone, Default)]
pub struct TrainingOutcome {
    pub metrics: Option<BTreeMap<String, f64>>,
}

/// Final validation metrics; absent values default to zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TrainingMetrics {
    pub map50: f64,
    pub map50_95: f64,
    pub precision: f64,
    pub recall: f64,
}

impl TrainingMetrics {
    pub const MAP50_KEY: &'static str = "metrics/mAP50(B)";
    pub const MAP50_95_KEY: &'static str = "metrics/mAP50-95(B)";
    pub const PRECISION_KEY: &'static str = "metrics/precision(B)";
    pub const RECALL_KEY: &'static str = "metrics/recall(B)";

    pub fn from_results(results: Option<&BTreeMap<String, f64>>) -> Self {
        let get = |key: &str| results.and_then(|r| r.get(key).copied()).unwrap_or(0.0);
        Self {
            map50: get(Self::MAP50_KEY),
            map50_95: get(Self::MAP50_95_KEY),
            precision: get(Self::PRECISION_KEY),
            recall: get(Self::RECALL_KEY),
        }
    }

    /// Names under which the metrics are logged.
    pub fn to_metric_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("final_mAP50".to_string(), self.map50),
            ("final_mAP50-95".to_string(), self.map50_95),
            ("final_precision".to_string(), self.precision),
            ("final_recall".to_string(), self.recall),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingRun {
    pub run_id: String,
    pub parameters: BTreeMap<String, String>,
    pub metrics: TrainingMetrics,
    pub emissions_kg: f64,
    pub artifact_path: Option<PathBuf>,
}

use async_trait::async_trait;
use image::RgbImage;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::domain::{
    detection::RawDetection,
    errors::DomainResult,
    model::InferenceParams,
    training::{RunStatus, TrainingOutcome, TrainingRequest},
};

/// Object detector: image -> (class id, confidence, box) in image pixels.
#[async_trait]
pub trait DetectorPort: Send + Sync {
    async fn detect(&self, image: RgbImage, params: &InferenceParams) -> DomainResult<Vec<RawDetection>>;
}

#[async_trait]
pub trait WeightsCatalogPort: Send + Sync {
    /// First existing candidate wins.
    async fn resolve(&self, candidates: &[PathBuf]) -> DomainResult<PathBuf>;
}

#[async_trait]
pub trait TrainerPort: Send + Sync {
    async fn train(&self, request: &TrainingRequest) -> DomainResult<TrainingOutcome>;
}

/// A running emissions measurement.
pub trait EmissionsSession: Send {
    /// Stops measuring and returns the estimate in kg CO2eq.
    fn stop(self: Box<Self>) -> DomainResult<f64>;
}

pub trait EmissionsTrackerPort: Send + Sync {
    fn start(&self, project_name: &str) -> DomainResult<Box<dyn EmissionsSession>>;
}

#[async_trait]
pub trait RunTrackerPort: Send + Sync {
    /// Returns the run id.
    async fn start_run(&self, experiment: &str, run_name: &str) -> DomainResult<String>;
    async fn log_params(&self, run_id: &str, params: &BTreeMap<String, String>) -> DomainResult<()>;
    async fn log_metrics(&self, run_id: &str, metrics: &BTreeMap<String, f64>) -> DomainResult<()>;
    async fn log_artifact(&self, run_id: &str, path: &Path, artifact_dir: &str) -> DomainResult<()>;
    async fn end_run(&self, run_id: &str, status: RunStatus) -> DomainResult<()>;
    /// Human-readable hint on where to browse the run.
    fn location(&self) -> String;
}

use image::RgbImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::{
    application::ports::{
        DetectorPort, EmissionsSession, EmissionsTrackerPort, RunTrackerPort, TrainerPort,
    },
    domain::{
        detection::{round_confidence, Detection, WasteCategory},
        errors::{DomainError, DomainResult},
        model::{InferenceParams, ModelId},
        training::{RunStatus, TrainingMetrics, TrainingRequest, TrainingRun},
    },
};

/// Detection use case: decode an upload, run the detector, shape the result.
/// Holds the one detector loaded at startup; it is never mutated afterwards.
#[derive(Clone)]
pub struct DetectionService {
    detector: Arc<dyn DetectorPort>,
    model: ModelId,
    params: InferenceParams,
    classes: Vec<WasteCategory>,
}

impl DetectionService {
    pub fn new(
        detector: Arc<dyn DetectorPort>,
        model: ModelId,
        params: InferenceParams,
        classes: Vec<WasteCategory>,
    ) -> Self {
        Self {
            detector,
            model,
            params,
            classes,
        }
    }

    pub async fn detect_bytes(&self, bytes: Vec<u8>) -> DomainResult<Vec<Detection>> {
        let rgb = tokio::task::spawn_blocking(move || decode_rgb(&bytes))
            .await
            .map_err(|e| DomainError::OperationFailed(format!("decode task: {e}")))??;
        self.detect_image(rgb).await
    }

    pub async fn detect_image(&self, image: RgbImage) -> DomainResult<Vec<Detection>> {
        let t_start = Instant::now();
        let raw = self.detector.detect(image, &self.params).await?;

        let detections = raw
            .into_iter()
            .map(|r| -> DomainResult<Detection> {
                let label = self.classes.get(r.class_id).copied().ok_or_else(|| {
                    DomainError::OperationFailed(format!(
                        "detector returned class id {} outside the {} known categories",
                        r.class_id,
                        self.classes.len()
                    ))
                })?;
                Ok(Detection {
                    label,
                    confidence: round_confidence(r.confidence),
                    bbox: r.bbox,
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;

        info!(
            model = %self.model.name,
            detections = detections.len(),
            infer_ms = t_start.elapsed().as_secs_f32() * 1000.0,
            "inference done"
        );
        Ok(detections)
    }
}

fn decode_rgb(bytes: &[u8]) -> DomainResult<RgbImage> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| DomainError::Decode(e.to_string()))
}

/// Stops the emissions session when dropped, so every exit path releases it.
pub struct EmissionsGuard {
    session: Option<Box<dyn EmissionsSession>>,
}

impl EmissionsGuard {
    pub fn start(tracker: &dyn EmissionsTrackerPort, project_name: &str) -> DomainResult<Self> {
        let session = tracker.start(project_name)?;
        Ok(Self {
            session: Some(session),
        })
    }

    pub fn stop(mut self) -> DomainResult<f64> {
        match self.session.take() {
            Some(session) => session.stop(),
            None => Ok(0.0),
        }
    }
}

impl Drop for EmissionsGuard {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            match session.stop() {
                Ok(kg) => warn!(emissions_kg = kg, "emissions tracker stopped on abnormal exit"),
                Err(e) => warn!(error = %e, "emissions tracker failed to stop"),
            }
        }
    }
}

/// Names used when recording a run.
#[derive(Debug, Clone)]
pub struct RunLabels {
    pub experiment: String,
    /// Display name of the tracked run; the output directory keeps `TrainingRequest::run_name`.
    pub run_name: String,
    pub tracker_project: String,
}

/// Fine-tuning orchestration: preconditions, params, train, metrics, artifact.
#[derive(Clone)]
pub struct TrainingService {
    trainer: Arc<dyn TrainerPort>,
    emissions: Arc<dyn EmissionsTrackerPort>,
    tracker: Arc<dyn RunTrackerPort>,
    labels: RunLabels,
}

impl TrainingService {
    pub fn new(
        trainer: Arc<dyn TrainerPort>,
        emissions: Arc<dyn EmissionsTrackerPort>,
        tracker: Arc<dyn RunTrackerPort>,
        labels: RunLabels,
    ) -> Self {
        Self {
            trainer,
            emissions,
            tracker,
            labels,
        }
    }

    pub fn tracker_location(&self) -> String {
        self.tracker.location()
    }

    pub async fn run(&self, request: &TrainingRequest) -> DomainResult<TrainingRun> {
        // Nothing may be recorded before both inputs are known to exist.
        check_exists(&request.dataset, "dataset descriptor")?;
        check_exists(&request.base_weights, "pretrained weights")?;

        info!(dataset = %request.dataset.display(), "dataset");
        info!(model = %request.base_weights.display(), "base weights");

        let run_id = self
            .tracker
            .start_run(&self.labels.experiment, &self.labels.run_name)
            .await?;

        // From here on every failure closes the run as FAILED.
        match self.train_and_record(&run_id, request).await {
            Ok(run) => {
                self.tracker.end_run(&run_id, RunStatus::Finished).await?;
                Ok(run)
            }
            Err(e) => {
                if let Err(end_err) = self.tracker.end_run(&run_id, RunStatus::Failed).await {
                    warn!(error = %end_err, "could not mark run as failed");
                }
                Err(e)
            }
        }
    }

    async fn train_and_record(
        &self,
        run_id: &str,
        request: &TrainingRequest,
    ) -> DomainResult<TrainingRun> {
        let parameters = request.params.to_param_map();
        self.tracker.log_params(run_id, &parameters).await?;

        let guard = EmissionsGuard::start(self.emissions.as_ref(), &self.labels.tracker_project)?;

        info!(run_name = %request.run_name, "starting fine-tuning");
        let outcome = self.trainer.train(request).await?;

        let emissions_kg = guard.stop()?;

        if outcome.metrics.is_none() {
            warn!("trainer produced no result metrics, logging zeros");
        }
        let metrics = TrainingMetrics::from_results(outcome.metrics.as_ref());
        let mut metric_map = metrics.to_metric_map();
        metric_map.insert("co2_emissions_kg".into(), emissions_kg);
        self.tracker.log_metrics(run_id, &metric_map).await?;

        let best = request.best_weights();
        let artifact_path = if best.is_file() {
            self.tracker.log_artifact(run_id, &best, "model").await?;
            Some(best)
        } else {
            warn!(path = %best.display(), "trained weights not found, no artifact logged");
            None
        };

        Ok(TrainingRun {
            run_id: run_id.to_string(),
            parameters,
            metrics,
            emissions_kg,
            artifact_path,
        })
    }
}

fn check_exists(path: &std::path::Path, what: &str) -> DomainResult<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(DomainError::PreconditionFailed(format!(
            "{what} not found at {}",
            path.display()
        )))
    }
}

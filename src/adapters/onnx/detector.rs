use async_trait::async_trait;
use image::RgbImage;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::adapters::onnx::yolo_engine::OnnxYoloEngine;
use crate::application::ports::DetectorPort;
use crate::domain::{
    detection::RawDetection,
    errors::{DomainError, DomainResult},
    model::InferenceParams,
};

/// Detector backed by one ONNX session, shared by all requests.
/// The runtime needs exclusive access per run, hence the mutex.
pub struct OnnxDetector {
    engine: Arc<Mutex<OnnxYoloEngine>>,
}

impl OnnxDetector {
    pub fn load(path: &Path, intra_threads: usize) -> DomainResult<Self> {
        let engine = OnnxYoloEngine::load(path, intra_threads).map_err(|e| {
            DomainError::OperationFailed(format!("loading model {}: {e:#}", path.display()))
        })?;
        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
        })
    }
}

#[async_trait]
impl DetectorPort for OnnxDetector {
    async fn detect(&self, image: RgbImage, params: &InferenceParams) -> DomainResult<Vec<RawDetection>> {
        let engine = self.engine.clone();
        let params = params.clone();

        tokio::task::spawn_blocking(move || {
            let mut eng = engine
                .lock()
                .map_err(|_| DomainError::OperationFailed("detector lock poisoned".into()))?;
            eng.infer(&image, &params)
                .map_err(|e| DomainError::OperationFailed(format!("inference: {e:#}")))
        })
        .await
        .map_err(|e| DomainError::OperationFailed(format!("inference task: {e}")))?
    }
}

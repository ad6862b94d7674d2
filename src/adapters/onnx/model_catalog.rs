use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::application::ports::WeightsCatalogPort;
use crate::domain::errors::{DomainError, DomainResult};

pub struct FsWeightsCatalog;

impl FsWeightsCatalog {
    pub fn new() -> Self { Self }
}

impl Default for FsWeightsCatalog {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl WeightsCatalogPort for FsWeightsCatalog {
    async fn resolve(&self, candidates: &[PathBuf]) -> DomainResult<PathBuf> {
        if candidates.is_empty() {
            return Err(DomainError::InvalidInput("no weights candidates configured".into()));
        }
        for candidate in candidates {
            if candidate.is_file() {
                info!(path = %candidate.display(), "using model weights");
                return Ok(candidate.clone());
            }
            debug!(path = %candidate.display(), "weights candidate missing");
        }
        Err(DomainError::ModelUnavailable {
            candidates: candidates.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_existing_candidate_wins() {
        let dir = tempfile::tempdir().unwrap();
        let primary = dir.path().join("primary/best.onnx");
        let fallback = dir.path().join("fallback/best.onnx");
        std::fs::create_dir_all(fallback.parent().unwrap()).unwrap();
        std::fs::write(&fallback, b"onnx").unwrap();

        let got = FsWeightsCatalog::new()
            .resolve(&[primary.clone(), fallback.clone()])
            .await
            .unwrap();
        assert_eq!(got, fallback);

        std::fs::create_dir_all(primary.parent().unwrap()).unwrap();
        std::fs::write(&primary, b"onnx").unwrap();
        let got = FsWeightsCatalog::new()
            .resolve(&[primary.clone(), fallback])
            .await
            .unwrap();
        assert_eq!(got, primary);
    }

    #[tokio::test]
    async fn none_existing_reports_all_candidates() {
        let candidates = vec![PathBuf::from("/nope/a.onnx"), PathBuf::from("/nope/b.onnx")];
        let err = FsWeightsCatalog::new().resolve(&candidates).await.unwrap_err();
        match err {
            DomainError::ModelUnavailable { candidates: tried } => assert_eq!(tried, candidates),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn directories_are_not_weights() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsWeightsCatalog::new()
            .resolve(&[dir.path().to_path_buf()])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ModelUnavailable { .. }));
    }
}

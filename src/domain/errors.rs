use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("cannot decode image: {0}")]
    Decode(String),
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("no model weights found, tried: {}", display_paths(.candidates))]
    ModelUnavailable { candidates: Vec<PathBuf> },
    #[error("training failed: {0}")]
    TrainingFailed(String),
    #[error("operation failed: {0}")]
    OperationFailed(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<std::io::Error> for DomainError {
    fn from(e: std::io::Error) -> Self {
        DomainError::OperationFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_unavailable_lists_every_candidate() {
        let err = DomainError::ModelUnavailable {
            candidates: vec![PathBuf::from("a/best.onnx"), PathBuf::from("b/best.onnx")],
        };
        assert_eq!(
            err.to_string(),
            "no model weights found, tried: a/best.onnx, b/best.onnx"
        );
    }
}

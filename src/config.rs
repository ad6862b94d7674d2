//! YAML configuration for the service and the training run.
//!
//! Every field has a default, so a missing or partial file still yields a
//! complete [`AppConfig`]. Relative paths resolve against `base_dir`.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::adapters::emissions::estimator::EmissionsConfig;
use crate::adapters::http::upload::UploadPolicy;
use crate::application::layout::Expectation;
use crate::domain::detection::WasteCategory;
use crate::domain::model::InferenceParams;
use crate::domain::training::{TrainingParams, TrainingRequest};

pub const CONFIG_ENV: &str = "ECOVISION_CONFIG";
pub const BASE_DIR_ENV: &str = "ECOVISION_BASE_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_dir: PathBuf,
    pub server: ServerConfig,
    pub inference: InferenceConfig,
    pub training: TrainingConfig,
    pub emissions: EmissionsConfig,
    pub tracking: TrackingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            server: ServerConfig::default(),
            inference: InferenceConfig::default(),
            training: TrainingConfig::default(),
            emissions: EmissionsConfig::default(),
            tracking: TrackingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub upload: UploadPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".into(),
            upload: UploadPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Tried in order; the first existing file is loaded.
    pub weights_candidates: Vec<PathBuf>,
    /// Category for each class id, in model output order.
    pub classes: Vec<WasteCategory>,
    pub params: InferenceParams,
    pub intra_threads: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            weights_candidates: vec![
                PathBuf::from("models/trained/ecovision_waste_v1/weights/best.onnx"),
                PathBuf::from("weights/ecovision_waste_v1/weights/best.onnx"),
            ],
            classes: WasteCategory::ALL.to_vec(),
            params: InferenceParams::default(),
            intra_threads: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub dataset: PathBuf,
    pub base_weights: PathBuf,
    pub project_dir: PathBuf,
    /// Output directory name under `project_dir`.
    pub run_name: String,
    pub experiment: String,
    /// Name shown for the run in the tracking store.
    pub tracking_run_name: String,
    /// Trainer executable (Ultralytics CLI).
    pub trainer_program: String,
    pub params: TrainingParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from("datasets/data.yaml"),
            base_weights: PathBuf::from("models/pretrained/yolov8n.pt"),
            project_dir: PathBuf::from("models/trained"),
            run_name: "ecovision_waste_v1".into(),
            experiment: "EcoVision_Waste_Detection".into(),
            tracking_run_name: "yolov8n_waste_training".into(),
            trainer_program: "yolo".into(),
            params: TrainingParams::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Local store path, `file://` URI, or MLflow server URL.
    pub uri: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self { uri: "mlruns".into() }
    }
}

/// Parse a YAML config file.
pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    // An empty document means "all defaults".
    if contents.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    let config: AppConfig = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse config YAML {}", path.display()))?;
    Ok(config)
}

impl AppConfig {
    /// Explicit path, else `ECOVISION_CONFIG`, else defaults; then `ECOVISION_BASE_DIR`.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = match path {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading configuration from file");
                load_config(&path)?
            }
            None => {
                tracing::info!("No config file specified, using defaults");
                AppConfig::default()
            }
        };
        config.apply_base_dir_override(std::env::var_os(BASE_DIR_ENV).map(PathBuf::from));
        Ok(config)
    }

    pub fn apply_base_dir_override(&mut self, base_dir: Option<PathBuf>) {
        if let Some(dir) = base_dir {
            self.base_dir = dir;
        }
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn weights_candidates(&self) -> Vec<PathBuf> {
        self.inference
            .weights_candidates
            .iter()
            .map(|p| self.resolve(p))
            .collect()
    }

    pub fn emissions_output_dir(&self) -> Option<PathBuf> {
        self.emissions.output_dir.as_deref().map(|p| self.resolve(p))
    }

    pub fn training_request(&self) -> TrainingRequest {
        TrainingRequest {
            params: self.training.params.clone(),
            dataset: self.resolve(&self.training.dataset),
            base_weights: self.resolve(&self.training.base_weights),
            project_dir: self.resolve(&self.training.project_dir),
            run_name: self.training.run_name.clone(),
        }
    }

    /// Paths the project needs for training and serving.
    pub fn expected_layout(&self) -> Vec<Expectation> {
        let models = self.resolve(Path::new("models"));
        let dataset = self.resolve(&self.training.dataset);
        let datasets = dataset
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.base_dir.clone());
        let base_weights = self.resolve(&self.training.base_weights);
        let pretrained = base_weights
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| models.join("pretrained"));

        vec![
            Expectation::dir("models directory", models),
            Expectation::dir("pretrained directory", pretrained),
            Expectation::dir("trained directory", self.resolve(&self.training.project_dir)),
            Expectation::file("pretrained weights", base_weights),
            Expectation::dir("datasets directory", datasets.clone()),
            Expectation::file("dataset descriptor", dataset),
            Expectation::dir("train split", datasets.join("train")),
            Expectation::dir("valid split", datasets.join("valid")),
            Expectation::dir("test split", datasets.join("test")),
        ]
    }

    /// Sanity checks that serde cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        let p = &self.inference.params;
        anyhow::ensure!(
            (0.0..=1.0).contains(&p.conf_threshold),
            "inference.params.conf_threshold must be within [0, 1]"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&p.iou_threshold),
            "inference.params.iou_threshold must be within [0, 1]"
        );
        anyhow::ensure!(
            p.input_size >= 32 && p.input_size % 32 == 0,
            "inference.params.input_size must be a positive multiple of 32"
        );
        anyhow::ensure!(!self.inference.classes.is_empty(), "inference.classes is empty");
        anyhow::ensure!(
            !self.inference.weights_candidates.is_empty(),
            "inference.weights_candidates is empty"
        );
        anyhow::ensure!(!self.training.run_name.trim().is_empty(), "training.run_name is empty");
        anyhow::ensure!(
            !self.training.tracking_run_name.trim().is_empty(),
            "training.tracking_run_name is empty"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_yaml(yaml: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(yaml.as_bytes()).unwrap();
        f
    }

    #[test]
    fn defaults_mirror_the_project_layout() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.listen_addr, "0.0.0.0:8000");
        assert_eq!(cfg.inference.classes.len(), 6);
        assert_eq!(cfg.inference.params.conf_threshold, 0.25);
        assert_eq!(cfg.training.params.epochs, 4);
        assert!(cfg.validate().is_ok());

        let req = cfg.training_request();
        assert_eq!(
            req.best_weights(),
            PathBuf::from("./models/trained/ecovision_waste_v1/weights/best.pt")
        );
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let f = write_yaml(
            r#"
base_dir: /srv/ecovision
server:
  listen_addr: "127.0.0.1:9000"
  upload:
    max_bytes: 1024
inference:
  weights_candidates: ["a.onnx", "/abs/b.onnx"]
  params:
    conf_threshold: 0.4
training:
  params:
    epochs: 50
    batch: 16
"#,
        );
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.server.listen_addr, "127.0.0.1:9000");
        assert_eq!(cfg.server.upload.max_bytes, 1024);
        assert_eq!(cfg.server.upload.allowed_content_types.len(), 6);
        assert_eq!(cfg.inference.params.conf_threshold, 0.4);
        assert_eq!(cfg.inference.params.iou_threshold, 0.7);
        assert_eq!(cfg.training.params.epochs, 50);
        assert_eq!(cfg.training.params.imgsz, 416);
        assert_eq!(
            cfg.weights_candidates(),
            [PathBuf::from("/srv/ecovision/a.onnx"), PathBuf::from("/abs/b.onnx")]
        );
    }

    #[test]
    fn class_list_accepts_only_known_categories() {
        let f = write_yaml("inference:\n  classes: [GLASS, STYROFOAM]\n");
        assert!(load_config(f.path()).is_err());

        let f = write_yaml("inference:\n  classes: [PLASTIC, GLASS]\n");
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.inference.classes, [WasteCategory::Plastic, WasteCategory::Glass]);
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let f = write_yaml("");
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.training.run_name, "ecovision_waste_v1");
        assert_eq!(cfg.training.tracking_run_name, "yolov8n_waste_training");
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_config(Path::new("/nonexistent/ecovision.yaml")).is_err());
    }

    #[test]
    fn base_dir_override_wins() {
        let mut cfg = AppConfig::default();
        cfg.apply_base_dir_override(Some(PathBuf::from("/opt/eco")));
        assert_eq!(cfg.resolve(Path::new("datasets/data.yaml")), PathBuf::from("/opt/eco/datasets/data.yaml"));
        assert_eq!(cfg.emissions_output_dir(), Some(PathBuf::from("/opt/eco/emissions")));
    }

    #[test]
    fn expected_layout_follows_configured_paths() {
        let mut cfg = AppConfig::default();
        cfg.apply_base_dir_override(Some(PathBuf::from("/p")));
        let layout = cfg.expected_layout();
        let paths: Vec<_> = layout.iter().map(|e| e.path.clone()).collect();
        assert!(paths.contains(&PathBuf::from("/p/models/pretrained/yolov8n.pt")));
        assert!(paths.contains(&PathBuf::from("/p/datasets/data.yaml")));
        assert!(paths.contains(&PathBuf::from("/p/datasets/valid")));
        assert!(paths.contains(&PathBuf::from("/p/models/trained")));
    }

    #[test]
    fn out_of_range_thresholds_fail_validation() {
        let mut cfg = AppConfig::default();
        cfg.inference.params.iou_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }
}

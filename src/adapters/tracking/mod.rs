pub mod file_store;
pub mod mlflow_rest;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::RunTrackerPort;
use crate::domain::errors::DomainResult;

/// `http(s)://` selects the REST client; anything else is a local store path
/// (`file://` prefix optional, relative paths resolve against `base_dir`).
pub fn tracker_for_uri(uri: &str, base_dir: &Path) -> DomainResult<Arc<dyn RunTrackerPort>> {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        let tracker = mlflow_rest::MlflowRestTracker::new(uri, Duration::from_secs(30))?;
        return Ok(Arc::new(tracker));
    }
    let path = Path::new(uri.strip_prefix("file://").unwrap_or(uri));
    let root = if path.is_absolute() { path.to_path_buf() } else { base_dir.join(path) };
    Ok(Arc::new(file_store::FileRunStore::new(root)))
}

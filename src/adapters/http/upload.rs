use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};

const OCTET_STREAM: &str = "application/octet-stream";

/// Limits applied to `/detect` uploads before decoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadPolicy {
    pub max_bytes: usize,
    pub allowed_content_types: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            allowed_content_types: [
                "image/jpeg",
                "image/png",
                "image/bmp",
                "image/webp",
                "image/gif",
                "image/tiff",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl UploadPolicy {
    /// Undeclared and generic binary types are left to the decoder.
    pub fn check_content_type(&self, declared: Option<&str>) -> DomainResult<()> {
        let Some(declared) = declared else {
            return Ok(());
        };
        let essence = declared
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if essence.is_empty() || essence == OCTET_STREAM {
            return Ok(());
        }
        if self
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&essence))
        {
            Ok(())
        } else {
            Err(DomainError::UnsupportedMediaType(essence))
        }
    }

    pub fn check_size(&self, len: usize) -> DomainResult<()> {
        if len > self.max_bytes {
            Err(DomainError::PayloadTooLarge(format!(
                "{len} bytes exceeds the {} byte limit",
                self.max_bytes
            )))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_listed_and_undeclared_types() {
        let p = UploadPolicy::default();
        assert!(p.check_content_type(Some("image/jpeg")).is_ok());
        assert!(p.check_content_type(Some("IMAGE/PNG; charset=binary")).is_ok());
        assert!(p.check_content_type(Some("application/octet-stream")).is_ok());
        assert!(p.check_content_type(None).is_ok());
    }

    #[test]
    fn rejects_other_types() {
        let p = UploadPolicy::default();
        let err = p.check_content_type(Some("text/plain")).unwrap_err();
        assert!(matches!(err, DomainError::UnsupportedMediaType(t) if t == "text/plain"));
    }

    #[test]
    fn size_limit_is_inclusive() {
        let p = UploadPolicy { max_bytes: 4, ..UploadPolicy::default() };
        assert!(p.check_size(4).is_ok());
        assert!(matches!(p.check_size(5), Err(DomainError::PayloadTooLarge(_))));
    }
}

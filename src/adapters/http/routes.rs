use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use crate::adapters::http::{error::ApiError, state::HttpState, upload::UploadPolicy};
use crate::application::dto::{DetectionResponse, HealthResponse};

const FILE_FIELD: &str = "file";

pub async fn home() -> Json<HealthResponse> {
    Json(HealthResponse::online())
}

pub async fn detect(
    State(st): State<HttpState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectionResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::missing_file(e.body_text()))?;
    let upload = read_file_field(&mut multipart, &st.upload).await?;

    info!(filename = %upload.filename, bytes = upload.bytes.len(), "detect request");
    let detections = st.detection.detect_bytes(upload.bytes).await?;

    Ok(Json(DetectionResponse::new(upload.filename, &detections)))
}

struct Upload {
    filename: String,
    bytes: Vec<u8>,
}

async fn read_file_field(multipart: &mut Multipart, policy: &UploadPolicy) -> Result<Upload, ApiError> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(ApiError::missing_file("Field required")),
            Err(e) => return Err(multipart_error(e.status(), e.body_text())),
        };
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        // A part without a filename is a plain form value, not an upload.
        let Some(filename) = field.file_name().map(str::to_owned) else {
            return Err(ApiError::missing_file("Expected an uploaded file"));
        };
        policy.check_content_type(field.content_type())?;

        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e.status(), e.body_text()))?;
        policy.check_size(bytes.len())?;

        return Ok(Upload {
            filename,
            bytes: bytes.to_vec(),
        });
    }
}

fn multipart_error(status: StatusCode, text: String) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        crate::domain::errors::DomainError::PayloadTooLarge(text).into()
    } else {
        ApiError::missing_file(text)
    }
}

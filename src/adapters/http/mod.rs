pub mod error;
pub mod routes;
pub mod state;
pub mod upload;

use axum::{extract::DefaultBodyLimit, routing::{get, post}, Router};
use tower_http::trace::TraceLayer;
use crate::adapters::http::state::HttpState;

/// Multipart framing overhead allowed on top of the image itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn router(state: HttpState) -> Router {
    let body_limit = state.upload.max_bytes.saturating_add(MULTIPART_OVERHEAD);
    Router::new()
        .route("/", get(routes::home))
        .route("/detect", post(routes::detect))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::upload::UploadPolicy;
    use crate::application::ports::DetectorPort;
    use crate::application::services::DetectionService;
    use crate::domain::detection::{RawDetection, WasteCategory};
    use crate::domain::errors::DomainResult;
    use crate::domain::model::{InferenceParams, ModelId};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use image::RgbImage;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "ecovision-test-boundary";

    struct NoDetections;

    #[async_trait]
    impl DetectorPort for NoDetections {
        async fn detect(&self, _: RgbImage, _: &InferenceParams) -> DomainResult<Vec<RawDetection>> {
            Ok(vec![])
        }
    }

    fn test_app(upload: UploadPolicy) -> Router {
        let detection = DetectionService::new(
            Arc::new(NoDetections),
            ModelId { name: "stub".into(), path: "stub.onnx".into() },
            InferenceParams::default(),
            WasteCategory::ALL.to_vec(),
        );
        router(HttpState {
            detection: Arc::new(detection),
            upload: Arc::new(upload),
        })
    }

    fn multipart_request(filename: Option<&str>, content_type: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(name) => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n").as_bytes(),
            ),
            None => body.extend_from_slice(b"Content-Disposition: form-data; name=\"file\"\r\n"),
        }
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/detect")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    fn png_bytes() -> Vec<u8> {
        let mut out = std::io::Cursor::new(Vec::new());
        RgbImage::from_pixel(8, 8, image::Rgb([0, 128, 0]))
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn home_reports_online() {
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = test_app(UploadPolicy::default()).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "online");
        assert!(json["message"].as_str().unwrap().contains("running"));
    }

    #[tokio::test]
    async fn undecodable_upload_is_a_client_error() {
        let req = multipart_request(Some("broken.jpg"), "image/jpeg", b"not really a jpeg");
        let response = test_app(UploadPolicy::default()).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert!(json["detail"].as_str().unwrap().starts_with("cannot decode image"));
    }

    #[tokio::test]
    async fn disallowed_content_type_is_rejected() {
        let req = multipart_request(Some("notes.txt"), "text/plain", b"hello");
        let response = test_app(UploadPolicy::default()).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let policy = UploadPolicy { max_bytes: 16, ..UploadPolicy::default() };
        let req = multipart_request(Some("big.png"), "image/png", &png_bytes());
        let response = test_app(policy).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn body_over_router_limit_is_rejected() {
        let policy = UploadPolicy { max_bytes: 16, ..UploadPolicy::default() };
        let data = vec![0u8; 16 + MULTIPART_OVERHEAD + 1024];
        let req = multipart_request(Some("huge.png"), "image/png", &data);
        let response = test_app(policy).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let json = json_body(response).await;
        assert!(json["detail"].is_string());
    }

    #[tokio::test]
    async fn form_value_without_filename_is_not_a_file() {
        let req = multipart_request(None, "text/plain", b"value");
        let response = test_app(UploadPolicy::default()).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = json_body(response).await;
        assert_eq!(json["detail"][0]["loc"][1], "file");
    }

    #[tokio::test]
    async fn octet_stream_png_is_accepted() {
        let req = multipart_request(Some("plain.png"), "application/octet-stream", &png_bytes());
        let response = test_app(UploadPolicy::default()).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["filename"], "plain.png");
        assert_eq!(json["detections_count"], 0);
    }
}

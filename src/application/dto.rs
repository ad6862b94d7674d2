use serde::{Deserialize, Serialize};

use crate::domain::detection::{Detection, WasteCategory};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

impl HealthResponse {
    pub fn online() -> Self {
        Self {
            status: "online".into(),
            message: "EcoVision API is running!".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionDto {
    pub object: WasteCategory,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: [f32; 4],
}

impl From<&Detection> for DetectionDto {
    fn from(d: &Detection) -> Self {
        Self {
            object: d.label,
            confidence: d.confidence,
            bbox: d.bbox.to_array(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub filename: String,
    pub detections_count: usize,
    pub detections: Vec<DetectionDto>,
}

impl DetectionResponse {
    pub fn new(filename: String, detections: &[Detection]) -> Self {
        let detections: Vec<DetectionDto> = detections.iter().map(DetectionDto::from).collect();
        Self {
            filename,
            detections_count: detections.len(),
            detections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::detection::BoundingBox;

    #[test]
    fn response_shape_matches_wire_contract() {
        let det = Detection {
            label: WasteCategory::Metal,
            confidence: 0.87,
            bbox: BoundingBox { x1: 1.0, y1: 2.0, x2: 30.0, y2: 40.0 },
        };
        let resp = DetectionResponse::new("can.jpg".into(), &[det]);
        let json = serde_json::to_value(&resp).unwrap();

        assert_eq!(json["filename"], "can.jpg");
        assert_eq!(json["detections_count"], 1);
        assert_eq!(json["detections"][0]["object"], "METAL");
        assert_eq!(json["detections"][0]["box"].as_array().unwrap().len(), 4);
        assert!((json["detections"][0]["confidence"].as_f64().unwrap() - 0.87).abs() < 1e-6);
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of waste categories the detector is trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WasteCategory {
    Biodegradable,
    Cardboard,
    Glass,
    Metal,
    Paper,
    Plastic,
}

impl WasteCategory {
    /// All categories in the class-id order of the training dataset.
    pub const ALL: [WasteCategory; 6] = [
        WasteCategory::Biodegradable,
        WasteCategory::Cardboard,
        WasteCategory::Glass,
        WasteCategory::Metal,
        WasteCategory::Paper,
        WasteCategory::Plastic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WasteCategory::Biodegradable => "BIODEGRADABLE",
            WasteCategory::Cardboard => "CARDBOARD",
            WasteCategory::Glass => "GLASS",
            WasteCategory::Metal => "METAL",
            WasteCategory::Paper => "PAPER",
            WasteCategory::Plastic => "PLASTIC",
        }
    }
}

impl fmt::Display for WasteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned box in image pixels, top-left / bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        if x2 > x1 && y2 > y1 {
            (x2 - x1) * (y2 - y1)
        } else {
            0.0
        }
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let intersection = self.intersection_area(other);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Clamp to `[0, width] x [0, height]`, keeping corners ordered.
    pub fn clamped(&self, width: f32, height: f32) -> Self {
        let (x1, x2) = ordered(self.x1, self.x2);
        let (y1, y2) = ordered(self.y1, self.y2);
        Self {
            x1: x1.clamp(0.0, width),
            y1: y1.clamp(0.0, height),
            x2: x2.clamp(0.0, width),
            y2: y2.clamp(0.0, height),
        }
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

fn ordered(a: f32, b: f32) -> (f32, f32) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Detector output before category mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: WasteCategory,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Round to two decimals, clamped to [0, 1].
pub fn round_confidence(confidence: f32) -> f32 {
    ((confidence.clamp(0.0, 1.0) * 100.0).round()) / 100.0
}

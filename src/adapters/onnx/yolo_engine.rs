use anyhow::{bail, Result};
use image::{imageops::FilterType, Rgb, RgbImage};
use ndarray::{Array4, ArrayView2, ArrayViewD, Axis, IxDyn};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;

use crate::domain::detection::{BoundingBox, RawDetection};
use crate::domain::model::InferenceParams;

const LETTERBOX_FILL: u8 = 114;

pub struct OnnxYoloEngine {
    session: Session,
}

impl OnnxYoloEngine {
    pub fn load(path: &Path, intra_threads: usize) -> Result<Self> {
        let session = Session::builder()?
            .with_intra_threads(intra_threads)?
            .with_execution_providers([CPUExecutionProvider::default().build()])?
            .commit_from_file(path)?;

        Ok(Self { session })
    }

    pub fn infer(&mut self, rgb: &RgbImage, params: &InferenceParams) -> Result<Vec<RawDetection>> {
        let lb = Letterbox::fit(rgb.width(), rgb.height(), params.input_size);
        let input = lb.tensor(rgb);

        let imgsz = params.input_size as i64;
        let input_shape = vec![1, 3, imgsz, imgsz];
        let input_tensor = Value::from_array((input_shape, input.into_raw_vec_and_offset().0))?;

        let outputs = self.session.run(ort::inputs![input_tensor])?;
        let (shape_out, data_out) = outputs[0].try_extract_tensor::<f32>()?;

        let dims: Vec<usize> = shape_out.iter().map(|&x| x as usize).collect();
        if dims.len() != 3 || dims[1] <= 4 {
            bail!("unexpected YOLO output shape {dims:?}, expected [1, 4 + classes, candidates]");
        }
        let array_view = ArrayViewD::from_shape(IxDyn(&dims), data_out)?;
        let view = array_view
            .index_axis(Axis(0), 0)
            .into_dimensionality::<ndarray::Ix2>()?;

        let candidates = decode_predictions(view, params.conf_threshold, &lb);
        Ok(non_max_suppression(
            candidates,
            params.iou_threshold,
            params.max_detections,
        ))
    }
}

/// Aspect-preserving resize onto a square canvas, plus the inverse mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub size: u32,
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub src_width: u32,
    pub src_height: u32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, size: u32) -> Self {
        let scale = (size as f32 / width.max(1) as f32).min(size as f32 / height.max(1) as f32);
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, size);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, size);
        Self {
            size,
            scale,
            pad_x: (size - new_w) as f32 / 2.0,
            pad_y: (size - new_h) as f32 / 2.0,
            src_width: width,
            src_height: height,
        }
    }

    fn inner_size(&self) -> (u32, u32) {
        (
            self.size - (self.pad_x * 2.0).round() as u32,
            self.size - (self.pad_y * 2.0).round() as u32,
        )
    }

    pub fn apply(&self, rgb: &RgbImage) -> RgbImage {
        let (w, h) = self.inner_size();
        let resized = image::imageops::resize(rgb, w, h, FilterType::Triangle);
        let mut canvas = RgbImage::from_pixel(self.size, self.size, Rgb([LETTERBOX_FILL; 3]));
        image::imageops::replace(
            &mut canvas,
            &resized,
            self.pad_x.floor() as i64,
            self.pad_y.floor() as i64,
        );
        canvas
    }

    /// NCHW float tensor in [0, 1].
    pub fn tensor(&self, rgb: &RgbImage) -> Array4<f32> {
        let canvas = self.apply(rgb);
        let s = self.size as usize;
        let mut input = Array4::<f32>::zeros((1, 3, s, s));
        for (x, y, pixel) in canvas.enumerate_pixels() {
            input[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
            input[[0, 1, y as usize, x as usize]] = pixel[1] as f32 / 255.0;
            input[[0, 2, y as usize, x as usize]] = pixel[2] as f32 / 255.0;
        }
        input
    }

    /// Map a box from canvas coordinates back to the source image.
    pub fn restore(&self, b: BoundingBox) -> BoundingBox {
        let unmap_x = |v: f32| (v - self.pad_x.floor()) / self.scale;
        let unmap_y = |v: f32| (v - self.pad_y.floor()) / self.scale;
        BoundingBox {
            x1: unmap_x(b.x1),
            y1: unmap_y(b.y1),
            x2: unmap_x(b.x2),
            y2: unmap_y(b.y2),
        }
        .clamped(self.src_width as f32, self.src_height as f32)
    }
}

/// Decode a YOLOv8 head laid out as `[4 + classes, candidates]`.
pub fn decode_predictions(view: ArrayView2<f32>, conf_threshold: f32, lb: &Letterbox) -> Vec<RawDetection> {
    let num_candidates = view.shape()[1];
    let num_classes = view.shape()[0] - 4;
    let mut detections = Vec::new();

    for i in 0..num_candidates {
        let (class_id, max_score) = (0..num_classes)
            .map(|c| (c, view[[4 + c, i]]))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if max_score > conf_threshold {
            let bbox = BoundingBox::from_center(view[[0, i]], view[[1, i]], view[[2, i]], view[[3, i]]);
            detections.push(RawDetection {
                class_id,
                confidence: max_score,
                bbox: lb.restore(bbox),
            });
        }
    }
    detections
}

/// Greedy per-class NMS, highest confidence first.
pub fn non_max_suppression(
    mut detections: Vec<RawDetection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawDetection> = Vec::with_capacity(detections.len().min(max_detections));
    for det in detections {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == det.class_id && k.bbox.iou(&det.bbox) > iou_threshold);
        if !suppressed {
            kept.push(det);
        }
    }
    kept
}

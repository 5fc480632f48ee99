//! Face-region detection.
//!
//! The extractor only needs "given an image, return zero or more face
//! rectangles". [`ScrfdDetector`] provides that with the SCRFD ONNX model;
//! [`FixedRegions`] returns a preset answer and is used by tests and tooling.

use crate::types::Region;
use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

/// Default SCRFD model file name inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Capability: locate face regions in a single-channel image.
///
/// Regions are returned in detector-defined order; callers must not assume
/// any particular sorting beyond what the implementation documents.
pub trait RegionDetector: Send + Sync {
    fn detect(&self, image: &GrayImage) -> Result<Vec<Region>, DetectorError>;
}

/// Detector that always reports the same regions.
#[derive(Debug, Clone, Default)]
pub struct FixedRegions(pub Vec<Region>);

impl FixedRegions {
    /// A single region covering `width`×`height` from the origin.
    pub fn whole(width: u32, height: u32) -> Self {
        Self(vec![Region {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            confidence: 1.0,
        }])
    }
}

impl RegionDetector for FixedRegions {
    fn detect(&self, _image: &GrayImage) -> Result<Vec<Region>, DetectorError> {
        Ok(self.0.clone())
    }
}

/// Letterbox mapping from model input space back to the source image.
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// SCRFD detector. Reports regions by descending confidence after NMS.
pub struct ScrfdDetector {
    session: Mutex<Session>,
    /// `(score_idx, bbox_idx)` per stride, in [`SCRFD_STRIDES`] order.
    stride_outputs: [(usize, usize); 3],
}

impl ScrfdDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 6 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model needs score and bbox outputs for 3 strides, got {} outputs",
                names.len()
            )));
        }
        let stride_outputs = output_layout(&names);

        tracing::info!(path = %model_path.display(), outputs = ?names, ?stride_outputs, "loaded SCRFD model");

        Ok(Self {
            session: Mutex::new(session),
            stride_outputs,
        })
    }

    fn letterbox(image: &GrayImage) -> (Array4<f32>, Letterbox) {
        let (width, height) = image.dimensions();
        let size = SCRFD_INPUT_SIZE as f32;
        let scale = (size / width as f32).min(size / height as f32);
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE);
        let pad_x = (SCRFD_INPUT_SIZE - new_w) / 2;
        let pad_y = (SCRFD_INPUT_SIZE - new_h) / 2;

        let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

        // Padding normalizes to 0.0.
        let side = SCRFD_INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let v = (pixel.0[0] as f32 - SCRFD_MEAN) / SCRFD_STD;
            let (tx, ty) = ((x + pad_x) as usize, (y + pad_y) as usize);
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = v;
            }
        }

        (
            tensor,
            Letterbox {
                scale,
                pad_x: pad_x as f32,
                pad_y: pad_y as f32,
            },
        )
    }
}

impl RegionDetector for ScrfdDetector {
    fn detect(&self, image: &GrayImage) -> Result<Vec<Region>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }
        let (input, letterbox) = Self::letterbox(image);

        let mut session = self
            .session
            .lock()
            .map_err(|_| DetectorError::InferenceFailed("detector session lock poisoned".into()))?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.stride_outputs[pos];
            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, boxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;
            candidates.extend(decode_stride(scores, boxes, stride, &letterbox));
        }

        Ok(nms(candidates, SCRFD_NMS_THRESHOLD))
    }
}

/// Map strides to output tensors, by name (`score_8`, `bbox_8`, ...) when the
/// export carries them, positionally otherwise.
fn output_layout(names: &[String]) -> [(usize, usize); 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let mut layout = [(0, 3), (1, 4), (2, 5)];
    for (slot, &stride) in SCRFD_STRIDES.iter().enumerate() {
        match (find("score", stride), find("bbox", stride)) {
            (Some(s), Some(b)) => layout[slot] = (s, b),
            _ => return [(0, 3), (1, 4), (2, 5)],
        }
    }
    layout
}

fn decode_stride(scores: &[f32], boxes: &[f32], stride: usize, letterbox: &Letterbox) -> Vec<Region> {
    let grid = SCRFD_INPUT_SIZE as usize / stride;
    let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    let mut regions = Vec::new();
    for idx in 0..anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= SCRFD_CONFIDENCE_THRESHOLD {
            continue;
        }
        let Some(offsets) = boxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };

        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let cx = (cell % grid) as f32 * step;
        let cy = (cell / grid) as f32 * step;

        let x1 = (cx - offsets[0] * step - letterbox.pad_x) / letterbox.scale;
        let y1 = (cy - offsets[1] * step - letterbox.pad_y) / letterbox.scale;
        let x2 = (cx + offsets[2] * step - letterbox.pad_x) / letterbox.scale;
        let y2 = (cy + offsets[3] * step - letterbox.pad_y) / letterbox.scale;

        regions.push(Region {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
        });
    }
    regions
}

/// Greedy non-maximum suppression; output is sorted by descending confidence.
fn nms(mut regions: Vec<Region>, iou_threshold: f32) -> Vec<Region> {
    regions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Region> = Vec::new();
    for candidate in regions {
        if keep.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &Region, b: &Region) -> f32 {
    let inter_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let inter_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// BlazeFace face detector using ONNX Runtime via `ort`.
///
/// The short-range BlazeFace model: fast, landmark-free, well suited to a
/// polling presence check where the only question is "is a face there".
use std::path::Path;

use crate::detection::domain::face_box::FaceBox;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::model_source::ModelArtifact;
use crate::shared::surface::FrameSurface;

/// BlazeFace model input resolution.
const INPUT_SIZE: u32 = 128;

/// Default confidence threshold.
pub const DEFAULT_CONFIDENCE: f64 = 0.75;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.3;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

/// Values per anchor in the regressor output (box deltas + 6 keypoints).
const REGRESSOR_STRIDE: usize = 16;

pub struct OnnxBlazefaceDetector {
    session: ort::session::Session,
    confidence: f64,
    anchors: Vec<[f32; 2]>,
}

impl OnnxBlazefaceDetector {
    /// Load a BlazeFace ONNX model from a file.
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?.commit_from_file(model_path)?;
        Ok(Self::with_session(session, confidence))
    }

    /// Build a session from an in-memory model artifact (embedded builds).
    pub fn from_artifact(
        artifact: &ModelArtifact,
        confidence: f64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?.commit_from_memory(artifact.bytes())?;
        Ok(Self::with_session(session, confidence))
    }

    fn with_session(session: ort::session::Session, confidence: f64) -> Self {
        Self {
            session,
            confidence,
            anchors: generate_anchors(),
        }
    }
}

impl FaceDetector for OnnxBlazefaceDetector {
    fn detect(
        &mut self,
        surface: &FrameSurface,
    ) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>> {
        if !surface.is_ready() {
            return Err("surface has no painted frame".into());
        }

        let sw = surface.width() as f32;
        let sh = surface.height() as f32;

        let input_tensor = preprocess(surface, INPUT_SIZE);
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;

        // BlazeFace emits two tensors: regressors [1, 896, 16] and
        // classificator scores [1, 896, 1].
        if outputs.len() < 2 {
            return Err(format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into());
        }

        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg_data = regressors.as_slice().ok_or("cannot get regressor slice")?;
        let score_data = scores.as_slice().ok_or("cannot get score slice")?;

        let mut candidates = Vec::new();
        let num_anchors = self.anchors.len().min(NUM_ANCHORS);

        for (i, &raw_score) in score_data.iter().enumerate().take(num_anchors) {
            let score = sigmoid(raw_score);
            if (score as f64) < self.confidence {
                continue;
            }

            let reg_offset = i * REGRESSOR_STRIDE;
            if reg_offset + 4 > reg_data.len() {
                break;
            }
            let anchor = &self.anchors[i];

            // Box center and size are regressed relative to the anchor in
            // model input units.
            let cx = anchor[0] + reg_data[reg_offset] / INPUT_SIZE as f32;
            let cy = anchor[1] + reg_data[reg_offset + 1] / INPUT_SIZE as f32;
            let w = reg_data[reg_offset + 2] / INPUT_SIZE as f32;
            let h = reg_data[reg_offset + 3] / INPUT_SIZE as f32;

            let x1 = ((cx - w / 2.0) * sw).max(0.0);
            let y1 = ((cy - h / 2.0) * sh).max(0.0);
            let x2 = ((cx + w / 2.0) * sw).min(sw);
            let y2 = ((cy + h / 2.0) * sh).min(sh);

            candidates.push(FaceBox {
                x: x1 as f64,
                y: y1 as f64,
                width: (x2 - x1).max(0.0) as f64,
                height: (y2 - y1).max(0.0) as f64,
                score: score as f64,
            });
        }

        Ok(nms(candidates, NMS_IOU_THRESH))
    }
}

/// Resize the surface to `size × size` and normalize to [0,1] NCHW float32.
fn preprocess(surface: &FrameSurface, size: u32) -> ndarray::Array4<f32> {
    let src = surface.as_ndarray();
    let src_h = surface.height() as usize;
    let src_w = surface.width() as usize;
    let s = size as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));

    for y in 0..s {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
        for x in 0..s {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    tensor
}

/// Anchors for the short-range model: a 16×16 grid with 2 anchors per cell
/// and an 8×8 grid with 6, all centered in their cells.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)]; // (stride, anchors_per_cell)
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }

    anchors
}

fn nms(mut candidates: Vec<FaceBox>, iou_thresh: f64) -> Vec<FaceBox> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in candidates {
        if keep.iter().all(|k| k.iou(&candidate) <= iou_thresh) {
            keep.push(candidate);
        }
    }
    keep
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

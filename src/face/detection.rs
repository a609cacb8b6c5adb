use super::Face;
use super::model::{Session, image_tensor, initialize_model, input_name, output_names};
use crate::shapes::{PointF32, RectF32};
use anyhow::{Result, bail};
use image::RgbImage;
use image::imageops::{self, FilterType};
use ort::value::Tensor;
use std::path::Path;
use tracing::{Level, debug, span, trace};

const INPUT_SIZE: u32 = 640;
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;
const SCORE_THRESHOLD: f32 = 0.5;
const NMS_OVERLAP_PCT: f32 = 40.;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 128.;

/*
SCRFD face detector (det_10g).

Model Input: 1x3x640x640 f32 RGB, (v - 127.5) / 128, image letterboxed into the
top-left corner.
Model Output: for each stride in 8, 16, 32 (in that order within each group)
  - scores:  N x 1
  - bboxes:  N x 4, distances (left, top, right, bottom) from the anchor center
  - kps:     N x 10, five (dx, dy) offsets from the anchor center
where N = (640 / stride)^2 * 2 anchors, all in units of the stride.
 */
pub struct FaceDetector {
    model: Session,
    input_name: String,
    output_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Detection {
    pub bounds: RectF32,
    pub landmarks: [PointF32; 5],
    pub confidence: f32,
}

impl From<Detection> for Face {
    fn from(d: Detection) -> Face {
        Face {
            bounds: d.bounds,
            landmarks: d.landmarks,
            confidence: d.confidence,
            embedding: None,
        }
    }
}

impl FaceDetector {
    pub fn new(model_path: &Path, threads: usize) -> Result<FaceDetector> {
        let model = initialize_model(model_path, threads)?;
        let input_name = input_name(&model)?;
        let output_names = output_names(&model);
        if output_names.len() != STRIDES.len() * 3 {
            bail!(
                "expected {} detector outputs, model has {}",
                STRIDES.len() * 3,
                output_names.len()
            );
        }

        Ok(FaceDetector {
            model,
            input_name,
            output_names,
        })
    }

    pub fn run(&self, img: &RgbImage) -> Result<Vec<Detection>> {
        let span = span!(Level::DEBUG, "face_detector");
        let _guard = span.enter();

        if img.width() == 0 || img.height() == 0 {
            return Ok(Vec::new());
        }

        let (resized_width, resized_height) = letterbox_size(img.width(), img.height());
        let resized = imageops::resize(img, resized_width, resized_height, FilterType::Triangle);
        let scale = resized_height as f32 / img.height() as f32;

        let input = Tensor::from_array(image_tensor(
            &resized, INPUT_SIZE, INPUT_SIZE, PIXEL_MEAN, PIXEL_STD,
        ))?;
        let outputs = self
            .model
            .run(ort::inputs![self.input_name.as_str() => input]?)?;

        let mut candidates = Vec::new();
        for (idx, stride) in STRIDES.iter().enumerate() {
            let scores = flat(&outputs, &self.output_names[idx])?;
            let bboxes = flat(&outputs, &self.output_names[idx + STRIDES.len()])?;
            let kps = flat(&outputs, &self.output_names[idx + STRIDES.len() * 2])?;
            candidates.extend(decode_stride(*stride, &scores, &bboxes, &kps, scale)?);
        }

        let detections = suppress(candidates);
        debug!("Detected {} faces", detections.len());
        Ok(detections)
    }
}

fn flat(outputs: &ort::session::SessionOutputs, name: &str) -> Result<Vec<f32>> {
    let tensor = outputs[name].try_extract_tensor::<f32>()?;
    Ok(tensor.iter().copied().collect())
}

/// Size the image is resized to so it fits the square input, keeping its aspect ratio.
fn letterbox_size(width: u32, height: u32) -> (u32, u32) {
    let ratio = height as f32 / width as f32;
    if ratio > 1. {
        let w = (INPUT_SIZE as f32 / ratio) as u32;
        (w.max(1), INPUT_SIZE)
    } else {
        let h = (INPUT_SIZE as f32 * ratio) as u32;
        (INPUT_SIZE, h.max(1))
    }
}

fn decode_stride(
    stride: usize,
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    scale: f32,
) -> Result<Vec<Detection>> {
    let cells = INPUT_SIZE as usize / stride;
    let anchors = cells * cells * ANCHORS_PER_CELL;
    if scores.len() < anchors || bboxes.len() < anchors * 4 || kps.len() < anchors * 10 {
        bail!("detector output too small for stride {stride}");
    }

    let s = stride as f32;
    let mut detections = Vec::new();
    for i in 0..anchors {
        let confidence = scores[i];
        if confidence < SCORE_THRESHOLD {
            continue;
        }

        let cell = i / ANCHORS_PER_CELL;
        let cx = ((cell % cells) * stride) as f32;
        let cy = ((cell / cells) * stride) as f32;

        let b = &bboxes[i * 4..i * 4 + 4];
        let bounds = RectF32::from_corners(
            (cx - b[0] * s) / scale,
            (cy - b[1] * s) / scale,
            (cx + b[2] * s) / scale,
            (cy + b[3] * s) / scale,
        );

        let k = &kps[i * 10..i * 10 + 10];
        let landmarks = std::array::from_fn(|j| {
            PointF32::new((cx + k[j * 2] * s) / scale, (cy + k[j * 2 + 1] * s) / scale)
        });

        trace!("Anchor {i} at stride {stride} scored {confidence}");
        detections.push(Detection {
            bounds,
            landmarks,
            confidence,
        });
    }

    Ok(detections)
}

/// Keeps the most confident of each cluster of overlapping boxes, sorted by confidence.
fn suppress(mut candidates: Vec<Detection>) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::new();
    for c in candidates {
        if kept
            .iter()
            .all(|k| k.bounds.overlap_pct(&c.bounds) <= NMS_OVERLAP_PCT)
        {
            kept.push(c);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letterbox_keeps_aspect() {
        assert_eq!(letterbox_size(1280, 720), (640, 360));
        assert_eq!(letterbox_size(720, 1280), (360, 640));
        assert_eq!(letterbox_size(500, 500), (640, 640));
    }

    #[test]
    fn decodes_anchor_offsets() -> Result<()> {
        let stride = 32;
        let anchors = 20 * 20 * 2;
        let mut scores = vec![0.; anchors];
        let mut bboxes = vec![0.; anchors * 4];
        let mut kps = vec![0.; anchors * 10];

        // cell (x=3, y=2), second anchor
        let i = (2 * 20 + 3) * 2 + 1;
        scores[i] = 0.9;
        bboxes[i * 4..i * 4 + 4].copy_from_slice(&[1., 1., 1., 2.]);
        kps[i * 10..i * 10 + 2].copy_from_slice(&[0.5, -0.5]);

        let found = decode_stride(stride, &scores, &bboxes, &kps, 0.5)?;
        assert_eq!(found.len(), 1);

        let d = &found[0];
        // anchor center (96, 64), box (64, 32)-(128, 128), then undo the 0.5 resize
        assert_eq!(d.bounds, RectF32::from_corners(128., 64., 256., 256.));
        assert_eq!(d.landmarks[0], PointF32::new(224., 96.));
        assert_eq!(d.landmarks[1], PointF32::new(192., 128.));
        assert_eq!(d.confidence, 0.9);
        Ok(())
    }

    #[test]
    fn short_outputs_are_an_error() {
        assert!(decode_stride(8, &[0.; 10], &[0.; 40], &[0.; 100], 1.).is_err());
    }

    fn det(x1: f32, confidence: f32) -> Detection {
        Detection {
            bounds: RectF32::from_corners(x1, 0., x1 + 100., 100.),
            landmarks: [PointF32::default(); 5],
            confidence,
        }
    }

    #[test]
    fn suppression_keeps_best_of_overlaps() {
        let kept = suppress(vec![det(0., 0.6), det(10., 0.95), det(500., 0.7)]);
        let confidences: Vec<f32> = kept.iter().map(|d| d.confidence).collect();
        assert_eq!(confidences, vec![0.95, 0.7]);
    }
}

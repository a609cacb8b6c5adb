use crate::shapes::{PointF32, RectF32};
use anyhow::Result;
use image::RgbImage;

pub use engine::OnnxFaceEngine;

mod align;
mod detection;
mod embedding;
mod engine;
mod initializer;
mod model;
mod swapper;

/// One detected face. Landmarks are, in order: left eye, right eye, nose tip,
/// left mouth corner, right mouth corner.
#[derive(Debug, Clone)]
pub struct Face {
    pub bounds: RectF32,
    pub landmarks: [PointF32; 5],
    pub confidence: f32,
    /// L2-normalized identity embedding, when the engine computes one.
    pub embedding: Option<Vec<f32>>,
}

/// The pretrained detector/swapper pair the booth drives. Implementations are
/// built once by the entry point and lent to the workflow.
pub trait FaceEngine {
    /// Faces in `img`, most confident first.
    fn detect(&self, img: &RgbImage) -> Result<Vec<Face>>;

    /// Replaces `target_face` in `target` with the identity of `source_face`.
    /// With `paste_back` the whole target frame is returned, otherwise only the
    /// aligned face crop.
    fn swap(
        &self,
        target: &RgbImage,
        target_face: &Face,
        source_face: &Face,
        paste_back: bool,
    ) -> Result<RgbImage>;
}

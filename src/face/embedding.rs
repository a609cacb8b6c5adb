use super::align;
use super::model::{Session, image_tensor, initialize_model, input_name, output_names};
use crate::shapes::PointF32;
use anyhow::{Error, Result};
use image::RgbImage;
use ort::value::Tensor;
use std::path::Path;
use tracing::{Level, span};

const INPUT_SIZE: u32 = 112;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 127.5;

/// ArcFace identity embedder (w600k_r50): an aligned 112x112 RGB crop in, a
/// 512-wide identity vector out.
pub struct FaceEmbedder {
    model: Session,
    input_name: String,
    output_name: String,
}

impl FaceEmbedder {
    pub fn new(model_path: &Path, threads: usize) -> Result<FaceEmbedder> {
        let model = initialize_model(model_path, threads)?;
        let input_name = input_name(&model)?;
        let output_name = output_names(&model)
            .into_iter()
            .next()
            .ok_or_else(|| Error::msg("embedder declares no outputs"))?;

        Ok(FaceEmbedder {
            model,
            input_name,
            output_name,
        })
    }

    pub fn run(&self, img: &RgbImage, landmarks: &[PointF32; 5]) -> Result<Vec<f32>> {
        let span = span!(Level::DEBUG, "face_embedder");
        let _guard = span.enter();

        let projection = align::alignment(landmarks, INPUT_SIZE)?;
        let aligned = align::crop(img, &projection, INPUT_SIZE);

        let input = Tensor::from_array(image_tensor(
            &aligned, INPUT_SIZE, INPUT_SIZE, PIXEL_MEAN, PIXEL_STD,
        ))?;
        let outputs = self
            .model
            .run(ort::inputs![self.input_name.as_str() => input]?)?;
        let embedding: Vec<f32> = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()?
            .iter()
            .copied()
            .collect();

        Ok(normalize(embedding))
    }
}

pub fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

use super::detection::FaceDetector;
use super::embedding::FaceEmbedder;
use super::model::init_runtime;
use super::swapper::FaceSwapper;
use super::{Face, FaceEngine};
use crate::config::{DETECTOR_MODEL, EMBEDDER_MODEL, Layout, SWAPPER_MODEL};
use crate::error::BoothError;
use anyhow::{Error, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::{Level, info, span};

/// ONNX Runtime backed face engine: SCRFD detection, ArcFace identity
/// embeddings and inswapper_128 face replacement.
pub struct OnnxFaceEngine {
    detector: FaceDetector,
    embedder: FaceEmbedder,
    swapper: FaceSwapper,
}

impl OnnxFaceEngine {
    pub fn load(layout: &Layout, threads: usize) -> std::result::Result<Self, BoothError> {
        let span = span!(Level::INFO, "OnnxFaceEngine#load");
        let _guard = span.enter();

        init_runtime().map_err(|cause| BoothError::ModelLoadFailure {
            path: layout.models.clone(),
            cause,
        })?;

        let detector = load(layout.model(DETECTOR_MODEL), |p| FaceDetector::new(p, threads))?;
        let embedder = load(layout.model(EMBEDDER_MODEL), |p| FaceEmbedder::new(p, threads))?;
        let swapper = load(layout.model(SWAPPER_MODEL), |p| FaceSwapper::new(p, threads))?;
        info!("Face models loaded from {:?}", layout.models);

        Ok(OnnxFaceEngine {
            detector,
            embedder,
            swapper,
        })
    }
}

fn load<T>(
    path: PathBuf,
    init: impl FnOnce(&Path) -> Result<T>,
) -> std::result::Result<T, BoothError> {
    let loaded = if path.is_file() {
        init(&path)
    } else {
        Err(Error::msg("file not found"))
    };
    loaded.map_err(|cause| BoothError::ModelLoadFailure { path, cause })
}

impl FaceEngine for OnnxFaceEngine {
    fn detect(&self, img: &RgbImage) -> Result<Vec<Face>> {
        let mut faces = Vec::new();
        for detection in self.detector.run(img)? {
            let embedding = self.embedder.run(img, &detection.landmarks)?;
            let mut face: Face = detection.into();
            face.embedding = Some(embedding);
            faces.push(face);
        }
        Ok(faces)
    }

    fn swap(
        &self,
        target: &RgbImage,
        target_face: &Face,
        source_face: &Face,
        paste_back: bool,
    ) -> Result<RgbImage> {
        self.swapper.run(target, target_face, source_face, paste_back)
    }
}

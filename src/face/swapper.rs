use super::embedding::normalize;
use super::model::{Session, image_tensor, initialize_model, output_names};
use super::{Face, align, initializer};
use anyhow::{Context, Error, Result, bail};
use image::{Rgb, RgbImage};
use ndarray::{Array2, ArrayViewD};
use ort::value::Tensor;
use std::fs;
use std::path::Path;
use tracing::{Level, debug, span};

const INPUT_SIZE: u32 = 128;
const EMBEDDING_SIZE: usize = 512;

/*
inswapper_128.

Model Input:
  - target: 1x3x128x128 f32 RGB in 0..1, the target face aligned to the
    ArcFace template scaled for 128px
  - source: 1x512 latent, the source ArcFace embedding projected through the
    model's embedding map and re-normalized
Model Output: 1x3x128x128 f32 RGB in 0..1, the swapped face in aligned space.
 */
pub struct FaceSwapper {
    model: Session,
    output_name: String,
    emap: Array2<f32>,
}

impl FaceSwapper {
    pub fn new(model_path: &Path, threads: usize) -> Result<FaceSwapper> {
        let model = initialize_model(model_path, threads)?;
        let output_name = output_names(&model)
            .into_iter()
            .next()
            .ok_or_else(|| Error::msg("swapper declares no outputs"))?;

        let bytes = fs::read(model_path)?;
        let emap = initializer::last_initializer(&bytes).context("reading embedding map")?;
        if emap.dims != [EMBEDDING_SIZE, EMBEDDING_SIZE] {
            bail!("unexpected embedding map shape {:?}", emap.dims);
        }
        let emap = Array2::from_shape_vec((EMBEDDING_SIZE, EMBEDDING_SIZE), emap.data)?;
        debug!("Loaded {EMBEDDING_SIZE}x{EMBEDDING_SIZE} embedding map");

        Ok(FaceSwapper {
            model,
            output_name,
            emap,
        })
    }

    pub fn run(
        &self,
        target: &RgbImage,
        target_face: &Face,
        source_face: &Face,
        paste_back: bool,
    ) -> Result<RgbImage> {
        let span = span!(Level::DEBUG, "face_swapper");
        let _guard = span.enter();

        let embedding = source_face
            .embedding
            .as_ref()
            .ok_or_else(|| Error::msg("source face has no identity embedding"))?;
        let latent = self.latent(embedding)?;

        let projection = align::alignment(&target_face.landmarks, INPUT_SIZE)?;
        let aligned = align::crop(target, &projection, INPUT_SIZE);

        let target_input = Tensor::from_array(image_tensor(
            &aligned, INPUT_SIZE, INPUT_SIZE, 0., 255.,
        ))?;
        let source_input = Tensor::from_array(latent)?;
        let outputs = self.model.run(ort::inputs![
            "target" => target_input,
            "source" => source_input
        ]?)?;
        let output = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;
        let face = to_image(output)?;

        if !paste_back {
            return Ok(face);
        }
        Ok(align::paste_back(target, &face, &projection))
    }

    fn latent(&self, embedding: &[f32]) -> Result<Array2<f32>> {
        if embedding.len() != EMBEDDING_SIZE {
            bail!(
                "identity embedding has {} values, expected {EMBEDDING_SIZE}",
                embedding.len()
            );
        }
        let source = Array2::from_shape_vec((1, EMBEDDING_SIZE), embedding.to_vec())?;
        let latent = normalize(source.dot(&self.emap).into_raw_vec_and_offset().0);
        Ok(Array2::from_shape_vec((1, EMBEDDING_SIZE), latent)?)
    }
}

fn to_image(output: ArrayViewD<f32>) -> Result<RgbImage> {
    let (h, w) = match output.shape() {
        &[1, 3, h, w] => (h, w),
        shape => bail!("unexpected swapper output shape {shape:?}"),
    };

    let mut img = RgbImage::new(w as u32, h as u32);
    for (x, y, p) in img.enumerate_pixels_mut() {
        let (x, y) = (x as usize, y as usize);
        let channel = |c: usize| (output[[0, c, y, x]] * 255.).round().clamp(0., 255.) as u8;
        *p = Rgb([channel(0), channel(1), channel(2)]);
    }
    Ok(img)
}

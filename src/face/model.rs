use anyhow::Result;
use image::RgbImage;
use ndarray::{Array, Array4};
use ort::execution_providers;
use ort::session::builder::GraphOptimizationLevel;
use std::path::Path;
use tracing::debug;

pub use ort::session::Session;

pub fn init_runtime() -> Result<()> {
    ort::init()
        .with_name("fitbooth")
        .with_execution_providers([execution_providers::XNNPACKExecutionProvider::default().build()])
        .commit()?;
    Ok(())
}

pub fn initialize_model(model_path: &Path, threads: usize) -> Result<Session> {
    debug!("Loading model {model_path:?} with {threads} threads");
    let model = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(threads.max(1))?
        .commit_from_file(model_path)?;

    Ok(model)
}

pub fn input_name(model: &Session) -> Result<String> {
    model
        .inputs
        .first()
        .map(|i| i.name.clone())
        .ok_or_else(|| anyhow::Error::msg("model declares no inputs"))
}

pub fn output_names(model: &Session) -> Vec<String> {
    model.outputs.iter().map(|o| o.name.clone()).collect()
}

/// NCHW tensor of `img` normalized as `(v - mean) / std`, padded to `width` x `height`
/// with the value black pixels would normalize to.
pub fn image_tensor(
    img: &RgbImage,
    width: u32,
    height: u32,
    mean: f32,
    std: f32,
) -> Array4<f32> {
    let img_width = img.width();
    let img_height = img.height();
    let pad = (0. - mean) / std;

    Array::from_shape_fn((1, 3, height as usize, width as usize), |(_, c, y, x)| {
        let x = x as u32;
        let y = y as u32;
        if y >= img_height || x >= img_width {
            pad
        } else {
            (img.get_pixel(x, y)[c] as f32 - mean) / std
        }
    })
}

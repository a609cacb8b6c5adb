use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BoothError {
    #[error("no outfit folders found under {}", .0.display())]
    CatalogEmpty(PathBuf),

    #[error("outfit {0} has no reference images")]
    NoCandidatesInOutfit(String),

    #[error("failed to load face model {}: {cause:#}", .path.display())]
    ModelLoadFailure { path: PathBuf, cause: anyhow::Error },

    #[error("no face found in the captured photo, please retake it")]
    NoUserFace,

    #[error("no face found in the outfit reference image")]
    NoReferenceFace,

    #[error("printing is only supported on Windows (running on {0})")]
    PrintUnsupported(&'static str),

    #[error("select an outfit first")]
    NoOutfitSelected,

    #[error("capture a photo first")]
    NoPhotoCaptured,

    #[error("run the face swap first")]
    NoResult,

    #[error("camera error: {0:#}")]
    Camera(anyhow::Error),

    #[error("failed to send result to the printer: {0}")]
    Print(String),

    #[error("face model failed: {0:#}")]
    Capability(anyhow::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BoothError {
    /// Fatal errors stop the process; everything else only halts the current stage.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BoothError::ModelLoadFailure { .. })
    }
}

pub type Result<T> = std::result::Result<T, BoothError>;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const REFS_DIR: &str = "refs";
pub const UPLOADS_DIR: &str = "uploads";
pub const OUTPUTS_DIR: &str = "outputs";
pub const MODELS_DIR: &str = "models";

pub const USER_PHOTO_FILE: &str = "user.jpg";
pub const RESULT_FILE: &str = "result.jpg";
pub const DOWNLOAD_FILE: &str = "fitting_result.jpg";

pub const DETECTOR_MODEL: &str = "det_10g.onnx";
pub const EMBEDDER_MODEL: &str = "w600k_r50.onnx";
pub const SWAPPER_MODEL: &str = "inswapper_128.onnx";

/// Resolved on-disk layout of a booth, rooted at a single storage directory.
#[derive(Debug, Clone)]
pub struct Layout {
    pub refs: PathBuf,
    pub uploads: PathBuf,
    pub outputs: PathBuf,
    pub models: PathBuf,
}

impl Layout {
    pub fn new(root: impl AsRef<Path>) -> Layout {
        let root = root.as_ref();
        Layout {
            refs: root.join(REFS_DIR),
            uploads: root.join(UPLOADS_DIR),
            outputs: root.join(OUTPUTS_DIR),
            models: root.join(MODELS_DIR),
        }
    }

    pub fn ensure_dirs(&self) -> io::Result<()> {
        for dir in [&self.refs, &self.uploads, &self.outputs, &self.models] {
            fs::create_dir_all(dir)?;
            debug!("Ensured directory {dir:?}");
        }
        Ok(())
    }

    pub fn user_photo(&self) -> PathBuf {
        self.uploads.join(USER_PHOTO_FILE)
    }

    pub fn result(&self) -> PathBuf {
        self.outputs.join(RESULT_FILE)
    }

    pub fn model(&self, file_name: &str) -> PathBuf {
        self.models.join(file_name)
    }
}

use crate::config::DOWNLOAD_FILE;
use crate::error::{BoothError, Result};
use crate::session::SwapResult;
use image::{ImageFormat, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

pub const RESULT_MIME: &str = "image/jpeg";

/// Writes the result as JPEG to `path`, replacing whatever was there.
pub fn persist(img: &RgbImage, path: &Path) -> Result<SwapResult> {
    write_jpeg(img, path)?;

    let image_bytes = fs::read(path)?;
    debug!("Persisted {} bytes to {path:?}", image_bytes.len());
    Ok(SwapResult {
        image_bytes,
        saved_path: path.to_path_buf(),
    })
}

/// Encodes to a hidden sibling first and renames it over `path`, so a failed
/// write leaves the previous file intact and no partial file behind.
pub(crate) fn write_jpeg(img: &RgbImage, path: &Path) -> Result<()> {
    let partial = partial_path(path);

    let written = img
        .save_with_format(&partial, ImageFormat::Jpeg)
        .map_err(BoothError::from)
        .and_then(|_| fs::rename(&partial, path).map_err(BoothError::from));
    if written.is_err() {
        let _ = fs::remove_file(&partial);
    }
    written
}

fn partial_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{file_name}.partial"))
}

#[derive(Debug, Clone)]
pub struct Download {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

pub fn offer_download(stored_path: &Path) -> Result<Download> {
    Ok(Download {
        file_name: DOWNLOAD_FILE.to_string(),
        mime: RESULT_MIME,
        bytes: fs::read(stored_path)?,
    })
}

/// Hands the download to the user by writing it into `dir`.
pub fn save_download(download: &Download, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let dest = dir.join(&download.file_name);
    fs::write(&dest, &download.bytes)?;
    info!("Saved download to {dest:?}");
    Ok(dest)
}

/// Sends a stored result to a printer.
pub trait Printer {
    fn print(&self, path: &Path) -> Result<()>;
}

impl<P: Printer + ?Sized> Printer for &P {
    fn print(&self, path: &Path) -> Result<()> {
        (**self).print(path)
    }
}

/// Dispatches to the OS print verb. Only Windows has one we can drive.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPrinter;

impl Printer for SystemPrinter {
    fn print(&self, path: &Path) -> Result<()> {
        if !cfg!(windows) {
            warn!("Print requested on unsupported platform {}", std::env::consts::OS);
            return Err(BoothError::PrintUnsupported(std::env::consts::OS));
        }

        let path = fs::canonicalize(path)?;
        let script = format!(
            "Start-Process -FilePath '{}' -Verb Print",
            path.display().to_string().replace('\'', "''")
        );
        let status = Command::new("powershell")
            .args(["-NoProfile", "-NonInteractive", "-Command", &script])
            .status()
            .map_err(|e| BoothError::Print(e.to_string()))?;

        if !status.success() {
            return Err(BoothError::Print(format!("print command exited with {status}")));
        }
        info!("Sent {path:?} to the printer");
        Ok(())
    }
}

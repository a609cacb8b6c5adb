use anyhow::{Context, Error, Result};
use image::RgbImage;
use nokhwa::{
    Camera, nokhwa_initialize,
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType},
};
use tracing::{Level, debug, info, span};

// Auto exposure needs a few frames to settle after the stream opens.
const WARMUP_FRAMES: usize = 5;

/// Grabs a single still from a webcam. Uses the last camera found when no
/// index is given. The stream is closed again before returning.
pub fn capture_photo(index: Option<u32>) -> Result<RgbImage> {
    let span = span!(Level::DEBUG, "capture_photo");
    let _guard = span.enter();

    nokhwa_initialize(|granted| {
        debug!("Camera access granted: {}", granted);
    });

    let index = match index {
        Some(i) => CameraIndex::Index(i),
        None => {
            let cameras = query(ApiBackend::Auto)?;
            cameras
                .iter()
                .for_each(|cam| debug!("Found camera: {:?}", cam));
            cameras
                .last()
                .map(|cam| cam.index().clone())
                .ok_or_else(|| Error::msg("no camera found"))?
        }
    };

    let mut camera = Camera::new(
        index,
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution),
    )
    .context("failed to open camera")?;
    camera.open_stream().context("failed to start camera stream")?;

    let mut grab = || {
        for _ in 0..WARMUP_FRAMES {
            camera.frame()?;
        }
        camera.frame()
    };
    let frame = grab();
    let stopped = camera.stop_stream();

    let img = frame
        .context("failed to read camera frame")?
        .decode_image::<RgbFormat>()
        .context("failed to decode camera frame")?;
    stopped.context("failed to stop camera stream")?;

    info!(
        "Captured {}x{} photo from {}",
        img.width(),
        img.height(),
        camera.info().human_name()
    );
    Ok(img)
}

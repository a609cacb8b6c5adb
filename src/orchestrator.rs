use crate::error::{BoothError, Result};
use crate::export::persist;
use crate::face::FaceEngine;
use crate::session::SwapResult;
use image::RgbImage;
use std::path::Path;
use tracing::{Level, debug, info, span};

/// One swap attempt: the first face found in the user photo replaces the first
/// face found in the reference image, and the composited frame is written to
/// `result_path`. Nothing is written unless both detections and the swap succeed.
pub fn execute<E: FaceEngine + ?Sized>(
    engine: &E,
    user_photo: &Path,
    reference: &Path,
    result_path: &Path,
) -> Result<SwapResult> {
    let span = span!(Level::INFO, "execute_swap");
    let _guard = span.enter();

    let user_img = load_rgb(user_photo)?;
    let reference_img = load_rgb(reference)?;

    let user_faces = engine.detect(&user_img).map_err(BoothError::Capability)?;
    let reference_faces = engine
        .detect(&reference_img)
        .map_err(BoothError::Capability)?;
    debug!(
        "{} faces in user photo, {} in reference {reference:?}",
        user_faces.len(),
        reference_faces.len()
    );

    let Some(user_face) = user_faces.first() else {
        return Err(BoothError::NoUserFace);
    };
    let Some(reference_face) = reference_faces.first() else {
        return Err(BoothError::NoReferenceFace);
    };

    let swapped = engine
        .swap(&reference_img, reference_face, user_face, true)
        .map_err(BoothError::Capability)?;

    let result = persist(&swapped, result_path)?;
    info!("Swap result written to {result_path:?}");
    Ok(result)
}

fn load_rgb(path: &Path) -> Result<RgbImage> {
    Ok(image::open(path)?.into_rgb8())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::face::Face;
    use crate::shapes::{PointF32, RectF32};
    use anyhow::Error;
    use image::Rgb;
    use std::cell::{Cell, RefCell};
    use std::path::PathBuf;

    const FACE_STEP: u32 = 60;

    /// Stub engine that "detects" faces by image colour: the red channel of the
    /// top-left pixel encodes the number of faces, in steps of `FACE_STEP` so it
    /// survives JPEG re-encoding.
    #[derive(Default)]
    pub struct StubEngine {
        pub fail_swap: bool,
        pub swaps: Cell<usize>,
        pub detected: RefCell<Vec<(u32, u32)>>,
    }

    impl FaceEngine for StubEngine {
        fn detect(&self, img: &RgbImage) -> anyhow::Result<Vec<Face>> {
            self.detected.borrow_mut().push(img.dimensions());
            let count = ((img.get_pixel(0, 0)[0] as u32 + FACE_STEP / 2) / FACE_STEP) as usize;
            Ok((0..count)
                .map(|i| Face {
                    bounds: RectF32::from_center(10. * i as f32, 10., 8., 8.),
                    landmarks: [PointF32::default(); 5],
                    confidence: 1. - i as f32 * 0.1,
                    embedding: Some(vec![i as f32]),
                })
                .collect())
        }

        fn swap(
            &self,
            target: &RgbImage,
            target_face: &Face,
            source_face: &Face,
            paste_back: bool,
        ) -> anyhow::Result<RgbImage> {
            assert!(paste_back);
            assert_eq!(target_face.embedding, Some(vec![0.]));
            assert_eq!(source_face.embedding, Some(vec![0.]));
            self.swaps.set(self.swaps.get() + 1);
            if self.fail_swap {
                return Err(Error::msg("swap model exploded"));
            }
            Ok(RgbImage::from_pixel(target.width(), target.height(), Rgb([0, 200, 0])))
        }
    }

    pub fn write_image(path: &Path, faces: u8, size: u32) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let red = (faces as u32 * FACE_STEP) as u8;
        RgbImage::from_pixel(size, size, Rgb([red, 0, 0])).save(path)?;
        Ok(())
    }

    fn fixture(user_faces: u8, ref_faces: u8) -> anyhow::Result<(tempfile::TempDir, PathBuf, PathBuf, PathBuf)> {
        let dir = tempfile::tempdir()?;
        let user = dir.path().join("user.png");
        let reference = dir.path().join("ref_1.png");
        write_image(&user, user_faces, 12)?;
        write_image(&reference, ref_faces, 24)?;
        let result = dir.path().join("result.jpg");
        Ok((dir, user, reference, result))
    }

    #[test]
    fn swaps_first_faces_and_writes_result() -> anyhow::Result<()> {
        let (_dir, user, reference, result_path) = fixture(2, 3)?;
        let engine = StubEngine::default();

        let result = execute(&engine, &user, &reference, &result_path)?;
        assert_eq!(engine.swaps.get(), 1);
        assert_eq!(result.saved_path, result_path);
        assert!(!result.image_bytes.is_empty());
        assert_eq!(image::open(&result_path)?.width(), 24);
        assert_eq!(*engine.detected.borrow(), vec![(12, 12), (24, 24)]);
        Ok(())
    }

    #[test]
    fn no_user_face_regardless_of_reference() -> anyhow::Result<()> {
        for ref_faces in [0, 1, 4] {
            let (_dir, user, reference, result_path) = fixture(0, ref_faces)?;
            let engine = StubEngine::default();

            let err = execute(&engine, &user, &reference, &result_path).unwrap_err();
            assert!(matches!(err, BoothError::NoUserFace));
            assert_eq!(engine.swaps.get(), 0);
            assert!(!result_path.exists());
        }
        Ok(())
    }

    #[test]
    fn no_reference_face() -> anyhow::Result<()> {
        let (_dir, user, reference, result_path) = fixture(1, 0)?;
        let engine = StubEngine::default();

        let err = execute(&engine, &user, &reference, &result_path).unwrap_err();
        assert!(matches!(err, BoothError::NoReferenceFace));
        assert!(!result_path.exists());
        Ok(())
    }

    #[test]
    fn failed_swap_writes_nothing() -> anyhow::Result<()> {
        let (_dir, user, reference, result_path) = fixture(1, 1)?;
        let engine = StubEngine {
            fail_swap: true,
            ..Default::default()
        };

        let err = execute(&engine, &user, &reference, &result_path).unwrap_err();
        assert!(matches!(err, BoothError::Capability(_)));
        assert_eq!(engine.swaps.get(), 1);
        assert!(!result_path.exists());
        Ok(())
    }

    #[test]
    fn failed_swap_keeps_previous_result() -> anyhow::Result<()> {
        let (_dir, user, reference, result_path) = fixture(1, 1)?;
        write_image(&result_path, 3, 5)?;
        let before = std::fs::read(&result_path)?;

        let engine = StubEngine {
            fail_swap: true,
            ..Default::default()
        };
        assert!(execute(&engine, &user, &reference, &result_path).is_err());
        assert_eq!(std::fs::read(&result_path)?, before);
        Ok(())
    }
}

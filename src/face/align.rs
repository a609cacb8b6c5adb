use crate::shapes::PointF32;
use anyhow::{Error, Result};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use imageproc::morphology::erode;

/// Five-point template of an aligned 112x112 ArcFace crop.
const ARCFACE_TEMPLATE: [(f32, f32); 5] = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

/// Least-squares similarity (scale, rotation, translation) mapping `src` onto `dst`,
/// as the 3x3 row-major matrix `[a, -b, tx, b, a, ty, 0, 0, 1]`.
pub fn estimate_similarity(src: &[PointF32; 5], dst: &[PointF32; 5]) -> [f32; 9] {
    let src_mean = PointF32::mean(src);
    let dst_mean = PointF32::mean(dst);

    let mut denom = 0.;
    let mut a_num = 0.;
    let mut b_num = 0.;
    for (s, d) in src.iter().zip(dst.iter()) {
        let (sx, sy) = (s.x - src_mean.x, s.y - src_mean.y);
        let (dx, dy) = (d.x - dst_mean.x, d.y - dst_mean.y);
        denom += sx * sx + sy * sy;
        a_num += sx * dx + sy * dy;
        b_num += sx * dy - sy * dx;
    }

    if denom <= f32::EPSILON {
        return [1., 0., dst_mean.x - src_mean.x, 0., 1., dst_mean.y - src_mean.y, 0., 0., 1.];
    }

    let a = a_num / denom;
    let b = b_num / denom;
    let tx = dst_mean.x - (a * src_mean.x - b * src_mean.y);
    let ty = dst_mean.y - (b * src_mean.x + a * src_mean.y);

    [a, -b, tx, b, a, ty, 0., 0., 1.]
}

/// Template landmarks for a square crop of `size`, matching the ArcFace layout.
pub fn template(size: u32) -> [PointF32; 5] {
    let (ratio, dx) = if size % 112 == 0 {
        (size as f32 / 112., 0.)
    } else {
        let ratio = size as f32 / 128.;
        (ratio, 8. * ratio)
    };

    ARCFACE_TEMPLATE.map(|(x, y)| PointF32::new(x * ratio + dx, y * ratio))
}

/// Projection from frame coordinates into a `size` x `size` aligned crop.
pub fn alignment(landmarks: &[PointF32; 5], size: u32) -> Result<Projection> {
    let m = estimate_similarity(landmarks, &template(size));
    Projection::from_matrix(m).ok_or_else(|| Error::msg("degenerate face landmarks"))
}

pub fn crop(img: &RgbImage, to_aligned: &Projection, size: u32) -> RgbImage {
    let mut out = RgbImage::new(size, size);
    warp_into(img, to_aligned, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut out);
    out
}

/// Warps an aligned face back into `frame`, blending through an eroded and
/// blurred mask of the crop's footprint so the seam fades out.
pub fn paste_back(frame: &RgbImage, face: &RgbImage, to_aligned: &Projection) -> RgbImage {
    let to_frame = to_aligned.invert();
    let (width, height) = frame.dimensions();

    let mut warped = RgbImage::new(width, height);
    warp_into(face, &to_frame, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut warped);

    let white = GrayImage::from_pixel(face.width(), face.height(), Luma([255]));
    let mut mask = GrayImage::new(width, height);
    warp_into(&white, &to_frame, Interpolation::Bilinear, Luma([0]), &mut mask);

    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, p) in mask.enumerate_pixels_mut() {
        if p[0] > 20 {
            p[0] = 255;
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
    }

    let Some((x0, y0, x1, y1)) = bounds else {
        return frame.clone();
    };

    let mask_size = (((x1 - x0) as f32) * ((y1 - y0) as f32)).sqrt() as u32;
    let erode_k = (mask_size / 10).max(10);
    let mask = erode(&mask, Norm::LInf, (erode_k / 2).min(u8::MAX as u32) as u8);
    let blur_k = (mask_size / 20).max(5);
    let sigma = 0.3 * (blur_k as f32 - 1.) + 0.8;
    let mask = gaussian_blur_f32(&mask, sigma);

    let mut out = frame.clone();
    for (x, y, p) in out.enumerate_pixels_mut() {
        let alpha = mask.get_pixel(x, y)[0] as f32 / 255.;
        if alpha <= 0. {
            continue;
        }
        let fake = warped.get_pixel(x, y);
        for c in 0..3 {
            let v = alpha * fake[c] as f32 + (1. - alpha) * p[c] as f32;
            p[c] = v.round().clamp(0., 255.) as u8;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(m: &[f32; 9], p: PointF32) -> PointF32 {
        PointF32::new(m[0] * p.x + m[1] * p.y + m[2], m[3] * p.x + m[4] * p.y + m[5])
    }

    #[test]
    fn identity_when_points_match() {
        let pts = template(112);
        let m = estimate_similarity(&pts, &pts);
        assert!((m[0] - 1.).abs() < 1e-4);
        assert!(m[1].abs() < 1e-4);
        assert!(m[2].abs() < 1e-3);
        assert!(m[5].abs() < 1e-3);
    }

    #[test]
    fn recovers_scale_rotation_translation() {
        let theta: f32 = 0.3;
        let (s, tx, ty) = (1.7, 40., -12.);
        let dst = template(112);
        let src = dst.map(|p| {
            PointF32::new(
                s * (theta.cos() * p.x - theta.sin() * p.y) + tx,
                s * (theta.sin() * p.x + theta.cos() * p.y) + ty,
            )
        });

        let m = estimate_similarity(&src, &dst);
        for (s, d) in src.iter().zip(dst.iter()) {
            let mapped = apply(&m, *s);
            assert!((mapped.x - d.x).abs() < 1e-2, "{mapped:?} vs {d:?}");
            assert!((mapped.y - d.y).abs() < 1e-2, "{mapped:?} vs {d:?}");
        }
    }

    #[test]
    fn swapper_template_is_shifted() {
        let t = template(128);
        assert!((t[0].x - (38.2946 + 8.)).abs() < 1e-4);
        assert!((t[0].y - 51.6963).abs() < 1e-4);

        let t = template(224);
        assert!((t[2].x - 56.0252 * 2.).abs() < 1e-3);
    }

    #[test]
    fn crop_has_requested_size() -> Result<()> {
        let frame = RgbImage::from_pixel(300, 200, Rgb([120, 80, 40]));
        let landmarks = template(112).map(|p| PointF32::new(p.x + 90., p.y + 40.));
        let projection = alignment(&landmarks, 128)?;

        let aligned = crop(&frame, &projection, 128);
        assert_eq!(aligned.dimensions(), (128, 128));
        assert_eq!(*aligned.get_pixel(64, 64), Rgb([120, 80, 40]));
        Ok(())
    }

    #[test]
    fn paste_back_touches_only_face_region() -> Result<()> {
        let frame = RgbImage::from_pixel(400, 400, Rgb([0, 0, 0]));
        let landmarks = template(112).map(|p| PointF32::new(p.x + 150., p.y + 150.));
        let projection = alignment(&landmarks, 128)?;
        let face = RgbImage::from_pixel(128, 128, Rgb([255, 255, 255]));

        let out = paste_back(&frame, &face, &projection);
        assert_eq!(out.dimensions(), frame.dimensions());
        assert_eq!(*out.get_pixel(5, 5), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(395, 395), Rgb([0, 0, 0]));

        let nose = landmarks[2];
        assert!(out.get_pixel(nose.x as u32, nose.y as u32)[0] > 200);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointF32 {
    pub x: f32,
    pub y: f32,
}

impl PointF32 {
    pub fn new(x: f32, y: f32) -> PointF32 {
        PointF32 { x, y }
    }

    pub fn mean(points: &[PointF32]) -> PointF32 {
        let n = points.len().max(1) as f32;
        let (sx, sy) = points
            .iter()
            .fold((0., 0.), |(sx, sy), p| (sx + p.x, sy + p.y));
        PointF32 {
            x: sx / n,
            y: sy / n,
        }
    }
}

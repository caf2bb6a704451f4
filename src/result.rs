use image::RgbImage;
use imageproc::point::Point;

/// Oriented rectangle in image coordinates (y pointing down).
///
/// `angle` is in degrees and gives the direction of the `width` edge measured
/// from the +x axis. Rectangles coming out of segmentation are canonical:
/// `angle` lies in `[0, 90)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    pub center: (f32, f32),
    pub width: f32,
    pub height: f32,
    pub angle: f32,
}

impl RotatedRect {
    pub fn corners(&self) -> [(f32, f32); 4] {
        let (sin, cos) = self.angle.to_radians().sin_cos();
        let (cx, cy) = self.center;
        let (hw, hh) = (self.width / 2.0, self.height / 2.0);
        let u = (cos * hw, sin * hw);
        let v = (-sin * hh, cos * hh);
        [
            (cx - u.0 - v.0, cy - u.1 - v.1),
            (cx + u.0 - v.0, cy + u.1 - v.1),
            (cx + u.0 + v.0, cy + u.1 + v.1),
            (cx - u.0 + v.0, cy - u.1 + v.1),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct CandidateBean {
    /// 1-based position among the contours that passed the area filter.
    pub index: usize,
    pub area: f32,
    pub rect: RotatedRect,
    /// Rounded rectangle corners, bottom-most corner first.
    pub box_points: [Point<i32>; 4],
}

/// Crop position in the rotated frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct RectifiedBean {
    pub image: RgbImage,
    pub rect: RotatedRect,
    pub angle_applied: f32,
    pub center: (f32, f32),
    pub width: u32,
    pub height: u32,
    pub source_index: usize,
    pub crop: CropWindow,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    /// Input copy with every candidate's box and index drawn on it.
    pub overview: RgbImage,
    pub candidates: usize,
    pub beans: Vec<RectifiedBean>,
}

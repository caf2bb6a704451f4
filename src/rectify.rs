use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation};
use tracing::instrument;

use crate::{
    util::{rotation_matrix, to_projection, translation_matrix},
    CandidateBean, CropWindow, RectifiedBean, RotatedRect,
};

/// Turns the candidate so its long edge is horizontal and cuts it out with
/// `padding` pixels of margin. Returns `None` when the window starts past the
/// right or bottom edge of the image.
///
/// The crop is sampled straight from the source through the combined
/// rotate-then-shift transform, which yields the same pixels as rotating the
/// whole frame and slicing it afterwards.
#[instrument(level = "trace", skip(original, candidate), fields(index = candidate.index))]
pub fn rectify(original: &RgbImage, candidate: &CandidateBean, padding: u32) -> Option<RectifiedBean> {
    let RotatedRect {
        center,
        width,
        height,
        angle,
    } = candidate.rect;
    let (width, height) = (width as i64, height as i64);
    let (crop_width, crop_height, angle) = if width < height {
        (height, width, angle + 90.0)
    } else {
        (width, height, angle)
    };

    let crop = crop_window(
        center,
        crop_width,
        crop_height,
        padding,
        original.dimensions(),
    )?;

    let transform = translation_matrix(-(crop.x as f32), -(crop.y as f32))
        * rotation_matrix(center, angle);
    let projection = to_projection(&transform)?;
    let mut image = RgbImage::new(crop.width, crop.height);
    warp_into(
        original,
        &projection,
        Interpolation::Bilinear,
        Rgb([0, 0, 0]),
        &mut image,
    );

    Some(RectifiedBean {
        image,
        rect: candidate.rect,
        angle_applied: angle,
        center,
        width: crop_width as u32,
        height: crop_height as u32,
        source_index: candidate.index,
        crop,
    })
}

/// Axis-aligned window of `width` x `height` around `center`, grown by
/// `padding` on every side. The top-left corner is clamped into the frame
/// first and the far edge is cut at the frame border afterwards.
pub fn crop_window(
    center: (f32, f32),
    width: i64,
    height: i64,
    padding: u32,
    (frame_width, frame_height): (u32, u32),
) -> Option<CropWindow> {
    let pad = padding as i64;
    let x = ((center.0 - (width / 2) as f32 - pad as f32) as i64).max(0);
    let y = ((center.1 - (height / 2) as f32 - pad as f32) as i64).max(0);
    let x_end = (x + width + 2 * pad).min(frame_width as i64);
    let y_end = (y + height + 2 * pad).min(frame_height as i64);
    if x_end <= x || y_end <= y {
        return None;
    }
    Some(CropWindow {
        x: x as u32,
        y: y as u32,
        width: (x_end - x) as u32,
        height: (y_end - y) as u32,
    })
}

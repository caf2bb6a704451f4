use image::{imageops, GrayImage, RgbImage};
use imageproc::{
    contours::find_contours,
    contrast::{otsu_level, threshold, ThresholdType},
    distance_transform::Norm,
    filter::separable_filter_equal,
    morphology::{dilate_mut, erode_mut},
};
use tracing::instrument;

use crate::{
    overlay::{draw_box, draw_index, BOX_COLOR},
    util::{box_points, contour_area, gaussian_kernel, min_area_rect, simplify_chain},
    CandidateBean, PixelThreshold,
};

const BLUR_KERNEL_SIZE: usize = 5;
const OPEN_ITERATIONS: usize = 2;

/// Intermediate rasters of the binarisation stage, in pipeline order.
#[derive(Debug, Clone)]
pub struct SegmentStages {
    pub gray: GrayImage,
    pub blurred: GrayImage,
    pub binary: GrayImage,
    pub opened: GrayImage,
}

#[derive(Debug, Clone)]
pub struct Segmentation {
    pub overview: RgbImage,
    pub candidates: Vec<CandidateBean>,
}

#[instrument(level = "debug", skip(image))]
pub fn segment_stages(image: &RgbImage) -> SegmentStages {
    let gray = imageops::grayscale(image);
    let kernel = gaussian_kernel(BLUR_KERNEL_SIZE);
    let blurred = separable_filter_equal(&gray, &kernel);

    let level = otsu_level(&blurred);
    log::debug!("Otsu level {level}");
    let binary = threshold(&blurred, level, ThresholdType::BinaryInverted);

    // 3x3 square element applied OPEN_ITERATIONS times each way
    let mut opened = binary.clone();
    for _ in 0..OPEN_ITERATIONS {
        erode_mut(&mut opened, Norm::LInf, 1);
    }
    for _ in 0..OPEN_ITERATIONS {
        dilate_mut(&mut opened, Norm::LInf, 1);
    }

    SegmentStages {
        gray,
        blurred,
        binary,
        opened,
    }
}

/// Runs the full segmentation and returns the annotated overview together
/// with every contour whose area lies strictly inside `thresholds`.
#[instrument(level = "debug", skip(image))]
pub fn segment(image: &RgbImage, thresholds: PixelThreshold) -> Segmentation {
    let stages = segment_stages(image);
    let candidates = find_candidates(&stages.opened, thresholds);
    let overview = annotate(image, &candidates);
    Segmentation {
        overview,
        candidates,
    }
}

#[instrument(level = "trace", skip(mask))]
pub fn find_candidates(mask: &GrayImage, thresholds: PixelThreshold) -> Vec<CandidateBean> {
    let contours = find_contours::<i32>(mask);
    log::info!("Found {} contours", contours.len());

    let candidates = contours
        .into_iter()
        .map(|contour| simplify_chain(&contour.points))
        .map(|points| (contour_area(&points), points))
        .filter(|(area, _)| thresholds.contains(*area))
        .enumerate()
        .filter_map(|(i, (area, points))| {
            let index = i + 1;
            let Some(rect) = min_area_rect(&points) else {
                log::debug!("Contour #{index} has a degenerate hull, skipping");
                return None;
            };
            Some(CandidateBean {
                index,
                area,
                rect,
                box_points: box_points(&rect),
            })
        })
        .collect::<Vec<_>>();
    log::info!("{} contours left after area filtering", candidates.len());
    candidates
}

pub fn annotate(image: &RgbImage, candidates: &[CandidateBean]) -> RgbImage {
    let mut overview = image.clone();
    for candidate in candidates {
        draw_box(&mut overview, &candidate.box_points, BOX_COLOR);
        draw_index(
            &mut overview,
            candidate.index,
            candidate.box_points[0],
            BOX_COLOR,
        );
    }
    overview
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};
    use imageproc::{drawing::draw_filled_rect_mut, rect::Rect};

    fn mask_with_squares(sides: &[u32]) -> GrayImage {
        let mut mask = GrayImage::new(400, 100);
        let mut x = 10;
        for &side in sides {
            draw_filled_rect_mut(&mut mask, Rect::at(x, 10).of_size(side, side), Luma([255]));
            x += side as i32 + 20;
        }
        mask
    }

    #[test]
    fn area_bounds_are_exclusive() {
        // Contour of an s x s pixel block spans (s - 1) x (s - 1) between pixel centers.
        let mask = mask_with_squares(&[11, 21, 31]);
        let areas = find_candidates(&mask, PixelThreshold::new(0.0, f32::MAX))
            .iter()
            .map(|c| c.area)
            .collect::<Vec<_>>();
        assert_eq!(areas, vec![100.0, 400.0, 900.0]);

        let kept = find_candidates(&mask, PixelThreshold::new(100.0, 900.0));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].area, 400.0);
        assert_eq!(kept[0].index, 1);

        let kept = find_candidates(&mask, PixelThreshold::new(99.0, 901.0));
        assert_eq!(kept.len(), 3);
        assert_eq!(
            kept.iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn stages_invert_dark_objects() {
        let mut image = RgbImage::from_pixel(120, 120, Rgb([240, 240, 240]));
        draw_filled_rect_mut(&mut image, Rect::at(40, 40).of_size(30, 30), Rgb([20, 20, 20]));
        let stages = segment_stages(&image);
        assert_eq!(stages.opened.get_pixel(55, 55)[0], 255);
        assert_eq!(stages.opened.get_pixel(5, 5)[0], 0);
        assert_eq!(stages.gray.dimensions(), (120, 120));
    }

    #[test]
    fn opening_removes_speckles() {
        let mut image = RgbImage::from_pixel(100, 100, Rgb([250, 250, 250]));
        draw_filled_rect_mut(&mut image, Rect::at(20, 20).of_size(40, 40), Rgb([10, 10, 10]));
        draw_filled_rect_mut(&mut image, Rect::at(80, 80).of_size(2, 2), Rgb([10, 10, 10]));
        let stages = segment_stages(&image);
        assert_eq!(stages.opened.get_pixel(81, 81)[0], 0);
        let result = segment(&image, PixelThreshold::new(0.0, f32::MAX));
        assert_eq!(result.candidates.len(), 1);
    }

    #[test]
    fn overview_is_annotated_copy() {
        let mut image = RgbImage::from_pixel(100, 100, Rgb([250, 250, 250]));
        draw_filled_rect_mut(&mut image, Rect::at(30, 40).of_size(40, 20), Rgb([10, 10, 10]));
        let result = segment(&image, PixelThreshold::new(100.0, 5000.0));
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.overview.dimensions(), image.dimensions());
        assert!(result.overview.pixels().any(|p| *p == BOX_COLOR));
        assert!(!image.pixels().any(|p| *p == BOX_COLOR));
    }
}

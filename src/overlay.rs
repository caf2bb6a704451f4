use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_line_segment_mut},
    point::Point,
    rect::Rect,
};

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LINE_THICKNESS: i32 = 2;
const LABEL_SCALE: u32 = 2;
const LABEL_OFFSET: i32 = 10;

// 5x7 digit glyphs, one byte per row, low 5 bits used (MSB on the left).
const DIGITS: [[u8; 7]; 10] = [
    [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
    [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
    [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
    [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
    [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
    [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
    [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
    [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
    [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
    [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
];
const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;

/// Closed outline through the four corners, `LINE_THICKNESS` pixels wide.
pub fn draw_box(image: &mut RgbImage, corners: &[Point<i32>; 4], color: Rgb<u8>) {
    for i in 0..4 {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        for dy in 0..LINE_THICKNESS {
            for dx in 0..LINE_THICKNESS {
                draw_line_segment_mut(
                    image,
                    ((a.x + dx) as f32, (a.y + dy) as f32),
                    ((b.x + dx) as f32, (b.y + dy) as f32),
                    color,
                );
            }
        }
    }
}

/// Writes `index` so that the text baseline sits `LABEL_OFFSET` pixels above
/// `anchor`. Anything falling outside the image is clipped.
pub fn draw_index(image: &mut RgbImage, index: usize, anchor: Point<i32>, color: Rgb<u8>) {
    let scale = LABEL_SCALE as i32;
    let top = anchor.y - LABEL_OFFSET - GLYPH_HEIGHT * scale;
    let advance = (GLYPH_WIDTH + 1) * scale;
    for (n, digit) in index.to_string().bytes().enumerate() {
        let glyph = &DIGITS[(digit - b'0') as usize];
        let left = anchor.x + n as i32 * advance;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                let rect = Rect::at(left + col * scale, top + row as i32 * scale)
                    .of_size(LABEL_SCALE, LABEL_SCALE);
                draw_filled_rect_mut(image, rect, color);
            }
        }
    }
}

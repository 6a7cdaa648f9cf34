// src/overlay.rs
//
// Annotates lane frames in place: one rectangle per detection plus a
// "VEHICLES: N" banner in the top-left corner.

use crate::preprocessing::to_rgb_image;
use crate::types::Frame;
use crate::vehicle_detection::Detection;
use ab_glyph::{FontRef, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::sync::OnceLock;
use tracing::warn;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: i32 = 2;
const TEXT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BANNER_COLOR: Rgb<u8> = Rgb([40, 40, 40]);
const TEXT_SCALE: f32 = 22.0;
const BANNER_ORIGIN: i32 = 5;
const BANNER_PADDING: u32 = 5;

static FONT_BYTES: &[u8] = include_bytes!("../assets/fonts/DejaVuSansMono-Bold.ttf");

fn label_font() -> Option<&'static FontRef<'static>> {
    static FONT: OnceLock<Option<FontRef<'static>>> = OnceLock::new();
    FONT.get_or_init(|| match FontRef::try_from_slice(FONT_BYTES) {
        Ok(font) => Some(font),
        Err(e) => {
            warn!("Overlay font unusable, drawing boxes only: {}", e);
            None
        }
    })
    .as_ref()
}

/// Draws at most `max_boxes` detections and the count banner.
/// Returns the number of boxes that landed inside the frame.
pub fn draw_overlay(
    frame: &mut Frame,
    detections: &[Detection],
    count: u32,
    max_boxes: usize,
) -> usize {
    let Some(mut img) = to_rgb_image(frame) else {
        return 0;
    };

    let mut drawn = 0;
    for det in detections.iter().take(max_boxes) {
        if let Some(rect) = box_rect(det.bbox, img.width(), img.height()) {
            draw_box(&mut img, rect);
            drawn += 1;
        }
    }

    draw_banner(&mut img, &format!("VEHICLES: {}", count));

    frame.data = img.into_raw();
    drawn
}

/// Clips `[x1, y1, x2, y2]` to the image. `None` when nothing is visible.
fn box_rect(bbox: [f32; 4], width: u32, height: u32) -> Option<Rect> {
    let x1 = bbox[0].max(0.0);
    let y1 = bbox[1].max(0.0);
    let x2 = bbox[2].min(width as f32 - 1.0);
    let y2 = bbox[3].min(height as f32 - 1.0);
    if !(x2 >= x1 && y2 >= y1) {
        return None;
    }

    let (x1, y1) = (x1.round() as i32, y1.round() as i32);
    let (x2, y2) = (x2.round() as i32, y2.round() as i32);
    Some(Rect::at(x1, y1).of_size((x2 - x1 + 1) as u32, (y2 - y1 + 1) as u32))
}

fn draw_box(img: &mut RgbImage, rect: Rect) {
    for inset in 0..BOX_THICKNESS {
        let w = rect.width() as i32 - 2 * inset;
        let h = rect.height() as i32 - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let inner = Rect::at(rect.left() + inset, rect.top() + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(img, inner, BOX_COLOR);
    }
}

fn draw_banner(img: &mut RgbImage, label: &str) {
    let Some(font) = label_font() else {
        return;
    };
    let scale = PxScale::from(TEXT_SCALE);
    let (w, h) = text_size(scale, font, label);

    let banner = Rect::at(BANNER_ORIGIN, BANNER_ORIGIN).of_size(
        w.max(1) + 2 * BANNER_PADDING,
        h.max(1) + 2 * BANNER_PADDING,
    );
    draw_filled_rect_mut(img, banner, BANNER_COLOR);

    let text_origin = BANNER_ORIGIN + BANNER_PADDING as i32;
    draw_text_mut(img, TEXT_COLOR, text_origin, text_origin, scale, font, label);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn black(width: usize, height: usize) -> Frame {
        Frame::new(vec![0; width * height * 3], width, height, 0.0)
    }

    fn pixel(frame: &Frame, x: usize, y: usize) -> [u8; 3] {
        let i = (y * frame.width + x) * 3;
        [frame.data[i], frame.data[i + 1], frame.data[i + 2]]
    }

    #[test]
    fn test_box_outline_drawn() {
        let mut frame = black(200, 200);
        let det = Detection::new([100.0, 120.0, 150.0, 180.0], 0.9, 2);
        assert_eq!(draw_overlay(&mut frame, &[det], 1, 60), 1);

        assert_eq!(pixel(&frame, 100, 150), BOX_COLOR.0);
        assert_eq!(pixel(&frame, 101, 150), BOX_COLOR.0);
        assert_eq!(pixel(&frame, 150, 150), BOX_COLOR.0);
        assert_eq!(pixel(&frame, 125, 120), BOX_COLOR.0);
        assert_eq!(pixel(&frame, 125, 180), BOX_COLOR.0);
        // Interior untouched.
        assert_eq!(pixel(&frame, 125, 150), [0, 0, 0]);
    }

    #[test]
    fn test_box_count_capped() {
        let mut frame = black(480, 360);
        let dets: Vec<Detection> = (0..100)
            .map(|i| {
                let x = (i % 20) as f32 * 20.0;
                let y = 100.0 + (i / 20) as f32 * 40.0;
                Detection::new([x, y, x + 10.0, y + 10.0], 0.5, 2)
            })
            .collect();
        assert_eq!(draw_overlay(&mut frame, &dets, 100, 60), 60);
    }

    #[test]
    fn test_out_of_bounds_boxes_clipped() {
        let mut frame = black(50, 50);
        let det = Detection::new([-20.0, -20.0, 500.0, 500.0], 0.9, 2);
        assert_eq!(draw_overlay(&mut frame, &[det], 1, 60), 1);
        assert_eq!(frame.data.len(), 50 * 50 * 3);
        assert_eq!(pixel(&frame, 49, 49), BOX_COLOR.0);
    }

    #[test]
    fn test_box_outside_frame_skipped() {
        let mut frame = black(50, 50);
        let det = Detection::new([300.0, 300.0, 320.0, 320.0], 0.9, 2);
        assert_eq!(draw_overlay(&mut frame, &[det], 1, 60), 0);
    }

    #[test]
    fn test_banner_and_label_drawn() {
        let mut frame = black(480, 360);
        draw_overlay(&mut frame, &[], 7, 60);
        assert_eq!(pixel(&frame, 6, 6), BANNER_COLOR.0);

        let text_pixels = (5..45)
            .flat_map(|y| (5..200).map(move |x| (x, y)))
            .filter(|&(x, y)| pixel(&frame, x, y)[1] > 150)
            .count();
        assert!(text_pixels > 0);
    }

    #[test]
    fn test_font_embedded() {
        assert!(label_font().is_some());
    }

    #[test]
    fn test_malformed_frame_left_alone() {
        let mut frame = Frame::new(vec![0; 10], 4, 4, 0.0);
        assert_eq!(draw_overlay(&mut frame, &[], 3, 60), 0);
        assert_eq!(frame.data, vec![0; 10]);
    }
}

//! Track overlays: box outline plus an `ID: n` label above it

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::vision::detector::Track;

/// Track colors, picked by `track_id % PALETTE.len()`
pub const PALETTE: [Rgb<u8>; 7] = [
    Rgb([255, 0, 0]),
    Rgb([0, 255, 0]),
    Rgb([0, 0, 255]),
    Rgb([255, 255, 0]),
    Rgb([255, 165, 0]),
    Rgb([255, 0, 255]),
    Rgb([0, 255, 255]),
];

const GLYPH_SCALE: i32 = 2;
const GLYPH_ADVANCE: i32 = 6 * GLYPH_SCALE;
const GLYPH_HEIGHT: i32 = 7 * GLYPH_SCALE;
const LABEL_BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);

pub fn color_for(track_id: u64) -> Rgb<u8> {
    PALETTE[(track_id % PALETTE.len() as u64) as usize]
}

/// Draw every track onto the frame in place
pub fn annotate(image: &mut RgbImage, tracks: &[Track], thickness: u32) {
    for track in tracks {
        draw_track(image, track, thickness);
    }
}

fn draw_track(image: &mut RgbImage, track: &Track, thickness: u32) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    if width == 0 || height == 0 {
        return;
    }

    let color = color_for(track.track_id);
    let left = (track.bbox.x1.round() as i32).clamp(0, width - 1);
    let top = (track.bbox.y1.round() as i32).clamp(0, height - 1);
    let right = (track.bbox.x2.round() as i32).clamp(0, width - 1);
    let bottom = (track.bbox.y2.round() as i32).clamp(0, height - 1);

    // Inset one pixel per pass for thicker outlines
    for inset in 0..thickness.max(1) as i32 {
        let w = right - left - 2 * inset;
        let h = bottom - top - 2 * inset;
        if w < 1 || h < 1 {
            break;
        }
        let rect = Rect::at(left + inset, top + inset).of_size(w as u32 + 1, h as u32 + 1);
        draw_hollow_rect_mut(image, rect, color);
    }

    let label = format!("ID: {}", track.track_id);
    let label_y = (top - GLYPH_HEIGHT - 4).max(0);
    draw_label(image, left, label_y, &label, color);
}

fn draw_label(image: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let text_width = text.chars().count() as i32 * GLYPH_ADVANCE;
    draw_filled_rect_mut(
        image,
        Rect::at(x, y).of_size(text_width as u32 + 2, GLYPH_HEIGHT as u32 + 2),
        LABEL_BACKGROUND,
    );

    let mut pen_x = x + 1;
    for ch in text.chars() {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..5 {
                    if (pattern >> (4 - col)) & 1 == 1 {
                        let px = pen_x + col * GLYPH_SCALE;
                        let py = y + 1 + row as i32 * GLYPH_SCALE;
                        draw_filled_rect_mut(
                            image,
                            Rect::at(px, py).of_size(GLYPH_SCALE as u32, GLYPH_SCALE as u32),
                            color,
                        );
                    }
                }
            }
        }
        pen_x += GLYPH_ADVANCE;
    }
}

/// 5x7 bitmaps for the characters a track label can contain
fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'D' => [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100],
        ':' => [0, 0b00100, 0b00100, 0, 0b00100, 0b00100, 0],
        ' ' => [0; 7],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        _ => return None,
    };
    Some(rows)
}

//! Chat bubble sizing
//!
//! A character-count heuristic for a monospace-ish 16px font in a 700px
//! column. Recomputed on every streamed chunk.

#![allow(clippy::cast_precision_loss)]

use crate::persona::Side;
use serde::Serialize;

pub const FONT_SIZE_PX: f64 = 16.0;
pub const CHAR_WIDTH_PX: f64 = 0.6 * FONT_SIZE_PX;
pub const MAX_LINE_WIDTH_PX: f64 = 700.0 * 0.8;
pub const MAX_CHARS_PER_LINE: usize = 69;
pub const LINE_HEIGHT_PX: f64 = FONT_SIZE_PX * 1.5;
/// Shrink per line beyond the third
pub const HEIGHT_REDUCER_PX: f64 = 10.0;
pub const MIN_HEIGHT_PX: f64 = 32.0;
/// Extra room the embedding frame needs around the bubble
pub const FRAME_PADDING_PX: f64 = FONT_SIZE_PX * 1.4;

/// Estimated display size of one message
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bubble {
    pub side: Side,
    pub width_px: f64,
    pub height_px: f64,
    pub frame_height_px: f64,
}

impl Bubble {
    pub fn measure(text: &str, side: Side) -> Self {
        let height_px = estimate_height(text);
        Self {
            side,
            width_px: estimate_width(text),
            height_px,
            frame_height_px: height_px + FRAME_PADDING_PX,
        }
    }
}

pub fn estimate_width(text: &str) -> f64 {
    (text.chars().count() as f64 * CHAR_WIDTH_PX).min(MAX_LINE_WIDTH_PX)
}

pub fn line_count(text: &str) -> usize {
    text.chars().count().div_ceil(MAX_CHARS_PER_LINE)
}

pub fn estimate_height(text: &str) -> f64 {
    let lines = line_count(text);
    let mut height = lines as f64 * LINE_HEIGHT_PX;
    if lines > 3 {
        height -= HEIGHT_REDUCER_PX * (lines - 3) as f64;
    }
    height.max(MIN_HEIGHT_PX)
}

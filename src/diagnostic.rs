//! Wiring diagnostics.
//!
//! The walk pattern lights one LED per frame in physical strip order, so on a
//! correctly configured board the dot traces the serpentine: along row 0,
//! back along row 1, and so on. If it jumps to the far end of a row instead,
//! the row parity setting is wrong for this board.

use crate::Pixel;
use crate::brightness::{MaxBrightness, within_ceiling};
use crate::layout::SerpentineLayout;
use crate::pattern::{Frame, Pattern, PatternError};

/// One frame per LED, each with a single lit pixel, in wiring order.
///
/// With `color` set the dot keeps that colour; otherwise its hue advances
/// along the strip so direction is visible even in a still photo. Either way
/// the dot is dimmed to what `max_brightness` can show, so the walk plays at
/// any ceiling.
///
/// Fails only for a zero-sized layout, which has no LEDs to walk.
pub fn walk_pattern(
    layout: &SerpentineLayout,
    color: Option<Pixel>,
    max_brightness: MaxBrightness,
) -> Result<Pattern, PatternError> {
    let geometry = layout.geometry();
    let count = geometry.pixel_count().max(1);
    let blank = Frame::solid(geometry, Pixel::BLACK);

    let frames = layout
        .physical_order()
        .enumerate()
        .map(|(index, (x, y))| {
            let mut frame = blank.clone();
            let pixel = color.unwrap_or_else(|| {
                Pixel::from_hue((index as u64 * 300 / u64::from(count)) as u16)
            });
            frame.put(x, y, within_ceiling(pixel, max_brightness));
            frame
        })
        .collect();

    Pattern::new(frames)
}

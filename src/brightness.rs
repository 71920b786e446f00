//! Per-pixel brightness shaping.
//!
//! The strip takes full-intensity RGB plus one shared brightness multiplier
//! per LED. Instead of dimming each channel we derive that multiplier from the
//! pixel's luma, so hue is preserved while bright and dark colours end up at a
//! comparable perceived intensity.

use crate::Pixel;
use crate::error::PlaybackError;

/// ITU-R BT.709 luma weights, applied to raw 0-255 channel values.
pub const LUMA_RED: f64 = 0.2126;
pub const LUMA_GREEN: f64 = 0.7152;
pub const LUMA_BLUE: f64 = 0.0722;

/// Global brightness ceiling, validated to lie in `(0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct MaxBrightness(f64);

impl MaxBrightness {
    pub fn new(value: f64) -> Result<Self, PlaybackError> {
        // NaN fails both comparisons.
        if value > 0.0 && value <= 1.0 {
            Ok(Self(value))
        } else {
            Err(PlaybackError::InvalidMaxBrightness(value))
        }
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl Default for MaxBrightness {
    fn default() -> Self {
        Self(0.5)
    }
}

impl TryFrom<f64> for MaxBrightness {
    type Error = PlaybackError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Luma of a pixel on the 0-255 scale.
pub fn luma(pixel: Pixel) -> f64 {
    LUMA_RED * f64::from(pixel.r) + LUMA_GREEN * f64::from(pixel.g) + LUMA_BLUE * f64::from(pixel.b)
}

/// Brightness scalar for `pixel` under `max_brightness`.
///
/// Not clamped: the frame buffer rejects values the device can't represent.
pub fn brightness(pixel: Pixel, max_brightness: MaxBrightness) -> f64 {
    luma(pixel) / (100.0 * max_brightness.get())
}

/// Largest luma that still shapes to a valid device brightness (at most 1.0).
pub fn max_representable_luma(max_brightness: MaxBrightness) -> f64 {
    100.0 * max_brightness.get()
}

/// Dim `pixel` just enough that it shapes to a valid device brightness under
/// `max_brightness`. Pixels already in range are returned unchanged.
pub fn within_ceiling(pixel: Pixel, max_brightness: MaxBrightness) -> Pixel {
    let current = luma(pixel);
    let limit = max_representable_luma(max_brightness);
    if current <= limit {
        return pixel;
    }
    // Rounding each channel can add at most half a step of luma.
    let factor = (limit - 0.5).max(0.0) / current;
    pixel.scaled(factor)
}

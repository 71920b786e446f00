//! Play pre-rendered pixel patterns on a serpentine-wired RGB LED grid.
//!
//! The crate is split leaves-first:
//! - [`layout`] maps logical `(x, y)` to the physical strip index
//! - [`brightness`] shapes a per-LED brightness from the pixel's luma
//! - [`sink`] owns the device buffer and the transports that commit it
//! - [`pacer`] holds the target frame rate
//! - [`engine`] ties them together and loops over a playlist
//!
//! Around that core sit the pattern file format ([`pattern`]), pattern
//! discovery and loading ([`media`]), the image/video converter
//! ([`convert`]), the noise generator ([`generate`]), the wiring diagnostic
//! ([`diagnostic`]) and the HTTP control surface ([`render`], [`server`]).

pub mod brightness;
pub mod convert;
pub mod diagnostic;
pub mod engine;
pub mod error;
pub mod generate;
pub mod layout;
pub mod media;
pub mod pacer;
pub mod pattern;
pub mod render;
pub mod server;
pub mod sink;

#[cfg(feature = "hardware")]
use rpi_led_matrix::{LedMatrix, LedMatrixOptions, LedRuntimeOptions};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// ── Display geometry ───────────────────────────────────────────────

/// Logical grid size, which also fixes the physical buffer length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct DisplayGeometry {
    pub width: u32,
    pub height: u32,
}

impl DisplayGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of LEDs on the strip. Only meaningful for a geometry that
    /// passed [`validated`](Self::validated).
    pub fn pixel_count(&self) -> u32 {
        self.width * self.height
    }

    /// Number of LEDs, or `None` if it does not fit in a `u32`.
    pub fn checked_pixel_count(&self) -> Option<u32> {
        self.width.checked_mul(self.height)
    }

    /// Reject grids with no LEDs or more LEDs than a strip index can address.
    pub fn validated(self) -> Result<Self, error::PlaybackError> {
        match self.checked_pixel_count() {
            Some(count) if count > 0 => Ok(self),
            _ => Err(error::PlaybackError::InvalidGeometry {
                width: self.width,
                height: self.height,
            }),
        }
    }
}

impl Default for DisplayGeometry {
    fn default() -> Self {
        Self {
            width: 30,
            height: 18,
        }
    }
}

impl std::fmt::Display for DisplayGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ── Pixel ──────────────────────────────────────────────────────────

/// One RGB value as authored in a pattern.
///
/// Kept independent of any hardware crate; sinks convert at their boundary.
/// Serializes as a `[r, g, b]` triple, the form used in pattern files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Pixel {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Pixel {
    pub const BLACK: Self = Self::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Fully saturated colour for a hue in degrees (wraps at 360).
    pub fn from_hue(hue: u16) -> Self {
        let hue = hue % 360;
        let sector = hue / 60;
        let fraction = f32::from(hue % 60) / 60.0;
        let rising = (fraction * 255.0) as u8;
        let falling = ((1.0 - fraction) * 255.0) as u8;

        match sector {
            0 => Self::new(255, rising, 0),
            1 => Self::new(falling, 255, 0),
            2 => Self::new(0, 255, rising),
            3 => Self::new(0, falling, 255),
            4 => Self::new(rising, 0, 255),
            _ => Self::new(255, 0, falling),
        }
    }

    /// Scale every channel by `factor`, clamped to `[0, 1]`.
    ///
    /// For devices without a per-LED brightness field.
    pub fn scaled(self, factor: f64) -> Self {
        let factor = factor.clamp(0.0, 1.0);
        let scale = |c: u8| (f64::from(c) * factor).round() as u8;
        Self::new(scale(self.r), scale(self.g), scale(self.b))
    }
}

impl From<[u8; 3]> for Pixel {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self::new(r, g, b)
    }
}

impl From<Pixel> for [u8; 3] {
    fn from(p: Pixel) -> Self {
        [p.r, p.g, p.b]
    }
}

#[cfg(feature = "hardware")]
impl From<Pixel> for rpi_led_matrix::LedColor {
    fn from(p: Pixel) -> Self {
        rpi_led_matrix::LedColor {
            red: p.r,
            green: p.g,
            blue: p.b,
        }
    }
}

// ── Matrix initialization ──────────────────────────────────────────

/// Create an `rpi-led-matrix` panel sized to `geometry`, for boards wired
/// through an Adafruit bonnet instead of a DotStar strip.
#[cfg(feature = "hardware")]
pub fn create_matrix(geometry: DisplayGeometry) -> Result<LedMatrix, Box<dyn std::error::Error>> {
    let mut options = LedMatrixOptions::new();
    options.set_rows(geometry.height);
    options.set_cols(geometry.width);
    options.set_hardware_mapping("adafruit-hat");
    options.set_pwm_bits(8)?;
    options.set_pwm_lsb_nanoseconds(130);

    let mut rt_options = LedRuntimeOptions::new();
    rt_options.set_gpio_slowdown(2);

    let matrix = LedMatrix::new(Some(options), Some(rt_options))?;
    Ok(matrix)
}

// ── Cancellation ───────────────────────────────────────────────────

/// Out-of-band stop request, checked by the engine once per frame boundary.
///
/// Clones share the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous request so the token can guard the next run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Install a Ctrl+C handler that cancels the returned token.
///
/// Only one handler can be installed per process.
pub fn setup_signal_handler() -> Result<CancelToken, ctrlc::Error> {
    let token = CancelToken::new();
    let handler_token = token.clone();

    ctrlc::set_handler(move || {
        handler_token.cancel();
    })?;

    Ok(token)
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn geometry_default_is_30x18() {
        let geometry = DisplayGeometry::default();
        assert_eq!(geometry, DisplayGeometry::new(30, 18));
        assert_eq!(geometry.to_string(), "30x18");
    }

    #[rstest]
    #[case(30, 18, 540)]
    #[case(1, 1, 1)]
    #[case(64, 32, 2048)]
    fn test_pixel_count(#[case] width: u32, #[case] height: u32, #[case] expected: u32) {
        assert_eq!(DisplayGeometry::new(width, height).pixel_count(), expected);
        assert_eq!(DisplayGeometry::new(width, height).validated().unwrap().pixel_count(), expected);
    }

    #[rstest]
    #[case(u32::MAX, 2)]
    #[case(70_000, 70_000)]
    #[case(0, 18)]
    #[case(30, 0)]
    fn geometry_without_addressable_leds_is_rejected(#[case] width: u32, #[case] height: u32) {
        let result = DisplayGeometry::new(width, height).validated();
        assert!(matches!(
            result,
            Err(error::PlaybackError::InvalidGeometry { width: w, height: h }) if w == width && h == height
        ));
    }

    #[test]
    fn checked_pixel_count_reports_overflow() {
        assert_eq!(DisplayGeometry::new(65_536, 65_536).checked_pixel_count(), None);
        assert_eq!(DisplayGeometry::new(65_535, 65_537).checked_pixel_count(), Some(u32::MAX));
    }

    #[rstest]
    #[case(0, 255, 0, 0)]
    #[case(60, 255, 255, 0)]
    #[case(120, 0, 255, 0)]
    #[case(180, 0, 255, 255)]
    #[case(240, 0, 0, 255)]
    #[case(300, 255, 0, 255)]
    fn test_pixel_from_hue_primary(#[case] hue: u16, #[case] r: u8, #[case] g: u8, #[case] b: u8) {
        assert_eq!(Pixel::from_hue(hue), Pixel::new(r, g, b));
    }

    #[test]
    fn pixel_from_hue_wraps_at_360() {
        assert_eq!(Pixel::from_hue(0), Pixel::from_hue(360));
        assert_eq!(Pixel::from_hue(90), Pixel::from_hue(450));
    }

    #[rstest]
    #[case(1.0, Pixel::new(200, 100, 50))]
    #[case(0.5, Pixel::new(100, 50, 25))]
    #[case(0.0, Pixel::BLACK)]
    #[case(3.0, Pixel::new(200, 100, 50))]
    fn scaled_clamps_factor(#[case] factor: f64, #[case] expected: Pixel) {
        assert_eq!(Pixel::new(200, 100, 50).scaled(factor), expected);
    }

    #[test]
    fn pixel_serializes_as_triple() {
        let json = serde_json::to_string(&Pixel::new(1, 2, 3)).unwrap();
        assert_eq!(json, "[1,2,3]");
        let back: Pixel = serde_json::from_str("[4,5,6]").unwrap();
        assert_eq!(back, Pixel::new(4, 5, 6));
    }

    #[test]
    fn cancel_token_clones_share_state() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
        other.reset();
        assert!(!token.is_cancelled());
    }
}

//! Error types shared by the playback core.
//!
//! Each concern gets its own enum: [`PlaybackError`] for the engine and its
//! leaves, [`SinkError`] for device transports. The pattern format and the
//! converter define their own errors next to the code that raises them.

use crate::DisplayGeometry;
use thiserror::Error;

/// Failure reported by a [`DeviceSink`](crate::sink::DeviceSink) while
/// transmitting a frame.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("device I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("device rejected frame: {0}")]
    Device(String),
}

/// Everything that can stop playback or refuse to start it.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Logical coordinate outside the display grid.
    #[error("coordinate ({x}, {y}) is outside the {width}x{height} grid")]
    InvalidCoordinate {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    /// Physical index past the end of the device buffer.
    #[error("pixel index {index} is out of range for a buffer of {len} cells")]
    IndexOutOfRange { index: u32, len: u32 },

    /// Shaped brightness the device cannot represent. Usually means the
    /// max-brightness setting is miscalibrated for the content.
    #[error("brightness {value} at pixel {index} is outside the device range [0, 1]")]
    BrightnessOutOfRange { index: u32, value: f64 },

    /// Pattern frames are a different size than the display.
    #[error("pattern is {actual} but the display is {expected}")]
    GeometryMismatch {
        expected: DisplayGeometry,
        actual: DisplayGeometry,
    },

    /// Grid with no LEDs, or more than a `u32` strip index can address.
    #[error("a {width}x{height} display must have between 1 and {max} LEDs", max = u32::MAX)]
    InvalidGeometry { width: u32, height: u32 },

    #[error("transmission failed: {0}")]
    Transmission(#[from] SinkError),

    #[error("cannot start playback with an empty playlist")]
    EmptyPlaylist,

    #[error("frame rate must be a positive number of frames per second, got {0}")]
    InvalidFrameRate(f64),

    #[error("max brightness must be in (0, 1], got {0}")]
    InvalidMaxBrightness(f64),
}

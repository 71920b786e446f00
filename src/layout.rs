//! Logical `(x, y)` to physical strip index mapping for serpentine wiring.
//!
//! The board is one long strip folded into rows. Consecutive rows alternate
//! scan direction, so with the default parity the strip runs:
//!
//! ```text
//!   LED0  LED1  LED2  LED3      row 0  →
//!   LED7  LED6  LED5  LED4      row 1  ←
//!   LED8  LED9  LED10 LED11     row 2  →
//! ```
//!
//! Coordinates are screen-style: `(0, 0)` is the top-left corner, `x` grows to
//! the right and `y` grows downward. Patterns are always stored in this
//! logical order; this module is the only place that knows about the fold.

use crate::DisplayGeometry;
use crate::error::PlaybackError;

/// Which rows run left-to-right.
///
/// The physical wiring decides this, not the content. Use the diagnostic walk
/// pattern to check it against a real board before trusting either value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum RowParity {
    /// Rows 0, 2, 4, … run left-to-right; odd rows run right-to-left.
    #[default]
    #[value(name = "even-left-to-right")]
    EvenRowsLeftToRight,
    /// Rows 0, 2, 4, … run right-to-left; odd rows run left-to-right.
    #[value(name = "even-right-to-left")]
    EvenRowsRightToLeft,
}

impl RowParity {
    /// True if row `y` is wired right-to-left.
    pub fn is_reversed(self, y: u32) -> bool {
        let odd = y % 2 == 1;
        match self {
            Self::EvenRowsLeftToRight => odd,
            Self::EvenRowsRightToLeft => !odd,
        }
    }
}

/// Serpentine wiring for a `width` × `height` grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SerpentineLayout {
    geometry: DisplayGeometry,
    parity: RowParity,
}

impl SerpentineLayout {
    pub fn new(geometry: DisplayGeometry, parity: RowParity) -> Self {
        Self { geometry, parity }
    }

    pub fn geometry(&self) -> DisplayGeometry {
        self.geometry
    }

    pub fn parity(&self) -> RowParity {
        self.parity
    }

    /// Physical strip index of logical pixel `(x, y)`.
    pub fn map(&self, x: u32, y: u32) -> Result<u32, PlaybackError> {
        let DisplayGeometry { width, height } = self.geometry;
        if x >= width || y >= height {
            return Err(PlaybackError::InvalidCoordinate {
                x,
                y,
                width,
                height,
            });
        }

        let column = if self.parity.is_reversed(y) {
            width - 1 - x
        } else {
            x
        };
        Ok(y * width + column)
    }

    /// Logical coordinate of physical strip index `index`. Inverse of [`Self::map`].
    pub fn unmap(&self, index: u32) -> Result<(u32, u32), PlaybackError> {
        let len = self.geometry.pixel_count();
        if index >= len {
            return Err(PlaybackError::IndexOutOfRange { index, len });
        }

        let width = self.geometry.width;
        let y = index / width;
        let column = index % width;
        let x = if self.parity.is_reversed(y) {
            width - 1 - column
        } else {
            column
        };
        Ok((x, y))
    }

    /// Logical coordinates in the order the strip is wired.
    pub fn physical_order(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let DisplayGeometry { width, height } = self.geometry;
        (0..height).flat_map(move |y| {
            (0..width).map(move |column| {
                if self.parity.is_reversed(y) {
                    (width - 1 - column, y)
                } else {
                    (column, y)
                }
            })
        })
    }
}

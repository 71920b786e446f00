//! HUB75 panel sink backed by `rpi-led-matrix`.
//!
//! The panel is addressed by `(x, y)`, so cells are placed back at their
//! logical position through the serpentine layout. It has no per-LED
//! brightness field; the brightness is folded into the colour instead.

use super::{DeviceCell, DeviceSink};
use crate::error::SinkError;
use crate::layout::SerpentineLayout;
use rpi_led_matrix::{LedCanvas, LedMatrix};

pub struct MatrixSink {
    matrix: LedMatrix,
    // Always `Some` between commits; taken while the canvas is swapped.
    canvas: Option<LedCanvas>,
    layout: SerpentineLayout,
}

impl MatrixSink {
    pub fn new(layout: SerpentineLayout) -> Result<Self, SinkError> {
        let matrix = crate::create_matrix(layout.geometry())
            .map_err(|e| SinkError::Device(format!("matrix init failed: {e}")))?;
        let canvas = matrix.offscreen_canvas();
        Ok(Self {
            matrix,
            canvas: Some(canvas),
            layout,
        })
    }
}

impl DeviceSink for MatrixSink {
    fn name(&self) -> &'static str {
        "matrix"
    }

    fn commit(&mut self, cells: &[DeviceCell]) -> Result<(), SinkError> {
        let mut canvas = self
            .canvas
            .take()
            .ok_or_else(|| SinkError::Device("canvas lost by a previous commit".to_string()))?;

        for (index, cell) in cells.iter().enumerate() {
            let (x, y) = match self.layout.unmap(index as u32) {
                Ok(xy) => xy,
                Err(e) => {
                    self.canvas = Some(canvas);
                    return Err(SinkError::Device(e.to_string()));
                }
            };
            let color = cell.pixel().scaled(cell.brightness);
            canvas.set(x as i32, y as i32, &color.into());
        }

        self.canvas = Some(self.matrix.swap(canvas));
        Ok(())
    }
}

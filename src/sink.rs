//! Physical pixel buffer and the transports that commit it.
//!
//! [`FrameBuffer`] owns one [`DeviceCell`] per LED, indexed in physical strip
//! order, and is the only thing that hands cells to a [`DeviceSink`]. Which
//! sink backs it is decided once at startup by the caller:
//! - [`apa102::Apa102Sink`] writes DotStar frames to an SPI device node
//! - `matrix::MatrixSink` (feature `hardware`) drives an `rpi-led-matrix` panel
//! - [`NullSink`] and [`RecordingSink`] transmit nothing

pub mod apa102;
#[cfg(feature = "hardware")]
pub mod matrix;

use crate::Pixel;
use crate::error::{PlaybackError, SinkError};

/// One LED as sent to the device: full-intensity colour plus a shared
/// brightness in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeviceCell {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub brightness: f64,
}

impl DeviceCell {
    pub fn new(pixel: Pixel, brightness: f64) -> Self {
        Self {
            r: pixel.r,
            g: pixel.g,
            b: pixel.b,
            brightness,
        }
    }

    pub fn pixel(&self) -> Pixel {
        Pixel::new(self.r, self.g, self.b)
    }
}

impl Default for DeviceCell {
    fn default() -> Self {
        Self::new(Pixel::BLACK, 1.0)
    }
}

/// A transport that pushes a whole buffer to the LEDs.
///
/// `commit` either delivers every cell or returns an error; callers never see
/// a partially transmitted frame reported as success. Implementations are not
/// expected to be shared between sessions.
pub trait DeviceSink {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    fn commit(&mut self, cells: &[DeviceCell]) -> Result<(), SinkError>;
}

impl<S: DeviceSink + ?Sized> DeviceSink for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn commit(&mut self, cells: &[DeviceCell]) -> Result<(), SinkError> {
        (**self).commit(cells)
    }
}

/// Fixed-length cell buffer bound to its sink.
pub struct FrameBuffer<S> {
    cells: Vec<DeviceCell>,
    sink: S,
}

impl<S: DeviceSink> FrameBuffer<S> {
    /// Allocate `len` black cells. The buffer never grows or shrinks after this.
    pub fn new(len: u32, sink: S) -> Self {
        Self {
            cells: vec![DeviceCell::default(); len as usize],
            sink,
        }
    }

    pub fn len(&self) -> u32 {
        self.cells.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[DeviceCell] {
        &self.cells
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Write one cell.
    pub fn set(&mut self, index: u32, pixel: Pixel, brightness: f64) -> Result<(), PlaybackError> {
        let len = self.len();
        let Some(cell) = self.cells.get_mut(index as usize) else {
            return Err(PlaybackError::IndexOutOfRange { index, len });
        };
        if !(0.0..=1.0).contains(&brightness) {
            return Err(PlaybackError::BrightnessOutOfRange {
                index,
                value: brightness,
            });
        }
        *cell = DeviceCell::new(pixel, brightness);
        Ok(())
    }

    /// Set every cell to `pixel` at full brightness.
    pub fn fill(&mut self, pixel: Pixel) {
        self.cells.fill(DeviceCell::new(pixel, 1.0));
    }

    /// Transmit the whole buffer.
    pub fn commit(&mut self) -> Result<(), PlaybackError> {
        self.sink.commit(&self.cells)?;
        Ok(())
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

/// Sink that drops every frame. Counts commits so callers can still observe
/// progress.
#[derive(Debug, Default)]
pub struct NullSink {
    commits: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commits(&self) -> u64 {
        self.commits
    }
}

impl DeviceSink for NullSink {
    fn name(&self) -> &'static str {
        "null"
    }

    fn commit(&mut self, _cells: &[DeviceCell]) -> Result<(), SinkError> {
        self.commits += 1;
        Ok(())
    }
}

/// Sink that keeps a copy of every committed buffer.
#[derive(Debug, Default)]
pub struct RecordingSink {
    frames: Vec<Vec<DeviceCell>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every committed buffer, oldest first.
    pub fn frames(&self) -> &[Vec<DeviceCell>] {
        &self.frames
    }

    pub fn last(&self) -> Option<&[DeviceCell]> {
        self.frames.last().map(Vec::as_slice)
    }
}

impl DeviceSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn commit(&mut self, cells: &[DeviceCell]) -> Result<(), SinkError> {
        self.frames.push(cells.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    struct FailingSink;

    impl DeviceSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn commit(&mut self, _cells: &[DeviceCell]) -> Result<(), SinkError> {
            Err(SinkError::Device("bus unplugged".to_string()))
        }
    }

    #[test]
    fn new_buffer_is_black_and_sized() {
        let buffer = FrameBuffer::new(6, NullSink::new());
        assert_eq!(buffer.len(), 6);
        assert!(buffer.cells().iter().all(|c| c.pixel() == Pixel::BLACK));
    }

    #[test]
    fn set_writes_one_cell() {
        let mut buffer = FrameBuffer::new(4, NullSink::new());
        buffer.set(2, Pixel::new(1, 2, 3), 0.25).unwrap();
        assert_eq!(buffer.cells()[2], DeviceCell::new(Pixel::new(1, 2, 3), 0.25));
        assert_eq!(buffer.cells()[1], DeviceCell::default());
    }

    #[test]
    fn set_past_end_is_index_out_of_range() {
        let mut buffer = FrameBuffer::new(4, NullSink::new());
        let err = buffer.set(4, Pixel::BLACK, 0.0).unwrap_err();
        assert!(matches!(err, PlaybackError::IndexOutOfRange { index: 4, len: 4 }));
    }

    #[rstest]
    #[case(1.5)]
    #[case(-0.1)]
    #[case(f64::NAN)]
    fn set_rejects_unrepresentable_brightness(#[case] value: f64) {
        let mut buffer = FrameBuffer::new(1, NullSink::new());
        let err = buffer.set(0, Pixel::new(9, 9, 9), value).unwrap_err();
        assert!(matches!(err, PlaybackError::BrightnessOutOfRange { index: 0, .. }));
        assert_eq!(buffer.cells()[0], DeviceCell::default());
    }

    #[rstest]
    #[case(0.0)]
    #[case(1.0)]
    fn set_accepts_range_bounds(#[case] value: f64) {
        let mut buffer = FrameBuffer::new(1, NullSink::new());
        assert!(buffer.set(0, Pixel::new(9, 9, 9), value).is_ok());
    }

    #[test]
    fn fill_sets_full_brightness_everywhere() {
        let mut buffer = FrameBuffer::new(3, NullSink::new());
        buffer.set(1, Pixel::new(5, 5, 5), 0.1).unwrap();
        buffer.fill(Pixel::new(7, 8, 9));
        for cell in buffer.cells() {
            assert_eq!(*cell, DeviceCell::new(Pixel::new(7, 8, 9), 1.0));
        }
    }

    #[test]
    fn commit_sends_whole_buffer() {
        let mut buffer = FrameBuffer::new(2, RecordingSink::new());
        buffer.set(0, Pixel::new(1, 1, 1), 0.5).unwrap();
        buffer.commit().unwrap();
        buffer.fill(Pixel::BLACK);
        buffer.commit().unwrap();

        let frames = buffer.sink().frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), 2);
        assert_eq!(frames[0][0], DeviceCell::new(Pixel::new(1, 1, 1), 0.5));
        assert_eq!(frames[1][0], DeviceCell::new(Pixel::BLACK, 1.0));
    }

    #[test]
    fn commit_failure_is_transmission_error() {
        let mut buffer = FrameBuffer::new(1, FailingSink);
        let err = buffer.commit().unwrap_err();
        assert!(matches!(err, PlaybackError::Transmission(SinkError::Device(_))));
    }

    #[test]
    fn boxed_sinks_delegate() {
        let sink: Box<dyn DeviceSink> = Box::new(NullSink::new());
        let mut buffer = FrameBuffer::new(1, sink);
        buffer.commit().unwrap();
        assert_eq!(buffer.sink().name(), "null");
    }
}

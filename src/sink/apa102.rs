//! DotStar (APA102) framing over a byte stream.
//!
//! Each commit becomes one contiguous transfer:
//!
//! ```text
//! 00 00 00 00 | 111bbbbb c0 c1 c2 | … | FF × ceil(n / 16)
//!  start       one LED: 5-bit brightness + 3 channels   end
//! ```
//!
//! The clock and data lines are the SPI bus behind a spidev node, set to
//! mode 0, 8-bit words and the configured baud rate when it is opened.

use super::{DeviceCell, DeviceSink};
use crate::error::SinkError;
#[cfg(target_os = "linux")]
use spidev::{SpiModeFlags, Spidev, SpidevOptions};
use std::io::Write;
#[cfg(target_os = "linux")]
use std::path::Path;

/// Default DotStar bus speed.
pub const DEFAULT_BAUD_RATE: u32 = 4_000_000;

const START_FRAME: [u8; 4] = [0x00; 4];
const LED_HEADER: u8 = 0b1110_0000;
const BRIGHTNESS_STEPS: f64 = 31.0;

/// Order the three colour bytes go out on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Rbg,
    Grb,
    Gbr,
    Brg,
    Bgr,
}

impl ChannelOrder {
    fn arrange(self, cell: &DeviceCell) -> [u8; 3] {
        let DeviceCell { r, g, b, .. } = *cell;
        match self {
            Self::Rgb => [r, g, b],
            Self::Rbg => [r, b, g],
            Self::Grb => [g, r, b],
            Self::Gbr => [g, b, r],
            Self::Brg => [b, r, g],
            Self::Bgr => [b, g, r],
        }
    }
}

/// Transport settings for an APA102 strip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Apa102Config {
    pub baud_rate: u32,
    pub channel_order: ChannelOrder,
}

impl Default for Apa102Config {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            channel_order: ChannelOrder::Rgb,
        }
    }
}

/// APA102 sink writing to any byte stream; an SPI device node in production.
pub struct Apa102Sink<W> {
    out: W,
    config: Apa102Config,
    scratch: Vec<u8>,
}

impl Apa102Config {
    /// Bus settings for a spidev node. DotStar samples data on the rising
    /// clock edge, which is mode 0.
    #[cfg(target_os = "linux")]
    pub fn spi_options(&self) -> SpidevOptions {
        SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(self.baud_rate)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build()
    }
}

#[cfg(target_os = "linux")]
impl Apa102Sink<Spidev> {
    /// Open and configure a spidev node (e.g. `/dev/spidev0.0`).
    ///
    /// Fails if the node is missing or the kernel rejects the bus settings,
    /// which is also what happens for a path that is not an SPI device.
    pub fn open(path: &Path, config: Apa102Config) -> Result<Self, SinkError> {
        let mut spi = Spidev::open(path)?;
        spi.configure(&config.spi_options())?;
        tracing::info!(
            "Opened APA102 strip on {} ({} Hz, {:?} order)",
            path.display(),
            config.baud_rate,
            config.channel_order
        );
        Ok(Self::new(spi, config))
    }
}

impl<W: Write> Apa102Sink<W> {
    pub fn new(out: W, config: Apa102Config) -> Self {
        Self {
            out,
            config,
            scratch: Vec::new(),
        }
    }

    pub fn config(&self) -> Apa102Config {
        self.config
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn encode(&mut self, cells: &[DeviceCell]) {
        let end_len = cells.len().div_ceil(16);
        self.scratch.clear();
        self.scratch.reserve(START_FRAME.len() + cells.len() * 4 + end_len);

        self.scratch.extend_from_slice(&START_FRAME);
        for cell in cells {
            self.scratch.push(LED_HEADER | brightness_bits(cell.brightness));
            self.scratch.extend_from_slice(&self.config.channel_order.arrange(cell));
        }
        self.scratch.resize(self.scratch.len() + end_len, 0xFF);
    }
}

/// 5-bit global brightness field for a brightness in `[0, 1]`.
fn brightness_bits(brightness: f64) -> u8 {
    (brightness.clamp(0.0, 1.0) * BRIGHTNESS_STEPS).round() as u8
}

impl<W: Write> DeviceSink for Apa102Sink<W> {
    fn name(&self) -> &'static str {
        "apa102"
    }

    fn commit(&mut self, cells: &[DeviceCell]) -> Result<(), SinkError> {
        self.encode(cells);
        self.out.write_all(&self.scratch)?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Pixel;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn cell(r: u8, g: u8, b: u8, brightness: f64) -> DeviceCell {
        DeviceCell::new(Pixel::new(r, g, b), brightness)
    }

    #[test]
    fn frames_two_leds() {
        let mut sink = Apa102Sink::new(Vec::new(), Apa102Config::default());
        sink.commit(&[cell(1, 2, 3, 1.0), cell(4, 5, 6, 0.0)]).unwrap();

        let bytes = sink.into_inner();
        assert_eq!(
            bytes,
            vec![0, 0, 0, 0, 0xFF, 1, 2, 3, 0xE0, 4, 5, 6, 0xFF]
        );
    }

    #[rstest]
    #[case(ChannelOrder::Rgb, [10, 20, 30])]
    #[case(ChannelOrder::Bgr, [30, 20, 10])]
    #[case(ChannelOrder::Grb, [20, 10, 30])]
    #[case(ChannelOrder::Brg, [30, 10, 20])]
    fn honours_channel_order(#[case] order: ChannelOrder, #[case] expected: [u8; 3]) {
        let config = Apa102Config {
            channel_order: order,
            ..Apa102Config::default()
        };
        let mut sink = Apa102Sink::new(Vec::new(), config);
        sink.commit(&[cell(10, 20, 30, 1.0)]).unwrap();
        assert_eq!(&sink.into_inner()[5..8], &expected);
    }

    #[rstest]
    #[case(1, 1)]
    #[case(16, 1)]
    #[case(17, 2)]
    #[case(540, 34)]
    fn end_frame_covers_the_strip(#[case] leds: usize, #[case] end_bytes: usize) {
        let mut sink = Apa102Sink::new(Vec::new(), Apa102Config::default());
        sink.commit(&vec![DeviceCell::default(); leds]).unwrap();
        let bytes = sink.into_inner();
        assert_eq!(bytes.len(), 4 + leds * 4 + end_bytes);
        assert!(bytes[bytes.len() - end_bytes..].iter().all(|&b| b == 0xFF));
    }

    #[rstest]
    #[case(0.0, 0)]
    #[case(0.5, 16)]
    #[case(1.0, 31)]
    fn brightness_maps_to_five_bits(#[case] brightness: f64, #[case] expected: u8) {
        assert_eq!(brightness_bits(brightness), expected);
    }

    #[test]
    fn consecutive_commits_do_not_accumulate() {
        let mut sink = Apa102Sink::new(Vec::new(), Apa102Config::default());
        sink.commit(&[cell(1, 1, 1, 1.0)]).unwrap();
        sink.commit(&[cell(2, 2, 2, 1.0)]).unwrap();
        // Two whole transfers, nothing carried over between them.
        assert_eq!(sink.into_inner().len(), 2 * (4 + 4 + 1));
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failure_is_reported() {
        let mut sink = Apa102Sink::new(BrokenPipe, Apa102Config::default());
        assert!(matches!(
            sink.commit(&[DeviceCell::default()]),
            Err(SinkError::Io(_))
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn open_missing_device_fails() {
        let tmp = tempfile::TempDir::new().unwrap();
        let missing = tmp.path().join("spidev9.9");
        assert!(Apa102Sink::open(&missing, Apa102Config::default()).is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn regular_file_cannot_take_bus_settings() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            Apa102Sink::open(file.path(), Apa102Config::default()),
            Err(SinkError::Io(_))
        ));
    }

    #[cfg(target_os = "linux")]
    #[rstest]
    #[case(DEFAULT_BAUD_RATE)]
    #[case(8_000_000)]
    #[case(500_000)]
    fn bus_settings_carry_the_baud_rate(#[case] baud_rate: u32) {
        let config = Apa102Config {
            baud_rate,
            ..Apa102Config::default()
        };
        let options = config.spi_options();
        assert_eq!(options.max_speed_hz, Some(baud_rate));
        assert_eq!(options.bits_per_word, Some(8));
        assert_eq!(options.spi_mode, Some(SpiModeFlags::SPI_MODE_0));
    }
}

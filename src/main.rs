//! Nightlight: play pixel patterns on a serpentine-wired LED grid.
//!
//! ## Architecture
//! - `play`, `clear` and `test-pattern` run the engine on the main thread and
//!   stop on Ctrl+C
//! - `serve` runs the engine on a render thread and an axum server on tokio,
//!   joined by a `std::sync::mpsc` channel
//! - `convert` turns videos and GIFs into `.nl` pattern files
//! - `generate` writes a looping noise pattern
//!
//! ## Usage
//! ```sh
//! nightlight --device spi play media/ocean -b 0.5 -f 30
//! nightlight --device null test-pattern -o walk.nl
//! nightlight generate clouds.nl --levels 4 --colour-map aurora --fit-brightness 0.5
//! nightlight serve media --port 8080
//! ```

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use nightlight::brightness::{MaxBrightness, max_representable_luma};
use nightlight::convert::{self, ConvertOptions};
use nightlight::diagnostic::walk_pattern;
use nightlight::engine::{PlaybackConfig, PlaybackEngine};
use nightlight::error::{PlaybackError, SinkError};
use nightlight::generate::{self, ColourMap, NoiseOptions};
use nightlight::layout::{RowParity, SerpentineLayout};
use nightlight::media;
use nightlight::pacer::{FrameRate, SleepPacer};
use nightlight::pattern::{PatternFormat, write_pattern};
use nightlight::sink::apa102::{Apa102Config, Apa102Sink, ChannelOrder, DEFAULT_BAUD_RATE};
use nightlight::sink::{DeviceSink, NullSink};
use nightlight::{DisplayGeometry, setup_signal_handler};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Play pixel patterns on a serpentine LED grid
#[derive(Parser)]
#[command(name = "nightlight")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    display: DisplayArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone)]
struct DisplayArgs {
    /// Number of LED columns
    #[arg(long, global = true, default_value_t = 30)]
    width: u32,

    /// Number of LED rows
    #[arg(long, global = true, default_value_t = 18)]
    height: u32,

    /// Direction of the even rows on the strip
    #[arg(long, global = true, value_enum, default_value_t = RowParity::EvenRowsLeftToRight)]
    wiring: RowParity,

    /// Where frames are sent
    #[arg(long, global = true, value_enum, default_value_t = Device::Spi)]
    device: Device,

    /// SPI device node the DotStar strip hangs off
    #[arg(long, global = true, default_value = "/dev/spidev0.0")]
    spi_path: PathBuf,

    /// SPI bus speed in Hz
    #[arg(long, global = true, default_value_t = DEFAULT_BAUD_RATE)]
    baud_rate: u32,

    /// Order the colour bytes go out on the wire
    #[arg(long, global = true, value_enum, default_value_t = ChannelOrder::Rgb)]
    channel_order: ChannelOrder,
}

impl DisplayArgs {
    fn geometry(&self) -> Result<DisplayGeometry, PlaybackError> {
        DisplayGeometry::new(self.width, self.height).validated()
    }

    fn layout(&self) -> Result<SerpentineLayout, PlaybackError> {
        Ok(SerpentineLayout::new(self.geometry()?, self.wiring))
    }

    fn open_sink(&self) -> Result<Box<dyn DeviceSink>, SinkError> {
        match self.device {
            #[cfg(target_os = "linux")]
            Device::Spi => {
                let config = Apa102Config {
                    baud_rate: self.baud_rate,
                    channel_order: self.channel_order,
                };
                Ok(Box::new(Apa102Sink::open(&self.spi_path, config)?))
            }
            #[cfg(not(target_os = "linux"))]
            Device::Spi => Err(SinkError::Device("spidev is only available on Linux".to_string())),
            #[cfg(feature = "hardware")]
            Device::Matrix => {
                let layout = self.layout().map_err(|e| SinkError::Device(e.to_string()))?;
                Ok(Box::new(nightlight::sink::matrix::MatrixSink::new(layout)?))
            }
            #[cfg(not(feature = "hardware"))]
            Device::Matrix => Err(SinkError::Device(
                "built without the 'hardware' feature".to_string(),
            )),
            Device::Null => Ok(Box::new(NullSink::new())),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Device {
    /// APA102 strip on an SPI device node
    Spi,
    /// HUB75 panel through rpi-led-matrix
    Matrix,
    /// Discard frames
    Null,
}

#[derive(Args)]
struct PlaybackArgs {
    /// Brightness ceiling in (0, 1]
    #[arg(short = 'b', long, default_value_t = 0.5)]
    max_brightness: f64,

    /// Frames per second
    #[arg(short = 'f', long, default_value_t = 30.0)]
    frame_rate: f64,
}

impl PlaybackArgs {
    fn config(&self, layout: SerpentineLayout) -> Result<PlaybackConfig> {
        let config = PlaybackConfig {
            layout,
            max_brightness: MaxBrightness::new(self.max_brightness)?,
            frame_rate: FrameRate::new(self.frame_rate)?,
        };
        tracing::info!(
            "Display {} ({:?}), max brightness {}, {} fps",
            config.geometry(),
            layout.parity(),
            config.max_brightness.get(),
            config.frame_rate.fps()
        );
        tracing::info!(
            "Brightest representable pixel luma: {:.1}",
            max_representable_luma(config.max_brightness)
        );
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Turn every LED off
    Clear,

    /// Convert videos or GIFs into pattern files
    Convert {
        /// Video, GIF, or a directory of them
        path: PathBuf,

        /// Output directory (defaults to next to each input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Frames per second to extract
        #[arg(long, default_value_t = 30)]
        fps: u32,

        /// ffmpeg scaler
        #[arg(long, default_value = "bicubic")]
        scale_method: String,

        #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
        contrast: f64,

        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        brightness: f64,

        #[arg(long, default_value_t = 1.0)]
        saturation: f64,

        #[arg(long, default_value_t = 1.0)]
        gamma: f64,

        /// Write the human-readable form with one `# Frame N` block per frame
        #[arg(long)]
        pretty: bool,
    },

    /// Write a seamlessly looping noise pattern
    Generate {
        /// Pattern file to write
        output: PathBuf,

        /// Frames in one loop
        #[arg(long, default_value_t = 60)]
        frames: usize,

        /// Noise-space step between LEDs; smaller is smoother
        #[arg(long, default_value_t = 0.1)]
        scale: f64,

        /// Loop radius in noise space; larger moves faster
        #[arg(long, default_value_t = 0.5)]
        radius: f64,

        #[arg(long, default_value_t = 1)]
        octaves: usize,

        #[arg(long, default_value_t = 0)]
        seed: u32,

        /// Flatten into this many colour bands
        #[arg(long)]
        levels: Option<u8>,

        #[arg(long, value_enum, default_value_t = ColourMap::Rainbow)]
        colour_map: ColourMap,

        /// Dim the output so it plays at this brightness ceiling
        #[arg(long)]
        fit_brightness: Option<f64>,

        /// Write the human-readable form
        #[arg(long)]
        pretty: bool,
    },

    /// Play a pattern file or directory until Ctrl+C
    Play {
        path: PathBuf,

        #[command(flatten)]
        playback: PlaybackArgs,
    },

    /// Walk a single dot along the strip in wiring order
    TestPattern {
        #[command(flatten)]
        playback: PlaybackArgs,

        /// Write the pattern to this file instead of playing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Serve the HTTP control API
    Serve {
        /// Root directory containing pattern files
        media_dir: PathBuf,

        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,

        #[command(flatten)]
        playback: PlaybackArgs,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_ansi(false) // Disable ANSI color codes for systemd/journald
        .compact()
        .init();

    let cli = Cli::parse();
    let display = cli.display;

    match cli.command {
        Command::Clear => {
            let config = PlaybackConfig {
                layout: display.layout()?,
                max_brightness: MaxBrightness::default(),
                frame_rate: FrameRate::default(),
            };
            let sink = display.open_sink().context("Failed to open LED device")?;
            let mut engine = PlaybackEngine::new(config, sink, SleepPacer::new());
            engine.clear().context("Failed to clear display")?;
            tracing::info!("Display cleared");
        }

        Command::Convert {
            path,
            output,
            fps,
            scale_method,
            contrast,
            brightness,
            saturation,
            gamma,
            pretty,
        } => {
            let options = ConvertOptions {
                geometry: display.geometry()?,
                fps,
                scale_method,
                contrast,
                brightness,
                saturation,
                gamma,
                format: if pretty {
                    PatternFormat::Pretty
                } else {
                    PatternFormat::Machine
                },
                ..ConvertOptions::default()
            };
            let written = convert::convert(&path, output.as_deref(), &options)
                .with_context(|| format!("Failed to convert {}", path.display()))?;
            tracing::info!("Converted {} file(s)", written.len());
        }

        Command::Generate {
            output,
            frames,
            scale,
            radius,
            octaves,
            seed,
            levels,
            colour_map,
            fit_brightness,
            pretty,
        } => {
            let options = NoiseOptions {
                geometry: display.geometry()?,
                frames,
                scale,
                radius,
                octaves,
                seed,
                levels,
                colour_map,
                fit_brightness: fit_brightness.map(MaxBrightness::new).transpose()?,
            };
            let pattern = generate::noise_pattern(&options).context("Failed to generate pattern")?;
            let format = if pretty {
                PatternFormat::Pretty
            } else {
                PatternFormat::Machine
            };
            write_pattern(&pattern, &output, format)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            tracing::info!("Wrote {} ({} frames)", output.display(), pattern.len());
        }

        Command::Play { path, playback } => {
            let config = playback.config(display.layout()?)?;
            let loaded = media::load_patterns(&path)
                .with_context(|| format!("Failed to load patterns from {}", path.display()))?;
            let patterns = media::retain_geometry(loaded, config.geometry());
            if patterns.is_empty() {
                bail!("No pattern at {} is sized {}", path.display(), config.geometry());
            }

            let cancel = setup_signal_handler().context("Failed to install Ctrl+C handler")?;
            let sink = display.open_sink().context("Failed to open LED device")?;
            let mut engine = PlaybackEngine::new(config, sink, SleepPacer::new());
            engine.start(&patterns, &cancel).context("Playback failed")?;
            engine.clear().context("Failed to clear display")?;
        }

        Command::TestPattern { playback, output } => {
            let config = playback.config(display.layout()?)?;
            let pattern = walk_pattern(&config.layout, None, config.max_brightness)
                .context("Failed to build test pattern")?;

            if let Some(output) = output {
                write_pattern(&pattern, &output, PatternFormat::Machine)
                    .with_context(|| format!("Failed to write {}", output.display()))?;
                tracing::info!("Wrote {} ({} frames)", output.display(), pattern.len());
                return Ok(());
            }

            let cancel = setup_signal_handler().context("Failed to install Ctrl+C handler")?;
            let sink = display.open_sink().context("Failed to open LED device")?;
            let mut engine = PlaybackEngine::new(config, sink, SleepPacer::new());
            engine.start(&[pattern], &cancel).context("Playback failed")?;
            engine.clear().context("Failed to clear display")?;
        }

        Command::Serve {
            media_dir,
            port,
            playback,
        } => {
            let config = playback.config(display.layout()?)?;
            serve(display, config, media_dir, port)?;
        }
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn serve(display: DisplayArgs, config: PlaybackConfig, media_dir: PathBuf, port: u16) -> Result<()> {
    use nightlight::render::{DisplayStatus, render_loop};
    use nightlight::server::{self, AppState};
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};

    let media_dir = media_dir.canonicalize().unwrap_or_else(|_| {
        tracing::warn!("Could not canonicalize media dir, using as-is");
        media_dir.clone()
    });

    tracing::info!("Nightlight HTTP Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Media dir: {}", media_dir.display());
    tracing::info!("Port: {}", port);

    // Create the channel for sending commands to the render thread.
    let (tx, rx) = mpsc::channel();

    // Shared display status: render thread writes, HTTP handlers read.
    let status = Arc::new(Mutex::new(DisplayStatus::new(&config)));

    // The sink is opened on the render thread; some devices can't cross threads.
    // Detached: it exits on its own once every command sender is dropped.
    let render_status = status.clone();
    std::thread::Builder::new()
        .name("render".to_string())
        .spawn(move || render_loop(rx, render_status, config, move || display.open_sink()))
        .context("Failed to spawn render thread")?;

    let app_state = AppState {
        command_tx: tx,
        status,
        media_dir,
        defaults: config,
    };

    let app = server::create_router(app_state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("API Documentation: http://localhost:{}/docs", port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    // Blocks until the process is killed
    axum::serve(listener, app).await.context("Server error")
}

//! # Wiring Walk Example
//!
//! Plays the diagnostic walk pattern on a small grid without any hardware,
//! printing which strip index lights up on every frame. On a real board the
//! same pattern shows a single dot snaking along the strip.
//!
//! ## Run it
//! ```sh
//! cargo run --example walk -- --width 4 --height 3
//! cargo run --example walk -- --width 4 --height 3 --wiring even-right-to-left
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use nightlight::brightness::MaxBrightness;
use nightlight::diagnostic::walk_pattern;
use nightlight::engine::{PlaybackConfig, PlaybackEngine};
use nightlight::layout::{RowParity, SerpentineLayout};
use nightlight::pacer::{FrameRate, SleepPacer};
use nightlight::sink::RecordingSink;
use nightlight::{DisplayGeometry, Pixel, setup_signal_handler};

#[derive(Parser)]
#[command(name = "walk")]
#[command(about = "Walk one dot along a simulated strip")]
struct Args {
    #[arg(long, default_value_t = 4)]
    width: u32,
    #[arg(long, default_value_t = 3)]
    height: u32,
    #[arg(long, value_enum, default_value_t = RowParity::EvenRowsLeftToRight)]
    wiring: RowParity,
    /// Frames per second
    #[arg(short, long, default_value_t = 4.0)]
    fps: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).compact().init();

    let args = Args::parse();
    let layout = SerpentineLayout::new(DisplayGeometry::new(args.width, args.height), args.wiring);
    let config = PlaybackConfig {
        layout,
        max_brightness: MaxBrightness::new(1.0)?,
        frame_rate: FrameRate::new(args.fps)?,
    };

    let pattern = walk_pattern(&layout, Some(Pixel::new(60, 60, 60)), config.max_brightness)?;
    let frames = pattern.len();
    let cancel = setup_signal_handler().context("Failed to install Ctrl+C handler")?;

    let mut engine = PlaybackEngine::new(config, RecordingSink::new(), SleepPacer::new());
    let mut seen = 0;
    engine.start_observed(&[pattern], &cancel, |_| {
        seen += 1;
        if seen >= frames {
            cancel.cancel();
        }
    })?;

    // The first commit is the blank before the pattern.
    for (frame, cells) in engine.sink().frames().iter().skip(1).enumerate() {
        if let Some(index) = cells.iter().position(|c| c.pixel() != Pixel::BLACK) {
            let (x, y) = layout.unmap(index as u32)?;
            println!("frame {frame:>3}: LED {index:>3} at ({x}, {y})");
        }
    }

    Ok(())
}

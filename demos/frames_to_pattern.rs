//! # Frames to Pattern Example
//!
//! Turns a directory of numbered frame images (as produced by
//! `ffmpeg -i clip.mp4 frames/%06d.png`) into a `.nl` pattern file.
//!
//! ## Run it
//! ```sh
//! cargo run --example frames_to_pattern -- frames/ clip.nl --pretty
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use nightlight::DisplayGeometry;
use nightlight::convert::pattern_from_frame_dir;
use nightlight::pattern::{PatternFormat, write_pattern};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "frames_to_pattern")]
#[command(about = "Build a pattern file from a directory of frame images")]
struct Args {
    /// Directory containing .png/.jpg frames
    frames_dir: PathBuf,
    /// Pattern file to write
    output: PathBuf,
    #[arg(long, default_value_t = 30)]
    width: u32,
    #[arg(long, default_value_t = 18)]
    height: u32,
    /// Write one `# Frame N` block per frame
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).compact().init();

    let args = Args::parse();
    let geometry = DisplayGeometry::new(args.width, args.height);
    let pattern = pattern_from_frame_dir(&args.frames_dir, geometry)
        .with_context(|| format!("Failed to read frames from {}", args.frames_dir.display()))?;

    let format = if args.pretty {
        PatternFormat::Pretty
    } else {
        PatternFormat::Machine
    };
    write_pattern(&pattern, &args.output, format)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    println!("{} frames at {} -> {}", pattern.len(), geometry, args.output.display());
    Ok(())
}

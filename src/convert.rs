//! Turn images, GIFs and videos into patterns.
//!
//! Everything produced here is in logical order: rows top-to-bottom, pixels
//! left-to-right, exactly as the source image. The serpentine fold happens at
//! playback time and never here.
//!
//! Videos go through `ffmpeg` (which must be on `PATH`, or passed explicitly)
//! in two steps: scale and colour-adjust into a small video, then dump that
//! video to numbered PNG frames. The frames are then read back with `image`.

use crate::pattern::{Frame, Pattern, PatternError, PatternFormat, write_pattern};
use crate::{DisplayGeometry, Pixel};
use image::codecs::gif::GifDecoder;
use image::imageops::FilterType;
use image::{AnimationDecoder, DynamicImage, ImageReader, RgbImage};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Frame image extensions picked up from a frames directory.
pub const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Video container extensions handed to ffmpeg.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "mkv", "avi", "webm", "mpg", "mpeg"];

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("no image frames found in {0}")]
    NoFrames(PathBuf),
    #[error("nothing to convert at {0}")]
    NoInputs(PathBuf),
    #[error("could not run {program}: {source}")]
    FfmpegMissing {
        program: String,
        source: io::Error,
    },
    #[error("ffmpeg exited with {status}: {stderr}")]
    Ffmpeg { status: String, stderr: String },
}

// ── Images ─────────────────────────────────────────────────────────

/// Copy an RGB image into a frame, pixel for pixel.
pub fn frame_from_image(img: &RgbImage) -> Result<Frame, PatternError> {
    let rows = img
        .rows()
        .map(|row| row.map(|p| Pixel::new(p[0], p[1], p[2])).collect())
        .collect();
    Frame::from_rows(rows)
}

/// Resize to the display size unless it already matches.
fn fit(img: DynamicImage, geometry: DisplayGeometry) -> RgbImage {
    if img.width() == geometry.width && img.height() == geometry.height {
        img.to_rgb8()
    } else {
        img.resize_exact(geometry.width, geometry.height, FilterType::Lanczos3)
            .to_rgb8()
    }
}

/// Discover and sort all frame image files in a directory.
pub fn load_frame_paths(dir: &Path) -> Result<Vec<PathBuf>, ConvertError> {
    let mut paths = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if has_extension(&path, FRAME_EXTENSIONS) {
            paths.push(path);
        }
    }

    paths.sort();

    if paths.is_empty() {
        return Err(ConvertError::NoFrames(dir.to_path_buf()));
    }

    Ok(paths)
}

/// Build a pattern from a directory of frame images, in filename order.
pub fn pattern_from_frame_dir(
    dir: &Path,
    geometry: DisplayGeometry,
) -> Result<Pattern, ConvertError> {
    let paths = load_frame_paths(dir)?;
    let mut frames = Vec::with_capacity(paths.len());

    for path in &paths {
        let img = ImageReader::open(path)?.decode()?;
        frames.push(frame_from_image(&fit(img, geometry))?);
    }

    tracing::info!("Read {} frames from {}", frames.len(), dir.display());
    Ok(Pattern::new(frames)?)
}

/// Build a pattern from every frame of an animated GIF.
pub fn pattern_from_gif(path: &Path, geometry: DisplayGeometry) -> Result<Pattern, ConvertError> {
    let decoder = GifDecoder::new(BufReader::new(File::open(path)?))?;
    let mut frames = Vec::new();

    for frame in decoder.into_frames() {
        let rgba = frame?.into_buffer();
        frames.push(frame_from_image(&fit(DynamicImage::ImageRgba8(rgba), geometry))?);
    }

    if frames.is_empty() {
        return Err(ConvertError::NoFrames(path.to_path_buf()));
    }

    tracing::info!("Read {} frames from {}", frames.len(), path.display());
    Ok(Pattern::new(frames)?)
}

// ── Videos ─────────────────────────────────────────────────────────

/// Conversion settings. Colour adjustments map straight onto ffmpeg's `eq`
/// filter.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvertOptions {
    pub geometry: DisplayGeometry,
    pub fps: u32,
    /// ffmpeg scaler: `bicubic`, `neighbor`, `gauss`, …
    pub scale_method: String,
    /// -1000.0 to 1000.0
    pub contrast: f64,
    /// -1.0 to 1.0
    pub brightness: f64,
    /// 0.0 to 3.0
    pub saturation: f64,
    /// 0.1 to 10.0
    pub gamma: f64,
    pub format: PatternFormat,
    pub ffmpeg: PathBuf,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            geometry: DisplayGeometry::default(),
            fps: 30,
            scale_method: "bicubic".to_string(),
            contrast: 1.0,
            brightness: 0.0,
            saturation: 1.0,
            gamma: 1.0,
            format: PatternFormat::Machine,
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

impl ConvertOptions {
    fn scale_filter(&self) -> String {
        format!(
            "scale={}:{}:flags={},eq=contrast={}:brightness={}:saturation={}:gamma={}",
            self.geometry.width,
            self.geometry.height,
            self.scale_method,
            self.contrast,
            self.brightness,
            self.saturation,
            self.gamma
        )
    }

    fn scale_args(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            input.display().to_string(),
            "-vf".to_string(),
            self.scale_filter(),
            output.display().to_string(),
        ]
    }

    fn extract_args(&self, input: &Path, frames_dir: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            input.display().to_string(),
            "-vf".to_string(),
            format!("fps={}", self.fps),
            // Zero-padded so filename order is frame order.
            frames_dir.join("%06d.png").display().to_string(),
        ]
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.contains(&e.to_ascii_lowercase().as_str()))
}

fn is_gif(path: &Path) -> bool {
    has_extension(path, &["gif"])
}

fn run_ffmpeg(options: &ConvertOptions, args: &[String]) -> Result<(), ConvertError> {
    tracing::debug!("{} {}", options.ffmpeg.display(), args.join(" "));
    let output = Command::new(&options.ffmpeg)
        .args(args)
        .output()
        .map_err(|source| ConvertError::FfmpegMissing {
            program: options.ffmpeg.display().to_string(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        return Err(ConvertError::Ffmpeg {
            status: output.status.to_string(),
            stderr: tail.into_iter().rev().collect::<Vec<_>>().join("\n"),
        });
    }
    Ok(())
}

/// Inputs named by `path`: the file itself, or every video/GIF directly in
/// the directory.
pub fn conversion_inputs(path: &Path) -> Result<Vec<PathBuf>, ConvertError> {
    let convertible = |p: &Path| p.is_file() && (is_gif(p) || has_extension(p, VIDEO_EXTENSIONS));

    let mut inputs = if path.is_dir() {
        fs::read_dir(path)?
            .flatten()
            .map(|e| e.path())
            .filter(|p| convertible(p))
            .collect()
    } else if convertible(path) {
        vec![path.to_path_buf()]
    } else {
        Vec::new()
    };
    inputs.sort();

    if inputs.is_empty() {
        return Err(ConvertError::NoInputs(path.to_path_buf()));
    }
    Ok(inputs)
}

/// Convert one video or GIF into `<outdir>/<stem>/<stem>.nl`.
///
/// Returns the written pattern file path.
pub fn convert_one(
    input: &Path,
    outdir: &Path,
    options: &ConvertOptions,
) -> Result<PathBuf, ConvertError> {
    let stem = input
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned();
    let work_dir = outdir.join(&stem);
    fs::create_dir_all(&work_dir)?;

    let pattern = if is_gif(input) {
        pattern_from_gif(input, options.geometry)?
    } else {
        let extension = input
            .extension()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();
        let scaled = work_dir.join(format!("{stem}_({}).{extension}", options.geometry));
        run_ffmpeg(options, &options.scale_args(input, &scaled))?;

        let frames_dir = work_dir.join("frames");
        fs::create_dir_all(&frames_dir)?;
        run_ffmpeg(options, &options.extract_args(&scaled, &frames_dir))?;

        pattern_from_frame_dir(&frames_dir, options.geometry)?
    };

    let out = work_dir.join(format!("{stem}.{}", crate::media::PATTERN_EXTENSION));
    write_pattern(&pattern, &out, options.format)?;
    tracing::info!("Wrote {} ({} frames)", out.display(), pattern.len());
    Ok(out)
}

/// Convert everything at `path`. Output goes under `outdir`, or next to each
/// input when `outdir` is `None`.
pub fn convert(
    path: &Path,
    outdir: Option<&Path>,
    options: &ConvertOptions,
) -> Result<Vec<PathBuf>, ConvertError> {
    let inputs = conversion_inputs(path)?;
    let mut written = Vec::with_capacity(inputs.len());

    for input in &inputs {
        let target = match outdir {
            Some(dir) => dir.to_path_buf(),
            None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        written.push(convert_one(input, &target, options)?);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::read_pattern;
    use image::codecs::gif::GifEncoder;
    use image::{Delay, Rgb, Rgba, RgbaImage};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn gradient(width: u32, height: u32, seed: u8) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([seed, (x * 10) as u8, (y * 10) as u8])
        })
    }

    fn write_gif(path: &Path, frames: &[RgbaImage]) {
        let mut encoder = GifEncoder::new(File::create(path).unwrap());
        let frames = frames
            .iter()
            .cloned()
            .map(|buf| image::Frame::from_parts(buf, 0, 0, Delay::from_numer_denom_ms(100, 1)));
        encoder.encode_frames(frames).unwrap();
    }

    #[test]
    fn image_becomes_logical_row_major_frame() {
        let frame = frame_from_image(&gradient(3, 2, 7)).unwrap();
        assert_eq!(frame.geometry(), DisplayGeometry::new(3, 2));
        assert_eq!(frame.get(2, 0), Some(Pixel::new(7, 20, 0)));
        assert_eq!(frame.get(0, 1), Some(Pixel::new(7, 0, 10)));
    }

    #[test]
    fn frame_dir_is_read_in_filename_order() {
        let tmp = TempDir::new().unwrap();
        gradient(3, 2, 2).save(tmp.path().join("000002.png")).unwrap();
        gradient(3, 2, 1).save(tmp.path().join("000001.png")).unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "skip me").unwrap();

        let pattern = pattern_from_frame_dir(tmp.path(), DisplayGeometry::new(3, 2)).unwrap();
        assert_eq!(pattern.len(), 2);
        assert_eq!(pattern.frames()[0].get(0, 0).unwrap().r, 1);
        assert_eq!(pattern.frames()[1].get(0, 0).unwrap().r, 2);
    }

    #[test]
    fn frames_are_resized_to_the_display() {
        let tmp = TempDir::new().unwrap();
        gradient(60, 36, 0).save(tmp.path().join("1.png")).unwrap();

        let pattern = pattern_from_frame_dir(tmp.path(), DisplayGeometry::new(30, 18)).unwrap();
        assert_eq!(pattern.geometry(), DisplayGeometry::new(30, 18));
    }

    #[test]
    fn empty_frame_dir_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            pattern_from_frame_dir(tmp.path(), DisplayGeometry::new(1, 1)),
            Err(ConvertError::NoFrames(_))
        ));
    }

    #[test]
    fn gif_frames_become_pattern_frames() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blink.gif");
        let red = RgbaImage::from_pixel(4, 2, Rgba([255, 0, 0, 255]));
        let blue = RgbaImage::from_pixel(4, 2, Rgba([0, 0, 255, 255]));
        write_gif(&path, &[red, blue]);

        let pattern = pattern_from_gif(&path, DisplayGeometry::new(4, 2)).unwrap();
        assert_eq!(pattern.len(), 2);
        let first = pattern.frames()[0].get(1, 1).unwrap();
        let second = pattern.frames()[1].get(1, 1).unwrap();
        assert!(first.r > 200 && first.b < 50, "{first:?}");
        assert!(second.b > 200 && second.r < 50, "{second:?}");
    }

    #[test]
    fn gif_converts_without_ffmpeg() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("dot.gif");
        write_gif(&path, &[RgbaImage::from_pixel(2, 2, Rgba([0, 255, 0, 255]))]);

        let options = ConvertOptions {
            geometry: DisplayGeometry::new(2, 2),
            ffmpeg: tmp.path().join("no-ffmpeg-here"),
            ..ConvertOptions::default()
        };
        let written = convert(&path, None, &options).unwrap();

        assert_eq!(written, vec![tmp.path().join("dot").join("dot.nl")]);
        let pattern = read_pattern(&written[0]).unwrap();
        assert_eq!(pattern.geometry(), DisplayGeometry::new(2, 2));
    }

    #[test]
    fn missing_ffmpeg_is_reported() {
        let tmp = TempDir::new().unwrap();
        let video = tmp.path().join("clip.mp4");
        std::fs::write(&video, b"not really a video").unwrap();

        let options = ConvertOptions {
            ffmpeg: tmp.path().join("no-ffmpeg-here"),
            ..ConvertOptions::default()
        };
        assert!(matches!(
            convert(&video, Some(tmp.path()), &options),
            Err(ConvertError::FfmpegMissing { .. })
        ));
    }

    #[test]
    fn inputs_are_filtered_by_extension() {
        let tmp = TempDir::new().unwrap();
        for name in ["b.mp4", "a.GIF", "readme.md", "c.mov"] {
            std::fs::write(tmp.path().join(name), b"x").unwrap();
        }
        let names: Vec<String> = conversion_inputs(tmp.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.GIF", "b.mp4", "c.mov"]);
    }

    #[test]
    fn unknown_single_file_is_no_input() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.txt");
        std::fs::write(&path, b"x").unwrap();
        assert!(matches!(conversion_inputs(&path), Err(ConvertError::NoInputs(_))));
    }

    #[test]
    fn ffmpeg_arguments() {
        let options = ConvertOptions {
            geometry: DisplayGeometry::new(30, 18),
            fps: 25,
            scale_method: "neighbor".to_string(),
            contrast: 1.5,
            brightness: -0.1,
            saturation: 2.0,
            gamma: 0.8,
            ..ConvertOptions::default()
        };
        assert_eq!(
            options.scale_args(Path::new("in.mp4"), Path::new("out.mp4")),
            vec![
                "-y",
                "-i",
                "in.mp4",
                "-vf",
                "scale=30:18:flags=neighbor,eq=contrast=1.5:brightness=-0.1:saturation=2:gamma=0.8",
                "out.mp4",
            ]
        );
        assert_eq!(
            options.extract_args(Path::new("out.mp4"), Path::new("frames")),
            vec!["-y", "-i", "out.mp4", "-vf", "fps=25", "frames/%06d.png"]
        );
    }
}

//! Procedural patterns from looping 4-D noise.
//!
//! Each LED samples `noise(x * scale, y * scale, r cos θ, r sin θ)` where θ
//! goes once round the circle over the animation. The last frame is one step
//! away from the first, so the pattern loops without a visible seam. Samples
//! are normalised over the whole animation, optionally quantised into flat
//! bands, then coloured.

use crate::brightness::{MaxBrightness, within_ceiling};
use crate::error::PlaybackError;
use crate::pattern::{Frame, Pattern, PatternError};
use crate::{DisplayGeometry, Pixel};
use noise::{Fbm, MultiFractal, NoiseFn, OpenSimplex};
use std::f64::consts::TAU;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Geometry(#[from] PlaybackError),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("a generated pattern needs at least one frame")]
    NoFrames,
    #[error("octaves must be between 1 and {max}, got {0}", max = MAX_OCTAVES)]
    InvalidOctaves(usize),
    #[error("quantize levels must be at least 2, got {0}")]
    TooFewLevels(u8),
    #[error("{name} must be a positive number, got {value}")]
    InvalidScale { name: &'static str, value: f64 },
}

/// Upper bound on fractal octaves; finer detail than this is below one LED.
pub const MAX_OCTAVES: usize = 8;

/// How a normalised noise value in `[0, 1]` becomes a colour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ColourMap {
    /// Black to white
    Grey,
    /// Red through yellow, green, cyan and blue to magenta
    #[default]
    Rainbow,
    /// Deep blue, teal, green, cyan, violet, pink
    Aurora,
}

const AURORA: [Pixel; 6] = [
    Pixel::new(0, 20, 80),
    Pixel::new(0, 95, 120),
    Pixel::new(20, 170, 95),
    Pixel::new(0, 160, 200),
    Pixel::new(110, 30, 170),
    Pixel::new(200, 50, 170),
];

impl ColourMap {
    pub fn apply(self, value: f64) -> Pixel {
        let value = value.clamp(0.0, 1.0);
        match self {
            Self::Grey => {
                let level = (value * 255.0).round() as u8;
                Pixel::new(level, level, level)
            }
            Self::Rainbow => Pixel::from_hue((value * 300.0).round() as u16),
            Self::Aurora => sample_palette(&AURORA, value),
        }
    }
}

fn sample_palette(palette: &[Pixel], value: f64) -> Pixel {
    let segments = palette.len().saturating_sub(1);
    if segments == 0 {
        return palette.first().copied().unwrap_or(Pixel::BLACK);
    }
    let position = value * segments as f64;
    let segment = (position.floor() as usize).min(segments - 1);
    let t = position - segment as f64;
    let (from, to) = (palette[segment], palette[segment + 1]);
    let mix = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as u8;
    Pixel::new(mix(from.r, to.r), mix(from.g, to.g), mix(from.b, to.b))
}

/// Settings for [`noise_pattern`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoiseOptions {
    pub geometry: DisplayGeometry,
    /// Frames in one loop
    pub frames: usize,
    /// Noise-space distance between neighbouring LEDs; smaller is smoother
    pub scale: f64,
    /// Radius of the loop in noise space; larger changes faster
    pub radius: f64,
    pub octaves: usize,
    pub seed: u32,
    /// Flatten into this many bands before colouring
    pub levels: Option<u8>,
    pub colour_map: ColourMap,
    /// Dim every pixel so the pattern plays at this ceiling
    pub fit_brightness: Option<MaxBrightness>,
}

impl Default for NoiseOptions {
    fn default() -> Self {
        Self {
            geometry: DisplayGeometry::default(),
            frames: 60,
            scale: 0.1,
            radius: 0.5,
            octaves: 1,
            seed: 0,
            levels: None,
            colour_map: ColourMap::default(),
            fit_brightness: None,
        }
    }
}

impl NoiseOptions {
    fn validate(&self) -> Result<(), GenerateError> {
        self.geometry.validated()?;
        if self.frames == 0 {
            return Err(GenerateError::NoFrames);
        }
        if !(1..=MAX_OCTAVES).contains(&self.octaves) {
            return Err(GenerateError::InvalidOctaves(self.octaves));
        }
        if let Some(levels) = self.levels {
            if levels < 2 {
                return Err(GenerateError::TooFewLevels(levels));
            }
        }
        for (name, value) in [("scale", self.scale), ("radius", self.radius)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(GenerateError::InvalidScale { name, value });
            }
        }
        Ok(())
    }
}

/// Raw noise for one frame, row-major.
fn sample_frame(noise: &impl NoiseFn<f64, 4>, options: &NoiseOptions, index: usize) -> Vec<f64> {
    let angle = TAU * index as f64 / options.frames as f64;
    let (z, w) = (options.radius * angle.cos(), options.radius * angle.sin());
    let DisplayGeometry { width, height } = options.geometry;

    (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .map(|(x, y)| {
            noise.get([
                f64::from(x) * options.scale,
                f64::from(y) * options.scale,
                z,
                w,
            ])
        })
        .collect()
}

fn quantize(value: f64, levels: u8) -> f64 {
    let top = f64::from(levels - 1);
    (value * f64::from(levels)).floor().min(top) / top
}

/// Build a seamlessly looping noise pattern.
pub fn noise_pattern(options: &NoiseOptions) -> Result<Pattern, GenerateError> {
    options.validate()?;

    let noise = Fbm::<OpenSimplex>::new(options.seed).set_octaves(options.octaves);
    let raw: Vec<Vec<f64>> = (0..options.frames)
        .map(|index| sample_frame(&noise, options, index))
        .collect();

    let (low, high) = raw
        .iter()
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = high - low;

    let width = options.geometry.width as usize;
    let frames = raw
        .into_iter()
        .map(|samples| {
            let pixels: Vec<Pixel> = samples
                .into_iter()
                .map(|v| {
                    let mut value = if range > f64::EPSILON { (v - low) / range } else { 0.0 };
                    if let Some(levels) = options.levels {
                        value = quantize(value, levels);
                    }
                    let pixel = options.colour_map.apply(value);
                    match options.fit_brightness {
                        Some(ceiling) => within_ceiling(pixel, ceiling),
                        None => pixel,
                    }
                })
                .collect();
            Frame::from_rows(pixels.chunks(width).map(<[Pixel]>::to_vec).collect())
        })
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(
        "Generated {} noise frames at {} (seed {})",
        frames.len(),
        options.geometry,
        options.seed
    );
    Ok(Pattern::new(frames)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brightness::{brightness, luma};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::collections::BTreeSet;

    fn grey(frames: usize) -> NoiseOptions {
        NoiseOptions {
            geometry: DisplayGeometry::new(12, 8),
            frames,
            colour_map: ColourMap::Grey,
            ..NoiseOptions::default()
        }
    }

    fn mean_difference(a: &Frame, b: &Frame) -> f64 {
        let total: u32 = a
            .enumerate_pixels()
            .zip(b.enumerate_pixels())
            .map(|((_, _, p), (_, _, q))| u32::from(p.r.abs_diff(q.r)))
            .sum();
        f64::from(total) / f64::from(a.geometry().pixel_count())
    }

    #[test]
    fn frames_match_geometry_and_count() {
        let pattern = noise_pattern(&grey(24)).unwrap();
        assert_eq!(pattern.len(), 24);
        assert_eq!(pattern.geometry(), DisplayGeometry::new(12, 8));
    }

    #[test]
    fn default_size_fills_the_display() {
        let options = NoiseOptions {
            frames: 4,
            ..NoiseOptions::default()
        };
        let pattern = noise_pattern(&options).unwrap();
        assert_eq!(pattern.geometry(), DisplayGeometry::new(30, 18));
    }

    #[test]
    fn one_lap_of_the_circle_returns_to_the_first_frame() {
        let options = grey(30);
        let noise = Fbm::<OpenSimplex>::new(options.seed).set_octaves(options.octaves);
        let first = sample_frame(&noise, &options, 0);
        let wrapped = sample_frame(&noise, &options, options.frames);
        for (a, b) in first.iter().zip(&wrapped) {
            assert!((a - b).abs() < 1e-9, "{a} vs {b}");
        }
    }

    #[test]
    fn last_frame_flows_into_the_first() {
        let pattern = noise_pattern(&grey(30)).unwrap();
        let frames = pattern.frames();
        let steps: Vec<f64> = frames
            .windows(2)
            .map(|pair| mean_difference(&pair[0], &pair[1]))
            .collect();
        let largest_step = steps.iter().copied().fold(0.0, f64::max);
        let seam = mean_difference(&frames[frames.len() - 1], &frames[0]);
        let across = mean_difference(&frames[0], &frames[frames.len() / 2]);

        assert!(seam <= largest_step * 2.0, "seam {seam}, largest step {largest_step}");
        assert!(seam < across, "seam {seam}, half a loop {across}");
    }

    #[test]
    fn output_spans_the_full_range() {
        let pattern = noise_pattern(&grey(10)).unwrap();
        let levels: BTreeSet<u8> = pattern
            .frames()
            .iter()
            .flat_map(|f| f.enumerate_pixels().map(|(_, _, p)| p.r))
            .collect();
        assert_eq!(levels.first(), Some(&0));
        assert_eq!(levels.last(), Some(&255));
    }

    #[test]
    fn same_seed_same_pattern() {
        let a = noise_pattern(&grey(6)).unwrap();
        let b = noise_pattern(&grey(6)).unwrap();
        let c = noise_pattern(&NoiseOptions { seed: 7, ..grey(6) }).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[rstest]
    #[case(2)]
    #[case(3)]
    #[case(5)]
    fn quantize_flattens_into_bands(#[case] levels: u8) {
        let options = NoiseOptions {
            levels: Some(levels),
            ..grey(10)
        };
        let pattern = noise_pattern(&options).unwrap();
        let seen: BTreeSet<u8> = pattern
            .frames()
            .iter()
            .flat_map(|f| f.enumerate_pixels().map(|(_, _, p)| p.r))
            .collect();
        assert!(seen.len() <= usize::from(levels), "{seen:?}");
        assert!(seen.contains(&0) && seen.contains(&255), "{seen:?}");
    }

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(0.49, 0.0)]
    #[case(0.5, 1.0)]
    #[case(1.0, 1.0)]
    fn two_levels_split_at_the_middle(#[case] value: f64, #[case] expected: f64) {
        assert_eq!(quantize(value, 2), expected);
    }

    #[rstest]
    #[case(ColourMap::Grey, 0.0, Pixel::BLACK)]
    #[case(ColourMap::Grey, 1.0, Pixel::new(255, 255, 255))]
    #[case(ColourMap::Rainbow, 0.0, Pixel::new(255, 0, 0))]
    #[case(ColourMap::Rainbow, 1.0, Pixel::new(255, 0, 255))]
    #[case(ColourMap::Aurora, 0.0, Pixel::new(0, 20, 80))]
    #[case(ColourMap::Aurora, 1.0, Pixel::new(200, 50, 170))]
    fn colour_map_ends(#[case] map: ColourMap, #[case] value: f64, #[case] expected: Pixel) {
        assert_eq!(map.apply(value), expected);
    }

    #[test]
    fn aurora_blends_between_stops() {
        // Halfway between deep blue and teal.
        assert_eq!(ColourMap::Aurora.apply(0.1), Pixel::new(0, 58, 100));
    }

    #[test]
    fn fit_brightness_keeps_every_pixel_playable() {
        let ceiling = MaxBrightness::new(0.5).unwrap();
        let options = NoiseOptions {
            frames: 8,
            colour_map: ColourMap::Rainbow,
            fit_brightness: Some(ceiling),
            ..NoiseOptions::default()
        };
        let pattern = noise_pattern(&options).unwrap();
        for frame in pattern.frames() {
            for (_, _, pixel) in frame.enumerate_pixels() {
                assert!(brightness(pixel, ceiling) <= 1.0, "luma {}", luma(pixel));
            }
        }
    }

    #[rstest]
    #[case(NoiseOptions { frames: 0, ..NoiseOptions::default() })]
    #[case(NoiseOptions { octaves: 0, ..NoiseOptions::default() })]
    #[case(NoiseOptions { octaves: 9, ..NoiseOptions::default() })]
    #[case(NoiseOptions { levels: Some(1), ..NoiseOptions::default() })]
    #[case(NoiseOptions { scale: 0.0, ..NoiseOptions::default() })]
    #[case(NoiseOptions { radius: f64::NAN, ..NoiseOptions::default() })]
    #[case(NoiseOptions { geometry: DisplayGeometry::new(0, 4), ..NoiseOptions::default() })]
    fn bad_options_are_rejected(#[case] options: NoiseOptions) {
        assert!(noise_pattern(&options).is_err());
    }
}

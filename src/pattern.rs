//! Frames, patterns, and the `.nl` pattern file format.
//!
//! A pattern file holds every frame of one animation loop, frames made of
//! rows, rows made of `[r, g, b]` triples, all in logical (top-to-bottom,
//! left-to-right) order. Two encodings exist:
//!
//! ```text
//! machine:  [[[[255,0,0],[0,255,0]],[[0,0,255],[9,9,9]]], …]
//!
//! pretty:   # Frame 1
//!           [[255,0,0],[0,255,0]]
//!           [[0,0,255],[9,9,9]]
//!           # Frame 2
//!           …
//! ```
//!
//! [`read_pattern`] accepts either; the writers produce one or the other.
//! In the pretty form only `# Frame` lines (any number after them) start a
//! frame; other `#` lines are comments.

use crate::{DisplayGeometry, Pixel};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("frame has no rows")]
    EmptyFrame,
    #[error("row {row} has {actual} pixels, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("pattern has no frames")]
    NoFrames,
    #[error("frame {frame} is {actual}, expected {expected}")]
    MismatchedFrame {
        frame: usize,
        expected: DisplayGeometry,
        actual: DisplayGeometry,
    },
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("invalid pattern JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

// ── Frame ──────────────────────────────────────────────────────────

/// One still image, stored row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<Pixel>,
}

impl Frame {
    /// Build from rows, checking every row has the same length.
    pub fn from_rows(rows: Vec<Vec<Pixel>>) -> Result<Self, PatternError> {
        let expected = match rows.first() {
            Some(row) if !row.is_empty() => row.len(),
            _ => return Err(PatternError::EmptyFrame),
        };

        let mut pixels = Vec::with_capacity(expected * rows.len());
        for (row, values) in rows.iter().enumerate() {
            if values.len() != expected {
                return Err(PatternError::RaggedRow {
                    row,
                    expected,
                    actual: values.len(),
                });
            }
            pixels.extend_from_slice(values);
        }

        Ok(Self {
            width: expected as u32,
            height: rows.len() as u32,
            pixels,
        })
    }

    /// A frame filled with one colour.
    pub fn solid(geometry: DisplayGeometry, pixel: Pixel) -> Self {
        Self {
            width: geometry.width,
            height: geometry.height,
            pixels: vec![pixel; geometry.pixel_count() as usize],
        }
    }

    pub fn geometry(&self) -> DisplayGeometry {
        DisplayGeometry::new(self.width, self.height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> Option<Pixel> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get((y * self.width + x) as usize).copied()
    }

    /// Overwrite one pixel; returns `false` if `(x, y)` is outside the frame.
    pub fn put(&mut self, x: u32, y: u32, pixel: Pixel) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.pixels[(y * self.width + x) as usize] = pixel;
        true
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Pixel]> {
        self.pixels.chunks(self.width as usize)
    }

    /// Every pixel with its logical coordinate, row by row.
    pub fn enumerate_pixels(&self) -> impl Iterator<Item = (u32, u32, Pixel)> + '_ {
        let width = self.width;
        self.pixels
            .iter()
            .enumerate()
            .map(move |(i, &p)| (i as u32 % width, i as u32 / width, p))
    }
}

// ── Pattern ────────────────────────────────────────────────────────

/// One animation loop: a non-empty run of equally sized frames.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    frames: Vec<Frame>,
}

impl Pattern {
    pub fn new(frames: Vec<Frame>) -> Result<Self, PatternError> {
        let expected = frames.first().ok_or(PatternError::NoFrames)?.geometry();
        for (frame, f) in frames.iter().enumerate() {
            if f.geometry() != expected {
                return Err(PatternError::MismatchedFrame {
                    frame,
                    expected,
                    actual: f.geometry(),
                });
            }
        }
        Ok(Self { frames })
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn geometry(&self) -> DisplayGeometry {
        self.frames[0].geometry()
    }

    /// Nested `frames[rows[pixels]]` form, as stored in machine files.
    fn to_nested(&self) -> Vec<Vec<Vec<Pixel>>> {
        self.frames
            .iter()
            .map(|f| f.rows().map(<[Pixel]>::to_vec).collect())
            .collect()
    }

    fn from_nested(nested: Vec<Vec<Vec<Pixel>>>) -> Result<Self, PatternError> {
        let frames = nested
            .into_iter()
            .map(Frame::from_rows)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(frames)
    }
}

// ── Reading ────────────────────────────────────────────────────────

/// Parse pattern text in either encoding.
pub fn parse_pattern(text: &str) -> Result<Pattern, PatternError> {
    match text.trim_start().chars().next() {
        Some('#') => parse_pretty(text),
        _ => {
            let nested: Vec<Vec<Vec<Pixel>>> = serde_json::from_str(text)?;
            Pattern::from_nested(nested)
        }
    }
}

fn parse_pretty(text: &str) -> Result<Pattern, PatternError> {
    let mut frames = Vec::new();
    let mut rows: Option<Vec<Vec<Pixel>>> = None;

    for (i, line) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if is_frame_header(line) {
            if let Some(done) = rows.take() {
                frames.push(frame_at(done, line_no)?);
            }
            rows = Some(Vec::new());
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let Some(current) = rows.as_mut() else {
            return Err(PatternError::Syntax {
                line: line_no,
                message: "row data before the first frame header".to_string(),
            });
        };
        let row: Vec<Pixel> = serde_json::from_str(line).map_err(|e| PatternError::Syntax {
            line: line_no,
            message: e.to_string(),
        })?;
        current.push(row);
    }

    if let Some(done) = rows {
        frames.push(frame_at(done, text.lines().count())?);
    }
    Pattern::new(frames)
}

/// `# Frame`, optionally followed by whitespace and a frame number.
fn is_frame_header(line: &str) -> bool {
    let Some(rest) = line.strip_prefix('#') else {
        return false;
    };
    let rest = rest.trim_start();
    match rest.get(..5) {
        Some(word) if word.eq_ignore_ascii_case("frame") => {
            rest[5..].chars().next().is_none_or(char::is_whitespace)
        }
        _ => false,
    }
}

fn frame_at(rows: Vec<Vec<Pixel>>, line: usize) -> Result<Frame, PatternError> {
    Frame::from_rows(rows).map_err(|e| PatternError::Syntax {
        line,
        message: e.to_string(),
    })
}

/// Read a pattern file in either encoding.
pub fn read_pattern(path: &Path) -> Result<Pattern, PatternError> {
    let text = fs::read_to_string(path)?;
    parse_pattern(&text)
}

// ── Writing ────────────────────────────────────────────────────────

/// Which encoding to write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PatternFormat {
    #[default]
    Machine,
    Pretty,
}

/// Encode a pattern to `out`.
pub fn write_pattern_to<W: Write>(
    pattern: &Pattern,
    format: PatternFormat,
    mut out: W,
) -> Result<(), PatternError> {
    match format {
        PatternFormat::Machine => serde_json::to_writer(&mut out, &pattern.to_nested())?,
        PatternFormat::Pretty => {
            for (i, frame) in pattern.frames().iter().enumerate() {
                writeln!(out, "# Frame {}", i + 1)?;
                for row in frame.rows() {
                    serde_json::to_writer(&mut out, row)?;
                    writeln!(out)?;
                }
            }
        }
    }
    out.flush()?;
    Ok(())
}

/// Write a pattern file.
pub fn write_pattern(pattern: &Pattern, path: &Path, format: PatternFormat) -> Result<(), PatternError> {
    let file = fs::File::create(path)?;
    write_pattern_to(pattern, format, BufWriter::new(file))
}

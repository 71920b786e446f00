//! Pattern discovery and loading.
//!
//! A pattern path is either one `.nl` file or a directory of them (not
//! searched recursively). Loading is forgiving: a file that fails to parse is
//! logged and skipped, so a directory with a few broken files still plays the
//! rest.

use crate::DisplayGeometry;
use crate::pattern::{Pattern, PatternError, read_pattern};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Extension of pattern files.
pub const PATTERN_EXTENSION: &str = "nl";

/// Information about a pattern file under the media directory.
#[derive(Serialize, utoipa::ToSchema)]
pub struct PatternEntry {
    /// Filename (e.g., "sunset.nl")
    pub name: String,
    /// Path relative to the media dir (e.g., "ocean/sunset.nl")
    pub path: String,
    /// File size in bytes
    pub size: u64,
}

/// A pattern file that loaded, tagged with where it came from.
#[derive(Clone, Debug)]
pub struct LoadedPattern {
    pub path: PathBuf,
    pub pattern: Pattern,
}

fn is_pattern_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == PATTERN_EXTENSION)
}

/// Resolve `path` to the sorted list of pattern files it names.
pub fn pattern_paths(path: &Path) -> Result<Vec<PathBuf>, PatternError> {
    let mut paths = if path.is_dir() {
        fs::read_dir(path)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|p| is_pattern_file(p))
            .collect::<Vec<_>>()
    } else if path.exists() {
        if is_pattern_file(path) {
            vec![path.to_path_buf()]
        } else {
            Vec::new()
        }
    } else {
        return Err(PatternError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        )));
    };

    paths.sort();

    if paths.is_empty() {
        return Err(PatternError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no .{PATTERN_EXTENSION} files found at {}", path.display()),
        )));
    }

    Ok(paths)
}

/// Load every pattern at `path`, skipping files that fail to parse.
///
/// Errors only if nothing could be found or nothing loaded.
pub fn load_patterns(path: &Path) -> Result<Vec<LoadedPattern>, PatternError> {
    let paths = pattern_paths(path)?;
    let mut loaded = Vec::with_capacity(paths.len());

    for file in paths {
        match read_pattern(&file) {
            Ok(pattern) => {
                tracing::debug!(
                    "Loaded {} ({} frames, {})",
                    file.display(),
                    pattern.len(),
                    pattern.geometry()
                );
                loaded.push(LoadedPattern {
                    path: file,
                    pattern,
                });
            }
            Err(e) => tracing::warn!("Skipping pattern file {}: {}", file.display(), e),
        }
    }

    if loaded.is_empty() {
        return Err(PatternError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("no valid pattern files at {}", path.display()),
        )));
    }

    Ok(loaded)
}

/// Keep the patterns drawn for `geometry`, warning about the rest.
pub fn retain_geometry(loaded: Vec<LoadedPattern>, geometry: DisplayGeometry) -> Vec<Pattern> {
    loaded
        .into_iter()
        .filter_map(|LoadedPattern { path, pattern }| {
            if pattern.geometry() == geometry {
                Some(pattern)
            } else {
                tracing::warn!(
                    "Skipping {}: pattern is {} but the display is {}",
                    path.display(),
                    pattern.geometry(),
                    geometry
                );
                None
            }
        })
        .collect()
}

/// Scan the media directory (and its immediate subdirectories) for pattern files.
pub fn list_patterns(media_dir: &Path) -> Vec<PatternEntry> {
    let mut entries = Vec::new();
    collect_entries(media_dir, media_dir, &mut entries);

    if let Ok(read_dir) = fs::read_dir(media_dir) {
        for entry in read_dir.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_entries(media_dir, &path, &mut entries);
            }
        }
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    entries
}

fn collect_entries(media_dir: &Path, dir: &Path, entries: &mut Vec<PatternEntry>) {
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(_) => return,
    };

    for entry in read_dir.flatten() {
        let path = entry.path();
        if !is_pattern_file(&path) {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();
        let rel_path = path
            .strip_prefix(media_dir)
            .unwrap_or(&path)
            .to_string_lossy()
            .into_owned();

        entries.push(PatternEntry {
            name,
            path: rel_path,
            size,
        });
    }
}

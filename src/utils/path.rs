//! Path utilities: media discovery and output naming

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::VidnormResult;

/// Suffix added to the output stem when it would overwrite the source
pub const CONVERTED_SUFFIX: &str = "converted";

/// Output path for a source file: `<dir>/<stem>.<extension>`.
///
/// `stem` defaults to the source's own stem. When the result is the source
/// itself, `.converted` is appended to the stem.
pub fn output_path(source: &Path, stem: Option<&str>, extension: &str) -> PathBuf {
    let directory = source.parent().unwrap_or_else(|| Path::new(""));
    let stem = stem
        .map(str::to_string)
        .or_else(|| source.file_stem().map(|s| s.to_string_lossy().to_string()))
        .unwrap_or_else(|| "output".to_string());

    let candidate = directory.join(format!("{}.{}", stem, extension));
    if candidate == source {
        directory.join(format!("{}.{}.{}", stem, CONVERTED_SUFFIX, extension))
    } else {
        candidate
    }
}

/// Check that a user-supplied output name is a bare file stem
pub fn is_valid_stem(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains(std::path::MAIN_SEPARATOR)
}

/// Collect the files to process.
///
/// A file is returned as is. A directory yields its regular files, sorted by
/// path, descending into subdirectories only when `recursive` is set.
pub fn discover_files(root: &Path, recursive: bool) -> VidnormResult<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        } else {
            debug!("Skipping non-file {}", entry.path().display());
        }
    }
    files.sort();

    Ok(files)
}

//! Input discovery for batch conversion
//!
//! Inputs may be plain files, directories (walked recursively for files
//! with a known extension) or glob patterns. The result is sorted and
//! free of duplicates so batch order is stable between runs.

use crate::constants::INPUT_EXTENSIONS;
use crate::error::{MapperError, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// True for files the ingest layer knows how to read
pub fn is_supported_input(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            INPUT_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn looks_like_pattern(input: &str) -> bool {
    input.contains(['*', '?', '['])
}

/// Resolve every input to the list of files to convert
pub fn discover_inputs<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<PathBuf>> {
    let mut files = BTreeSet::new();

    for input in inputs {
        let input = input.as_ref();
        let path = Path::new(input);

        if path.is_dir() {
            let before = files.len();
            for entry in WalkDir::new(path).follow_links(true) {
                let entry = entry.map_err(|e| {
                    MapperError::validation(format!(
                        "Failed to walk directory {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                if entry.file_type().is_file() && is_supported_input(entry.path()) {
                    files.insert(entry.into_path());
                }
            }
            debug!(
                "Found {} input files under {}",
                files.len() - before,
                path.display()
            );
        } else if path.is_file() {
            files.insert(path.to_path_buf());
        } else if looks_like_pattern(input) {
            let matches = glob::glob(input).map_err(|e| {
                MapperError::validation(format!("Invalid input pattern '{}': {}", input, e))
            })?;
            let before = files.len();
            for entry in matches.flatten() {
                if entry.is_file() {
                    files.insert(entry);
                }
            }
            debug!("Pattern '{}' matched {} files", input, files.len() - before);
        } else {
            return Err(MapperError::InputNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    if files.is_empty() {
        return Err(MapperError::validation("No input files found"));
    }

    Ok(files.into_iter().collect())
}

//! Local file connector for the "ask about my files" flow.
//!
//! Each path given on the command line is either a file, loaded as-is, or
//! a directory, walked recursively with the same [`FileFilter`] used for
//! GitHub trees. Named files skip the extension check (the user picked
//! them) but not the size cap. Files that cannot be read or are not UTF-8
//! are skipped with a warning.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::filter::FileFilter;
use crate::models::{SourceFile, SourceSet};

/// Collection name used for every upload batch.
pub const UPLOAD_SET_NAME: &str = "uploaded_files";

pub fn load_uploads(paths: &[PathBuf], filter: &FileFilter) -> Result<SourceSet> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            walk_directory(path, filter, &mut files)?;
        } else if path.is_file() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            if let Some(file) = read_text_file(path, &name, filter.max_file_size()) {
                files.push(file);
            }
        } else {
            tracing::warn!(path = %path.display(), "skipping upload: no such file");
        }
    }

    if files.is_empty() && !paths.is_empty() {
        bail!("none of the given files could be read as UTF-8 text");
    }

    tracing::info!(files = files.len(), "loaded uploaded files");
    Ok(SourceSet::new(UPLOAD_SET_NAME, files))
}

fn walk_directory(root: &Path, filter: &FileFilter, files: &mut Vec<SourceFile>) -> Result<()> {
    let mut found = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        let size = entry.metadata().ok().map(|m| m.len());
        if !filter.accepts(&rel_str, size) {
            continue;
        }

        if let Some(file) = read_text_file(path, &rel_str, filter.max_file_size()) {
            found.push(file);
        }
    }

    // Sort for deterministic ordering
    found.sort_by(|a, b| a.path.cmp(&b.path));
    files.extend(found);
    Ok(())
}

fn read_text_file(path: &Path, display_path: &str, max_size: u64) -> Option<SourceFile> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "skipping upload: read failed");
            return None;
        }
    };

    if bytes.len() as u64 > max_size {
        tracing::warn!(path = %path.display(), size = bytes.len(), "skipping upload: over size cap");
        return None;
    }

    match String::from_utf8(bytes) {
        Ok(content) => Some(SourceFile::new(display_path, content)),
        Err(_) => {
            tracing::warn!(path = %path.display(), "skipping upload: not valid UTF-8");
            None
        }
    }
}

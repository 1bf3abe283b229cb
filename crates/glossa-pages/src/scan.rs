//! Recursive source discovery.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{PagesError, Result};
use crate::paths::strip_extension;

/// List every file under `root` whose name ends in `.{extension}`.
///
/// The extension may be given with or without its leading dot and may itself
/// contain dots, as in `html.j2`. Returned paths
/// are absolute. Any directory entry that cannot be read aborts the scan, so a
/// partially readable tree never produces a partial page list.
pub fn scan(root: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let root = fs::canonicalize(root).map_err(|e| PagesError::io(root, e))?;
    let extension = extension.trim_start_matches('.');

    let mut files = Vec::new();

    for entry in WalkDir::new(&root).follow_links(true) {
        let entry = entry.map_err(|source| PagesError::Scan {
            path: root.clone(),
            source,
        })?;

        let matches = entry
            .file_name()
            .to_str()
            .and_then(|name| strip_extension(name, extension))
            .is_some();
        if entry.file_type().is_file() && matches {
            files.push(entry.into_path());
        }
    }

    tracing::debug!(
        "Found {} .{} files in {}",
        files.len(),
        extension,
        root.display()
    );

    Ok(files)
}

//! Project discovery: the direct subdirectories of a domain location.

use std::collections::BTreeSet;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

use crate::errors::{DevrouteError, Result};

/// A folder name usable as a DNS label in `<project>.<domain>.test`.
pub fn is_valid_project_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// List project names under `location`, sorted by name.
///
/// Hidden entries, plain files, symlinks and names that cannot form a hostname are skipped.
pub fn scan_domain(location: &Path) -> Result<BTreeSet<String>> {
    if !location.exists() {
        return Err(DevrouteError::config(format!(
            "domain location {} does not exist",
            location.display()
        )));
    }
    if !location.is_dir() {
        return Err(DevrouteError::config(format!(
            "domain location {} is not a directory",
            location.display()
        )));
    }

    let mut projects = BTreeSet::new();
    for entry in WalkDir::new(location)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
    {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| location.to_path_buf());
            let source = e
                .into_io_error()
                .unwrap_or_else(|| io::Error::other("filesystem loop"));
            DevrouteError::filesystem(path, source)
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            tracing::warn!(
                "skipping non UTF-8 folder under {}",
                location.display()
            );
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        if !is_valid_project_name(name) {
            tracing::warn!(
                "skipping folder '{name}' under {}: not usable as a hostname",
                location.display()
            );
            continue;
        }
        projects.insert(name.to_string());
    }
    Ok(projects)
}

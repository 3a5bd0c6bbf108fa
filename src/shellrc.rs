//! `export NAME="value"` lines in the user's shell rc file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::errors::{DevrouteError, Result};
use crate::paths::expand_tilde;

pub const DEFAULT_RC: &str = "~/.zshrc";

pub fn rc_path(explicit: Option<&str>) -> PathBuf {
    expand_tilde(explicit.unwrap_or(DEFAULT_RC))
}

fn export_prefix(name: &str) -> String {
    format!("export {name}=")
}

/// Drop existing exports of `name` and append a fresh one after the last non-blank line.
pub fn with_export(contents: &str, name: &str, value: &str) -> String {
    let prefix = export_prefix(name);
    let mut lines: Vec<&str> = contents
        .lines()
        .filter(|l| !l.starts_with(&prefix))
        .collect();
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    let mut out = String::new();
    for l in lines {
        out.push_str(l);
        out.push('\n');
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(&format!("{prefix}\"{value}\"\n"));
    out
}

/// Contents without exports of `name`, or `None` when there was nothing to remove.
pub fn without_export(contents: &str, name: &str) -> Option<String> {
    let prefix = export_prefix(name);
    let mut removed = false;
    let mut out = String::new();
    for l in contents.lines() {
        if l.starts_with(&prefix) {
            removed = true;
            continue;
        }
        out.push_str(l);
        out.push('\n');
    }
    removed.then_some(out)
}

/// Write `export name="value"` to `rc`, creating the file if needed.
pub fn set_export(rc: &Path, name: &str, value: &str) -> Result<()> {
    crate::util::reject_newlines(value, name).map_err(DevrouteError::Config)?;
    if value.contains('"') {
        return Err(DevrouteError::config(format!(
            "refusing to use {name}: contains a double quote"
        )));
    }
    let existing = match fs::read_to_string(rc) {
        Ok(s) => s,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::info!("{} does not exist; creating it", rc.display());
            String::new()
        }
        Err(e) => return Err(DevrouteError::filesystem(rc, e)),
    };
    fs::write(rc, with_export(&existing, name, value)).map_err(|e| DevrouteError::filesystem(rc, e))
}

/// Remove `export name=...` from `rc`; returns false when no entry was present.
pub fn remove_export(rc: &Path, name: &str) -> Result<bool> {
    let existing = fs::read_to_string(rc).map_err(|e| DevrouteError::filesystem(rc, e))?;
    match without_export(&existing, name) {
        Some(next) => {
            fs::write(rc, next).map_err(|e| DevrouteError::filesystem(rc, e))?;
            Ok(true)
        }
        None => Ok(false),
    }
}

//! Managed block in the system hosts file.
//!
//! The block between the markers belongs to devroute and is rewritten whole on
//! every deploy; everything outside it is preserved byte for byte.

use std::fs;
use std::io;
use std::path::Path;

use crate::errors::{DevrouteError, Result};

pub const BEGIN_MARKER: &str = "# >>> devroute managed block >>>";
pub const END_MARKER: &str = "# <<< devroute managed block <<<";

/// Byte range of the managed block, marker lines included.
///
/// A begin marker without an end marker extends the block to the end of the text.
fn find_block(existing: &str) -> Option<(usize, usize)> {
    let mut offset = 0;
    let mut begin = None;
    for line in existing.split_inclusive('\n') {
        let t = line.trim();
        match begin {
            None if t == BEGIN_MARKER => begin = Some(offset),
            Some(b) if t == END_MARKER => return Some((b, offset + line.len())),
            _ => {}
        }
        offset += line.len();
    }
    begin.map(|b| (b, existing.len()))
}

fn render_block(lines: &[String]) -> String {
    let mut block = String::new();
    block.push_str(BEGIN_MARKER);
    block.push('\n');
    for l in lines {
        block.push_str(l);
        block.push('\n');
    }
    block.push_str(END_MARKER);
    block.push('\n');
    block
}

/// Return `existing` with the managed block replaced by `lines`.
///
/// Text outside the markers is kept as is. A new block is appended after one blank
/// line; removing a trailing block also drops that separator. An empty `lines`
/// removes the block entirely and leaves a file without one untouched.
pub fn replace_managed_block(existing: &str, lines: &[String]) -> String {
    match find_block(existing) {
        None if lines.is_empty() => existing.to_string(),
        None => {
            let mut out = existing.to_string();
            if !out.is_empty() {
                if !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push('\n');
            }
            out.push_str(&render_block(lines));
            out
        }
        Some((begin, end)) => {
            let mut before = &existing[..begin];
            let after = &existing[end..];
            if lines.is_empty() {
                if after.is_empty() && before.ends_with("\n\n") {
                    before = &before[..before.len() - 1];
                }
                return format!("{before}{after}");
            }
            format!("{before}{}{after}", render_block(lines))
        }
    }
}

/// Rewrite the managed block of the hosts file at `path`.
///
/// Falls back to `sudo tee` when the file is not writable by the current user.
/// Returns false when the file already had the desired content.
pub fn sync_system_hosts(path: &Path, lines: &[String]) -> Result<bool> {
    let existing = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(DevrouteError::filesystem(path, e)),
    };
    let next = replace_managed_block(&existing, lines);
    if next == existing {
        return Ok(false);
    }
    match fs::write(path, &next) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            tracing::info!("{} not writable, retrying through sudo", path.display());
            crate::util::sudo_tee(path, &next)?;
            Ok(true)
        }
        Err(e) => Err(DevrouteError::filesystem(path, e)),
    }
}

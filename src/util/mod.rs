#![allow(clippy::module_name_repetitions)]
//! Small utilities: shell escaping, atomic file writes, command previews.

pub mod exec;
pub mod shell_script;

pub use shell_script::ShellScript;

use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use crate::errors::{DevrouteError, Result};

/// Reject strings containing newline, carriage return, or NUL before embedding into a shell command.
///
/// Keep error text stable (tests/UX depend on it).
pub fn reject_newlines(s: &str, what: &str) -> std::result::Result<(), String> {
    if s.contains('\n') || s.contains('\r') || s.contains('\0') {
        Err(format!("refusing to use {what}: contains newline"))
    } else {
        Ok(())
    }
}

pub fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|a| shell_escape(a))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        "''".to_string()
    } else if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_=./:@".contains(c))
    {
        s.to_string()
    } else {
        let escaped = s.replace('\'', "'\"'\"'");
        format!("'{}'", escaped)
    }
}

/// Replace `path` with `contents` via a temp file in the same directory.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| DevrouteError::filesystem(dir, e))?;
    let mut tmp =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| DevrouteError::filesystem(dir, e))?;
    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| DevrouteError::filesystem(path, e))?;
    tmp.persist(path)
        .map_err(|e| DevrouteError::filesystem(path, e.error))?;
    Ok(())
}

/// Write `contents` to a root-owned `path` through `sudo tee`.
pub fn sudo_tee(path: &Path, contents: &str) -> Result<()> {
    let mut child = Command::new("sudo")
        .arg("tee")
        .arg(path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .spawn()
        .map_err(|e| DevrouteError::filesystem(path, e))?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(contents.as_bytes())
            .map_err(|e| DevrouteError::filesystem(path, e))?;
    }
    let status = child
        .wait()
        .map_err(|e| DevrouteError::filesystem(path, e))?;
    if !status.success() {
        return Err(DevrouteError::filesystem(
            path,
            io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("sudo tee exited with {status}"),
            ),
        ));
    }
    Ok(())
}

//! Error mapping guide:
//! - Library operations return `DevrouteError`; the CLI wraps them in anyhow for context.
//! - Map a missing engine binary (and io::ErrorKind::NotFound) to exit code 127; all others to 1.
//! - Keep user-visible messages actionable: say what is missing and which command fixes it.
use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DevrouteError {
    /// Missing or invalid configuration entry.
    #[error("{0}")]
    Config(String),

    /// Container engine binary missing, daemon unreachable or machine stopped.
    #[error("{message}")]
    EngineUnavailable { message: String, not_found: bool },

    /// A filesystem location could not be read or written.
    #[error("{}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Explicit host-port mapping collides with an existing one.
    #[error("{0}")]
    PortConflict(String),

    /// An engine command ran but did not succeed.
    #[error("{0}")]
    Engine(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, DevrouteError>;

impl DevrouteError {
    pub fn config(msg: impl Into<String>) -> Self {
        DevrouteError::Config(msg.into())
    }

    pub fn engine_unavailable(msg: impl Into<String>) -> Self {
        DevrouteError::EngineUnavailable {
            message: msg.into(),
            not_found: false,
        }
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DevrouteError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Map an io::Error to a process exit code:
/// - 127 for NotFound (command not found)
/// - 1 for all other errors
pub fn exit_code_for_io_error(e: &io::Error) -> u8 {
    if e.kind() == io::ErrorKind::NotFound {
        127
    } else {
        1
    }
}

pub fn exit_code_for_error(e: &DevrouteError) -> u8 {
    match e {
        DevrouteError::EngineUnavailable {
            not_found: true, ..
        } => 127,
        DevrouteError::Io(ioe) => exit_code_for_io_error(ioe),
        _ => 1,
    }
}

/// Walk an anyhow chain looking for a library error to derive the exit code from.
pub fn exit_code_for_anyhow(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(de) = cause.downcast_ref::<DevrouteError>() {
            return exit_code_for_error(de);
        }
        if let Some(ioe) = cause.downcast_ref::<io::Error>() {
            return exit_code_for_io_error(ioe);
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_engine_maps_to_127() {
        let e = DevrouteError::EngineUnavailable {
            message: "podman is required but was not found in PATH.".to_string(),
            not_found: true,
        };
        assert_eq!(exit_code_for_error(&e), 127);
        assert_eq!(
            exit_code_for_error(&DevrouteError::engine_unavailable("machine down")),
            1
        );
    }

    #[test]
    fn test_anyhow_chain_finds_library_error() {
        let inner = DevrouteError::EngineUnavailable {
            message: "docker missing".to_string(),
            not_found: true,
        };
        let wrapped = anyhow::Error::new(inner).context("deploy failed");
        assert_eq!(exit_code_for_anyhow(&wrapped), 127);
        let plain = anyhow::anyhow!("other");
        assert_eq!(exit_code_for_anyhow(&plain), 1);
    }

    #[test]
    fn test_filesystem_error_display_includes_path() {
        let e = DevrouteError::filesystem(
            "/nowhere/projects",
            io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
        );
        let s = e.to_string();
        assert!(s.contains("/nowhere/projects"), "{s}");
        assert!(s.contains("permission denied"), "{s}");
    }
}

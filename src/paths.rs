//! Root directory layout and environment-driven locations.

use std::env;
use std::path::{Path, PathBuf};

pub const ROOT_ENV: &str = "DEVROUTE_ROOT";
pub const MACHINE_ENV: &str = "DEVROUTE_MACHINE";
pub const SYSTEM_HOSTS_ENV: &str = "DEVROUTE_SYSTEM_HOSTS";

pub const DEFAULT_MACHINE: &str = "podman-machine-default";
pub const RESOLVER_FILE: &str = "/etc/resolver/test";

/// Every file devroute reads or generates below its root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub root: PathBuf,
    pub config: PathBuf,
    pub portmap: PathBuf,
    pub hosts_container: PathBuf,
    pub vhost_conf: PathBuf,
    pub nginx_conf: PathBuf,
    pub dnsmasq_dir: PathBuf,
    pub lock: PathBuf,
    pub system_hosts: PathBuf,
}

impl Paths {
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Paths {
            config: root.join("config.json"),
            portmap: root.join("portmap.json"),
            hosts_container: root.join("hosts_container"),
            vhost_conf: root.join("vhost_container.conf"),
            nginx_conf: root.join("nginx.conf"),
            dnsmasq_dir: root.join("dnsmasq.d"),
            lock: root.join("devroute.lock"),
            system_hosts: PathBuf::from("/etc/hosts"),
            root,
        }
    }

    pub fn with_system_hosts(mut self, p: impl Into<PathBuf>) -> Self {
        self.system_hosts = p.into();
        self
    }

    /// Resolve from `$DEVROUTE_ROOT` (else `~/.devroute`) and `$DEVROUTE_SYSTEM_HOSTS`.
    pub fn from_env() -> Self {
        let root = env::var(ROOT_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_root);
        let mut paths = Paths::under(root);
        if let Some(h) = env::var(SYSTEM_HOSTS_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
        {
            paths.system_hosts = PathBuf::from(h);
        }
        paths
    }

    pub fn dnsmasq_test_conf(&self) -> PathBuf {
        self.dnsmasq_dir.join("test.conf")
    }
}

fn default_root() -> PathBuf {
    home::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".devroute")
}

/// Engine machine name; an explicitly empty value means "any running machine".
pub fn machine_from_env() -> Option<String> {
    match env::var(MACHINE_ENV) {
        Ok(v) if v.trim().is_empty() => None,
        Ok(v) => Some(v.trim().to_string()),
        Err(_) => Some(DEFAULT_MACHINE.to_string()),
    }
}

/// True when the machine name came from the environment rather than the default.
pub fn machine_explicitly_set() -> bool {
    env::var(MACHINE_ENV).is_ok()
}

/// Expand a leading `~/` against the home directory.
pub fn expand_tilde(p: &str) -> PathBuf {
    if let Some(rest) = p.strip_prefix("~/") {
        if let Some(home) = home::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(p)
}

/// Final path segment as UTF-8, if any.
pub fn last_segment(p: &Path) -> Option<String> {
    p.file_name().and_then(|s| s.to_str()).map(str::to_string)
}

//! One-time host setup performed by `devroute init`.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::errors::{DevrouteError, Result};
use crate::paths::{Paths, RESOLVER_FILE};
use crate::util::{sudo_tee, write_atomic};

pub const NGINX_CONF: &str = include_str!("../assets/nginx.conf");
pub const DNSMASQ_TEST_CONF: &str = "address=/.test/127.0.0.1\n";
pub const RESOLVER_CONTENTS: &str = "nameserver 127.0.0.1\n";
/// Lowest port the DNS helper must bind inside a rootless VM.
pub const DNS_PORT: u16 = 53;

/// Write the files devroute owns under its root. Returns the paths written.
pub fn write_root_files(paths: &Paths) -> Result<Vec<PathBuf>> {
    let dnsmasq = paths.dnsmasq_test_conf();
    write_atomic(&dnsmasq, DNSMASQ_TEST_CONF.as_bytes())?;
    write_atomic(&paths.nginx_conf, NGINX_CONF.as_bytes())?;
    // Empty routing files so containers can mount them before the first deploy.
    for p in [&paths.hosts_container, &paths.vhost_conf] {
        if !p.exists() {
            write_atomic(p, b"")?;
        }
    }
    Ok(vec![dnsmasq, paths.nginx_conf.clone()])
}

/// Point the `.test` resolver at the local DNS helper (needs sudo).
pub fn write_resolver() -> Result<()> {
    let path = Path::new(RESOLVER_FILE);
    let dir = path.parent().unwrap_or(Path::new("/etc/resolver"));
    let status = Command::new("sudo")
        .arg("mkdir")
        .arg("-p")
        .arg(dir)
        .status()
        .map_err(|e| DevrouteError::filesystem(dir, e))?;
    if !status.success() {
        return Err(DevrouteError::filesystem(
            dir,
            io::Error::new(io::ErrorKind::PermissionDenied, "sudo mkdir failed"),
        ));
    }

    sudo_tee(path, RESOLVER_CONTENTS)
}

/// True when the resolver file routes `.test` to the local DNS helper.
pub fn resolver_configured() -> bool {
    std::fs::read_to_string(RESOLVER_FILE)
        .map(|s| s.trim() == RESOLVER_CONTENTS.trim())
        .unwrap_or(false)
}

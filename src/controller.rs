//! Shared reverse proxy and DNS helper lifecycle.

use std::path::Path;

use crate::engine::ContainerEngine;
use crate::errors::Result;

pub const PROXY_CONTAINER: &str = "devroute-reverse-proxy";
pub const PROXY_IMAGE: &str = "nginx";
pub const DNS_CONTAINER: &str = "devroute-dns";
pub const DNS_IMAGE: &str = "dockurr/dnsmasq";
/// Project containers are named `devroute_<domain>_<project>`.
pub const PROJECT_CONTAINER_PREFIX: &str = "devroute_";

pub fn project_container_name(domain: &str, project: &str) -> String {
    format!("{PROJECT_CONTAINER_PREFIX}{domain}_{project}")
}

pub fn is_project_container(name: &str) -> bool {
    name.starts_with(PROJECT_CONTAINER_PREFIX)
}

/// `run -d` arguments for the proxy container.
pub fn proxy_run_args(engine: &dyn ContainerEngine, vhost_conf: &Path) -> Vec<String> {
    let mut args = vec![
        "--rm".to_string(),
        "--name".to_string(),
        PROXY_CONTAINER.to_string(),
        "-p".to_string(),
        "80:80".to_string(),
    ];
    args.extend(engine.kind().gateway_run_args());
    args.push("-v".to_string());
    args.push(format!(
        "{}:/etc/nginx/conf.d/vhost_container.conf",
        vhost_conf.display()
    ));
    args.push(PROXY_IMAGE.to_string());
    args
}

pub fn dns_run_args(dnsmasq_dir: &Path) -> Vec<String> {
    vec![
        "--rm".to_string(),
        "--name".to_string(),
        DNS_CONTAINER.to_string(),
        "-p".to_string(),
        "53:53/udp".to_string(),
        "-p".to_string(),
        "53:53/tcp".to_string(),
        "-v".to_string(),
        format!("{}:/etc/dnsmasq.d", dnsmasq_dir.display()),
        "--cap-add=NET_ADMIN".to_string(),
        DNS_IMAGE.to_string(),
    ]
}

fn status(verb: &str, color: &str, name: &str) {
    eprintln!(
        "{verb} {}",
        crate::paint(crate::color_enabled_stderr(), color, name)
    );
}

/// Sole owner of the shared proxy container.
pub struct ReverseProxyController<'a> {
    engine: &'a dyn ContainerEngine,
}

impl<'a> ReverseProxyController<'a> {
    pub fn new(engine: &'a dyn ContainerEngine) -> Self {
        Self { engine }
    }

    /// Stop-if-running, remove, start. Safe to retry.
    pub fn restart_proxy(&self, vhost_conf: &Path) -> Result<()> {
        let running = self.engine.running_containers()?;
        if running.iter().any(|n| n == PROXY_CONTAINER) {
            status("restarting", crate::GREEN, PROXY_CONTAINER);
            self.engine.stop(PROXY_CONTAINER)?;
        } else {
            status("starting", crate::GREEN, PROXY_CONTAINER);
        }
        // --rm containers may linger briefly after stop
        self.engine.remove(PROXY_CONTAINER)?;
        self.engine
            .run_detached(&proxy_run_args(self.engine, vhost_conf))
    }

    /// Stop every project container left over from earlier sessions.
    ///
    /// Returns the names that were stopped; individual stop failures are logged and skipped.
    pub fn stop_stale(&self) -> Result<Vec<String>> {
        let mut stopped = Vec::new();
        for name in self.engine.running_containers()? {
            if !is_project_container(&name) {
                continue;
            }
            status("stopping", crate::CYAN, &name);
            match self.engine.stop(&name) {
                Ok(()) => stopped.push(name),
                Err(e) => tracing::warn!("failed to stop {name}: {e}"),
            }
        }
        Ok(stopped)
    }

    /// Start the DNS helper when it is not running. Never restarts it.
    pub fn ensure_dns(&self, dnsmasq_dir: &Path) -> Result<bool> {
        let running = self.engine.running_containers()?;
        if running.iter().any(|n| n == DNS_CONTAINER) {
            return Ok(false);
        }
        status("starting", crate::GREEN, DNS_CONTAINER);
        self.engine.remove(DNS_CONTAINER)?;
        self.engine.run_detached(&dns_run_args(dnsmasq_dir))?;
        Ok(true)
    }
}

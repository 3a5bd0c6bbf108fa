//! Deploy pipeline: scan -> allocate -> render -> write -> restart proxy.

use std::collections::BTreeSet;

use crate::config::Config;
use crate::controller::ReverseProxyController;
use crate::engine::ContainerEngine;
use crate::errors::{DevrouteError, Result};
use crate::hosts::sync_system_hosts;
use crate::paths::Paths;
use crate::portmap::{allocate, Observed, PortMap};
use crate::routing::{self, project_host};
use crate::scanner::scan_domain;
use crate::store::DocumentStore;
use crate::util::write_atomic;

/// A domain whose location could not be scanned; its prior ports were kept.
#[derive(Debug)]
pub struct DomainFailure {
    pub domain: String,
    pub error: DevrouteError,
}

#[derive(Debug)]
pub struct DeployReport {
    pub portmap: PortMap,
    pub failures: Vec<DomainFailure>,
    /// Hostnames that received a port in this run.
    pub added: Vec<String>,
    /// Hostnames whose port was released.
    pub removed: Vec<String>,
    pub stopped: Vec<String>,
    pub system_hosts_changed: bool,
    pub dns_started: bool,
}

pub struct Deployer<'a> {
    paths: &'a Paths,
    config: &'a dyn DocumentStore<Config>,
    portmap: &'a dyn DocumentStore<PortMap>,
    engine: &'a dyn ContainerEngine,
}

/// Scan every configured domain; a failing domain keeps its prior projects.
pub fn observe(config: &Config, prior: &PortMap) -> (Observed, Vec<DomainFailure>) {
    let mut observed = Observed::new();
    let mut failures = Vec::new();
    for (name, domain) in &config.domains {
        match scan_domain(&domain.location) {
            Ok(projects) => {
                tracing::info!("{name}: {} project(s)", projects.len());
                observed.insert(name.clone(), projects);
            }
            Err(error) => {
                tracing::warn!("skipping domain {name}: {error}");
                if let Some(kept) = prior.domain(name) {
                    observed.insert(name.clone(), kept.keys().cloned().collect());
                }
                failures.push(DomainFailure {
                    domain: name.clone(),
                    error,
                });
            }
        }
    }
    (observed, failures)
}

fn hostnames(pm: &PortMap) -> BTreeSet<String> {
    pm.mappings()
        .map(|m| project_host(m.project, m.domain))
        .collect()
}

impl<'a> Deployer<'a> {
    pub fn new(
        paths: &'a Paths,
        config: &'a dyn DocumentStore<Config>,
        portmap: &'a dyn DocumentStore<PortMap>,
        engine: &'a dyn ContainerEngine,
    ) -> Self {
        Self {
            paths,
            config,
            portmap,
            engine,
        }
    }

    pub fn run(&self) -> Result<DeployReport> {
        let config = self.config.load()?;
        if config.domains.is_empty() {
            return Err(DevrouteError::config(
                "Please configure a domain: devroute add domain <location>",
            ));
        }
        let prior = self.portmap.load()?;

        let (observed, failures) = observe(&config, &prior);
        let next = allocate(&prior, &observed)?;

        let before = hostnames(&prior);
        let after = hostnames(&next);
        let added = after.difference(&before).cloned().collect();
        let removed = before.difference(&after).cloned().collect();

        let artifacts = routing::render(&next, self.engine.kind().gateway_host());
        write_atomic(&self.paths.hosts_container, artifacts.hosts.as_bytes())?;
        write_atomic(&self.paths.vhost_conf, artifacts.vhosts.as_bytes())?;
        self.portmap.save(&next)?;

        let lines = if config.urls_in_hosts {
            routing::system_hosts_lines(&next)
        } else {
            Vec::new()
        };
        let system_hosts_changed = sync_system_hosts(&self.paths.system_hosts, &lines)?;

        let controller = ReverseProxyController::new(self.engine);
        controller.restart_proxy(&self.paths.vhost_conf)?;
        let dns_started = match controller.ensure_dns(&self.paths.dnsmasq_dir) {
            Ok(started) => started,
            Err(e) => {
                tracing::warn!("dns helper not started: {e}");
                false
            }
        };
        let stopped = controller.stop_stale()?;

        Ok(DeployReport {
            portmap: next,
            failures,
            added,
            removed,
            stopped,
            system_hosts_changed,
            dns_started,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_observe_keeps_prior_projects_of_failing_domain() {
        let td = tempfile::tempdir().expect("tmpdir");
        let good = td.path().join("projects");
        fs::create_dir_all(good.join("api")).expect("mkdir");
        let gone = td.path().join("clients");
        fs::create_dir_all(&gone).expect("mkdir");

        let mut config = Config::default();
        config.add_domain(&good).expect("add");
        config.add_domain(&gone).expect("add");
        fs::remove_dir(&gone).expect("rmdir");

        let mut prior = PortMap::default();
        prior.insert("clients", "shop", 50100);

        let (observed, failures) = observe(&config, &prior);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].domain, "clients");
        assert!(observed["clients"].contains("shop"));
        assert!(observed["projects"].contains("api"));
    }
}

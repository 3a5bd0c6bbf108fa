//! Port map document and the stable port allocator.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::errors::{DevrouteError, Result};

/// First port handed out to a project.
pub const BASE_PORT: u16 = 50100;

/// `{domain: {project: port}}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortMap(BTreeMap<String, BTreeMap<String, u16>>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping<'a> {
    pub domain: &'a str,
    pub project: &'a str,
    pub port: u16,
}

impl PortMap {
    pub fn get(&self, domain: &str, project: &str) -> Option<u16> {
        self.0.get(domain).and_then(|d| d.get(project)).copied()
    }

    pub fn insert(&mut self, domain: &str, project: &str, port: u16) {
        self.0
            .entry(domain.to_string())
            .or_default()
            .insert(project.to_string(), port);
    }

    pub fn remove_domain(&mut self, domain: &str) -> bool {
        self.0.remove(domain).is_some()
    }

    pub fn domain(&self, domain: &str) -> Option<&BTreeMap<String, u16>> {
        self.0.get(domain)
    }

    pub fn domains(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, u16>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// All mappings ordered by domain, then project.
    pub fn mappings(&self) -> impl Iterator<Item = PortMapping<'_>> {
        self.0.iter().flat_map(|(domain, projects)| {
            projects.iter().map(move |(project, port)| PortMapping {
                domain,
                project,
                port: *port,
            })
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeMap::is_empty)
    }

    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }
}

/// Projects observed on disk, per domain.
pub type Observed = BTreeMap<String, BTreeSet<String>>;

/// Compute the next port map from the prior one and the projects observed now.
///
/// - projects present in `prior` keep their port,
/// - new projects get the lowest free port >= `BASE_PORT`, visiting domains then
///   projects in name order,
/// - projects (and domains) not observed are dropped.
///
/// Fails with `PortConflict` when no port above `BASE_PORT` is left.
pub fn allocate(prior: &PortMap, observed: &Observed) -> Result<PortMap> {
    let mut next = PortMap::default();
    let mut taken: BTreeSet<u16> = BTreeSet::new();
    let mut pending: Vec<(&str, &str)> = Vec::new();

    for (domain, projects) in observed {
        // Keep an empty entry so the domain shows up in the document.
        next.0.entry(domain.clone()).or_default();
        for project in projects {
            match prior.get(domain, project) {
                // Two kept projects sharing a port can only come from a hand-edited
                // document; the later one is re-allocated.
                Some(port) if port >= BASE_PORT && taken.insert(port) => {
                    next.insert(domain, project, port);
                }
                _ => pending.push((domain.as_str(), project.as_str())),
            }
        }
    }

    let mut candidate = BASE_PORT;
    for (domain, project) in pending {
        while taken.contains(&candidate) {
            candidate = candidate.checked_add(1).ok_or_else(|| {
                DevrouteError::PortConflict(format!(
                    "no free port left from {BASE_PORT} for {project}.{domain}"
                ))
            })?;
        }
        taken.insert(candidate);
        tracing::info!("allocated port {candidate} to {project}.{domain}");
        next.insert(domain, project, candidate);
    }

    Ok(next)
}

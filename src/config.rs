#![allow(clippy::module_name_repetitions)]
//! Configuration document model and its editing operations.
//!
//! All operations work on an in-memory snapshot; persisting the result is the
//! caller's job (see `store`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::engine::EngineKind;
use crate::errors::{DevrouteError, Result};
use crate::paths::last_segment;

/// Placeholder in a volume host path, replaced by the caller's working directory.
pub const PWD_TOKEN: &str = "{pwd}";
/// Older documents spell the placeholder as a shell substitution.
pub const LEGACY_PWD_TOKEN: &str = "$(pwd)";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub domains: BTreeMap<String, DomainConfig>,
    #[serde(default)]
    pub environments: BTreeMap<String, Environment>,
    #[serde(default)]
    pub engine: EngineKind,
    #[serde(default)]
    pub urls_in_hosts: bool,
    /// Keys this version does not know about, kept across rewrites.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainConfig {
    pub location: PathBuf,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub services: BTreeMap<String, ServiceConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// host port -> container port
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "de_port_map"
    )]
    pub host_portmappings: BTreeMap<u16, u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serve_command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub container: String,
    pub host: String,
}

impl Volume {
    /// Host path with `{pwd}` (or the legacy `$(pwd)`) replaced by `cwd`.
    pub fn resolve_host(&self, cwd: &Path) -> PathBuf {
        let cwd = cwd.to_string_lossy();
        PathBuf::from(
            self.host
                .replace(PWD_TOKEN, &cwd)
                .replace(LEGACY_PWD_TOKEN, &cwd),
        )
    }
}

impl Environment {
    /// Treat `image` as a tag under `image_repository` when one is configured.
    pub fn resolve_image(&self, image: &str) -> String {
        match self.image_repository.as_deref() {
            Some(repo) if !repo.is_empty() => format!("{repo}:{image}"),
            _ => image.to_string(),
        }
    }
}

/// Older documents stored ports as strings; accept both.
fn de_port_map<'de, D>(d: D) -> std::result::Result<BTreeMap<u16, u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Num(u16),
        Text(String),
    }
    let raw: BTreeMap<String, PortValue> = BTreeMap::deserialize(d)?;
    let mut out = BTreeMap::new();
    for (k, v) in raw {
        let host = k
            .trim()
            .parse::<u16>()
            .map_err(|_| serde::de::Error::custom(format!("invalid host port '{k}'")))?;
        let container = match v {
            PortValue::Num(n) => n,
            PortValue::Text(s) => s.trim().parse::<u16>().map_err(|_| {
                serde::de::Error::custom(format!("invalid container port '{s}'"))
            })?,
        };
        out.insert(host, container);
    }
    Ok(out)
}

fn reject_newlines(s: &str, what: &str) -> Result<()> {
    crate::util::reject_newlines(s, what).map_err(DevrouteError::Config)
}

impl Config {
    pub fn environment(&self, name: &str) -> Result<&Environment> {
        self.environments
            .get(name)
            .ok_or_else(|| DevrouteError::config(format!("Environment '{name}' does not exist.")))
    }

    fn environment_mut(&mut self, name: &str) -> Result<&mut Environment> {
        if self.environments.is_empty() {
            return Err(DevrouteError::config(
                "No environments configured. Use 'devroute add environment' first.",
            ));
        }
        self.environments
            .get_mut(name)
            .ok_or_else(|| DevrouteError::config(format!("Environment '{name}' does not exist.")))
    }

    pub fn domain(&self, name: &str) -> Result<&DomainConfig> {
        self.domains
            .get(name)
            .ok_or_else(|| DevrouteError::config(format!("domain '{name}' does not exist")))
    }

    /// Register `location` as a domain named after its final path segment.
    pub fn add_domain(&mut self, location: &Path) -> Result<String> {
        if !location.is_dir() {
            return Err(DevrouteError::config(format!(
                "domain location {} is not an existing directory",
                location.display()
            )));
        }
        let location = fs::canonicalize(location)
            .map_err(|e| DevrouteError::filesystem(location, e))?;
        let name = last_segment(&location).ok_or_else(|| {
            DevrouteError::config(format!(
                "cannot derive a domain name from {}",
                location.display()
            ))
        })?;
        if let Some(existing) = self.domains.get(&name) {
            return Err(DevrouteError::config(format!(
                "domain {name} already exists at {}",
                existing.location.display()
            )));
        }
        self.domains.insert(
            name.clone(),
            DomainConfig {
                location,
                services: BTreeMap::new(),
            },
        );
        Ok(name)
    }

    pub fn remove_domain(&mut self, name: &str) -> Result<DomainConfig> {
        self.domains
            .remove(name)
            .ok_or_else(|| DevrouteError::config(format!("domain '{name}' does not exist")))
    }

    pub fn add_host_portmapping(
        &mut self,
        domain: &str,
        service: &str,
        host_port: u16,
        container_port: u16,
    ) -> Result<()> {
        let d = self
            .domains
            .get_mut(domain)
            .ok_or_else(|| DevrouteError::config(format!("domain '{domain}' does not exist")))?;
        let svc = d.services.entry(service.to_string()).or_default();
        if let Some(existing) = svc.host_portmappings.get(&host_port) {
            return Err(DevrouteError::PortConflict(format!(
                "host port {host_port} of '{domain}.{service}' is already mapped ({host_port}:{existing})"
            )));
        }
        svc.host_portmappings.insert(host_port, container_port);
        Ok(())
    }

    pub fn remove_host_portmapping(
        &mut self,
        domain: &str,
        service: &str,
        host_port: u16,
    ) -> Result<u16> {
        let missing = || {
            DevrouteError::config(format!(
                "port mapping '{domain}.{service}' ({host_port}:____) does not exist"
            ))
        };
        let d = self.domains.get_mut(domain).ok_or_else(missing)?;
        let svc = d.services.get_mut(service).ok_or_else(missing)?;
        let container = svc.host_portmappings.remove(&host_port).ok_or_else(missing)?;
        if svc.host_portmappings.is_empty() {
            d.services.remove(service);
        }
        Ok(container)
    }

    pub fn add_environment(&mut self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(DevrouteError::config("environment name must not be empty"));
        }
        if self.environments.contains_key(name) {
            return Err(DevrouteError::config(format!(
                "Environment '{name}' already exists."
            )));
        }
        self.environments
            .insert(name.to_string(), Environment::default());
        Ok(())
    }

    pub fn remove_environment(&mut self, name: &str) -> Result<()> {
        self.environments
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DevrouteError::config(format!("Environment '{name}' does not exist.")))
    }

    pub fn add_volume(&mut self, env: &str, container: &str, host: &str) -> Result<()> {
        let e = self.environment_mut(env)?;
        let v = Volume {
            container: container.to_string(),
            host: host.to_string(),
        };
        if e.volumes.contains(&v) {
            return Err(DevrouteError::config(format!(
                "Volume mapping already exists for environment '{env}': {host} -> {container}"
            )));
        }
        e.volumes.push(v);
        Ok(())
    }

    pub fn remove_volume(&mut self, env: &str, container: &str, host: &str) -> Result<()> {
        let e = self.environment_mut(env)?;
        let before = e.volumes.len();
        e.volumes
            .retain(|v| !(v.container == container && v.host == host));
        if e.volumes.len() == before {
            return Err(DevrouteError::config(format!(
                "Volume mapping does not exist for environment '{env}': {host} -> {container}"
            )));
        }
        Ok(())
    }

    pub fn set_serve_command(&mut self, env: &str, cmd: &str) -> Result<()> {
        reject_newlines(cmd, "serve_command")?;
        self.environment_mut(env)?.serve_command = Some(cmd.to_string());
        Ok(())
    }

    pub fn remove_serve_command(&mut self, env: &str) -> Result<()> {
        let e = self.environment_mut(env)?;
        if e.serve_command.take().is_none() {
            return Err(DevrouteError::config(format!(
                "Environment '{env}' has no custom serve_command. Use 'devroute set serve_command' first."
            )));
        }
        Ok(())
    }

    pub fn set_image_repository(&mut self, env: &str, repo: &str) -> Result<()> {
        self.environment_mut(env)?.image_repository = Some(repo.to_string());
        Ok(())
    }

    pub fn remove_image_repository(&mut self, env: &str) -> Result<()> {
        let e = self.environment_mut(env)?;
        if e.image_repository.take().is_none() {
            return Err(DevrouteError::config(format!(
                "Environment '{env}' has no custom image_repository. Use 'devroute set image_repository' first."
            )));
        }
        Ok(())
    }

    pub fn set_engine(&mut self, kind: EngineKind) {
        self.engine = kind;
    }

    pub fn set_urls_in_hosts(&mut self, enabled: bool) {
        self.urls_in_hosts = enabled;
    }

    /// Find the domain whose location is the parent of `project_dir`.
    ///
    /// Only the location counts; a folder elsewhere with the same name as a domain does not match.
    pub fn domain_for_project_dir(&self, project_dir: &Path) -> Option<(&str, &DomainConfig)> {
        let parent = project_dir.parent()?;
        let canon_parent = fs::canonicalize(parent).unwrap_or_else(|_| parent.to_path_buf());
        self.domains
            .iter()
            .find(|(_, d)| {
                fs::canonicalize(&d.location).unwrap_or_else(|_| d.location.clone())
                    == canon_parent
            })
            .map(|(name, d)| (name.as_str(), d))
    }
}

impl DomainConfig {
    pub fn host_portmappings(&self, service: &str) -> Option<&BTreeMap<u16, u16>> {
        self.services.get(service).map(|s| &s.host_portmappings)
    }
}

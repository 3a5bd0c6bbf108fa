//! Reverse-proxy artifacts rendered from the port map.
//!
//! Output order follows the port map (domain, then project), so identical
//! maps render byte-identical artifacts.

use std::fmt::Write as _;

use crate::portmap::PortMap;

/// Port every project serves on inside its container.
pub const CONTAINER_PORT: u16 = 8000;
pub const TLD: &str = "test";
pub const CONTAINER_HOSTS_ADDR: &str = "0.0.0.0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyArtifacts {
    /// Mounted as `/etc/hosts` inside project containers.
    pub hosts: String,
    /// nginx server blocks, one per project.
    pub vhosts: String,
}

pub fn project_host(project: &str, domain: &str) -> String {
    format!("{project}.{domain}.{TLD}")
}

fn server_block(out: &mut String, server_name: &str, gateway_host: &str, port: u16) {
    // writeln! on a String cannot fail
    let _ = writeln!(out, "server {{");
    let _ = writeln!(out, "    listen 80;");
    let _ = writeln!(out, "    server_name {server_name};");
    let _ = writeln!(out, "    location / {{");
    let _ = writeln!(out, "        proxy_pass http://{gateway_host}:{port}/;");
    let _ = writeln!(out, "        proxy_set_header Host $host;");
    let _ = writeln!(out, "    }}");
    let _ = writeln!(out, "}}");
    out.push('\n');
}

/// Render the container hosts fragment and the routing document.
///
/// `gateway_host` is the name under which the engine exposes the host to containers.
pub fn render(portmap: &PortMap, gateway_host: &str) -> ProxyArtifacts {
    let mut hosts = String::new();
    let _ = writeln!(hosts, "127.0.0.1   localhost");
    let _ = writeln!(hosts, "::1         localhost");

    let mut vhosts = String::new();
    for (domain, projects) in portmap.domains() {
        let _ = writeln!(hosts, "{CONTAINER_HOSTS_ADDR}   {domain}.{TLD}");
        for (project, port) in projects {
            let name = project_host(project, domain);
            let _ = writeln!(hosts, "{CONTAINER_HOSTS_ADDR}   {name}");
            server_block(&mut vhosts, &name, gateway_host, *port);
        }
    }

    ProxyArtifacts { hosts, vhosts }
}

/// Lines for the managed block in the system hosts file.
pub fn system_hosts_lines(portmap: &PortMap) -> Vec<String> {
    portmap
        .mappings()
        .map(|m| format!("127.0.0.1 {}", project_host(m.project, m.domain)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PortMap {
        let mut pm = PortMap::default();
        pm.insert("projects", "hello-world", 50101);
        pm.insert("projects", "api", 50100);
        pm.insert("clients", "shop", 50102);
        pm
    }

    #[test]
    fn test_vhosts_one_block_per_project_sorted() {
        let out = render(&sample(), "host.containers.internal");
        let names: Vec<&str> = out
            .vhosts
            .lines()
            .filter_map(|l| l.trim().strip_prefix("server_name "))
            .collect();
        assert_eq!(
            names,
            vec![
                "shop.clients.test;",
                "api.projects.test;",
                "hello-world.projects.test;"
            ]
        );
        assert!(out
            .vhosts
            .contains("proxy_pass http://host.containers.internal:50100/;"));
    }

    #[test]
    fn test_hosts_fragment_lists_domains_and_projects() {
        let out = render(&sample(), "host.docker.internal");
        let lines: Vec<&str> = out.hosts.lines().collect();
        assert_eq!(lines[0], "127.0.0.1   localhost");
        assert!(lines.contains(&"0.0.0.0   clients.test"));
        assert!(lines.contains(&"0.0.0.0   api.projects.test"));
        let domain_idx = lines
            .iter()
            .position(|l| *l == "0.0.0.0   projects.test")
            .expect("domain line");
        let project_idx = lines
            .iter()
            .position(|l| *l == "0.0.0.0   api.projects.test")
            .expect("project line");
        assert!(domain_idx < project_idx);
    }

    #[test]
    fn test_rendering_is_idempotent() {
        let pm = sample();
        assert_eq!(render(&pm, "gw"), render(&pm.clone(), "gw"));
    }

    #[test]
    fn test_empty_portmap_renders_no_routes() {
        let out = render(&PortMap::default(), "gw");
        assert!(out.vhosts.is_empty());
        assert_eq!(out.hosts.lines().count(), 2);
    }

    #[test]
    fn test_system_hosts_lines() {
        assert_eq!(
            system_hosts_lines(&sample()),
            vec![
                "127.0.0.1 shop.clients.test".to_string(),
                "127.0.0.1 api.projects.test".to_string(),
                "127.0.0.1 hello-world.projects.test".to_string(),
            ]
        );
    }
}

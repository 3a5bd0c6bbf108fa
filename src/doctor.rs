use std::path::Path;

use devroute::{
    ContainerEngine, DocumentStore, EngineGateway, EngineKind, JsonFileStore, Paths, PortMap,
};

fn value(use_color: bool, s: &str) -> String {
    devroute::paint(use_color, "\x1b[34;1m", s)
}

fn status_cell(use_color: bool, ok: bool, good: &str, bad: &str) -> String {
    let (icon, text, code) = if ok {
        ("✅", good, "\x1b[32m")
    } else {
        ("❌", bad, "\x1b[31m")
    };
    devroute::paint(use_color, code, &format!("{icon} {text}"))
}

fn tilde(path: &Path) -> String {
    let pstr = path.display().to_string();
    match home::home_dir() {
        Some(h) => {
            let home_str = h.to_string_lossy().to_string();
            match pstr.strip_prefix(&home_str) {
                Some(rest) if !home_str.is_empty() => format!("~{rest}"),
                _ => pstr,
            }
        }
        None => pstr,
    }
}

fn show_path(use_color: bool, label: &str, path: &Path) {
    let shown = tilde(path);
    let path_col: usize = 44;
    let visible_len = shown.chars().count();
    let padding = " ".repeat(path_col.saturating_sub(visible_len).max(1));
    eprintln!(
        "  {:16} {}{}{}",
        label,
        value(use_color, &shown),
        padding,
        status_cell(use_color, path.exists(), "found", "missing")
    );
}

pub(crate) fn run_doctor(verbose: bool, paths: &Paths, kind: EngineKind) {
    let use_color = devroute::color_enabled_stderr();
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("devroute doctor");
    eprintln!();
    eprintln!("  version: v{}", version);
    eprintln!(
        "  host:    {} / {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    if verbose {
        eprintln!(
            "  build:   {} ({}, {})",
            env!("DEVROUTE_BUILD_TARGET"),
            env!("DEVROUTE_BUILD_PROFILE"),
            env!("DEVROUTE_BUILD_RUSTC")
        );
    }
    eprintln!();

    eprintln!("  engine:          {}", value(use_color, kind.binary()));
    match EngineGateway::detect(kind) {
        Ok(gw) => {
            eprintln!(
                "  engine command:  {}",
                value(use_color, &gw.program().display().to_string())
            );
            let ready = gw.is_ready();
            eprintln!(
                "  engine ready:    {}",
                status_cell(use_color, ready, "yes", "no")
            );
            if gw.uses_machine() {
                let machine = gw.machine().unwrap_or("(any)");
                eprintln!("  machine:         {}", value(use_color, machine));
                let rootful = match gw.machine_rootful() {
                    Some(true) => "rootful",
                    Some(false) => "rootless",
                    None => "(unknown)",
                };
                eprintln!("  machine mode:    {}", value(use_color, rootful));
                let start = gw
                    .unprivileged_port_start()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "(unknown)".to_string());
                eprintln!(
                    "  port start:      {} {}",
                    value(use_color, &start),
                    status_cell(use_color, gw.can_bind_privileged(53), "dns ok", "dns blocked")
                );
                if verbose && !ready {
                    let hint = match gw.machine() {
                        Some(m) => format!("podman machine start {m}"),
                        None => "podman machine start".to_string(),
                    };
                    eprintln!("    tip: start the machine with '{hint}'.");
                }
            }
        }
        Err(e) => {
            eprintln!("  engine command:  (not found)");
            if verbose {
                eprintln!("    tip: {e}");
            }
        }
    }
    eprintln!();

    eprintln!(
        "  resolver:        {}",
        status_cell(use_color, devroute::resolver_configured(), "configured", "missing (run 'devroute init')")
    );
    eprintln!();

    show_path(use_color, "root", &paths.root);
    show_path(use_color, "config", &paths.config);
    show_path(use_color, "portmap", &paths.portmap);
    show_path(use_color, "nginx.conf", &paths.nginx_conf);
    show_path(use_color, "vhosts", &paths.vhost_conf);
    show_path(use_color, "dnsmasq", &paths.dnsmasq_test_conf());
    show_path(use_color, "system hosts", &paths.system_hosts);
    eprintln!();

    let config = JsonFileStore::<devroute::Config>::new(&paths.config).load();
    let portmap = JsonFileStore::<PortMap>::new(&paths.portmap).load();
    match (config, portmap) {
        (Ok(c), Ok(pm)) => {
            eprintln!(
                "  domains: {}  environments: {}  ports: {}  urls_in_hosts: {}",
                value(use_color, &c.domains.len().to_string()),
                value(use_color, &c.environments.len().to_string()),
                value(use_color, &pm.len().to_string()),
                value(use_color, if c.urls_in_hosts { "on" } else { "off" })
            );
        }
        (Err(e), _) | (_, Err(e)) => {
            devroute::log_warn_stderr(use_color, &format!("  state: {e}"));
        }
    }
}

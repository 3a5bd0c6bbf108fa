//! Container engine gateway: docker or podman behind one capability set.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use which::which;

use crate::errors::{DevrouteError, Result};
use crate::util::exec::{ExecOutput, ExecRequest, ExecService};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Docker,
    #[default]
    Podman,
}

impl EngineKind {
    pub fn binary(self) -> &'static str {
        match self {
            EngineKind::Docker => "docker",
            EngineKind::Podman => "podman",
        }
    }

    /// Name under which containers reach the host.
    pub fn gateway_host(self) -> &'static str {
        match self {
            EngineKind::Docker => "host.docker.internal",
            EngineKind::Podman => "host.containers.internal",
        }
    }

    /// Extra `run` arguments needed for `gateway_host` to resolve.
    pub fn gateway_run_args(self) -> Vec<String> {
        match self {
            EngineKind::Docker => vec![
                "--add-host".to_string(),
                "host.docker.internal:host-gateway".to_string(),
            ],
            EngineKind::Podman => Vec::new(),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

/// What the pipelines need from a container engine.
pub trait ContainerEngine {
    fn kind(&self) -> EngineKind;
    /// Path (or bare name) of the engine executable, used for attached runs.
    fn program(&self) -> &Path;
    fn is_ready(&self) -> bool;
    fn running_containers(&self) -> Result<Vec<String>>;
    /// `run -d <args>`; `args` excludes the `run -d` prefix.
    fn run_detached(&self, args: &[String]) -> Result<()>;
    /// Stop a container; a container that does not exist is not an error.
    fn stop(&self, name: &str) -> Result<()>;
    /// Force-remove a container; a container that does not exist is not an error.
    fn remove(&self, name: &str) -> Result<()>;
}

/// Locate the engine binary on PATH.
pub fn engine_path(kind: EngineKind) -> Result<PathBuf> {
    which(kind.binary()).map_err(|_| DevrouteError::EngineUnavailable {
        message: format!("{} is required but was not found in PATH.", kind.binary()),
        not_found: true,
    })
}

/// True when engine output says the named container does not exist.
pub fn is_missing_container_message(stderr: &str) -> bool {
    let s = stderr.to_ascii_lowercase();
    s.contains("no such container") || s.contains("no container with name or id")
}

/// Parse `podman machine list --format "{{.Name}} {{.Running}}"`.
///
/// With a name, that machine must be listed as running (the trailing `*`
/// marking the default machine is ignored); without one, any running machine will do.
pub fn parse_machine_list(output: &str, machine: Option<&str>) -> bool {
    let rows = output.lines().filter_map(|line| {
        let mut parts = line.split_whitespace();
        let name = parts.next()?;
        let running = parts.next()?;
        Some((name.trim_end_matches('*'), running.eq_ignore_ascii_case("true")))
    });
    match machine {
        Some(want) => rows
            .into_iter()
            .find(|(name, _)| *name == want)
            .is_some_and(|(_, running)| running),
        None => rows.into_iter().any(|(_, running)| running),
    }
}

#[derive(Debug, Clone)]
pub struct EngineGateway {
    kind: EngineKind,
    program: PathBuf,
    exec: ExecService,
    machine: Option<String>,
    check_machine: bool,
}

impl EngineGateway {
    /// Resolve the engine binary; fails with `EngineUnavailable` when absent.
    pub fn detect(kind: EngineKind) -> Result<Self> {
        let program = engine_path(kind)?;
        Ok(Self::with_program(kind, program))
    }

    pub fn with_program(kind: EngineKind, program: impl Into<PathBuf>) -> Self {
        let check_machine = kind == EngineKind::Podman
            && (cfg!(target_os = "macos") || crate::paths::machine_explicitly_set());
        EngineGateway {
            kind,
            program: program.into(),
            exec: ExecService::default(),
            machine: crate::paths::machine_from_env(),
            check_machine,
        }
    }

    pub fn machine(&self) -> Option<&str> {
        self.machine.as_deref()
    }

    /// Whether readiness depends on a podman VM rather than a local daemon.
    pub fn uses_machine(&self) -> bool {
        self.check_machine
    }

    fn request(&self) -> ExecRequest {
        ExecRequest::new(self.program.as_os_str()).capture_output(true)
    }

    fn exec(&self, request: ExecRequest) -> Result<ExecOutput> {
        self.exec
            .run(request)
            .map_err(|e| DevrouteError::Engine(format!("{e:#}")))
    }

    fn exec_ok(&self, request: ExecRequest, what: &str) -> Result<String> {
        let out = self.exec(request)?;
        if out.success() {
            Ok(out.stdout)
        } else {
            Err(DevrouteError::Engine(format!(
                "{} {what} failed ({}): {}",
                self.kind,
                out.status,
                out.stderr.trim()
            )))
        }
    }

    /// Tolerate "no such container" on stop/rm.
    fn exec_tolerant(&self, request: ExecRequest, what: &str, name: &str) -> Result<()> {
        let out = self.exec(request)?;
        if out.success() || is_missing_container_message(&out.stderr) {
            return Ok(());
        }
        Err(DevrouteError::Engine(format!(
            "{} {what} {name} failed ({}): {}",
            self.kind,
            out.status,
            out.stderr.trim()
        )))
    }

    pub fn machine_running(&self) -> bool {
        let req = self
            .request()
            .args(["machine", "list", "--format", "{{.Name}} {{.Running}}"]);
        match self.exec_ok(req, "machine list") {
            Ok(out) => parse_machine_list(&out, self.machine.as_deref()),
            Err(e) => {
                tracing::debug!("machine list: {e}");
                false
            }
        }
    }

    /// `EngineUnavailable` with a hint on how to bring the engine up.
    pub fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }
        let message = match (self.check_machine, self.machine.as_deref()) {
            (true, Some(m)) => {
                format!("Podman machine '{m}' appears to be down (podman machine start {m})")
            }
            (true, None) => {
                "No podman machine appears to be running (podman machine start)".to_string()
            }
            (false, _) => format!(
                "{} is not reachable ('{} info' failed); start the engine and retry",
                self.kind,
                self.kind.binary()
            ),
        };
        Err(DevrouteError::engine_unavailable(message))
    }

    /// `None` when no machine is configured or inspection fails.
    pub fn machine_rootful(&self) -> Option<bool> {
        let name = self.machine.as_deref()?;
        let req = self
            .request()
            .args(["machine", "inspect", name, "--format", "{{.Rootful}}"]);
        self.exec_ok(req, "machine inspect")
            .ok()
            .map(|s| s.trim().eq_ignore_ascii_case("true"))
    }

    fn machine_ssh(&self) -> ExecRequest {
        let mut req = self.request().args(["machine", "ssh"]);
        if let Some(name) = self.machine.as_deref() {
            req = req.arg(name);
        }
        req
    }

    pub fn unprivileged_port_start(&self) -> Option<u16> {
        let req = self
            .machine_ssh()
            .args(["sysctl", "-n", "net.ipv4.ip_unprivileged_port_start"]);
        self.exec_ok(req, "machine ssh sysctl")
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    /// True when the VM lets rootless containers bind `port` (always true when rootful).
    pub fn can_bind_privileged(&self, port: u16) -> bool {
        if self.machine_rootful() == Some(true) {
            return true;
        }
        self.unprivileged_port_start().is_some_and(|p| p <= port)
    }

    /// Persist `ip_unprivileged_port_start=<port>` inside the VM and reload sysctl.
    pub fn lower_unprivileged_port_start(&self, port: u16) -> Result<()> {
        let script = format!(
            "sudo sed -i '/^net\\.ipv4\\.ip_unprivileged_port_start/d' /etc/sysctl.conf; \
             echo 'net.ipv4.ip_unprivileged_port_start={port}' | sudo tee -a /etc/sysctl.conf >/dev/null; \
             sudo sysctl --system"
        );
        let req = self
            .machine_ssh()
            .args(["sh", "-c"])
            .arg(script)
            .timeout(Duration::from_secs(60));
        self.exec_ok(req, "machine ssh").map(|_| ())
    }
}

impl ContainerEngine for EngineGateway {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn program(&self) -> &Path {
        &self.program
    }

    fn is_ready(&self) -> bool {
        if self.check_machine {
            return self.machine_running();
        }
        let req = self.request().arg("info").timeout(Duration::from_secs(10));
        matches!(self.exec(req), Ok(out) if out.success())
    }

    fn running_containers(&self) -> Result<Vec<String>> {
        let req = self.request().args(["ps", "--format", "{{.Names}}"]);
        let out = self.exec_ok(req, "ps")?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn run_detached(&self, args: &[String]) -> Result<()> {
        let req = self
            .request()
            .args(["run", "-d"])
            .args(args.iter().map(String::as_str))
            .timeout(Duration::from_secs(120));
        self.exec_ok(req, "run").map(|_| ())
    }

    fn stop(&self, name: &str) -> Result<()> {
        let req = self.request().args(["stop", name]);
        self.exec_tolerant(req, "stop", name)
    }

    fn remove(&self, name: &str) -> Result<()> {
        let req = self.request().args(["rm", "-f", name]);
        self.exec_tolerant(req, "rm", name)
    }
}

//! Per-invocation container run specification for `shell` and `serve`.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::{Config, Environment};
use crate::controller::project_container_name;
use crate::errors::{DevrouteError, Result};
use crate::paths::{last_segment, Paths};
use crate::portmap::PortMap;
use crate::routing::CONTAINER_PORT;
use crate::util::{shell_join, ShellScript};

pub const APP_DIR: &str = "/app";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Shell,
    Serve,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Shell => "shell",
            RunMode::Serve => "serve",
        }
    }

    /// `shell` restarts after an OOM kill (137); `serve` after a clean exit or code 2.
    pub fn restart_policy(self) -> RestartPolicy {
        match self {
            RunMode::Shell => RestartPolicy::on([137]),
            RunMode::Serve => RestartPolicy::on([0, 2]),
        }
    }
}

/// Exit codes that relaunch the container instead of returning to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestartPolicy {
    codes: BTreeSet<i32>,
}

impl RestartPolicy {
    pub fn on(codes: impl IntoIterator<Item = i32>) -> Self {
        RestartPolicy {
            codes: codes.into_iter().collect(),
        }
    }

    pub fn should_restart(&self, code: i32) -> bool {
        self.codes.contains(&code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: PathBuf,
    pub container: String,
}

impl Mount {
    fn new(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Mount {
            host: host.into(),
            container: container.into(),
        }
    }

    fn flag_value(&self) -> String {
        format!("{}:{}", self.host.display(), self.container)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPublish {
    pub host: u16,
    pub container: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRunSpec {
    pub name: String,
    pub image: String,
    pub mode: RunMode,
    pub mounts: Vec<Mount>,
    pub ports: Vec<PortPublish>,
    pub workdir: String,
    /// `-it` instead of `-i` (shell mode only).
    pub tty: bool,
    /// `sh -c` payload run inside the container.
    pub script: String,
    pub restart: RestartPolicy,
}

impl ContainerRunSpec {
    /// Arguments after the engine binary, starting with `run`.
    pub fn run_args(&self) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];
        if self.mode == RunMode::Shell {
            args.push(if self.tty { "-it" } else { "-i" }.to_string());
        }
        args.push("--name".to_string());
        args.push(self.name.clone());
        args.push("-w".to_string());
        args.push(self.workdir.clone());
        for m in &self.mounts {
            args.push("-v".to_string());
            args.push(m.flag_value());
        }
        for p in &self.ports {
            args.push("-p".to_string());
            args.push(format!("{}:{}", p.host, p.container));
        }
        args.push(self.image.clone());
        args.push("sh".to_string());
        args.push("-c".to_string());
        args.push(self.script.clone());
        args
    }

    /// Shell-escaped command line, for `--dry-run` and logs.
    pub fn preview(&self, program: &str) -> String {
        let mut all = vec![program.to_string()];
        all.extend(self.run_args());
        shell_join(&all)
    }
}

/// Inputs for one `shell`/`serve` invocation.
#[derive(Debug, Clone)]
pub struct RunRequest<'a> {
    pub mode: RunMode,
    pub environment: Option<&'a str>,
    pub image: &'a str,
    /// Project directory the command was started from.
    pub cwd: &'a Path,
    pub tty: bool,
}

pub struct ContainerSpecBuilder<'a> {
    paths: &'a Paths,
    config: &'a Config,
    portmap: &'a PortMap,
}

impl<'a> ContainerSpecBuilder<'a> {
    pub fn new(paths: &'a Paths, config: &'a Config, portmap: &'a PortMap) -> Self {
        Self {
            paths,
            config,
            portmap,
        }
    }

    pub fn build(&self, req: &RunRequest<'_>) -> Result<ContainerRunSpec> {
        let environment = match req.environment {
            Some(name) => Some(self.config.environment(name)?),
            None if req.mode == RunMode::Serve => {
                return Err(DevrouteError::config(
                    "Environment is required for 'devroute serve' (-e/--environment).",
                ))
            }
            None => None,
        };

        let serve_command = match (req.mode, environment) {
            (RunMode::Serve, Some(env)) => Some(
                env.serve_command
                    .as_deref()
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| {
                        DevrouteError::config(format!(
                            "Environment '{}' has no serve_command. Use 'devroute set serve_command' first.",
                            req.environment.unwrap_or_default()
                        ))
                    })?,
            ),
            _ => None,
        };

        let project = last_segment(req.cwd).ok_or_else(|| {
            DevrouteError::config(format!("{} is not a project folder", req.cwd.display()))
        })?;
        let (domain_name, domain) =
            self.config.domain_for_project_dir(req.cwd).ok_or_else(|| {
                let parent = req
                    .cwd
                    .parent()
                    .and_then(last_segment)
                    .unwrap_or_default();
                DevrouteError::config(format!(
                    "domain, {parent}, does not exist in devroute's domain configuration."
                ))
            })?;

        let mut mounts = vec![
            Mount::new(req.cwd, APP_DIR),
            Mount::new(&self.paths.hosts_container, "/etc/hosts"),
            Mount::new(&self.paths.nginx_conf, "/etc/nginx/nginx.conf"),
            Mount::new(&self.paths.vhost_conf, "/etc/nginx/http.d/vhost_docker.conf"),
        ];
        if let Some(env) = environment {
            mounts.extend(environment_mounts(env, req.cwd)?);
        }

        let mut ports: Vec<PortPublish> = domain
            .host_portmappings(&project)
            .into_iter()
            .flatten()
            .map(|(h, c)| PortPublish {
                host: *h,
                container: *c,
            })
            .collect();
        let rev_port = self.portmap.get(domain_name, &project).ok_or_else(|| {
            DevrouteError::config(format!(
                "port not yet assigned to {project}, run 'devroute deploy'"
            ))
        })?;
        ports.push(PortPublish {
            host: rev_port,
            container: CONTAINER_PORT,
        });

        let image = match environment {
            Some(env) => env.resolve_image(req.image),
            None => req.image.to_string(),
        };

        Ok(ContainerRunSpec {
            name: project_container_name(domain_name, &project),
            image,
            mode: req.mode,
            mounts,
            ports,
            workdir: APP_DIR.to_string(),
            tty: req.tty,
            script: startup_script(req.mode, serve_command)?,
            restart: req.mode.restart_policy(),
        })
    }
}

fn environment_mounts(env: &Environment, cwd: &Path) -> Result<Vec<Mount>> {
    env.volumes
        .iter()
        .map(|v| {
            let host = v.resolve_host(cwd);
            if !host.exists() {
                return Err(DevrouteError::filesystem(
                    &host,
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("volume '{}' does not appear to exist", v.host),
                    ),
                ));
            }
            Ok(Mount::new(host, v.container.clone()))
        })
        .collect()
}

/// Start nginx when the image has it, then open a shell or run the serve command.
pub fn startup_script(mode: RunMode, serve_command: Option<&str>) -> Result<String> {
    let mut script = ShellScript::new();
    script.push(
        "if command -v nginx >/dev/null 2>&1; then echo \"Starting nginx...\"; nginx; \
         else echo \"nginx not found, skipping\"; fi",
    );
    match mode {
        RunMode::Shell => {
            script.extend([
                "echo \"\"",
                "echo \"To leave this shell and stop the container, type: \x1b[33mexit\x1b[0m\"",
                "echo \"\"",
            ]
            .map(String::from));
            script.push(format!("cd {APP_DIR}"));
            script.push("exec sh");
        }
        RunMode::Serve => {
            script.push(format!("cd {APP_DIR}"));
            script.push(serve_command.unwrap_or("true"));
        }
    }
    script
        .build()
        .map_err(|e| DevrouteError::config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Volume;
    use std::fs;

    struct Fixture {
        _td: tempfile::TempDir,
        paths: Paths,
        config: Config,
        portmap: PortMap,
        project_dir: PathBuf,
    }

    fn fixture() -> Fixture {
        let td = tempfile::tempdir().expect("tmpdir");
        let domain_dir = td.path().join("projects");
        let project_dir = domain_dir.join("api");
        fs::create_dir_all(&project_dir).expect("mkdir");
        let mut config = Config::default();
        config.add_domain(&domain_dir).expect("domain");
        config
            .add_host_portmapping("projects", "api", 5432, 5432)
            .expect("portmap");
        config.add_environment("python").expect("env");
        config
            .set_image_repository("python", "docker.io/library/python")
            .expect("repo");
        let mut portmap = PortMap::default();
        portmap.insert("projects", "api", 50100);
        Fixture {
            paths: Paths::under(td.path().join("root")),
            _td: td,
            config,
            portmap,
            project_dir,
        }
    }

    fn request<'a>(f: &'a Fixture, mode: RunMode, env: Option<&'a str>) -> RunRequest<'a> {
        RunRequest {
            mode,
            environment: env,
            image: "3.12",
            cwd: &f.project_dir,
            tty: true,
        }
    }

    #[test]
    fn test_shell_spec_layout() {
        let f = fixture();
        let spec = ContainerSpecBuilder::new(&f.paths, &f.config, &f.portmap)
            .build(&request(&f, RunMode::Shell, Some("python")))
            .expect("spec");
        assert_eq!(spec.name, "devroute_projects_api");
        assert_eq!(spec.image, "docker.io/library/python:3.12");
        assert_eq!(spec.mounts[0].container, "/app");
        assert_eq!(spec.mounts[1].container, "/etc/hosts");
        assert_eq!(spec.mounts[1].host, f.paths.hosts_container);
        assert_eq!(
            spec.ports,
            vec![
                PortPublish { host: 5432, container: 5432 },
                PortPublish { host: 50100, container: 8000 },
            ]
        );
        assert!(spec.restart.should_restart(137));
        assert!(!spec.restart.should_restart(0));
        assert!(spec.script.ends_with("cd /app; exec sh"), "{}", spec.script);

        let args = spec.run_args();
        assert_eq!(&args[..3], &["run", "--rm", "-it"]);
        let img = args
            .iter()
            .position(|a| a == "docker.io/library/python:3.12")
            .expect("image arg");
        assert_eq!(&args[img + 1..img + 3], &["sh", "-c"]);
    }

    #[test]
    fn test_shell_without_tty_uses_interactive_only() {
        let f = fixture();
        let mut req = request(&f, RunMode::Shell, None);
        req.tty = false;
        let spec = ContainerSpecBuilder::new(&f.paths, &f.config, &f.portmap)
            .build(&req)
            .expect("spec");
        assert_eq!(spec.image, "3.12");
        assert_eq!(spec.run_args()[2], "-i");
    }

    #[test]
    fn test_serve_requires_serve_command() {
        let f = fixture();
        let err = ContainerSpecBuilder::new(&f.paths, &f.config, &f.portmap)
            .build(&request(&f, RunMode::Serve, Some("python")))
            .expect_err("no serve_command");
        assert!(matches!(err, DevrouteError::Config(_)));
        assert!(err.to_string().contains("serve_command"), "{err}");
    }

    #[test]
    fn test_serve_spec_runs_command_without_tty_flags() {
        let mut f = fixture();
        f.config
            .set_serve_command("python", "python -m http.server 8000")
            .expect("set");
        let spec = ContainerSpecBuilder::new(&f.paths, &f.config, &f.portmap)
            .build(&request(&f, RunMode::Serve, Some("python")))
            .expect("spec");
        assert!(spec
            .script
            .ends_with("cd /app; python -m http.server 8000"));
        assert!(spec.restart.should_restart(0));
        assert!(spec.restart.should_restart(2));
        assert!(!spec.restart.should_restart(1));
        let args = spec.run_args();
        assert!(!args.iter().any(|a| a == "-it" || a == "-i"), "{args:?}");
    }

    #[test]
    fn test_unknown_domain_is_config_error() {
        let f = fixture();
        let elsewhere = f._td.path().join("other").join("thing");
        fs::create_dir_all(&elsewhere).expect("mkdir");
        let req = RunRequest {
            cwd: &elsewhere,
            ..request(&f, RunMode::Shell, None)
        };
        let err = ContainerSpecBuilder::new(&f.paths, &f.config, &f.portmap)
            .build(&req)
            .expect_err("no domain");
        assert!(err.to_string().contains("domain, other,"), "{err}");
    }

    #[test]
    fn test_same_named_folder_outside_domain_is_config_error() {
        let f = fixture();
        let stray = f._td.path().join("elsewhere").join("projects").join("api");
        fs::create_dir_all(&stray).expect("mkdir");
        let req = RunRequest {
            cwd: &stray,
            ..request(&f, RunMode::Shell, None)
        };
        let err = ContainerSpecBuilder::new(&f.paths, &f.config, &f.portmap)
            .build(&req)
            .expect_err("not under the domain location");
        assert!(matches!(err, DevrouteError::Config(_)), "{err:?}");
        assert!(err.to_string().contains("domain, projects,"), "{err}");
    }

    #[test]
    fn test_missing_port_asks_for_deploy() {
        let f = fixture();
        let empty = PortMap::default();
        let err = ContainerSpecBuilder::new(&f.paths, &f.config, &empty)
            .build(&request(&f, RunMode::Shell, None))
            .expect_err("no port");
        assert!(err.to_string().contains("run 'devroute deploy'"), "{err}");
    }

    #[test]
    fn test_volume_placeholder_resolved_and_checked() {
        let mut f = fixture();
        fs::create_dir(f.project_dir.join("data")).expect("mkdir");
        f.config.environments.insert(
            "data".to_string(),
            Environment {
                volumes: vec![Volume {
                    container: "/data".to_string(),
                    host: "{pwd}/data".to_string(),
                }],
                ..Environment::default()
            },
        );
        let spec = ContainerSpecBuilder::new(&f.paths, &f.config, &f.portmap)
            .build(&request(&f, RunMode::Shell, Some("data")))
            .expect("spec");
        let m = spec.mounts.last().expect("volume");
        assert_eq!(m.host, f.project_dir.join("data"));
        assert_eq!(m.container, "/data");

        f.config.environments.get_mut("data").expect("env").volumes[0].host =
            "{pwd}/absent".to_string();
        let err = ContainerSpecBuilder::new(&f.paths, &f.config, &f.portmap)
            .build(&request(&f, RunMode::Shell, Some("data")))
            .expect_err("missing volume");
        assert!(matches!(err, DevrouteError::Filesystem { .. }), "{err:?}");
    }

    #[test]
    fn test_preview_quotes_script() {
        let f = fixture();
        let spec = ContainerSpecBuilder::new(&f.paths, &f.config, &f.portmap)
            .build(&request(&f, RunMode::Shell, None))
            .expect("spec");
        let preview = spec.preview("podman");
        assert!(preview.starts_with("podman run --rm -it --name devroute_projects_api"));
        assert!(preview.contains("'if command -v nginx"), "{preview}");
    }
}

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};

use devroute::deploy::observe;
use devroute::engine::engine_path;
use devroute::paths::{MACHINE_ENV, ROOT_ENV};
use devroute::routing::project_host;
use devroute::{
    acquire_lock_at, allocate, bootstrap, shellrc, Config, ContainerSpecBuilder,
    Deployer, DocumentStore, EngineGateway, EngineKind, EngineRunner, JsonFileStore, Paths,
    PortMap, ProcessSupervisor, RunMode, RunRequest,
};

use crate::cli::{AddCmd, Cli, Command, RmCmd, SetCmd};
use crate::doctor::run_doctor;

fn config_store(paths: &Paths) -> JsonFileStore<Config> {
    JsonFileStore::new(&paths.config)
}

fn portmap_store(paths: &Paths) -> JsonFileStore<PortMap> {
    JsonFileStore::new(&paths.portmap)
}

fn info(msg: &str) {
    devroute::log_info_stderr(devroute::color_enabled_stderr(), msg);
}

fn finish(res: Result<()>) -> ExitCode {
    match res {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            devroute::log_error_stderr(
                devroute::color_enabled_stderr(),
                &format!("devroute: {e:#}"),
            );
            ExitCode::from(devroute::exit_code_for_anyhow(&e))
        }
    }
}

pub(crate) fn dispatch(cli: &Cli, paths: &Paths) -> ExitCode {
    match &cli.command {
        Command::Init => finish(run_init(cli, paths)),
        Command::Deploy => finish(run_deploy(cli, paths)),
        Command::Shell { environment, image } => {
            run_container(cli, paths, RunMode::Shell, environment.as_deref(), image)
        }
        Command::Serve { environment, image } => {
            run_container(cli, paths, RunMode::Serve, Some(environment.as_str()), image)
        }
        Command::Urls { json } => finish(run_urls(paths, *json)),
        Command::Doctor => {
            let kind = config_store(paths)
                .load()
                .map(|c| c.engine)
                .unwrap_or_default();
            run_doctor(cli.verbose, paths, kind);
            ExitCode::from(0)
        }
        Command::Add { what } => finish(run_add(paths, what)),
        Command::Rm { what } => finish(run_rm(paths, what)),
        Command::Set { what } => finish(run_set(paths, what)),
    }
}

fn run_init(cli: &Cli, paths: &Paths) -> Result<()> {
    info("Running initialization");
    if cli.dry_run {
        eprintln!(
            "devroute: dry-run: would write dnsmasq and nginx files under {}",
            paths.root.display()
        );
    } else {
        let use_color = devroute::color_enabled_stderr();
        for p in bootstrap::write_root_files(paths)? {
            let shown = p.display().to_string();
            eprintln!("{} created", devroute::paint(use_color, devroute::GREEN, &shown));
        }
    }

    if cfg!(target_os = "macos") {
        if cli.dry_run {
            eprintln!("devroute: dry-run: would write {}", devroute::RESOLVER_FILE);
        } else if !bootstrap::resolver_configured() {
            bootstrap::write_resolver()?;
            eprintln!("{} created", devroute::RESOLVER_FILE);
        }
    } else {
        devroute::warn_print(&format!(
            "{} is only used on macOS; point your resolver for .test at 127.0.0.1 manually",
            devroute::RESOLVER_FILE
        ));
    }

    let config = config_store(paths).load()?;
    if config.engine != EngineKind::Podman {
        return Ok(());
    }
    let engine = match EngineGateway::detect(config.engine) {
        Ok(engine) => engine,
        Err(e) => {
            devroute::warn_print(&format!("{e}; skipping podman machine setup"));
            return Ok(());
        }
    };
    if !engine.uses_machine() {
        return Ok(());
    }
    let machine = engine.machine().unwrap_or("(default)").to_string();
    if engine.machine_rootful() == Some(true) {
        info(&format!(
            "Podman machine '{machine}' is rootful; skipping ip_unprivileged_port_start configuration."
        ));
        return Ok(());
    }
    if cli.dry_run {
        eprintln!("devroute: dry-run: would lower ip_unprivileged_port_start in '{machine}'");
        return Ok(());
    }
    info(&format!("Configuring unprivileged ports in podman machine {machine}..."));
    match engine.lower_unprivileged_port_start(bootstrap::DNS_PORT) {
        Ok(()) => info("net.ipv4.ip_unprivileged_port_start=53 set inside podman machine."),
        Err(e) => devroute::warn_print(&format!(
            "failed to configure unprivileged port 53 inside podman machine ({e}); you may need to run this manually"
        )),
    }
    Ok(())
}

fn run_deploy(cli: &Cli, paths: &Paths) -> Result<()> {
    let _lock = acquire_lock_at(&paths.lock)?;
    let configs = config_store(paths);
    let portmaps = portmap_store(paths);
    let config = configs.load()?;

    if cli.dry_run {
        let prior = portmaps.load()?;
        let (observed, failures) = observe(&config, &prior);
        for f in &failures {
            devroute::warn_print(&format!("domain {}: {}", f.domain, f.error));
        }
        let next = allocate(&prior, &observed)?;
        println!("{}", serde_json::to_string_pretty(&next)?);
        eprintln!("devroute: dry-run requested; nothing written, engine untouched.");
        return Ok(());
    }

    let engine = EngineGateway::detect(config.engine)?;
    engine.ensure_ready()?;
    info("Deploying Container Development");

    let report = Deployer::new(paths, &configs, &portmaps, &engine)
        .run()
        .context("deploy failed")?;

    for f in &report.failures {
        devroute::warn_print(&format!("domain {} skipped: {}", f.domain, f.error));
    }
    let use_color = devroute::color_enabled_stderr();
    for h in &report.added {
        eprintln!("  + {}", devroute::paint(use_color, devroute::BLUE, h));
    }
    for h in &report.removed {
        eprintln!("  - {h}");
    }
    if report.system_hosts_changed {
        eprintln!("updated {}", paths.system_hosts.display());
    }
    info(&format!("{} project(s) routed", report.portmap.len()));
    Ok(())
}

fn run_container(
    cli: &Cli,
    paths: &Paths,
    mode: RunMode,
    environment: Option<&str>,
    image: &str,
) -> ExitCode {
    let prepared = (|| -> Result<_> {
        let config = config_store(paths).load()?;
        let portmap = portmap_store(paths).load()?;
        let cwd = env::current_dir().context("cannot determine current directory")?;
        let cwd = fs::canonicalize(&cwd).unwrap_or(cwd);
        let tty = atty::is(atty::Stream::Stdin) || atty::is(atty::Stream::Stdout);
        let spec = ContainerSpecBuilder::new(paths, &config, &portmap).build(&RunRequest {
            mode,
            environment,
            image,
            cwd: &cwd,
            tty,
        })?;
        Ok((config.engine, spec))
    })();
    let (kind, spec) = match prepared {
        Ok(v) => v,
        Err(e) => return finish(Err(e)),
    };

    if cli.verbose || cli.dry_run {
        let program = engine_path(kind).unwrap_or_else(|_| PathBuf::from(kind.binary()));
        eprintln!(
            "devroute: {}: {}",
            kind,
            spec.preview(&program.to_string_lossy())
        );
    }
    if cli.dry_run {
        eprintln!("devroute: dry-run requested; not executing {kind}.");
        return ExitCode::from(0);
    }

    let run = (|| -> Result<_> {
        let engine = EngineGateway::detect(kind)?;
        engine.ensure_ready()?;
        let mut supervisor = ProcessSupervisor::new(EngineRunner::new(&engine));
        Ok(supervisor.run(&spec)?)
    })();
    match run {
        Ok(outcome) => {
            tracing::debug!(
                "{} {} finished: {:?}",
                mode.as_str(),
                spec.name,
                outcome
            );
            ExitCode::from(outcome.exit_code())
        }
        Err(e) => finish(Err(e)),
    }
}

fn run_urls(paths: &Paths, json: bool) -> Result<()> {
    let portmap = portmap_store(paths).load()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&portmap)?);
        return Ok(());
    }
    let use_color = devroute::color_enabled_stdout();
    println!();
    for (domain, projects) in portmap.domains() {
        println!("{}", devroute::paint(use_color, devroute::GREEN, domain));
        for (project, port) in projects {
            let host = project_host(project, domain);
            let shown = match host.strip_prefix(project.as_str()) {
                Some(rest) => format!("{}{rest}", devroute::paint(use_color, devroute::BLUE, project)),
                None => host,
            };
            println!("  http://{shown} ({port})");
        }
    }
    Ok(())
}

/// Load, edit and save the configuration under the store lock.
fn edit_config<F>(paths: &Paths, edit: F) -> Result<()>
where
    F: FnOnce(&mut Config) -> devroute::Result<String>,
{
    let _lock = acquire_lock_at(&paths.lock)?;
    let store = config_store(paths);
    let mut config = store.load()?;
    let msg = edit(&mut config)?;
    store.save(&config)?;
    info(&msg);
    Ok(())
}

fn run_add(paths: &Paths, what: &AddCmd) -> Result<()> {
    match what {
        AddCmd::Domain { location } => {
            let location = devroute::paths::expand_tilde(location);
            edit_config(paths, |c| {
                let name = c.add_domain(&location)?;
                Ok(format!("domain '{name}' added ({})", location.display()))
            })
        }
        AddCmd::Environment { name } => edit_config(paths, |c| {
            c.add_environment(name)?;
            Ok(format!("environment '{name}' added"))
        }),
        AddCmd::Portmap {
            domain,
            service,
            host_port,
            container_port,
        } => edit_config(paths, |c| {
            c.add_host_portmapping(domain, service, *host_port, *container_port)?;
            Ok(format!(
                "{service}.{domain}: host port {host_port} -> container port {container_port}"
            ))
        }),
        AddCmd::Volume {
            environment,
            container_dir,
            host_dir,
        } => edit_config(paths, |c| {
            c.add_volume(environment, container_dir, host_dir)?;
            Ok(format!("volume {host_dir}:{container_dir} added to '{environment}'"))
        }),
    }
}

fn rc_message(action: &str, rc: &std::path::Path) -> String {
    format!(
        "{action} in {}. Restart your shell or run 'source {}' to apply.",
        rc.display(),
        rc.display()
    )
}

fn run_rm(paths: &Paths, what: &RmCmd) -> Result<()> {
    match what {
        RmCmd::Domain { name } => {
            edit_config(paths, |c| {
                c.remove_domain(name)?;
                Ok(format!("domain '{name}' removed"))
            })?;
            let _lock = acquire_lock_at(&paths.lock)?;
            let store = portmap_store(paths);
            let mut portmap = store.load()?;
            if portmap.remove_domain(name) {
                store.save(&portmap)?;
            }
            Ok(())
        }
        RmCmd::Environment { name } => edit_config(paths, |c| {
            c.remove_environment(name)?;
            Ok(format!("environment '{name}' removed"))
        }),
        RmCmd::Portmap {
            domain,
            service,
            host_port,
        } => edit_config(paths, |c| {
            c.remove_host_portmapping(domain, service, *host_port)?;
            Ok(format!("{service}.{domain}: host port {host_port} removed"))
        }),
        RmCmd::Volume {
            environment,
            container_dir,
            host_dir,
        } => edit_config(paths, |c| {
            c.remove_volume(environment, container_dir, host_dir)?;
            Ok(format!("volume {host_dir}:{container_dir} removed from '{environment}'"))
        }),
        RmCmd::ServeCommand { environment } => edit_config(paths, |c| {
            c.remove_serve_command(environment)?;
            Ok(format!("serve_command removed from '{environment}'"))
        }),
        RmCmd::ImageRepository { environment } => edit_config(paths, |c| {
            c.remove_image_repository(environment)?;
            Ok(format!("image_repository removed from '{environment}'"))
        }),
        RmCmd::Root { rc } => remove_rc_export(ROOT_ENV, rc.as_deref()),
        RmCmd::Machine { rc } => remove_rc_export(MACHINE_ENV, rc.as_deref()),
    }
}

fn remove_rc_export(name: &str, rc: Option<&str>) -> Result<()> {
    let rc = shellrc::rc_path(rc);
    if shellrc::remove_export(&rc, name)? {
        info(&rc_message(&format!("Removed {name}"), &rc));
    } else {
        info(&format!("No {name} entry found in {}.", rc.display()));
    }
    Ok(())
}

fn set_rc_export(name: &str, value: &str, rc: Option<&str>) -> Result<()> {
    let rc = shellrc::rc_path(rc);
    shellrc::set_export(&rc, name, value)?;
    info(&rc_message(&format!("{name} set to '{value}'"), &rc));
    Ok(())
}

fn run_set(paths: &Paths, what: &SetCmd) -> Result<()> {
    match what {
        SetCmd::ServeCommand {
            environment,
            serve_command,
        } => edit_config(paths, |c| {
            c.set_serve_command(environment, serve_command)?;
            Ok(format!("serve_command for '{environment}' set to '{serve_command}'"))
        }),
        SetCmd::ImageRepository {
            environment,
            image_repository,
        } => edit_config(paths, |c| {
            c.set_image_repository(environment, image_repository)?;
            Ok(format!(
                "image_repository for '{environment}' set to '{image_repository}'"
            ))
        }),
        SetCmd::Engine { engine } => edit_config(paths, |c| {
            c.set_engine(*engine);
            Ok(format!("engine set to {engine}; run 'devroute deploy' to apply"))
        }),
        SetCmd::UrlsInHosts { enabled } => edit_config(paths, |c| {
            c.set_urls_in_hosts(*enabled);
            Ok(format!(
                "urls_in_hosts {}; run 'devroute deploy' to apply",
                if *enabled { "enabled" } else { "disabled" }
            ))
        }),
        SetCmd::Root { path, rc } => set_rc_export(ROOT_ENV, path, rc.as_deref()),
        SetCmd::Machine { name, rc } => set_rc_export(MACHINE_ENV, name, rc.as_deref()),
    }
}

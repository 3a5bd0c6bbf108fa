mod support;

use std::fs;
use std::process::Command;

use devroute::{DocumentStore, JsonFileStore, PortMap};
use support::{describe, run_devroute, Fixture};

fn seeded() -> Fixture {
    let fx = Fixture::new(&["api", "hello-world"]);
    let domain = fx.domain_dir.display().to_string();
    let out = run_devroute(&fx.paths.root, fx.td.path(), &["add", "domain", &domain]);
    assert!(out.status.success(), "{}", describe(&out));
    fx
}

fn write_ports(fx: &Fixture) {
    let mut pm = PortMap::default();
    pm.insert("projects", "api", 50100);
    pm.insert("projects", "hello-world", 50101);
    JsonFileStore::<PortMap>::new(&fx.paths.portmap)
        .save(&pm)
        .expect("save portmap");
}

#[test]
fn test_add_domain_records_canonical_location() {
    let fx = seeded();
    let raw = fs::read_to_string(&fx.paths.config).expect("config written");
    let v: serde_json::Value = serde_json::from_str(&raw).expect("json");
    let loc = v["domains"]["projects"]["location"]
        .as_str()
        .expect("location");
    assert_eq!(
        fs::canonicalize(loc).expect("canon"),
        fs::canonicalize(&fx.domain_dir).expect("canon")
    );

    let again = run_devroute(
        &fx.paths.root,
        fx.td.path(),
        &["add", "domain", &fx.domain_dir.display().to_string()],
    );
    assert_eq!(again.status.code(), Some(1), "{}", describe(&again));
    assert!(String::from_utf8_lossy(&again.stderr).contains("already exists"));
}

#[test]
fn test_deploy_dry_run_prints_port_map_without_writing() {
    let fx = seeded();
    let out = run_devroute(&fx.paths.root, fx.td.path(), &["deploy", "--dry-run"]);
    assert!(out.status.success(), "{}", describe(&out));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json on stdout");
    assert_eq!(v["projects"]["api"], 50100);
    assert_eq!(v["projects"]["hello-world"], 50101);
    assert!(!fx.paths.portmap.exists());
    assert!(!fx.paths.vhost_conf.exists());
}

#[test]
fn test_shell_dry_run_previews_engine_command() {
    let fx = seeded();
    write_ports(&fx);
    let project = fx.domain_dir.join("hello-world");
    let out = run_devroute(&fx.paths.root, &project, &["--dry-run", "shell", "alpine"]);
    assert!(out.status.success(), "{}", describe(&out));
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("devroute: podman:"), "stderr:\n{err}");
    assert!(err.contains("devroute_projects_hello-world"), "stderr:\n{err}");
    assert!(err.contains("50101:8000"), "stderr:\n{err}");
    assert!(err.contains("dry-run requested"), "stderr:\n{err}");
}

#[test]
fn test_shell_before_deploy_explains_missing_port() {
    let fx = seeded();
    let project = fx.domain_dir.join("api");
    let out = run_devroute(&fx.paths.root, &project, &["--dry-run", "shell", "alpine"]);
    assert_eq!(out.status.code(), Some(1), "{}", describe(&out));
    assert!(String::from_utf8_lossy(&out.stderr).contains("run 'devroute deploy'"));
}

#[test]
fn test_serve_without_serve_command_fails() {
    let fx = seeded();
    write_ports(&fx);
    let out = run_devroute(&fx.paths.root, fx.td.path(), &["add", "environment", "node"]);
    assert!(out.status.success(), "{}", describe(&out));

    let project = fx.domain_dir.join("api");
    let out = run_devroute(&fx.paths.root, &project, &["serve", "-e", "node", "20"]);
    assert_eq!(out.status.code(), Some(1), "{}", describe(&out));
    assert!(String::from_utf8_lossy(&out.stderr).contains("has no serve_command"));
}

#[test]
fn test_urls_json_lists_port_map() {
    let fx = seeded();
    write_ports(&fx);
    let out = run_devroute(&fx.paths.root, fx.td.path(), &["urls", "--json"]);
    assert!(out.status.success(), "{}", describe(&out));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(v["projects"]["api"], 50100);

    let out = run_devroute(&fx.paths.root, fx.td.path(), &["urls"]);
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("http://hello-world.projects.test (50101)"), "{text}");
}

#[test]
fn test_set_urls_in_hosts_and_engine_persist() {
    let fx = seeded();
    for args in [["set", "urls_in_hosts", "on"], ["set", "engine", "docker"]] {
        let out = run_devroute(&fx.paths.root, fx.td.path(), &args);
        assert!(out.status.success(), "{}", describe(&out));
    }
    let raw = fs::read_to_string(&fx.paths.config).expect("config");
    let v: serde_json::Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(v["urls_in_hosts"], true);
    assert_eq!(v["engine"], "docker");
}

#[test]
fn test_set_and_remove_root_export_in_rc_file() {
    let fx = seeded();
    let rc = fx.td.path().join("zshrc");
    fs::write(&rc, "alias ll='ls -l'\n").expect("write rc");
    let rc_arg = rc.display().to_string();

    let out = run_devroute(
        &fx.paths.root,
        fx.td.path(),
        &["set", "root", "/srv/devroute", "-z", &rc_arg],
    );
    assert!(out.status.success(), "{}", describe(&out));
    let contents = fs::read_to_string(&rc).expect("rc");
    assert!(contents.starts_with("alias ll='ls -l'\n"));
    assert!(contents.contains("export DEVROUTE_ROOT=\"/srv/devroute\""));

    let out = run_devroute(&fx.paths.root, fx.td.path(), &["rm", "root", "-z", &rc_arg]);
    assert!(out.status.success(), "{}", describe(&out));
    assert!(!fs::read_to_string(&rc)
        .expect("rc")
        .contains("DEVROUTE_ROOT"));
}

#[test]
fn test_deploy_without_engine_exits_127() {
    let fx = seeded();
    let out = Command::new(support::bin())
        .arg("deploy")
        .current_dir(fx.td.path())
        .env("DEVROUTE_ROOT", &fx.paths.root)
        .env("NO_COLOR", "1")
        .env("PATH", "")
        .output()
        .expect("run devroute");
    assert_eq!(out.status.code(), Some(127), "{}", describe(&out));
}

#[test]
fn test_doctor_succeeds_without_engine() {
    let fx = seeded();
    let out = Command::new(support::bin())
        .arg("doctor")
        .current_dir(fx.td.path())
        .env("DEVROUTE_ROOT", &fx.paths.root)
        .env("NO_COLOR", "1")
        .env("PATH", "")
        .output()
        .expect("run devroute doctor");
    assert!(out.status.success(), "{}", describe(&out));
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("engine command:  (not found)"), "stderr:\n{err}");
    assert!(err.contains("domains: 1"), "stderr:\n{err}");
}

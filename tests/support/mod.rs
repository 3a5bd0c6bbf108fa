/*!
Test support helpers shared across integration tests.

- FakeEngine: in-memory ContainerEngine recording every call
- Fixture: temp state root, hosts file and a domain folder with projects
- bin(): path to the devroute binary under test

Helpers do not print; tests decide what to report.
*/

#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use devroute::errors::{DevrouteError, Result};
use devroute::{ContainerEngine, EngineKind, Paths};

/// Records calls and tracks a set of "running" container names.
#[derive(Default)]
pub struct FakeEngine {
    pub kind: EngineKind,
    pub running: RefCell<Vec<String>>,
    pub calls: RefCell<Vec<String>>,
    /// Fail `run -d` for containers whose name is listed here.
    pub fail_run_for: Vec<String>,
}

impl FakeEngine {
    pub fn with_running(kind: EngineKind, names: &[&str]) -> Self {
        FakeEngine {
            kind,
            running: RefCell::new(names.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn runs(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with("run "))
            .collect()
    }
}

fn name_arg(args: &[String]) -> Option<String> {
    args.iter()
        .position(|a| a == "--name")
        .and_then(|i| args.get(i + 1))
        .cloned()
}

impl ContainerEngine for FakeEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }
    fn program(&self) -> &Path {
        Path::new("fake-engine")
    }
    fn is_ready(&self) -> bool {
        true
    }
    fn running_containers(&self) -> Result<Vec<String>> {
        Ok(self.running.borrow().clone())
    }
    fn run_detached(&self, args: &[String]) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("run {}", args.join(" ")));
        let name = name_arg(args).unwrap_or_default();
        if self.fail_run_for.contains(&name) {
            return Err(DevrouteError::Engine(format!(
                "Error: cannot listen on port 80 ({name})"
            )));
        }
        self.running.borrow_mut().push(name);
        Ok(())
    }
    fn stop(&self, name: &str) -> Result<()> {
        self.calls.borrow_mut().push(format!("stop {name}"));
        self.running.borrow_mut().retain(|n| n != name);
        Ok(())
    }
    fn remove(&self, name: &str) -> Result<()> {
        self.calls.borrow_mut().push(format!("rm {name}"));
        Ok(())
    }
}

/// A temp directory holding the devroute root, a hosts file and one domain.
pub struct Fixture {
    pub td: tempfile::TempDir,
    pub paths: Paths,
    pub domain_dir: PathBuf,
}

impl Fixture {
    /// Domain folder `projects` with the given project subfolders.
    pub fn new(projects: &[&str]) -> Self {
        let td = tempfile::tempdir().expect("tmpdir");
        let root = td.path().join("root");
        let hosts = td.path().join("hosts");
        fs::write(&hosts, "127.0.0.1 localhost\n").expect("write hosts");
        let domain_dir = td.path().join("projects");
        fs::create_dir_all(&domain_dir).expect("mkdir domain");
        for p in projects {
            fs::create_dir_all(domain_dir.join(p)).expect("mkdir project");
        }
        let paths = Paths::under(&root).with_system_hosts(&hosts);
        Fixture {
            td,
            paths,
            domain_dir,
        }
    }

    pub fn add_project(&self, name: &str) {
        fs::create_dir_all(self.domain_dir.join(name)).expect("mkdir project");
    }

    pub fn remove_project(&self, name: &str) {
        fs::remove_dir_all(self.domain_dir.join(name)).expect("rm project");
    }

    pub fn read(&self, p: &Path) -> String {
        fs::read_to_string(p).unwrap_or_default()
    }
}

pub fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_devroute")
}

/// Run the binary with an isolated state root and no color.
pub fn run_devroute(root: &Path, cwd: &Path, args: &[&str]) -> Output {
    Command::new(bin())
        .args(args)
        .current_dir(cwd)
        .env("DEVROUTE_ROOT", root)
        .env("DEVROUTE_SYSTEM_HOSTS", root.join("hosts"))
        .env("NO_COLOR", "1")
        .env_remove("DEVROUTE_LOG")
        .env_remove("DEVROUTE_MACHINE")
        .output()
        .expect("run devroute")
}

pub fn describe(out: &Output) -> String {
    format!(
        "status: {:?}\nstdout:\n{}\nstderr:\n{}",
        out.status.code(),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    )
}

//! devroute: stable ports and `.test` hostnames for local projects.
//!
//! Architecture
//! - Binary glue (src/main.rs) parses the CLI and dispatches to `commands`.
//! - Deploy pipeline: `scanner` -> `portmap::allocate` -> `routing::render` ->
//!   `hosts` managed block -> `controller` (proxy restart, stale containers, DNS helper).
//! - Run pipeline: `run_spec::ContainerSpecBuilder` -> `supervisor::ProcessSupervisor`.
//! - `engine`: docker/podman behind `ContainerEngine`; `store`: JSON documents
//!   behind `DocumentStore` plus the single-writer lock.
//!
//! Environment
//! - DEVROUTE_ROOT: state directory (default `~/.devroute`).
//! - DEVROUTE_MACHINE: podman machine name; empty means any running machine.
//! - DEVROUTE_SYSTEM_HOSTS: hosts file carrying the managed block (default `/etc/hosts`).
//! - DEVROUTE_LOG: tracing filter; DEVROUTE_COLOR / NO_COLOR: color control.

pub mod bootstrap;
mod color;
pub mod config;
pub mod controller;
pub mod deploy;
pub mod engine;
pub mod errors;
pub mod hosts;
pub mod logging;
pub mod paths;
pub mod portmap;
pub mod routing;
pub mod run_spec;
pub mod scanner;
pub mod shellrc;
pub mod signals;
pub mod store;
pub mod supervisor;
pub mod util;

pub use bootstrap::resolver_configured;
pub use color::*;
pub use config::{Config, DomainConfig, Environment, Volume};
pub use controller::ReverseProxyController;
pub use deploy::{DeployReport, Deployer};
pub use engine::{ContainerEngine, EngineGateway, EngineKind};
pub use errors::{exit_code_for_anyhow, exit_code_for_error, DevrouteError, Result};
pub use paths::{Paths, RESOLVER_FILE};
pub use portmap::{allocate, PortMap, BASE_PORT};
pub use run_spec::{ContainerRunSpec, ContainerSpecBuilder, RestartPolicy, RunMode, RunRequest};
pub use store::{acquire_lock_at, DocumentStore, JsonFileStore, MemoryStore, StoreLock};
pub use supervisor::{EngineRunner, ProcessEvent, ProcessRunner, ProcessSupervisor, RunOutcome};

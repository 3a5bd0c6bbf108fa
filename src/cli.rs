use clap::{Parser, Subcommand};

use devroute::{ColorMode, EngineKind};

/// Parse `true|false|on|off|yes|no|1|0`.
fn parse_switch(s: &str) -> Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err("must be one of true, false".to_string()),
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "devroute",
    version,
    about = "Stable ports, .test hostnames and supervised containers for local projects."
)]
pub(crate) struct Cli {
    /// Print detailed execution info
    #[arg(long, global = true)]
    pub(crate) verbose: bool,

    /// Prepare and print what would run, but do not execute
    #[arg(long, global = true)]
    pub(crate) dry_run: bool,

    /// Colorize output: auto|always|never
    #[arg(long = "color", value_enum, global = true)]
    pub(crate) color: Option<ColorMode>,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum Command {
    /// Write resolver, dnsmasq and nginx files and prepare the engine machine
    Init,
    /// Scan domains, assign ports, render routing and restart the reverse proxy
    Deploy,
    /// Open an interactive shell in a container for the current project
    Shell {
        /// Environment providing image repository and volumes
        #[arg(short = 'e', long = "environment")]
        environment: Option<String>,
        /// Image (or tag, when the environment has an image repository)
        image: String,
    },
    /// Run the environment's serve_command for the current project
    Serve {
        /// Environment whose serve_command to run
        #[arg(short = 'e', long = "environment")]
        environment: String,
        /// Image (or tag, when the environment has an image repository)
        image: String,
    },
    /// List project URLs
    Urls {
        /// Emit the port map as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Run diagnostics to check engine, resolver and state files
    Doctor,
    /// Add a domain, environment, port mapping or volume
    Add {
        #[command(subcommand)]
        what: AddCmd,
    },
    /// Remove configuration entries or shell exports
    #[command(alias = "remove")]
    Rm {
        #[command(subcommand)]
        what: RmCmd,
    },
    /// Set configuration values or shell exports
    Set {
        #[command(subcommand)]
        what: SetCmd,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum AddCmd {
    /// Register a folder whose subfolders are projects
    Domain { location: String },
    /// Create an empty environment
    Environment { name: String },
    /// Publish an extra host port for one project
    Portmap {
        domain: String,
        service: String,
        host_port: u16,
        container_port: u16,
    },
    /// Mount a host folder ({pwd} = project folder) into an environment's containers
    Volume {
        environment: String,
        container_dir: String,
        host_dir: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum RmCmd {
    Domain {
        name: String,
    },
    Environment {
        name: String,
    },
    Portmap {
        domain: String,
        service: String,
        host_port: u16,
    },
    Volume {
        environment: String,
        container_dir: String,
        host_dir: String,
    },
    #[command(name = "serve_command", alias = "serve-command")]
    ServeCommand {
        environment: String,
    },
    #[command(name = "image_repository", alias = "image-repository")]
    ImageRepository {
        environment: String,
    },
    /// Remove the DEVROUTE_ROOT export from the shell rc file
    Root {
        /// Shell rc file (default ~/.zshrc)
        #[arg(short = 'z', long = "rc")]
        rc: Option<String>,
    },
    /// Remove the DEVROUTE_MACHINE export from the shell rc file
    Machine {
        #[arg(short = 'z', long = "rc")]
        rc: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum SetCmd {
    #[command(name = "serve_command", alias = "serve-command")]
    ServeCommand {
        environment: String,
        serve_command: String,
    },
    #[command(name = "image_repository", alias = "image-repository")]
    ImageRepository {
        environment: String,
        image_repository: String,
    },
    /// Container engine used by deploy, shell and serve
    Engine {
        #[arg(value_enum)]
        engine: EngineKind,
    },
    /// Mirror project hostnames into the system hosts file
    #[command(name = "urls_in_hosts", alias = "urls-in-hosts")]
    UrlsInHosts {
        #[arg(value_parser = parse_switch, action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Export DEVROUTE_ROOT from the shell rc file
    Root {
        path: String,
        #[arg(short = 'z', long = "rc")]
        rc: Option<String>,
    },
    /// Export DEVROUTE_MACHINE from the shell rc file
    Machine {
        name: String,
        #[arg(short = 'z', long = "rc")]
        rc: Option<String>,
    },
}

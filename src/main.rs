use std::process::ExitCode;

use clap::Parser;

mod cli;
mod commands;
mod doctor;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    if let Some(mode) = cli.color {
        devroute::set_color_mode(mode);
    }
    devroute::logging::init(cli.verbose);
    let paths = devroute::Paths::from_env();
    tracing::debug!("state root: {}", paths.root.display());
    commands::dispatch(&cli, &paths)
}

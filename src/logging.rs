//! Diagnostic logging setup.
//!
//! `DEVROUTE_LOG` takes an env-filter directive (e.g. `devroute=debug`).
//! Without it the filter defaults to `warn`, or `debug` when `--verbose` is given.

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<()> = OnceCell::new();

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "devroute=debug"
    } else {
        "warn"
    }
}

pub fn init(verbose: bool) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_env("DEVROUTE_LOG")
            .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .with_ansi(crate::color_enabled_stderr())
            .try_init();
    });
}

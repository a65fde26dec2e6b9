use std::io;
use tracing_subscriber::{fmt, EnvFilter};

/// Default filter directive for the given verbosity.
/// `-d` on the command line maps to `verbose = true`.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug,tower_http=debug,hyper=info"
    } else {
        "info,tower_http=info"
    }
}

/// Initialize tracing subscriber with sensible defaults and stderr writer.
/// - Respects `RUST_LOG` if set
/// - Falls back to `default_directive(verbose)`
pub fn init_logging_default(verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .with_writer(io::stderr)
        .try_init();
}

/// Initialize tracing subscriber with JSON structured output on stdout.
/// Used when logs are routed to the system log (`-l`): the collector picks up
/// one JSON object per line from the service's stdout.
pub fn init_logging_json(verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .json()
        .with_writer(io::stdout)
        .try_init();
}

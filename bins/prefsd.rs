use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Connections still open this long after a termination signal are abandoned.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Per-device preference store service.
#[derive(Debug, Parser)]
#[command(name = "prefsd", version)]
struct Cli {
    /// Verbose (debug) logging
    #[arg(short = 'd', long = "debug")]
    debug: bool,
    /// Route logs to the system log collector (JSON lines on stdout)
    #[arg(short = 'l', long = "syslog")]
    syslog: bool,
    /// Configuration file (default: $CONFIG_PATH or config.toml)
    #[arg(short = 'c', long = "config")]
    config: Option<String>,
}

fn init_logging(cli: &Cli) {
    // load .env first so RUST_LOG is honoured
    dotenv().ok();
    if cli.syslog {
        common::utils::logging::init_logging_json(cli.debug);
    } else {
        common::utils::logging::init_logging_default(cli.debug);
    }
    info!(service = "prefsd", event = "logger_init", "tracing subscriber initialized");
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let service_id = Uuid::new_v4();
    let pid = std::process::id();
    let version = env!("CARGO_PKG_VERSION");

    std::panic::set_hook(Box::new(move |info| {
        error!(service = "prefsd", event = "panic", %service_id, pid, message = %info, "unhandled panic occurred");
    }));

    let config = match configs::AppConfig::load_and_validate(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(service = "prefsd", event = "config_invalid", error = %e, "cannot load configuration");
            return ExitCode::FAILURE;
        }
    };

    // one worker keeps every handler on a single loop
    let worker_threads = config.service.worker_threads.unwrap_or(1);
    let mut builder = if worker_threads <= 1 {
        tokio::runtime::Builder::new_current_thread()
    } else {
        let mut b = tokio::runtime::Builder::new_multi_thread();
        b.worker_threads(worker_threads);
        b
    };
    builder.enable_all();
    let rt = match builder.build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(service = "prefsd", event = "runtime_build_failed", error = %e, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    info!(
        service = "prefsd",
        event = "start",
        %service_id,
        pid,
        version,
        threads = worker_threads,
        "preference service starting"
    );

    rt.block_on(async move {
        let server_task = tokio::spawn(server::run(config));
        tokio::select! {
            res = server_task => match res {
                Ok(Ok(())) => {
                    info!(service = "prefsd", event = "stop", %service_id, pid, "service stopped normally");
                    ExitCode::SUCCESS
                }
                Ok(Err(e)) => {
                    error!(service = "prefsd", event = "run_failed", error = %e, "server::run returned error");
                    ExitCode::FAILURE
                }
                Err(e) => {
                    error!(service = "prefsd", event = "task_join_error", error = %e, "server task join error");
                    ExitCode::FAILURE
                }
            },
            _ = async {
                server::startup::shutdown_signal().await;
                tokio::time::sleep(SHUTDOWN_GRACE).await;
            } => {
                warn!(service = "prefsd", event = "shutdown_forced", %service_id, pid, "requests still held after grace period; exiting");
                ExitCode::SUCCESS
            }
        }
    })
}

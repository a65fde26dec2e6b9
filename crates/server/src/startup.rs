use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use configs::{AppConfig, ServerConfig};
use service::bus::{Bus, HttpBus};
use service::properties::SystemProperties;
use service::runtime;
use service::storage::json_map_store::JsonMapStore;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::errors::StartupError;
use crate::routes;
use crate::state::ServerState;

fn bind_addr(server: &ServerConfig) -> Result<SocketAddr, StartupError> {
    format!("{}:{}", server.host, server.port)
        .parse()
        .map_err(|e| StartupError::InvalidConfig(format!("server address: {e}")))
}

async fn load_system_properties(config: &AppConfig) -> SystemProperties {
    let storage = &config.storage;
    match SystemProperties::load(storage.system_properties_file.clone(), &storage.public_keys).await {
        Ok(props) => props,
        Err(e) => {
            warn!(error = %e, "unreadable system properties; serving none");
            let empty = JsonMapStore::from_map(storage.system_properties_file.clone(), BTreeMap::new());
            SystemProperties::from_store(empty, &storage.public_keys)
        }
    }
}

/// Public entry: check the environment, wire the state and serve until a
/// termination signal arrives or the idle timer runs out.
pub async fn run(config: AppConfig) -> Result<(), StartupError> {
    runtime::ensure_env(&config.storage.prefs_dir, &config.storage.system_properties_file)
        .await
        .map_err(|e| StartupError::Runtime(e.to_string()))?;

    let system = load_system_properties(&config).await;
    let bus: Arc<dyn Bus> = Arc::new(HttpBus::new(config.service.name.clone(), config.bus.peers.clone()));
    let addr = bind_addr(&config.server)?;
    let state = ServerState::new(config, bus, system);

    let listener = TcpListener::bind(addr).await.map_err(anyhow::Error::from)?;
    serve(listener, state, shutdown_signal()).await
}

/// Serve `state` on `listener` until `shutdown` resolves or the service goes idle.
pub async fn serve<F>(listener: TcpListener, state: ServerState, shutdown: F) -> Result<(), StartupError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let idle = state.idle.clone();
    let addr = listener.local_addr().map_err(anyhow::Error::from)?;
    info!(%addr, idle_timeout = ?idle.timeout(), "preference service listening");

    axum::serve(listener, routes::build_router(state))
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown => info!("termination signal received"),
                _ = idle.expired() => info!("idle timeout reached"),
            }
        })
        .await
        .map_err(anyhow::Error::from)?;
    info!("preference service stopped");
    Ok(())
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

//! dockroute daemon entry point.

use std::sync::Arc;

use log::{error, info};
use tokio::signal;
use tokio_util::sync::CancellationToken;

mod config;
mod http_server;
mod listener;
mod proxy;
mod refresher;
mod routes;
mod runtime;
mod types;

use config::Config;
use http_server::{run_http_server, AppState};
use listener::EventListener;
use refresher::Refresher;
use routes::RoutingTable;
use runtime::{ContainerRuntime, DockerRuntime};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting dockroute with config: {:?}", cfg);

    // Shared state
    let table = RoutingTable::new();
    let shutdown = CancellationToken::new();

    // Container Runtime (Docker)
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::connect()?);
    let refresher = Arc::new(Refresher::new(Arc::clone(&runtime), table.clone()));
    let listener = EventListener::new(runtime, refresher, cfg.reconnect_delay())
        .start(shutdown.child_token());

    // HTTP Proxy
    let state = AppState::new(table, cfg.gateway_host.clone(), cfg.upstream_scheme.clone());
    let http_shutdown = shutdown.clone();
    let mut http_handle = tokio::spawn(run_http_server(cfg.http_bind, state, http_shutdown));

    // Graceful Shutdown
    let server_result = tokio::select! {
        res = signal::ctrl_c() => {
            match res {
                Ok(()) => info!("Received Ctrl+C, shutting down..."),
                Err(err) => error!("Unable to listen for shutdown signal: {}", err),
            }
            shutdown.cancel();
            (&mut http_handle).await
        }
        res = &mut http_handle => res,
    };

    listener.stop().await;

    match server_result {
        Ok(Ok(())) => {
            info!("Shutdown complete.");
            Ok(())
        }
        Ok(Err(e)) => {
            error!("HTTP proxy failed: {}", e);
            Err(e)
        }
        Err(e) => Err(e.into()),
    }
}

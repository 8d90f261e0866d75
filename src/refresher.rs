//! Rebuilds the routing table from a full container listing.

use std::sync::Arc;

use log::{debug, info};
use tokio::sync::Mutex;

use crate::routes::{RouteMap, RoutingTable};
use crate::runtime::{ContainerRuntime, RuntimeError};
use crate::types::{service_name, Workload};

/// Queries the runtime and installs a fresh routing table.
///
/// Refreshes are serialized: a call that arrives while another is in
/// flight waits for it and then performs its own query.
pub struct Refresher {
    runtime: Arc<dyn ContainerRuntime>,
    table: RoutingTable,
    serial: Mutex<()>,
}

impl Refresher {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, table: RoutingTable) -> Self {
        Self {
            runtime,
            table,
            serial: Mutex::new(()),
        }
    }

    /// Replaces the table with the runtime's current state and returns the
    /// number of routes installed. On a failed query the table is left
    /// untouched.
    pub async fn refresh(&self) -> Result<usize, RuntimeError> {
        let _guard = self.serial.lock().await;

        let workloads = self.runtime.list_workloads().await?;
        let routes = build_routes(&workloads);
        let count = routes.len();

        let previous = self.table.replace_all(routes.clone()).await;
        log_changes(&previous, &routes);
        debug!(
            "Routing table refreshed from {} containers, {} routes",
            workloads.len(),
            count
        );
        Ok(count)
    }
}

/// Maps every name of every container to its published ports. When a
/// container publishes several ports, the last one listed wins.
fn build_routes(workloads: &[Workload]) -> RouteMap {
    let mut routes = RouteMap::new();
    for workload in workloads {
        for name in workload.names.iter().filter_map(|n| service_name(n)) {
            for port in &workload.ports {
                match port.public_port {
                    Some(public) => {
                        routes.insert(name.to_string(), public);
                    }
                    None => debug!("{}: port {} is not published", name, port.private_port),
                }
            }
        }
    }
    routes
}

fn log_changes(previous: &RouteMap, current: &RouteMap) {
    for (name, port) in current {
        match previous.get(name) {
            Some(old) if old == port => {}
            Some(old) => info!("Route updated: {} -> {} (was {})", name, port, old),
            None => info!("Route added: {} -> {}", name, port),
        }
    }
    for name in previous.keys().filter(|n| !current.contains_key(*n)) {
        info!("Route removed: {}", name);
    }
}

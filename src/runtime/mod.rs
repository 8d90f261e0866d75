use crate::types::{RuntimeEvent, Workload};
use async_trait::async_trait;
use tokio::sync::mpsc;

pub mod docker;
pub use docker::DockerRuntime;

#[cfg(test)]
pub mod mock;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("docker: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("runtime unavailable: {0}")]
    Unavailable(String),
}

/// Live subscription to the runtime's event feed. Events and transport
/// errors arrive on separate channels; both close when the underlying
/// connection ends.
pub struct EventStream {
    pub events: mpsc::UnboundedReceiver<RuntimeEvent>,
    pub errors: mpsc::UnboundedReceiver<RuntimeError>,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Lists every container known to the runtime, running or not.
    async fn list_workloads(&self) -> Result<Vec<Workload>, RuntimeError>;

    /// Opens a new event subscription.
    fn subscribe(&self) -> EventStream;
}

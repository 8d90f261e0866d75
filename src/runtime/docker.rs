use super::{ContainerRuntime, EventStream, RuntimeError};
use crate::types::{PublishedPort, RuntimeEvent, Workload};
use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::{ContainerSummary, EventMessage};
use bollard::system::EventsOptions;
use bollard::Docker;
use futures_util::stream::{Stream, StreamExt};
use log::{debug, info};
use tokio::sync::mpsc;

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects to the local Docker daemon using default settings
    /// (unix socket on Linux, `DOCKER_HOST` when set).
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_workloads(&self) -> Result<Vec<Workload>, RuntimeError> {
        let opts = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(opts)).await?;
        Ok(containers.into_iter().map(to_workload).collect())
    }

    fn subscribe(&self) -> EventStream {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (errors_tx, errors) = mpsc::unbounded_channel();
        let docker = self.docker.clone();

        tokio::spawn(async move {
            let stream = docker.events(None::<EventsOptions<String>>);
            info!("Listening for Docker events...");
            pump_events(Box::pin(stream), events_tx, errors_tx).await;
        });

        EventStream { events, errors }
    }
}

/// Splits the Docker event stream into the event and error channels.
/// Returns when the stream ends or the subscriber drops its receivers.
async fn pump_events<S>(
    mut stream: S,
    events_tx: mpsc::UnboundedSender<RuntimeEvent>,
    errors_tx: mpsc::UnboundedSender<RuntimeError>,
) where
    S: Stream<Item = Result<EventMessage, bollard::errors::Error>> + Unpin,
{
    loop {
        let msg = tokio::select! {
            _ = events_tx.closed() => {
                debug!("Event receiver dropped, closing Docker event stream");
                return;
            }
            msg = stream.next() => msg,
        };

        match msg {
            Some(Ok(message)) => {
                if events_tx.send(to_event(message)).is_err() {
                    debug!("Event receiver dropped, closing Docker event stream");
                    return;
                }
            }
            Some(Err(e)) => {
                if errors_tx.send(RuntimeError::Docker(e)).is_err() {
                    debug!("Error receiver dropped, closing Docker event stream");
                    return;
                }
            }
            None => {
                let _ = errors_tx.send(RuntimeError::Unavailable(
                    "Docker event stream ended".to_string(),
                ));
                return;
            }
        }
    }
}

fn to_workload(c: ContainerSummary) -> Workload {
    Workload {
        names: c.names.unwrap_or_default(),
        ports: c
            .ports
            .unwrap_or_default()
            .into_iter()
            .map(|p| PublishedPort {
                private_port: p.private_port,
                public_port: p.public_port,
            })
            .collect(),
    }
}

fn to_event(message: EventMessage) -> RuntimeEvent {
    let actor = message.actor.and_then(|actor| {
        actor
            .attributes
            .and_then(|attrs| attrs.get("name").cloned())
            .filter(|name| !name.is_empty())
            .or(actor.id)
    });

    RuntimeEvent {
        kind: message.typ.map(|t| t.to_string()).unwrap_or_default(),
        action: message.action.unwrap_or_default(),
        actor,
    }
}

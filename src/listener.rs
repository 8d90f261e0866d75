//! Keeps the routing table in step with container lifecycle events.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::refresher::Refresher;
use crate::runtime::{ContainerRuntime, EventStream, RuntimeError};
use crate::types::RuntimeEvent;

pub struct EventListener {
    runtime: Arc<dyn ContainerRuntime>,
    refresher: Arc<Refresher>,
    /// `None` leaves the listener idle once the event stream ends.
    reconnect_delay: Option<Duration>,
}

/// Running listener. Dropping the handle does not stop it; call
/// [`ListenerHandle::stop`] or cancel the token it was started with.
pub struct ListenerHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!("Event listener task failed: {}", e);
        }
    }
}

impl EventListener {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        refresher: Arc<Refresher>,
        reconnect_delay: Option<Duration>,
    ) -> Self {
        Self {
            runtime,
            refresher,
            reconnect_delay,
        }
    }

    pub fn start(self, shutdown: CancellationToken) -> ListenerHandle {
        let token = shutdown.clone();
        let task = tokio::spawn(async move { self.run(token).await });
        ListenerHandle { shutdown, task }
    }

    async fn run(self, shutdown: CancellationToken) {
        self.refresh().await;

        loop {
            let EventStream { events, errors } = self.runtime.subscribe();
            let errors_task = tokio::spawn(drain_errors(errors, shutdown.clone()));

            self.drain_events(events, &shutdown).await;

            // The error loop ends on cancellation or when the error channel
            // closes together with the event channel.
            if let Err(e) = errors_task.await {
                warn!("Event stream error task failed: {}", e);
            }
            if shutdown.is_cancelled() {
                break;
            }

            let Some(delay) = self.reconnect_delay else {
                warn!("Docker event stream closed, routes will no longer follow containers");
                shutdown.cancelled().await;
                break;
            };

            warn!(
                "Docker event stream closed, resubscribing in {}s",
                delay.as_secs()
            );
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            // Events may have been missed while disconnected.
            self.refresh().await;
        }

        debug!("Event listener stopped");
    }

    async fn drain_events(
        &self,
        mut events: mpsc::UnboundedReceiver<RuntimeEvent>,
        shutdown: &CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => return,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => return,
                },
            };

            if !event.affects_routes() {
                debug!("Ignoring {} event: {}", event.kind, event.action);
                continue;
            }

            info!(
                "Container {}: {}",
                event.action,
                event.actor.as_deref().unwrap_or("<unknown>")
            );
            self.refresh().await;
        }
    }

    async fn refresh(&self) {
        if let Err(e) = self.refresher.refresh().await {
            warn!("Failed to refresh routes, keeping previous table: {}", e);
        }
    }
}

async fn drain_errors(
    mut errors: mpsc::UnboundedReceiver<RuntimeError>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            err = errors.recv() => match err {
                Some(e) => warn!("Error in Docker event stream: {}", e),
                None => return,
            },
        }
    }
}

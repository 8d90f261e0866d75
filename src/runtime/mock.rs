//! In-memory runtime used by the refresher and listener tests.

use super::{ContainerRuntime, EventStream, RuntimeError};
use crate::types::{PublishedPort, RuntimeEvent, Workload};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

/// Sending half of a subscription handed out by [`MockRuntime`].
pub struct MockFeed {
    pub events: mpsc::UnboundedSender<RuntimeEvent>,
    pub errors: mpsc::UnboundedSender<RuntimeError>,
}

#[derive(Default)]
pub struct MockRuntime {
    workloads: Mutex<Vec<Workload>>,
    failure: Mutex<Option<String>>,
    streams: Mutex<VecDeque<EventStream>>,
    latency: Option<Duration>,
    lists: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    subscriptions: AtomicUsize,
}

impl MockRuntime {
    pub fn new(workloads: Vec<Workload>) -> Self {
        Self {
            workloads: Mutex::new(workloads),
            ..Default::default()
        }
    }

    /// Makes every list call take `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_workloads(&self, workloads: Vec<Workload>) {
        *self.workloads.lock().unwrap() = workloads;
        *self.failure.lock().unwrap() = None;
    }

    /// Makes subsequent list calls fail.
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    /// Queues a subscription for the next `subscribe` call.
    pub fn feed(&self) -> MockFeed {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (errors_tx, errors) = mpsc::unbounded_channel();
        self.streams
            .lock()
            .unwrap()
            .push_back(EventStream { events, errors });
        MockFeed {
            events: events_tx,
            errors: errors_tx,
        }
    }

    pub fn list_calls(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    /// Largest number of list calls that were running at the same time.
    pub fn peak_concurrent_lists(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn list_workloads(&self) -> Result<Vec<Workload>, RuntimeError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(RuntimeError::Unavailable(message));
        }
        Ok(self.workloads.lock().unwrap().clone())
    }

    fn subscribe(&self) -> EventStream {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        // An unqueued subscription is already closed.
        self.streams.lock().unwrap().pop_front().unwrap_or_else(|| {
            let (_, events) = mpsc::unbounded_channel();
            let (_, errors) = mpsc::unbounded_channel();
            EventStream { events, errors }
        })
    }
}

pub fn workload(names: &[&str], public_ports: &[u16]) -> Workload {
    Workload {
        names: names.iter().map(|n| n.to_string()).collect(),
        ports: public_ports
            .iter()
            .map(|p| PublishedPort {
                private_port: 80,
                public_port: Some(*p),
            })
            .collect(),
    }
}

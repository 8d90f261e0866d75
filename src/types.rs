//! Data structures shared between the runtime adapter, the refresher and
//! the listener.
//!
//! These are deliberately thin views over what the container runtime
//! reports: only the fields the routing table is built from are kept.

/// Event category carrying container lifecycle transitions.
pub const CONTAINER_EVENT: &str = "container";

/// Container actions after which the routing table may be stale.
pub const ROUTE_ACTIONS: [&str; 9] = [
    "rename", "start", "update", "pause", "unpause", "restart", "kill", "stop", "die",
];

/// A container as returned by the runtime's list call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workload {
    /// Display names, usually slash-prefixed (`/web-app`).
    pub names: Vec<String>,
    pub ports: Vec<PublishedPort>,
}

/// One port mapping of a container. `public_port` is `None` when the
/// private port is exposed but not published on the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishedPort {
    pub private_port: u16,
    pub public_port: Option<u16>,
}

/// A single message from the runtime's event stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeEvent {
    pub kind: String,
    pub action: String,
    /// Name or id of the object the event is about, if reported.
    pub actor: Option<String>,
}

impl RuntimeEvent {
    #[cfg(test)]
    pub fn new(kind: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            action: action.into(),
            actor: None,
        }
    }

    /// True when this event may change which services are routable.
    pub fn affects_routes(&self) -> bool {
        self.kind == CONTAINER_EVENT && ROUTE_ACTIONS.contains(&self.action.as_str())
    }
}

/// Derives the routing key from a container name by taking its final
/// slash-separated segment. Returns `None` when that segment is empty.
pub fn service_name(name: &str) -> Option<&str> {
    let name = name.rsplit('/').next().unwrap_or(name);
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

//! Routing table shared between the refresher (single writer) and the
//! request dispatcher (many readers).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

/// Service name to published host port.
pub type RouteMap = HashMap<String, u16>;

/// Cloneable handle to the in-memory routing table.
///
/// The table is only ever replaced wholesale; readers see either the
/// previous map or the new one, never a mix.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    inner: Arc<RwLock<RouteMap>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resolve(&self, service: &str) -> Option<u16> {
        self.inner.read().await.get(service).copied()
    }

    /// Installs `routes` and returns the map it replaced.
    pub async fn replace_all(&self, routes: RouteMap) -> RouteMap {
        let mut map = self.inner.write().await;
        std::mem::replace(&mut *map, routes)
    }

    #[cfg(test)]
    pub async fn snapshot(&self) -> RouteMap {
        self.inner.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routes(entries: &[(&str, u16)]) -> RouteMap {
        entries.iter().map(|(n, p)| (n.to_string(), *p)).collect()
    }

    #[tokio::test]
    async fn unknown_service_is_none() {
        let table = RoutingTable::new();
        assert_eq!(table.resolve("web").await, None);
    }

    #[tokio::test]
    async fn replace_all_drops_previous_entries() {
        let table = RoutingTable::new();
        table.replace_all(routes(&[("web", 8080), ("db", 5432)])).await;

        let old = table.replace_all(routes(&[("web", 9090)])).await;

        assert_eq!(old, routes(&[("web", 8080), ("db", 5432)]));
        assert_eq!(table.resolve("web").await, Some(9090));
        assert_eq!(table.resolve("db").await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn readers_never_observe_a_partial_table() {
        let table = RoutingTable::new();
        let old = routes(&[("a", 1), ("b", 2), ("c", 3)]);
        let new = routes(&[("a", 10), ("d", 40)]);
        table.replace_all(old.clone()).await;

        let mut readers = Vec::new();
        for _ in 0..8 {
            let table = table.clone();
            let (old, new) = (old.clone(), new.clone());
            readers.push(tokio::spawn(async move {
                for _ in 0..200 {
                    let seen = table.snapshot().await;
                    assert!(seen == old || seen == new, "mixed table: {:?}", seen);
                    tokio::task::yield_now().await;
                }
            }));
        }

        for i in 0..50 {
            let next = if i % 2 == 0 { new.clone() } else { old.clone() };
            table.replace_all(next).await;
            tokio::task::yield_now().await;
        }

        for reader in readers {
            reader.await.unwrap();
        }
    }
}

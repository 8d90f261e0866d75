//! HTTP entry point.
//!
//! Every request is routed by hostname:
//!
//! * **One label** (`app`) or **three labels** (`app.example.com`): the
//!   first label is the service name. It is looked up in the routing
//!   table and the request is forwarded to `gateway_host:port`.
//! * **Two labels** (`example.com`) or **more than three**
//!   (`a.b.example.com`): not a service host. Answered with a `200`
//!   success envelope and never proxied.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::uri::Authority;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use log::{debug, info, warn};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::proxy::{target_uri, Envelope, Forwarder, ProxyError};
use crate::routes::RoutingTable;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    table: RoutingTable,
    forwarder: Forwarder,
    gateway_host: String,
    upstream_scheme: String,
}

impl AppState {
    pub fn new(table: RoutingTable, gateway_host: String, upstream_scheme: String) -> Self {
        Self {
            inner: Arc::new(Inner {
                table,
                forwarder: Forwarder::new(),
                gateway_host,
                upstream_scheme,
            }),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new().fallback(dispatch).with_state(state)
}

/// Serves the proxy until `shutdown` is cancelled. Fails only if the
/// listener cannot be bound or the server itself errors.
pub async fn run_http_server(
    bind_addr: SocketAddr,
    state: AppState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!("HTTP proxy listening on {}", bind_addr);

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;
    Ok(())
}

/// What to do with a request, decided from its hostname alone.
#[derive(Debug, PartialEq, Eq)]
enum HostRoute<'a> {
    Service(&'a str),
    Passthrough,
}

fn classify_host(host: &str) -> HostRoute<'_> {
    let labels: Vec<&str> = host.split('.').collect();
    match labels.len() {
        1 | 3 => HostRoute::Service(labels[0]),
        _ => HostRoute::Passthrough,
    }
}

/// Hostname of the request without any port suffix. HTTP/2 requests
/// carry it in the URI, HTTP/1 requests in the `Host` header.
fn request_host(req: &Request) -> String {
    if let Some(host) = req.uri().host() {
        return host.to_string();
    }
    req.headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<Authority>().ok())
        .map(|authority| authority.host().to_string())
        .unwrap_or_default()
}

async fn dispatch(State(state): State<AppState>, req: Request) -> Response {
    let host = request_host(&req);
    let service = match classify_host(&host) {
        HostRoute::Service(service) => service,
        HostRoute::Passthrough => {
            return Envelope::new(StatusCode::OK, "success").into_response();
        }
    };

    let Some(port) = state.inner.table.resolve(service).await else {
        warn!("No route for service {} (host {})", service, host);
        return ProxyError::NoBackend(service.to_string()).into_response();
    };

    let inner = &state.inner;
    let target = match target_uri(&inner.upstream_scheme, &inner.gateway_host, port) {
        Ok(target) => target,
        Err(e) => return e.into_response(),
    };

    let client_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    debug!("{} {} -> {}", req.method(), host, target);

    match inner.forwarder.forward(&target, req, client_addr).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

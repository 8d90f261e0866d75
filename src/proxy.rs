//! Single-target HTTP forwarding over a shared, pooled client.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::Request;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{StatusCode, Uri, Version};
use axum::response::{IntoResponse, Response};
use axum::Json;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use log::warn;
use serde::Serialize;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("{0}")]
    InvalidTarget(String),

    #[error("no backend for service {0}")]
    NoBackend(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            ProxyError::NoBackend(_) | ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        Envelope::new(status, self.to_string()).into_response()
    }
}

/// JSON body for responses the proxy writes itself.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub code: u16,
    pub msg: String,
    pub data: Option<serde_json::Value>,
}

impl Envelope {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            code: status.as_u16(),
            msg: msg.into(),
            data: None,
        }
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

/// Builds the base address of a backend, e.g. `http://172.17.0.1:8080`.
pub fn target_uri(scheme: &str, host: &str, port: u16) -> Result<Uri, ProxyError> {
    format!("{}://{}:{}", scheme, host, port)
        .parse::<Uri>()
        .map_err(|e| ProxyError::InvalidTarget(e.to_string()))
}

#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
}

impl Default for Forwarder {
    fn default() -> Self {
        Self::new()
    }
}

impl Forwarder {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }

    /// Sends `req` to `target`, keeping its method, path, query, body and
    /// `Host` header, and returns the backend's response unchanged apart
    /// from hop-by-hop headers. Backends are always dialed over HTTP/1.1,
    /// whatever version the client used.
    pub async fn forward(
        &self,
        target: &Uri,
        mut req: Request,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response, ProxyError> {
        // HTTP/2 requests carry the host in `:authority` only.
        if !req.headers().contains_key(header::HOST) {
            let authority = req
                .uri()
                .authority()
                .and_then(|a| HeaderValue::from_str(a.as_str()).ok());
            if let Some(authority) = authority {
                req.headers_mut().insert(header::HOST, authority);
            }
        }

        let uri = upstream_uri(target, req.uri())?;
        *req.uri_mut() = uri;
        *req.version_mut() = Version::HTTP_11;

        let headers = req.headers_mut();
        strip_hop_by_hop(headers);
        if let Some(addr) = client_addr {
            append_forwarded_for(headers, addr);
        }

        let mut response = self.client.request(req).await.map_err(|e| {
            warn!("Proxy error for {}: {}", target, e);
            ProxyError::Upstream(e.to_string())
        })?;
        strip_hop_by_hop(response.headers_mut());

        Ok(response.into_response())
    }
}

fn upstream_uri(target: &Uri, incoming: &Uri) -> Result<Uri, ProxyError> {
    let path_and_query = incoming
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let mut parts = target.clone().into_parts();
    parts.path_and_query = Some(
        path_and_query
            .parse()
            .map_err(|e: axum::http::uri::InvalidUri| ProxyError::InvalidTarget(e.to_string()))?,
    );
    Uri::from_parts(parts).map_err(|e| ProxyError::InvalidTarget(e.to_string()))
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named in `Connection` are connection-scoped as well.
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, addr: SocketAddr) {
    let ip = addr.ip().to_string();
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{}, {}", prior, ip),
        None => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

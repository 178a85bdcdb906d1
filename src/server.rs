//! Static SPA server with a prefix-based reverse proxy in front of it.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::{ProxyRule, ServerConfig};

/// Photo uploads pass through the proxy, so this is generous.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "keep-alive",
    "transfer-encoding",
    "content-length",
    "te",
    "trailer",
    "upgrade",
];

#[derive(Debug)]
struct ProxyState {
    client: reqwest::Client,
    rules: Vec<ProxyRule>,
    forward_headers: Vec<HeaderName>,
}

impl ProxyState {
    /// Longest matching prefix wins.
    fn rule_for(&self, path: &str) -> Option<&ProxyRule> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(path))
            .max_by_key(|rule| rule.prefix.len())
    }

    fn forwarded_headers(&self, incoming: &HeaderMap) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for name in &self.forward_headers {
            for value in incoming.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }
        headers
    }
}

pub fn router(config: &ServerConfig, client: reqwest::Client) -> Router {
    let state = Arc::new(ProxyState {
        client,
        rules: config.rules.clone(),
        forward_headers: config.forward_headers.clone(),
    });

    let index = config.static_dir.join("index.html");
    let spa = ServeDir::new(&config.static_dir).fallback(ServeFile::new(index));

    Router::new()
        .fallback_service(spa)
        .layer(middleware::from_fn_with_state(state, proxy_middleware))
        .layer(TraceLayer::new_for_http())
}

async fn proxy_middleware(
    State(state): State<Arc<ProxyState>>,
    request: Request,
    next: Next,
) -> Response {
    match state.rule_for(request.uri().path()) {
        Some(rule) => forward(&state, rule, request).await,
        None => next.run(request).await,
    }
}

async fn forward(state: &ProxyState, rule: &ProxyRule, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", rule.upstream, path_and_query);

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(%url, error = %e, "rejecting proxied request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
        }
    };

    debug!(method = %parts.method, %url, "proxying");
    let upstream = state
        .client
        .request(parts.method, &url)
        .headers(state.forwarded_headers(&parts.headers))
        .body(body)
        .send()
        .await;

    match upstream {
        Ok(response) => relay(response, &url).await,
        Err(e) => {
            error!(%url, error = %e, "upstream request failed");
            (StatusCode::BAD_GATEWAY, "upstream unavailable").into_response()
        }
    }
}

async fn relay(upstream: reqwest::Response, url: &str) -> Response {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    for name in HOP_BY_HOP {
        headers.remove(name);
    }

    match upstream.bytes().await {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            *response.headers_mut() = headers;
            response
        }
        Err(e) => {
            error!(%url, error = %e, "failed to read upstream body");
            (StatusCode::BAD_GATEWAY, "upstream body unreadable").into_response()
        }
    }
}

pub async fn serve(config: ServerConfig, client: reqwest::Client) -> anyhow::Result<()> {
    for rule in &config.rules {
        info!(%rule, "proxy rule");
    }
    if !config.static_dir.join("index.html").exists() {
        warn!(dir = %config.static_dir.display(), "static directory has no index.html");
    }

    let app = router(&config, client);
    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    info!(addr = %config.listen, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

//! HTTP server setup and request forwarding.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (tracing, timeout, request ID)
//! - Resolve each request against the current routing snapshot
//! - Forward to the matched destination
//! - Run response transforms (redirect rewriting)
//!
//! # Design Decisions
//! - The snapshot is loaded once per request; the destination is captured
//!   before forwarding, so a table change mid-request does not affect it
//! - Single destination per cluster; no balancing, retries or buffering

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header::HOST, Request, StatusCode, Version},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::request::{prepare_forwarded_headers, request_id, strip_hop_by_hop, upstream_uri};
use crate::http::response::{ResponseRewriteTransform, ResponseTransform, TransformContext};
use crate::observability::metrics;
use crate::routing::ConfigurationStore;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ConfigurationStore>,
    pub client: Client<HttpConnector, Body>,
    pub transform: Arc<dyn ResponseTransform>,
}

/// HTTP server for the session proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server reading routes from `store`.
    pub fn new(config: &ProxyConfig, store: Arc<ConfigurationStore>) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let state = AppState {
            store,
            client,
            transform: Arc::new(ResponseRewriteTransform),
        };

        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until a shutdown signal arrives, then finish in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server no longer accepting connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
/// Resolves the route against the current snapshot and forwards the request.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(request.headers()).to_string();
    let method = request.method().to_string();

    let snapshot = state.store.current();
    let Some(hit) = snapshot.resolve(request.uri().path(), request.headers()) else {
        tracing::warn!(request_id = %request_id, path = %request.uri().path(), "No route matched");
        metrics::record_request(&method, 404, "none", start_time);
        return (StatusCode::NOT_FOUND, "No matching route found").into_response();
    };
    let route_id = hit.route.id.clone();
    let target = hit.destination.clone();
    drop(snapshot);

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %request.uri().path(),
        route = %route_id,
        destination = %target,
        "Proxying request"
    );

    let (mut parts, body) = request.into_parts();
    let inbound_host = parts
        .headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_owned);

    parts.uri = match upstream_uri(&target, &parts.uri) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(
                request_id = %request_id,
                destination = %target,
                error = %e,
                "Invalid upstream URI"
            );
            metrics::record_request(&method, 502, &route_id, start_time);
            return (StatusCode::BAD_GATEWAY, "Invalid upstream address").into_response();
        }
    };
    parts.version = Version::HTTP_11;
    strip_hop_by_hop(&mut parts.headers);
    prepare_forwarded_headers(&mut parts.headers, client_addr, "http");

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let (mut parts, body) = response.into_parts();
            strip_hop_by_hop(&mut parts.headers);

            let ctx = TransformContext {
                target: &target,
                inbound_host: inbound_host.as_deref(),
            };
            state.transform.apply(&ctx, &mut parts);

            metrics::record_request(&method, parts.status.as_u16(), &route_id, start_time);
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(
                request_id = %request_id,
                destination = %target,
                error = %e,
                "Upstream error"
            );
            metrics::record_request(&method, 502, &route_id, start_time);
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}

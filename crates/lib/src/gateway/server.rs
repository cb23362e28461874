//! Gateway HTTP server (single port): health probe and the inbound webhook.

use crate::config::{self, Settings};
use crate::gateway::protocol::{MethodNotAllowed, WebhookResponse, FORBIDDEN_MESSAGE};
use crate::relay::{Outcome, Relay};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Header carrying the optional inbound shared secret.
pub const SECRET_HEADER: &str = "x-webhook-secret";

/// Shared state for the gateway (settings and the relay pipeline).
#[derive(Clone)]
pub struct GatewayState {
    pub settings: Arc<Settings>,
    pub relay: Arc<Relay>,
}

/// Router with `GET /` health and the webhook path (any method). Message length is not capped,
/// so the webhook body has no size limit.
pub fn router(state: GatewayState) -> Router {
    let path = state.settings.gateway.path.clone();
    Router::new()
        .route("/", get(health_http))
        .route(&path, any(webhook).layer(DefaultBodyLimit::disable()))
        .with_state(state)
}

/// Run the gateway server; binds to gateway.bind:gateway.port and serves until Ctrl+C/SIGTERM.
pub async fn run_gateway(settings: Settings) -> Result<()> {
    let relay = Relay::from_settings(&settings)?;
    run_gateway_with(settings, relay).await
}

/// Same as [`run_gateway`] with an already-built relay.
pub async fn run_gateway_with(settings: Settings, relay: Relay) -> Result<()> {
    let bind = settings.gateway.bind.clone();
    if !config::is_loopback_bind(&bind) && settings.gateway.inbound_secret.is_none() {
        log::warn!(
            "gateway bound to {} without an inbound secret; anyone who can reach it can trigger replies",
            bind
        );
    }
    let bind_addr = format!("{}:{}", bind, settings.gateway.port);
    let path = settings.gateway.path.clone();
    let state = GatewayState {
        settings: Arc::new(settings),
        relay: Arc::new(relay),
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {} (webhook at {})", bind_addr, path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.settings.gateway.port,
    }))
}

/// Webhook entry: OPTIONS is answered directly, POST runs the relay, everything else is 405.
/// Every answer carries `Access-Control-Allow-Origin: *`.
async fn webhook(
    State(state): State<GatewayState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method == Method::OPTIONS {
        return preflight();
    }
    if method != Method::POST {
        return json_response(StatusCode::METHOD_NOT_ALLOWED, &MethodNotAllowed::default());
    }
    if let Some(ref expected) = state.settings.gateway.inbound_secret {
        let provided = headers
            .get(SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
            log::warn!("webhook: rejected request with missing or wrong secret");
            return json_response(StatusCode::FORBIDDEN, &WebhookResponse::failure(FORBIDDEN_MESSAGE));
        }
    }

    let request_id = uuid::Uuid::new_v4().to_string();
    match state.relay.handle_body(&request_id, &body).await {
        Ok(Outcome::Replied { .. }) | Ok(Outcome::Acknowledged { .. }) => {
            json_response(StatusCode::OK, &WebhookResponse::ok())
        }
        Err(e) => {
            let status =
                StatusCode::from_u16(e.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            json_response(status, &WebhookResponse::failure(e.to_string()))
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// CORS preflight: 200, empty body.
fn preflight() -> Response {
    let mut res = StatusCode::OK.into_response();
    let h = res.headers_mut();
    h.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    h.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    h.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    res
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    let mut res = (status, Json(body)).into_response();
    res.headers_mut()
        .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    res
}

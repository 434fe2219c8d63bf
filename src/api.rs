//! HTTP front door: the webhook endpoint and metrics exposition.
//!
//! ## Endpoints
//!
//! - `POST /alert` - Alertmanager webhook receiver
//! - `GET /metrics` - Prometheus text exposition

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::AppContext;
use crate::message::AlertMessage;
use crate::metrics::{ERROR_DECODE, ERROR_HANDLE};

/// Build the application router.
pub fn router(context: Arc<AppContext>) -> Router {
    Router::new()
        .route("/alert", post(alert))
        .route("/metrics", get(metrics))
        .with_state(context)
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve. Only returns on a listener or server error.
pub async fn serve(addr: SocketAddr, context: Arc<AppContext>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router(context)).await?;
    Ok(())
}

/// POST /alert
///
/// Decodes an Alertmanager webhook payload and relays it. Decode failures are
/// the caller's fault (400); dispatch failures are ours (500). Both are
/// counted by type.
async fn alert(State(context): State<Arc<AppContext>>, body: Bytes) -> Response {
    context.metrics.received.inc();

    let message: AlertMessage = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(e) => {
            error!("decoding /alert failed: {e}");
            context
                .metrics
                .errors
                .with_label_values(&[ERROR_DECODE])
                .inc();
            return (StatusCode::BAD_REQUEST, "Decode failed").into_response();
        }
    };

    match context.dispatch(&message).await {
        Ok(()) => (StatusCode::OK, "ok").into_response(),
        Err(e) => {
            error!("{e}");
            context
                .metrics
                .errors
                .with_label_values(&[ERROR_HANDLE])
                .inc();
            (StatusCode::INTERNAL_SERVER_ERROR, "Handling alert failed").into_response()
        }
    }
}

/// GET /metrics
async fn metrics(State(context): State<Arc<AppContext>>) -> Response {
    match context.metrics.gather() {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(e) => {
            error!("gathering metrics failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response()
        }
    }
}

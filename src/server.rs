use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    error::ApiError,
    ports,
    scanner::{self, Prober, ScanOptions, TcpProber},
    types::{ScanReport, ScanRequest},
};

/// Address the service listens on unless told otherwise.
pub const DEFAULT_BIND: &str = "0.0.0.0:8081";
pub const SERVICE_NAME: &str = "port-scanner";

#[derive(Clone)]
pub struct AppState {
    pub scan: ScanOptions,
    pub prober: Arc<dyn Prober>,
}

impl AppState {
    pub fn new(scan: ScanOptions) -> Self {
        Self {
            scan,
            prober: Arc::new(TcpProber),
        }
    }

    /// Swap the connect strategy used for every scan.
    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = prober;
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(ScanOptions::default())
    }
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    service: &'static str,
}

/// Build the HTTP application: scan and health routes with permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/scan", post(post_scan))
        .route("/health", get(get_health))
        .with_state(state)
        .layer(middleware::from_fn(preflight))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind `bind` and serve until Ctrl+C.
pub async fn serve(bind: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    let local: SocketAddr = listener.local_addr()?;
    info!(addr = %local, "port scanner listening");
    info!("endpoints: POST /scan, GET /health");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}

/// Answer every `OPTIONS` request with an empty 200; CORS headers are added by the outer layer.
async fn preflight(req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    next.run(req).await
}

async fn get_health() -> impl IntoResponse {
    Json(Health {
        status: "healthy",
        service: SERVICE_NAME,
    })
}

async fn post_scan(
    State(app): State<AppState>,
    payload: Result<Json<ScanRequest>, JsonRejection>,
) -> Result<Json<ScanReport>, ApiError> {
    let Json(req) = payload?;
    let target = ports::normalize(req)?;

    // Dropping the handler (client went away) cancels every in-flight probe.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let report = scanner::scan_with_prober(
        app.prober.clone(),
        &target.host,
        &target.ports,
        &app.scan,
        cancel,
    )
    .await;
    Ok(Json(report))
}

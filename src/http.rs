//! Small HTTP surface: the chat provider's login QR image and a health
//! summary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::info;

use crate::notifier::ChatNotifier;
use crate::registry::RecipientRegistry;

#[derive(Clone)]
pub struct HttpState {
    pub qr_image_path: PathBuf,
    pub registry: RecipientRegistry,
    pub notifier: Arc<dyn ChatNotifier>,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct HealthResponse {
    notifier: String,
    recipients: usize,
}

async fn qr_image(State(state): State<HttpState>) -> Response {
    match tokio::fs::read(&state.qr_image_path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/png")], bytes).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "QR code not found").into_response(),
    }
}

async fn health(State(state): State<HttpState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        notifier: state.notifier.readiness().to_string(),
        recipients: state.registry.len().await,
    })
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(qr_image))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn serve(port: u16, state: HttpState) -> Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("HTTP server running on port {}", port);

    axum::serve(listener, router(state))
        .await
        .context("HTTP server error")?;
    Ok(())
}

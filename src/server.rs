//! HTTP surface: Telegram webhook intake plus health and webhook registration.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::bot::UpdateHandler;
use crate::bridge::ExecutionBridge;
use crate::platform::telegram::{parse_update, webhook_url};

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    bridge: ExecutionBridge,
    handler: Arc<UpdateHandler>,
    secret_path: Arc<str>,
    external_hostname: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        bridge: ExecutionBridge,
        handler: Arc<UpdateHandler>,
        secret_path: &str,
        external_hostname: Option<&str>,
    ) -> Self {
        Self {
            bridge,
            handler,
            secret_path: Arc::from(secret_path),
            external_hostname: external_hostname.map(Arc::from),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/set_webhook", get(set_webhook))
        .route("/{secret}", post(webhook))
        .with_state(state)
}

/// Bind to `0.0.0.0:{port}` and serve until Ctrl-C
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Register `https://{hostname}/{secret_path}` with Telegram through the bridge
pub async fn register_webhook(
    bridge: &ExecutionBridge,
    hostname: Option<&str>,
    secret_path: &str,
) -> Result<()> {
    let hostname = hostname.context("RENDER_EXTERNAL_HOSTNAME is not configured")?;
    let url = webhook_url(hostname, secret_path);
    reqwest::Url::parse(&url).context("RENDER_EXTERNAL_HOSTNAME does not form a valid URL")?;

    bridge.ensure_initialized().await?;
    bridge
        .run(move |platform| async move { platform.set_webhook(&url).await })
        .await?;

    info!("Webhook registered for host {}", hostname);
    Ok(())
}

async fn health() -> &'static str {
    "OK"
}

async fn set_webhook(State(state): State<AppState>) -> (StatusCode, String) {
    match register_webhook(
        &state.bridge,
        state.external_hostname.as_deref(),
        &state.secret_path,
    )
    .await
    {
        Ok(()) => (StatusCode::OK, "Webhook registered".to_string()),
        Err(e) => {
            error!("Webhook registration failed: {:#}", e);
            // Outermost message only; inner causes may quote the secret URL
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to set webhook: {}", e),
            )
        }
    }
}

async fn webhook(
    State(state): State<AppState>,
    Path(secret): Path<String>,
    body: Bytes,
) -> Response {
    if secret != *state.secret_path {
        warn!("Rejected update posted to an unknown path");
        return StatusCode::NOT_FOUND.into_response();
    }

    acknowledge(intake(&state, &body).await).into_response()
}

/// Parse the update and run it on the bridge
async fn intake(state: &AppState, body: &[u8]) -> Result<()> {
    let Some(update) = parse_update(body)? else {
        info!("Webhook payload carried no message, nothing to do");
        return Ok(());
    };
    let (update_id, chat_id) = (update.update_id, update.chat_id);

    state.bridge.ensure_initialized().await?;

    let handler = state.handler.clone();
    state
        .bridge
        .run(move |platform| async move {
            handler.process_update(platform.as_ref(), &update).await
        })
        .await
        .with_context(|| format!("update {} in chat {}", update_id, chat_id))
}

/// Every webhook outcome maps to 200 so Telegram never redelivers.
fn acknowledge(outcome: Result<()>) -> (StatusCode, &'static str) {
    if let Err(e) = outcome {
        error!("Webhook processing failed: {:#}", e);
    }
    (StatusCode::OK, "OK")
}

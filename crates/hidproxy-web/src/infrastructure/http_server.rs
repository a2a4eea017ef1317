//! axum routes for the bulk macro service.
//!
//! | Route              | Answer                                              |
//! |--------------------|-----------------------------------------------------|
//! | `GET /macros.txt`  | every macro in the textual format                   |
//! | `POST /macros.txt` | replace every macro with the body; JSON outcome     |
//! | `GET /status`      | [`StatusReport`] as JSON                            |
//! | `POST /unseal`     | body is the password; [`UnsealResult`] as JSON      |
//!
//! The macro routes answer 403 while the web access window is closed and 423
//! while the device is sealed.  Those checks happen in executor D, which owns
//! the state they depend on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::application::MacroBackend;
use crate::domain::{StatusReport, UnsealResult, WebConfig, WebError};

/// Backend shared by every handler.
pub type SharedBackend = Arc<dyn MacroBackend>;

// ── Error mapping ─────────────────────────────────────────────────────────────

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({ "success": false, "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

// ── Routes ────────────────────────────────────────────────────────────────────

/// Builds the router.  Exposed separately from [`run_server`] so tests can
/// drive it without a socket.
pub fn router(backend: SharedBackend) -> Router {
    Router::new()
        .route("/macros.txt", get(get_macros).post(put_macros))
        .route("/status", get(status))
        .route("/unseal", post(unseal))
        .with_state(backend)
}

async fn get_macros(State(backend): State<SharedBackend>) -> Result<Response, WebError> {
    let text = backend.get_macros().await?;
    debug!(bytes = text.len(), "GET /macros.txt");
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response())
}

async fn put_macros(
    State(backend): State<SharedBackend>,
    body: String,
) -> Result<Json<serde_json::Value>, WebError> {
    let stored = backend.put_macros(body).await?;
    info!(stored, "macros replaced over http");
    Ok(Json(json!({
        "success": true,
        "message": "Macros updated successfully",
        "stored": stored,
    })))
}

async fn status(State(backend): State<SharedBackend>) -> Result<Json<StatusReport>, WebError> {
    Ok(Json(backend.status().await?))
}

async fn unseal(
    State(backend): State<SharedBackend>,
    body: String,
) -> Result<Json<UnsealResult>, WebError> {
    let password = zeroize::Zeroizing::new(body);
    let result = backend
        .unseal(password.trim_end_matches(&['\r', '\n'][..]))
        .await?;
    info!(success = result.success, "unseal over http");
    Ok(Json(result))
}

// ── Server ────────────────────────────────────────────────────────────────────

/// Serves the routes until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn run_server(
    config: WebConfig,
    backend: SharedBackend,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind http listener on {}", config.bind_addr))?;

    info!("macro service listening on {}", config.bind_addr);

    axum::serve(listener, router(backend))
        .with_graceful_shutdown(async move {
            while running.load(Ordering::Relaxed) {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            info!("shutdown flag set; stopping http server");
        })
        .await
        .context("http server failed")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! HTTP surface: WhatsApp webhooks, catalog reload, and uploaded media.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use crate::channels::whatsapp::{WebhookPayload, WhatsAppChannel};
use crate::conversation::ConversationRouter;

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ConversationRouter>,
    /// `None` when WhatsApp is not configured; its routes answer 404.
    pub whatsapp: Option<Arc<WhatsAppChannel>>,
    /// Where the catalog is reloaded from.
    pub catalog_path: Option<PathBuf>,
    pub admin_token: Option<SecretString>,
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// GET /health
async fn health() -> &'static str {
    "ok"
}

/// GET /webhooks/whatsapp
///
/// Subscription handshake: echoes `hub.challenge` when the verify token
/// matches.
async fn verify_whatsapp(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(whatsapp) = state.whatsapp else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match whatsapp.verify_subscription(
        params.get("hub.mode").map(String::as_str),
        params.get("hub.verify_token").map(String::as_str),
        params.get("hub.challenge").map(String::as_str),
    ) {
        Some(challenge) => (StatusCode::OK, challenge).into_response(),
        None => {
            warn!("WhatsApp webhook verification rejected");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// POST /webhooks/whatsapp
///
/// Acknowledges immediately; events are handled in the background.
async fn receive_whatsapp(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(whatsapp) = state.whatsapp else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok());
    if !whatsapp.verify_signature(&body, signature) {
        warn!("WhatsApp webhook signature rejected");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "Malformed WhatsApp webhook body");
            return json_error(StatusCode::BAD_REQUEST, "malformed payload");
        }
    };

    let events = whatsapp.events(&payload);
    debug!(count = events.len(), "WhatsApp webhook received");
    if !events.is_empty() {
        tokio::spawn(async move {
            state.router.handle_batch(whatsapp.as_ref(), events).await;
        });
    }
    StatusCode::OK.into_response()
}

/// POST /admin/catalog/reload
///
/// Re-reads the message catalog from disk and swaps it in atomically.
async fn reload_catalog(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(expected) = &state.admin_token else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented != Some(expected.expose_secret()) {
        return json_error(StatusCode::UNAUTHORIZED, "invalid admin token");
    }

    let Some(path) = &state.catalog_path else {
        return json_error(StatusCode::CONFLICT, "no catalog path configured");
    };

    match state.router.catalog().reload(path).await {
        Ok(locales) => Json(serde_json::json!({ "reloaded": true, "locales": locales })).into_response(),
        Err(e) => {
            error!(error = %e, "Catalog reload failed; keeping current catalog");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Build the HTTP routes. Files under `media_dir` are served at `/media`.
pub fn routes(state: AppState, media_dir: &Path) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/webhooks/whatsapp",
            get(verify_whatsapp).post(receive_whatsapp),
        )
        .route("/admin/catalog/reload", post(reload_catalog))
        .nest_service("/media", ServeDir::new(media_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

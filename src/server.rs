//! Webhook ingestion — an axum server receiving Telegram updates by POST.
//!
//! Alternative to the long-poll listener in
//! [`crate::notify::telegram::TelegramNotifier::spawn_update_listener`];
//! exactly one of the two runs per deployment. The handler always answers
//! `{"ok": true}` so the chat platform never retries an update the
//! workflow already consumed.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;

use crate::notify::{Notifier, dispatch_update, telegram};
use crate::workflow::Workflow;

/// Shared handles for the webhook routes.
#[derive(Clone)]
pub struct AppState {
    pub notifier: Arc<dyn Notifier>,
    pub workflow: Arc<Workflow>,
    /// Updates from any other chat are dropped.
    pub operator_chat_id: i64,
}

/// Build the webhook router.
pub fn webhook_routes(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(receive_update))
        .route("/health", get(health))
        .with_state(state)
}

/// Receive one serialized chat-platform update.
///
/// Malformed or irrelevant updates are dropped after logging; the response
/// is `{"ok": true}` either way.
async fn receive_update(
    State(state): State<AppState>,
    Json(update): Json<Value>,
) -> impl IntoResponse {
    match telegram::parse_update(&update, state.operator_chat_id) {
        Some(inbound) => {
            tracing::debug!(?inbound, "Webhook update accepted");
            dispatch_update(inbound, state.notifier.as_ref(), &state.workflow).await;
        }
        None => {
            tracing::debug!("Webhook update dropped");
        }
    }

    Json(serde_json::json!({ "ok": true }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

//! HTTP surface: health, workflow status and the bank's push endpoint.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use monoledger_bank::WebhookEvent;
use monoledger_core::{ApprovalQueue, Phase};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const HEALTH: &str = "work1n'!";
pub const PUSH_ACK: &str = "Thx!";
pub const HEALTH_PATH: &str = "/";
pub const STATUS_PATH: &str = "/status";

#[derive(Clone)]
pub struct AppState {
    pub queue: ApprovalQueue,
    pub account: String,
    pub phase: watch::Receiver<Phase>,
}

#[derive(Debug, Serialize)]
struct StatusBody {
    #[serde(flatten)]
    phase: Phase,
    queued: usize,
}

/// `webhook_path` mounts the push endpoint; `None` in polling mode.
pub fn router(state: AppState, webhook_path: Option<&str>) -> Router {
    let mut app = Router::new()
        .route(HEALTH_PATH, get(health))
        .route(STATUS_PATH, get(status));
    if let Some(path) = webhook_path {
        app = app.route(path, get(verify_push).post(push));
    }
    app.with_state(state)
}

async fn health() -> &'static str {
    HEALTH
}

async fn status(State(state): State<AppState>) -> Json<StatusBody> {
    let phase = state.phase.borrow().clone();
    Json(StatusBody {
        phase,
        queued: state.queue.depth(),
    })
}

/// The bank sends a GET to the URL when the webhook is registered.
async fn verify_push() -> StatusCode {
    StatusCode::OK
}

/// Always acknowledged; only statement items for our account are queued.
async fn push(State(state): State<AppState>, body: Bytes) -> &'static str {
    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "unreadable push body");
            return PUSH_ACK;
        }
    };
    match event.into_transaction_for(&state.account) {
        Some(txn) => {
            info!(id = %txn.id, "statement item pushed");
            if let Err(e) = state.queue.submit(txn) {
                warn!(error = %e, "approval queue closed, push dropped");
            }
        }
        None => debug!("push ignored: not a statement item for this account"),
    }
    PUSH_ACK
}

//! Ephemeral signal relay.
//!
//! A deliberately tiny HTTP service that lets two peers exchange their
//! encoded offer/answer signals under a shared session id. It holds no
//! connection state and inspects no payloads; records expire on their
//! own. See [`store::SignalStore`] for the retention rules.

#![forbid(unsafe_code)]

pub mod store;

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use store::SignalStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SignalStore>,
}

#[derive(Deserialize)]
struct SignalQuery {
    #[serde(default)]
    session_id: String,
}

/// Absent sides serialize as explicit nulls; clients poll until both
/// keys are non-null.
#[derive(Serialize)]
struct SignalResponse {
    offer: Option<String>,
    answer: Option<String>,
}

#[derive(Deserialize)]
struct SignalUpdate {
    #[serde(default)]
    session_id: String,
    offer: Option<String>,
    answer: Option<String>,
}

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn missing_session_id() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: "session_id is required".to_string(),
        }),
    )
}

async fn get_signal(
    State(state): State<AppState>,
    Query(query): Query<SignalQuery>,
) -> impl IntoResponse {
    if query.session_id.is_empty() {
        return missing_session_id().into_response();
    }
    let signals = state.store.fetch(&query.session_id).await;
    Json(SignalResponse {
        offer: signals.offer,
        answer: signals.answer,
    })
    .into_response()
}

async fn post_signal(
    State(state): State<AppState>,
    Json(update): Json<SignalUpdate>,
) -> impl IntoResponse {
    if update.session_id.is_empty() {
        return missing_session_id().into_response();
    }
    match state
        .store
        .upsert(&update.session_id, update.offer, update.answer)
        .await
    {
        Ok(()) => Json(OkResponse { ok: true }).into_response(),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
            .into_response(),
    }
}

#[derive(Serialize)]
struct RuntimeMetrics {
    active_sessions: usize,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let active_sessions = state.store.len().await;
    Json(RuntimeMetrics { active_sessions })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "Peerdeck Relay Online" }))
        .route("/health", get(health))
        .route("/signal", get(get_signal).post(post_signal))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE]),
        )
        .with_state(state)
}

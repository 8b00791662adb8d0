// HTTP handlers and routing for the display client.

use axum::extract::State as AxumState;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{info, warn};

use crate::app::AppState;
use crate::settings::SettingsPatch;
use crate::utils::now_epoch_ms;
use crate::ws::ws_handler;

mod types;
pub use types::*;

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(get_status))
        .route("/toggle", post(toggle))
        .route("/settings", get(get_settings).post(update_settings))
        .route("/ws", get(ws_handler))
        .with_state(app_state)
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

async fn get_status(AxumState(app_state): AxumState<AppState>) -> impl IntoResponse {
    Json(StatusResponse::from_status(
        app_state.monitor.status(),
        now_epoch_ms(),
    ))
}

async fn toggle(AxumState(app_state): AxumState<AppState>) -> impl IntoResponse {
    let enabled = app_state.monitor.toggle_enable_disable().await;
    Json(ToggleResponse {
        enabled,
        status: app_state.monitor.status(),
    })
}

async fn get_settings(AxumState(app_state): AxumState<AppState>) -> impl IntoResponse {
    Json(app_state.monitor.settings().get())
}

async fn update_settings(
    AxumState(app_state): AxumState<AppState>,
    Json(patch): Json<SettingsPatch>,
) -> impl IntoResponse {
    match app_state.monitor.settings().update(&patch) {
        Ok(settings) => {
            info!(host = %settings.host, port = settings.port, "settings updated");
            (StatusCode::OK, Json(settings)).into_response()
        }
        Err(err) => {
            warn!(error = %err, "rejected settings update");
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}

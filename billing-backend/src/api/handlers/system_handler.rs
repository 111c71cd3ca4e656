// billing-backend/src/api/handlers/system_handler.rs

use crate::api::{dto::common::ApiResponse, AppState};
use crate::db;
use crate::error::AppResult;
use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub environment: String,
    pub payment_development_mode: bool,
}

/// 稼働確認（DB疎通を含む）
pub async fn health_handler(
    State(app_state): State<AppState>,
) -> AppResult<Json<ApiResponse<HealthResponse>>> {
    db::ping(&app_state.db).await?;

    Ok(Json(ApiResponse::success(
        "Service is healthy",
        HealthResponse {
            status: "ok".to_string(),
            database: "connected".to_string(),
            environment: app_state.config.environment.clone(),
            payment_development_mode: app_state.stripe_config.development_mode,
        },
    )))
}

pub fn system_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(app_state)
}

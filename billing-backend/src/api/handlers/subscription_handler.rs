// billing-backend/src/api/handlers/subscription_handler.rs

use crate::api::dto::common::ApiResponse;
use crate::api::dto::subscription_dto::{AccessQuery, AccessResponse, SubscriptionResponse};
use crate::api::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use axum::{
    extract::{Json, Query, State},
    routing::get,
    Router,
};

/// 現在のサブスクリプションを取得（なければ data: null）
pub async fn get_current_subscription_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<ApiResponse<Option<SubscriptionResponse>>>> {
    let subscription = app_state
        .subscription_service
        .get_current_subscription(user.user_id)
        .await?
        .map(SubscriptionResponse::from);

    Ok(Json(ApiResponse::success(
        "Current subscription retrieved successfully",
        subscription,
    )))
}

/// 階層によるアクセス判定
pub async fn check_access_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<AccessQuery>,
) -> AppResult<Json<ApiResponse<AccessResponse>>> {
    let tiers = query.parse_tiers().map_err(AppError::BadRequest)?;

    let has_access = app_state
        .subscription_service
        .check_access(user.user_id, &tiers)
        .await?;

    tracing::debug!(user_id = %user.user_id, ?tiers, has_access, "Subscription access checked");

    Ok(Json(ApiResponse::success(
        "Subscription access checked",
        AccessResponse { has_access },
    )))
}

pub fn subscription_router(app_state: AppState) -> Router {
    Router::new()
        .route("/subscriptions/current", get(get_current_subscription_handler))
        .route("/subscriptions/access", get(check_access_handler))
        .with_state(app_state)
}

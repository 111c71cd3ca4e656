// billing-backend/src/api/handlers/payment_handler.rs

use crate::api::dto::common::ApiResponse;
use crate::api::dto::payment_dto::{
    CreateCheckoutRequest, CreatePortalRequest, PaymentHistoryItem, SessionUrlResponse,
};
use crate::api::AppState;
use crate::domain::subscription_tier::SubscriptionTier;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use axum::{
    extract::{Json, State},
    routing::{get, post},
    Router,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

// トークンの sub とリクエストの user_id が一致しなければ拒否
fn ensure_same_user(user: &AuthenticatedUser, requested: Uuid) -> AppResult<()> {
    if user.user_id != requested {
        tracing::warn!(
            token_user_id = %user.user_id,
            requested_user_id = %requested,
            "User ID does not match authenticated user"
        );
        return Err(AppError::Unauthorized(
            "user_id does not match the authenticated user".to_string(),
        ));
    }
    Ok(())
}

/// チェックアウトセッション作成
pub async fn create_checkout_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateCheckoutRequest>,
) -> AppResult<Json<SessionUrlResponse>> {
    payload.validate()?;
    ensure_same_user(&user, payload.user_id)?;

    let tier = SubscriptionTier::from_str(&payload.tier)
        .ok_or_else(|| AppError::BadRequest("Invalid tier".to_string()))?;

    info!(user_id = %user.user_id, tier = %tier, "Creating checkout session");

    let url = app_state
        .payment_service
        .create_checkout_session(user.user_id, user.email.as_deref(), tier)
        .await?;

    info!(user_id = %user.user_id, "Checkout session created successfully");

    Ok(Json(SessionUrlResponse { url }))
}

/// カスタマーポータルセッション作成
pub async fn create_customer_portal_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreatePortalRequest>,
) -> AppResult<Json<SessionUrlResponse>> {
    ensure_same_user(&user, payload.user_id)?;

    info!(user_id = %user.user_id, "Creating customer portal session");

    let url = app_state
        .payment_service
        .create_customer_portal_url(user.user_id)
        .await?;

    Ok(Json(SessionUrlResponse { url }))
}

/// 支払い履歴を取得
pub async fn get_payment_history_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<ApiResponse<Vec<PaymentHistoryItem>>>> {
    info!(user_id = %user.user_id, "Getting payment history");

    let items: Vec<PaymentHistoryItem> = app_state
        .payment_service
        .get_payment_history(user.user_id)
        .await?
        .into_iter()
        .map(PaymentHistoryItem::from)
        .collect();

    Ok(Json(ApiResponse::success(
        "Payment history retrieved successfully",
        items,
    )))
}

/// 決済関連のルーター
pub fn payment_router(app_state: AppState) -> Router {
    Router::new()
        .route("/payments/checkout", post(create_checkout_handler))
        .route("/payments/portal", post(create_customer_portal_handler))
        .route("/payments/history", get(get_payment_history_handler))
        .with_state(app_state)
}

// billing-backend/src/api/handlers/webhook_handler.rs

use crate::api::dto::webhook_dto::WebhookAckResponse;
use crate::api::AppState;
use crate::error::{AppError, AppResult};
use axum::{
    body::Bytes,
    extract::{Json, State},
    http::HeaderMap,
    routing::post,
    Router,
};

/// Stripe Webhookハンドラー
///
/// ボディは署名検証のため生のバイト列のまま受け取る。
pub async fn stripe_webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAckResponse>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok());

    let receipt = app_state
        .sync_service
        .handle_webhook(&body, signature)
        .await
        .map_err(AppError::WebhookRejected)?;

    Ok(Json(receipt.into()))
}

/// Webhook受信用のルーター（認証不要）
pub fn webhook_router(app_state: AppState) -> Router {
    Router::new()
        .route("/webhooks/stripe", post(stripe_webhook_handler))
        .with_state(app_state)
}

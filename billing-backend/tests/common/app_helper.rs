// tests/common/app_helper.rs

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use billing_backend::{
    api::{create_router, AppState},
    config::{AppConfig, StripeConfig},
    service::billing_provider::DevelopmentBillingProvider,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use crate::common;

/// 開発モードのプロバイダでアプリ全体をセットアップ
pub async fn setup_app() -> (Router, common::db::TestDatabase) {
    let db = common::db::TestDatabase::new().await;

    let app_config = AppConfig::for_testing();
    let stripe_config = StripeConfig::for_testing();
    let provider = Arc::new(DevelopmentBillingProvider::new(&app_config.site_url));

    let app_state = AppState::new(db.connection.clone(), app_config, stripe_config, provider)
        .expect("build app state");

    (create_router(app_state), db)
}

/// レスポンスボディをJSONとして読み出す
pub async fn read_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&body).unwrap()
}

/// Webhookを送信してステータスとボディを返す
pub async fn post_webhook(
    app: &Router,
    payload: &str,
    signature: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header("Content-Type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("stripe-signature", signature);
    }

    let response = app
        .clone()
        .oneshot(builder.body(Body::from(payload.to_string())).unwrap())
        .await
        .unwrap();

    let status = response.status();
    (status, read_json(response).await)
}

/// 署名付きでWebhookを送信
pub async fn post_signed_webhook(app: &Router, payload: &str) -> (StatusCode, Value) {
    let signature = common::stripe_helper::generate_test_webhook_signature(payload);
    post_webhook(app, payload, Some(&signature)).await
}

/// 認証付きJSONリクエスト
pub async fn authed_request(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }

    let body = body.map_or_else(Body::empty, |b| Body::from(b.to_string()));
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    (status, read_json(response).await)
}

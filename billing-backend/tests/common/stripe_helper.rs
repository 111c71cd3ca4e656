// tests/common/stripe_helper.rs

use billing_backend::config::StripeConfig;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use uuid::Uuid;

/// 2024-01-01T00:00:00Z から始まる月次の請求期間
pub const PERIOD_1_START: i64 = 1_704_067_200;
pub const PERIOD_1_END: i64 = 1_706_745_600;
pub const PERIOD_2_END: i64 = 1_709_251_200;

/// テスト用のWebhookイベントペイロードを作成
pub fn create_test_webhook_payload(event_type: &str, data: Value) -> String {
    json!({
        "id": format!("evt_test_{}", Uuid::new_v4().simple()),
        "object": "event",
        "api_version": "2024-04-10",
        "created": chrono::Utc::now().timestamp(),
        "data": {
            "object": data
        },
        "livemode": false,
        "pending_webhooks": 1,
        "request": {
            "id": null,
            "idempotency_key": null
        },
        "type": event_type
    })
    .to_string()
}

/// サブスクリプションオブジェクト（必要最小限のフィールド）
pub fn subscription_object(
    subscription_id: &str,
    customer_id: &str,
    status: &str,
    period_end: i64,
    user_id: Option<Uuid>,
) -> Value {
    let metadata = match user_id {
        Some(user_id) => json!({ "user_id": user_id.to_string() }),
        None => json!({}),
    };

    json!({
        "id": subscription_id,
        "object": "subscription",
        "customer": customer_id,
        "status": status,
        "cancel_at_period_end": false,
        "cancel_at": null,
        "canceled_at": null,
        "ended_at": null,
        "trial_start": null,
        "trial_end": null,
        "metadata": metadata,
        "items": {
            "object": "list",
            "data": [{
                "id": format!("si_{}", subscription_id),
                "object": "subscription_item",
                "quantity": 1,
                "current_period_start": period_end - (PERIOD_1_END - PERIOD_1_START),
                "current_period_end": period_end,
                "price": {
                    "id": "price_test_pro",
                    "object": "price",
                    "product": "prod_test_pro"
                }
            }]
        }
    })
}

/// 請求書オブジェクト
pub fn invoice_object(invoice_id: &str, customer_id: &str, subscription_id: Option<&str>) -> Value {
    json!({
        "id": invoice_id,
        "object": "invoice",
        "customer": customer_id,
        "subscription": subscription_id,
        "amount_paid": 2000,
        "amount_due": 2000,
        "currency": "usd",
        "status": "paid",
        "metadata": {}
    })
}

/// チェックアウトセッションオブジェクト
pub fn checkout_session_object(session_id: &str, customer_id: &str, user_id: Uuid) -> Value {
    json!({
        "id": session_id,
        "object": "checkout.session",
        "customer": customer_id,
        "client_reference_id": user_id.to_string(),
        "mode": "subscription",
        "subscription": "sub_from_checkout",
        "metadata": {
            "user_id": user_id.to_string(),
            "tier": "pro"
        }
    })
}

/// 任意のシークレットと時刻で署名ヘッダーを生成
pub fn generate_webhook_signature_at(payload: &str, secret: &str, timestamp: i64) -> String {
    // 署名ペイロードを作成
    let signed_payload = format!("{}.{}", timestamp, payload);

    // HMAC-SHA256で署名
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(signed_payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    // Stripe形式の署名ヘッダーを作成
    format!("t={},v1={}", timestamp, signature)
}

/// テスト設定のシークレットで現在時刻の署名を生成
pub fn generate_test_webhook_signature(payload: &str) -> String {
    generate_webhook_signature_at(
        payload,
        &StripeConfig::for_testing().webhook_secret,
        chrono::Utc::now().timestamp(),
    )
}

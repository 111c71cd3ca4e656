// tests/common/auth_helper.rs

use billing_backend::config::AppConfig;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use uuid::Uuid;

/// 認証プロバイダ相当のトークンを発行
pub fn create_test_token(user_id: Uuid) -> String {
    let config = AppConfig::for_testing();
    let claims = json!({
        "sub": user_id.to_string(),
        "aud": config.auth.jwt_audience,
        "exp": chrono::Utc::now().timestamp() + 3600,
        "email": format!("user_{}@example.com", user_id.simple()),
        "role": "authenticated"
    });

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.auth.jwt_secret.as_bytes()),
    )
    .unwrap()
}

/// 署名鍵の異なるトークン
pub fn create_forged_token(user_id: Uuid) -> String {
    let claims = json!({
        "sub": user_id.to_string(),
        "aud": "authenticated",
        "exp": chrono::Utc::now().timestamp() + 3600
    });

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"forged-secret-forged-secret-forged"),
    )
    .unwrap()
}

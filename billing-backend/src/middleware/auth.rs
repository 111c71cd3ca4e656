// billing-backend/src/middleware/auth.rs

use crate::error::AppError;
use crate::utils::jwt::{JwtError, JwtVerifier};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// 認証済みユーザー
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: Option<String>,
}

/// JWT検証器を提供するトレイト
pub trait HasJwtVerifier {
    fn jwt_verifier(&self) -> &Arc<JwtVerifier>;
}

/// Authorization ヘッダーから Bearer トークンを取得
fn extract_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|auth_str| auth_str.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: HasJwtVerifier + Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers).ok_or_else(|| {
            warn!("Authentication attempt without token");
            AppError::Unauthorized("Missing authentication token".to_string())
        })?;

        let claims = state.jwt_verifier().verify(token).map_err(|e| {
            warn!(error = %e, "JWT verification failed");
            match e {
                JwtError::TokenExpired => {
                    AppError::Unauthorized("Access token has expired".to_string())
                }
                _ => AppError::Unauthorized("Invalid access token".to_string()),
            }
        })?;

        let user_id = claims
            .user_id()
            .map_err(|_| AppError::Unauthorized("Invalid token subject".to_string()))?;

        debug!(user_id = %user_id, "User authenticated");

        Ok(AuthenticatedUser {
            user_id,
            email: claims.email,
        })
    }
}

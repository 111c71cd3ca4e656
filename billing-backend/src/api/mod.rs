// billing-backend/src/api/mod.rs
use crate::config::{AppConfig, StripeConfig};
use crate::db::DbPool;
use crate::logging::{inject_request_context, logging_middleware};
use crate::middleware::auth::HasJwtVerifier;
use crate::service::{
    billing_provider::BillingProvider, payment_service::PaymentService,
    subscription_service::SubscriptionService, subscription_sync_service::SubscriptionSyncService,
};
use crate::utils::jwt::{JwtError, JwtVerifier};
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub mod dto;
pub mod handlers;

/// 統一されたアプリケーション状態
#[derive(Clone)]
pub struct AppState {
    pub payment_service: Arc<PaymentService>,
    pub subscription_service: Arc<SubscriptionService>,
    pub sync_service: Arc<SubscriptionSyncService>,
    pub jwt_verifier: Arc<JwtVerifier>,
    pub db: DbPool,
    pub config: Arc<AppConfig>,
    pub stripe_config: Arc<StripeConfig>,
}

impl AppState {
    pub fn new(
        db: DbPool,
        config: AppConfig,
        stripe_config: StripeConfig,
        provider: Arc<dyn BillingProvider>,
    ) -> Result<Self, JwtError> {
        let config = Arc::new(config);
        let stripe_config = Arc::new(stripe_config);
        let jwt_verifier = Arc::new(JwtVerifier::new(
            &config.auth.jwt_secret,
            &config.auth.jwt_audience,
        )?);

        Ok(Self {
            payment_service: Arc::new(PaymentService::new(
                db.clone(),
                provider,
                stripe_config.clone(),
                config.site_url.clone(),
            )),
            subscription_service: Arc::new(SubscriptionService::new(db.clone())),
            sync_service: Arc::new(SubscriptionSyncService::new(
                db.clone(),
                stripe_config.clone(),
            )),
            jwt_verifier,
            db,
            config,
            stripe_config,
        })
    }
}

impl HasJwtVerifier for AppState {
    fn jwt_verifier(&self) -> &Arc<JwtVerifier> {
        &self.jwt_verifier
    }
}

/// CORS設定（許可オリジンは設定から）
fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

/// 全ルーターを統合したアプリケーションルーターを作成
pub fn create_router(app_state: AppState) -> Router {
    let body_limit = app_state.config.server.body_limit;
    let cors = cors_layer(&app_state.config);

    Router::new()
        .merge(handlers::webhook_handler::webhook_router(app_state.clone()))
        .merge(handlers::payment_handler::payment_router(app_state.clone()))
        .merge(handlers::subscription_handler::subscription_router(
            app_state.clone(),
        ))
        .merge(handlers::system_handler::system_router(app_state))
        .layer(axum::middleware::from_fn(logging_middleware))
        .layer(axum::middleware::from_fn(inject_request_context))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors)
}

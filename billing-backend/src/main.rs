// billing-backend/src/main.rs
use billing_backend::api::{create_router, AppState};
use billing_backend::config::{AppConfig, StripeConfig};
use billing_backend::db::{create_db_pool, run_migrations};
use billing_backend::service::billing_provider::billing_provider_from_config;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env ファイルを読み込む (存在しなくてもエラーにしない)
    dotenvy::dotenv().ok();

    // トレーシングの設定
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "billing_backend=info,tower_http=info".into()),
        )
        .with(fmt::layer())
        .init();

    tracing::info!("Starting billing backend server...");

    // 設定を読み込む
    let app_config = AppConfig::from_env().inspect_err(|e| {
        tracing::error!(error = %e, "Failed to load application configuration");
    })?;
    let stripe_config = StripeConfig::from_env().inspect_err(|e| {
        tracing::error!(error = %e, "Failed to load Stripe configuration");
    })?;

    tracing::info!(
        environment = %app_config.environment,
        payment_development_mode = stripe_config.development_mode,
        stripe_test_mode = stripe_config.is_test_mode(),
        "Configuration loaded"
    );

    if app_config.is_production() && stripe_config.development_mode {
        tracing::warn!("Payment development mode is enabled in production; checkout returns mock URLs");
    }

    // データベース接続とマイグレーション
    let db_pool = create_db_pool(&app_config).await?;
    run_migrations(&db_pool).await?;
    tracing::info!("Database connected and migrations applied");

    // 決済プロバイダは起動時に一度だけ生成して注入する
    let provider = billing_provider_from_config(&stripe_config, &app_config.site_url);

    let server_addr = app_config.server_addr();
    let app_state = AppState::new(db_pool, app_config, stripe_config, provider)?;
    let app_router = create_router(app_state);

    let listener = TcpListener::bind(&server_addr).await?;
    tracing::info!("Server listening on {}", server_addr);

    axum::serve(listener, app_router.into_make_service()).await?;

    Ok(())
}

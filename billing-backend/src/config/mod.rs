// billing-backend/src/config/mod.rs
pub mod app;
pub mod stripe;

pub use app::AppConfig;
pub use stripe::StripeConfig;

use thiserror::Error;

/// 起動時の設定エラー
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    MissingVar(&'static str),

    #[error("Invalid {name} value: {reason}")]
    InvalidValue { name: &'static str, reason: String },

    #[error("{name} is a product ID ({value}), but it should be a price ID (starting with 'price_')")]
    ProductIdAsPrice { name: &'static str, value: String },
}

/// 必須の環境変数を読み込む
pub(crate) fn required_var(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingVar(name))
}

use super::{required_var, ConfigError};
use crate::domain::subscription_tier::SubscriptionTier;
use std::env;

const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Clone, Debug)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub starter_price_id: String,
    pub pro_price_id: String,
    pub enterprise_price_id: String,
    /// 署名タイムスタンプの許容誤差（秒）
    pub webhook_tolerance_secs: i64,
    pub development_mode: bool,
}

impl StripeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let development_mode = env::var("PAYMENT_DEVELOPMENT_MODE")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let webhook_tolerance_secs = match env::var("STRIPE_WEBHOOK_TOLERANCE_SECS") {
            Ok(raw) => raw.parse::<i64>().ok().filter(|v| *v > 0).ok_or_else(|| {
                ConfigError::InvalidValue {
                    name: "STRIPE_WEBHOOK_TOLERANCE_SECS",
                    reason: "must be a positive number of seconds".to_string(),
                }
            })?,
            Err(_) => DEFAULT_WEBHOOK_TOLERANCE_SECS,
        };

        // Webhookの署名検証は開発モードでも省略しない
        let webhook_secret = env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_else(|_| {
            tracing::warn!("STRIPE_WEBHOOK_SECRET not set - every webhook will be rejected");
            String::new()
        });

        if development_mode {
            tracing::info!("Payment development mode enabled - using mock responses");
            return Ok(Self {
                secret_key: String::new(),
                webhook_secret,
                starter_price_id: env::var("STRIPE_STARTER_PRICE_ID")
                    .unwrap_or_else(|_| "price_dev_starter".to_string()),
                pro_price_id: env::var("STRIPE_PRO_PRICE_ID")
                    .unwrap_or_else(|_| "price_dev_pro".to_string()),
                enterprise_price_id: env::var("STRIPE_ENTERPRISE_PRICE_ID")
                    .unwrap_or_else(|_| "price_dev_enterprise".to_string()),
                webhook_tolerance_secs,
                development_mode: true,
            });
        }

        // 本番/テストモードの設定
        let secret_key = required_var("STRIPE_SECRET_KEY")?;
        let starter_price_id = price_id_var("STRIPE_STARTER_PRICE_ID")?;
        let pro_price_id = price_id_var("STRIPE_PRO_PRICE_ID")?;
        let enterprise_price_id = price_id_var("STRIPE_ENTERPRISE_PRICE_ID")?;

        Ok(Self {
            secret_key,
            webhook_secret,
            starter_price_id,
            pro_price_id,
            enterprise_price_id,
            webhook_tolerance_secs,
            development_mode: false,
        })
    }

    pub fn is_test_mode(&self) -> bool {
        self.secret_key.starts_with("sk_test_") || self.development_mode
    }

    pub fn get_price_id(&self, tier: SubscriptionTier) -> &str {
        match tier {
            SubscriptionTier::Starter => &self.starter_price_id,
            SubscriptionTier::Pro => &self.pro_price_id,
            SubscriptionTier::Enterprise => &self.enterprise_price_id,
        }
    }

    /// 価格IDから階層を逆引き（未知の価格IDはNone）
    pub fn tier_for_price(&self, price_id: &str) -> Option<SubscriptionTier> {
        SubscriptionTier::all()
            .into_iter()
            .find(|tier| self.get_price_id(*tier) == price_id)
    }

    /// テスト用の設定を作成
    pub fn for_testing() -> Self {
        Self {
            secret_key: String::new(),
            webhook_secret: "whsec_test_secret".to_string(),
            starter_price_id: "price_test_starter".to_string(),
            pro_price_id: "price_test_pro".to_string(),
            enterprise_price_id: "price_test_enterprise".to_string(),
            webhook_tolerance_secs: DEFAULT_WEBHOOK_TOLERANCE_SECS,
            development_mode: true,
        }
    }
}

// 価格IDの形式を検証
fn price_id_var(name: &'static str) -> Result<String, ConfigError> {
    let value = required_var(name)?;
    validate_price_id(name, value)
}

fn validate_price_id(name: &'static str, value: String) -> Result<String, ConfigError> {
    if value.starts_with("prod_") {
        tracing::error!(variable = name, value = %value, "Product ID configured as price ID");
        return Err(ConfigError::ProductIdAsPrice { name, value });
    }
    Ok(value)
}

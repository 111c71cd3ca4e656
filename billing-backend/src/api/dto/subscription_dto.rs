// billing-backend/src/api/dto/subscription_dto.rs

use crate::domain::subscription_model;
use crate::domain::subscription_tier::SubscriptionTier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    pub id: Uuid,
    pub stripe_subscription_id: String,
    pub status: String,
    pub tier: Option<String>,
    pub stripe_price_id: Option<String>,
    pub quantity: i32,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub cancel_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl From<subscription_model::Model> for SubscriptionResponse {
    fn from(model: subscription_model::Model) -> Self {
        let is_active = model.is_active();
        Self {
            id: model.id,
            stripe_subscription_id: model.stripe_subscription_id,
            status: model.status,
            tier: model.tier,
            stripe_price_id: model.stripe_price_id,
            quantity: model.quantity,
            current_period_start: model.current_period_start,
            current_period_end: model.current_period_end,
            trial_end: model.trial_end,
            cancel_at_period_end: model.cancel_at_period_end,
            cancel_at: model.cancel_at,
            is_active,
        }
    }
}

/// `?tiers=pro,enterprise`
#[derive(Debug, Default, Deserialize)]
pub struct AccessQuery {
    pub tiers: Option<String>,
}

impl AccessQuery {
    /// カンマ区切りの階層を解析する（不正な値はエラーメッセージとして返す）
    pub fn parse_tiers(&self) -> Result<Vec<SubscriptionTier>, String> {
        self.tiers
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(|raw| raw.parse::<SubscriptionTier>())
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessResponse {
    pub has_access: bool,
}

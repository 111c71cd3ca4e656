// billing-backend/src/domain/subscription_model.rs

use super::subscription_status::SubscriptionStatus;
use super::subscription_tier::SubscriptionTier;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subscriptions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    #[sea_orm(unique)]
    pub stripe_subscription_id: String,

    pub stripe_customer_id: String,

    pub status: String,

    #[sea_orm(nullable)]
    pub tier: Option<String>,

    #[sea_orm(nullable)]
    pub stripe_price_id: Option<String>,

    #[sea_orm(nullable)]
    pub stripe_product_id: Option<String>,

    pub quantity: i32,

    #[sea_orm(nullable)]
    pub current_period_start: Option<DateTime<Utc>>,

    #[sea_orm(nullable)]
    pub current_period_end: Option<DateTime<Utc>>,

    #[sea_orm(nullable)]
    pub trial_start: Option<DateTime<Utc>>,

    #[sea_orm(nullable)]
    pub trial_end: Option<DateTime<Utc>>,

    #[sea_orm(nullable)]
    pub cancel_at: Option<DateTime<Utc>>,

    pub cancel_at_period_end: bool,

    #[sea_orm(nullable)]
    pub canceled_at: Option<DateTime<Utc>>,

    #[sea_orm(nullable)]
    pub ended_at: Option<DateTime<Utc>>,

    #[sea_orm(nullable)]
    pub metadata: Option<Json>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// 保存済みステータスを列挙型で取得（未知の値はNone）
    pub fn status_enum(&self) -> Option<SubscriptionStatus> {
        self.status.parse().ok()
    }

    pub fn tier_enum(&self) -> Option<SubscriptionTier> {
        self.tier.as_deref().and_then(SubscriptionTier::from_str)
    }

    pub fn is_active(&self) -> bool {
        self.status_enum()
            .is_some_and(|status| status.grants_access())
    }
}

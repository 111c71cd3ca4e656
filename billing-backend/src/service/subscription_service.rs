// billing-backend/src/service/subscription_service.rs

use crate::db::DbPool;
use crate::domain::subscription_model;
use crate::domain::subscription_tier::SubscriptionTier;
use crate::error::AppResult;
use crate::repository::subscription_repository::SubscriptionRepository;
use std::sync::Arc;
use uuid::Uuid;

/// サブスクリプション状態の参照
#[derive(Clone)]
pub struct SubscriptionService {
    subscription_repo: Arc<SubscriptionRepository>,
}

impl SubscriptionService {
    pub fn new(db: DbPool) -> Self {
        Self {
            subscription_repo: Arc::new(SubscriptionRepository::new(db)),
        }
    }

    /// 最新の有効なサブスクリプション（なければNone）
    pub async fn get_current_subscription(
        &self,
        user_id: Uuid,
    ) -> AppResult<Option<subscription_model::Model>> {
        Ok(self.subscription_repo.find_active_by_user_id(user_id).await?)
    }

    /// 有効なサブスクリプションがあり、階層が指定されていればその中に含まれるか
    pub async fn check_access(
        &self,
        user_id: Uuid,
        required_tiers: &[SubscriptionTier],
    ) -> AppResult<bool> {
        let Some(subscription) = self.get_current_subscription(user_id).await? else {
            return Ok(false);
        };

        Ok(tier_allows(subscription.tier_enum(), required_tiers))
    }
}

fn tier_allows(tier: Option<SubscriptionTier>, required_tiers: &[SubscriptionTier]) -> bool {
    required_tiers.is_empty() || tier.is_some_and(|tier| required_tiers.contains(&tier))
}

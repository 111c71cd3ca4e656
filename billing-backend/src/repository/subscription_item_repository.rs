// billing-backend/src/repository/subscription_item_repository.rs

use crate::domain::subscription_item_model::{
    self, ActiveModel as SubscriptionItemActiveModel, Column, Entity as SubscriptionItemEntity,
};
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DbConn, DbErr, EntityTrait, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SubscriptionItemRepository {
    db: DbConn,
}

impl SubscriptionItemRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    pub async fn find_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Vec<subscription_item_model::Model>, DbErr> {
        SubscriptionItemEntity::find()
            .filter(Column::StripeSubscriptionId.eq(stripe_subscription_id))
            .order_by_asc(Column::StripeSubscriptionItemId)
            .all(&self.db)
            .await
    }

    /// 明細を stripe_subscription_item_id をキーにupsert
    pub async fn upsert_items(
        &self,
        stripe_subscription_id: &str,
        items: &[UpsertSubscriptionItem],
    ) -> Result<(), DbErr> {
        for item in items {
            let now = Utc::now();
            let model = SubscriptionItemActiveModel {
                id: Set(Uuid::new_v4()),
                stripe_subscription_item_id: Set(item.stripe_subscription_item_id.clone()),
                stripe_subscription_id: Set(stripe_subscription_id.to_string()),
                stripe_price_id: Set(item.stripe_price_id.clone()),
                quantity: Set(item.quantity),
                created_at: Set(now),
                updated_at: Set(now),
            };

            SubscriptionItemEntity::insert(model)
                .on_conflict(
                    OnConflict::column(Column::StripeSubscriptionItemId)
                        .update_columns([
                            Column::StripeSubscriptionId,
                            Column::StripePriceId,
                            Column::Quantity,
                            Column::UpdatedAt,
                        ])
                        .to_owned(),
                )
                .exec_without_returning(&self.db)
                .await?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct UpsertSubscriptionItem {
    pub stripe_subscription_item_id: String,
    pub stripe_price_id: Option<String>,
    pub quantity: i32,
}

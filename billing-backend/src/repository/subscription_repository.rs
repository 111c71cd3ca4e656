// billing-backend/src/repository/subscription_repository.rs

use crate::domain::subscription_model::{
    self, ActiveModel as SubscriptionActiveModel, Column, Entity as SubscriptionEntity,
};
use crate::domain::subscription_status::SubscriptionStatus;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict, SimpleExpr};
use sea_orm::{ColumnTrait, DbConn, DbErr, EntityTrait, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SubscriptionRepository {
    db: DbConn,
}

impl SubscriptionRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    /// Stripe Subscription IDでサブスクリプションを検索
    pub async fn find_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<subscription_model::Model>, DbErr> {
        SubscriptionEntity::find()
            .filter(Column::StripeSubscriptionId.eq(stripe_subscription_id))
            .one(&self.db)
            .await
    }

    /// ユーザーの有効な（trialing / active）サブスクリプションのうち最新のものを取得
    pub async fn find_active_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<subscription_model::Model>, DbErr> {
        SubscriptionEntity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Status.is_in(SubscriptionStatus::access_granting()))
            .order_by_desc(Column::CreatedAt)
            .one(&self.db)
            .await
    }

    /// stripe_subscription_id をキーに挿入または更新する
    ///
    /// `INSERT .. ON CONFLICT (stripe_subscription_id) DO UPDATE` で一文で実行するため、
    /// 同じキーへの並行書き込みでも行は一つに保たれる。`user_id` と `created_at` は
    /// 初回挿入時の値を維持する。
    pub async fn upsert(
        &self,
        upsert: UpsertSubscription,
    ) -> Result<subscription_model::Model, DbErr> {
        let stripe_subscription_id = upsert.stripe_subscription_id.clone();
        self.exec_upsert(upsert, None).await?;
        self.find_required(&stripe_subscription_id).await
    }

    /// 保存済みより前に終わる請求期間なら更新しない upsert
    ///
    /// 期間の比較は `DO UPDATE .. WHERE` に含めるため、並行する配信同士でも
    /// 古い期間の値が新しい期間を上書きすることはない。更新されなかった場合は `None`。
    pub async fn upsert_unless_older_period(
        &self,
        upsert: UpsertSubscription,
    ) -> Result<Option<subscription_model::Model>, DbErr> {
        let stripe_subscription_id = upsert.stripe_subscription_id.clone();
        let affected = self
            .exec_upsert(
                upsert,
                Some(Expr::cust(
                    "subscriptions.current_period_end IS NULL \
                     OR excluded.current_period_end IS NULL \
                     OR subscriptions.current_period_end <= excluded.current_period_end",
                )),
            )
            .await?;

        if affected == 0 {
            return Ok(None);
        }
        self.find_required(&stripe_subscription_id).await.map(Some)
    }

    async fn exec_upsert(
        &self,
        upsert: UpsertSubscription,
        update_condition: Option<SimpleExpr>,
    ) -> Result<u64, DbErr> {
        let now = Utc::now();

        let model = SubscriptionActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(upsert.user_id),
            stripe_subscription_id: Set(upsert.stripe_subscription_id),
            stripe_customer_id: Set(upsert.stripe_customer_id),
            status: Set(upsert.status.as_str().to_string()),
            tier: Set(upsert.tier),
            stripe_price_id: Set(upsert.stripe_price_id),
            stripe_product_id: Set(upsert.stripe_product_id),
            quantity: Set(upsert.quantity),
            current_period_start: Set(upsert.current_period_start),
            current_period_end: Set(upsert.current_period_end),
            trial_start: Set(upsert.trial_start),
            trial_end: Set(upsert.trial_end),
            cancel_at: Set(upsert.cancel_at),
            cancel_at_period_end: Set(upsert.cancel_at_period_end),
            canceled_at: Set(upsert.canceled_at),
            ended_at: Set(upsert.ended_at),
            metadata: Set(upsert.metadata),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let mut on_conflict = OnConflict::column(Column::StripeSubscriptionId);
        on_conflict.update_columns([
            Column::StripeCustomerId,
            Column::Status,
            Column::Tier,
            Column::StripePriceId,
            Column::StripeProductId,
            Column::Quantity,
            Column::CurrentPeriodStart,
            Column::CurrentPeriodEnd,
            Column::TrialStart,
            Column::TrialEnd,
            Column::CancelAt,
            Column::CancelAtPeriodEnd,
            Column::CanceledAt,
            Column::EndedAt,
            Column::Metadata,
            Column::UpdatedAt,
        ]);
        if let Some(condition) = update_condition {
            on_conflict.action_and_where(condition);
        }

        SubscriptionEntity::insert(model)
            .on_conflict(on_conflict)
            .exec_without_returning(&self.db)
            .await
    }

    async fn find_required(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<subscription_model::Model, DbErr> {
        self.find_by_stripe_subscription_id(stripe_subscription_id)
            .await?
            .ok_or_else(|| {
                DbErr::RecordNotFound(format!(
                    "Subscription {} missing after upsert",
                    stripe_subscription_id
                ))
            })
    }

    /// ステータスのみを更新（支払い失敗時など）。更新件数を返す
    pub async fn update_status(
        &self,
        stripe_subscription_id: &str,
        status: SubscriptionStatus,
    ) -> Result<u64, DbErr> {
        let result = SubscriptionEntity::update_many()
            .col_expr(Column::Status, Expr::value(status.as_str()))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::StripeSubscriptionId.eq(stripe_subscription_id))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }
}

/// サブスクリプションのupsert用構造体（Stripe側の値をそのまま保持する）
#[derive(Debug, Clone)]
pub struct UpsertSubscription {
    pub user_id: Uuid,
    pub stripe_subscription_id: String,
    pub stripe_customer_id: String,
    pub status: SubscriptionStatus,
    pub tier: Option<String>,
    pub stripe_price_id: Option<String>,
    pub stripe_product_id: Option<String>,
    pub quantity: i32,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub cancel_at: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

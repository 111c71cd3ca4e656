// billing-backend/src/repository/invoice_repository.rs

use crate::domain::invoice_model::{
    self, ActiveModel as InvoiceActiveModel, Column, Entity as InvoiceEntity,
};
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DbConn, DbErr, EntityTrait, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    db: DbConn,
}

impl InvoiceRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    pub async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<invoice_model::Model>, DbErr> {
        InvoiceEntity::find()
            .filter(Column::UserId.eq(user_id))
            .order_by_desc(Column::CreatedAt)
            .all(&self.db)
            .await
    }

    /// 請求書を記録する（追記のみ）。同じ stripe_invoice_id が既にあれば何もしない
    ///
    /// 新規に挿入された場合に `true` を返す。
    pub async fn insert_if_absent(&self, create: CreateInvoice) -> Result<bool, DbErr> {
        let model = InvoiceActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(create.user_id),
            stripe_invoice_id: Set(create.stripe_invoice_id),
            stripe_customer_id: Set(create.stripe_customer_id),
            subscription_id: Set(create.subscription_id),
            amount_paid: Set(create.amount_paid),
            amount_due: Set(create.amount_due),
            currency: Set(create.currency),
            status: Set(create.status),
            created_at: Set(Utc::now()),
        };

        let inserted = InvoiceEntity::insert(model)
            .on_conflict(
                OnConflict::column(Column::StripeInvoiceId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(inserted > 0)
    }
}

/// 請求書作成用構造体
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub user_id: Uuid,
    pub stripe_invoice_id: String,
    pub stripe_customer_id: String,
    pub subscription_id: Option<Uuid>,
    pub amount_paid: i64,
    pub amount_due: i64,
    pub currency: String,
    pub status: String,
}

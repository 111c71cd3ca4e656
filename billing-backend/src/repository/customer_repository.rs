// billing-backend/src/repository/customer_repository.rs

use crate::domain::customer_model::{
    self, ActiveModel as CustomerActiveModel, Column, Entity as CustomerEntity,
};
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DbConn, DbErr, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CustomerRepository {
    db: DbConn,
}

impl CustomerRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    pub async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<customer_model::Model>, DbErr> {
        CustomerEntity::find()
            .filter(Column::UserId.eq(user_id))
            .one(&self.db)
            .await
    }

    pub async fn find_by_stripe_customer_id(
        &self,
        stripe_customer_id: &str,
    ) -> Result<Option<customer_model::Model>, DbErr> {
        CustomerEntity::find()
            .filter(Column::StripeCustomerId.eq(stripe_customer_id))
            .one(&self.db)
            .await
    }

    /// 対応が未登録なら作成し、登録済みの対応を返す
    ///
    /// ユーザー・顧客のどちらかが既に別の対応を持つ場合は既存の行を優先する。
    pub async fn create_if_absent(
        &self,
        user_id: Uuid,
        stripe_customer_id: &str,
    ) -> Result<customer_model::Model, DbErr> {
        let model = CustomerActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            stripe_customer_id: Set(stripe_customer_id.to_string()),
            created_at: Set(Utc::now()),
        };

        let inserted = CustomerEntity::insert(model)
            .on_conflict(OnConflict::new().do_nothing().to_owned())
            .exec_without_returning(&self.db)
            .await?;

        if inserted == 0 {
            tracing::debug!(
                user_id = %user_id,
                stripe_customer_id = %stripe_customer_id,
                "Customer mapping already exists"
            );
        }

        match self.find_by_user_id(user_id).await? {
            Some(customer) => Ok(customer),
            None => self
                .find_by_stripe_customer_id(stripe_customer_id)
                .await?
                .ok_or_else(|| {
                    DbErr::RecordNotFound(format!(
                        "Customer mapping for user {} not found",
                        user_id
                    ))
                }),
        }
    }
}

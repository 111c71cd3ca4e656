// billing-backend/src/domain/invoice_model.rs

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    #[sea_orm(unique)]
    pub stripe_invoice_id: String,

    pub stripe_customer_id: String,

    /// ローカルのサブスクリプションID（該当なしの場合はNone）
    #[sea_orm(nullable)]
    pub subscription_id: Option<Uuid>,

    pub amount_paid: i64,

    pub amount_due: i64,

    pub currency: String,

    pub status: String,

    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

// billing-backend/src/api/dto/payment_dto.rs

use crate::domain::invoice_model;
use crate::domain::subscription_tier::SubscriptionTier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCheckoutRequest {
    #[validate(custom(function = "validate_tier"))]
    pub tier: String,
    pub user_id: Uuid,
}

fn validate_tier(tier: &str) -> Result<(), validator::ValidationError> {
    match SubscriptionTier::from_str(tier) {
        Some(_) => Ok(()),
        None => {
            let mut error = validator::ValidationError::new("invalid_tier");
            error.message = Some("tier must be one of starter, pro, enterprise".into());
            Err(error)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePortalRequest {
    pub user_id: Uuid,
}

/// ホスト型セッションのリダイレクト先
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionUrlResponse {
    pub url: String,
}

/// 支払い履歴の1件
#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentHistoryItem {
    pub id: Uuid,
    pub stripe_invoice_id: String,
    pub subscription_id: Option<Uuid>,
    pub amount_paid: i64,
    pub amount_due: i64,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<invoice_model::Model> for PaymentHistoryItem {
    fn from(model: invoice_model::Model) -> Self {
        Self {
            id: model.id,
            stripe_invoice_id: model.stripe_invoice_id,
            subscription_id: model.subscription_id,
            amount_paid: model.amount_paid,
            amount_due: model.amount_due,
            currency: model.currency,
            status: model.status,
            created_at: model.created_at,
        }
    }
}

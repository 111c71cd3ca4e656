// billing-backend/src/service/payment_service.rs

use crate::config::StripeConfig;
use crate::db::DbPool;
use crate::domain::subscription_tier::SubscriptionTier;
use crate::error::{AppError, AppResult};
use crate::domain::invoice_model;
use crate::repository::customer_repository::CustomerRepository;
use crate::repository::invoice_repository::InvoiceRepository;
use crate::repository::subscription_repository::SubscriptionRepository;
use crate::service::billing_provider::{BillingProvider, CheckoutSessionParams};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct PaymentService {
    customer_repo: Arc<CustomerRepository>,
    invoice_repo: Arc<InvoiceRepository>,
    subscription_repo: Arc<SubscriptionRepository>,
    provider: Arc<dyn BillingProvider>,
    stripe_config: Arc<StripeConfig>,
    site_url: String,
}

impl PaymentService {
    pub fn new(
        db: DbPool,
        provider: Arc<dyn BillingProvider>,
        stripe_config: Arc<StripeConfig>,
        site_url: String,
    ) -> Self {
        Self {
            customer_repo: Arc::new(CustomerRepository::new(db.clone())),
            invoice_repo: Arc::new(InvoiceRepository::new(db.clone())),
            subscription_repo: Arc::new(SubscriptionRepository::new(db)),
            provider,
            stripe_config,
            site_url,
        }
    }

    /// Stripeチェックアウトセッションを作成
    pub async fn create_checkout_session(
        &self,
        user_id: Uuid,
        email: Option<&str>,
        tier: SubscriptionTier,
    ) -> AppResult<String> {
        // 有効なサブスクリプションがあれば二重契約を防ぐ
        if let Some(existing) = self.subscription_repo.find_active_by_user_id(user_id).await? {
            tracing::info!(
                user_id = %user_id,
                stripe_subscription_id = %existing.stripe_subscription_id,
                "Checkout refused: subscription already active"
            );
            return Err(AppError::BadRequest(
                "User already has an active subscription".to_string(),
            ));
        }

        let customer_id = self.get_or_create_customer(user_id, email).await?;
        let price_id = self.stripe_config.get_price_id(tier);

        let success_url = format!("{}/dashboard?success=true", self.site_url);
        let cancel_url = format!("{}/pricing?canceled=true", self.site_url);

        self.provider
            .create_checkout_session(CheckoutSessionParams {
                customer_id: &customer_id,
                price_id,
                user_id,
                tier,
                success_url: &success_url,
                cancel_url: &cancel_url,
            })
            .await
    }

    /// カスタマーポータルのURLを作成
    pub async fn create_customer_portal_url(&self, user_id: Uuid) -> AppResult<String> {
        let customer = self
            .customer_repo
            .find_by_user_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No billing customer for this user".to_string()))?;

        let return_url = format!("{}/dashboard", self.site_url);

        self.provider
            .create_portal_session(&customer.stripe_customer_id, &return_url)
            .await
    }

    /// 記録済みの請求書（新しい順）
    pub async fn get_payment_history(
        &self,
        user_id: Uuid,
    ) -> AppResult<Vec<invoice_model::Model>> {
        Ok(self.invoice_repo.find_by_user_id(user_id).await?)
    }

    // Stripe顧客IDを取得または作成
    async fn get_or_create_customer(&self, user_id: Uuid, email: Option<&str>) -> AppResult<String> {
        if let Some(customer) = self.customer_repo.find_by_user_id(user_id).await? {
            return Ok(customer.stripe_customer_id);
        }

        let stripe_customer_id = self.provider.create_customer(user_id, email).await?;

        // 並行リクエストで先に登録された場合はそちらを使う
        let mapping = self
            .customer_repo
            .create_if_absent(user_id, &stripe_customer_id)
            .await?;

        tracing::info!(
            user_id = %user_id,
            stripe_customer_id = %mapping.stripe_customer_id,
            "Billing customer mapped"
        );

        Ok(mapping.stripe_customer_id)
    }
}

// billing-backend/src/service/billing_provider.rs

use crate::config::StripeConfig;
use crate::domain::subscription_tier::SubscriptionTier;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use stripe::{
    BillingPortalSession, CheckoutSession, CheckoutSessionMode, Client,
    CreateBillingPortalSession, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionSubscriptionData, CreateCustomer, Customer, CustomerId,
};
use uuid::Uuid;

/// チェックアウトセッション作成のパラメータ
#[derive(Debug, Clone)]
pub struct CheckoutSessionParams<'a> {
    pub customer_id: &'a str,
    pub price_id: &'a str,
    pub user_id: Uuid,
    pub tier: SubscriptionTier,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}

/// 決済プロバイダのホスト型セッションAPI
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// 顧客を作成してプロバイダ側の顧客IDを返す
    async fn create_customer(&self, user_id: Uuid, email: Option<&str>) -> AppResult<String>;

    /// サブスクリプションモードのチェックアウトセッションを作成してURLを返す
    async fn create_checkout_session(&self, params: CheckoutSessionParams<'_>)
        -> AppResult<String>;

    /// 請求ポータルのセッションを作成してURLを返す
    async fn create_portal_session(&self, customer_id: &str, return_url: &str)
        -> AppResult<String>;
}

/// 設定に応じてプロバイダを選択する
pub fn billing_provider_from_config(
    stripe_config: &StripeConfig,
    site_url: &str,
) -> Arc<dyn BillingProvider> {
    if stripe_config.development_mode {
        Arc::new(DevelopmentBillingProvider::new(site_url))
    } else {
        Arc::new(StripeBillingProvider::new(Client::new(
            stripe_config.secret_key.clone(),
        )))
    }
}

fn user_metadata(user_id: Uuid, tier: Option<SubscriptionTier>) -> HashMap<String, String> {
    let mut metadata = HashMap::from([("user_id".to_string(), user_id.to_string())]);
    if let Some(tier) = tier {
        metadata.insert("tier".to_string(), tier.as_str().to_string());
    }
    metadata
}

fn parse_customer_id(customer_id: &str) -> AppResult<CustomerId> {
    customer_id
        .parse()
        .map_err(|_| AppError::InternalServerError("Invalid customer ID format".to_string()))
}

/// Stripe APIクライアント（起動時に一度だけ生成して注入する）
pub struct StripeBillingProvider {
    client: Client,
}

impl StripeBillingProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BillingProvider for StripeBillingProvider {
    async fn create_customer(&self, user_id: Uuid, email: Option<&str>) -> AppResult<String> {
        let params = CreateCustomer {
            email,
            metadata: Some(user_metadata(user_id, None)),
            ..Default::default()
        };

        let customer = Customer::create(&self.client, params)
            .await
            .map_err(|e| {
                tracing::error!(user_id = %user_id, error = %e, "Failed to create Stripe customer");
                AppError::ExternalServiceError(format!("Stripe error: {}", e))
            })?;

        Ok(customer.id.to_string())
    }

    async fn create_checkout_session(
        &self,
        params: CheckoutSessionParams<'_>,
    ) -> AppResult<String> {
        let client_reference_id = params.user_id.to_string();
        let metadata = user_metadata(params.user_id, Some(params.tier));

        let checkout_params = CreateCheckoutSession {
            cancel_url: Some(params.cancel_url),
            success_url: Some(params.success_url),
            client_reference_id: Some(&client_reference_id),
            customer: Some(parse_customer_id(params.customer_id)?),
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                price: Some(params.price_id.to_string()),
                quantity: Some(1),
                ..Default::default()
            }]),
            mode: Some(CheckoutSessionMode::Subscription),
            metadata: Some(metadata.clone()),
            // サブスクリプション側にも user_id を載せ、Webhookで顧客対応がなくても解決できるようにする
            subscription_data: Some(CreateCheckoutSessionSubscriptionData {
                metadata: Some(metadata),
                ..Default::default()
            }),
            ..Default::default()
        };

        let session = CheckoutSession::create(&self.client, checkout_params)
            .await
            .map_err(|e| {
                tracing::error!(user_id = %params.user_id, error = %e, "Failed to create checkout session");

                let message = if e.to_string().contains("No such price") {
                    format!(
                        "Stripe error: {}. Price IDs must start with 'price_', not 'prod_'",
                        e
                    )
                } else {
                    format!("Stripe error: {}", e)
                };
                AppError::ExternalServiceError(message)
            })?;

        session.url.ok_or_else(|| {
            AppError::InternalServerError("No checkout URL returned from Stripe".to_string())
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> AppResult<String> {
        let params = CreateBillingPortalSession {
            customer: parse_customer_id(customer_id)?,
            return_url: Some(return_url),
            configuration: None,
            expand: &[],
            flow_data: None,
            locale: None,
            on_behalf_of: None,
        };

        let session = BillingPortalSession::create(&self.client, params)
            .await
            .map_err(|e| {
                tracing::error!(customer_id = %customer_id, error = %e, "Failed to create portal session");
                AppError::ExternalServiceError(format!("Stripe error: {}", e))
            })?;

        Ok(session.url)
    }
}

/// 開発モード用のモック（外部APIを呼ばない）
pub struct DevelopmentBillingProvider {
    site_url: String,
}

impl DevelopmentBillingProvider {
    pub fn new(site_url: &str) -> Self {
        Self {
            site_url: site_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl BillingProvider for DevelopmentBillingProvider {
    async fn create_customer(&self, user_id: Uuid, _email: Option<&str>) -> AppResult<String> {
        tracing::info!(user_id = %user_id, "Development mode: returning mock customer");
        Ok(format!("cus_dev_{}", user_id.simple()))
    }

    async fn create_checkout_session(
        &self,
        params: CheckoutSessionParams<'_>,
    ) -> AppResult<String> {
        tracing::info!("Development mode: returning mock checkout URL");
        Ok(format!(
            "{}/mock-checkout?user_id={}&tier={}&price_id={}",
            self.site_url, params.user_id, params.tier, params.price_id
        ))
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        _return_url: &str,
    ) -> AppResult<String> {
        tracing::info!("Development mode: returning mock portal URL");
        Ok(format!(
            "{}/mock-portal?customer_id={}",
            self.site_url, customer_id
        ))
    }
}

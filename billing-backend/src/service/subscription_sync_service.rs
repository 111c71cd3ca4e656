// billing-backend/src/service/subscription_sync_service.rs

use crate::config::StripeConfig;
use crate::db::DbPool;
use crate::domain::subscription_status::SubscriptionStatus;
use crate::domain::subscription_tier::SubscriptionTier;
use crate::log_with_context;
use crate::logging::record_webhook_event;
use crate::repository::customer_repository::CustomerRepository;
use crate::repository::invoice_repository::{CreateInvoice, InvoiceRepository};
use crate::repository::subscription_item_repository::{
    SubscriptionItemRepository, UpsertSubscriptionItem,
};
use crate::repository::subscription_repository::{SubscriptionRepository, UpsertSubscription};
use crate::webhook::event::{timestamp_to_datetime, StripeSubscription};
use crate::webhook::{verify_signature, WebhookError, WebhookEvent, WebhookEventKind};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// 検証済みイベントの処理結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Upserted,
    Canceled,
    MarkedPastDue,
    InvoiceRecorded,
    InvoiceAlreadyRecorded,
    CustomerLinked,
    /// 保存済みより古い請求期間のイベント
    SkippedStale,
    SubscriptionNotFound,
    Ignored,
    /// 処理に失敗したが受信確認は返す（エラー種別を保持）
    Failed(&'static str),
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upserted => "upserted",
            Self::Canceled => "canceled",
            Self::MarkedPastDue => "marked_past_due",
            Self::InvoiceRecorded => "invoice_recorded",
            Self::InvoiceAlreadyRecorded => "invoice_already_recorded",
            Self::CustomerLinked => "customer_linked",
            Self::SkippedStale => "skipped_stale",
            Self::SubscriptionNotFound => "subscription_not_found",
            Self::Ignored => "ignored",
            Self::Failed(kind) => kind,
        }
    }
}

impl Serialize for WebhookOutcome {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// 受信確認の内容
#[derive(Debug, Clone)]
pub struct WebhookReceipt {
    pub event_id: String,
    pub event_type: String,
    pub outcome: WebhookOutcome,
}

/// Stripeのイベントをローカルのサブスクリプション記録へ反映する
pub struct SubscriptionSyncService {
    subscription_repo: Arc<SubscriptionRepository>,
    item_repo: Arc<SubscriptionItemRepository>,
    customer_repo: Arc<CustomerRepository>,
    invoice_repo: Arc<InvoiceRepository>,
    stripe_config: Arc<StripeConfig>,
}

impl SubscriptionSyncService {
    pub fn new(db: DbPool, stripe_config: Arc<StripeConfig>) -> Self {
        Self {
            subscription_repo: Arc::new(SubscriptionRepository::new(db.clone())),
            item_repo: Arc::new(SubscriptionItemRepository::new(db.clone())),
            customer_repo: Arc::new(CustomerRepository::new(db.clone())),
            invoice_repo: Arc::new(InvoiceRepository::new(db)),
            stripe_config,
        }
    }

    /// Webhookリクエストを処理する
    ///
    /// 署名検証前にDBへは一切アクセスしない。`Err` を返すのは
    /// 署名不正とエンベロープ不正のときだけで、それ以外は結果を受信確認に載せる。
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookReceipt, WebhookError> {
        verify_signature(
            payload,
            signature,
            &self.stripe_config.webhook_secret,
            self.stripe_config.webhook_tolerance_secs,
            Utc::now().timestamp(),
        )?;

        let event = WebhookEvent::parse(payload)?;
        record_webhook_event(&event.id, &event.event_type);

        log_with_context!(
            tracing::Level::INFO,
            "Processing webhook event",
            "event_id" => &event.id,
            "event_type" => &event.event_type,
            "livemode" => event.livemode,
        );

        let outcome = match self.process_event(&event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let level = match e {
                    WebhookError::StoreWriteFailure(_) => tracing::Level::ERROR,
                    _ => tracing::Level::WARN,
                };
                log_with_context!(
                    level,
                    "Webhook event could not be applied",
                    "event_id" => &event.id,
                    "event_type" => &event.event_type,
                    "error" => e.to_string(),
                );
                WebhookOutcome::Failed(e.kind())
            }
        };

        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            outcome = outcome.as_str(),
            "Webhook event processed"
        );

        Ok(WebhookReceipt {
            event_id: event.id,
            event_type: event.event_type,
            outcome,
        })
    }

    async fn process_event(&self, event: &WebhookEvent) -> Result<WebhookOutcome, WebhookError> {
        match event.kind() {
            WebhookEventKind::SubscriptionCreated | WebhookEventKind::SubscriptionUpdated => {
                self.sync_subscription(event, false).await
            }
            WebhookEventKind::SubscriptionDeleted => self.sync_subscription(event, true).await,
            WebhookEventKind::InvoicePaid | WebhookEventKind::InvoicePaymentSucceeded => {
                self.record_invoice(event).await
            }
            WebhookEventKind::InvoicePaymentFailed => self.mark_payment_failed(event).await,
            WebhookEventKind::CheckoutSessionCompleted => self.link_checkout_customer(event).await,
            WebhookEventKind::Ignored => {
                tracing::debug!(event_type = %event.event_type, "Unhandled webhook event type");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    /// 顧客IDからユーザーを解決する
    ///
    /// 顧客対応表を優先し、なければメタデータの user_id を使って対応を作成する。
    async fn resolve_user(
        &self,
        customer_id: &str,
        metadata_user_id: Option<&str>,
    ) -> Result<Uuid, WebhookError> {
        // 顧客IDからユーザーを検索
        if let Some(customer) = self
            .customer_repo
            .find_by_stripe_customer_id(customer_id)
            .await?
        {
            return Ok(customer.user_id);
        }

        let user_id = metadata_user_id
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or_else(|| WebhookError::UnresolvedUser {
                customer_id: customer_id.to_string(),
            })?;

        self.customer_repo
            .create_if_absent(user_id, customer_id)
            .await?;

        tracing::info!(
            user_id = %user_id,
            stripe_customer_id = %customer_id,
            "Customer mapping created from metadata"
        );

        Ok(user_id)
    }

    async fn sync_subscription(
        &self,
        event: &WebhookEvent,
        deleted: bool,
    ) -> Result<WebhookOutcome, WebhookError> {
        let subscription = event.subscription()?;
        let user_id = self
            .resolve_user(subscription.customer.id(), subscription.metadata_user_id())
            .await?;

        let status = if deleted {
            SubscriptionStatus::Canceled
        } else {
            subscription
                .status
                .parse::<SubscriptionStatus>()
                .map_err(|reason| WebhookError::UndecodableObject {
                    event_type: event.event_type.clone(),
                    reason,
                })?
        };

        let mut upsert = self.build_upsert(&subscription, user_id, status);

        let saved = if deleted {
            // 再配信でも最初に記録した解約時刻を保つ
            let stored = self
                .subscription_repo
                .find_by_stripe_subscription_id(&subscription.id)
                .await?;
            let now = Utc::now();
            upsert.canceled_at = upsert
                .canceled_at
                .or_else(|| stored.as_ref().and_then(|s| s.canceled_at))
                .or(Some(now));
            upsert.ended_at = upsert
                .ended_at
                .or_else(|| stored.as_ref().and_then(|s| s.ended_at))
                .or(Some(now));

            self.subscription_repo.upsert(upsert).await?
        } else {
            match self
                .subscription_repo
                .upsert_unless_older_period(upsert)
                .await?
            {
                Some(saved) => saved,
                None => {
                    tracing::info!(
                        event_id = %event.id,
                        stripe_subscription_id = %subscription.id,
                        "Skipping event for an earlier billing period"
                    );
                    return Ok(WebhookOutcome::SkippedStale);
                }
            }
        };

        let items: Vec<UpsertSubscriptionItem> = subscription
            .items()
            .iter()
            .map(|item| UpsertSubscriptionItem {
                stripe_subscription_item_id: item.id.clone(),
                stripe_price_id: item.price.as_ref().map(|p| p.id.clone()),
                quantity: item
                    .quantity
                    .and_then(|q| i32::try_from(q).ok())
                    .unwrap_or(1),
            })
            .collect();
        self.item_repo.upsert_items(&subscription.id, &items).await?;

        tracing::info!(
            user_id = %user_id,
            stripe_subscription_id = %saved.stripe_subscription_id,
            status = %saved.status,
            "Subscription record reconciled"
        );

        Ok(if deleted {
            WebhookOutcome::Canceled
        } else {
            WebhookOutcome::Upserted
        })
    }

    fn build_upsert(
        &self,
        subscription: &StripeSubscription,
        user_id: Uuid,
        status: SubscriptionStatus,
    ) -> UpsertSubscription {
        // 価格IDから階層を決め、設定にない価格ならメタデータの tier を使う
        let tier = subscription
            .price_id()
            .and_then(|price_id| self.stripe_config.tier_for_price(price_id))
            .map(|tier| tier.as_str().to_string())
            .or_else(|| {
                subscription
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get("tier"))
                    .and_then(|raw| SubscriptionTier::from_str(raw))
                    .map(|tier| tier.as_str().to_string())
            });

        UpsertSubscription {
            user_id,
            stripe_subscription_id: subscription.id.clone(),
            stripe_customer_id: subscription.customer.id().to_string(),
            status,
            tier,
            stripe_price_id: subscription.price_id().map(str::to_string),
            stripe_product_id: subscription.product_id().map(str::to_string),
            quantity: subscription.quantity(),
            current_period_start: subscription.period_start(),
            current_period_end: subscription.period_end(),
            trial_start: subscription.trial_start.and_then(timestamp_to_datetime),
            trial_end: subscription.trial_end.and_then(timestamp_to_datetime),
            cancel_at: subscription.cancel_at.and_then(timestamp_to_datetime),
            cancel_at_period_end: subscription.cancel_at_period_end,
            canceled_at: subscription.canceled_at.and_then(timestamp_to_datetime),
            ended_at: subscription.ended_at.and_then(timestamp_to_datetime),
            metadata: subscription
                .metadata
                .as_ref()
                .and_then(|m| serde_json::to_value(m).ok()),
        }
    }

    async fn record_invoice(&self, event: &WebhookEvent) -> Result<WebhookOutcome, WebhookError> {
        let invoice = event.invoice()?;
        let customer_id = invoice
            .customer_id()
            .ok_or_else(|| WebhookError::UndecodableObject {
                event_type: event.event_type.clone(),
                reason: "invoice has no customer".to_string(),
            })?;

        let user_id = self
            .resolve_user(customer_id, invoice.metadata_user_id())
            .await?;

        let subscription_id = match invoice.subscription_id() {
            Some(stripe_subscription_id) => self
                .subscription_repo
                .find_by_stripe_subscription_id(stripe_subscription_id)
                .await?
                .map(|s| s.id),
            None => None,
        };

        let inserted = self
            .invoice_repo
            .insert_if_absent(CreateInvoice {
                user_id,
                stripe_invoice_id: invoice.id.clone(),
                stripe_customer_id: customer_id.to_string(),
                subscription_id,
                amount_paid: invoice.amount_paid,
                amount_due: invoice.amount_due,
                currency: invoice.currency.clone().unwrap_or_default(),
                status: invoice.status.clone().unwrap_or_else(|| "paid".to_string()),
            })
            .await?;

        if inserted {
            tracing::info!(
                user_id = %user_id,
                stripe_invoice_id = %invoice.id,
                amount_paid = invoice.amount_paid,
                "Invoice recorded"
            );
            Ok(WebhookOutcome::InvoiceRecorded)
        } else {
            tracing::debug!(stripe_invoice_id = %invoice.id, "Invoice already recorded");
            Ok(WebhookOutcome::InvoiceAlreadyRecorded)
        }
    }

    async fn mark_payment_failed(
        &self,
        event: &WebhookEvent,
    ) -> Result<WebhookOutcome, WebhookError> {
        let invoice = event.invoice()?;

        // サブスクリプションに紐づかない請求書（単発請求）は対象外
        let Some(stripe_subscription_id) = invoice.subscription_id() else {
            return Ok(WebhookOutcome::Ignored);
        };

        let updated = self
            .subscription_repo
            .update_status(stripe_subscription_id, SubscriptionStatus::PastDue)
            .await?;

        if updated == 0 {
            tracing::warn!(
                stripe_subscription_id = %stripe_subscription_id,
                stripe_invoice_id = %invoice.id,
                "Payment failed for an unknown subscription"
            );
            return Ok(WebhookOutcome::SubscriptionNotFound);
        }

        tracing::warn!(
            stripe_subscription_id = %stripe_subscription_id,
            stripe_invoice_id = %invoice.id,
            "Subscription marked past_due after failed payment"
        );
        Ok(WebhookOutcome::MarkedPastDue)
    }

    async fn link_checkout_customer(
        &self,
        event: &WebhookEvent,
    ) -> Result<WebhookOutcome, WebhookError> {
        let session = event.checkout_session()?;

        let Some(customer_id) = session.customer_id() else {
            tracing::debug!(session_id = %session.id, "Checkout session without customer");
            return Ok(WebhookOutcome::Ignored);
        };

        let user_id = session
            .user_reference()
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or_else(|| WebhookError::UnresolvedUser {
                customer_id: customer_id.to_string(),
            })?;

        self.customer_repo
            .create_if_absent(user_id, customer_id)
            .await?;

        tracing::info!(
            user_id = %user_id,
            stripe_customer_id = %customer_id,
            session_id = %session.id,
            "Checkout completed, customer linked"
        );

        Ok(WebhookOutcome::CustomerLinked)
    }
}

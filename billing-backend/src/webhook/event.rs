// billing-backend/src/webhook/event.rs

use super::WebhookError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Webhookイベントのエンベロープ
///
/// `data.object` は種別ごとに後からデコードする。
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub livemode: bool,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// 処理対象のイベント種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventKind {
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
    InvoicePaid,
    InvoicePaymentSucceeded,
    InvoicePaymentFailed,
    CheckoutSessionCompleted,
    /// 受信確認のみ行う
    Ignored,
}

impl WebhookEventKind {
    pub fn from_event_type(event_type: &str) -> Self {
        match event_type {
            "customer.subscription.created" => Self::SubscriptionCreated,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            "invoice.paid" => Self::InvoicePaid,
            "invoice.payment_succeeded" => Self::InvoicePaymentSucceeded,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            _ => Self::Ignored,
        }
    }
}

impl WebhookEvent {
    /// 生のボディからエンベロープを読み取る
    pub fn parse(payload: &[u8]) -> Result<Self, WebhookError> {
        serde_json::from_slice(payload).map_err(|e| WebhookError::MalformedPayload(e.to_string()))
    }

    pub fn kind(&self) -> WebhookEventKind {
        WebhookEventKind::from_event_type(&self.event_type)
    }

    pub fn subscription(&self) -> Result<StripeSubscription, WebhookError> {
        self.decode_object()
    }

    pub fn invoice(&self) -> Result<StripeInvoice, WebhookError> {
        self.decode_object()
    }

    pub fn checkout_session(&self) -> Result<StripeCheckoutSession, WebhookError> {
        self.decode_object()
    }

    fn decode_object<T: serde::de::DeserializeOwned>(&self) -> Result<T, WebhookError> {
        serde_json::from_value(self.data.object.clone()).map_err(|e| {
            WebhookError::UndecodableObject {
                event_type: self.event_type.clone(),
                reason: e.to_string(),
            }
        })
    }
}

/// IDのみ、または展開済みオブジェクトのどちらでも来るフィールド
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Object { id } => id,
        }
    }
}

type Metadata = Option<HashMap<String, String>>;

fn metadata_value<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    metadata
        .as_ref()
        .and_then(|m| m.get(key))
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: Expandable,
    pub status: String,
    #[serde(default)]
    pub items: Option<StripeList<StripeSubscriptionItem>>,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub trial_start: Option<i64>,
    pub trial_end: Option<i64>,
    pub cancel_at: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<i64>,
    pub ended_at: Option<i64>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeList<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscriptionItem {
    pub id: String,
    pub price: Option<StripePrice>,
    pub quantity: Option<i64>,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePrice {
    pub id: String,
    pub product: Option<Expandable>,
}

impl StripeSubscription {
    pub fn items(&self) -> &[StripeSubscriptionItem] {
        self.items.as_ref().map_or(&[], |list| list.data.as_slice())
    }

    pub fn first_item(&self) -> Option<&StripeSubscriptionItem> {
        self.items().first()
    }

    pub fn metadata_user_id(&self) -> Option<&str> {
        metadata_value(&self.metadata, "user_id")
    }

    /// 期間の開始。新しいAPIバージョンでは明細側にのみ存在する
    pub fn period_start(&self) -> Option<DateTime<Utc>> {
        self.current_period_start
            .or_else(|| self.first_item().and_then(|i| i.current_period_start))
            .and_then(timestamp_to_datetime)
    }

    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        self.current_period_end
            .or_else(|| self.first_item().and_then(|i| i.current_period_end))
            .and_then(timestamp_to_datetime)
    }

    pub fn price_id(&self) -> Option<&str> {
        self.first_item()
            .and_then(|i| i.price.as_ref())
            .map(|p| p.id.as_str())
    }

    pub fn product_id(&self) -> Option<&str> {
        self.first_item()
            .and_then(|i| i.price.as_ref())
            .and_then(|p| p.product.as_ref())
            .map(Expandable::id)
    }

    pub fn quantity(&self) -> i32 {
        self.first_item()
            .and_then(|i| i.quantity)
            .and_then(|q| i32::try_from(q).ok())
            .unwrap_or(1)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeInvoice {
    pub id: String,
    pub customer: Option<Expandable>,
    /// 旧APIバージョンのサブスクリプション参照
    pub subscription: Option<Expandable>,
    #[serde(default)]
    pub parent: Option<InvoiceParent>,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub amount_due: i64,
    #[serde(default)]
    pub currency: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceParent {
    pub subscription_details: Option<InvoiceSubscriptionDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceSubscriptionDetails {
    pub subscription: Option<Expandable>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl StripeInvoice {
    pub fn customer_id(&self) -> Option<&str> {
        self.customer.as_ref().map(Expandable::id)
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription
            .as_ref()
            .or_else(|| {
                self.parent
                    .as_ref()
                    .and_then(|p| p.subscription_details.as_ref())
                    .and_then(|d| d.subscription.as_ref())
            })
            .map(Expandable::id)
    }

    /// 請求書本体、なければサブスクリプション詳細のメタデータから user_id を取得
    pub fn metadata_user_id(&self) -> Option<&str> {
        metadata_value(&self.metadata, "user_id").or_else(|| {
            self.parent
                .as_ref()
                .and_then(|p| p.subscription_details.as_ref())
                .and_then(|d| metadata_value(&d.metadata, "user_id"))
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub customer: Option<Expandable>,
    pub client_reference_id: Option<String>,
    pub subscription: Option<Expandable>,
    pub mode: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl StripeCheckoutSession {
    pub fn customer_id(&self) -> Option<&str> {
        self.customer.as_ref().map(Expandable::id)
    }

    /// metadata.user_id を優先し、なければ client_reference_id
    pub fn user_reference(&self) -> Option<&str> {
        metadata_value(&self.metadata, "user_id").or_else(|| {
            self.client_reference_id
                .as_deref()
                .filter(|v| !v.is_empty())
        })
    }
}

pub fn timestamp_to_datetime(timestamp: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp, 0)
}
